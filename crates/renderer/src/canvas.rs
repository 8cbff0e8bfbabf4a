//! Map canvas: world-to-pixel mapping and vector/raster drawing on tiny-skia.

use parcel_common::{BoundingBox, CanvasSpec, Feature, Geometry, LayerStyle, ParcelHighlight, Position, RasterOverlay};
use tiny_skia::{
    BlendMode, Color, FillRule, FilterQuality, IntSize, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Rect,
    Stroke, Transform,
};

use crate::error::{DrawResult, RenderError};
use crate::raster::validate_raster;

/// Neutral paper color used when no basemap is drawn.
pub const BACKGROUND: (u8, u8, u8) = (0xf2, 0xef, 0xe9);
const GRATICULE: (u8, u8, u8, u8) = (0xd9, 0xd3, 0xc7, 0xff);
const GRATICULE_DIVISIONS: u32 = 10;
const FRAME: (u8, u8, u8, u8) = (0x33, 0x33, 0x33, 0xff);
const FRAME_WIDTH: f32 = 1.5;

/// Largest canvas edge accepted.
pub const MAX_CANVAS_PX: u32 = 8192;

type Rgba = (u8, u8, u8, u8);

/// One image being drawn for a fixed extent.
#[derive(Clone)]
pub struct MapCanvas {
    pixmap: Pixmap,
    extent: BoundingBox,
    /// Style sizes are given at 96 dpi
    scale: f32,
}

impl MapCanvas {
    pub fn new(canvas: &CanvasSpec, extent: BoundingBox) -> DrawResult<Self> {
        if canvas.width_px > MAX_CANVAS_PX || canvas.height_px > MAX_CANVAS_PX {
            return Err(RenderError::InvalidCanvas(format!(
                "{}x{} exceeds {} px",
                canvas.width_px, canvas.height_px, MAX_CANVAS_PX
            )));
        }
        if !extent.is_valid() || extent.width() <= 0.0 || extent.height() <= 0.0 {
            return Err(RenderError::InvalidCanvas(format!(
                "degenerate extent {}",
                extent.to_xy_string()
            )));
        }
        let pixmap = Pixmap::new(canvas.width_px, canvas.height_px).ok_or_else(|| {
            RenderError::InvalidCanvas(format!("{}x{}", canvas.width_px, canvas.height_px))
        })?;
        Ok(Self {
            pixmap,
            extent,
            scale: canvas.scale(),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    /// World coordinates to pixel coordinates (origin top-left).
    pub fn to_pixel(&self, x: f64, y: f64) -> (f32, f32) {
        let px = (x - self.extent.min_x) / self.extent.width() * self.width() as f64;
        let py = (self.extent.max_y - y) / self.extent.height() * self.height() as f64;
        (px as f32, py as f32)
    }

    /// Flat paper background with a light graticule.
    pub fn fill_background(&mut self) {
        let (r, g, b) = BACKGROUND;
        self.pixmap.fill(Color::from_rgba8(r, g, b, 255));

        let (w, h) = (self.width() as f32, self.height() as f32);
        let mut pb = PathBuilder::new();
        for i in 1..GRATICULE_DIVISIONS {
            let t = i as f32 / GRATICULE_DIVISIONS as f32;
            pb.move_to(w * t, 0.0);
            pb.line_to(w * t, h);
            pb.move_to(0.0, h * t);
            pb.line_to(w, h * t);
        }
        if let Some(path) = pb.finish() {
            self.stroke(&path, GRATICULE, 1.0 * self.scale);
        }
    }

    /// Alpha-blend a canvas-sized raster over what is already drawn.
    pub fn draw_raster(&mut self, raster: &RasterOverlay, opacity: f32) -> DrawResult<()> {
        if raster.width != self.width() || raster.height != self.height() {
            return Err(RenderError::CorruptRaster(format!(
                "raster is {}x{}, canvas is {}x{}",
                raster.width,
                raster.height,
                self.width(),
                self.height()
            )));
        }
        validate_raster(raster)?;

        let size = IntSize::from_wh(raster.width, raster.height)
            .ok_or_else(|| RenderError::CorruptRaster("empty raster".to_string()))?;
        let overlay = Pixmap::from_vec(premultiply(&raster.data), size)
            .ok_or_else(|| RenderError::CorruptRaster("raster does not fit a pixmap".to_string()))?;

        let paint = PixmapPaint {
            opacity: opacity.clamp(0.0, 1.0),
            blend_mode: BlendMode::SourceOver,
            quality: FilterQuality::Nearest,
        };
        self.pixmap
            .draw_pixmap(0, 0, overlay.as_ref(), &paint, Transform::identity(), None);
        Ok(())
    }

    /// Features styled per layer configuration.
    pub fn draw_features(&mut self, features: &[Feature], style: &LayerStyle) {
        let opacity = style.opacity.clamp(0.0, 1.0);
        let fill = style.fill_color.with_opacity(style.fill_opacity * opacity);
        let line = style.line_color.with_opacity(opacity);
        let width = style.line_width * self.scale;
        let radius = style.point_radius * self.scale;

        for feature in features {
            self.draw_geometry(&feature.geometry, Some(fill), Some((line, width)), radius);
        }
    }

    /// Fixed parcel highlight, drawn above every layer.
    pub fn draw_parcel(&mut self, geometry: &Geometry, highlight: &ParcelHighlight) {
        let (r, g, b) = highlight.fill;
        let fill = (r, g, b, (highlight.fill_alpha.clamp(0.0, 1.0) * 255.0).round() as u8);
        let (r, g, b) = highlight.outline;
        let outline = ((r, g, b, 255), highlight.outline_width * self.scale);
        self.draw_geometry(geometry, Some(fill), Some(outline), 0.0);
    }

    /// Neat-line around the map.
    pub fn draw_frame(&mut self) {
        let width = FRAME_WIDTH * self.scale;
        let inset = width / 2.0;
        let rect = Rect::from_ltrb(
            inset,
            inset,
            self.width() as f32 - inset,
            self.height() as f32 - inset,
        );
        if let Some(rect) = rect {
            let path = PathBuilder::from_rect(rect);
            let mut stroke = Stroke::default();
            stroke.width = width;
            stroke.line_join = LineJoin::Miter;
            self.pixmap
                .stroke_path(&path, &paint(FRAME), &stroke, Transform::identity(), None);
        }
    }

    pub fn draw_geometry(&mut self, geometry: &Geometry, fill: Option<Rgba>, stroke: Option<(Rgba, f32)>, point_radius: f32) {
        match geometry {
            Geometry::Point(p) => self.draw_points(std::slice::from_ref(p), fill, stroke, point_radius),
            Geometry::MultiPoint(points) => self.draw_points(points, fill, stroke, point_radius),
            Geometry::LineString(line) => {
                if let (Some(path), Some((color, width))) = (self.line_path(std::slice::from_ref(line), false), stroke) {
                    self.stroke(&path, color, width);
                }
            }
            Geometry::MultiLineString(lines) => {
                if let (Some(path), Some((color, width))) = (self.line_path(lines, false), stroke) {
                    self.stroke(&path, color, width);
                }
            }
            Geometry::Polygon(rings) => self.draw_rings(rings, fill, stroke),
            Geometry::MultiPolygon(polygons) => {
                let rings: Vec<Vec<Position>> = polygons.iter().flatten().cloned().collect();
                self.draw_rings(&rings, fill, stroke);
            }
        }
    }

    fn draw_rings(&mut self, rings: &[Vec<Position>], fill: Option<Rgba>, stroke: Option<(Rgba, f32)>) {
        let Some(path) = self.line_path(rings, true) else {
            return;
        };
        if let Some(color) = fill {
            let paint = paint(color);
            self.pixmap
                .fill_path(&path, &paint, FillRule::EvenOdd, Transform::identity(), None);
        }
        if let Some((color, width)) = stroke {
            self.stroke(&path, color, width);
        }
    }

    fn draw_points(&mut self, points: &[Position], fill: Option<Rgba>, stroke: Option<(Rgba, f32)>, radius: f32) {
        let radius = radius.max(1.0);
        for p in points {
            let (x, y) = self.to_pixel(p.x, p.y);
            let Some(path) = PathBuilder::from_circle(x, y, radius) else {
                continue;
            };
            if let Some(color) = fill {
                self.pixmap
                    .fill_path(&path, &paint(color), FillRule::Winding, Transform::identity(), None);
            }
            if let Some((color, width)) = stroke {
                self.stroke(&path, color, width);
            }
        }
    }

    fn line_path(&self, parts: &[Vec<Position>], close: bool) -> Option<Path> {
        let mut pb = PathBuilder::new();
        for part in parts {
            let mut points = part.iter().map(|p| self.to_pixel(p.x, p.y));
            let Some((x, y)) = points.next() else {
                continue;
            };
            pb.move_to(x, y);
            for (x, y) in points {
                pb.line_to(x, y);
            }
            if close {
                pb.close();
            }
        }
        pb.finish()
    }

    fn stroke(&mut self, path: &Path, color: Rgba, width: f32) {
        if width <= 0.0 {
            return;
        }
        let mut stroke = Stroke::default();
        stroke.width = width;
        stroke.line_cap = LineCap::Round;
        stroke.line_join = LineJoin::Round;
        self.pixmap
            .stroke_path(path, &paint(color), &stroke, Transform::identity(), None);
    }

    /// Straight-alpha RGBA of the current image.
    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixmap.data().len());
        for px in self.pixmap.pixels() {
            let c = px.demultiply();
            out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        out
    }
}

fn paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.0, color.1, color.2, color.3);
    paint.anti_alias = true;
    paint
}

fn premultiply(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for px in data.chunks_exact(4) {
        let a = px[3] as u16;
        out.extend_from_slice(&[
            ((px[0] as u16 * a + 127) / 255) as u8,
            ((px[1] as u16 * a + 127) / 255) as u8,
            ((px[2] as u16 * a + 127) / 255) as u8,
            px[3],
        ]);
    }
    out
}
