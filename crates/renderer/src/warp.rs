//! Resampling a georeferenced raster onto the request canvas.

use parcel_common::{BoundingBox, CrsCode, RasterOverlay};
use projection::Transformer;
use rayon::prelude::*;

use crate::error::{DrawResult, RenderError};
use crate::raster::validate_raster;

/// A raster whose pixel grid spans `bbox` in `crs`, north up.
#[derive(Debug, Clone, Copy)]
pub struct GeoRaster<'a> {
    pub image: &'a RasterOverlay,
    pub bbox: BoundingBox,
    pub crs: CrsCode,
}

/// Resample `source` onto a `width`×`height` canvas covering `extent` in
/// `target_crs`.
///
/// Each canvas pixel centre is transformed into the source CRS and sampled
/// bilinearly with premultiplied alpha. Pixels that fall outside the source
/// or outside a projection's domain stay transparent.
pub fn warp_to_canvas(
    source: &GeoRaster<'_>,
    extent: &BoundingBox,
    target_crs: CrsCode,
    width: u32,
    height: u32,
) -> DrawResult<RasterOverlay> {
    validate_raster(source.image)?;
    if width == 0 || height == 0 || !extent.is_valid() || !source.bbox.is_valid() {
        return Err(RenderError::InvalidCanvas(format!(
            "cannot warp into {}x{} over {}",
            width,
            height,
            extent.to_xy_string()
        )));
    }

    let to_source = Transformer::new(target_crs, source.crs);
    let px_w = extent.width() / width as f64;
    let px_h = extent.height() / height as f64;
    let src_w = source.image.width as f64;
    let src_h = source.image.height as f64;
    let sx = src_w / source.bbox.width();
    let sy = src_h / source.bbox.height();

    let mut out = RasterOverlay::transparent(width, height);
    out.data
        .par_chunks_mut(width as usize * 4)
        .enumerate()
        .for_each(|(row, line)| {
            let y = extent.max_y - (row as f64 + 0.5) * px_h;
            for (col, px) in line.chunks_exact_mut(4).enumerate() {
                let x = extent.min_x + (col as f64 + 0.5) * px_w;
                let Ok((tx, ty)) = to_source.transform(x, y) else {
                    continue;
                };
                let u = (tx - source.bbox.min_x) * sx - 0.5;
                let v = (source.bbox.max_y - ty) * sy - 0.5;
                if u < -0.5 || v < -0.5 || u > src_w - 0.5 || v > src_h - 0.5 {
                    continue;
                }
                px.copy_from_slice(&sample_bilinear(source.image, u, v));
            }
        });

    Ok(out)
}

/// Bilinear sample at fractional pixel coordinates, clamped to the image.
fn sample_bilinear(image: &RasterOverlay, u: f64, v: f64) -> [u8; 4] {
    let max_x = image.width as i64 - 1;
    let max_y = image.height as i64 - 1;
    let x0 = u.floor() as i64;
    let y0 = v.floor() as i64;
    let fx = u - x0 as f64;
    let fy = v - y0 as f64;

    let fetch = |x: i64, y: i64| -> [f64; 4] {
        let x = x.clamp(0, max_x) as usize;
        let y = y.clamp(0, max_y) as usize;
        let i = (y * image.width as usize + x) * 4;
        let a = image.data[i + 3] as f64 / 255.0;
        [
            image.data[i] as f64 * a,
            image.data[i + 1] as f64 * a,
            image.data[i + 2] as f64 * a,
            a,
        ]
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1, y0);
    let p01 = fetch(x0, y0 + 1);
    let p11 = fetch(x0 + 1, y0 + 1);

    let mut premul = [0f64; 4];
    for c in 0..4 {
        let top = p00[c] * (1.0 - fx) + p10[c] * fx;
        let bottom = p01[c] * (1.0 - fx) + p11[c] * fx;
        premul[c] = top * (1.0 - fy) + bottom * fy;
    }

    let alpha = premul[3];
    if alpha <= 0.0 {
        return [0, 0, 0, 0];
    }
    [
        (premul[0] / alpha).round().clamp(0.0, 255.0) as u8,
        (premul[1] / alpha).round().clamp(0.0, 255.0) as u8,
        (premul[2] / alpha).round().clamp(0.0, 255.0) as u8,
        (alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2x2 quadrants: red, green / blue, white
    fn quadrants() -> RasterOverlay {
        RasterOverlay {
            width: 2,
            height: 2,
            data: vec![
                255, 0, 0, 255, 0, 255, 0, 255, //
                0, 0, 255, 255, 255, 255, 255, 255,
            ],
        }
    }

    fn pixel(r: &RasterOverlay, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * r.width + x) * 4) as usize;
        [r.data[i], r.data[i + 1], r.data[i + 2], r.data[i + 3]]
    }

    #[test]
    fn test_identity_warp_keeps_quadrants() {
        let image = quadrants();
        let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let source = GeoRaster {
            image: &image,
            bbox,
            crs: CrsCode::WebMercator,
        };
        let out = warp_to_canvas(&source, &bbox, CrsCode::WebMercator, 8, 8).unwrap();
        assert_eq!(pixel(&out, 0, 0), [255, 0, 0, 255]);
        assert_eq!(pixel(&out, 7, 0), [0, 255, 0, 255]);
        assert_eq!(pixel(&out, 0, 7), [0, 0, 255, 255]);
        assert_eq!(pixel(&out, 7, 7), [255, 255, 255, 255]);
    }

    #[test]
    fn test_outside_source_is_transparent() {
        let image = quadrants();
        let source = GeoRaster {
            image: &image,
            bbox: BoundingBox::new(0.0, 0.0, 50.0, 100.0),
            crs: CrsCode::WebMercator,
        };
        let extent = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let out = warp_to_canvas(&source, &extent, CrsCode::WebMercator, 4, 4).unwrap();
        assert_eq!(pixel(&out, 0, 0)[3], 255);
        assert_eq!(pixel(&out, 3, 0)[3], 0);
    }

    #[test]
    fn test_transparent_neighbours_do_not_darken() {
        let image = RasterOverlay {
            width: 2,
            height: 1,
            data: vec![200, 100, 50, 255, 0, 0, 0, 0],
        };
        let mid = sample_bilinear(&image, 0.5, 0.0);
        assert_eq!(&mid[0..3], &[200, 100, 50]);
        assert_eq!(mid[3], 128);
    }

    #[test]
    fn test_reprojected_warp_covers_canvas() {
        // Web Mercator tile mosaic drawn into a UTM canvas over the same area
        let image = RasterOverlay {
            width: 16,
            height: 16,
            data: [40, 80, 120, 255].repeat(256),
        };
        let lonlat = BoundingBox::new(-78.65, 35.77, -78.63, 35.79);
        let merc = projection::covering_bbox(&lonlat, CrsCode::Wgs84, CrsCode::WebMercator).unwrap();
        let utm = CrsCode::utm_for(-78.64, 35.78);
        let canvas = projection::reproject_bbox(&lonlat, CrsCode::Wgs84, utm).unwrap();
        let inner = canvas.expand(-canvas.width() * 0.1, -canvas.height() * 0.1);

        let source = GeoRaster {
            image: &image,
            bbox: merc,
            crs: CrsCode::WebMercator,
        };
        let out = warp_to_canvas(&source, &inner, utm, 32, 32).unwrap();
        assert!(out.data.chunks_exact(4).all(|px| px == [40, 80, 120, 255]));
    }

    #[test]
    fn test_rejects_corrupt_source() {
        let broken = RasterOverlay {
            width: 4,
            height: 4,
            data: vec![0; 3],
        };
        let source = GeoRaster {
            image: &broken,
            bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            crs: CrsCode::WebMercator,
        };
        let extent = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(matches!(
            warp_to_canvas(&source, &extent, CrsCode::WebMercator, 2, 2),
            Err(RenderError::CorruptRaster(_))
        ));
    }
}
