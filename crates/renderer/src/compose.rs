//! Per-request image composition and output.

use parcel_common::{BoundingBox, CanvasSpec, FetchResult, LayerPayload, LayerStyle, Parcel, ParcelHighlight, RasterOverlay};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::canvas::MapCanvas;
use crate::error::{DrawResult, RenderError};
use crate::pdf::{write_contact_sheet, SheetPage};
use crate::png::encode_png;

pub const CONTACT_SHEET_FILE: &str = "contact_sheet.pdf";

/// One requested layer: its fetch outcome plus how to draw it.
#[derive(Debug, Clone)]
pub struct LayerInput {
    pub result: FetchResult,
    pub title: String,
    pub style: LayerStyle,
}

/// Everything the renderer needs for one request.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub request_id: Uuid,
    pub parcel: Parcel,
    /// Shared extent in the parcel CRS
    pub extent: BoundingBox,
    pub canvas: CanvasSpec,
    /// Canvas-aligned basemap; the neutral background is used when absent
    pub basemap: Option<RasterOverlay>,
    /// In request order
    pub layers: Vec<LayerInput>,
    /// Warnings raised before rendering, carried ahead of layer warnings
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub output_dir: PathBuf,
    pub images: BTreeMap<String, PathBuf>,
    pub contact_sheet: Option<PathBuf>,
    pub warnings: Vec<String>,
}

enum LayerOutcome {
    Written { path: PathBuf, rgba: Vec<u8> },
    Skipped(String),
}

/// Writes layer images and the contact sheet below an output root.
#[derive(Debug, Clone)]
pub struct Renderer {
    output_root: PathBuf,
    highlight: ParcelHighlight,
}

impl Renderer {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            highlight: ParcelHighlight::DEFAULT,
        }
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// `<root>/<parcel label>/<request id>/`
    pub fn output_dir(&self, parcel: &Parcel, request_id: Uuid) -> PathBuf {
        self.output_root
            .join(parcel.label())
            .join(request_id.to_string())
    }

    /// Draw and write every successfully fetched layer.
    ///
    /// Only a failure to build the base canvas is an error. Drawing and write
    /// failures, including an unwritable output directory, become warnings.
    pub fn render(&self, job: &RenderJob) -> DrawResult<RenderOutput> {
        let mut warnings = job.warnings.clone();
        let base = self.base_canvas(job, &mut warnings)?;

        let output_dir = self.output_dir(&job.parcel, job.request_id);
        let any_success = job.layers.iter().any(|l| l.result.is_success());
        if any_success {
            if let Err(e) = fs::create_dir_all(&output_dir) {
                let e = RenderError::from(e);
                warn!(request_id = %job.request_id, dir = %output_dir.display(), error = %e, "Output directory unavailable");
                for layer in &job.layers {
                    warnings.push(match &layer.result {
                        FetchResult::Failed { warning, .. } => warning.clone(),
                        FetchResult::Success { layer, .. } => format!("Layer '{}' render failed: {}", layer, e),
                    });
                }
                return Ok(RenderOutput {
                    output_dir,
                    images: BTreeMap::new(),
                    contact_sheet: None,
                    warnings,
                });
            }
        }

        let stems = file_stems(&job.layers);
        let outcomes: Vec<LayerOutcome> = job
            .layers
            .par_iter()
            .zip(&stems)
            .map(|(layer, stem)| self.render_layer(&base, job, layer, &output_dir.join(format!("{}.png", stem))))
            .collect();

        let mut images = BTreeMap::new();
        let mut pages = Vec::new();
        for (layer, outcome) in job.layers.iter().zip(outcomes) {
            match outcome {
                LayerOutcome::Written { path, rgba } => {
                    images.insert(layer.result.layer().to_string(), path);
                    pages.push((layer.title.as_str(), rgba));
                }
                LayerOutcome::Skipped(warning) => warnings.push(warning),
            }
        }

        let contact_sheet = if pages.len() >= 2 {
            match self.write_sheet(job, &pages, &output_dir) {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(request_id = %job.request_id, error = %e, "Contact sheet failed");
                    warnings.push(format!("Contact sheet failed: {}", e));
                    None
                }
            }
        } else {
            None
        };

        info!(
            request_id = %job.request_id,
            images = images.len(),
            contact_sheet = contact_sheet.is_some(),
            warnings = warnings.len(),
            "Rendered parcel overlays"
        );

        Ok(RenderOutput {
            output_dir,
            images,
            contact_sheet,
            warnings,
        })
    }

    fn base_canvas(&self, job: &RenderJob, warnings: &mut Vec<String>) -> DrawResult<MapCanvas> {
        let mut canvas = MapCanvas::new(&job.canvas, job.extent)?;
        canvas.fill_background();
        if let Some(basemap) = &job.basemap {
            let mut with_basemap = canvas.clone();
            match with_basemap.draw_raster(basemap, 1.0) {
                Ok(()) => canvas = with_basemap,
                Err(e) => {
                    warn!(request_id = %job.request_id, error = %e, "Basemap not drawable");
                    warnings.push(format!("Basemap unavailable: {}", e));
                }
            }
        }
        Ok(canvas)
    }

    fn render_layer(&self, base: &MapCanvas, job: &RenderJob, layer: &LayerInput, path: &Path) -> LayerOutcome {
        let (name, payload) = match &layer.result {
            FetchResult::Failed { warning, .. } => return LayerOutcome::Skipped(warning.clone()),
            FetchResult::Success { layer, payload } => (layer.as_str(), payload),
        };

        let drawn = self.draw_layer(base, job, payload, &layer.style).and_then(|rgba| {
            let png = encode_png(&rgba, job.canvas.width_px, job.canvas.height_px, Some(job.canvas.dpi))?;
            fs::write(path, png)?;
            Ok((path.to_path_buf(), rgba))
        });

        match drawn {
            Ok((path, rgba)) => {
                debug!(layer = %name, path = %path.display(), "Wrote layer image");
                LayerOutcome::Written { path, rgba }
            }
            Err(e) => {
                warn!(layer = %name, error = %e, "Layer render failed");
                LayerOutcome::Skipped(format!("Layer '{}' render failed: {}", name, e))
            }
        }
    }

    fn draw_layer(
        &self,
        base: &MapCanvas,
        job: &RenderJob,
        payload: &LayerPayload,
        style: &LayerStyle,
    ) -> DrawResult<Vec<u8>> {
        let mut canvas = base.clone();
        match payload {
            LayerPayload::Features(features) => canvas.draw_features(features, style),
            LayerPayload::Raster(raster) => canvas.draw_raster(raster, style.opacity)?,
        }
        canvas.draw_parcel(&job.parcel.geometry, &self.highlight);
        canvas.draw_frame();
        Ok(canvas.to_rgba())
    }

    fn write_sheet(&self, job: &RenderJob, pages: &[(&str, Vec<u8>)], dir: &Path) -> DrawResult<PathBuf> {
        let label = job.parcel.label();
        let titles: Vec<String> = pages
            .iter()
            .map(|(title, _)| format!("{} - {}", label, title))
            .collect();
        let sheet: Vec<SheetPage<'_>> = pages
            .iter()
            .zip(&titles)
            .map(|((_, rgba), title)| SheetPage {
                title,
                width: job.canvas.width_px,
                height: job.canvas.height_px,
                rgba,
            })
            .collect();

        let pdf = write_contact_sheet(&sheet, job.canvas.dpi)?;
        let path = dir.join(CONTACT_SHEET_FILE);
        fs::write(&path, pdf).map_err(RenderError::from)?;
        Ok(path)
    }
}

/// One path component per layer, unique within the request. Names that
/// sanitize alike get `_2`, `_3`, ... in request order.
fn file_stems(layers: &[LayerInput]) -> Vec<String> {
    let mut taken = HashSet::new();
    layers
        .iter()
        .map(|layer| {
            let base = parcel_common::model::sanitize_label(layer.result.layer());
            let mut stem = base.clone();
            let mut n = 2;
            while !taken.insert(stem.clone()) {
                stem = format!("{}_{}", base, n);
                n += 1;
            }
            stem
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parcel_common::{CrsCode, Feature, Geometry};

    fn parcel() -> Parcel {
        Parcel {
            apn: Some("0794-17-2843".to_string()),
            address: Some("123 Main St".to_string()),
            county: None,
            geometry: Geometry::from_bbox(&BoundingBox::new(40.0, 40.0, 60.0, 60.0)),
            crs: CrsCode::WebMercator,
            source: "feature_service".to_string(),
            attributes: Default::default(),
        }
    }

    fn features(name: &str) -> LayerInput {
        LayerInput {
            result: FetchResult::Success {
                layer: name.to_string(),
                payload: LayerPayload::Features(vec![Feature {
                    geometry: Geometry::from_bbox(&BoundingBox::new(0.0, 0.0, 50.0, 50.0)),
                    properties: Default::default(),
                }]),
            },
            title: name.to_uppercase(),
            style: LayerStyle::default(),
        }
    }

    fn raster(name: &str, raster: RasterOverlay) -> LayerInput {
        LayerInput {
            result: FetchResult::Success {
                layer: name.to_string(),
                payload: LayerPayload::Raster(raster),
            },
            title: name.to_string(),
            style: LayerStyle::default(),
        }
    }

    fn failed(name: &str) -> LayerInput {
        LayerInput {
            result: FetchResult::failed(name, "upstream returned HTTP 500"),
            title: name.to_string(),
            style: LayerStyle::default(),
        }
    }

    fn job(layers: Vec<LayerInput>) -> RenderJob {
        RenderJob {
            request_id: Uuid::new_v4(),
            parcel: parcel(),
            extent: BoundingBox::new(0.0, 0.0, 100.0, 100.0),
            canvas: CanvasSpec::new(64, 64, 150),
            basemap: None,
            layers,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_two_layers_write_images_and_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Renderer::new(dir.path());
        let job = job(vec![
            features("zoning"),
            raster("flood", RasterOverlay { width: 64, height: 64, data: [0, 0, 255, 200].repeat(64 * 64) }),
        ]);

        let out = renderer.render(&job).unwrap();
        assert_eq!(out.images.len(), 2);
        assert!(out.warnings.is_empty());
        let sheet = out.contact_sheet.unwrap();
        assert!(sheet.ends_with(CONTACT_SHEET_FILE));
        assert!(fs::read(&sheet).unwrap().starts_with(b"%PDF-"));

        let zoning = &out.images["zoning"];
        assert_eq!(
            zoning,
            &dir.path().join("0794-17-2843").join(job.request_id.to_string()).join("zoning.png")
        );
        let decoded = image::open(zoning).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn test_failed_layer_warning_carried_and_no_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let out = Renderer::new(dir.path())
            .render(&job(vec![features("zoning"), failed("flood")]))
            .unwrap();

        assert_eq!(out.images.keys().collect::<Vec<_>>(), vec!["zoning"]);
        assert!(out.contact_sheet.is_none());
        assert_eq!(out.warnings, vec!["Layer 'flood' failed: upstream returned HTTP 500".to_string()]);
    }

    #[test]
    fn test_corrupt_raster_becomes_warning() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = RasterOverlay { width: 64, height: 64, data: vec![0; 10] };
        let out = Renderer::new(dir.path())
            .render(&job(vec![features("zoning"), raster("aerial", corrupt), features("soils")]))
            .unwrap();

        assert_eq!(out.images.len(), 2);
        assert!(out.contact_sheet.is_some());
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].starts_with("Layer 'aerial' render failed:"), "{:?}", out.warnings);
    }

    #[test]
    fn test_nothing_written_when_all_failed() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(vec![failed("zoning")]);
        let renderer = Renderer::new(dir.path());
        let out = renderer.render(&job).unwrap();

        assert!(out.images.is_empty());
        assert!(out.contact_sheet.is_none());
        assert!(!renderer.output_dir(&job.parcel, job.request_id).exists());
    }

    #[test]
    fn test_wrong_size_basemap_falls_back_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job(vec![features("zoning")]);
        job.basemap = Some(RasterOverlay::transparent(8, 8));
        let out = Renderer::new(dir.path()).render(&job).unwrap();

        assert_eq!(out.images.len(), 1);
        assert!(out.warnings[0].starts_with("Basemap unavailable:"));
    }

    #[test]
    fn test_names_that_sanitize_alike_get_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(vec![
            features("flood zone"),
            raster("flood_zone", RasterOverlay { width: 64, height: 64, data: [0, 0, 255, 200].repeat(64 * 64) }),
        ]);
        let out = Renderer::new(dir.path()).render(&job).unwrap();

        let first = &out.images["flood zone"];
        let second = &out.images["flood_zone"];
        assert_ne!(first, second);
        assert!(first.ends_with("flood_zone.png"));
        assert!(second.ends_with("flood_zone_2.png"));
        assert_ne!(fs::read(first).unwrap(), fs::read(second).unwrap());
    }

    #[test]
    fn test_unwritable_output_root_becomes_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("not-a-dir");
        fs::write(&root, b"x").unwrap();

        let out = Renderer::new(&root)
            .render(&job(vec![features("zoning"), failed("flood")]))
            .unwrap();

        assert!(out.images.is_empty());
        assert!(out.contact_sheet.is_none());
        assert_eq!(out.warnings.len(), 2);
        assert!(out.warnings[0].starts_with("Layer 'zoning' render failed: write failed:"), "{:?}", out.warnings);
        assert_eq!(out.warnings[1], "Layer 'flood' failed: upstream returned HTTP 500");
    }

    #[test]
    fn test_image_carries_dpi() {
        let dir = tempfile::tempdir().unwrap();
        let out = Renderer::new(dir.path()).render(&job(vec![features("zoning")])).unwrap();
        let bytes = fs::read(&out.images["zoning"]).unwrap();
        let phys = bytes.windows(4).position(|w| w == b"pHYs").unwrap();
        let ppm = u32::from_be_bytes([bytes[phys + 4], bytes[phys + 5], bytes[phys + 6], bytes[phys + 7]]);
        assert_eq!(ppm, 5906);
    }
}
