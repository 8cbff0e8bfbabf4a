//! Per-request sequencing: resolve, fetch every layer, render, aggregate.

use chrono::Utc;
use http_cache::{CacheStats, CachedClient, DiskStore, HttpCache};
use metrics::counter;
use parcel_common::{
    BoundingBox, CanvasSpec, FetchResult, LayerSpec, Parcel, PipelineError, PipelineResult, RasterOverlay,
    RenderRequest, RenderResult,
};
use projection::{buffered_extent, fit_extent_to_canvas};
use renderer::{LayerInput, RenderJob, Renderer};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{fetch_basemap, FetchContext, LayerAdapter};
use crate::config::{Settings, SourceConfig, CANVAS_RANGE, DPI_RANGE};
use crate::resolver::ParcelResolver;

/// Lifecycle of one request. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Resolving,
    Fetching,
    Rendering,
    Complete,
    Failed,
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Resolving => "Resolving",
            RequestState::Fetching => "Fetching",
            RequestState::Rendering => "Rendering",
            RequestState::Complete => "Complete",
            RequestState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// A request with defaults applied and every layer looked up.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub request: RenderRequest,
    /// Requested layers in order, duplicates removed
    pub layers: Vec<LayerSpec>,
    pub buffer_feet: f64,
    pub canvas: CanvasSpec,
}

/// Everything gathered before rendering starts.
struct Gathered {
    parcel: Parcel,
    extent: BoundingBox,
    results: Vec<FetchResult>,
    basemap: Option<RasterOverlay>,
    warnings: Vec<String>,
}

enum Fetched {
    Layer(usize, FetchResult),
    Basemap(Result<RasterOverlay, String>),
}

pub struct RenderOrchestrator {
    config: Arc<SourceConfig>,
    settings: Settings,
    client: CachedClient,
    resolver: ParcelResolver,
    renderer: Renderer,
}

impl RenderOrchestrator {
    /// Load the source configuration and open the disk cache named by `settings`.
    pub async fn from_settings(settings: Settings) -> PipelineResult<Self> {
        let config = SourceConfig::load(&settings.config_path)?;
        let store = DiskStore::open(&settings.cache_dir)
            .await
            .map_err(|e| PipelineError::CacheError(format!("{}: {}", settings.cache_dir.display(), e)))?;
        let cache = Arc::new(HttpCache::new(Arc::new(store), config.cache.ttl()));
        Self::new(config, settings, cache)
    }

    pub fn new(config: SourceConfig, settings: Settings, cache: Arc<HttpCache>) -> PipelineResult<Self> {
        let client = CachedClient::new(cache, settings.http_timeout)
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        let resolver = ParcelResolver::new(client.clone(), &config.parcels, config.default_crs, &settings);
        let renderer = Renderer::new(settings.output_root.clone());
        Ok(Self {
            config: Arc::new(config),
            settings,
            client,
            resolver,
            renderer,
        })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache_stats(&self) -> Arc<CacheStats> {
        self.client.cache().stats()
    }

    /// Reject malformed requests before any network work.
    pub fn validate(&self, request: &RenderRequest) -> PipelineResult<ValidatedRequest> {
        if request.address().is_none() && request.apn().is_none() {
            return Err(PipelineError::InvalidRequest(
                "either address or apn is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut layers = Vec::new();
        for name in request.layers.iter().map(|l| l.trim()).filter(|l| !l.is_empty()) {
            if !seen.insert(name) {
                continue;
            }
            let spec = self
                .config
                .layer(name)
                .ok_or_else(|| PipelineError::LayerNotConfigured(name.to_string()))?;
            layers.push(spec.clone());
        }
        if layers.is_empty() {
            return Err(PipelineError::InvalidRequest("layers must not be empty".to_string()));
        }

        let buffer_feet = request.buffer_feet.unwrap_or(self.config.buffer_feet);
        if !(buffer_feet.is_finite() && buffer_feet >= 0.0) {
            return Err(PipelineError::InvalidRequest(format!(
                "buffer_feet must be a non-negative number, got {}",
                buffer_feet
            )));
        }

        let dpi = request.output_dpi.unwrap_or(self.config.map.dpi);
        if !DPI_RANGE.contains(&dpi) {
            return Err(PipelineError::InvalidRequest(format!(
                "output_dpi must be within {}..={}, got {}",
                DPI_RANGE.start(),
                DPI_RANGE.end(),
                dpi
            )));
        }
        let width = request.canvas_width_px.unwrap_or(self.config.map.width_px);
        let height = request.canvas_height_px.unwrap_or(self.config.map.height_px);
        if !CANVAS_RANGE.contains(&width) || !CANVAS_RANGE.contains(&height) {
            return Err(PipelineError::InvalidRequest(format!(
                "canvas {}x{} is outside {}..={} px",
                width,
                height,
                CANVAS_RANGE.start(),
                CANVAS_RANGE.end()
            )));
        }

        Ok(ValidatedRequest {
            request: request.clone(),
            layers,
            buffer_feet,
            canvas: CanvasSpec::new(width, height, dpi),
        })
    }

    /// Run one request to completion.
    ///
    /// Fails only on validation, resolution, geometry or timeout errors. Once
    /// the parcel is resolved, layer failures are reported as warnings.
    #[instrument(skip(self, request), fields(request_id = tracing::field::Empty))]
    pub async fn render(&self, request: RenderRequest) -> PipelineResult<RenderResult> {
        let request_id = Uuid::new_v4();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));
        counter!("render_requests_total").increment(1);

        let validated = self.validate(&request)?;
        let deadline = self.settings.request_timeout;

        let gathered = match tokio::time::timeout(deadline, self.gather(&validated, request_id)).await {
            Ok(Ok(gathered)) => gathered,
            Ok(Err(e)) => return Err(self.fail(request_id, e)),
            Err(_) => {
                let secs = deadline.as_secs_f64().ceil() as u64;
                return Err(self.fail(request_id, PipelineError::RequestTimeout(secs)));
            }
        };

        transition(request_id, RequestState::Rendering);
        let job = RenderJob {
            request_id,
            parcel: gathered.parcel.clone(),
            extent: gathered.extent,
            canvas: validated.canvas,
            basemap: gathered.basemap,
            layers: validated
                .layers
                .iter()
                .zip(gathered.results)
                .map(|(spec, result)| LayerInput {
                    result,
                    title: spec.display_title().to_string(),
                    style: spec.style.clone(),
                })
                .collect(),
            warnings: gathered.warnings,
        };

        let renderer = self.renderer.clone();
        let output = tokio::task::spawn_blocking(move || renderer.render(&job))
            .await
            .map_err(|e| self.fail(request_id, PipelineError::InternalError(format!("render task failed: {}", e))))?
            .map_err(|e| self.fail(request_id, PipelineError::RenderError(e.to_string())))?;

        transition(request_id, RequestState::Complete);
        counter!("render_requests_complete_total").increment(1);
        info!(
            request_id = %request_id,
            images = output.images.len(),
            warnings = output.warnings.len(),
            "Request complete"
        );

        Ok(RenderResult {
            request_id,
            parcel: gathered.parcel,
            extent: gathered.extent,
            canvas: validated.canvas,
            images: output.images,
            contact_sheet: output.contact_sheet,
            warnings: output.warnings,
            created_at: Utc::now(),
        })
    }

    fn fail(&self, request_id: Uuid, error: PipelineError) -> PipelineError {
        counter!("render_requests_failed_total").increment(1);
        warn!(request_id = %request_id, state = %RequestState::Failed, error = %error, "Request failed");
        error
    }

    /// Resolving and Fetching; the part covered by the request timeout.
    async fn gather(&self, validated: &ValidatedRequest, request_id: Uuid) -> PipelineResult<Gathered> {
        transition(request_id, RequestState::Resolving);
        let parcel = self.resolver.resolve(&validated.request).await?;

        let working_crs = parcel.crs;
        let buffered = buffered_extent(&parcel.geometry, validated.buffer_feet, working_crs)?;
        let extent = fit_extent_to_canvas(&buffered, validated.canvas.width_px, validated.canvas.height_px);
        info!(
            request_id = %request_id,
            crs = %working_crs,
            extent = %extent.to_xy_string(),
            "Map extent"
        );

        transition(request_id, RequestState::Fetching);
        let ctx = FetchContext {
            client: self.client.clone(),
            extent,
            working_crs,
            canvas: validated.canvas,
            arcgis_token: self.settings.arcgis_token.clone(),
        };
        let (results, basemap, warnings) = self.fetch_all(ctx, &validated.layers).await;

        Ok(Gathered {
            parcel,
            extent,
            results,
            basemap,
            warnings,
        })
    }

    /// Fan out one task per layer (plus the basemap) under the fetch
    /// semaphore and wait for all of them.
    ///
    /// Results come back in request order. Dropping this future, as the
    /// request timeout does, drops the `JoinSet` and aborts every task.
    async fn fetch_all(
        &self,
        ctx: FetchContext,
        layers: &[LayerSpec],
    ) -> (Vec<FetchResult>, Option<RasterOverlay>, Vec<String>) {
        let ctx = Arc::new(ctx);
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_fetches.max(1)));
        let mut set = JoinSet::new();

        for (index, spec) in layers.iter().cloned().enumerate() {
            let (ctx, semaphore) = (ctx.clone(), semaphore.clone());
            set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => LayerAdapter::for_kind(spec.adapter_kind).fetch(&spec, &ctx).await,
                    Err(_) => FetchResult::failed(&spec.name, "fetch scheduler closed"),
                };
                Fetched::Layer(index, result)
            });
        }

        if let Some(spec) = self.config.basemap.clone() {
            let (ctx, semaphore) = (ctx.clone(), semaphore.clone());
            set.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => fetch_basemap(&spec, &ctx).await.map_err(|e| e.to_string()),
                    Err(_) => Err("fetch scheduler closed".to_string()),
                };
                Fetched::Basemap(result)
            });
        }

        let mut slots: Vec<Option<FetchResult>> = layers.iter().map(|_| None).collect();
        let mut basemap = None;
        let mut warnings = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Fetched::Layer(index, result)) => slots[index] = Some(result),
                Ok(Fetched::Basemap(Ok(raster))) => basemap = Some(raster),
                Ok(Fetched::Basemap(Err(reason))) => {
                    warn!(error = %reason, "Basemap fetch failed");
                    warnings.push(format!("Basemap unavailable: {}", reason));
                }
                Err(e) => warn!(error = %e, "Fetch task did not finish"),
            }
        }

        let results = layers
            .iter()
            .zip(slots)
            .map(|(spec, slot)| slot.unwrap_or_else(|| FetchResult::failed(&spec.name, "fetch task aborted")))
            .collect();
        (results, basemap, warnings)
    }
}

fn transition(request_id: Uuid, state: RequestState) {
    info!(request_id = %request_id, state = %state, "State transition");
}
