//! Operation dispatcher: the public entry point of the pipeline
//!
//! A request moves through `Received → ImageLoaded → (ModelInvoked)? →
//! Composited → Persisted → Done`; any stage may end in `Failed`. Each request
//! owns its buffers and tensors exclusively. Model handles are borrowed from
//! the shared [`ModelRegistry`] for the duration of one inference.

use crate::codec::TensorCodec;
use crate::compositor::{Compositor, GeometryOutcome};
use crate::config::{EditorConfig, FallbackPolicy};
use crate::error::{PhotoOpsError, Result};
use crate::filters::FilterKind;
use crate::models::ModelKind;
use crate::registry::{ModelHandle, ModelLoadReport, ModelRegistry};
use crate::services::ImageIOService;
use crate::store::ResultStore;
use crate::types::{
    Color, FallbackKind, ImageBuffer, Mask, Operation, OperationMetadata, OperationResult,
    PipelineState, Point, Rect, ResizeFilter,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug_span, info_span};

// Use instant crate for cross-platform time compatibility
use instant::Instant;

/// Request parameter names understood by the dispatcher
pub mod params {
    pub const IMAGE_PATH: &str = "imagePath";
    pub const FILTER_TYPE: &str = "filterType";
    pub const BACKGROUND_COLOR: &str = "backgroundColor";
    pub const X: &str = "x";
    pub const Y: &str = "y";
    pub const RADIUS: &str = "radius";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
}

/// One named operation with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub operation: Operation,
    pub image_path: Option<String>,
    pub params: HashMap<String, String>,
}

impl OperationRequest {
    #[must_use]
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            image_path: None,
            params: HashMap::new(),
        }
    }

    /// Request for an operation given by name
    ///
    /// # Errors
    /// - `UnknownOperation` for names outside the supported set
    pub fn named(operation: &str) -> Result<Self> {
        Ok(Self::new(Operation::from_str(operation)?))
    }

    #[must_use]
    pub fn with_image<S: Into<String>>(mut self, path: S) -> Self {
        self.image_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_param<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The source image path, required by every image operation
    ///
    /// # Errors
    /// - `InvalidArgument` when missing or blank
    pub fn require_image_path(&self) -> Result<&str> {
        self.image_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| PhotoOpsError::invalid_argument("Image path is required."))
    }

    fn param<T: FromStr>(&self, key: &str) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        self.params
            .get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    PhotoOpsError::invalid_argument(format!(
                        "Parameter '{key}' has invalid value '{raw}': {e}"
                    ))
                })
            })
            .transpose()
    }
}

/// Typed view of the request parameters, parsed before any I/O
#[derive(Debug, Clone, PartialEq)]
struct EditParams {
    filter: FilterKind,
    background: Option<Color>,
    x: Option<i64>,
    y: Option<i64>,
    radius: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

impl EditParams {
    fn parse(request: &OperationRequest) -> Result<Self> {
        let filter = request
            .params
            .get(params::FILTER_TYPE)
            .map_or_else(|| FilterKind::Passthrough(String::new()), |name| FilterKind::parse(name));
        Ok(Self {
            filter,
            background: request.param(params::BACKGROUND_COLOR)?,
            x: request.param(params::X)?,
            y: request.param(params::Y)?,
            radius: request.param(params::RADIUS)?,
            width: request.param(params::WIDTH)?,
            height: request.param(params::HEIGHT)?,
        })
    }
}

/// Successful dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResponse {
    /// An image operation persisted its result
    Processed(OperationResult),
    /// `initializeModels` finished; per-model outcomes inside
    ModelsInitialized(ModelLoadReport),
}

impl OperationResponse {
    #[must_use]
    pub fn result(&self) -> Option<&OperationResult> {
        match self {
            Self::Processed(result) => Some(result),
            Self::ModelsInitialized(_) => None,
        }
    }
}

/// Source of placeholder coordinates
///
/// Injected into the dispatcher so placement is reproducible under test; the
/// compositor itself only ever receives explicit coordinates.
pub trait CoordinateSource: Send {
    /// A value in `[low, high)`, or `low` when the range is empty
    fn next_in(&mut self, low: i64, high: i64) -> i64;
}

/// `StdRng`-backed coordinates, OS seeded unless a seed is given
#[derive(Debug, Clone)]
pub struct RandomCoordinates {
    rng: StdRng,
}

impl RandomCoordinates {
    #[must_use]
    pub fn from_os() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl CoordinateSource for RandomCoordinates {
    fn next_in(&mut self, low: i64, high: i64) -> i64 {
        if high <= low {
            return low;
        }
        self.rng.random_range(low..high)
    }
}

/// Replays a fixed list of values in order, cycling; values are not range checked
#[derive(Debug, Clone)]
pub struct FixedCoordinates {
    values: Vec<i64>,
    cursor: usize,
}

impl FixedCoordinates {
    #[must_use]
    pub fn new(values: Vec<i64>) -> Self {
        Self { values, cursor: 0 }
    }
}

impl CoordinateSource for FixedCoordinates {
    fn next_in(&mut self, low: i64, _high: i64) -> i64 {
        if self.values.is_empty() {
            return low;
        }
        let value = self
            .values
            .get(self.cursor % self.values.len())
            .copied()
            .unwrap_or(low);
        self.cursor += 1;
        value
    }
}

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Per-request bookkeeping
struct RequestContext {
    id: u64,
    metadata: OperationMetadata,
    started: Instant,
}

impl RequestContext {
    fn new(operation: Operation) -> Self {
        Self {
            id: REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed),
            metadata: OperationMetadata::new(operation, (0, 0)),
            started: Instant::now(),
        }
    }

    fn advance(&mut self, state: PipelineState) {
        tracing::debug!(request_id = self.id, state = ?state, "pipeline state");
        self.metadata.states.push(state);
    }

    fn record_geometry(&mut self, outcome: &GeometryOutcome) {
        if let Some(warning) = outcome.warning() {
            tracing::warn!(request_id = self.id, "{}", warning);
            self.metadata.warnings.push(warning);
        }
    }
}

/// Maps operation requests onto registry, codec, compositor, and store calls
pub struct OperationDispatcher {
    config: EditorConfig,
    registry: Arc<ModelRegistry>,
    store: ResultStore,
    coordinates: Mutex<Box<dyn CoordinateSource>>,
}

impl std::fmt::Debug for OperationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDispatcher")
            .field("registry", &self.registry)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl OperationDispatcher {
    /// Create a dispatcher with OS-seeded placeholder coordinates
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: EditorConfig, registry: Arc<ModelRegistry>) -> Result<Self> {
        config.validate()?;
        let store = ResultStore::new(&config.output_dir, config.naming);
        Ok(Self {
            config,
            registry,
            store,
            coordinates: Mutex::new(Box::new(RandomCoordinates::from_os())),
        })
    }

    /// Replace the placeholder coordinate source
    #[must_use]
    pub fn with_coordinates<C: CoordinateSource + 'static>(mut self, source: C) -> Self {
        self.coordinates = Mutex::new(Box::new(source));
        self
    }

    #[must_use]
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Attempt to load every declared model; partial failure is reported, not raised
    pub fn initialize_models(&self) -> ModelLoadReport {
        let names = self.registry.model_names();
        self.registry.load_all(&names)
    }

    /// Run one request to completion on the calling thread
    ///
    /// # Errors
    /// - `InvalidArgument` for a missing image path or malformed parameters,
    ///   before any file is read
    /// - `DecodeFailed`, `ModelNotFound`, `ModelLoadFailed`, `SaveFailed`,
    ///   and processing failures from the individual stages
    pub fn dispatch(&self, request: &OperationRequest) -> Result<OperationResponse> {
        let mut ctx = RequestContext::new(request.operation);
        let span = info_span!(
            "operation",
            request_id = ctx.id,
            operation = %request.operation,
            image_path = request.image_path.as_deref().unwrap_or("")
        );
        let _guard = span.enter();

        if !request.operation.requires_image() {
            let report = self.initialize_models();
            tracing::info!(loaded = ?self.registry.loaded_models(), "models initialized");
            return Ok(OperationResponse::ModelsInitialized(report));
        }

        match self.run_pipeline(request, &mut ctx) {
            Ok(result) => {
                tracing::info!(
                    output = %result.output_path.display(),
                    total_ms = result.metadata.timings.total_ms,
                    fallback = ?result.metadata.fallback,
                    "operation complete"
                );
                Ok(OperationResponse::Processed(result))
            },
            Err(e) => {
                ctx.advance(PipelineState::Failed(e.code().to_string()));
                tracing::warn!(code = e.code(), error = %e, "operation failed");
                Err(e)
            },
        }
    }

    /// Run one request on tokio's blocking pool
    ///
    /// # Errors
    /// - Everything [`dispatch`](Self::dispatch) reports
    /// - `Internal` if the worker task panics
    pub async fn dispatch_async(
        self: Arc<Self>,
        request: OperationRequest,
    ) -> Result<OperationResponse> {
        tokio::task::spawn_blocking(move || self.dispatch(&request))
            .await
            .map_err(|e| PhotoOpsError::internal(format!("Operation worker failed: {e}")))?
    }

    fn run_pipeline(
        &self,
        request: &OperationRequest,
        ctx: &mut RequestContext,
    ) -> Result<OperationResult> {
        let image_path = request.require_image_path()?;
        let params = EditParams::parse(request)?;

        let decode_start = Instant::now();
        let image = ImageIOService::load_image(image_path)?;
        ctx.metadata.timings.decode_ms = decode_start.elapsed().as_millis() as u64;
        ctx.metadata.dimensions = image.dimensions();
        ctx.advance(PipelineState::ImageLoaded);

        let output = match request.operation {
            Operation::RemoveBackground => self.remove_background(&image, &params, ctx)?,
            Operation::ApplyFilter => self.apply_filter(&image, &params, ctx)?,
            Operation::AddObject => self.add_object(&image, &params, ctx)?,
            Operation::RemoveObject => self.remove_object(&image, &params, ctx)?,
            Operation::InitializeModels => {
                return Err(PhotoOpsError::internal(
                    "initializeModels has no image pipeline",
                ))
            },
        };
        ctx.advance(PipelineState::Composited);

        let persist_start = Instant::now();
        let output_path = {
            let _span = debug_span!("persist").entered();
            self.store.save(&output)?
        };
        ctx.metadata.timings.persist_ms = persist_start.elapsed().as_millis() as u64;
        ctx.advance(PipelineState::Persisted);

        ctx.metadata.timings.total_ms = ctx.started.elapsed().as_millis() as u64;
        ctx.metadata.completed_at = chrono::Utc::now();
        ctx.advance(PipelineState::Done);

        Ok(OperationResult {
            output_path,
            metadata: ctx.metadata.clone(),
        })
    }

    fn remove_background(
        &self,
        image: &ImageBuffer,
        params: &EditParams,
        ctx: &mut RequestContext,
    ) -> Result<ImageBuffer> {
        let handle = self.registry.load(ModelKind::Segmentation.name())?;
        let output = self.invoke(&handle, ctx, |spec| TensorCodec::encode(image, spec))?;

        let _span = debug_span!("compositing").entered();
        let compositing_start = Instant::now();
        let (width, height) = image.dimensions();
        let keep = TensorCodec::decode_mask(&output, width, height, &self.config.mask)?;
        let background = params.background.unwrap_or(self.config.background_color);
        let overlay = ImageBuffer::from_pixel(width, height, background);
        let result = Compositor::blend(image, &keep.inverted(), &overlay)?;
        ctx.metadata.timings.compositing_ms = compositing_start.elapsed().as_millis() as u64;

        log::debug!(
            "Foreground coverage {:.1}% for {}x{} image",
            keep.coverage() * 100.0,
            width,
            height
        );
        Ok(result)
    }

    fn apply_filter(
        &self,
        image: &ImageBuffer,
        params: &EditParams,
        ctx: &mut RequestContext,
    ) -> Result<ImageBuffer> {
        log::debug!("Applying filter {}", params.filter);
        if let Some(matrix) = params.filter.matrix() {
            return Ok(matrix.apply(image));
        }
        if !params.filter.requires_model() {
            if let FilterKind::Passthrough(name) = &params.filter {
                log::info!("Unknown filter type '{}', returning original image", name);
            }
            return Ok(image.clone());
        }

        let handle = self.registry.load(ModelKind::StyleTransfer.name())?;
        let output = self.invoke(&handle, ctx, |spec| TensorCodec::encode(image, spec))?;

        let _span = debug_span!("compositing").entered();
        let compositing_start = Instant::now();
        let styled = TensorCodec::decode_image(&output, &handle.descriptor().output)?;
        let (width, height) = image.dimensions();
        let styled = styled.resize(width, height, ResizeFilter::Bilinear);

        // Style transfer output is opaque; carry over the source alpha
        let pixels: Vec<u8> = styled
            .pixels()
            .chunks_exact(4)
            .zip(image.pixels().chunks_exact(4))
            .flat_map(|(s, o)| [s[0], s[1], s[2], o[3]])
            .collect();
        let result = ImageBuffer::new(width, height, pixels)?;
        ctx.metadata.timings.compositing_ms = compositing_start.elapsed().as_millis() as u64;
        Ok(result)
    }

    fn add_object(
        &self,
        image: &ImageBuffer,
        params: &EditParams,
        ctx: &mut RequestContext,
    ) -> Result<ImageBuffer> {
        let (width, height) = (i64::from(image.width()), i64::from(image.height()));
        let radius = params.radius.unwrap_or(self.config.fallback.marker_radius);
        let center = {
            let mut source = self.coordinate_source()?;
            Point::new(
                params
                    .x
                    .unwrap_or_else(|| source.next_in(width / 4, width * 3 / 4)),
                params
                    .y
                    .unwrap_or_else(|| source.next_in(height / 4, height * 3 / 4)),
            )
        };

        if let Some(handle) = self.inpainting_handle()? {
            return self.inpaint(image, &handle, Rect::around(center, radius), ctx);
        }

        log::warn!(
            "⚠️ No inpainting model loaded, drawing placeholder marker at ({}, {})",
            center.x,
            center.y
        );
        let style = self.config.fallback;
        let painted = Compositor::paint_marker(image, center, radius, style.marker_color);
        ctx.record_geometry(&painted.outcome);
        ctx.metadata.fallback = Some(FallbackKind::PlaceholderMarker);
        Ok(painted.image)
    }

    fn remove_object(
        &self,
        image: &ImageBuffer,
        params: &EditParams,
        ctx: &mut RequestContext,
    ) -> Result<ImageBuffer> {
        let (width, height) = (i64::from(image.width()), i64::from(image.height()));
        let (min_size, max_size) = self.config.fallback.region_size;
        let region = {
            let mut source = self.coordinate_source()?;
            let x = params.x.unwrap_or_else(|| source.next_in(0, width / 2));
            let y = params.y.unwrap_or_else(|| source.next_in(0, height / 2));
            let mut side = |given: Option<u32>| {
                given.unwrap_or_else(|| {
                    let size = source.next_in(i64::from(min_size), i64::from(max_size));
                    u32::try_from(size).unwrap_or(min_size)
                })
            };
            let w = side(params.width);
            let h = side(params.height);
            Rect::new(x, y, w, h)
        };

        if let Some(handle) = self.inpainting_handle()? {
            return self.inpaint(image, &handle, region, ctx);
        }

        log::warn!("⚠️ No inpainting model loaded, painting placeholder region {}", region);
        let style = self.config.fallback;
        let painted =
            Compositor::paint_region(image, &region, style.region_color, style.region_opacity);
        ctx.record_geometry(&painted.outcome);
        ctx.metadata.fallback = Some(FallbackKind::PlaceholderRegion);
        Ok(painted.image)
    }

    /// Loaded inpainting model, `None` when the placeholder path applies
    fn inpainting_handle(&self) -> Result<Option<Arc<ModelHandle>>> {
        let name = ModelKind::Inpainting.name();
        match (self.registry.get(name), self.config.fallback_policy) {
            (Some(handle), _) => Ok(Some(handle)),
            (None, FallbackPolicy::Placeholder) => Ok(None),
            (None, FallbackPolicy::Strict) => Err(PhotoOpsError::model_not_found(format!(
                "Model '{name}' is not loaded and placeholder fallback is disabled"
            ))),
        }
    }

    /// Generative fill of `region` using its surrounding context
    fn inpaint(
        &self,
        image: &ImageBuffer,
        handle: &ModelHandle,
        region: Rect,
        ctx: &mut RequestContext,
    ) -> Result<ImageBuffer> {
        let (width, height) = image.dimensions();
        let context = if region.is_empty() || region.clamp_to(width, height).is_none() {
            None
        } else {
            region
                .expand(self.config.inpaint_margin)
                .clamp_to(width, height)
        };
        let Some(context) = context else {
            ctx.record_geometry(&GeometryOutcome::Skipped(format!(
                "edit region {region} does not overlap {width}x{height} image"
            )));
            return Ok(image.clone());
        };

        let crop = image.crop(&context)?;
        let hole_rect = Rect::new(
            region.x.saturating_sub(context.x),
            region.y.saturating_sub(context.y),
            region.width,
            region.height,
        );
        let hole = Mask::from_rect(crop.width(), crop.height(), &hole_rect);

        let output = self.invoke(handle, ctx, |spec| {
            TensorCodec::encode_with_mask(&crop, &hole, spec)
        })?;

        let _span = debug_span!("compositing").entered();
        let compositing_start = Instant::now();
        let patch = TensorCodec::decode_image(&output, &handle.descriptor().output)?
            .resize(crop.width(), crop.height(), ResizeFilter::Bilinear);
        let filled = Compositor::blend(&crop, &hole, &patch)?;
        let pasted = Compositor::paste(image, &filled, Point::new(context.x, context.y));
        ctx.record_geometry(&pasted.outcome);
        ctx.metadata.timings.compositing_ms = compositing_start.elapsed().as_millis() as u64;
        Ok(pasted.image)
    }

    /// Encode, run, and time one inference on `handle`
    fn invoke<F>(
        &self,
        handle: &ModelHandle,
        ctx: &mut RequestContext,
        encode: F,
    ) -> Result<crate::types::Tensor>
    where
        F: FnOnce(&crate::models::TensorSpec) -> Result<crate::types::Tensor>,
    {
        let _span = debug_span!("inference", model = handle.name(), backend = handle.backend())
            .entered();

        let encode_start = Instant::now();
        let input = encode(&handle.descriptor().input)?;
        ctx.metadata.timings.preprocessing_ms = encode_start.elapsed().as_millis() as u64;

        let inference_start = Instant::now();
        let output = handle.run(&input)?;
        ctx.metadata.timings.inference_ms = inference_start.elapsed().as_millis() as u64;

        ctx.metadata.model = Some(handle.name().to_string());
        ctx.advance(PipelineState::ModelInvoked);
        Ok(output)
    }

    fn coordinate_source(&self) -> Result<std::sync::MutexGuard<'_, Box<dyn CoordinateSource>>> {
        self.coordinates
            .lock()
            .map_err(|_| PhotoOpsError::internal("coordinate source lock poisoned"))
    }
}
