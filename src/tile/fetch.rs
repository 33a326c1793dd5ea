//! Tile fetch controller.
//!
//! Turns a [`TileJob`] into exactly one completion: parse the dispatch key,
//! compute the clamped selection from a single state snapshot, render (or hit
//! the cache), decode, and finish. Aborted jobs never complete.
//!
//! # Pipeline
//!
//! ```text
//! start_fetch(job)
//!   │  parse key, snapshot state, build selection   (sync; failures finish the job)
//!   ▼
//! tokio task ── select! ── cancel.cancelled() ──▶ suppressed
//!   │
//!   ├─ cache hit? ──────────────┐
//!   ├─ renderer.render(...) ────┤
//!   │                           ▼
//!   └─ spawn_blocking(decode_tile) ──▶ job.finish(Loaded | Failed)
//!                    │
//!                    └─ decoded? ──▶ cache.put(rendered bytes)
//! ```

use std::sync::Arc;

use bytes::Bytes;
use image::DynamicImage;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{GeometryError, TileError};
use crate::source::{OmeZarrTileSource, TileCoord};

use super::cache::{TileCache, TileCacheKey};
use super::job::{TileJob, TileOutcome};
use super::render::{decode_tile, RenderRequest, TileDecoder, TileRenderer};

/// Drives tile jobs for one tile source.
pub struct TileFetcher {
    source: Arc<OmeZarrTileSource>,
    renderer: Arc<dyn TileRenderer>,
    decoder: TileDecoder,
    cache: Option<Arc<TileCache>>,
}

impl TileFetcher {
    pub fn new(source: Arc<OmeZarrTileSource>, renderer: Arc<dyn TileRenderer>) -> Self {
        Self {
            source,
            renderer,
            decoder: Arc::new(decode_tile),
            cache: None,
        }
    }

    /// Replace the PNG/JPEG decoder.
    pub fn with_decoder(mut self, decoder: TileDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Reuse rendered bytes across fetches of the same tile.
    pub fn with_cache(mut self, cache: Arc<TileCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn source(&self) -> &Arc<OmeZarrTileSource> {
        &self.source
    }

    pub fn cache(&self) -> Option<&Arc<TileCache>> {
        self.cache.as_ref()
    }

    /// Start fetching a tile.
    ///
    /// Precondition failures complete the job immediately and return `None`.
    /// Otherwise the fetch runs on a spawned task whose handle is returned.
    /// Must be called from within a tokio runtime.
    pub fn start_fetch(&self, job: Arc<TileJob>) -> Option<JoinHandle<()>> {
        let coord = match TileCoord::from_dispatch_key(job.src()) {
            Ok(coord) => coord,
            Err(e) => {
                let message = format!("failed to download tile for {}: {}", job.src(), e);
                warn!("{}", message);
                job.finish(TileOutcome::Failed(message));
                return None;
            }
        };

        let request = match self.render_request(coord) {
            Ok(request) => request,
            Err(e) => {
                let message = format!(
                    "failed to download tile for level={}, x={}, y={}: {}",
                    coord.level, coord.x, coord.y, e
                );
                error!("{}", message);
                job.finish(TileOutcome::Failed(message));
                return None;
            }
        };

        debug!(
            "downloading tile for level={}, x={}, y={} from dataset {}",
            coord.level,
            coord.x,
            coord.y,
            request.array.path()
        );

        let cached = self.cache.clone().map(|cache| {
            let key = TileCacheKey::from(self.source.tile_hash_key(coord.level, coord.x, coord.y));
            (cache, key)
        });
        let renderer = Arc::clone(&self.renderer);
        let decoder = Arc::clone(&self.decoder);
        let cancel = job.begin();

        Some(tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TileError::Aborted),
                result = render_and_decode(
                    &job,
                    renderer.as_ref(),
                    decoder,
                    cached,
                    &request,
                    &cancel,
                ) => result,
            };

            if cancel.is_cancelled() {
                debug!(
                    "aborted tile rendering for level={}, x={}, y={}",
                    coord.level, coord.x, coord.y
                );
                return;
            }

            match result {
                Ok(image) => {
                    debug!(
                        "loaded tile for level={}, x={}, y={}",
                        coord.level, coord.x, coord.y
                    );
                    job.finish(TileOutcome::Loaded(image));
                }
                Err(e) => {
                    let message = format!(
                        "failed to render tile for level={}, x={}, y={}: {}",
                        coord.level, coord.x, coord.y, e
                    );
                    error!("{}", message);
                    job.finish(TileOutcome::Failed(message));
                }
            }
        }))
    }

    /// Abort a tile job. Idempotent; a no-op on finished jobs.
    pub fn abort_fetch(&self, job: &TileJob) {
        debug!("aborting tile {}", job.src());
        job.abort();
    }

    /// Build the renderer input from one state snapshot.
    fn render_request(&self, coord: TileCoord) -> Result<RenderRequest, GeometryError> {
        let state = self.source.state();
        let ready = state.ready()?;
        let geometry = ready.geometry();

        let region = geometry.tile_region(coord.level, coord.x, coord.y)?;
        let array = Arc::clone(geometry.array(coord.level)?);

        Ok(RenderRequest {
            array,
            axes: ready.multiscale().axes.clone(),
            omero: ready.omero().cloned(),
            selection: self.source.selection_for(region),
        })
    }
}

async fn render_and_decode(
    job: &TileJob,
    renderer: &dyn TileRenderer,
    decoder: TileDecoder,
    cached: Option<(Arc<TileCache>, TileCacheKey)>,
    request: &RenderRequest,
    cancel: &CancellationToken,
) -> Result<DynamicImage, TileError> {
    let hit = match &cached {
        Some((cache, key)) => cache.get(key).await,
        None => None,
    };
    let (bytes, fresh) = match hit {
        Some(bytes) => (bytes, false),
        None => (render(renderer, request, cancel).await?, true),
    };

    if cancel.is_cancelled() {
        return Err(TileError::Aborted);
    }

    let input = bytes.clone();
    let decode = tokio::task::spawn_blocking(move || decoder(&input));
    job.set_pending_decode(decode.abort_handle());

    let image = match decode.await {
        Ok(result) => result?,
        Err(e) if e.is_cancelled() => return Err(TileError::Aborted),
        Err(e) => {
            return Err(TileError::Decode {
                message: e.to_string(),
            })
        }
    };

    if cancel.is_cancelled() {
        return Err(TileError::Aborted);
    }

    // Cache only bytes that decoded
    match cached {
        Some((cache, key)) if fresh => cache.put(key, bytes).await,
        Some((_, key)) => debug!("tile cache hit for {}", key.as_str()),
        None => {}
    }
    Ok(image)
}

async fn render(
    renderer: &dyn TileRenderer,
    request: &RenderRequest,
    cancel: &CancellationToken,
) -> Result<Bytes, TileError> {
    let bytes = renderer.render(request, cancel).await?;
    if cancel.is_cancelled() {
        return Err(TileError::Aborted);
    }
    debug!("rendered {} bytes from {}", bytes.len(), request.array.path());
    Ok(bytes)
}
