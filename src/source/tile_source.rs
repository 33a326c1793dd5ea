//! The OME-Zarr tile source.
//!
//! Owns the source options and the resolved pyramid state, answers the
//! viewer's geometry queries, and builds dispatch and identity keys for tiles.
//!
//! # State
//!
//! The source is either [`SourceState::Unready`] or [`SourceState::Ready`].
//! Each metadata resolution attempt swaps in a whole new state snapshot and
//! emits exactly one [`SourceEvent`]. Readers clone the current snapshot, so
//! they never observe a partially populated source.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use url::{form_urlencoded, Url};

use crate::error::{GeometryError, MetadataError, TileError};
use crate::store::StoreOpener;

use super::geometry::{PyramidGeometry, TileRegion, TileSelection};
use super::metadata::{resolve, Multiscale, ResolvedMetadata};
use super::options::TileSourceOptions;

/// Placeholder dimensions reported while unready.
pub const UNREADY_DIMENSIONS: (u64, u64) = (10, 10);

const EVENT_CHANNEL_CAPACITY: usize = 16;

// =============================================================================
// Events and State
// =============================================================================

/// Lifecycle signal raised once per metadata resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// Geometry is populated
    Ready,
    /// Resolution failed; the source is unready
    OpenFailed { message: String, source: String },
}

/// Everything derived from a successful metadata resolution.
#[derive(Debug, Clone)]
pub struct ReadyState {
    multiscale: Multiscale,
    omero: Option<Value>,
    geometry: PyramidGeometry,
}

impl ReadyState {
    pub fn multiscale(&self) -> &Multiscale {
        &self.multiscale
    }

    /// Auxiliary rendering metadata, forwarded as-is to renderers.
    pub fn omero(&self) -> Option<&Value> {
        self.omero.as_ref()
    }

    pub fn geometry(&self) -> &PyramidGeometry {
        &self.geometry
    }
}

/// Resolution state of a tile source.
#[derive(Debug, Clone, Default)]
pub enum SourceState {
    #[default]
    Unready,
    Ready(ReadyState),
}

impl SourceState {
    pub fn ready(&self) -> Result<&ReadyState, GeometryError> {
        match self {
            SourceState::Ready(ready) => Ok(ready),
            SourceState::Unready => Err(GeometryError::NotReady),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SourceState::Ready(_))
    }
}

// =============================================================================
// Tile Coordinates
// =============================================================================

/// Viewer tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub level: usize,
    pub x: u64,
    pub y: u64,
}

impl TileCoord {
    pub fn new(level: usize, x: u64, y: u64) -> Self {
        Self { level, x, y }
    }

    /// Encode as a dispatch key: `level=L&x=X&y=Y`.
    pub fn to_dispatch_key(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .append_pair("level", &self.level.to_string())
            .append_pair("x", &self.x.to_string())
            .append_pair("y", &self.y.to_string())
            .finish()
    }

    /// Decode a dispatch key produced by [`TileCoord::to_dispatch_key`].
    pub fn from_dispatch_key(key: &str) -> Result<Self, TileError> {
        let invalid = || TileError::InvalidDispatchKey {
            key: key.to_string(),
        };

        let mut level = None;
        let mut x = None;
        let mut y = None;
        for (name, value) in form_urlencoded::parse(key.as_bytes()) {
            match name.as_ref() {
                "level" => level = Some(value.parse::<usize>().map_err(|_| invalid())?),
                "x" => x = Some(value.parse::<u64>().map_err(|_| invalid())?),
                "y" => y = Some(value.parse::<u64>().map_err(|_| invalid())?),
                _ => {}
            }
        }

        match (level, x, y) {
            (Some(level), Some(x), Some(y)) => Ok(Self { level, x, y }),
            _ => Err(invalid()),
        }
    }
}

// =============================================================================
// Tile Source
// =============================================================================

/// A deep zoom tile source backed by an OME-Zarr multiscale image.
///
/// # Example
///
/// ```ignore
/// use omezarr_tiles::source::{OmeZarrTileSource, SourceEvent, TileSourceOptions};
/// use omezarr_tiles::store::ZarrStoreOpener;
///
/// let options = TileSourceOptions::new("/data/image.ome.zarr");
/// let (source, mut events) = OmeZarrTileSource::open(options, Arc::new(ZarrStoreOpener::new()));
///
/// if events.recv().await? == SourceEvent::Ready {
///     println!("{} levels", source.max_level() + 1);
/// }
/// ```
pub struct OmeZarrTileSource {
    options: TileSourceOptions,
    opener: Arc<dyn StoreOpener>,
    state: RwLock<Arc<SourceState>>,
    events: broadcast::Sender<SourceEvent>,
}

impl OmeZarrTileSource {
    /// Create an unready source. Call [`Self::get_image_info`] to resolve it.
    pub fn new(options: TileSourceOptions, opener: Arc<dyn StoreOpener>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            options,
            opener,
            state: RwLock::new(Arc::new(SourceState::Unready)),
            events,
        }
    }

    /// Create a source and start resolving its metadata in the background.
    ///
    /// The returned receiver is subscribed before resolution starts, so it
    /// always observes the resulting event.
    pub fn open(
        options: TileSourceOptions,
        opener: Arc<dyn StoreOpener>,
    ) -> (Arc<Self>, broadcast::Receiver<SourceEvent>) {
        let source = Arc::new(Self::new(options, opener));
        let events = source.subscribe();
        source.spawn_image_info();
        (source, events)
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.events.subscribe()
    }

    /// Run [`Self::get_image_info`] on a background task.
    pub fn spawn_image_info(self: &Arc<Self>) -> JoinHandle<()> {
        let source = Arc::clone(self);
        tokio::spawn(async move {
            // Failures are reported through the event channel
            let _ = source.get_image_info().await;
        })
    }

    /// Resolve metadata and geometry, replacing the current state.
    ///
    /// Emits [`SourceEvent::Ready`] on success. On failure the source reverts
    /// to unready and emits [`SourceEvent::OpenFailed`]; the error is also
    /// returned to the direct caller.
    pub async fn get_image_info(&self) -> Result<(), MetadataError> {
        let url = &self.options.url;
        debug!("getting image info for {}", url);

        match self.resolve_ready_state().await {
            Ok(ready) => {
                info!(
                    "ready for {}: {}x{} pixels, {} levels",
                    url,
                    ready.geometry.width(),
                    ready.geometry.height(),
                    ready.geometry.max_level() + 1
                );
                self.replace_state(SourceState::Ready(ready));
                let _ = self.events.send(SourceEvent::Ready);
                Ok(())
            }
            Err(e) => {
                self.replace_state(SourceState::Unready);
                let message = format!("failed to get image info for {}: {}", url, e);
                error!("{}", message);
                let _ = self.events.send(SourceEvent::OpenFailed {
                    message,
                    source: url.clone(),
                });
                Err(e)
            }
        }
    }

    async fn resolve_ready_state(&self) -> Result<ReadyState, MetadataError> {
        let url = &self.options.url;
        let group = self
            .opener
            .open_group(url, self.options.store_kind())
            .await?;
        debug!("opened group for {}", url);

        let ResolvedMetadata {
            multiscale,
            omero,
            axes,
        } = resolve(group.as_ref())?;
        let geometry = PyramidGeometry::build(group.as_ref(), &multiscale, axes).await?;

        Ok(ReadyState {
            multiscale,
            omero,
            geometry,
        })
    }

    fn replace_state(&self, state: SourceState) {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(state);
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> Arc<SourceState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // =========================================================================
    // Source Properties
    // =========================================================================

    pub fn options(&self) -> &TileSourceOptions {
        &self.options
    }

    pub fn url(&self) -> &str {
        &self.options.url
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Width over height of the full-resolution image (1 while unready).
    pub fn aspect_ratio(&self) -> f64 {
        match self.state().as_ref() {
            SourceState::Ready(ready) => ready.geometry.aspect_ratio(),
            SourceState::Unready => 1.0,
        }
    }

    /// Full-resolution `(width, height)` (placeholder while unready).
    pub fn dimensions(&self) -> (u64, u64) {
        match self.state().as_ref() {
            SourceState::Ready(ready) => (ready.geometry.width(), ready.geometry.height()),
            SourceState::Unready => UNREADY_DIMENSIONS,
        }
    }

    /// Highest viewer level (0 while unready).
    pub fn max_level(&self) -> usize {
        match self.state().as_ref() {
            SourceState::Ready(ready) => ready.geometry.max_level(),
            SourceState::Unready => 0,
        }
    }

    // =========================================================================
    // Geometry Queries
    // =========================================================================

    pub fn tile_width(&self, level: usize) -> Result<u64, GeometryError> {
        self.state().ready()?.geometry.tile_width(level)
    }

    pub fn tile_height(&self, level: usize) -> Result<u64, GeometryError> {
        self.state().ready()?.geometry.tile_height(level)
    }

    pub fn level_scale(&self, level: usize) -> Result<f64, GeometryError> {
        self.state().ready()?.geometry.level_scale(level)
    }

    /// Renderer selection for a tile: clamped pixel ranges plus the fixed
    /// `z`, `c` and `t` selectors of this source.
    pub fn tile_selection(&self, coord: TileCoord) -> Result<TileSelection, GeometryError> {
        let state = self.state();
        let region = state
            .ready()?
            .geometry
            .tile_region(coord.level, coord.x, coord.y)?;
        Ok(self.selection_for(region))
    }

    pub(crate) fn selection_for(&self, region: TileRegion) -> TileSelection {
        TileSelection {
            x: region.x,
            y: region.y,
            z: self.options.z,
            c: self.options.c,
            t: self.options.t,
        }
    }

    // =========================================================================
    // Tile Keys
    // =========================================================================

    /// Dispatch key for a tile; only carries `level`, `x` and `y`.
    pub fn tile_url(&self, level: usize, x: u64, y: u64) -> String {
        TileCoord::new(level, x, y).to_dispatch_key()
    }

    /// Identity key for a tile, stable across fetches.
    ///
    /// The source URL with `level`, `x`, `y` and then whichever of `z`, `c`,
    /// `t` are fixed appended as query parameters.
    pub fn tile_hash_key(&self, level: usize, x: u64, y: u64) -> String {
        let mut params = vec![
            ("level", level.to_string()),
            ("x", x.to_string()),
            ("y", y.to_string()),
        ];
        let fixed = [
            ("z", self.options.z),
            ("c", self.options.c),
            ("t", self.options.t),
        ];
        params.extend(
            fixed
                .into_iter()
                .filter_map(|(name, value)| value.map(|v| (name, v.to_string()))),
        );

        match Url::parse(&self.options.url) {
            Ok(mut url) => {
                url.query_pairs_mut().extend_pairs(params);
                url.to_string()
            }
            // Bare paths: append the query textually
            Err(_) => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params)
                    .finish();
                let separator = if self.options.url.contains('?') { '&' } else { '?' };
                format!("{}{}{}", self.options.url, separator, query)
            }
        }
    }
}

impl PartialEq for OmeZarrTileSource {
    fn eq(&self, other: &Self) -> bool {
        self.options == other.options
    }
}

// =============================================================================
// Tests
// =============================================================================
