//! # omezarr-tiles
//!
//! Drive an OME-Zarr multiscale image as a deep zoom tile pyramid.
//!
//! This library maps viewer tile requests `(level, x, y)` onto regions of a
//! chunked multiscale array store, hands those regions to an external
//! renderer, and reports pyramid geometry (dimensions, tile size, level count,
//! level scale) derived from the store's own chunking metadata.
//!
//! ## Features
//!
//! - **Metadata resolution**: first multiscale of the `ome` attribute namespace, axis mapping for t/c/z/y/x
//! - **Pyramid geometry**: inverted level numbering, chunk-sized tiles, clamped edge tiles
//! - **Cancellable fetches**: one cancellation token per tile job, exactly one completion
//! - **Store backends**: in-memory, or `zarrs` over local paths and HTTP, as directories or `.ozx` zip archives
//! - **Tile cache**: LRU of rendered tile bytes keyed by tile identity
//!
//! ## Architecture
//!
//! - [`store`] - Store capability traits and backends
//! - [`source`] - Descriptors, metadata resolution, geometry and the tile source
//! - [`tile`] - Tile jobs, fetch controller, renderer contract and cache
//! - [`config`] - CLI configuration for the inspector binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use omezarr_tiles::{OmeZarrTileSource, SourceEvent, TileSourceOptions, ZarrStoreOpener};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = TileSourceOptions::new("/data/image.ome.zarr");
//!     let opener = Arc::new(ZarrStoreOpener::new());
//!     let (source, mut events) = OmeZarrTileSource::open(options, opener);
//!
//!     if let Ok(SourceEvent::Ready) = events.recv().await {
//!         let (width, height) = source.dimensions();
//!         println!("{}x{} pixels, {} levels", width, height, source.max_level() + 1);
//!     }
//! }
//! ```

pub mod config;
pub mod error;
pub mod source;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::Config;
pub use error::{ConfigError, GeometryError, MetadataError, RenderError, StoreError, TileError};
pub use source::{
    configure, supports, Axis, AxisIndices, Descriptor, Multiscale, OmeZarrTileSource,
    PixelRange, PyramidGeometry, SourceEvent, SourceState, TileCoord, TileSelection,
    TileSourceOptions,
};
pub use store::{
    ArrayHandle, MemoryArray, MemoryGroup, MemoryStore, StoreGroup, StoreKind, StoreOpener,
    ZarrArray, ZarrStoreOpener,
};
pub use tile::{
    decode_tile, RenderRequest, TileCache, TileCacheKey, TileDecoder, TileFetcher, TileJob,
    TileOutcome, TileRenderer,
};
