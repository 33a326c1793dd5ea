//! Tile fetch layer.
//!
//! Drives viewer tile jobs against an [`OmeZarrTileSource`](crate::source::OmeZarrTileSource):
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Viewer (TileJob)              │
//! └────────────────────┬────────────────────┘
//!                      │ start_fetch / abort_fetch
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileFetcher                │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  TileRenderer   │  │
//! │  │  (rendered   │  │  (external,     │  │
//! │  │   bytes)     │  │   async)        │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ selection from state snapshot
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           OmeZarrTileSource             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileFetcher`]: start and abort tile jobs
//! - [`TileJob`]: dispatch key, finish callback and in-flight work of one tile
//! - [`TileRenderer`]: external renderer contract
//! - [`TileCache`]: LRU cache of rendered bytes keyed by tile identity

mod cache;
mod fetch;
mod job;
mod render;

pub use cache::{TileCache, TileCacheKey, DEFAULT_MAX_ENTRIES, DEFAULT_TILE_CACHE_CAPACITY};
pub use fetch::TileFetcher;
pub use job::{FinishCallback, TileJob, TileOutcome};
pub use render::{decode_tile, RenderRequest, TileDecoder, TileRenderer};
