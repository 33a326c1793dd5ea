//! OME-Zarr tile source.
//!
//! This module turns an OME-Zarr multiscale group into the geometry a deep
//! zoom viewer asks for.
//!
//! # Components
//!
//! - [`options`]: descriptor probe and normalization into [`TileSourceOptions`]
//! - [`metadata`]: multiscale and axis resolution from group attributes
//! - [`geometry`]: level inversion, tile sizes, level scales and tile regions
//! - [`tile_source`]: the [`OmeZarrTileSource`] state machine and tile keys
//!
//! # Level Numbering
//!
//! ```text
//! datasets (declared)      viewer level
//! ───────────────────      ────────────
//! array 0  (finest)   ──▶  max_level
//! array 1             ──▶  max_level - 1
//!   ...                      ...
//! array N  (coarsest) ──▶  0
//! ```

pub mod geometry;
pub mod metadata;
pub mod options;
pub mod tile_source;

pub use geometry::{PixelRange, PyramidGeometry, TileRegion, TileSelection};
pub use metadata::{resolve, Axis, AxisIndices, Dataset, Multiscale, ResolvedMetadata};
pub use options::{configure, supports, Descriptor, TileSourceOptions, OME_ZARR_TYPE};
pub use tile_source::{
    OmeZarrTileSource, ReadyState, SourceEvent, SourceState, TileCoord, UNREADY_DIMENSIONS,
};
