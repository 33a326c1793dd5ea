use thiserror::Error;

/// Errors raised by a store backend while opening groups or arrays
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Node (group, array or archive) does not exist
    #[error("Node not found: {0}")]
    NotFound(String),

    /// Underlying read failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Group or array metadata could not be read or interpreted
    #[error("Failed to open {path}: {message}")]
    Open { path: String, message: String },

    /// The store location cannot be served by this opener
    #[error("Unsupported store: {0}")]
    Unsupported(String),
}

/// Errors resolving OME-Zarr metadata and building the pyramid
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// Store failure while opening the group or a level array
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Group attributes carry no `ome` namespace
    #[error("missing OME-Zarr metadata in attributes")]
    MissingOme,

    /// `ome` namespace carries no `multiscales` list
    #[error("missing multiscales metadata in OME-Zarr metadata")]
    MissingMultiscales,

    /// `multiscales` list is empty
    #[error("empty multiscales metadata in OME-Zarr metadata")]
    EmptyMultiscales,

    /// First multiscale entry does not match the expected shape
    #[error("invalid multiscale metadata: {message}")]
    InvalidMultiscale { message: String },

    /// Axis name outside {t, c, z, y, x}
    #[error("unsupported axis: {name}")]
    UnsupportedAxis { name: String },

    /// Either the x or the y axis is not declared
    #[error("missing X or Y axis")]
    MissingSpatialAxes,

    /// Multiscale declares no datasets
    #[error("multiscale declares no datasets")]
    NoDatasets,

    /// Array rank does not cover the declared axes
    #[error("array {path} has {actual} dimensions, expected at least {expected}")]
    DimensionMismatch {
        path: String,
        expected: usize,
        actual: usize,
    },

    /// Base array has no pixels along x or y
    #[error("base array {path} has an empty X or Y extent")]
    EmptyExtent { path: String },

    /// Chunk shape has a zero extent along x or y
    #[error("array {path} has a zero chunk extent along X or Y")]
    ZeroChunkExtent { path: String },
}

/// Synchronous failures of per-level geometry queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// Queried before metadata resolution succeeded (or after it failed)
    #[error("tile source not ready")]
    NotReady,

    /// Level outside `[0, max_level]`
    #[error("level out of bounds: {level} (max level is {max_level})")]
    LevelOutOfRange { level: usize, max_level: usize },

    /// Tile origin lies outside the level's extent
    #[error("tile ({x}, {y}) at level {level} is out of bounds (grid is {tiles_x}x{tiles_y})")]
    TileOutOfRange {
        level: usize,
        x: u64,
        y: u64,
        tiles_x: u64,
        tiles_y: u64,
    },
}

/// Failure reported by an external renderer
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Per-tile fetch failures
///
/// These never escape a fetch task; they are turned into a failed completion.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Dispatch key lacks a numeric `level`, `x` or `y`
    #[error("invalid tile dispatch key: {key}")]
    InvalidDispatchKey { key: String },

    /// Geometry precondition failed
    #[error("{0}")]
    Geometry(#[from] GeometryError),

    /// Renderer failed to produce pixels
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// Rendered bytes could not be decoded into an image
    #[error("failed to decode tile: {message}")]
    Decode { message: String },

    /// Cancellation was observed at a resumption point
    #[error("tile fetch aborted")]
    Aborted,
}

/// Descriptor shapes rejected during normalization
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported configuration: {reason}")]
    UnsupportedConfiguration { reason: String },
}

impl ConfigError {
    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        ConfigError::UnsupportedConfiguration {
            reason: reason.into(),
        }
    }
}
