//! Store capability layer.
//!
//! The tile source never reads chunk bytes. It only needs to open a group,
//! read its attributes, and open one array per resolution level to learn its
//! shape and chunk shape. These capabilities are expressed as traits so any
//! Zarr implementation can back a tile source.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            OmeZarrTileSource            │
//! └────────────────────┬────────────────────┘
//!                      │ open_group(url, kind)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           StoreOpener Trait             │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │  MemoryStore    │    │  ZarrStoreOpener    │
//! │  (in-process)   │    │ (file / http, .ozx) │
//! └─────────────────┘    └─────────────────────┘
//! ```

mod memory;
mod zarr;

use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;

pub use memory::{MemoryArray, MemoryGroup, MemoryStore};
pub use zarr::{ZarrArray, ZarrStoreOpener};

/// URL suffix of a zipped OME-Zarr archive.
pub const ZIP_ARCHIVE_SUFFIX: &str = ".ozx";

// =============================================================================
// Capability Traits
// =============================================================================

/// One opened array at one resolution level.
pub trait ArrayHandle: Send + Sync + Debug {
    /// Path of this array relative to its group.
    fn path(&self) -> &str;

    /// Extent per axis.
    fn shape(&self) -> &[u64];

    /// Chunk extent per axis.
    fn chunk_shape(&self) -> &[u64];

    /// Concrete handle, for renderers that need their backend's array type.
    fn as_any(&self) -> &dyn Any;
}

/// An opened group.
#[async_trait]
pub trait StoreGroup: Send + Sync {
    /// Location this group was opened from (for logging).
    fn location(&self) -> &str;

    /// User attributes of the group.
    fn attrs(&self) -> &Map<String, Value>;

    /// Open the child array at `path`.
    async fn open_array(&self, path: &str) -> Result<Arc<dyn ArrayHandle>, StoreError>;
}

/// Opens the root group of a store.
#[async_trait]
pub trait StoreOpener: Send + Sync {
    async fn open_group(&self, url: &str, kind: StoreKind)
        -> Result<Arc<dyn StoreGroup>, StoreError>;
}

// =============================================================================
// Store Selection
// =============================================================================

/// How a store location is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// One object per key (directory or HTTP prefix).
    Hierarchy,
    /// Single zip archive.
    Zip,
}

impl StoreKind {
    /// Pick the store kind for a location.
    ///
    /// An explicit `zip` flag wins; otherwise the `.ozx` suffix selects the
    /// archive layout.
    pub fn select(url: &str, zip: Option<bool>) -> Self {
        match zip {
            Some(true) => StoreKind::Zip,
            Some(false) => StoreKind::Hierarchy,
            None if url.ends_with(ZIP_ARCHIVE_SUFFIX) => StoreKind::Zip,
            None => StoreKind::Hierarchy,
        }
    }
}

/// Join a child path onto a group-relative prefix.
pub(crate) fn join_key(prefix: &str, child: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let child = child.trim_start_matches("./").trim_matches('/');
    match (prefix.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, child),
    }
}
