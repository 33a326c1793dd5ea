//! Zarr store backend.
//!
//! Opens groups and arrays through `zarrs`, which understands Zarr v3
//! `zarr.json` and Zarr v2 `.zgroup`/`.zattrs`/`.zarray` metadata and the
//! full codec chain (sharding included). Only metadata is read here; chunk
//! bytes are left to renderers, which can reach the opened `zarrs` array
//! through [`ZarrArray::array`].
//!
//! Locations are plain paths, `file://` URLs or `http(s)://` URLs. Either can
//! point at a directory-style hierarchy or at a zipped `.ozx` archive.
//!
//! All `zarrs` stores are synchronous, so every store access runs on a
//! blocking thread.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;
use zarrs::array::{Array, ArrayShardedExt};
use zarrs::group::Group;
use zarrs::storage::{ReadableStorage, ReadableStorageTraits, StoreKey};
use zarrs_filesystem::FilesystemStore;
use zarrs_http::HTTPStore;
use zarrs_zip::ZipStorageAdapter;

use crate::error::StoreError;

use super::{join_key, ArrayHandle, StoreGroup, StoreKind, StoreOpener};

// =============================================================================
// Locations
// =============================================================================

/// Where a store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreLocation {
    Local(PathBuf),
    Remote(Url),
}

impl StoreLocation {
    /// Classify a location by URL scheme. Anything that is not a URL is a path.
    fn parse(url: &str) -> Result<Self, StoreError> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .map(StoreLocation::Local)
                .map_err(|_| StoreError::Unsupported(format!("invalid file URL: {}", url))),
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                Ok(StoreLocation::Remote(parsed))
            }
            Ok(parsed) if parsed.scheme().len() > 1 => Err(StoreError::Unsupported(format!(
                "{} URLs are not supported: {}",
                parsed.scheme(),
                url
            ))),
            // Bare paths (and Windows drive letters) are taken as-is
            _ => Ok(StoreLocation::Local(PathBuf::from(url))),
        }
    }
}

/// Split an archive URL into the URL of its parent and the archive name.
fn split_archive_url(url: &Url) -> Result<(String, String), StoreError> {
    let unsupported = || StoreError::Unsupported(format!("no archive name in {}", url));

    let name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .ok_or_else(unsupported)?
        .to_string();

    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);
    base.path_segments_mut().map_err(|_| unsupported())?.pop();

    Ok((base.as_str().trim_end_matches('/').to_string(), name))
}

/// Split a local archive path into its directory and file name.
fn split_archive_path(path: &Path) -> Result<(PathBuf, String), StoreError> {
    let unsupported = || StoreError::Unsupported(format!("no archive name in {}", path.display()));

    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(unsupported)?
        .to_string();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((parent, name))
}

// =============================================================================
// Storage Construction
// =============================================================================

fn io_error(location: &str, e: impl fmt::Display) -> StoreError {
    StoreError::Io(format!("{}: {}", location, e))
}

fn open_error(path: &str, e: impl fmt::Display) -> StoreError {
    StoreError::Open {
        path: path.to_string(),
        message: e.to_string(),
    }
}

/// Wrap `storage` so that `name` is read as a zip archive.
fn zip_storage(
    storage: ReadableStorage,
    name: &str,
    url: &str,
) -> Result<ReadableStorage, StoreError> {
    let key = StoreKey::new(name).map_err(|e| open_error(url, e))?;
    let adapter = ZipStorageAdapter::new(storage, key).map_err(|e| open_error(url, e))?;
    Ok(Arc::new(adapter))
}

/// Build the storage for a location. Blocking.
fn open_storage(
    url: &str,
    location: &StoreLocation,
    kind: StoreKind,
) -> Result<ReadableStorage, StoreError> {
    match location {
        StoreLocation::Local(path) => {
            let metadata = std::fs::metadata(path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StoreError::NotFound(url.to_string())
                } else {
                    io_error(url, e)
                }
            })?;

            match kind {
                StoreKind::Hierarchy => {
                    if !metadata.is_dir() {
                        return Err(StoreError::Unsupported(format!(
                            "{} is not a directory",
                            url
                        )));
                    }
                    let store = FilesystemStore::new(path).map_err(|e| io_error(url, e))?;
                    Ok(Arc::new(store))
                }
                StoreKind::Zip => {
                    if !metadata.is_file() {
                        return Err(StoreError::Unsupported(format!("{} is not a file", url)));
                    }
                    let (parent, name) = split_archive_path(path)?;
                    let store = FilesystemStore::new(&parent).map_err(|e| io_error(url, e))?;
                    zip_storage(Arc::new(store), &name, url)
                }
            }
        }
        StoreLocation::Remote(remote) => match kind {
            StoreKind::Hierarchy => {
                let store = HTTPStore::new(remote.as_str().trim_end_matches('/'))
                    .map_err(|e| open_error(url, e))?;
                Ok(Arc::new(store))
            }
            StoreKind::Zip => {
                let (parent, name) = split_archive_url(remote)?;
                let store = HTTPStore::new(&parent).map_err(|e| open_error(url, e))?;
                zip_storage(Arc::new(store), &name, url)
            }
        },
    }
}

/// Absolute `zarrs` node path of a group-relative path.
fn node_path(path: &str) -> String {
    format!("/{}", path)
}

/// Shape of the smallest independently readable region of `array`.
///
/// For sharded arrays this is the inner chunk shape as seen through any
/// array-to-array codecs preceding the sharding codec.
fn read_chunk_shape(
    array: &Array<dyn ReadableStorageTraits>,
    path: &str,
) -> Result<Vec<u64>, StoreError> {
    if let Some(inner) = array.effective_inner_chunk_shape() {
        return Ok(inner.iter().map(|&extent| u64::from(extent)).collect());
    }
    let origin = vec![0; array.dimensionality()];
    let chunk = array.chunk_shape(&origin).map_err(|e| open_error(path, e))?;
    Ok(chunk.iter().map(|&extent| u64::from(extent)).collect())
}

// =============================================================================
// Array and Group Handles
// =============================================================================

/// Array opened through `zarrs`.
pub struct ZarrArray {
    location: String,
    path: String,
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
    array: Arc<Array<dyn ReadableStorageTraits>>,
}

impl ZarrArray {
    /// Location of the store this array belongs to.
    pub fn store_location(&self) -> &str {
        &self.location
    }

    /// The opened `zarrs` array, for reading pixels.
    ///
    /// Its store is synchronous; read from a blocking thread.
    pub fn array(&self) -> &Arc<Array<dyn ReadableStorageTraits>> {
        &self.array
    }
}

impl fmt::Debug for ZarrArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZarrArray")
            .field("location", &self.location)
            .field("path", &self.path)
            .field("shape", &self.shape)
            .field("chunk_shape", &self.chunk_shape)
            .finish()
    }
}

impl ArrayHandle for ZarrArray {
    fn path(&self) -> &str {
        &self.path
    }

    fn shape(&self) -> &[u64] {
        &self.shape
    }

    fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct ZarrGroup {
    location: String,
    storage: ReadableStorage,
    attrs: Map<String, Value>,
}

#[async_trait]
impl StoreGroup for ZarrGroup {
    fn location(&self) -> &str {
        &self.location
    }

    fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    async fn open_array(&self, path: &str) -> Result<Arc<dyn ArrayHandle>, StoreError> {
        let path = join_key("", path);
        let location = join_key(&self.location, &path);

        let storage = Arc::clone(&self.storage);
        let node = node_path(&path);
        let opened = location.clone();
        let (array, chunk_shape) = tokio::task::spawn_blocking(move || {
            let array = Array::open(storage, &node).map_err(|e| open_error(&opened, e))?;
            let chunk_shape = read_chunk_shape(&array, &opened)?;
            Ok::<_, StoreError>((array, chunk_shape))
        })
        .await
        .map_err(|e| io_error(&location, e))??;

        let shape = array.shape().to_vec();
        debug!(
            "opened array {} with shape {:?} and chunks {:?}",
            location, shape, chunk_shape
        );

        Ok(Arc::new(ZarrArray {
            location: self.location.clone(),
            path,
            shape,
            chunk_shape,
            array: Arc::new(array),
        }))
    }
}

// =============================================================================
// Opener
// =============================================================================

/// Opens OME-Zarr stores from the local filesystem or over HTTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZarrStoreOpener;

impl ZarrStoreOpener {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoreOpener for ZarrStoreOpener {
    async fn open_group(
        &self,
        url: &str,
        kind: StoreKind,
    ) -> Result<Arc<dyn StoreGroup>, StoreError> {
        let location = StoreLocation::parse(url)?;
        let owned = url.to_string();

        let (storage, attrs) = tokio::task::spawn_blocking(move || {
            let storage = open_storage(&owned, &location, kind)?;
            let group = Group::open(Arc::clone(&storage), &node_path(""))
                .map_err(|e| open_error(&owned, e))?;
            Ok::<_, StoreError>((storage, group.attributes().clone()))
        })
        .await
        .map_err(|e| io_error(url, e))??;

        debug!("opened {:?} group at {}", kind, url);
        Ok(Arc::new(ZarrGroup {
            location: url.to_string(),
            storage,
            attrs,
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================
