//! Rendered tile cache.
//!
//! Keeps renderer output keyed by the tile identity key, so a tile that is
//! requested again (same source URL, level, coordinates and fixed selectors)
//! skips the renderer entirely. Decoding still happens per fetch.
//!
//! Capacity is bounded both by total byte size and by entry count; least
//! recently used entries are evicted first.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

/// Default cache capacity: 64MB
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries
pub const DEFAULT_MAX_ENTRIES: usize = 4_096;

// =============================================================================
// Cache Key
// =============================================================================

/// Cache key built from a tile identity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey(Arc<str>);

impl TileCacheKey {
    pub fn new(identity: impl Into<Arc<str>>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TileCacheKey {
    fn from(identity: String) -> Self {
        Self::new(identity)
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

struct CacheState {
    entries: LruCache<TileCacheKey, Bytes>,
    size: usize,
}

/// Size-bounded LRU cache of rendered tile bytes.
///
/// Shared across fetch tasks via `Arc`.
pub struct TileCache {
    state: Mutex<CacheState>,
    max_size: usize,
}

impl TileCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }

    /// Cache holding at most `max_size` bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Cache holding at most `max_size` bytes in at most `max_entries` entries.
    ///
    /// A zero entry limit is raised to one.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(max_entries),
                size: 0,
            }),
            max_size,
        }
    }

    /// Look up a tile and mark it recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        self.state.lock().await.entries.get(key).cloned()
    }

    /// Whether a tile is cached, without touching LRU order.
    pub async fn contains(&self, key: &TileCacheKey) -> bool {
        self.state.lock().await.entries.contains(key)
    }

    /// Store a tile, evicting least recently used entries over capacity.
    ///
    /// Tiles larger than the whole capacity are not stored.
    pub async fn put(&self, key: TileCacheKey, data: Bytes) {
        if data.len() > self.max_size {
            return;
        }

        let mut state = self.state.lock().await;
        let added = data.len();

        // `push` reports both a replaced value and an entry-count eviction
        if let Some((_, displaced)) = state.entries.push(key, data) {
            state.size = state.size.saturating_sub(displaced.len());
        }
        state.size += added;

        while state.size > self.max_size {
            match state.entries.pop_lru() {
                Some((_, evicted)) => state.size = state.size.saturating_sub(evicted.len()),
                None => break,
            }
        }
    }

    pub async fn remove(&self, key: &TileCacheKey) -> Option<Bytes> {
        let mut state = self.state.lock().await;
        let removed = state.entries.pop(key)?;
        state.size = state.size.saturating_sub(removed.len());
        Some(removed)
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.size = 0;
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Total cached bytes.
    pub async fn size(&self) -> usize {
        self.state.lock().await.size
    }

    /// Maximum total bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
