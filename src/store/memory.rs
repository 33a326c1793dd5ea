//! In-process store backend.
//!
//! Holds group attributes and array geometry in memory. Useful for embedding
//! a pyramid whose metadata is already known, and for tests.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StoreError;

use super::{join_key, ArrayHandle, StoreGroup, StoreKind, StoreOpener};

/// Array geometry held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryArray {
    path: String,
    shape: Vec<u64>,
    chunk_shape: Vec<u64>,
}

impl MemoryArray {
    pub fn new(path: impl Into<String>, shape: Vec<u64>, chunk_shape: Vec<u64>) -> Self {
        Self {
            path: path.into(),
            shape,
            chunk_shape,
        }
    }
}

impl ArrayHandle for MemoryArray {
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

/// Group with attributes and child arrays held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryGroup {
    location: String,
    attrs: Map<String, Value>,
    arrays: HashMap<String, Arc<MemoryArray>>,
}

impl MemoryGroup {
    /// Create a group from its attributes document.
    ///
    /// Non-object attribute values are treated as an empty attribute map.
    pub fn new(location: impl Into<String>, attrs: Value) -> Self {
        let attrs = match attrs {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            location: location.into(),
            attrs,
            arrays: HashMap::new(),
        }
    }

    /// Add a child array at `path`.
    pub fn with_array(mut self, path: &str, shape: Vec<u64>, chunk_shape: Vec<u64>) -> Self {
        let key = join_key("", path);
        self.arrays
            .insert(key.clone(), Arc::new(MemoryArray::new(key, shape, chunk_shape)));
        self
    }
}

#[async_trait]
impl StoreGroup for MemoryGroup {
    fn location(&self) -> &str {
        &self.location
    }

    fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    async fn open_array(&self, path: &str) -> Result<Arc<dyn ArrayHandle>, StoreError> {
        let key = join_key("", path);
        match self.arrays.get(&key) {
            Some(array) => Ok(Arc::clone(array) as Arc<dyn ArrayHandle>),
            None => Err(StoreError::NotFound(join_key(&self.location, &key))),
        }
    }
}

/// Store opener that serves registered in-memory groups by URL.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    groups: HashMap<String, Arc<MemoryGroup>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `group` under `url`.
    pub fn with_group(mut self, url: impl Into<String>, group: MemoryGroup) -> Self {
        self.groups.insert(url.into(), Arc::new(group));
        self
    }
}

#[async_trait]
impl StoreOpener for MemoryStore {
    async fn open_group(
        &self,
        url: &str,
        _kind: StoreKind,
    ) -> Result<Arc<dyn StoreGroup>, StoreError> {
        match self.groups.get(url) {
            Some(group) => Ok(Arc::clone(group) as Arc<dyn StoreGroup>),
            None => Err(StoreError::NotFound(url.to_string())),
        }
    }
}
