//! Tile source descriptors, capability probe and normalization.
//!
//! A viewer hands the tile source an arbitrary descriptor. [`supports`]
//! decides whether this source can handle it and [`configure`] turns it into
//! canonical [`TileSourceOptions`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::store::{StoreKind, ZIP_ARCHIVE_SUFFIX};

/// Type tag identifying OME-Zarr descriptors.
pub const OME_ZARR_TYPE: &str = "ome-zarr";

// =============================================================================
// Descriptors
// =============================================================================

/// A tile source descriptor as handed over by a viewer.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    /// Bare URL
    Url(String),
    /// Structured options object
    Object(Map<String, Value>),
    /// Array of descriptors
    Array(Vec<Value>),
    /// Generic XML document
    Document(String),
}

/// Non-string scalars carry no options and map to an empty object, which is
/// never supported.
impl From<Value> for Descriptor {
    fn from(value: Value) -> Self {
        match value {
            Value::String(url) => Descriptor::Url(url),
            Value::Object(map) => Descriptor::Object(map),
            Value::Array(items) => Descriptor::Array(items),
            Value::Null | Value::Bool(_) | Value::Number(_) => Descriptor::Object(Map::new()),
        }
    }
}

impl From<&str> for Descriptor {
    fn from(url: &str) -> Self {
        Descriptor::Url(url.to_string())
    }
}

// =============================================================================
// Options
// =============================================================================

/// Canonical options of an OME-Zarr tile source.
///
/// `t`, `c` and `z` fix the non-spatial selectors for every tile of the
/// source. Equality compares all fields, with absent equal to absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileSourceOptions {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<u64>,
}

impl TileSourceOptions {
    /// Options for a bare URL with no fixed selectors.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            zip: None,
            t: None,
            c: None,
            z: None,
        }
    }

    /// Store layout these options select.
    pub fn store_kind(&self) -> StoreKind {
        StoreKind::select(&self.url, self.zip)
    }

    /// Options as a structured descriptor carrying the `type` tag.
    pub fn to_descriptor(&self) -> Map<String, Value> {
        let mut map = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        map.insert("type".to_string(), Value::String(OME_ZARR_TYPE.to_string()));
        map
    }
}

// =============================================================================
// Probe and Normalization
// =============================================================================

/// Whether this source can handle `descriptor`.
pub fn supports(descriptor: &Descriptor) -> bool {
    match descriptor {
        Descriptor::Url(url) => url.ends_with(ZIP_ARCHIVE_SUFFIX),
        Descriptor::Object(map) => {
            matches!(map.get("type"), Some(Value::String(tag)) if tag == OME_ZARR_TYPE)
        }
        Descriptor::Array(_) | Descriptor::Document(_) => false,
    }
}

/// Normalize a descriptor into canonical options.
///
/// Only descriptor-driven configuration is accepted: arrays, XML documents
/// and accompanying POST payloads are rejected.
pub fn configure(
    descriptor: &Descriptor,
    post_data: Option<&str>,
) -> Result<TileSourceOptions, ConfigError> {
    if post_data.is_some_and(|data| !data.is_empty()) {
        return Err(ConfigError::unsupported(
            "configuration with postData is not supported",
        ));
    }

    match descriptor {
        Descriptor::Array(_) => Err(ConfigError::unsupported(
            "configuration from array is not supported",
        )),
        Descriptor::Document(_) => Err(ConfigError::unsupported(
            "configuration from XML Document is not supported",
        )),
        Descriptor::Url(url) => Ok(TileSourceOptions::new(url.clone())),
        Descriptor::Object(map) => {
            if let Some(tag) = map.get("type") {
                if tag.as_str() != Some(OME_ZARR_TYPE) {
                    return Err(ConfigError::unsupported(format!(
                        "unexpected descriptor type {}",
                        tag
                    )));
                }
            }
            serde_json::from_value(Value::Object(map.clone()))
                .map_err(|e| ConfigError::unsupported(format!("invalid options: {}", e)))
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
