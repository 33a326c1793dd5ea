//! OME-Zarr metadata resolution.
//!
//! Extracts the first multiscale descriptor and the optional `omero`
//! rendering metadata from a group's `ome` attribute namespace, and maps the
//! declared axis names onto array dimension positions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MetadataError;
use crate::store::StoreGroup;

// =============================================================================
// Multiscale Descriptor
// =============================================================================

/// One declared axis of a multiscale image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub name: String,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub axis_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One resolution level of a multiscale image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Array path relative to the group
    pub path: String,

    #[serde(
        rename = "coordinateTransformations",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub coordinate_transformations: Option<Value>,
}

/// A multiscale image descriptor.
///
/// Datasets are ordered from highest to lowest resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Multiscale {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub axes: Vec<Axis>,

    pub datasets: Vec<Dataset>,
}

// =============================================================================
// Axis Indices
// =============================================================================

/// Positions of the semantic axes within an array's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AxisIndices {
    pub t: Option<usize>,
    pub c: Option<usize>,
    pub z: Option<usize>,
    pub y: usize,
    pub x: usize,
}

impl AxisIndices {
    /// Map axis names to positions in declaration order.
    ///
    /// Fails on the first name outside {t, c, z, y, x}, or when x or y is
    /// not declared. A repeated name keeps its last position.
    pub fn from_axes(axes: &[Axis]) -> Result<Self, MetadataError> {
        let mut t = None;
        let mut c = None;
        let mut z = None;
        let mut y = None;
        let mut x = None;

        for (i, axis) in axes.iter().enumerate() {
            match axis.name.as_str() {
                "t" => t = Some(i),
                "c" => c = Some(i),
                "z" => z = Some(i),
                "y" => y = Some(i),
                "x" => x = Some(i),
                other => {
                    return Err(MetadataError::UnsupportedAxis {
                        name: other.to_string(),
                    })
                }
            }
        }

        match (x, y) {
            (Some(x), Some(y)) => Ok(Self { t, c, z, y, x }),
            _ => Err(MetadataError::MissingSpatialAxes),
        }
    }

    /// Minimum array rank needed to address every mapped axis.
    pub fn required_rank(&self) -> usize {
        [self.t, self.c, self.z, Some(self.y), Some(self.x)]
            .into_iter()
            .flatten()
            .max()
            .map_or(0, |i| i + 1)
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Result of resolving a group's OME-Zarr metadata.
#[derive(Debug, Clone)]
pub struct ResolvedMetadata {
    pub multiscale: Multiscale,
    pub omero: Option<Value>,
    pub axes: AxisIndices,
}

/// Resolve the first multiscale image declared by `group`.
pub fn resolve(group: &dyn StoreGroup) -> Result<ResolvedMetadata, MetadataError> {
    let ome = group
        .attrs()
        .get("ome")
        .and_then(Value::as_object)
        .ok_or(MetadataError::MissingOme)?;

    let multiscales = ome
        .get("multiscales")
        .and_then(Value::as_array)
        .ok_or(MetadataError::MissingMultiscales)?;

    let first = multiscales.first().ok_or(MetadataError::EmptyMultiscales)?;
    let multiscale: Multiscale =
        serde_json::from_value(first.clone()).map_err(|e| MetadataError::InvalidMultiscale {
            message: e.to_string(),
        })?;

    let omero = ome.get("omero").cloned();
    let axes = AxisIndices::from_axes(&multiscale.axes)?;

    Ok(ResolvedMetadata {
        multiscale,
        omero,
        axes,
    })
}

// =============================================================================
// Tests
// =============================================================================
