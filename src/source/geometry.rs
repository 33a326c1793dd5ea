//! Pyramid geometry derived from the per-level arrays.
//!
//! Deep zoom viewers number levels from the coarsest (level 0) up to full
//! resolution (`max_level`). Multiscale datasets are declared finest first.
//! Every query therefore maps a viewer level to an array index with
//! `max_level - level`.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{GeometryError, MetadataError};
use crate::store::{ArrayHandle, StoreGroup};

use super::metadata::{AxisIndices, Multiscale};

// =============================================================================
// Tile Regions
// =============================================================================

/// Half-open pixel index range `[start, end)` along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelRange {
    pub start: u64,
    pub end: u64,
}

impl PixelRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of pixels covered.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pixel ranges covered by one tile of a level's array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileRegion {
    pub x: PixelRange,
    pub y: PixelRange,
}

/// Selection handed to a renderer for one tile.
///
/// `x` and `y` are pixel ranges of the level's array. `z`, `c` and `t` are
/// the fixed selectors of the source; `None` leaves the axis to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileSelection {
    pub x: PixelRange,
    pub y: PixelRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t: Option<u64>,
}

/// Range of tile `index` for tiles of size `tile` over `extent` pixels.
///
/// The upper bound is clamped so edge tiles are partial.
fn tile_range(index: u64, tile: u64, extent: u64) -> PixelRange {
    let start = index.saturating_mul(tile);
    let end = index.saturating_add(1).saturating_mul(tile).min(extent);
    PixelRange::new(start, end)
}

// =============================================================================
// Pyramid Geometry
// =============================================================================

/// Geometry of a resolved multiscale pyramid.
///
/// Holds one array handle per resolution level, finest first.
#[derive(Debug, Clone)]
pub struct PyramidGeometry {
    axes: AxisIndices,
    arrays: Vec<Arc<dyn ArrayHandle>>,
}

impl PyramidGeometry {
    /// Open every dataset of `multiscale` and derive the pyramid geometry.
    ///
    /// All arrays are opened concurrently; results keep declaration order.
    pub async fn build(
        group: &dyn StoreGroup,
        multiscale: &Multiscale,
        axes: AxisIndices,
    ) -> Result<Self, MetadataError> {
        if multiscale.datasets.is_empty() {
            return Err(MetadataError::NoDatasets);
        }

        let opens = multiscale
            .datasets
            .iter()
            .map(|dataset| group.open_array(&dataset.path));
        let arrays = futures::future::try_join_all(opens).await?;

        debug!("opened {} arrays for {}", arrays.len(), group.location());

        Self::from_arrays(arrays, axes)
    }

    /// Build geometry from already opened arrays (finest first).
    pub fn from_arrays(
        arrays: Vec<Arc<dyn ArrayHandle>>,
        axes: AxisIndices,
    ) -> Result<Self, MetadataError> {
        let base = arrays.first().ok_or(MetadataError::NoDatasets)?;

        let rank = axes.required_rank();
        for array in &arrays {
            let actual = array.shape().len().min(array.chunk_shape().len());
            if actual < rank {
                return Err(MetadataError::DimensionMismatch {
                    path: array.path().to_string(),
                    expected: rank,
                    actual,
                });
            }
            if array.chunk_shape()[axes.x] == 0 || array.chunk_shape()[axes.y] == 0 {
                return Err(MetadataError::ZeroChunkExtent {
                    path: array.path().to_string(),
                });
            }
        }

        if base.shape()[axes.x] == 0 || base.shape()[axes.y] == 0 {
            return Err(MetadataError::EmptyExtent {
                path: base.path().to_string(),
            });
        }

        Ok(Self { axes, arrays })
    }

    pub fn axes(&self) -> &AxisIndices {
        &self.axes
    }

    /// Arrays in declaration order (finest first).
    pub fn arrays(&self) -> &[Arc<dyn ArrayHandle>] {
        &self.arrays
    }

    /// Full-resolution width in pixels.
    pub fn width(&self) -> u64 {
        self.arrays[0].shape()[self.axes.x]
    }

    /// Full-resolution height in pixels.
    pub fn height(&self) -> u64 {
        self.arrays[0].shape()[self.axes.y]
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width() as f64 / self.height() as f64
    }

    /// Highest viewer level (full resolution).
    pub fn max_level(&self) -> usize {
        self.arrays.len() - 1
    }

    /// Array backing a viewer level.
    pub fn array(&self, level: usize) -> Result<&Arc<dyn ArrayHandle>, GeometryError> {
        let max_level = self.max_level();
        if level > max_level {
            return Err(GeometryError::LevelOutOfRange { level, max_level });
        }
        Ok(&self.arrays[max_level - level])
    }

    pub fn tile_width(&self, level: usize) -> Result<u64, GeometryError> {
        Ok(self.array(level)?.chunk_shape()[self.axes.x])
    }

    pub fn tile_height(&self, level: usize) -> Result<u64, GeometryError> {
        Ok(self.array(level)?.chunk_shape()[self.axes.y])
    }

    /// Ratio of a level's x extent to the full-resolution x extent.
    pub fn level_scale(&self, level: usize) -> Result<f64, GeometryError> {
        let width = self.array(level)?.shape()[self.axes.x];
        Ok(width as f64 / self.width() as f64)
    }

    /// `(width, height)` of a level in pixels.
    pub fn level_dimensions(&self, level: usize) -> Result<(u64, u64), GeometryError> {
        let array = self.array(level)?;
        Ok((array.shape()[self.axes.x], array.shape()[self.axes.y]))
    }

    /// Number of tiles along x and y at a level.
    pub fn tile_count(&self, level: usize) -> Result<(u64, u64), GeometryError> {
        let (width, height) = self.level_dimensions(level)?;
        let tiles_x = width.div_ceil(self.tile_width(level)?);
        let tiles_y = height.div_ceil(self.tile_height(level)?);
        Ok((tiles_x, tiles_y))
    }

    /// Pixel ranges of tile `(x, y)` at a level, clamped to the array extent.
    pub fn tile_region(&self, level: usize, x: u64, y: u64) -> Result<TileRegion, GeometryError> {
        let (width, height) = self.level_dimensions(level)?;
        let (tiles_x, tiles_y) = self.tile_count(level)?;
        if x >= tiles_x || y >= tiles_y {
            return Err(GeometryError::TileOutOfRange {
                level,
                x,
                y,
                tiles_x,
                tiles_y,
            });
        }

        Ok(TileRegion {
            x: tile_range(x, self.tile_width(level)?, width),
            y: tile_range(y, self.tile_height(level)?, height),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
