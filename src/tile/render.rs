//! Renderer contract and tile decoding.
//!
//! Pixel reads and rendering live outside this crate. A [`TileRenderer`]
//! receives one level's array, the axis declarations, the optional `omero`
//! rendering metadata and the tile selection, and returns encoded image bytes
//! (PNG or JPEG). [`decode_tile`] turns those bytes into an image.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::DynamicImage;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{RenderError, TileError};
use crate::source::{Axis, TileSelection};
use crate::store::ArrayHandle;

/// Everything a renderer needs to produce one tile.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub array: Arc<dyn ArrayHandle>,
    pub axes: Vec<Axis>,
    pub omero: Option<Value>,
    pub selection: TileSelection,
}

/// Produces encoded tile images from array selections.
#[async_trait]
pub trait TileRenderer: Send + Sync {
    /// Render one tile.
    ///
    /// `cancel` is triggered when the tile is aborted. Renderers may stop
    /// early; their result is discarded either way.
    async fn render(
        &self,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<Bytes, RenderError>;
}

/// Turns rendered bytes into an image. Runs on a blocking thread.
pub type TileDecoder = Arc<dyn Fn(&[u8]) -> Result<DynamicImage, TileError> + Send + Sync>;

/// Decode rendered bytes into an image.
///
/// CPU bound; callers on the async runtime should run it on a blocking thread.
pub fn decode_tile(bytes: &[u8]) -> Result<DynamicImage, TileError> {
    image::load_from_memory(bytes).map_err(|e| TileError::Decode {
        message: e.to_string(),
    })
}
