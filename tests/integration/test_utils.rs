//! Test utilities for integration tests.
//!
//! This module provides in-memory pyramid fixtures, on-disk store fixtures
//! and mock renderers producing real (or deliberately broken) image bytes.

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::{json, Value};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use omezarr_tiles::error::RenderError;
use omezarr_tiles::source::{OmeZarrTileSource, TileSelection, TileSourceOptions};
use omezarr_tiles::store::{MemoryGroup, MemoryStore};
use omezarr_tiles::tile::{
    decode_tile, RenderRequest, TileDecoder, TileJob, TileOutcome, TileRenderer,
};

pub const TEST_URL: &str = "https://example.com/data/image.ome.zarr";

// =============================================================================
// Pyramid Fixtures
// =============================================================================

/// Multiscale attributes for `levels` datasets named "0", "1", ...
pub fn multiscale_attrs(axes: &[&str], levels: usize) -> Value {
    let axes: Vec<Value> = axes.iter().map(|name| json!({"name": name})).collect();
    let datasets: Vec<Value> = (0..levels).map(|i| json!({"path": i.to_string()})).collect();
    json!({
        "ome": {
            "version": "0.5",
            "multiscales": [{"axes": axes, "datasets": datasets}],
            "omero": {"channels": [{"color": "FFFFFF", "window": {"start": 0, "end": 255}}]}
        }
    })
}

/// Square y/x pyramid halving per level, with the same chunk at every level.
pub fn square_pyramid(base: u64, chunk: u64, levels: usize) -> MemoryGroup {
    let mut group = MemoryGroup::new(TEST_URL, multiscale_attrs(&["y", "x"], levels));
    for i in 0..levels {
        let extent = (base >> i).max(1);
        group = group.with_array(&i.to_string(), vec![extent, extent], vec![chunk, chunk]);
    }
    group
}

/// c/y/x pyramid: 3 levels, base 1000 wide and 800 high, uneven chunks.
pub fn channel_pyramid() -> MemoryGroup {
    MemoryGroup::new(TEST_URL, multiscale_attrs(&["c", "y", "x"], 3))
        .with_array("0", vec![3, 800, 1000], vec![1, 256, 512])
        .with_array("1", vec![3, 400, 500], vec![1, 128, 256])
        .with_array("2", vec![3, 200, 250], vec![1, 64, 128])
}

pub fn store_with(group: MemoryGroup) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new().with_group(TEST_URL, group))
}

/// Resolve a source over `group`, panicking if it does not become ready.
pub async fn ready_source(options: TileSourceOptions, group: MemoryGroup) -> Arc<OmeZarrTileSource> {
    let source = OmeZarrTileSource::new(options, store_with(group));
    source.get_image_info().await.unwrap();
    Arc::new(source)
}

// =============================================================================
// On-disk Fixtures
// =============================================================================

/// Zarr v3 node documents of a y/x pyramid: `(key, document)` pairs.
pub fn v3_pyramid_documents(shapes: &[[u64; 2]], chunk: u64) -> Vec<(String, Value)> {
    let mut docs = vec![(
        "zarr.json".to_string(),
        json!({
            "zarr_format": 3,
            "node_type": "group",
            "attributes": multiscale_attrs(&["y", "x"], shapes.len())
        }),
    )];
    for (i, shape) in shapes.iter().enumerate() {
        docs.push((
            format!("{}/zarr.json", i),
            json!({
                "zarr_format": 3,
                "node_type": "array",
                "shape": shape,
                "data_type": "uint8",
                "chunk_grid": {"name": "regular", "configuration": {"chunk_shape": [chunk, chunk]}},
                "chunk_key_encoding": {"name": "default", "configuration": {"separator": "/"}},
                "fill_value": 0,
                "codecs": [{"name": "bytes"}]
            }),
        ));
    }
    docs
}

pub fn write_directory_store(root: &Path, docs: &[(String, Value)]) {
    for (key, doc) in docs {
        let path = root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_vec(doc).unwrap()).unwrap();
    }
}

pub fn write_zip_store(path: &Path, docs: &[(String, Value)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);
    for (key, doc) in docs {
        writer.start_file(key.as_str(), options).unwrap();
        writer.write_all(&serde_json::to_vec(doc).unwrap()).unwrap();
    }
    writer.finish().unwrap();
}

// =============================================================================
// HTTP Fixture
// =============================================================================

/// Serve the files under `root` on a loopback port and return the base URL.
///
/// Answers GET and HEAD with the whole file or 404, one request per connection.
pub async fn serve_directory(root: PathBuf) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let root = root.clone();
            tokio::spawn(async move {
                let _ = serve_file(stream, &root).await;
            });
        }
    });
    format!("http://{}", addr)
}

async fn serve_file(mut stream: TcpStream, root: &Path) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let request = String::from_utf8_lossy(&request);
    let mut line = request.lines().next().unwrap_or_default().split_whitespace();
    let method = line.next().unwrap_or_default().to_string();
    let path = line.next().unwrap_or("/").to_string();

    let (status, body) = match tokio::fs::read(root.join(path.trim_start_matches('/'))).await {
        Ok(body) => ("200 OK", body),
        Err(_) => ("404 Not Found", Vec::new()),
    };
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    if method != "HEAD" {
        stream.write_all(&body).await?;
    }
    stream.shutdown().await
}

// =============================================================================
// Images
// =============================================================================

pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width.max(1), height.max(1), Rgba([128, 64, 32, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

// =============================================================================
// Renderers
// =============================================================================

/// Renders a flat PNG sized to the selection and records every call.
#[derive(Default)]
pub struct PngRenderer {
    calls: AtomicUsize,
    selections: Mutex<Vec<TileSelection>>,
    datasets: Mutex<Vec<String>>,
}

impl PngRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn selections(&self) -> Vec<TileSelection> {
        self.selections.lock().unwrap().clone()
    }

    pub fn datasets(&self) -> Vec<String> {
        self.datasets.lock().unwrap().clone()
    }
}

#[async_trait]
impl TileRenderer for PngRenderer {
    async fn render(
        &self,
        request: &RenderRequest,
        _cancel: &CancellationToken,
    ) -> Result<Bytes, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.selections.lock().unwrap().push(request.selection);
        self.datasets
            .lock()
            .unwrap()
            .push(request.array.path().to_string());

        let width = request.selection.x.len() as u32;
        let height = request.selection.y.len() as u32;
        Ok(Bytes::from(create_test_png(width, height)))
    }
}

/// Always fails with a fixed message.
pub struct FailingRenderer {
    message: String,
}

impl FailingRenderer {
    pub fn new(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            message: message.into(),
        })
    }
}

#[async_trait]
impl TileRenderer for FailingRenderer {
    async fn render(
        &self,
        _request: &RenderRequest,
        _cancel: &CancellationToken,
    ) -> Result<Bytes, RenderError> {
        Err(RenderError::new(self.message.clone()))
    }
}

/// Succeeds with bytes that are not an image.
#[derive(Default)]
pub struct GarbageRenderer {
    calls: AtomicUsize,
}

impl GarbageRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileRenderer for GarbageRenderer {
    async fn render(
        &self,
        _request: &RenderRequest,
        _cancel: &CancellationToken,
    ) -> Result<Bytes, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from_static(b"definitely not a png"))
    }
}

/// Blocks until released, then renders a PNG.
#[derive(Default)]
pub struct GatedRenderer {
    started: Notify,
    release: Notify,
}

impl GatedRenderer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wait until a render call is in progress.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Let the pending render call finish.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl TileRenderer for GatedRenderer {
    async fn render(
        &self,
        request: &RenderRequest,
        _cancel: &CancellationToken,
    ) -> Result<Bytes, RenderError> {
        self.started.notify_one();
        self.release.notified().await;
        let width = request.selection.x.len() as u32;
        let height = request.selection.y.len() as u32;
        Ok(Bytes::from(create_test_png(width, height)))
    }
}

// =============================================================================
// Decoders
// =============================================================================

/// Holds its blocking decode thread until released, then decodes normally.
#[derive(Default)]
pub struct GatedDecoder {
    started: Notify,
    open: Mutex<bool>,
    opened: Condvar,
}

impl GatedDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Decoder function to hand to a fetcher.
    pub fn decoder(self: &Arc<Self>) -> TileDecoder {
        let gate = Arc::clone(self);
        Arc::new(move |bytes: &[u8]| {
            gate.started.notify_one();
            let mut open = gate.open.lock().unwrap();
            while !*open {
                open = gate.opened.wait(open).unwrap();
            }
            drop(open);
            decode_tile(bytes)
        })
    }

    /// Wait until a decode is in progress.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }

    /// Let pending decodes finish.
    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

// =============================================================================
// Jobs
// =============================================================================

/// Job whose outcomes are collected; `outcomes()` reveals how often it finished.
pub struct RecordedJob {
    pub job: Arc<TileJob>,
    outcomes: Arc<Mutex<Vec<TileOutcome>>>,
}

impl RecordedJob {
    pub fn new(src: impl Into<String>) -> Self {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        let job = TileJob::new(
            src,
            Box::new(move |outcome| sink.lock().unwrap().push(outcome)),
        );
        Self { job, outcomes }
    }

    pub fn finish_count(&self) -> usize {
        self.outcomes.lock().unwrap().len()
    }

    /// Take the single recorded outcome.
    pub fn take_outcome(&self) -> TileOutcome {
        let mut outcomes = self.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1, "expected exactly one completion");
        outcomes.remove(0)
    }
}
