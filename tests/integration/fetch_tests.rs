//! Tile fetch integration tests.
//!
//! Tests verify:
//! - End-to-end fetch over a 3-level pyramid, including clamped edge tiles
//! - Exactly one completion per job for render and decode failures
//! - Precondition failures (not ready, bad level, bad key) become failed completions
//! - Abort is idempotent, suppresses completion during render or decode, and is
//!   a no-op after completion
//! - The tile cache skips the renderer on repeated requests and only keeps
//!   bytes that decoded

use std::sync::Arc;

use omezarr_tiles::source::{OmeZarrTileSource, TileSourceOptions};
use omezarr_tiles::tile::{TileCache, TileCacheKey, TileFetcher, TileJob, TileOutcome};

use super::test_utils::{
    ready_source, square_pyramid, store_with, FailingRenderer, GarbageRenderer, GatedDecoder,
    GatedRenderer, PngRenderer, RecordedJob, TEST_URL,
};

// =============================================================================
// End-to-end
// =============================================================================

#[tokio::test]
async fn test_three_level_pyramid_end_to_end() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(256, 64, 3)).await;
    assert_eq!(source.max_level(), 2);
    assert_eq!(source.tile_width(2).unwrap(), 64);

    let renderer = PngRenderer::new();
    let fetcher = TileFetcher::new(source.clone(), renderer.clone());

    let (job, rx) = TileJob::with_channel(source.tile_url(2, 3, 3));
    fetcher.start_fetch(job).unwrap().await.unwrap();

    match rx.await.unwrap() {
        TileOutcome::Loaded(image) => {
            assert_eq!(image.width(), 64);
            assert_eq!(image.height(), 64);
        }
        TileOutcome::Failed(message) => panic!("Expected a tile, got {}", message),
    }

    let selection = renderer.selections()[0];
    assert_eq!((selection.x.start, selection.x.end), (192, 256));
    assert_eq!((selection.y.start, selection.y.end), (192, 256));
    assert_eq!(renderer.datasets(), vec!["0".to_string()]);
}

#[tokio::test]
async fn test_failed_render_finishes_once_with_message() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(256, 64, 3)).await;
    let fetcher = TileFetcher::new(source.clone(), FailingRenderer::new("channel data unavailable"));

    let recorded = RecordedJob::new(source.tile_url(2, 3, 3));
    fetcher.start_fetch(recorded.job.clone()).unwrap().await.unwrap();

    // A late abort must not add a second completion
    fetcher.abort_fetch(&recorded.job);

    match recorded.take_outcome() {
        TileOutcome::Failed(message) => {
            assert!(message.starts_with("failed to render tile for level=2, x=3, y=3"));
            assert!(message.contains("channel data unavailable"));
        }
        TileOutcome::Loaded(_) => panic!("Expected a failure"),
    }
}

#[tokio::test]
async fn test_decode_failure_reported_like_render_failure() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(128, 64, 2)).await;
    let fetcher = TileFetcher::new(source.clone(), GarbageRenderer::new());

    let recorded = RecordedJob::new(source.tile_url(1, 0, 0));
    fetcher.start_fetch(recorded.job.clone()).unwrap().await.unwrap();

    let outcome = recorded.take_outcome();
    let message = outcome.error().unwrap();
    assert!(message.starts_with("failed to render tile for level=1, x=0, y=0"));
    assert!(message.contains("decode"));
}

#[tokio::test]
async fn test_partial_edge_tile_image_size() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(100, 64, 1)).await;
    let fetcher = TileFetcher::new(source.clone(), PngRenderer::new());

    let (job, rx) = TileJob::with_channel(source.tile_url(0, 1, 0));
    fetcher.start_fetch(job).unwrap().await.unwrap();

    let outcome = rx.await.unwrap();
    let image = outcome.image().unwrap();
    assert_eq!((image.width(), image.height()), (36, 64));
}

// =============================================================================
// Preconditions
// =============================================================================

#[tokio::test]
async fn test_unready_source_fails_job() {
    let source = Arc::new(OmeZarrTileSource::new(
        TileSourceOptions::new(TEST_URL),
        store_with(square_pyramid(256, 64, 3)),
    ));
    let renderer = PngRenderer::new();
    let fetcher = TileFetcher::new(source.clone(), renderer.clone());

    let recorded = RecordedJob::new(source.tile_url(0, 0, 0));
    assert!(fetcher.start_fetch(recorded.job.clone()).is_none());

    let message = recorded.take_outcome().error().unwrap().to_string();
    assert_eq!(
        message,
        "failed to download tile for level=0, x=0, y=0: tile source not ready"
    );
    assert_eq!(renderer.call_count(), 0);
}

#[tokio::test]
async fn test_out_of_range_requests_fail_job() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(256, 64, 3)).await;
    let renderer = PngRenderer::new();
    let fetcher = TileFetcher::new(source.clone(), renderer.clone());

    for key in [
        source.tile_url(3, 0, 0),
        source.tile_url(2, 4, 0),
        source.tile_url(0, 0, 1),
        "level=one&x=0&y=0".to_string(),
    ] {
        let recorded = RecordedJob::new(key.clone());
        assert!(fetcher.start_fetch(recorded.job.clone()).is_none());
        assert_eq!(recorded.finish_count(), 1, "{} should fail once", key);
        assert!(recorded
            .take_outcome()
            .error()
            .unwrap()
            .starts_with("failed to download tile for"));
    }

    assert_eq!(renderer.call_count(), 0);
}

// =============================================================================
// Abort
// =============================================================================

#[tokio::test]
async fn test_abort_in_flight_suppresses_completion() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(256, 64, 3)).await;
    let renderer = GatedRenderer::new();
    let fetcher = TileFetcher::new(source.clone(), renderer.clone());

    let recorded = RecordedJob::new(source.tile_url(1, 0, 0));
    let handle = fetcher.start_fetch(recorded.job.clone()).unwrap();
    renderer.wait_started().await;

    fetcher.abort_fetch(&recorded.job);
    fetcher.abort_fetch(&recorded.job);
    renderer.release();

    handle.await.unwrap();
    assert!(recorded.job.is_cancelled());
    assert_eq!(recorded.finish_count(), 0);
}

#[tokio::test]
async fn test_abort_during_decode_suppresses_completion() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(256, 64, 3)).await;
    let cache = Arc::new(TileCache::new());
    let decoder = GatedDecoder::new();
    let renderer = PngRenderer::new();
    let fetcher = TileFetcher::new(source.clone(), renderer.clone())
        .with_decoder(decoder.decoder())
        .with_cache(cache.clone());

    let recorded = RecordedJob::new(source.tile_url(2, 1, 1));
    let handle = fetcher.start_fetch(recorded.job.clone()).unwrap();
    decoder.wait_started().await;
    assert_eq!(renderer.call_count(), 1);

    fetcher.abort_fetch(&recorded.job);
    decoder.release();

    handle.await.unwrap();
    assert!(recorded.job.is_cancelled());
    assert_eq!(recorded.finish_count(), 0);
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_abort_after_success_is_noop() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(256, 64, 3)).await;
    let fetcher = TileFetcher::new(source.clone(), PngRenderer::new());

    let recorded = RecordedJob::new(source.tile_url(0, 0, 0));
    fetcher.start_fetch(recorded.job.clone()).unwrap().await.unwrap();

    fetcher.abort_fetch(&recorded.job);
    fetcher.abort_fetch(&recorded.job);

    assert_eq!(recorded.finish_count(), 1);
    assert!(recorded.take_outcome().is_loaded());
}

#[tokio::test]
async fn test_abort_without_fetch_is_noop() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(256, 64, 3)).await;
    let fetcher = TileFetcher::new(source.clone(), PngRenderer::new());

    let recorded = RecordedJob::new(source.tile_url(0, 0, 0));
    fetcher.abort_fetch(&recorded.job);
    assert!(!recorded.job.is_cancelled());
    assert_eq!(recorded.finish_count(), 0);
}

#[tokio::test]
async fn test_concurrent_tiles_complete_independently() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(256, 64, 3)).await;
    let renderer = PngRenderer::new();
    let fetcher = TileFetcher::new(source.clone(), renderer.clone());

    let mut receivers = Vec::new();
    let mut handles = Vec::new();
    for y in 0..4 {
        for x in 0..4 {
            let (job, rx) = TileJob::with_channel(source.tile_url(2, x, y));
            handles.push(fetcher.start_fetch(job).unwrap());
            receivers.push(rx);
        }
    }

    for handle in handles {
        handle.await.unwrap();
    }
    for rx in receivers {
        assert!(rx.await.unwrap().is_loaded());
    }
    assert_eq!(renderer.call_count(), 16);
}

// =============================================================================
// Cache
// =============================================================================

#[tokio::test]
async fn test_cache_skips_renderer_on_repeat() {
    let mut options = TileSourceOptions::new(TEST_URL);
    options.z = Some(0);
    let group = super::test_utils::channel_pyramid();
    let source = ready_source(options, group).await;

    let cache = Arc::new(TileCache::new());
    let renderer = PngRenderer::new();
    let fetcher = TileFetcher::new(source.clone(), renderer.clone()).with_cache(cache.clone());

    for _ in 0..2 {
        let (job, rx) = TileJob::with_channel(source.tile_url(1, 0, 0));
        fetcher.start_fetch(job).unwrap().await.unwrap();
        assert!(rx.await.unwrap().is_loaded());
    }

    assert_eq!(renderer.call_count(), 1);
    assert_eq!(cache.len().await, 1);
    assert!(
        cache
            .contains(&TileCacheKey::new(source.tile_hash_key(1, 0, 0)))
            .await
    );
}

#[tokio::test]
async fn test_failed_renders_are_not_cached() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(256, 64, 3)).await;
    let cache = Arc::new(TileCache::new());
    let fetcher =
        TileFetcher::new(source.clone(), FailingRenderer::new("boom")).with_cache(cache.clone());

    let recorded = RecordedJob::new(source.tile_url(0, 0, 0));
    fetcher.start_fetch(recorded.job.clone()).unwrap().await.unwrap();

    assert!(!recorded.take_outcome().is_loaded());
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_undecodable_renders_are_not_cached() {
    let source = ready_source(TileSourceOptions::new(TEST_URL), square_pyramid(128, 64, 2)).await;
    let cache = Arc::new(TileCache::new());
    let renderer = GarbageRenderer::new();
    let fetcher = TileFetcher::new(source.clone(), renderer.clone()).with_cache(cache.clone());

    for _ in 0..2 {
        let recorded = RecordedJob::new(source.tile_url(1, 0, 0));
        fetcher.start_fetch(recorded.job.clone()).unwrap().await.unwrap();
        assert!(recorded.take_outcome().error().unwrap().contains("decode"));
        assert!(cache.is_empty().await);
    }

    // Each request went back to the renderer
    assert_eq!(renderer.call_count(), 2);
}
