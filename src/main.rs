//! omezarr-tiles - Inspect an OME-Zarr image as a deep zoom tile pyramid.
//!
//! This binary resolves a store's multiscale metadata and prints the pyramid
//! the tile source exposes to a viewer.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use omezarr_tiles::{
    config::MAX_LISTED_TILES, AxisIndices, Config, GeometryError, OmeZarrTileSource, SourceEvent,
    StoreKind, TileCoord, TileSelection, ZarrStoreOpener,
};

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();

    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let (source, mut events) =
        OmeZarrTileSource::open(config.to_options(), Arc::new(ZarrStoreOpener::new()));

    match events.recv().await {
        Ok(SourceEvent::Ready) => debug!("source ready"),
        Ok(SourceEvent::OpenFailed { message, .. }) => {
            eprintln!("Error: {}", message);
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("Error: lost source events: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let report = match build_report(&source, config.level) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&report);
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so JSON reports on stdout stay parseable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "omezarr_tiles=debug"
    } else {
        "omezarr_tiles=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Serialize)]
struct SourceReport {
    url: String,
    store: &'static str,
    width: u64,
    height: u64,
    aspect_ratio: f64,
    max_level: usize,
    axes: AxisIndices,
    levels: Vec<LevelReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tiles: Option<Vec<TileReport>>,
}

#[derive(Debug, Serialize)]
struct LevelReport {
    level: usize,
    dataset: String,
    width: u64,
    height: u64,
    tile_width: u64,
    tile_height: u64,
    tiles_x: u64,
    tiles_y: u64,
    scale: f64,
}

#[derive(Debug, Serialize)]
struct TileReport {
    level: usize,
    x: u64,
    y: u64,
    key: String,
    selection: TileSelection,
}

fn build_report(source: &OmeZarrTileSource, level: Option<usize>) -> Result<SourceReport, String> {
    let state = source.state();
    let geometry = state.ready().map_err(|e| e.to_string())?.geometry();

    let levels = (0..=geometry.max_level())
        .map(|level| {
            let (width, height) = geometry.level_dimensions(level)?;
            let (tiles_x, tiles_y) = geometry.tile_count(level)?;
            Ok(LevelReport {
                level,
                dataset: geometry.array(level)?.path().to_string(),
                width,
                height,
                tile_width: geometry.tile_width(level)?,
                tile_height: geometry.tile_height(level)?,
                tiles_x,
                tiles_y,
                scale: geometry.level_scale(level)?,
            })
        })
        .collect::<Result<Vec<_>, GeometryError>>()
        .map_err(|e| e.to_string())?;

    let tiles = match level {
        Some(level) => Some(list_tiles(source, level)?),
        None => None,
    };

    let store = match source.options().store_kind() {
        StoreKind::Hierarchy => "directory",
        StoreKind::Zip => "zip archive",
    };

    Ok(SourceReport {
        url: source.url().to_string(),
        store,
        width: geometry.width(),
        height: geometry.height(),
        aspect_ratio: geometry.aspect_ratio(),
        max_level: geometry.max_level(),
        axes: *geometry.axes(),
        levels,
        tiles,
    })
}

fn list_tiles(source: &OmeZarrTileSource, level: usize) -> Result<Vec<TileReport>, String> {
    let state = source.state();
    let geometry = state.ready().map_err(|e| e.to_string())?.geometry();
    let (tiles_x, tiles_y) = geometry.tile_count(level).map_err(|e| e.to_string())?;

    if tiles_x.saturating_mul(tiles_y) > MAX_LISTED_TILES {
        return Err(format!(
            "level {} has {}x{} tiles, more than {} can be listed",
            level, tiles_x, tiles_y, MAX_LISTED_TILES
        ));
    }

    let mut tiles = Vec::new();
    for y in 0..tiles_y {
        for x in 0..tiles_x {
            let selection = source
                .tile_selection(TileCoord::new(level, x, y))
                .map_err(|e| e.to_string())?;
            tiles.push(TileReport {
                level,
                x,
                y,
                key: source.tile_hash_key(level, x, y),
                selection,
            });
        }
    }
    Ok(tiles)
}

fn print_report(report: &SourceReport) {
    println!("OME-Zarr Tile Source");
    println!("════════════════════");
    println!("URL:        {}", report.url);
    println!("Store:      {}", report.store);
    println!(
        "Dimensions: {}x{} (aspect {:.4})",
        report.width, report.height, report.aspect_ratio
    );
    println!("Levels:     {}", report.max_level + 1);
    println!();
    println!(
        "{:>5}  {:<12} {:>13}  {:>9}  {:>9}  {:>8}",
        "level", "dataset", "size", "tile", "grid", "scale"
    );
    println!("{}", "─".repeat(64));

    for level in &report.levels {
        println!(
            "{:>5}  {:<12} {:>13}  {:>9}  {:>9}  {:>8.4}",
            level.level,
            level.dataset,
            format!("{}x{}", level.width, level.height),
            format!("{}x{}", level.tile_width, level.tile_height),
            format!("{}x{}", level.tiles_x, level.tiles_y),
            level.scale
        );
    }

    if let Some(tiles) = &report.tiles {
        println!();
        println!("Tiles:");
        for tile in tiles {
            let mut line = format!(
                "  ({}, {}) x=[{}, {}) y=[{}, {})",
                tile.x,
                tile.y,
                tile.selection.x.start,
                tile.selection.x.end,
                tile.selection.y.start,
                tile.selection.y.end
            );
            for (name, value) in [
                ("z", tile.selection.z),
                ("c", tile.selection.c),
                ("t", tile.selection.t),
            ] {
                if let Some(value) = value {
                    line.push_str(&format!(" {}={}", name, value));
                }
            }
            println!("{}", line);
        }
        println!();
        println!("Total: {} tile(s)", tiles.len());
    }
}
