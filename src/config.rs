//! Configuration for the `omezarr-tiles` inspector.
//!
//! Options come from command-line arguments via clap, with `OMEZARR_`
//! prefixed environment variables as fallbacks.
//!
//! # Environment Variables
//!
//! - `OMEZARR_URL` - Store location (path, `file://` or `http(s)://` URL; directory or `.ozx` archive)
//! - `OMEZARR_ZIP` - Force (true) or forbid (false) the zip archive layout
//! - `OMEZARR_T` / `OMEZARR_C` / `OMEZARR_Z` - Fixed non-spatial selectors
//! - `OMEZARR_LEVEL` - Viewer level whose tiles are listed
//! - `OMEZARR_JSON` - Print the report as JSON

use clap::Parser;

use crate::source::TileSourceOptions;

/// Upper bound on tiles listed for a single level.
pub const MAX_LISTED_TILES: u64 = 1_000_000;

/// omezarr-tiles - Inspect an OME-Zarr image as a deep zoom tile pyramid.
///
/// Resolves the multiscale metadata of a store and reports, per viewer level,
/// the dataset backing it, its dimensions, tile size, tile grid and scale.
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "omezarr-tiles")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Store location: a path, a file:// or http(s):// URL, as a directory or an .ozx archive.
    #[arg(env = "OMEZARR_URL")]
    pub url: String,

    /// Open the store as a zip archive (true) or a directory (false).
    ///
    /// Defaults to the archive layout when the location ends with `.ozx`.
    #[arg(long, env = "OMEZARR_ZIP")]
    pub zip: Option<bool>,

    // =========================================================================
    // Fixed Selectors
    // =========================================================================
    /// Fixed time point for every tile.
    #[arg(short = 't', long = "time", env = "OMEZARR_T")]
    pub t: Option<u64>,

    /// Fixed channel for every tile.
    #[arg(short = 'c', long = "channel", env = "OMEZARR_C")]
    pub c: Option<u64>,

    /// Fixed z plane for every tile.
    #[arg(short = 'z', long = "plane", env = "OMEZARR_Z")]
    pub z: Option<u64>,

    // =========================================================================
    // Output
    // =========================================================================
    /// List the tile selections of one viewer level.
    #[arg(long, env = "OMEZARR_LEVEL")]
    pub level: Option<usize>,

    /// Print the report as JSON.
    #[arg(long, default_value_t = false, env = "OMEZARR_JSON")]
    pub json: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("Store location is required. Pass it as an argument or set OMEZARR_URL".to_string());
        }

        Ok(())
    }

    /// Tile source options for this configuration.
    pub fn to_options(&self) -> TileSourceOptions {
        TileSourceOptions {
            url: self.url.clone(),
            zip: self.zip,
            t: self.t,
            c: self.c,
            z: self.z,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
