//! Tile source descriptions for deep-zoom images

use serde::{Deserialize, Serialize};

/// Options forwarded to the tile source provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSourceOptions {
    /// Log how long tile source resolution took
    #[serde(default)]
    pub log_latency: bool,
}

/// Address of one tile inside a pyramid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub level: u32,
    pub column: u32,
    pub row: u32,
}

/// One resolution level of a tiled image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSource {
    /// 0 is full resolution, each next level halves both dimensions
    pub level: u32,
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub columns: u32,
    pub rows: u32,
}

impl TileSource {
    pub fn new(level: u32, width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            level,
            width,
            height,
            tile_size,
            columns: width.div_ceil(tile_size),
            rows: height.div_ceil(tile_size),
        }
    }

    pub fn tile_count(&self) -> u64 {
        u64::from(self.columns) * u64::from(self.rows)
    }

    /// Iterate over every tile address of this level, row-major
    pub fn tiles(&self) -> impl Iterator<Item = TileAddress> + '_ {
        (0..self.rows).flat_map(move |row| {
            (0..self.columns).map(move |column| TileAddress {
                level: self.level,
                column,
                row,
            })
        })
    }
}

/// Ordered, immutable set of tile sources produced by one successful load
#[derive(Debug, Clone, PartialEq)]
pub struct TileSourceSet {
    url: String,
    sources: Vec<TileSource>,
}

impl TileSourceSet {
    pub fn new(url: impl Into<String>, sources: Vec<TileSource>) -> Self {
        Self {
            url: url.into(),
            sources,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn sources(&self) -> &[TileSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Full-resolution level, if any
    pub fn full_resolution(&self) -> Option<&TileSource> {
        self.sources.iter().min_by_key(|s| s.level)
    }

    /// Lowest-resolution level, the one a viewer shows first
    pub fn coarsest(&self) -> Option<&TileSource> {
        self.sources.iter().max_by_key(|s| s.level)
    }
}
