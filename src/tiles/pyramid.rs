//! Deep-zoom pyramid provider for local image files
//!
//! Reads only the image header to learn its dimensions, then derives the
//! levels a viewer needs: level 0 at full resolution, every following level
//! half the size (rounded up), down to the first level that fits in a tile.

use anyhow::{Context, Result, ensure};
use futures::future::LocalBoxFuture;
use std::path::{Path, PathBuf};

use super::TileSourceProvider;
use crate::domain::{TileSource, TileSourceOptions, TileSourceSet};

pub struct PyramidTileProvider {
    asset_root: PathBuf,
    tile_size: u32,
}

impl PyramidTileProvider {
    pub fn new(asset_root: impl Into<PathBuf>, tile_size: u32) -> Self {
        Self {
            asset_root: asset_root.into(),
            tile_size,
        }
    }

    /// Map an image URL onto the local filesystem
    ///
    /// `file://` prefixes are stripped; absolute URLs such as `/TCI.tif` are
    /// served from the asset root, like a web server's document root.
    pub fn resolve_path(&self, url: &str) -> PathBuf {
        let url = url.strip_prefix("file://").unwrap_or(url);
        let relative = url.trim_start_matches('/');
        self.asset_root.join(relative)
    }
}

/// Compute the pyramid levels of a `width` x `height` image
pub fn build_pyramid(width: u32, height: u32, tile_size: u32) -> Result<Vec<TileSource>> {
    ensure!(width > 0 && height > 0, "image has zero size ({width}x{height})");
    ensure!(tile_size > 0, "tile size must be positive");

    let mut levels = Vec::new();
    let (mut w, mut h) = (width, height);
    loop {
        levels.push(TileSource::new(levels.len() as u32, w, h, tile_size));
        if w <= tile_size && h <= tile_size {
            break;
        }
        w = w.div_ceil(2);
        h = h.div_ceil(2);
    }
    Ok(levels)
}

fn read_dimensions(path: &Path) -> Result<(u32, u32)> {
    image::image_dimensions(path)
        .with_context(|| format!("Failed to read image header: {}", path.display()))
}

impl TileSourceProvider for PyramidTileProvider {
    fn resolve<'a>(
        &'a self,
        url: &'a str,
        _options: TileSourceOptions,
    ) -> LocalBoxFuture<'a, Result<TileSourceSet>> {
        Box::pin(async move {
            let path = self.resolve_path(url);
            log::debug!("Resolving {} to {}", url, path.display());
            let (width, height) = tokio::task::spawn_blocking(move || read_dimensions(&path))
                .await
                .context("Image header reader panicked")??;
            let levels = build_pyramid(width, height, self.tile_size)?;
            Ok(TileSourceSet::new(url, levels))
        })
    }
}
