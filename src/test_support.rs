//! Shared fixtures for unit tests

use anyhow::{Result, anyhow};
use futures::future::LocalBoxFuture;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use crate::domain::{TileSource, TileSourceOptions, TileSourceSet};
use crate::tiles::TileSourceProvider;

/// Three-level pyramid of a 1024x512 image in 256px tiles
pub fn sample_tiles() -> TileSourceSet {
    TileSourceSet::new(
        "/image.tif",
        vec![
            TileSource::new(0, 1024, 512, 256),
            TileSource::new(1, 512, 256, 256),
            TileSource::new(2, 256, 128, 256),
        ],
    )
}

/// Provider that answers with a fixed script, one entry per call
pub struct ScriptedTileProvider {
    script: RefCell<VecDeque<Result<TileSourceSet, String>>>,
    calls: Cell<usize>,
}

impl ScriptedTileProvider {
    pub fn new(script: Vec<Result<TileSourceSet, String>>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            calls: Cell::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl TileSourceProvider for ScriptedTileProvider {
    fn resolve<'a>(
        &'a self,
        _url: &'a str,
        _options: TileSourceOptions,
    ) -> LocalBoxFuture<'a, Result<TileSourceSet>> {
        self.calls.set(self.calls.get() + 1);
        let next = self.script.borrow_mut().pop_front();
        Box::pin(async move {
            match next {
                Some(Ok(tiles)) => Ok(tiles),
                Some(Err(reason)) => Err(anyhow!(reason)),
                None => Err(anyhow!("script exhausted")),
            }
        })
    }
}
