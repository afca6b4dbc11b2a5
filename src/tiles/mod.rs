//! Tile source loading
//!
//! This module provides:
//! - The [`TileSourceProvider`] seam an image backend implements
//! - [`TileSourceLoader`], which runs one request with automatic retry
//! - [`TileQuery`], the pending/success/error status a session renders from
//!
//! Loading is the only suspension point of a session. A request carries the
//! query generation it was issued for; outcomes from an older generation
//! (superseded by a refetch, or issued before teardown) are ignored.

mod pyramid;

pub use pyramid::PyramidTileProvider;

use anyhow::Result;
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::{TileSourceOptions, TileSourceSet};
use crate::error::SessionError;

/// Resolves an image URL into its tile sources
pub trait TileSourceProvider {
    fn resolve<'a>(
        &'a self,
        url: &'a str,
        options: TileSourceOptions,
    ) -> LocalBoxFuture<'a, Result<TileSourceSet>>;
}

/// How many times to try and how long to wait between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            delay: Duration::from_secs(1),
        }
    }
}

/// Status of the tile query as seen by the UI
#[derive(Debug, Clone, PartialEq)]
pub enum QueryStatus {
    Pending,
    Success(Arc<TileSourceSet>),
    Error(String),
}

impl QueryStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, QueryStatus::Pending)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryStatus::Error(_))
    }

    pub fn data(&self) -> Option<&Arc<TileSourceSet>> {
        match self {
            QueryStatus::Success(tiles) => Some(tiles),
            _ => None,
        }
    }
}

/// One load to run on the async side
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    pub url: String,
    pub options: TileSourceOptions,
    pub generation: u64,
}

/// Result of running a [`TileRequest`]
#[derive(Debug, Clone)]
pub struct TileOutcome {
    pub generation: u64,
    pub attempts: u32,
    pub result: std::result::Result<Arc<TileSourceSet>, SessionError>,
}

/// Tracks the status of the tile source for one image
#[derive(Debug)]
pub struct TileQuery {
    url: String,
    options: TileSourceOptions,
    status: QueryStatus,
    generation: u64,
    in_flight: bool,
    attempts: u32,
}

impl TileQuery {
    pub fn new(url: impl Into<String>, options: TileSourceOptions) -> Self {
        Self {
            url: url.into(),
            options,
            status: QueryStatus::Pending,
            generation: 0,
            in_flight: false,
            attempts: 0,
        }
    }

    pub fn status(&self) -> &QueryStatus {
        &self.status
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Attempts used by the last completed load
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Issue the initial request, or `None` if one is already running
    pub fn start(&mut self) -> Option<TileRequest> {
        if self.in_flight {
            return None;
        }
        self.generation += 1;
        self.in_flight = true;
        self.status = QueryStatus::Pending;
        Some(TileRequest {
            url: self.url.clone(),
            options: self.options,
            generation: self.generation,
        })
    }

    /// Re-enter `Pending` after a completed load
    pub fn refetch(&mut self) -> Option<TileRequest> {
        if self.in_flight {
            log::debug!("Refetch of {} ignored, load already in flight", self.url);
            return None;
        }
        self.start()
    }

    /// Forget any request in flight; its outcome will be ignored
    pub fn cancel(&mut self) {
        if self.in_flight {
            log::debug!("Cancelling tile load of {}", self.url);
        }
        self.generation += 1;
        self.in_flight = false;
        self.status = QueryStatus::Pending;
    }

    /// Apply an outcome; returns false when it belongs to a stale request
    pub fn resolve(&mut self, outcome: TileOutcome) -> bool {
        if !self.in_flight || outcome.generation != self.generation {
            log::debug!(
                "Ignoring stale tile outcome (generation {}, current {})",
                outcome.generation,
                self.generation
            );
            return false;
        }
        self.in_flight = false;
        self.attempts = outcome.attempts;
        self.status = match outcome.result {
            Ok(tiles) => QueryStatus::Success(tiles),
            Err(err) => QueryStatus::Error(err.user_message()),
        };
        true
    }
}

/// Runs tile requests against a provider, retrying failed attempts
pub struct TileSourceLoader {
    provider: Rc<dyn TileSourceProvider>,
    policy: RetryPolicy,
}

impl TileSourceLoader {
    pub fn new(provider: Rc<dyn TileSourceProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    pub async fn run(&self, request: TileRequest) -> TileOutcome {
        let started = Instant::now();
        let max_attempts = self.policy.retries.saturating_add(1);
        let mut attempts = 0;

        let result = loop {
            attempts += 1;
            log::info!(
                "Loading tile sources from {} (attempt {}/{})",
                request.url,
                attempts,
                max_attempts
            );
            match self.resolve_once(&request).await {
                Ok(tiles) => {
                    log::info!("Tile sources loaded: {} levels", tiles.len());
                    break Ok(Arc::new(tiles));
                }
                Err(err) if attempts < max_attempts => {
                    log::warn!("Tile source attempt {} failed: {:#}", attempts, err);
                    if !self.policy.delay.is_zero() {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
                Err(err) => {
                    log::error!("Error loading tile sources: {:#}", err);
                    break Err(SessionError::TileLoad(format!("{err:#}")));
                }
            }
        };

        if request.options.log_latency {
            log::info!(
                "Tile source resolution for {} took {:?}",
                request.url,
                started.elapsed()
            );
        }

        TileOutcome {
            generation: request.generation,
            attempts,
            result,
        }
    }

    async fn resolve_once(&self, request: &TileRequest) -> Result<TileSourceSet> {
        let tiles = self.provider.resolve(&request.url, request.options).await?;
        anyhow::ensure!(!tiles.is_empty(), "{} produced no tile sources", request.url);
        Ok(tiles)
    }
}
