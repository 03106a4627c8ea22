//! Worker threads for packet handlers.
//!
//! Cheap handlers run on the blocking pool of a tokio runtime owned by the
//! executor. The runtime has no async workers of its own; it exists for its
//! bounded, named blocking pool. Expensive handlers each get their own named OS thread so a long
//! computation never occupies a pool slot.

use crate::error::{DispatchError, HandlerError};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error, warn};

/// Dispatcher thread configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Upper bound on shared pool threads running handlers
    pub max_pool_threads: usize,
    /// Prefix for thread names
    pub thread_name: String,
    /// Handlers running longer than this are logged
    pub slow_handler_threshold: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_pool_threads: 64,
            thread_name: "courier-dispatch".to_string(),
            slow_handler_threshold: Duration::from_secs(5),
        }
    }
}

impl DispatchConfig {
    /// Set the shared pool bound
    pub fn with_max_pool_threads(mut self, threads: usize) -> Self {
        self.max_pool_threads = threads.max(1);
        self
    }

    /// Set the thread name prefix
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the slow handler threshold
    pub fn with_slow_handler_threshold(mut self, threshold: Duration) -> Self {
        self.slow_handler_threshold = threshold;
        self
    }
}

pub(crate) struct Executor {
    runtime: Option<Runtime>,
    handle: Handle,
    config: DispatchConfig,
    dedicated: AtomicU64,
}

impl Executor {
    pub(crate) fn new(config: DispatchConfig) -> Result<Self, DispatchError> {
        let runtime = Builder::new_current_thread()
            .max_blocking_threads(config.max_pool_threads.max(1))
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()
            .map_err(DispatchError::Spawn)?;
        let handle = runtime.handle().clone();

        debug!("Dispatcher pool started: up to {} threads", config.max_pool_threads);
        Ok(Self {
            runtime: Some(runtime),
            handle,
            config,
            dedicated: AtomicU64::new(0),
        })
    }

    pub(crate) fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run `job` on the shared pool
    pub(crate) fn spawn_shared<F>(&self, label: String, job: F)
    where
        F: FnOnce() -> Result<(), HandlerError> + Send + 'static,
    {
        let threshold = self.config.slow_handler_threshold;
        drop(
            self.handle
                .spawn_blocking(move || run_guarded(&label, threshold, job)),
        );
    }

    /// Run `job` on a new named thread
    pub(crate) fn spawn_dedicated<F>(&self, label: String, job: F) -> Result<(), DispatchError>
    where
        F: FnOnce() -> Result<(), HandlerError> + Send + 'static,
    {
        let threshold = self.config.slow_handler_threshold;
        let id = self.dedicated.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-expensive-{}", self.config.thread_name, id);

        thread::Builder::new()
            .name(name)
            .spawn(move || run_guarded(&label, threshold, job))
            .map_err(DispatchError::Spawn)?;
        Ok(())
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn run_guarded<F>(label: &str, threshold: Duration, job: F)
where
    F: FnOnce() -> Result<(), HandlerError>,
{
    let started = Instant::now();
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(Ok(())) => debug!("Handled {} in {:?}", label, started.elapsed()),
        Ok(Err(e)) => error!("Handler for {} failed: {}", label, e),
        Err(payload) => error!("Handler for {} panicked: {}", label, panic_message(&*payload)),
    }

    let elapsed = started.elapsed();
    if elapsed > threshold {
        warn!("Slow handler for {}: {:?} (threshold {:?})", label, elapsed, threshold);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic"
    }
}
