//! Bench-level coordination: shared module locks and parallel job runs.
//!
//! A bench hosts several device modules that tests may exercise
//! concurrently. Each module carries a lock, and locking a module also
//! locks everything it depends on, so two jobs never drive the same
//! hardware at once.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use tracing::{debug, error, warn};

use crate::config::BenchConfig;
use crate::step::TestStep;

/// Guard set returned by [`TestBench::lock`]; the modules stay locked
/// until it is dropped.
pub type ModuleGuards = Vec<ArcMutexGuard<RawMutex, ()>>;

/// Shared bench state: one lock per module plus the dependency graph.
#[derive(Debug, Clone)]
pub struct TestBench {
    locks: BTreeMap<String, Arc<Mutex<()>>>,
    depends: BTreeMap<String, Vec<String>>,
    log_dir: PathBuf,
}

impl TestBench {
    /// Build the bench from configuration. The log directory is recreated
    /// empty so every run starts with a clean slate.
    pub fn new(config: &BenchConfig) -> std::io::Result<Self> {
        let log_dir = config.log_dir.clone();
        if log_dir.exists() {
            fs::remove_dir_all(&log_dir)?;
        }
        fs::create_dir_all(&log_dir)?;

        let mut locks = BTreeMap::new();
        let mut depends = BTreeMap::new();
        for (name, module) in &config.modules {
            locks.insert(name.clone(), Arc::new(Mutex::new(())));
            depends.insert(name.clone(), module.depends.clone());
        }
        Ok(Self {
            locks,
            depends,
            log_dir,
        })
    }

    /// Lock `module` and, transitively, every module it depends on.
    /// Unknown names are logged and skipped rather than failing the run.
    pub fn lock(&self, module: &str) -> ModuleGuards {
        let mut wanted = Vec::new();
        self.collect(module, &mut wanted);

        let mut guards = Vec::with_capacity(wanted.len());
        for name in wanted {
            match self.locks.get(&name) {
                Some(lock) => {
                    debug!(module = %name, "locking module");
                    guards.push(lock.lock_arc());
                }
                None => warn!(module = %name, "unknown module in dependency graph"),
            }
        }
        guards
    }

    /// Depth-first dependency walk, deduplicated, dependencies first.
    fn collect(&self, module: &str, out: &mut Vec<String>) {
        if out.iter().any(|m| m == module) {
            return;
        }
        if let Some(deps) = self.depends.get(module) {
            for dep in deps {
                self.collect(dep, out);
            }
        }
        out.push(module.to_string());
    }

    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.locks.keys().map(String::as_str)
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path for a per-module log file inside the bench log directory.
    pub fn log_file(&self, name: &str) -> PathBuf {
        self.log_dir.join(format!("{name}.log"))
    }
}

/// Runs test jobs on worker threads and gathers their steps.
///
/// Each job produces the steps it resolved; `wait` joins all workers and
/// returns the steps in spawn order so reports stay deterministic.
#[derive(Debug, Default)]
pub struct Runner {
    workers: Vec<(String, JoinHandle<Vec<TestStep>>)>,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a job on its own thread.
    pub fn spawn<F>(&mut self, name: &str, job: F)
    where
        F: FnOnce() -> Vec<TestStep> + Send + 'static,
    {
        self.workers.push((name.to_string(), thread::spawn(job)));
    }

    /// Join every worker and collect their steps in spawn order.
    /// A panicked job is logged and contributes no steps.
    pub fn wait(self) -> Vec<TestStep> {
        let mut steps = Vec::new();
        for (name, handle) in self.workers {
            match handle.join() {
                Ok(mut produced) => steps.append(&mut produced),
                Err(_) => error!(job = %name, "test job panicked"),
            }
        }
        steps
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
