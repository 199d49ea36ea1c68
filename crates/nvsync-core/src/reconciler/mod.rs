//! Converges the engine's live resources onto a submitted configuration.
//!
//! A pass runs in two phases: first resource existence and fields (volumes,
//! then meshes and their layers), then cross-resource relationships
//! (modulation) resolved against the now-current locator index. Viewer
//! options are applied last.
//!
//! Passes never interleave. Every submission bumps a generation counter; a
//! pass re-checks it after each awaited load and stops early once a newer
//! configuration is waiting, discarding loads the newer one does not want.
//! The task holding the pass lock then runs the newer configuration itself.

mod meshes;
mod options;
mod volumes;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use crate::config::ViewerConfig;
use crate::engine::{Engine, EngineError, HandleId};
use crate::live::LiveTable;
use crate::locator::ResourceKind;
use crate::report::{PassOutcome, PassReport, ReconcileError, ReportSink, Severity};
use crate::state::{Lifecycle, ResourceKey, ResourceState};

/// A configuration waiting for the next pass.
struct Submission {
    generation: u64,
    config: Arc<ViewerConfig>,
}

/// Sole owner and writer of the engine's live resources.
pub struct Reconciler<E: Engine + ?Sized> {
    engine: Arc<E>,
    /// Held for the whole of a pass.
    live: AsyncMutex<LiveTable>,
    lifecycle: Mutex<Lifecycle>,
    generation: AtomicU64,
    /// Latest submitted configuration not yet picked up by a pass.
    pending: Mutex<Option<Submission>>,
    sink: Option<Box<dyn ReportSink>>,
}

impl<E: Engine + ?Sized> Reconciler<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self {
            engine,
            live: AsyncMutex::new(LiveTable::new()),
            lifecycle: Mutex::new(Lifecycle::new()),
            generation: AtomicU64::new(0),
            pending: Mutex::new(None),
            sink: None,
        }
    }

    /// Forward every reported condition to `sink` as well as the pass report.
    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Generation of the most recent submission.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Submit a configuration and wait until it has been handled.
    ///
    /// The configuration is queued as soon as this is called, before the
    /// returned future is first polled, so submission order is call order.
    ///
    /// Latest wins: if newer configurations arrive while this one waits for
    /// the running pass, only the newest is applied. Whoever holds the pass
    /// lock keeps running passes until nothing newer is waiting, so the
    /// engine converges even if the newer submitter stopped waiting. The
    /// returned report's generation names the configuration that was
    /// actually applied.
    pub fn submit(&self, config: ViewerConfig) -> impl Future<Output = PassReport> + '_ {
        let generation = self.enqueue(config);
        self.drive(generation)
    }

    fn enqueue(&self, config: ViewerConfig) -> u64 {
        let mut pending = self.pending_slot();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *pending = Some(Submission {
            generation,
            config: Arc::new(config),
        });
        log::debug!("configuration {} submitted", generation);
        generation
    }

    async fn drive(&self, generation: u64) -> PassReport {
        let mut live = self.live.lock().await;
        let Some(mut submission) = self.pending_slot().take() else {
            log::debug!("configuration {} coalesced into a newer pass", generation);
            return PassReport::coalesced(generation);
        };

        let mut report = Pass::new(self, &mut live, submission).run().await;
        while report.outcome == PassOutcome::Superseded {
            submission = match self.pending_slot().take() {
                Some(next) => next,
                None => break,
            };
            log::debug!(
                "pass {} continuing with configuration {}",
                report.generation,
                submission.generation
            );
            let mut next = Pass::new(self, &mut live, submission).run().await;
            next.continue_from(report);
            report = next;
        }
        report
    }

    /// Lifecycle state of a resource. Readable while a pass is running.
    pub fn resource_state(&self, key: &ResourceKey) -> ResourceState {
        self.lifecycle().get(key)
    }

    /// Locators of the live volumes, in engine order.
    pub async fn loaded_volumes(&self) -> Vec<String> {
        let live = self.live.lock().await;
        live.volume_locators().into_iter().map(String::from).collect()
    }

    pub async fn loaded_meshes(&self) -> Vec<String> {
        let live = self.live.lock().await;
        live.mesh_locators().into_iter().map(String::from).collect()
    }

    /// Locators of the live layers on a mesh.
    pub async fn loaded_layers(&self, mesh: &str) -> Vec<String> {
        let live = self.live.lock().await;
        live.mesh_index(mesh)
            .map(|i| live.meshes[i].layers.iter().map(|l| l.locator().to_string()).collect())
            .unwrap_or_default()
    }

    pub async fn volume_handle(&self, locator: &str) -> Option<HandleId> {
        self.live.lock().await.volume_handle(locator)
    }

    fn pending_slot(&self) -> MutexGuard<'_, Option<Submission>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != generation
    }

    /// Whether the newest waiting configuration still wants this resource.
    fn pending_wants(&self, key: &ResourceKey) -> bool {
        let pending = self.pending_slot();
        let Some(submission) = pending.as_ref() else {
            return false;
        };
        let config = &submission.config;
        match key.kind {
            ResourceKind::Volume => config.has_volume(&key.locator),
            ResourceKind::Mesh => config.mesh(&key.locator).is_some(),
            ResourceKind::MeshLayer => key
                .parent
                .as_deref()
                .and_then(|mesh| config.mesh(mesh))
                .and_then(|mesh| mesh.layer(&key.locator))
                .is_some(),
        }
    }
}

/// Marker returned when a newer configuration cut the pass short.
pub(crate) struct Superseded;

/// State of one reconciliation pass.
pub(crate) struct Pass<'a, E: Engine + ?Sized> {
    reconciler: &'a Reconciler<E>,
    live: &'a mut LiveTable,
    config: Arc<ViewerConfig>,
    report: PassReport,
}

impl<'a, E: Engine + ?Sized> Pass<'a, E> {
    fn new(reconciler: &'a Reconciler<E>, live: &'a mut LiveTable, submission: Submission) -> Self {
        Self {
            reconciler,
            live,
            config: submission.config,
            report: PassReport::new(submission.generation),
        }
    }

    async fn run(mut self) -> PassReport {
        log::info!(
            "pass {}: {} volumes, {} meshes",
            self.report.generation,
            self.config.volumes.len(),
            self.config.meshes.len()
        );
        let config = Arc::clone(&self.config);
        for issue in config.validate().into_iter().filter(|i| !i.is_modulation()) {
            self.record(issue.into());
        }

        if self.converge().await.is_err() {
            self.report.outcome = PassOutcome::Superseded;
        }

        log::info!(
            "pass {} {:?}: {} engine calls, {} reported",
            self.report.generation,
            self.report.outcome,
            self.report.stats.engine_calls(),
            self.report.errors.len()
        );
        self.report
    }

    async fn converge(&mut self) -> Result<(), Superseded> {
        self.converge_volumes().await?;
        self.resolve_modulation();
        self.converge_meshes().await?;
        self.apply_options();
        Ok(())
    }

    fn engine(&self) -> &'a E {
        let reconciler: &'a Reconciler<E> = self.reconciler;
        &reconciler.engine
    }

    fn check_generation(&self) -> Result<(), Superseded> {
        if self.reconciler.is_stale(self.report.generation) {
            Err(Superseded)
        } else {
            Ok(())
        }
    }

    fn advance(&self, key: &ResourceKey, to: ResourceState) {
        // Invalid transitions are already logged by the lifecycle.
        let _ = self.reconciler.lifecycle().advance(key, to);
    }

    fn record(&mut self, error: ReconcileError) {
        match error.severity() {
            Severity::Error | Severity::Warning => log::warn!("{}", error),
            Severity::Info => log::info!("{}", error),
        }
        if let Some(sink) = &self.reconciler.sink {
            sink.report(&error);
        }
        self.report.errors.push(error);
    }

    /// Unload a resource through `unload`, tracking its lifecycle.
    fn release<F>(&mut self, key: &ResourceKey, unload: F)
    where
        F: FnOnce(&E) -> Result<(), EngineError>,
    {
        self.advance(key, ResourceState::Unloading);
        self.report.stats.unloads += 1;
        match unload(self.engine()) {
            Ok(()) => log::debug!("unloaded {} '{}'", key.kind, key.locator),
            Err(cause) => self.record(ReconcileError::ResourceUnload {
                resource: key.kind,
                locator: key.locator.clone(),
                cause,
            }),
        }
        self.advance(key, ResourceState::Absent);
    }

    /// Release a resource whose load landed after its configuration was
    /// superseded by one that no longer wants it.
    fn discard<F>(&mut self, key: &ResourceKey, unload: F)
    where
        F: FnOnce(&E) -> Result<(), EngineError>,
    {
        self.release(key, unload);
        self.record(ReconcileError::ConfigurationRaceDiscarded {
            resource: key.kind,
            locator: key.locator.clone(),
        });
    }

    /// Record a failed load. The resource stays out of the live table so the
    /// next pass tries again.
    fn load_failed(&mut self, key: &ResourceKey, cause: EngineError) {
        self.advance(key, ResourceState::LoadFailed);
        self.record(ReconcileError::ResourceLoad {
            resource: key.kind,
            locator: key.locator.clone(),
            cause,
        });
    }

    /// What to do with a resource that just finished loading.
    fn landing(&self, key: &ResourceKey) -> Landing {
        if !self.reconciler.is_stale(self.report.generation) {
            Landing::Commit
        } else if self.reconciler.pending_wants(key) {
            Landing::CommitAndStop
        } else {
            Landing::Discard
        }
    }
}

enum Landing {
    Commit,
    /// Superseded, but the newer configuration keeps the resource.
    CommitAndStop,
    Discard,
}
