//! Index coordinator: build lifecycle, incremental maintenance, search,
//! memory budget and snapshots.
//!
//! ## Concurrency
//!
//! - Builds are single-flight: concurrent `build_index` calls share one
//!   in-flight build and all receive its result. The build runs as its own
//!   task, so it completes and frees the slot even if every caller gives up.
//! - Every state change that replaces the index (build start, `clear`,
//!   snapshot install) bumps an epoch. A build whose epoch is stale when it
//!   finishes discards its result instead of installing it.
//! - Population runs on the blocking pool into a fresh [`IndexSet`] that is
//!   installed under the write lock, so readers see either no index or a
//!   complete one.
//! - `add_entry`, `remove_entry`, `clear`, eviction and installs take the
//!   write lock; `search` and `stats` take the read lock.
//! - Locks are never held across `.await`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use memory_types::{IndexConfig, MemoryEntry};

use crate::error::IndexError;
use crate::memory;
use crate::query::{search_indexed, search_linear, SearchPage, SearchQuery};
use crate::set::IndexSet;
use crate::snapshot::{IndexSnapshot, RestoreReport};
use crate::stats::{BuildOutcome, BuildState, BuildStats, IndexStats};
use crate::tokenizer::Tokenizer;

type SharedBuild = Shared<BoxFuture<'static, Result<BuildOutcome, IndexError>>>;

/// In-flight build and the epoch it was started under.
struct PendingBuild {
    epoch: u64,
    build: SharedBuild,
}

/// How `deserialize`/`restore` brought the index up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Snapshot applied
    Restored(RestoreReport),
    /// Snapshot unusable (or absent); index rebuilt from the collection
    Rebuilt(BuildOutcome),
}

#[derive(Debug, Default)]
struct IndexState {
    build_state: BuildState,
    /// Present only while `Built`
    set: Option<IndexSet>,
    last_build: Option<BuildStats>,
    estimated_memory_bytes: usize,
    evicted_total: usize,
    /// Bumped by build start, `clear` and snapshot installs
    epoch: u64,
}

impl IndexState {
    fn reset(&mut self) {
        self.build_state = BuildState::NotBuilt;
        self.set = None;
        self.estimated_memory_bytes = 0;
        self.evicted_total = 0;
    }
}

struct CoordinatorInner {
    config: IndexConfig,
    tokenizer: Tokenizer,
    state: RwLock<IndexState>,
    pending: Mutex<Option<PendingBuild>>,
    generation: AtomicU64,
}

impl CoordinatorInner {
    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, Option<PendingBuild>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Finish the build started under `epoch`.
    ///
    /// Applies `apply` only if no clear, restore or newer build has happened
    /// since, and frees the single-flight slot if it still belongs to this
    /// build. Lock order is `pending` then `state`, as in `build_index`.
    fn settle(&self, epoch: u64, apply: impl FnOnce(&mut IndexState)) -> bool {
        let mut pending = self.pending();
        let current = {
            let mut state = self.write();
            let current = state.epoch == epoch;
            if current {
                apply(&mut state);
            }
            current
        };
        if pending.as_ref().is_some_and(|p| p.epoch == epoch) {
            *pending = None;
        }
        current
    }

    /// Replace the index outside of a build: clears any build slot and
    /// advances the epoch so an in-flight build cannot install over it.
    fn supersede(&self, apply: impl FnOnce(&mut IndexState)) {
        let mut pending = self.pending();
        let mut state = self.write();
        if pending.take().is_some() {
            debug!("Superseding in-flight index build");
        }
        state.epoch += 1;
        apply(&mut state);
    }

    /// Populate a fresh index set from `entries` and install it.
    fn run_build(&self, entries: Vec<MemoryEntry>, epoch: u64) -> Result<BuildOutcome, IndexError> {
        let threshold = self.config.index_threshold;
        if entries.len() < threshold {
            info!(
                entries = entries.len(),
                threshold, "Collection below index threshold, using linear scan"
            );
            self.settle(epoch, IndexState::reset);
            return Ok(BuildOutcome::BelowThreshold {
                entry_count: entries.len(),
                threshold,
            });
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(entries = entries.len(), generation, "Building index");
        let start = Instant::now();

        let mut set = IndexSet::new(&self.config);
        for entry in &entries {
            if let Err(e) = set.insert(entry) {
                warn!(error = %e, id = %entry.id, "Index build failed, discarding partial state");
                self.settle(epoch, IndexState::reset);
                return Err(e);
            }
        }

        let estimated = memory::estimate_bytes(&set);
        let report = memory::enforce_budget(
            &mut set,
            estimated,
            self.config.max_memory_bytes(),
            self.config.enable_lru_eviction,
        );

        let stats = BuildStats {
            entry_count: set.len(),
            duration_ms: start.elapsed().as_millis() as u64,
            built_at: Utc::now(),
        };

        let installed = self.settle(epoch, |state| {
            state.set = Some(set);
            state.build_state = BuildState::Built;
            state.last_build = Some(stats);
            state.estimated_memory_bytes = report.estimated_bytes;
            state.evicted_total = report.evicted;
        });
        if !installed {
            info!(generation, "Index build superseded, result discarded");
            return Err(IndexError::Superseded);
        }

        info!(
            entries = stats.entry_count,
            duration_ms = stats.duration_ms,
            estimated_bytes = report.estimated_bytes,
            evicted = report.evicted,
            "Index build complete"
        );

        Ok(BuildOutcome::Built(stats))
    }

    /// Parse, validate and apply a snapshot, then install it.
    fn apply_snapshot(&self, bytes: &[u8], current: &[MemoryEntry]) -> Result<RestoreReport, IndexError> {
        let snapshot = IndexSnapshot::from_bytes(bytes)?;
        let build = snapshot.build;
        let (mut set, restore) = snapshot.restore(&self.config, current)?;

        let estimated = memory::estimate_bytes(&set);
        let budget = memory::enforce_budget(
            &mut set,
            estimated,
            self.config.max_memory_bytes(),
            self.config.enable_lru_eviction,
        );

        self.supersede(|state| {
            state.set = Some(set);
            state.build_state = BuildState::Built;
            state.last_build = build;
            state.estimated_memory_bytes = budget.estimated_bytes;
            state.evicted_total = budget.evicted;
        });
        Ok(restore)
    }
}

/// Owner of every sub-index.
///
/// Cheap to clone; clones share the same index.
#[derive(Clone)]
pub struct IndexCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl IndexCoordinator {
    pub fn new(config: IndexConfig) -> Self {
        let tokenizer = Tokenizer::from_config(&config);
        Self {
            inner: Arc::new(CoordinatorInner {
                config,
                tokenizer,
                state: RwLock::new(IndexState::default()),
                pending: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Create after checking `config` for out-of-range values.
    pub fn try_new(config: IndexConfig) -> Result<Self, IndexError> {
        config.validate().map_err(IndexError::Config)?;
        Ok(Self::new(config))
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(IndexConfig::default())
    }

    pub fn config(&self) -> &IndexConfig {
        &self.inner.config
    }

    pub fn state(&self) -> BuildState {
        self.inner.read().build_state
    }

    pub fn is_built(&self) -> bool {
        self.state() == BuildState::Built
    }

    /// Discard the current index and build a new one from `entries`.
    ///
    /// While a build is in flight, further calls wait for that build and
    /// get its result instead of starting another. On error all partial
    /// state is dropped and the coordinator is left `NotBuilt`.
    /// A build overtaken by `clear` or a snapshot install returns
    /// [`IndexError::Superseded`] and leaves the newer state in place.
    pub async fn build_index(&self, entries: Vec<MemoryEntry>) -> Result<BuildOutcome, IndexError> {
        let build = {
            let mut pending = self.inner.pending();
            match pending.as_ref() {
                Some(in_flight) => {
                    debug!(epoch = in_flight.epoch, "Attaching to in-flight index build");
                    in_flight.build.clone()
                }
                None => {
                    let epoch = {
                        let mut state = self.inner.write();
                        state.reset();
                        state.build_state = BuildState::Building;
                        state.epoch += 1;
                        state.epoch
                    };

                    let inner = Arc::clone(&self.inner);
                    let handle = tokio::spawn(async move {
                        let worker = Arc::clone(&inner);
                        match tokio::task::spawn_blocking(move || worker.run_build(entries, epoch)).await {
                            Ok(result) => result,
                            Err(join_err) => {
                                warn!(error = %join_err, "Index build worker failed");
                                inner.settle(epoch, IndexState::reset);
                                Err(IndexError::from(join_err))
                            }
                        }
                    });
                    let build = async move { handle.await.unwrap_or_else(|e| Err(IndexError::from(e))) }
                        .boxed()
                        .shared();

                    *pending = Some(PendingBuild {
                        epoch,
                        build: build.clone(),
                    });
                    build
                }
            }
        };

        build.await
    }

    /// Index one entry (upsert). No-op unless built.
    ///
    /// Updates the memory estimate but never evicts; the budget is enforced
    /// when a build or snapshot install completes. Returns whether the index
    /// changed.
    pub fn add_entry(&self, entry: &MemoryEntry) -> bool {
        let mut guard = self.inner.write();
        let state = &mut *guard;
        if state.build_state != BuildState::Built {
            debug!(id = %entry.id, state = %state.build_state, "Index not built, ignoring add");
            return false;
        }
        let Some(set) = state.set.as_mut() else {
            return false;
        };

        let before = memory::entry_footprint(set, &entry.id);
        if let Err(e) = set.insert(entry) {
            warn!(error = %e, "Rejected incremental add");
            return false;
        }
        let after = memory::entry_footprint(set, &entry.id);

        state.estimated_memory_bytes = state.estimated_memory_bytes.saturating_sub(before) + after;
        true
    }

    /// Remove one entry from every sub-index. No-op unless built.
    ///
    /// Returns whether the id was indexed.
    pub fn remove_entry(&self, id: &str) -> bool {
        let mut guard = self.inner.write();
        let state = &mut *guard;
        if state.build_state != BuildState::Built {
            debug!(id, state = %state.build_state, "Index not built, ignoring remove");
            return false;
        }
        let Some(set) = state.set.as_mut() else {
            return false;
        };

        let footprint = memory::entry_footprint(set, id);
        if set.remove(id).is_none() {
            return false;
        }
        state.estimated_memory_bytes = state.estimated_memory_bytes.saturating_sub(footprint);
        true
    }

    /// Run `query` against the index, or scan `fallback` when not built.
    pub fn search(&self, query: &SearchQuery, fallback: &[MemoryEntry]) -> SearchPage {
        {
            let state = self.inner.read();
            if state.build_state == BuildState::Built {
                if let Some(set) = state.set.as_ref() {
                    return search_indexed(set, query);
                }
            }
        }
        search_linear(fallback, query, &self.inner.tokenizer)
    }

    pub fn stats(&self) -> IndexStats {
        let state = self.inner.read();
        let set = state.set.as_ref();
        IndexStats {
            built: state.build_state == BuildState::Built,
            state: state.build_state,
            entry_count: set.map(IndexSet::len).unwrap_or(0),
            tag_count: set.map(|s| s.tags().len()).unwrap_or(0),
            term_count: set
                .and_then(IndexSet::content)
                .map(|c| c.term_count())
                .unwrap_or(0),
            privacy_bucket_count: set.map(|s| s.privacy().len()).unwrap_or(0),
            last_built_at: state.last_build.map(|b| b.built_at),
            last_build_duration_ms: state.last_build.map(|b| b.duration_ms).unwrap_or(0),
            estimated_memory_bytes: state.estimated_memory_bytes,
            evicted_total: state.evicted_total,
            build_generation: self.inner.generation.load(Ordering::SeqCst),
        }
    }

    /// Read access to the live index set, if built.
    pub fn with_index<R>(&self, f: impl FnOnce(&IndexSet) -> R) -> Option<R> {
        let state = self.inner.read();
        match (state.build_state, state.set.as_ref()) {
            (BuildState::Built, Some(set)) => Some(f(set)),
            _ => None,
        }
    }

    /// Versioned snapshot of tag, privacy and temporal indexes plus stats.
    pub fn serialize(&self) -> Result<Vec<u8>, IndexError> {
        let state = self.inner.read();
        match (state.build_state, state.set.as_ref()) {
            (BuildState::Built, Some(set)) => {
                IndexSnapshot::capture(set, state.last_build, state.estimated_memory_bytes).to_bytes()
            }
            _ => Err(IndexError::NotBuilt),
        }
    }

    /// Restore from `bytes`, reconciling with `current`.
    ///
    /// An unusable snapshot is not an error: the index is rebuilt from
    /// `current` instead, and only a failure of that rebuild is returned.
    pub async fn deserialize(
        &self,
        bytes: &[u8],
        current: Vec<MemoryEntry>,
    ) -> Result<RestoreOutcome, IndexError> {
        let inner = Arc::clone(&self.inner);
        let owned = bytes.to_vec();
        let (applied, current) = tokio::task::spawn_blocking(move || {
            let applied = inner.apply_snapshot(&owned, &current);
            (applied, current)
        })
        .await?;

        match applied {
            Ok(report) => {
                info!(
                    restored = report.restored,
                    pruned = report.pruned,
                    reindexed = report.reindexed,
                    added = report.added,
                    "Index restored from snapshot"
                );
                Ok(RestoreOutcome::Restored(report))
            }
            Err(e) => {
                warn!(error = %e, "Snapshot rejected, rebuilding index");
                let outcome = self.build_index(current).await?;
                Ok(RestoreOutcome::Rebuilt(outcome))
            }
        }
    }

    /// Write a snapshot to `snapshot_path` when persistence is enabled.
    ///
    /// Returns the path written, or `None` with persistence off.
    pub fn persist(&self) -> Result<Option<PathBuf>, IndexError> {
        if !self.inner.config.enable_persistence {
            return Ok(None);
        }

        let bytes = self.serialize()?;
        let path = self.inner.config.snapshot_path.clone();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &path)?;

        info!(path = ?path, bytes = bytes.len(), "Index snapshot written");
        Ok(Some(path))
    }

    /// Bring the index up from the persisted snapshot, or build from `current`.
    pub async fn restore(&self, current: Vec<MemoryEntry>) -> Result<RestoreOutcome, IndexError> {
        if !self.inner.config.enable_persistence {
            return Ok(RestoreOutcome::Rebuilt(self.build_index(current).await?));
        }

        let path = &self.inner.config.snapshot_path;
        match std::fs::read(path) {
            Ok(bytes) => self.deserialize(&bytes, current).await,
            Err(e) => {
                info!(path = ?path, error = %e, "No usable snapshot, building index");
                Ok(RestoreOutcome::Rebuilt(self.build_index(current).await?))
            }
        }
    }

    /// Drop every structure and return to `NotBuilt`.
    ///
    /// A build in flight is superseded: it finishes but does not install.
    pub fn clear(&self) {
        self.inner.supersede(IndexState::reset);
        debug!("Index cleared");
    }
}

impl std::fmt::Debug for IndexCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCoordinator")
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish()
    }
}
