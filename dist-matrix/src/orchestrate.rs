//! Running every matrix entry through provision -> build -> package -> publish
//!
//! Each entry is its own task in a [`JoinSet`][], and nothing an entry does can
//! fail its siblings: every problem ends up as that entry's [`EntryOutcome`][].
//! Provisioning and packaging block, so they run on tokio's blocking pool.
//! Building and publishing are async and stop as soon as their entry is dropped.
//!
//! A blocking stage can't be interrupted, so it keeps its entry's `--jobs`
//! permit (and the toolchain lock, while provisioning) until it returns, even
//! if the entry has already timed out or been cancelled.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dist_matrix_schema::{EntryOutcome, EntryReport};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::{AbortHandle, JoinSet};
use tracing::{info, warn};

use crate::build::cargo::CargoBuilder;
use crate::build::Build;
use crate::config::Config;
use crate::errors::EntryError;
use crate::matrix::MatrixEntry;
use crate::net::ClientSettings;
use crate::package::{ArchivePackager, Package};
use crate::publish::{GithubPublisher, Publish};
use crate::release::ReleaseContext;
use crate::toolchain::{Provision, RustupProvisioner};
use crate::{DistError, DistResult};

/// The four stages every entry goes through
#[derive(Clone)]
pub struct Pipeline {
    /// Gets the toolchain in place
    pub provisioner: Arc<dyn Provision>,
    /// Compiles the binary
    pub builder: Arc<dyn Build>,
    /// Archives the binary
    pub packager: Arc<dyn Package>,
    /// Attaches the archive to the release
    pub publisher: Arc<dyn Publish>,
}

impl Pipeline {
    /// The real thing: rustup, cargo/cross, tar/zip, and GitHub
    pub fn for_config(cfg: &Config) -> DistResult<Self> {
        Ok(Self {
            provisioner: Arc::new(RustupProvisioner::new(&cfg.cross)),
            builder: Arc::new(CargoBuilder::new(cfg)),
            packager: Arc::new(ArchivePackager::new(cfg)),
            publisher: Arc::new(GithubPublisher::new(&ClientSettings::new())?),
        })
    }
}

/// Knobs for how the matrix gets run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Give up on an entry after this long
    pub timeout: Option<Duration>,
    /// How many entries may be in flight at once (None means all of them)
    pub jobs: Option<usize>,
}

impl RunOptions {
    /// Options from the run's config
    pub fn new(cfg: &Config) -> Self {
        Self {
            timeout: cfg.timeout,
            jobs: cfg.jobs,
        }
    }
}

/// Drive `future` to completion on a fresh multi-threaded runtime
///
/// Blocking stages that outlived their entry (timed out or cancelled) are
/// abandoned on the way out instead of holding the process open until they return.
pub fn block_on_run<F: Future>(future: F) -> DistResult<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

/// Run every entry, stopping early if the user hits Ctrl-C
///
/// With no `release` nothing is uploaded, entries stop after packaging.
pub async fn run_matrix(
    entries: &[MatrixEntry],
    pipeline: Pipeline,
    release: Option<Arc<ReleaseContext>>,
    opts: RunOptions,
) -> Vec<EntryReport> {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // no signal handling here, so never cancel
            std::future::pending::<()>().await;
        }
    };
    run_matrix_until(entries, pipeline, release, opts, ctrl_c).await
}

/// Run every entry until they're all done or `shutdown` completes
///
/// The reports are in the same order as `entries`. Entries that were still
/// going when `shutdown` fired are reported as cancelled.
pub async fn run_matrix_until(
    entries: &[MatrixEntry],
    pipeline: Pipeline,
    release: Option<Arc<ReleaseContext>>,
    opts: RunOptions,
    shutdown: impl Future<Output = ()>,
) -> Vec<EntryReport> {
    let semaphore = opts.jobs.map(|jobs| Arc::new(Semaphore::new(jobs)));
    // rustup doesn't lock its own state, so only one entry provisions at a time
    let toolchain = Arc::new(Mutex::new(()));
    let mut outcomes: Vec<Option<EntryOutcome>> = vec![None; entries.len()];

    let mut set = JoinSet::new();
    for (idx, entry) in entries.iter().cloned().enumerate() {
        let shared = EntryShared {
            pipeline: pipeline.clone(),
            release: release.clone(),
            toolchain: toolchain.clone(),
            permit: None,
        };
        let semaphore = semaphore.clone();
        let timeout = opts.timeout;
        set.spawn(async move {
            let permit = match semaphore {
                Some(semaphore) => semaphore.acquire_owned().await.ok().map(Arc::new),
                None => None,
            };
            let shared = EntryShared { permit, ..shared };
            let result = supervise_entry(entry, shared, timeout).await;
            (idx, result)
        });
    }

    let mut cancelled = false;
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            joined = set.join_next() => {
                let Some(joined) = joined else {
                    break;
                };
                match joined {
                    Ok((idx, result)) => {
                        outcomes[idx] = Some(into_outcome(result));
                    }
                    Err(e) => warn!("lost track of a matrix entry: {e}"),
                }
            }
            _ = &mut shutdown => {
                warn!("cancelling every unfinished matrix entry");
                cancelled = true;
                set.abort_all();
                break;
            }
        }
    }

    entries
        .iter()
        .zip(outcomes)
        .map(|(entry, outcome)| {
            let outcome = outcome.unwrap_or_else(|| {
                let target = entry.target_triple.clone();
                let err = if cancelled {
                    EntryError::Cancelled { target }
                } else {
                    EntryError::Aborted {
                        target,
                        reason: "the task never reported back".to_owned(),
                    }
                };
                into_outcome(Err(err))
            });
            entry.report(outcome)
        })
        .collect()
}

/// Everything an entry's task borrows from the run
#[derive(Clone)]
struct EntryShared {
    pipeline: Pipeline,
    release: Option<Arc<ReleaseContext>>,
    /// Held while provisioning
    toolchain: Arc<Mutex<()>>,
    /// This entry's `--jobs` slot, if there's a limit
    permit: Option<Arc<OwnedSemaphorePermit>>,
}

/// Aborts the task when dropped, so cancelling the supervisor cancels the entry
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run one entry in its own task, enforcing the time limit and catching panics
async fn supervise_entry(
    entry: MatrixEntry,
    shared: EntryShared,
    timeout: Option<Duration>,
) -> Result<EntryOutcome, EntryError> {
    let target = entry.target_triple.clone();
    let mut task = tokio::spawn(run_entry(entry, shared));
    let _guard = AbortOnDrop(task.abort_handle());

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                return Err(EntryError::TimedOut {
                    target,
                    secs: limit.as_secs(),
                })
            }
        },
        None => (&mut task).await,
    };
    joined.unwrap_or_else(|e| {
        Err(EntryError::Aborted {
            target,
            reason: e.to_string(),
        })
    })
}

/// Run a blocking stage on the blocking pool
///
/// `held` stays alive until the stage returns, even if nobody is waiting for it anymore.
async fn blocking<T, H, F>(held: H, stage: F) -> DistResult<T>
where
    T: Send + 'static,
    H: Send + 'static,
    F: FnOnce() -> DistResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let _held = held;
        stage()
    })
    .await?
}

/// The four stages, in order, for one entry
async fn run_entry(entry: MatrixEntry, shared: EntryShared) -> Result<EntryOutcome, EntryError> {
    let EntryShared {
        pipeline,
        release,
        toolchain,
        permit,
    } = shared;
    let target = entry.target_triple.clone();

    let toolchain = toolchain.lock_owned().await;
    info!("{target}: provisioning toolchain");
    let provisioner = pipeline.provisioner.clone();
    let to_provision = entry.clone();
    blocking((toolchain, permit.clone()), move || {
        provisioner.provision(&to_provision)
    })
    .await
    .map_err(|details| EntryError::ToolchainUnavailable {
        target: target.clone(),
        details,
    })?;

    info!("{target}: building");
    let build = pipeline
        .builder
        .build(&entry)
        .await
        .map_err(|details| EntryError::BuildFailure {
            target: target.clone(),
            details,
        })?;
    if !build.success() {
        return Err(EntryError::BuildFailure {
            details: DistError::MissingBinary {
                bin_name: entry.bin_name.clone(),
                target: target.clone(),
            },
            target,
        });
    }

    info!("{target}: packaging {}", entry.archive_name);
    let packager = pipeline.packager.clone();
    let artifact = blocking(permit.clone(), move || packager.package(&build))
        .await
        .map_err(|details| EntryError::PackagingFailure {
            archive_name: entry.archive_name.clone(),
            details,
        })?;

    let Some(release) = release else {
        info!("{target}: not publishing, archive left at {}", artifact.path);
        return Ok(EntryOutcome::Packaged {
            path: Some(artifact.path.to_string()),
        });
    };

    info!("{target}: publishing {}", artifact.name);
    pipeline
        .publisher
        .publish(&artifact, &release)
        .await
        .map_err(|details| EntryError::UploadFailure {
            archive_name: entry.archive_name.clone(),
            details,
        })?;
    Ok(EntryOutcome::Uploaded)
}

fn into_outcome(result: Result<EntryOutcome, EntryError>) -> EntryOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            let message = e.message();
            warn!("{message}");
            EntryOutcome::Failed {
                kind: e.kind(),
                message,
            }
        }
    }
}
