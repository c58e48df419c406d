#![deny(missing_docs)]
#![allow(clippy::result_large_err)]

//! # dist-matrix
//!
//! This is the library at the core of the `dist-matrix` CLI, which builds a binary
//! for every target in a fixed release matrix, archives each one, and attaches
//! the archives to a published GitHub release.
//!
//! Every matrix entry is independent: one target failing to build leaves the
//! rest to finish, and the release ends up with whatever succeeded. The run
//! report says exactly which entries made it.
//!
//! It's not terribly well-suited to being used as a pure library because it
//! happily writes to stderr whenever it pleases.

use std::sync::Arc;

use camino::Utf8PathBuf;
use dist_matrix_schema::{EntryOutcome, RunReport};
use tracing::info;

pub use errors::{DistError, DistResult, EntryError};
pub use orchestrate::{block_on_run, run_matrix, run_matrix_until, Pipeline, RunOptions};

pub mod archive;
pub mod build;
pub mod ci;
pub mod config;
pub mod errors;
pub mod matrix;
pub mod net;
pub mod orchestrate;
pub mod package;
pub mod platform;
pub mod publish;
pub mod release;
pub mod toolchain;
#[cfg(test)]
mod tests;

use config::Config;
use matrix::{check_matrix, select_targets, target_matrix, MatrixEntry};
use release::{event_path, AuthToken, ReleaseContext};

/// The version of dist-matrix that's running
pub const SELF_DIST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where the artifacts of a run should go
#[derive(Debug, Clone, Default)]
pub struct PublishArgs {
    /// Don't upload anything, just leave the archives in the dist dir
    pub no_publish: bool,
    /// The triggering event payload (defaults to $GITHUB_EVENT_PATH)
    pub event: Option<Utf8PathBuf>,
    /// Upload here instead of wherever the event says
    pub upload_url: Option<String>,
}

/// The matrix entries a config selects, checked for collisions
pub fn gather_matrix(cfg: &Config) -> DistResult<Vec<MatrixEntry>> {
    let matrix = target_matrix(&cfg.bin_name);
    check_matrix(&matrix)?;
    select_targets(matrix, &cfg.targets)
}

/// Work out which release to publish to, if we're publishing at all
///
/// Everything that can go wrong here is a reason to not start the run.
pub fn load_release(cfg: &Config, args: &PublishArgs) -> DistResult<Option<ReleaseContext>> {
    if args.no_publish {
        info!("publishing disabled, archives will stay in {}", cfg.dist_dir);
        return Ok(None);
    }
    let token = AuthToken::from_env(&cfg.token_env)?;
    let ctx = if let Some(url) = &args.upload_url {
        ReleaseContext::from_upload_url(url, token)?
    } else {
        let path = event_path(args.event.as_deref())?;
        ReleaseContext::from_event_file(&path, token)?
    };
    Ok(Some(ctx))
}

/// dist-matrix plan -- what would a run do?
pub fn do_plan(cfg: &Config) -> DistResult<RunReport> {
    let entries = gather_matrix(cfg)?;
    let reports = entries
        .iter()
        .map(|entry| entry.report(EntryOutcome::Planned))
        .collect();
    Ok(RunReport::new(SELF_DIST_VERSION.to_owned(), reports))
}

/// dist-matrix run -- build, package and publish every selected entry
///
/// An `Ok` here can still contain failed entries, check [`RunReport::has_failures`][].
pub async fn do_run(cfg: &Config, args: &PublishArgs) -> DistResult<RunReport> {
    let entries = gather_matrix(cfg)?;
    let release = load_release(cfg, args)?.map(Arc::new);
    let pipeline = Pipeline::for_config(cfg)?;

    let reports = run_matrix(&entries, pipeline, release.clone(), RunOptions::new(cfg)).await;

    let mut report = RunReport::new(SELF_DIST_VERSION.to_owned(), reports);
    report.release = release.map(|ctx| ctx.info());
    Ok(report)
}

/// dist-matrix generate-ci -- write (or check) the release workflow
pub fn do_generate_ci(cfg: &Config, check: bool) -> DistResult<Utf8PathBuf> {
    // CI always covers the whole matrix, whatever targets were selected locally
    let matrix = target_matrix(&cfg.bin_name);
    check_matrix(&matrix)?;
    ci::generate_github_ci(cfg, &matrix, check)
}
