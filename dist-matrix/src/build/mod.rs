//! Compiling Things

use std::process::Output;

use async_trait::async_trait;
use axoprocess::Cmd;
use camino::Utf8PathBuf;

use crate::matrix::MatrixEntry;
use crate::DistResult;

pub mod cargo;

/// What came out of compiling one matrix entry
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// The entry that was built
    pub entry: MatrixEntry,
    /// Where the binary ended up
    ///
    /// None means the build didn't produce anything usable.
    pub binary_path: Option<Utf8PathBuf>,
}

impl BuildResult {
    /// A build that produced a binary at `binary_path`
    pub fn built(entry: MatrixEntry, binary_path: Utf8PathBuf) -> Self {
        Self {
            entry,
            binary_path: Some(binary_path),
        }
    }

    /// A build that produced nothing
    pub fn failed(entry: MatrixEntry) -> Self {
        Self {
            entry,
            binary_path: None,
        }
    }

    /// Whether there's something to package
    pub fn success(&self) -> bool {
        self.binary_path.is_some()
    }
}

/// Something that can compile a matrix entry
///
/// Builds are the long part of an entry, so they're async: dropping the
/// future has to stop the build (and any compiler it started).
#[async_trait]
pub trait Build: Send + Sync {
    /// Compile `entry`, assuming its toolchain has been provisioned
    async fn build(&self, entry: &MatrixEntry) -> DistResult<BuildResult>;
}

/// Run `cmd` to completion on the async runtime
///
/// Unlike [`Cmd::output`][], the child is killed if the returned future is
/// dropped, so a timed out or cancelled entry doesn't leave a compiler running.
pub async fn output_killable(mut cmd: Cmd) -> DistResult<Output> {
    cmd.log_command();
    let program = cmd.get_program().to_owned();
    let inner = std::mem::replace(&mut cmd.inner, std::process::Command::new(program));
    let mut child = tokio::process::Command::from(inner);
    child.kill_on_drop(true);
    let output = child.output().await?;
    cmd.maybe_check_status(output.status)?;
    Ok(output)
}
