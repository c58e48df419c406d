//! Making sure the machine we're on can actually compile a matrix entry
//!
//! For every entry this means:
//!
//! * we're on the right kind of host (macOS targets need a mac, etc.)
//! * `rustup` has the target's standard library installed
//! * on linux hosts, the `cross` helper exists (we install it if it doesn't)

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

use axoprocess::Cmd;
use dist_matrix_schema::HostClass;
use tracing::info;

use crate::matrix::MatrixEntry;
use crate::platform::current_host;
use crate::{DistError, DistResult};

/// Global information gathered about the system tools we shell out to
#[derive(Debug, Clone, Default)]
pub struct Tools {
    /// cargo, which does the actual builds
    pub cargo: Option<Tool>,
    /// rustup, useful for getting specific toolchains
    pub rustup: Option<Tool>,
    /// cross, which does linux builds inside containers
    pub cross: Option<Tool>,
}

/// A tool we have found installed on the system
#[derive(Debug, Clone, Default)]
pub struct Tool {
    /// The string to pass to Command::new
    pub cmd: String,
    /// The version the tool reported (in case useful)
    pub version: String,
}

impl Tools {
    /// Look for everything we might need
    pub fn find(cross: &str) -> Self {
        Tools {
            cargo: find_tool("cargo"),
            rustup: find_tool("rustup"),
            cross: find_tool(cross),
        }
    }
}

/// Check if a tool exists by asking for its version
pub fn find_tool(name: &str) -> Option<Tool> {
    let output = Command::new(name).arg("-V").output().ok()?;
    let string_output = String::from_utf8(output.stdout).ok()?;
    let version = string_output.lines().next()?;
    Some(Tool {
        cmd: name.to_owned(),
        version: version.to_owned(),
    })
}

/// Something that can make a toolchain available for a matrix entry
///
/// Implementations must be idempotent, a toolchain that's already
/// there should just be reported as fine.
pub trait Provision: Send + Sync {
    /// Ensure we can build `entry` on this machine
    fn provision(&self, entry: &MatrixEntry) -> DistResult<()>;
}

/// The real provisioner, driving `rustup` (and `cargo install cross`)
///
/// Neither rustup nor `cargo install` like being run concurrently against the
/// same toolchain, the orchestrator only provisions one entry at a time.
#[derive(Debug)]
pub struct RustupProvisioner {
    /// The host we're running on
    pub host: Option<HostClass>,
    /// The tools we found when starting up
    pub tools: Tools,
    /// The cross helper's command name
    pub cross: String,
    /// Set once cross is known to be installed
    cross_ready: AtomicBool,
}

impl RustupProvisioner {
    /// Create a provisioner for the current machine
    pub fn new(cross: &str) -> Self {
        Self {
            host: current_host(),
            tools: Tools::find(cross),
            cross: cross.to_owned(),
            cross_ready: AtomicBool::new(false),
        }
    }

    fn check_host(&self, entry: &MatrixEntry) -> DistResult<()> {
        if self.host == Some(entry.host) {
            return Ok(());
        }
        Err(DistError::WrongHost {
            target: entry.target_triple.clone(),
            needed: entry.host.to_string(),
            current: self
                .host
                .map(|h| h.to_string())
                .unwrap_or_else(|| std::env::consts::OS.to_owned()),
        })
    }

    fn ensure_cross(&self) -> DistResult<()> {
        if self.cross_ready.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.tools.cross.is_some() || find_tool(&self.cross).is_some() {
            self.cross_ready.store(true, Ordering::SeqCst);
            return Ok(());
        }
        info!("{} not found, installing it", self.cross);
        let cargo = self
            .tools
            .cargo
            .as_ref()
            .map(|t| t.cmd.as_str())
            .unwrap_or("cargo");
        let mut cmd = Cmd::new(cargo, format!("install {}", self.cross));
        cmd.arg("install").arg(&self.cross).arg("--locked");
        cmd.stdout_to_stderr();
        cmd.run()?;
        self.cross_ready.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Provision for RustupProvisioner {
    fn provision(&self, entry: &MatrixEntry) -> DistResult<()> {
        self.check_host(entry)?;

        eprintln!(
            "running rustup to ensure you have {} installed",
            entry.target_triple
        );
        let rustup = self
            .tools
            .rustup
            .as_ref()
            .map(|t| t.cmd.as_str())
            .unwrap_or("rustup");
        let mut cmd = Cmd::new(rustup, "install rustup toolchain");
        cmd.arg("target").arg("add").arg(&entry.target_triple);
        cmd.stdout_to_stderr();
        cmd.run()?;

        if entry.host == HostClass::Linux {
            self.ensure_cross()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_host_is_refused() {
        let provisioner = RustupProvisioner {
            host: Some(HostClass::Linux),
            tools: Tools::default(),
            cross: "cross".to_owned(),
            cross_ready: AtomicBool::new(false),
        };
        let entry = MatrixEntry::new("csv2parquet", "aarch64-apple-darwin", HostClass::Mac);
        let err = provisioner.provision(&entry).unwrap_err();
        assert!(matches!(err, DistError::WrongHost { .. }));
        assert_eq!(
            err.to_string(),
            "aarch64-apple-darwin has to be built on a mac host, but this is a linux host"
        );
    }

    #[test]
    fn cross_is_only_looked_for_once() {
        let provisioner = RustupProvisioner {
            host: Some(HostClass::Linux),
            tools: Tools::default(),
            cross: "dist-matrix-definitely-not-a-real-tool".to_owned(),
            cross_ready: AtomicBool::new(true),
        };
        // would otherwise try to `cargo install` the missing tool
        provisioner.ensure_cross().unwrap();
    }

    #[test]
    fn missing_tools_are_none() {
        assert!(find_tool("dist-matrix-definitely-not-a-real-tool").is_none());
    }
}
