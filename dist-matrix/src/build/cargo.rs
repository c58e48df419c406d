//! Functionality required to invoke `cargo build` (or `cross build`) properly

use std::process::Stdio;

use async_trait::async_trait;
use axoprocess::Cmd;
use camino::Utf8PathBuf;
use dist_matrix_schema::HostClass;
use miette::IntoDiagnostic;
use tracing::{info, warn};

use crate::build::{output_killable, Build, BuildResult};
use crate::config::Config;
use crate::matrix::MatrixEntry;
use crate::platform::exe_name;
use crate::DistResult;

/// Builds matrix entries with `cargo build --release --locked`
///
/// Linux entries go through the cross-compilation helper instead of cargo,
/// because one linux runner has to produce binaries for every linux
/// architecture/libc in the matrix. Mac and windows entries build natively.
#[derive(Debug, Clone)]
pub struct CargoBuilder {
    /// The cargo project containing the binary
    pub project_dir: Utf8PathBuf,
    /// How to invoke cargo
    pub cargo: String,
    /// How to invoke the cross-compilation helper
    pub cross: String,
}

impl CargoBuilder {
    /// Create a builder from the run's config
    pub fn new(cfg: &Config) -> Self {
        Self {
            project_dir: cfg.project_dir.clone(),
            cargo: "cargo".to_owned(),
            cross: cfg.cross.clone(),
        }
    }

    /// The program that should drive the build for this entry
    pub fn build_tool(&self, entry: &MatrixEntry) -> &str {
        match entry.host {
            HostClass::Linux => &self.cross,
            HostClass::Mac | HostClass::Windows => &self.cargo,
        }
    }

    /// The full build command for an entry
    pub fn build_command(&self, entry: &MatrixEntry) -> Cmd {
        let mut command = Cmd::new(self.build_tool(entry), "build your app with Cargo");
        command
            .arg("build")
            .arg("--release")
            .arg("--locked")
            .arg("--message-format=json-render-diagnostics")
            .arg("--target")
            .arg(&entry.target_triple)
            .arg("--bin")
            .arg(&entry.bin_name)
            .current_dir(&self.project_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        command
    }

    /// Where cargo puts the binary for an entry, if nobody tells us otherwise
    pub fn expected_binary_path(&self, entry: &MatrixEntry) -> Utf8PathBuf {
        self.project_dir
            .join("target")
            .join(entry.target_triple.as_str())
            .join("release")
            .join(exe_name(&entry.bin_name, entry.host))
    }
}

#[async_trait]
impl Build for CargoBuilder {
    async fn build(&self, entry: &MatrixEntry) -> DistResult<BuildResult> {
        eprintln!(
            "building cargo target ({}/release) with {}",
            entry.target_triple,
            self.build_tool(entry)
        );

        let output = output_killable(self.build_command(entry)).await?;

        // Collect up the compiler messages to find out where the binary ended up
        let mut reported_exe = None;
        for message in cargo_metadata::Message::parse_stream(output.stdout.as_slice()) {
            let Ok(message) = message
                .into_diagnostic()
                .map_err(|e| warn!("failed to parse cargo json message: {:?}", e))
            else {
                // It's ok for there to be messages we don't understand if we don't care about them.
                continue;
            };
            if let cargo_metadata::Message::CompilerArtifact(artifact) = message {
                let Some(new_exe) = artifact.executable else {
                    continue;
                };
                if artifact.target.name == entry.bin_name {
                    info!("got a new exe: {}", new_exe);
                    reported_exe = Some(new_exe);
                }
            }
        }

        Ok(match locate_binary(reported_exe, self.expected_binary_path(entry)) {
            Some(path) => BuildResult::built(entry.clone(), path),
            None => BuildResult::failed(entry.clone()),
        })
    }
}

/// Pick the binary cargo told us about, falling back to the conventional path
///
/// `cross` reports paths from inside its container, so the reported path
/// may not exist on the host even when the build worked.
fn locate_binary(reported: Option<Utf8PathBuf>, expected: Utf8PathBuf) -> Option<Utf8PathBuf> {
    if let Some(reported) = reported {
        if reported.exists() {
            return Some(reported);
        }
        info!("{reported} doesn't exist on this machine, checking {expected}");
    }
    expected.is_file().then_some(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use camino::Utf8Path;
    use temp_dir::TempDir;

    fn builder(project_dir: &str) -> CargoBuilder {
        CargoBuilder {
            project_dir: Utf8PathBuf::from(project_dir),
            cargo: "cargo".to_owned(),
            cross: "cross".to_owned(),
        }
    }

    fn args(cmd: &Cmd) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn linux_goes_through_cross() {
        let b = builder("/proj");
        let entry = MatrixEntry::new("csv2parquet", "aarch64-unknown-linux-musl", HostClass::Linux);
        let cmd = b.build_command(&entry);
        assert_eq!(cmd.get_program(), "cross");
        assert_eq!(
            args(&cmd),
            vec![
                "build",
                "--release",
                "--locked",
                "--message-format=json-render-diagnostics",
                "--target",
                "aarch64-unknown-linux-musl",
                "--bin",
                "csv2parquet",
            ]
        );
    }

    #[test]
    fn mac_and_windows_are_native() {
        let b = builder("/proj");
        let mac = MatrixEntry::new("csv2parquet", "aarch64-apple-darwin", HostClass::Mac);
        let win = MatrixEntry::new("csv2parquet", "x86_64-pc-windows-msvc", HostClass::Windows);
        assert_eq!(b.build_command(&mac).get_program(), "cargo");
        assert_eq!(b.build_command(&win).get_program(), "cargo");
        assert!(args(&b.build_command(&win)).contains(&"--locked".to_owned()));
    }

    #[test]
    fn expected_paths() {
        let b = builder("/proj");
        let win = MatrixEntry::new("csv2parquet", "x86_64-pc-windows-msvc", HostClass::Windows);
        assert_eq!(
            b.expected_binary_path(&win),
            Utf8Path::new("/proj/target/x86_64-pc-windows-msvc/release/csv2parquet.exe")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn abandoned_builds_are_killed() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        let finished = dir.join("finished");
        // `sh build --release ...` runs ./build from the project dir
        std::fs::write(
            dir.join("build"),
            format!("sleep 3\ntouch '{finished}'\n"),
        )
        .unwrap();
        let b = CargoBuilder {
            project_dir: dir.to_owned(),
            cargo: "sh".to_owned(),
            cross: "sh".to_owned(),
        };
        let entry = MatrixEntry::new("csv2parquet", "x86_64-unknown-linux-gnu", HostClass::Linux);

        let gave_up = tokio::time::timeout(Duration::from_millis(500), b.build(&entry)).await;
        assert!(gave_up.is_err());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!finished.exists(), "the build kept running after being dropped");
    }

    #[test]
    fn container_paths_fall_back() {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap();
        let expected = dir.join("csv2parquet");
        std::fs::write(&expected, b"bin").unwrap();

        let reported = Utf8PathBuf::from("/target/x86_64-unknown-linux-musl/release/csv2parquet");
        assert_eq!(
            locate_binary(Some(reported), expected.clone()),
            Some(expected.clone())
        );
        assert_eq!(locate_binary(None, dir.join("nope")), None);
    }
}
