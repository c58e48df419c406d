//! Mock pipeline stages, mostly you want [`MockStages`][]
//! and its `pipeline`, then assert on what each stage saw

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use temp_dir::TempDir;

use crate::build::{Build, BuildResult};
use crate::matrix::MatrixEntry;
use crate::orchestrate::Pipeline;
use crate::package::{Artifact, Package, ASSET_CONTENT_TYPE};
use crate::platform::exe_name;
use crate::publish::Publish;
use crate::release::{AuthToken, ReleaseContext};
use crate::toolchain::Provision;
use crate::{DistError, DistResult};

pub const BIN_NAME: &str = "csv2parquet";
pub const UPLOAD_URL: &str = "https://uploads.github.com/repos/domoritz/arrow-tools/releases/1/assets{?name,label}";

pub fn mock_release() -> Arc<ReleaseContext> {
    let token = AuthToken::from_value(Some("hunter2".to_owned()), "GITHUB_TOKEN").unwrap();
    Arc::new(ReleaseContext::from_upload_url(UPLOAD_URL, token).unwrap())
}

fn failure(what: &str) -> DistError {
    DistError::Io(std::io::Error::other(what.to_owned()))
}

/// Refuses the targets in `unavailable`
#[derive(Default)]
pub struct MockProvisioner {
    pub unavailable: Vec<&'static str>,
    /// how long each provision blocks for
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Provision for MockProvisioner {
    fn provision(&self, entry: &MatrixEntry) -> DistResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.calls
            .lock()
            .unwrap()
            .push(entry.target_triple.to_string());
        if self.unavailable.contains(&entry.target_triple.as_str()) {
            return Err(failure("no such toolchain"));
        }
        Ok(())
    }
}

/// "Builds" by writing a small file per target
pub struct MockBuilder {
    pub out_dir: Utf8PathBuf,
    /// these error out
    pub failing: Vec<&'static str>,
    /// these "succeed" but produce nothing
    pub no_binary: Vec<&'static str>,
    /// how long each build takes
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockBuilder {
    pub fn new(out_dir: &Utf8Path) -> Self {
        Self {
            out_dir: out_dir.to_owned(),
            failing: vec![],
            no_binary: vec![],
            delay: None,
            calls: Mutex::new(vec![]),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Build for MockBuilder {
    async fn build(&self, entry: &MatrixEntry) -> DistResult<BuildResult> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let triple = entry.target_triple.as_str();
        self.calls.lock().unwrap().push(triple.to_owned());
        if self.failing.contains(&triple) {
            return Err(failure("error[E0425]: cannot find value `x` in this scope"));
        }
        if self.no_binary.contains(&triple) {
            return Ok(BuildResult::failed(entry.clone()));
        }

        let dir = self.out_dir.join(triple);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(exe_name(&entry.bin_name, entry.host));
        std::fs::write(&path, format!("{BIN_NAME} for {triple}"))?;
        Ok(BuildResult::built(entry.clone(), path))
    }
}

/// Hands back an in-memory "archive" without touching the disk
#[derive(Default)]
pub struct MockPackager {
    /// how long each package blocks for
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl Package for MockPackager {
    fn package(&self, build: &BuildResult) -> DistResult<Artifact> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let Some(binary) = &build.binary_path else {
            return Err(DistError::NothingToPackage {
                archive_name: build.entry.archive_name.clone(),
            });
        };
        self.calls
            .lock()
            .unwrap()
            .push(build.entry.archive_name.clone());
        Ok(Artifact {
            name: build.entry.archive_name.clone(),
            path: binary.with_file_name(&build.entry.archive_name),
            bytes: b"archive".to_vec(),
            content_type: ASSET_CONTENT_TYPE,
        })
    }
}

/// Records uploads, optionally misbehaving for some assets
#[derive(Default)]
pub struct MockPublisher {
    /// the server says no to these
    pub rejected: Vec<&'static str>,
    /// these never finish
    pub hang: Vec<&'static str>,
    /// everything hangs
    pub hang_all: bool,
    /// these blow up
    pub panics: Vec<&'static str>,
    pub uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl Publish for MockPublisher {
    async fn publish(&self, artifact: &Artifact, _release: &ReleaseContext) -> DistResult<()> {
        let triple = artifact
            .name
            .trim_start_matches(&format!("{BIN_NAME}-"))
            .trim_end_matches(".tar.gz")
            .trim_end_matches(".zip")
            .to_owned();
        if self.hang_all || self.hang.contains(&triple.as_str()) {
            tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        }
        if self.panics.contains(&triple.as_str()) {
            panic!("upload of {} exploded", artifact.name);
        }
        if self.rejected.contains(&triple.as_str()) {
            return Err(failure("422 Validation Failed"));
        }
        self.uploads.lock().unwrap().push(artifact.name.clone());
        Ok(())
    }
}

/// Every mock stage, plus a temp dir for the builder's output
pub struct MockStages {
    pub provisioner: Arc<MockProvisioner>,
    pub builder: Arc<MockBuilder>,
    pub packager: Arc<MockPackager>,
    pub publisher: Arc<MockPublisher>,
    pub _tmp: TempDir,
}

impl MockStages {
    /// Well-behaved stages, tweak them before calling `pipeline`
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap().to_owned();
        Self {
            provisioner: Arc::new(MockProvisioner::default()),
            builder: Arc::new(MockBuilder::new(&dir)),
            packager: Arc::new(MockPackager::default()),
            publisher: Arc::new(MockPublisher::default()),
            _tmp: tmp,
        }
    }

    pub fn out_dir(&self) -> Utf8PathBuf {
        Utf8Path::from_path(self._tmp.path()).unwrap().to_owned()
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline {
            provisioner: self.provisioner.clone(),
            builder: self.builder.clone(),
            packager: self.packager.clone(),
            publisher: self.publisher.clone(),
        }
    }

    pub fn uploads(&self) -> Vec<String> {
        let mut uploads = self.publisher.uploads.lock().unwrap().clone();
        uploads.sort();
        uploads
    }

    pub fn packaged(&self) -> Vec<String> {
        self.packager.calls.lock().unwrap().clone()
    }
}
