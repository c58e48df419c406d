//! Config support for dist-matrix
//!
//! Settings are layered: CLI flags beat `dist-matrix.toml`, which beats the defaults.

use std::time::Duration;

use axoasset::SourceFile;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::info;

use crate::DistResult;

/// The name of the (optional) config file in the project dir
pub const CONFIG_FILE: &str = "dist-matrix.toml";
/// The binary we release unless told otherwise
pub const DEFAULT_BIN_NAME: &str = "csv2parquet";
/// Where archives are written, relative to the project dir
pub const DEFAULT_DIST_DIR: &str = "target/distrib";
/// The env var holding the release upload token
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";
/// The cross-compilation helper used on linux hosts
pub const DEFAULT_CROSS: &str = "cross";

/// The contents of a `dist-matrix.toml`
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigLayer {
    /// The binary to build (`cargo build --bin <binary>`)
    pub binary: Option<String>,
    /// Where to write archives
    pub dist_dir: Option<Utf8PathBuf>,
    /// Only build these targets
    pub targets: Option<Vec<String>>,
    /// Whether to strip binaries before archiving them
    pub strip: Option<bool>,
    /// Give up on an entry after this many seconds
    pub timeout_secs: Option<u64>,
    /// How many entries may run at once
    pub jobs: Option<usize>,
    /// The env var holding the upload token
    pub token_env: Option<String>,
    /// The cross-compilation helper to use on linux hosts
    pub cross: Option<String>,
}

impl ConfigLayer {
    /// Apply another layer on top of this one (values in `other` win)
    pub fn merge(self, other: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            binary: other.binary.or(self.binary),
            dist_dir: other.dist_dir.or(self.dist_dir),
            targets: other.targets.or(self.targets),
            strip: other.strip.or(self.strip),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
            jobs: other.jobs.or(self.jobs),
            token_env: other.token_env.or(self.token_env),
            cross: other.cross.or(self.cross),
        }
    }
}

/// Fully resolved settings for a run
#[derive(Debug, Clone)]
pub struct Config {
    /// The cargo project that contains the binary
    pub project_dir: Utf8PathBuf,
    /// The binary to build
    pub bin_name: String,
    /// Where to write archives
    pub dist_dir: Utf8PathBuf,
    /// Only build these targets (empty means all of them)
    pub targets: Vec<String>,
    /// Whether to strip binaries before archiving them
    pub strip: bool,
    /// Per-entry time limit
    pub timeout: Option<Duration>,
    /// How many entries may run at once (None means all of them)
    pub jobs: Option<usize>,
    /// The env var holding the upload token
    pub token_env: String,
    /// The cross-compilation helper to use on linux hosts
    pub cross: String,
}

impl Config {
    /// Resolve a Config for the project at `project_dir`, reading its
    /// `dist-matrix.toml` (if any) and then applying `overrides`
    pub fn load(project_dir: &Utf8Path, overrides: ConfigLayer) -> DistResult<Self> {
        let path = project_dir.join(CONFIG_FILE);
        let file = if path.exists() {
            info!("loading config from {path}");
            load_layer(&path)?
        } else {
            ConfigLayer::default()
        };
        Ok(Self::from_layer(project_dir, file.merge(overrides)))
    }

    /// Resolve a Config from a single already-merged layer
    pub fn from_layer(project_dir: &Utf8Path, layer: ConfigLayer) -> Self {
        let dist_dir = layer
            .dist_dir
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DIST_DIR));
        let dist_dir = if dist_dir.is_absolute() {
            dist_dir
        } else {
            project_dir.join(dist_dir)
        };
        Self {
            project_dir: project_dir.to_owned(),
            bin_name: layer.binary.unwrap_or_else(|| DEFAULT_BIN_NAME.to_owned()),
            dist_dir,
            targets: layer.targets.unwrap_or_default(),
            strip: layer.strip.unwrap_or(true),
            timeout: layer.timeout_secs.map(Duration::from_secs),
            // anything past the semaphore's limit is as good as unlimited
            jobs: layer
                .jobs
                .filter(|&jobs| jobs > 0)
                .map(|jobs| jobs.min(Semaphore::MAX_PERMITS)),
            token_env: layer
                .token_env
                .unwrap_or_else(|| DEFAULT_TOKEN_ENV.to_owned()),
            cross: layer.cross.unwrap_or_else(|| DEFAULT_CROSS.to_owned()),
        }
    }
}

/// Load a `dist-matrix.toml` from disk
pub fn load_layer(path: &Utf8Path) -> DistResult<ConfigLayer> {
    let src = SourceFile::load_local(path)?;
    parse_layer(src)
}

/// Given a SourceFile of a `dist-matrix.toml`, deserialize it
pub fn parse_layer(src: SourceFile) -> DistResult<ConfigLayer> {
    Ok(src.deserialize_toml()?)
}
