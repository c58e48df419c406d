#![deny(missing_docs)]

//! # dist-matrix-schema
//!
//! This crate exists to serialize and deserialize the run report produced
//! by dist-matrix. Ideally it should be reasonably forward and backward compatible
//! with different versions of this format.
//!
//! The root type of the schema is [`RunReport`][].

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A local system path on the machine dist-matrix was run.
///
/// This is a String because when deserializing this may be a path format from a different OS!
pub type LocalPath = String;

/// A rust target triple (e.g. "x86_64-pc-windows-msvc")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct TargetTriple(String);

impl TargetTriple {
    /// Wrap a raw triple
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Get the triple as a str
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for TargetTriple {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TargetTriple {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::ffi::OsStr> for TargetTriple {
    fn as_ref(&self) -> &std::ffi::OsStr {
        self.0.as_ref()
    }
}

impl fmt::Display for TargetTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq<str> for TargetTriple {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for TargetTriple {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// The class of machine a matrix entry has to be built on
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum HostClass {
    /// A linux runner (builds go through `cross`)
    Linux,
    /// A macOS runner
    Mac,
    /// A windows runner
    Windows,
}

impl HostClass {
    /// The archive format artifacts built on this host class get packaged as
    pub fn archive_format(self) -> ArchiveFormat {
        match self {
            HostClass::Windows => ArchiveFormat::Zip,
            HostClass::Linux | HostClass::Mac => ArchiveFormat::TarGz,
        }
    }
}

impl fmt::Display for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostClass::Linux => "linux",
            HostClass::Mac => "mac",
            HostClass::Windows => "windows",
        };
        s.fmt(f)
    }
}

/// The format of an archive
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    /// `.zip`
    Zip,
    /// `.tar.gz`
    TarGz,
}

impl ArchiveFormat {
    /// The file extension for this format (including the leading dot)
    pub fn ext(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => ".zip",
            ArchiveFormat::TarGz => ".tar.gz",
        }
    }
}

/// A report of everything one `dist-matrix run` (or `plan`) did
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunReport {
    /// The version of dist-matrix that generated this
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dist_version: Option<String>,
    /// The release artifacts were published to (absent for dry runs)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseInfo>,
    /// One entry per matrix entry, in matrix order
    #[serde(default)]
    pub entries: Vec<EntryReport>,
}

/// Info about the release that triggered a run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReleaseInfo {
    /// The git tag of the release
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// The id the hosting platform uses for the release
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_id: Option<u64>,
}

/// What happened to one matrix entry
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntryReport {
    /// The target triple that was built
    pub target_triple: TargetTriple,
    /// The kind of runner the entry needs
    pub host: HostClass,
    /// The name of the archive (and of the uploaded asset)
    pub archive_name: String,
    /// The format of the archive
    pub archive_format: ArchiveFormat,
    /// How it went
    pub outcome: EntryOutcome,
}

/// The final state of a matrix entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status")]
#[serde(rename_all = "kebab-case")]
pub enum EntryOutcome {
    /// Not run (this is what `plan` reports)
    Planned,
    /// Built and packaged, but publishing was disabled
    Packaged {
        /// Where the archive was written
        #[serde(default)]
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<LocalPath>,
    },
    /// Built, packaged and attached to the release
    Uploaded,
    /// Something went wrong
    Failed {
        /// Which stage failed
        kind: FailureKind,
        /// Human readable details
        message: String,
    },
}

impl EntryOutcome {
    /// Whether this outcome is a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, EntryOutcome::Failed { .. })
    }
}

/// The kinds of per-entry failures
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The toolchain for the target couldn't be set up
    ToolchainUnavailable,
    /// Compilation failed (compile error, lockfile mismatch, missing binary...)
    BuildFailure,
    /// The archive couldn't be produced
    PackagingFailure,
    /// The asset couldn't be attached to the release
    UploadFailure,
    /// The entry ran past its time limit
    TimedOut,
    /// The whole run was cancelled while this entry was in flight
    Cancelled,
    /// The entry's task died without reporting
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::ToolchainUnavailable => "toolchain unavailable",
            FailureKind::BuildFailure => "build failure",
            FailureKind::PackagingFailure => "packaging failure",
            FailureKind::UploadFailure => "upload failure",
            FailureKind::TimedOut => "timed out",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Aborted => "aborted",
        };
        s.fmt(f)
    }
}

impl RunReport {
    /// Create a new RunReport
    pub fn new(dist_version: String, entries: Vec<EntryReport>) -> Self {
        Self {
            dist_version: Some(dist_version),
            release: None,
            entries,
        }
    }

    /// Entries that were attached to the release
    pub fn uploaded(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries
            .iter()
            .filter(|e| e.outcome == EntryOutcome::Uploaded)
    }

    /// Entries that failed
    pub fn failures(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| e.outcome.is_failure())
    }

    /// Whether any entry failed
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Get the JSON Schema for a RunReport
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RunReport)
    }
}
