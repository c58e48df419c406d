//! Errors!
//!
//! Run-level problems are a [`DistError`][] and stop everything before any
//! matrix entry starts. Problems with a single matrix entry are an
//! [`EntryError`][], which only ever ends up in that entry's report.

use camino::Utf8PathBuf;
use dist_matrix_schema::{FailureKind, TargetTriple};
use miette::Diagnostic;
use thiserror::Error;

/// An alias for the common Result type for this crate
pub type DistResult<T> = std::result::Result<T, DistError>;

/// Errors dist-matrix can have
#[derive(Debug, Error, Diagnostic)]
pub enum DistError {
    /// random i/o error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// random axoasset error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Asset(#[from] axoasset::AxoassetError),

    /// random axoprocess error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Cmd(#[from] axoprocess::AxoprocessError),

    /// random reqwest error
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// random json error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// random url error
    #[error(transparent)]
    Url(#[from] url::ParseError),

    /// random zip error
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// A problem with a jinja template, which is always a dist-matrix bug
    #[error("Failed to render template")]
    #[diagnostic(
        help("this is a bug in dist-matrix, let us know and we'll fix it: https://github.com/domoritz/arrow-tools/issues/new")
    )]
    Jinja {
        /// The template we were rendering
        #[source_code]
        template: String,
        /// The range the error was found on
        #[label]
        span: Option<miette::SourceSpan>,
        /// Details of the error
        #[source]
        details: minijinja::Error,
    },

    /// A --target didn't name anything in the matrix
    #[error("{target} isn't part of the release matrix")]
    #[diagnostic(help("the matrix contains: {known}"))]
    UnknownTarget {
        /// The triple that was asked for
        target: String,
        /// Everything we know about
        known: String,
    },

    /// Two matrix entries would upload over each other
    #[error("more than one matrix entry produces {archive_name}")]
    DuplicateArchiveName {
        /// The colliding archive name
        archive_name: String,
    },

    /// The triggering event couldn't be found
    #[error("couldn't find the release event that triggered this run")]
    #[diagnostic(help(
        "pass --event=path/to/event.json, set GITHUB_EVENT_PATH, or pass --upload-url"
    ))]
    NoReleaseEvent,

    /// The triggering event exists but isn't a release being published
    #[error("this run wasn't triggered by a release being published (action was {action:?})")]
    #[diagnostic(help("dist-matrix only publishes on the 'release: published' event"))]
    NotAPublishedRelease {
        /// The action of the event we got
        action: Option<String>,
    },

    /// The event is missing the release info we need
    #[error("the release event at {path} is missing {field}")]
    MalformedReleaseEvent {
        /// Where the event came from
        path: Utf8PathBuf,
        /// The missing field
        field: &'static str,
    },

    /// The upload token wasn't set
    #[error("failed to load a token for uploading release assets: {reason}")]
    #[diagnostic(help("is {env_var_name} properly set?"))]
    MissingToken {
        /// What was wrong with it
        reason: &'static str,
        /// The env var we looked at
        env_var_name: String,
    },

    /// The generated CI is stale
    #[error("{file} needs to be regenerated")]
    #[diagnostic(help("run 'dist-matrix generate-ci' to update it"))]
    CiOutOfDate {
        /// The file that doesn't match
        file: Utf8PathBuf,
    },

    /// The entry needs a different machine than the one we're on
    #[error("{target} has to be built on a {needed} host, but this is a {current} host")]
    WrongHost {
        /// The target
        target: TargetTriple,
        /// What it needs
        needed: String,
        /// What we are
        current: String,
    },

    /// The build finished but the binary is nowhere to be found
    #[error("failed to find bin {bin_name} for {target}")]
    #[diagnostic(help("did the build actually produce it? check the cargo output above"))]
    MissingBinary {
        /// The binary we wanted
        bin_name: String,
        /// The target we built for
        target: TargetTriple,
    },

    /// Tried to package something that never got built
    #[error("refusing to package {archive_name}, its build didn't produce a binary")]
    NothingToPackage {
        /// The archive we were asked for
        archive_name: String,
    },

    /// The release host didn't like the upload
    #[error("server responded with {status} while uploading {asset}")]
    UploadRejected {
        /// The asset
        asset: String,
        /// The response status
        status: reqwest::StatusCode,
        /// The response body
        #[help]
        body: Option<String>,
    },

    /// A blocking stage's thread went away
    #[error(transparent)]
    Join(#[from] tokio::task::JoinError),
}

impl From<minijinja::Error> for DistError {
    fn from(details: minijinja::Error) -> Self {
        let template: String = details.template_source().unwrap_or_default().to_owned();
        let span: Option<miette::SourceSpan> = details.range().map(|r| r.into()).or_else(|| {
            details.line().map(|line| {
                // some minijinja errors only have a line, not a range, so let's just highlight the whole line
                let start = template
                    .lines()
                    .take(line - 1)
                    .map(|l| l.len() + 1)
                    .sum::<usize>();
                let end = start + template.lines().nth(line - 1).unwrap_or_default().len();
                (start..end).into()
            })
        });
        DistError::Jinja {
            template,
            span,
            details,
        }
    }
}

/// Something that went wrong with exactly one matrix entry
///
/// None of these ever stop sibling entries.
#[derive(Debug, Error, Diagnostic)]
pub enum EntryError {
    /// Couldn't get a toolchain for the target
    #[error("no toolchain available for {target}")]
    ToolchainUnavailable {
        /// The target
        target: TargetTriple,
        /// Why
        #[source]
        #[diagnostic_source]
        details: DistError,
    },
    /// Compilation failed
    #[error("failed to build {target}")]
    BuildFailure {
        /// The target
        target: TargetTriple,
        /// Why
        #[source]
        #[diagnostic_source]
        details: DistError,
    },
    /// Archiving failed
    #[error("failed to package {archive_name}")]
    PackagingFailure {
        /// The archive
        archive_name: String,
        /// Why
        #[source]
        #[diagnostic_source]
        details: DistError,
    },
    /// Uploading failed
    #[error("failed to upload {archive_name}")]
    UploadFailure {
        /// The archive
        archive_name: String,
        /// Why
        #[source]
        #[diagnostic_source]
        details: DistError,
    },
    /// Ran out of time
    #[error("{target} didn't finish within {secs}s")]
    TimedOut {
        /// The target
        target: TargetTriple,
        /// The limit
        secs: u64,
    },
    /// The run was cancelled
    #[error("{target} was cancelled")]
    Cancelled {
        /// The target
        target: TargetTriple,
    },
    /// The task running the entry died
    #[error("the task for {target} died: {reason}")]
    Aborted {
        /// The target
        target: TargetTriple,
        /// What the runtime told us
        reason: String,
    },
}

impl EntryError {
    /// The report-level kind of this error
    pub fn kind(&self) -> FailureKind {
        match self {
            EntryError::ToolchainUnavailable { .. } => FailureKind::ToolchainUnavailable,
            EntryError::BuildFailure { .. } => FailureKind::BuildFailure,
            EntryError::PackagingFailure { .. } => FailureKind::PackagingFailure,
            EntryError::UploadFailure { .. } => FailureKind::UploadFailure,
            EntryError::TimedOut { .. } => FailureKind::TimedOut,
            EntryError::Cancelled { .. } => FailureKind::Cancelled,
            EntryError::Aborted { .. } => FailureKind::Aborted,
        }
    }

    /// A one-line message including the underlying cause (if any)
    pub fn message(&self) -> String {
        match self {
            EntryError::ToolchainUnavailable { details, .. }
            | EntryError::BuildFailure { details, .. }
            | EntryError::PackagingFailure { details, .. }
            | EntryError::UploadFailure { details, .. } => format!("{self}: {details}"),
            EntryError::TimedOut { .. }
            | EntryError::Cancelled { .. }
            | EntryError::Aborted { .. } => self.to_string(),
        }
    }
}
