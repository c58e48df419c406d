//! Figuring out which release we're attaching artifacts to
//!
//! In CI this comes from the event that triggered the workflow (a GitHub
//! release being published). Every matrix entry shares the same
//! [`ReleaseContext`][], read-only, for the whole run.

use std::fmt;

use axoasset::SourceFile;
use camino::{Utf8Path, Utf8PathBuf};
use dist_matrix_schema::ReleaseInfo;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::{DistError, DistResult};

/// The env var GitHub Actions puts the triggering event's path in
pub const GITHUB_EVENT_PATH: &str = "GITHUB_EVENT_PATH";
/// The only event action we publish on
pub const PUBLISHED_ACTION: &str = "published";

/// A secret used to authenticate uploads
///
/// DO NOT UNDER ANY CIRCUMSTANCES PRINT THIS VALUE.
/// Debug is implemented by hand so it can't leak into logs.
#[derive(Clone)]
pub struct AuthToken(HeaderValue);

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(<redacted>)")
    }
}

impl AuthToken {
    /// Load the token from the given env var
    pub fn from_env(env_var_name: &str) -> DistResult<Self> {
        Self::from_value(std::env::var(env_var_name).ok(), env_var_name)
    }

    /// Validate a token that was loaded from `env_var_name`
    pub fn from_value(value: Option<String>, env_var_name: &str) -> DistResult<Self> {
        let Some(value) = value else {
            return Err(DistError::MissingToken {
                reason: "could not load env var",
                env_var_name: env_var_name.to_owned(),
            });
        };
        if value.is_empty() {
            return Err(DistError::MissingToken {
                reason: "no value in env var",
                env_var_name: env_var_name.to_owned(),
            });
        }
        let Ok(mut header) = HeaderValue::from_str(&format!("Bearer {value}")) else {
            return Err(DistError::MissingToken {
                reason: "had invalid characters for an http header",
                env_var_name: env_var_name.to_owned(),
            });
        };
        header.set_sensitive(true);
        Ok(AuthToken(header))
    }

    /// The `Authorization` header for this token
    pub fn authorization(&self) -> HeaderValue {
        self.0.clone()
    }
}

/// Everything needed to attach an asset to the release
#[derive(Debug, Clone)]
pub struct ReleaseContext {
    /// The asset upload endpoint, without any query or template suffix
    pub upload_url: Url,
    /// Credentials for the upload endpoint
    pub token: AuthToken,
    /// The tag of the release, if we know it
    pub tag: Option<String>,
    /// The id of the release, if we know it
    pub release_id: Option<u64>,
}

impl ReleaseContext {
    /// A context for an explicitly given upload endpoint
    pub fn from_upload_url(upload_url: &str, token: AuthToken) -> DistResult<Self> {
        Ok(Self {
            upload_url: parse_upload_url(upload_url)?,
            token,
            tag: None,
            release_id: None,
        })
    }

    /// A context for the release described by an event payload on disk
    pub fn from_event_file(path: &Utf8Path, token: AuthToken) -> DistResult<Self> {
        info!("reading release event from {path}");
        let src = SourceFile::load_local(path)?;
        Self::from_event(path, src.contents(), token)
    }

    /// A context for the release described by an event payload
    pub fn from_event(path: &Utf8Path, json: &str, token: AuthToken) -> DistResult<Self> {
        let event: ReleaseEvent = serde_json::from_str(json)?;
        if event.action.as_deref() != Some(PUBLISHED_ACTION) {
            return Err(DistError::NotAPublishedRelease {
                action: event.action,
            });
        }
        let missing = |field| DistError::MalformedReleaseEvent {
            path: path.to_owned(),
            field,
        };
        let release = event.release.ok_or_else(|| missing("release"))?;
        let upload_url = release
            .upload_url
            .ok_or_else(|| missing("release.upload_url"))?;
        Ok(Self {
            upload_url: parse_upload_url(&upload_url)?,
            token,
            tag: release.tag_name,
            release_id: release.id,
        })
    }

    /// The full url to upload an asset with the given name to
    pub fn asset_url(&self, asset_name: &str) -> Url {
        let mut url = self.upload_url.clone();
        url.query_pairs_mut().clear().append_pair("name", asset_name);
        url
    }

    /// The release info for the run report
    pub fn info(&self) -> ReleaseInfo {
        ReleaseInfo {
            tag: self.tag.clone(),
            release_id: self.release_id,
        }
    }
}

/// Find the event payload, preferring an explicit path over the environment
pub fn event_path(explicit: Option<&Utf8Path>) -> DistResult<Utf8PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_owned());
    }
    match std::env::var(GITHUB_EVENT_PATH) {
        Ok(path) if !path.is_empty() => Ok(Utf8PathBuf::from(path)),
        _ => Err(DistError::NoReleaseEvent),
    }
}

/// Parse an upload url, dropping GitHub's uri-template suffix (`{?name,label}`)
pub fn parse_upload_url(raw: &str) -> DistResult<Url> {
    let base = raw.split_once('{').map(|(base, _)| base).unwrap_or(raw);
    let mut url = Url::parse(base.trim())?;
    url.set_query(None);
    Ok(url)
}

/// The parts of a GitHub `release` event we care about
#[derive(Debug, Deserialize)]
struct ReleaseEvent {
    action: Option<String>,
    release: Option<ReleasePayload>,
}

#[derive(Debug, Deserialize)]
struct ReleasePayload {
    id: Option<u64>,
    tag_name: Option<String>,
    upload_url: Option<String>,
}
