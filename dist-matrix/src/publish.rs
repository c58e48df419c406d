//! Attaching archives to the release

use async_trait::async_trait;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info};

use crate::net::{create_reqwest_client, ClientSettings};
use crate::package::Artifact;
use crate::release::ReleaseContext;
use crate::{DistError, DistResult};

/// The media type GitHub's REST API wants us to accept
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Something that can upload an artifact to a release
#[async_trait]
pub trait Publish: Send + Sync {
    /// Upload `artifact` as an asset of `release`
    async fn publish(&self, artifact: &Artifact, release: &ReleaseContext) -> DistResult<()>;
}

/// Uploads assets through GitHub's release asset API
///
/// There's no dedup here: uploading over an existing asset name is
/// whatever GitHub says it is (a 422).
#[derive(Debug, Clone)]
pub struct GithubPublisher {
    client: reqwest::Client,
}

impl GithubPublisher {
    /// Create a publisher with its own http client
    pub fn new(settings: &ClientSettings) -> DistResult<Self> {
        Ok(Self {
            client: create_reqwest_client(settings)?,
        })
    }
}

#[async_trait]
impl Publish for GithubPublisher {
    async fn publish(&self, artifact: &Artifact, release: &ReleaseContext) -> DistResult<()> {
        let url = release.asset_url(&artifact.name);
        info!("uploading {} to {}", artifact.name, release.upload_url);

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, release.token.authorization())
            .header(CONTENT_TYPE, HeaderValue::from_static(artifact.content_type))
            .header(ACCEPT, GITHUB_ACCEPT)
            .body(artifact.bytes.clone())
            .send()
            .await?;

        // don't use error_for_status, we want the body in the error
        let status = response.status();
        if status.is_success() {
            debug!("{} uploaded ({status})", artifact.name);
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(DistError::UploadRejected {
            asset: artifact.name.clone(),
            status,
            body: (!text.is_empty()).then_some(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::ASSET_CONTENT_TYPE;
    use crate::release::AuthToken;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ASSET: &str = "csv2parquet-x86_64-unknown-linux-gnu.tar.gz";

    fn artifact() -> Artifact {
        Artifact {
            name: ASSET.to_owned(),
            path: format!("target/distrib/{ASSET}").into(),
            bytes: b"fake archive".to_vec(),
            content_type: ASSET_CONTENT_TYPE,
        }
    }

    fn release(server: &MockServer) -> ReleaseContext {
        let token = AuthToken::from_value(Some("hunter2".to_owned()), "GITHUB_TOKEN").unwrap();
        let template = format!("{}/releases/1/assets{{?name,label}}", server.uri());
        ReleaseContext::from_upload_url(&template, token).unwrap()
    }

    #[tokio::test]
    async fn uploads_with_the_right_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/releases/1/assets"))
            .and(query_param("name", ASSET))
            .and(header("authorization", "Bearer hunter2"))
            .and(header("content-type", "application/octet-stream"))
            .and(header("accept", "application/vnd.github+json"))
            .and(header("user-agent", ClientSettings::new().user_agent.as_str()))
            .and(body_bytes(b"fake archive".to_vec()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let publisher = GithubPublisher::new(&ClientSettings::new()).unwrap();
        publisher
            .publish(&artifact(), &release(&server))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rejections_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(422).set_body_string(r#"{"message":"Validation Failed"}"#),
            )
            .mount(&server)
            .await;

        let publisher = GithubPublisher::new(&ClientSettings::new()).unwrap();
        let err = publisher
            .publish(&artifact(), &release(&server))
            .await
            .unwrap_err();
        match err {
            DistError::UploadRejected {
                asset,
                status,
                body,
            } => {
                assert_eq!(asset, ASSET);
                assert_eq!(status.as_u16(), 422);
                assert!(body.unwrap().contains("Validation Failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
