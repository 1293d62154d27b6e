//! HTTP implementation of [`ProviderApi`]
//!
//! Every call is wrapped in the [`RetryManager`], so throttling and
//! transient network failures are absorbed here instead of failing the
//! region. Building the client never touches the network.

use crate::core::config::{RegionConfig, RegionCredentials};
use crate::core::error::DriverError;
use crate::core::retry::{RetryManager, RetryOptions};
use crate::drivers::provider::{CopyImageRequest, LaunchPermission, ProviderApi, RegisterImageRequest};
use crate::security::SecretScrubber;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const SESSION_TOKEN_HEADER: &str = "x-session-token";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Snapshot import polling settings
#[derive(Debug, Clone)]
pub struct SnapshotPolling {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for SnapshotPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_polls: 360,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    snapshot_id: String,
    state: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    image_id: String,
}

/// Provider client bound to one region's endpoint and credentials
pub struct HttpProviderApi {
    client: Client,
    endpoint: Url,
    credentials: RegionCredentials,
    scrubber: SecretScrubber,
    retry: RetryManager,
    polling: SnapshotPolling,
}

impl HttpProviderApi {
    /// Create a client for `region`
    ///
    /// Fails on a malformed endpoint; performs no network I/O.
    pub fn new(region: &RegionConfig, retry: RetryOptions) -> Result<Self, DriverError> {
        let credentials = region.credentials.clone();
        let endpoint = Self::parse_endpoint(&credentials.endpoint)?;

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("ami-publisher/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut scrubber = SecretScrubber::new().with_secret(&credentials.secret_key);
        if let Some(token) = &credentials.session_token {
            scrubber = scrubber.with_secret(token);
        }

        Ok(Self {
            client,
            endpoint,
            credentials,
            scrubber,
            retry: RetryManager::new(retry),
            polling: SnapshotPolling::default(),
        })
    }

    pub fn with_polling(mut self, polling: SnapshotPolling) -> Self {
        self.polling = polling;
        self
    }

    fn parse_endpoint(endpoint: &str) -> Result<Url, DriverError> {
        let invalid = |message: &str| DriverError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            message: message.to_string(),
        };

        if endpoint.trim().is_empty() {
            return Err(invalid("endpoint is empty"));
        }

        let mut url = Url::parse(endpoint).map_err(|e| invalid(&e.to_string()))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(invalid("scheme must be http or https"));
        }
        if url.cannot_be_a_base() {
            return Err(invalid("endpoint cannot be used as a base URL"));
        }

        // Url::join replaces the last segment unless the path ends with '/'
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url)
    }

    fn url(&self, path: &str) -> Result<Url, DriverError> {
        self.endpoint
            .join(path)
            .map_err(|e| DriverError::InvalidEndpoint {
                endpoint: self.endpoint.to_string(),
                message: e.to_string(),
            })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.basic_auth(
            &self.credentials.access_key,
            Some(self.credentials.secret_key.expose_secret()),
        );

        match &self.credentials.session_token {
            Some(token) => request.header(SESSION_TOKEN_HEADER, token.expose_secret()),
            None => request,
        }
    }

    /// Turn a non-success response into a [`DriverError::Provider`]
    async fn check(&self, response: Response) -> Result<Response, DriverError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(DriverError::Provider {
            status: status.as_u16(),
            message: self.scrubber.scrub(body.trim()),
        })
    }

    async fn send_json<T, B>(&self, request: RequestBuilder, body: &B) -> Result<T, DriverError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let response = self.authorize(request).json(body).send().await?;
        let response = self.check(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| DriverError::MalformedResponse(e.to_string()))
    }

    async fn wait_for_snapshot(&self, mut snapshot: SnapshotResponse) -> Result<String, DriverError> {
        let mut polls = 0;

        loop {
            match snapshot.state.as_str() {
                "completed" => return Ok(snapshot.snapshot_id),
                "pending" | "active" => {}
                _ => {
                    return Err(DriverError::Provider {
                        status: 200,
                        message: format!(
                            "snapshot import {} ended in state '{}': {}",
                            snapshot.snapshot_id,
                            snapshot.state,
                            snapshot.message.as_deref().unwrap_or("no details")
                        ),
                    });
                }
            }

            if polls >= self.polling.max_polls {
                return Err(DriverError::Provider {
                    status: 200,
                    message: format!(
                        "snapshot import {} still '{}' after {} polls",
                        snapshot.snapshot_id, snapshot.state, polls
                    ),
                });
            }

            tokio::time::sleep(self.polling.interval).await;
            polls += 1;

            let url = self.url(&format!("snapshots/{}", snapshot.snapshot_id))?;
            snapshot = self
                .retry
                .retry(|| async {
                    let response = self.authorize(self.client.get(url.clone())).send().await?;
                    let response = self.check(response).await?;
                    response
                        .json::<SnapshotResponse>()
                        .await
                        .map_err(|e| DriverError::MalformedResponse(e.to_string()))
                })
                .await?;
            debug!(snapshot_id = %snapshot.snapshot_id, state = %snapshot.state, "polled snapshot import");
        }
    }
}

#[async_trait]
impl ProviderApi for HttpProviderApi {
    async fn upload_image(&self, bucket: &str, key: &str, path: &Path) -> Result<(), DriverError> {
        let url = self.url(&format!("buckets/{}/objects/{}", bucket, key))?;

        self.retry
            .retry(|| async {
                // Each attempt streams the file from the start
                let file = tokio::fs::File::open(path).await?;
                let length = file.metadata().await?.len();
                let response = self
                    .authorize(self.client.put(url.clone()))
                    .header(reqwest::header::CONTENT_LENGTH, length)
                    .body(file)
                    .send()
                    .await?;
                self.check(response).await.map(|_| ())
            })
            .await
    }

    async fn import_snapshot(&self, bucket: &str, key: &str) -> Result<String, DriverError> {
        let url = self.url("snapshots/import")?;
        let body = serde_json::json!({ "bucket": bucket, "key": key });

        let snapshot: SnapshotResponse = self
            .retry
            .retry(|| self.send_json(self.client.post(url.clone()), &body))
            .await?;

        self.wait_for_snapshot(snapshot).await
    }

    async fn register_image(&self, request: &RegisterImageRequest) -> Result<String, DriverError> {
        let url = self.url("images")?;

        let image: ImageResponse = self
            .retry
            .retry(|| self.send_json(self.client.post(url.clone()), request))
            .await?;

        Ok(image.image_id)
    }

    async fn create_tags(
        &self,
        image_id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), DriverError> {
        let url = self.url(&format!("images/{}/tags", image_id))?;

        self.retry
            .retry(|| async {
                let response = self
                    .authorize(self.client.put(url.clone()))
                    .json(tags)
                    .send()
                    .await?;
                self.check(response).await.map(|_| ())
            })
            .await
    }

    async fn set_launch_permission(
        &self,
        image_id: &str,
        permission: &LaunchPermission,
    ) -> Result<(), DriverError> {
        let url = self.url(&format!("images/{}/launch-permission", image_id))?;

        self.retry
            .retry(|| async {
                let response = self
                    .authorize(self.client.put(url.clone()))
                    .json(permission)
                    .send()
                    .await?;
                self.check(response).await.map(|_| ())
            })
            .await
    }

    async fn copy_image(&self, request: &CopyImageRequest) -> Result<String, DriverError> {
        let url = self.url("images/copy")?;

        let image: ImageResponse = self
            .retry
            .retry(|| self.send_json(self.client.post(url.clone()), request))
            .await?;

        Ok(image.image_id)
    }
}
