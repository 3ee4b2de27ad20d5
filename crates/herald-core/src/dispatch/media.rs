//! Media resolution and upload deduplication
//!
//! Every distinct media source is uploaded at most once per campaign; all
//! recipients referencing it share the returned public URL. The cache lives
//! for one campaign invocation and is written only during preparation.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::anyhow;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use herald_gateway::MessageGateway;
use tracing::{debug, info};

use super::manager::DispatchError;

/// Campaign-scoped media resolver and cache
pub struct MediaResolver {
    cache: HashMap<String, String>,
    fetch_client: reqwest::Client,
}

impl MediaResolver {
    /// Create a resolver whose remote fetches use the given timeout
    pub fn new(http_timeout: Duration) -> Result<Self, DispatchError> {
        let fetch_client = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| {
                DispatchError::Internal(anyhow!("failed to create media fetch client: {}", e))
            })?;

        Ok(Self {
            cache: HashMap::new(),
            fetch_client,
        })
    }

    /// Resolve `source` to a gateway-hosted public URL, uploading on first
    /// use. Idempotent per source within this resolver's lifetime.
    pub async fn resolve(
        &mut self,
        gateway: &dyn MessageGateway,
        source: &str,
    ) -> Result<String, DispatchError> {
        if let Some(hit) = self.cache.get(source) {
            debug!(source, "Media cache hit");
            return Ok(hit.clone());
        }

        if gateway.is_hosted_media_url(source) {
            // Already gateway-hosted, no re-upload.
            self.cache.insert(source.to_string(), source.to_string());
            return Ok(source.to_string());
        }

        let payload = self.inline_payload(source).await?;
        let public_url = gateway
            .upload_media(&payload)
            .await
            .map_err(|e| media_error(source, format!("upload failed: {}", e)))?;

        info!(source, public_url = public_url.as_str(), "Media uploaded");
        self.cache.insert(source.to_string(), public_url.clone());
        Ok(public_url)
    }

    /// Number of distinct sources resolved so far
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether nothing has been resolved yet
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Hand the finished cache to the send loop
    pub fn into_cache(self) -> HashMap<String, String> {
        self.cache
    }

    /// Bring `source` into inline base64 form
    async fn inline_payload(&self, source: &str) -> Result<String, DispatchError> {
        if let Some(rest) = source.strip_prefix("data:") {
            return match rest.split_once(',') {
                Some((_, payload)) if !payload.is_empty() => Ok(payload.to_string()),
                _ => Err(media_error(source, "malformed data URI".to_string())),
            };
        }

        if source.starts_with("http://") || source.starts_with("https://") {
            let response = self
                .fetch_client
                .get(source)
                .send()
                .await
                .map_err(|e| media_error(source, format!("fetch failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(media_error(
                    source,
                    format!("fetch returned HTTP {}", response.status()),
                ));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|e| media_error(source, format!("fetch failed: {}", e)))?;

            return Ok(BASE64.encode(&bytes));
        }

        // Anything else must already be a base64 payload.
        BASE64
            .decode(source)
            .map_err(|e| media_error(source, format!("not a URL or base64 payload: {}", e)))?;
        Ok(source.to_string())
    }
}

fn media_error(source: &str, reason: String) -> DispatchError {
    DispatchError::MediaResolution {
        origin: source.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{BrokenUploadGateway, ScriptedGateway};
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver() -> MediaResolver {
        MediaResolver::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_each_distinct_source_uploaded_once() {
        let gateway = ScriptedGateway::always_ok();
        let mut resolver = resolver();

        let first = resolver.resolve(&gateway, "aGVsbG8=").await.unwrap();
        let second = resolver.resolve(&gateway, "aGVsbG8=").await.unwrap();
        let third = resolver.resolve(&gateway, "aGVsbG8=").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(gateway.uploads().len(), 1);
        assert_eq!(resolver.len(), 1);
    }

    #[tokio::test]
    async fn test_hosted_url_passes_through_without_upload() {
        let gateway = ScriptedGateway::always_ok();
        let mut resolver = resolver();

        let url = resolver
            .resolve(&gateway, "https://media.test/hosted/99")
            .await
            .unwrap();

        assert_eq!(url, "https://media.test/hosted/99");
        assert!(gateway.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_data_uri_payload_is_extracted() {
        let gateway = ScriptedGateway::always_ok();
        let mut resolver = resolver();

        resolver
            .resolve(&gateway, "data:image/png;base64,aGVsbG8=")
            .await
            .unwrap();

        assert_eq!(gateway.uploads(), vec!["aGVsbG8=".to_string()]);
    }

    #[tokio::test]
    async fn test_remote_url_fetched_and_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let gateway = ScriptedGateway::always_ok();
        let mut resolver = resolver();

        resolver
            .resolve(&gateway, &format!("{}/img.png", server.uri()))
            .await
            .unwrap();

        assert_eq!(gateway.uploads(), vec!["aGVsbG8=".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_media_resolution_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let gateway = ScriptedGateway::always_ok();
        let mut resolver = resolver();
        let source = format!("{}/gone.png", server.uri());

        let err = resolver.resolve(&gateway, &source).await.unwrap_err();
        match err {
            DispatchError::MediaResolution { origin: s, reason } => {
                assert_eq!(s, source);
                assert!(reason.contains("404"), "reason was: {}", reason);
            }
            other => panic!("expected media resolution error, got {}", other),
        }
        assert!(gateway.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_is_media_resolution_error() {
        let mut resolver = resolver();

        let err = resolver
            .resolve(&BrokenUploadGateway, "aGVsbG8=")
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::MediaResolution { .. }));
    }

    #[tokio::test]
    async fn test_garbage_source_is_media_resolution_error() {
        let gateway = ScriptedGateway::always_ok();
        let mut resolver = resolver();

        let err = resolver
            .resolve(&gateway, "*** definitely not media ***")
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::MediaResolution { .. }));
        assert!(gateway.uploads().is_empty());
    }
}
