//! URL Validator (C9): ranged-HEAD probe used by the cache's pre-expiry
//! revalidation (§4.9).

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use trailer_store::{UrlValidator, ValidationOutcome};

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

pub struct HttpUrlValidator {
    http: reqwest::Client,
}

impl HttpUrlValidator {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(PROBE_TIMEOUT)
                .build()
                .expect("failed to build validator http client"),
        }
    }
}

impl Default for HttpUrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UrlValidator for HttpUrlValidator {
    /// 200/206 are valid, 404/410 are gone, everything else (403, 429, 5xx,
    /// timeouts, network errors) is treated as valid — a transient failure
    /// must never evict a cache entry.
    async fn probe(&self, url: &str) -> ValidationOutcome {
        let request = self.http.head(url).header("Range", "bytes=0-1");
        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if status == 404 || status == 410 {
                    ValidationOutcome::Gone
                } else {
                    ValidationOutcome::Valid
                }
            }
            Err(e) => {
                debug!(url, error = %e, "validator probe failed, treating as still-valid");
                ValidationOutcome::Valid
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn treats_404_as_gone() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD")).respond_with(ResponseTemplate::new(404)).mount(&server).await;
        let validator = HttpUrlValidator::new();
        assert_eq!(validator.probe(&server.uri()).await, ValidationOutcome::Gone);
    }

    #[tokio::test]
    async fn treats_403_as_valid() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD")).respond_with(ResponseTemplate::new(403)).mount(&server).await;
        let validator = HttpUrlValidator::new();
        assert_eq!(validator.probe(&server.uri()).await, ValidationOutcome::Valid);
    }

    #[tokio::test]
    async fn treats_206_as_valid() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD")).respond_with(ResponseTemplate::new(206)).mount(&server).await;
        let validator = HttpUrlValidator::new();
        assert_eq!(validator.probe(&server.uri()).await, ValidationOutcome::Valid);
    }
}
