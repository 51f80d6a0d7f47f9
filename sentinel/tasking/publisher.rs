use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::{error::TaskingError, model::TaskingPlan};

/// Destination for freshly computed plans. Publication replaces the previous plan.
#[async_trait]
pub trait TaskingStore: Send + Sync {
    /// Publishes `plan` wholesale.
    async fn publish(&self, plan: &TaskingPlan) -> Result<(), TaskingError>;
}

/// Posts plans as JSON to a remote tasking service.
#[derive(Debug, Clone)]
pub struct HttpTaskingStore {
    client: Client,
    url: String,
    auth_token: Option<String>,
    timeout: Duration,
}

impl HttpTaskingStore {
    /// Creates a store posting to `url` with the given per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TaskingError> {
        let client = Client::builder()
            .user_agent("sentinel-tasking/0.1")
            .build()
            .map_err(|err| TaskingError::Publish(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            auth_token: None,
            timeout,
        })
    }

    /// Sends `Authorization: Bearer <token>` with every publish.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TaskingStore for HttpTaskingStore {
    async fn publish(&self, plan: &TaskingPlan) -> Result<(), TaskingError> {
        let mut request = self.client.post(&self.url).json(plan).timeout(self.timeout);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                TaskingError::Timeout {
                    operation: "publish",
                    timeout: self.timeout,
                }
            } else {
                err.into()
            }
        })?;
        response.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_store_reports_publish_error() {
        let store = HttpTaskingStore::new("http://127.0.0.1:9/tasking", Duration::from_millis(500))
            .unwrap()
            .with_auth_token("service-token");
        let err = store.publish(&TaskingPlan::empty()).await.unwrap_err();
        assert!(matches!(err, TaskingError::Publish(_)));
        assert_eq!(store.url(), "http://127.0.0.1:9/tasking");
    }
}
