use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("PROPERTY_API_BASE_URL is not configured")]
    MissingBaseUrl,

    #[error("Invalid property API URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed with status code {}", .0.as_u16())]
    Status(StatusCode),

    #[error("{0}")]
    Http(#[from] reqwest::Error),
}

impl PropertyError {
    pub fn is_transient(&self) -> bool {
        match self {
            PropertyError::Status(status) => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            PropertyError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DroneImagePatch {
    pub drone_image_url: String,
}

#[derive(Clone)]
pub struct PropertyClient {
    base_url: Option<String>,
    token: Option<String>,
    client: reqwest::Client,
}

impl PropertyClient {
    pub fn new(base_url: Option<String>, token: Option<String>, client: reqwest::Client) -> Self {
        Self {
            base_url,
            token,
            client,
        }
    }

    /// `{base}/properties/{id}` with the id as one encoded path segment
    pub fn property_url(&self, property_id: &str) -> Result<Url, PropertyError> {
        let base = self
            .base_url
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or(PropertyError::MissingBaseUrl)?;

        let mut url = Url::parse(base).map_err(|e| PropertyError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| PropertyError::InvalidUrl(base.to_string()))?
            .pop_if_empty()
            .push("properties")
            .push(property_id);

        Ok(url)
    }

    /// Point the property's `drone_image_url` at the enhanced image
    pub async fn set_drone_image(
        &self,
        property_id: &str,
        enhanced_image_url: &str,
    ) -> Result<(), PropertyError> {
        let url = self.property_url(property_id)?;

        let mut request = self.client.patch(url).json(&DroneImagePatch {
            drone_image_url: enhanced_image_url.to_string(),
        });
        if let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(PropertyError::Status(response.status()));
        }

        debug!(property_id, "Property drone image updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, State},
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::patch,
    };
    use std::sync::{Arc, Mutex};

    type Received = Arc<Mutex<Vec<(String, DroneImagePatch)>>>;

    async fn update(
        State(received): State<Received>,
        Path(id): Path<String>,
        headers: HeaderMap,
        Json(body): Json<DroneImagePatch>,
    ) -> AxumStatus {
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
        if auth != Some("Bearer prop-token") {
            return AxumStatus::UNAUTHORIZED;
        }
        received.lock().unwrap().push((id, body));
        AxumStatus::OK
    }

    async fn spawn_stub() -> (String, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route("/api/properties/:id", patch(update))
            .with_state(received.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/api/", addr), received)
    }

    #[tokio::test]
    async fn test_patch_sets_drone_image_url() {
        let (base, received) = spawn_stub().await;
        let client = PropertyClient::new(Some(base), Some("prop-token".into()), reqwest::Client::new());

        client
            .set_drone_image("abc-123", "https://cdn.example.com/e.png")
            .await
            .unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "abc-123");
        assert_eq!(received[0].1.drone_image_url, "https://cdn.example.com/e.png");
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let (base, received) = spawn_stub().await;
        let client = PropertyClient::new(Some(base), Some("nope".into()), reqwest::Client::new());

        let err = client.set_drone_image("abc", "https://x").await.unwrap_err();

        assert_eq!(err.to_string(), "Request failed with status code 401");
        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_property_url_encodes_id() {
        let client = PropertyClient::new(
            Some("https://records.example.com/v2".into()),
            None,
            reqwest::Client::new(),
        );
        let url = client.property_url("lot 7/b").unwrap();
        assert_eq!(url.as_str(), "https://records.example.com/v2/properties/lot%207%2Fb");
    }

    #[test]
    fn test_missing_base_url() {
        let client = PropertyClient::new(None, Some("t".into()), reqwest::Client::new());
        assert!(matches!(
            client.property_url("1"),
            Err(PropertyError::MissingBaseUrl)
        ));
    }
}
