use crate::prompt;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Error)]
pub enum EnhanceError {
    #[error("OPENAI_API_KEY is not configured")]
    MissingApiKey,

    #[error("Failed to read {}: {source}", .path.display())]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Non-success response; `message` prefers the API's own error text
    #[error("{message}")]
    Api { status: StatusCode, message: String },

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("No image URL in response")]
    MissingUrl,
}

impl EnhanceError {
    pub fn is_transient(&self) -> bool {
        match self {
            EnhanceError::Api { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            EnhanceError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[derive(Deserialize)]
struct ImageEditResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Clone)]
pub struct ImageEditClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ImageEditClient {
    pub fn new(base_url: String, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            base_url,
            api_key,
            client,
        }
    }

    /// Upload the image with the enhancement prompt and return the first result URL
    pub async fn enhance(&self, image: &Path) -> Result<String, EnhanceError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(EnhanceError::MissingApiKey)?;

        let bytes = tokio::fs::read(image)
            .await
            .map_err(|source| EnhanceError::ReadImage {
                path: image.to_path_buf(),
                source,
            })?;

        let file_name = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image.jpg")
            .to_string();

        debug!(bytes = bytes.len(), file = %file_name, "Uploading image for enhancement");

        let part = Part::bytes(bytes).file_name(file_name).mime_str("image/jpeg")?;
        let form = Form::new()
            .part("image", part)
            .text("prompt", prompt::ENHANCE_PROMPT)
            .text("model", prompt::MODEL)
            .text("n", prompt::OUTPUT_COUNT.to_string())
            .text("size", prompt::OUTPUT_SIZE);

        let url = format!("{}/images/edits", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnhanceError::Api {
                status,
                message: api_error_message(status, &body),
            });
        }

        let parsed: ImageEditResponse = response.json().await?;

        parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or(EnhanceError::MissingUrl)
    }
}

fn api_error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| format!("Request failed with status code {}", status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::Multipart,
        http::{HeaderMap, StatusCode as AxumStatus},
        response::{IntoResponse, Response},
        routing::post,
    };
    use serde_json::json;
    use std::collections::HashMap;

    const ENHANCED: &str = "https://cdn.example.com/enhanced/p1.png";

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    async fn edits(headers: HeaderMap, mut multipart: Multipart) -> Response {
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok());
        if auth != Some("Bearer sk-test") {
            return (
                AxumStatus::UNAUTHORIZED,
                Json(json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}})),
            )
                .into_response();
        }

        let mut texts = HashMap::new();
        let mut image_name = None;
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            if name == "image" {
                image_name = field.file_name().map(str::to_string);
                let data = field.bytes().await.unwrap();
                assert!(!data.is_empty());
            } else {
                texts.insert(name, field.text().await.unwrap());
            }
        }

        let ok = image_name.as_deref() == Some("p1_original.jpg")
            && texts.get("model").map(String::as_str) == Some("dall-e-2")
            && texts.get("n").map(String::as_str) == Some("1")
            && texts.get("size").map(String::as_str) == Some("1024x1024")
            && texts.contains_key("prompt");
        if !ok {
            return (
                AxumStatus::BAD_REQUEST,
                Json(json!({"error": {"message": "malformed form"}})),
            )
                .into_response();
        }

        Json(json!({"created": 1700000000, "data": [{"url": ENHANCED}, {"url": "https://other"}]}))
            .into_response()
    }

    async fn write_image(dir: &Path) -> PathBuf {
        let path = dir.join("p1_original.jpg");
        tokio::fs::write(&path, [0xFF, 0xD8, 0xFF, 0xE0]).await.unwrap();
        path
    }

    #[tokio::test]
    async fn test_enhance_returns_first_url() {
        let base = spawn_stub(Router::new().route("/v1/images/edits", post(edits))).await;
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path()).await;

        let client = ImageEditClient::new(base, Some("sk-test".into()), reqwest::Client::new());
        let url = client.enhance(&image).await.unwrap();

        assert_eq!(url, ENHANCED);
    }

    #[tokio::test]
    async fn test_api_error_message_is_preferred() {
        let base = spawn_stub(Router::new().route("/v1/images/edits", post(edits))).await;
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path()).await;

        let client = ImageEditClient::new(base, Some("sk-wrong".into()), reqwest::Client::new());
        let err = client.enhance(&image).await.unwrap_err();

        assert_eq!(err.to_string(), "Incorrect API key provided");
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_empty_result_array() {
        let app = Router::new().route(
            "/v1/images/edits",
            post(|| async { Json(json!({"created": 1, "data": []})) }),
        );
        let base = spawn_stub(app).await;
        let dir = tempfile::tempdir().unwrap();
        let image = write_image(dir.path()).await;

        let client = ImageEditClient::new(base, Some("sk-test".into()), reqwest::Client::new());
        let err = client.enhance(&image).await.unwrap_err();

        assert!(matches!(err, EnhanceError::MissingUrl));
    }

    #[tokio::test]
    async fn test_missing_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let client = ImageEditClient::new(
            "http://127.0.0.1:9/v1".into(),
            Some("sk-test".into()),
            reqwest::Client::new(),
        );
        let err = client.enhance(&dir.path().join("absent.jpg")).await.unwrap_err();

        assert!(matches!(err, EnhanceError::ReadImage { .. }));
    }

    #[test]
    fn test_error_message_fallback() {
        assert_eq!(
            api_error_message(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
            "Request failed with status code 502"
        );
        assert_eq!(
            api_error_message(StatusCode::BAD_REQUEST, r#"{"error":{"message":"Invalid image"}}"#),
            "Invalid image"
        );
    }
}
