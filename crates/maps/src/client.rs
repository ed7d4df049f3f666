use crate::tile::{self, Coordinates};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MapsError {
    #[error("GOOGLE_MAPS_API_KEY is not configured")]
    MissingApiKey,

    #[error("Invalid Static Maps URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed with status code {}", .0.as_u16())]
    Status(StatusCode),

    #[error("{0}")]
    Http(reqwest::Error),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MapsError {
    /// Whether another attempt could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            MapsError::Status(status) => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            MapsError::Http(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for MapsError {
    fn from(e: reqwest::Error) -> Self {
        // The request URL carries the API key
        MapsError::Http(e.without_url())
    }
}

#[derive(Clone)]
pub struct StaticMapClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl StaticMapClient {
    pub fn new(base_url: String, api_key: Option<String>, client: reqwest::Client) -> Self {
        Self {
            base_url,
            api_key,
            client,
        }
    }

    /// Stream the satellite tile centered on `center` into `dest`
    pub async fn download(&self, center: Coordinates, dest: &Path) -> Result<PathBuf, MapsError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(MapsError::MissingApiKey)?;

        let url = tile::build_tile_url(&self.base_url, center, api_key)
            .map_err(MapsError::InvalidUrl)?;

        let mut response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(MapsError::Status(response.status()));
        }

        let io_err = |source| MapsError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut file = File::create(dest).await.map_err(io_err)?;
        let mut written = 0usize;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len();
        }
        file.flush().await.map_err(io_err)?;

        debug!(bytes = written, path = %dest.display(), "Satellite tile saved");

        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, extract::Query, http::StatusCode as AxumStatus, routing::get};
    use std::collections::HashMap;

    async fn spawn_stub(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/staticmap", addr)
    }

    async fn tile(Query(params): Query<HashMap<String, String>>) -> Result<Vec<u8>, AxumStatus> {
        if params.get("key").map(String::as_str) != Some("good-key")
            || params.get("zoom").map(String::as_str) != Some("17")
            || params.get("maptype").map(String::as_str) != Some("satellite")
        {
            return Err(AxumStatus::FORBIDDEN);
        }
        Ok(vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3])
    }

    #[tokio::test]
    async fn test_download_writes_body() {
        let base = spawn_stub(Router::new().route("/staticmap", get(tile))).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("p1_original.jpg");

        let client = StaticMapClient::new(base, Some("good-key".into()), reqwest::Client::new());
        let path = client.download(Coordinates::new(1.5, 2.5), &dest).await.unwrap();

        assert_eq!(path, dest);
        let bytes = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(bytes, vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_error_status() {
        let base = spawn_stub(Router::new().route("/staticmap", get(tile))).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("p1_original.jpg");

        let client = StaticMapClient::new(base, Some("bad-key".into()), reqwest::Client::new());
        let err = client.download(Coordinates::new(1.0, 1.0), &dest).await.unwrap_err();

        assert_eq!(err.to_string(), "Request failed with status code 403");
        assert!(!err.is_transient());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_missing_key_fails_fast() {
        let client = StaticMapClient::new(
            "http://127.0.0.1:9/unused".into(),
            Some(String::new()),
            reqwest::Client::new(),
        );
        let err = client
            .download(Coordinates::new(1.0, 1.0), Path::new("unused.jpg"))
            .await
            .unwrap_err();

        assert!(matches!(err, MapsError::MissingApiKey));
    }

    #[test]
    fn test_transient_statuses() {
        assert!(MapsError::Status(StatusCode::SERVICE_UNAVAILABLE).is_transient());
        assert!(MapsError::Status(StatusCode::TOO_MANY_REQUESTS).is_transient());
        assert!(!MapsError::Status(StatusCode::NOT_FOUND).is_transient());
        assert!(!MapsError::MissingApiKey.is_transient());
    }
}
