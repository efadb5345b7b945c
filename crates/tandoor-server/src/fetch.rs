use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not download image: {0}")]
    Request(#[from] reqwest::Error),

    #[error("image download returned status {0}")]
    Status(u16),

    #[error("downloaded image is empty")]
    Empty,
}

/// Downloads images referenced by requests.
#[derive(Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::Empty);
        }
        tracing::debug!(url, size = bytes.len(), "downloaded image");
        Ok(bytes.to_vec())
    }
}
