use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

use super::{Capability, DirectoryFields, Grid, GridError, StorageApiError};

/// A grid node reached through its web API
#[derive(Debug, Clone)]
pub struct HttpGrid {
    url: Url,
    client: Client,
}

impl HttpGrid {
    pub fn new(url: &Url) -> Result<Self, GridError> {
        Ok(Self::with_client(url, Client::builder().build()?))
    }

    /// Apply a per-request timeout; an expired request surfaces as a
    /// retryable transport error like any other grid failure
    pub fn with_timeout(url: &Url, timeout: Duration) -> Result<Self, GridError> {
        Ok(Self::with_client(
            url,
            Client::builder().timeout(timeout).build()?,
        ))
    }

    pub fn with_client(url: &Url, client: Client) -> Self {
        let mut url = url.clone();
        // so that joining "uri" appends rather than replaces the last segment
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Self { url, client }
    }

    pub fn base_url(&self) -> &Url {
        &self.url
    }

    fn uri_endpoint(&self, query: &[(&str, &str)]) -> Result<Url, GridError> {
        let mut url = self.url.join("uri")?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url)
    }
}

/// Read the body, failing unless the status is one of `accepted`
async fn read_checked(response: Response, accepted: &[StatusCode]) -> Result<Bytes, GridError> {
    let status = response.status();
    let body = response.bytes().await?;
    if !accepted.contains(&status) {
        return Err(StorageApiError {
            code: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        }
        .into());
    }
    Ok(body)
}

fn parse_capability(body: &[u8]) -> Result<Capability, GridError> {
    std::str::from_utf8(body)
        .map_err(|e| GridError::Malformed(format!("capability is not utf-8: {}", e)))?
        .parse()
        .map_err(|e| GridError::Malformed(format!("{}", e)))
}

#[async_trait]
impl Grid for HttpGrid {
    async fn put_immutable(&self, data: Bytes) -> Result<Capability, GridError> {
        let url = self.uri_endpoint(&[("format", "CHK")])?;
        tracing::debug!(size = data.len(), "PUT immutable");

        let response = self.client.put(url).body(data).send().await?;
        let body = read_checked(response, &[StatusCode::CREATED]).await?;
        parse_capability(&body)
    }

    async fn put_immutable_directory(
        &self,
        fields: &DirectoryFields,
    ) -> Result<Capability, GridError> {
        let url = self.uri_endpoint(&[("t", "mkdir-immutable")])?;
        tracing::debug!(fields = fields.len(), "POST mkdir-immutable");

        let response = self
            .client
            .post(url)
            .body(fields.to_json_bytes())
            .send()
            .await?;
        let body = read_checked(response, &[StatusCode::OK, StatusCode::CREATED]).await?;
        parse_capability(&body)
    }

    async fn get(&self, capability: &Capability) -> Result<Bytes, GridError> {
        let url = self.uri_endpoint(&[("uri", capability.as_str())])?;
        let response = self.client.get(url).send().await?;
        read_checked(response, &[StatusCode::OK]).await
    }

    async fn get_directory(&self, capability: &Capability) -> Result<DirectoryFields, GridError> {
        let url = self.uri_endpoint(&[("uri", capability.as_str()), ("t", "json")])?;
        let response = self.client.get(url).send().await?;
        let body = read_checked(response, &[StatusCode::OK]).await?;
        DirectoryFields::from_json_bytes(&body)
            .map_err(|e| GridError::Malformed(format!("directory {}: {}", capability, e)))
    }

    async fn stream(
        &self,
        capability: &Capability,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, GridError> {
        let url = self.uri_endpoint(&[("uri", capability.as_str())])?;
        let mut response = self.client.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(read_checked(response, &[StatusCode::OK])
                .await
                .err()
                .unwrap_or_else(|| GridError::Malformed("unexpected status".to_string())));
        }

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_keeps_base_path() {
        let grid = HttpGrid::new(&Url::parse("http://127.0.0.1:3456/node").unwrap()).unwrap();
        let url = grid.uri_endpoint(&[("t", "mkdir-immutable")]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3456/node/uri?t=mkdir-immutable");
    }

    #[test]
    fn test_endpoint_escapes_capability() {
        let grid = HttpGrid::new(&Url::parse("http://127.0.0.1:3456/").unwrap()).unwrap();
        let url = grid
            .uri_endpoint(&[("uri", "URI:CHK:a b"), ("t", "json")])
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3456/uri?uri=URI%3ACHK%3Aa+b&t=json");
    }

    #[test]
    fn test_parse_capability_trims_newline() {
        assert_eq!(
            parse_capability(b"URI:CHK:abc\n").unwrap(),
            Capability::new("URI:CHK:abc")
        );
        assert!(parse_capability(b"  \n").is_err());
    }
}
