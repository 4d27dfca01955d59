//! Storage grid adapter
//!
//! The grid is an external capability-addressed object store. This module is
//! the only place that knows about its transport status codes; everything
//! above it works with [`Capability`] values and [`GridError`].
//!
//! # Backends
//!
//! - **[`HttpGrid`]**: talks to a grid node's web API over HTTP
//! - **[`MemoryGrid`]**: in-process, content-addressed; used for tests and
//!   local experiments

mod capability;
mod fields;
mod http;
mod memory;

pub use capability::{Capability, EmptyCapability, CAPABILITY_PREFIX};
pub use fields::{DirectoryFields, FieldValue};
pub use http::HttpGrid;
pub use memory::{GridOperation, MemoryGrid};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWrite;

/// The grid answered with a status outside the accepted set for the call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("storage API error: status {code}: {body}")]
pub struct StorageApiError {
    pub code: u16,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error(transparent)]
    Api(#[from] StorageApiError),
    #[error("grid transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid grid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("malformed grid response: {0}")]
    Malformed(String),
    #[error("failed to write to sink: {0}")]
    Sink(#[from] std::io::Error),
}

impl GridError {
    /// Whether retrying the same call may succeed
    ///
    /// Status errors and transport failures (timeouts included) are retryable;
    /// malformed data and local sink failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GridError::Api(_) | GridError::Transport(_))
    }

    /// The grid status code, for API errors
    pub fn status(&self) -> Option<u16> {
        match self {
            GridError::Api(e) => Some(e.code),
            GridError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Operations the snapshot core needs from a storage grid
#[async_trait]
pub trait Grid: Send + Sync + std::fmt::Debug {
    /// Store immutable bytes. Identical bytes yield the same capability, so
    /// callers may retry freely.
    async fn put_immutable(&self, data: Bytes) -> Result<Capability, GridError>;

    /// Create an immutable directory with the given named children
    async fn put_immutable_directory(
        &self,
        fields: &DirectoryFields,
    ) -> Result<Capability, GridError>;

    /// Fetch the raw bytes behind a capability
    async fn get(&self, capability: &Capability) -> Result<Bytes, GridError>;

    /// Fetch and parse the children of an immutable directory
    async fn get_directory(&self, capability: &Capability) -> Result<DirectoryFields, GridError>;

    /// Copy the bytes behind a capability into `sink`, returning the byte count
    ///
    /// On failure, whatever was already written to the sink stays written.
    async fn stream(
        &self,
        capability: &Capability,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, GridError>;
}
