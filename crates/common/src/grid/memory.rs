use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Capability, DirectoryFields, Grid, GridError, StorageApiError};

const CHK_PREFIX: &str = "URI:CHK:";
const DIR_PREFIX: &str = "URI:DIR2-CHK:";

/// Grid operations that can be made to fail on a [`MemoryGrid`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GridOperation {
    PutImmutable,
    PutDirectory,
    Get,
}

#[derive(Debug, Default)]
struct Inner {
    objects: HashMap<Capability, Bytes>,
    directories: HashMap<Capability, DirectoryFields>,
    failing: HashSet<GridOperation>,
}

/// An in-process, content-addressed grid
///
/// Capabilities are derived from a blake3 hash of the stored bytes (or of the
/// canonical field JSON for directories), so storing the same thing twice
/// yields the same capability. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryGrid {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call of `op` answer `503 Service Unavailable` until unset
    pub fn set_failing(&self, op: GridOperation, failing: bool) {
        let mut inner = self.inner.write();
        if failing {
            inner.failing.insert(op);
        } else {
            inner.failing.remove(&op);
        }
    }

    pub fn object_count(&self) -> usize {
        self.inner.read().objects.len()
    }

    pub fn directory_count(&self) -> usize {
        self.inner.read().directories.len()
    }

    fn check_failing(&self, op: GridOperation) -> Result<(), GridError> {
        if self.inner.read().failing.contains(&op) {
            return Err(StorageApiError {
                code: 503,
                body: format!("injected failure for {:?}", op),
            }
            .into());
        }
        Ok(())
    }

    fn lookup(&self, capability: &Capability) -> Result<Bytes, GridError> {
        let inner = self.inner.read();
        if let Some(data) = inner.objects.get(capability) {
            return Ok(data.clone());
        }
        if let Some(fields) = inner.directories.get(capability) {
            return Ok(Bytes::from(fields.to_json_bytes()));
        }
        Err(not_found(capability))
    }
}

fn not_found(capability: &Capability) -> GridError {
    StorageApiError {
        code: 404,
        body: format!("no such capability: {}", capability),
    }
    .into()
}

#[async_trait]
impl Grid for MemoryGrid {
    async fn put_immutable(&self, data: Bytes) -> Result<Capability, GridError> {
        self.check_failing(GridOperation::PutImmutable)?;
        let cap = Capability::new(format!("{}{}", CHK_PREFIX, blake3::hash(&data).to_hex()));
        self.inner.write().objects.insert(cap.clone(), data);
        Ok(cap)
    }

    async fn put_immutable_directory(
        &self,
        fields: &DirectoryFields,
    ) -> Result<Capability, GridError> {
        self.check_failing(GridOperation::PutDirectory)?;
        let hash = blake3::hash(&fields.to_json_bytes());
        let cap = Capability::new(format!("{}{}", DIR_PREFIX, hash.to_hex()));
        self.inner
            .write()
            .directories
            .insert(cap.clone(), fields.clone());
        Ok(cap)
    }

    async fn get(&self, capability: &Capability) -> Result<Bytes, GridError> {
        self.check_failing(GridOperation::Get)?;
        self.lookup(capability)
    }

    async fn get_directory(&self, capability: &Capability) -> Result<DirectoryFields, GridError> {
        self.check_failing(GridOperation::Get)?;
        let inner = self.inner.read();
        if let Some(fields) = inner.directories.get(capability) {
            return Ok(fields.clone());
        }
        if inner.objects.contains_key(capability) {
            return Err(GridError::Malformed(format!(
                "{} is not a directory",
                capability
            )));
        }
        Err(not_found(capability))
    }

    async fn stream(
        &self,
        capability: &Capability,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, GridError> {
        self.check_failing(GridOperation::Get)?;
        let data = self.lookup(capability)?;
        sink.write_all(&data).await?;
        sink.flush().await?;
        Ok(data.len() as u64)
    }
}
