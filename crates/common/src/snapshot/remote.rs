use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

use super::create::signing_message;
use super::{Metadata, SnapshotError, SNAPSHOT_VERSION};
use crate::crypto::{RemoteAuthor, Signature};
use crate::grid::{Capability, DirectoryFields, FieldValue, Grid};
use crate::magic_path::magic2path;

/// A snapshot committed to the grid
///
/// Only ever built by reading a commit directory back (or from the commit
/// that was just written), so `capability` always names these exact fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    /// Relative path, `/`-separated
    pub name: String,
    pub author: RemoteAuthor,
    pub metadata: Metadata,
    pub capability: Capability,
    /// Parent commits, in commit order
    pub parents_raw: Vec<Capability>,
    pub content_cap: Capability,
    pub timestamp: i64,
}

fn literal<'a>(
    fields: &'a DirectoryFields,
    capability: &Capability,
    field: &'static str,
) -> Result<&'a str, SnapshotError> {
    let value = fields.get(field).ok_or_else(|| SnapshotError::MissingField {
        capability: capability.clone(),
        field,
    })?;
    // node text that happens to start with `URI:` parses back as a capability
    value.ro_uri().ok_or_else(|| SnapshotError::InvalidField {
        capability: capability.clone(),
        field,
        reason: "expected a literal".to_string(),
    })
}

impl RemoteSnapshot {
    /// Read, decode and verify the commit at `capability`
    pub async fn fetch(grid: &dyn Grid, capability: &Capability) -> Result<Self, SnapshotError> {
        let fields = grid.get_directory(capability).await?;
        Self::from_fields(capability, &fields)
    }

    pub(crate) fn from_fields(
        capability: &Capability,
        fields: &DirectoryFields,
    ) -> Result<Self, SnapshotError> {
        let version = literal(fields, capability, "version")?;
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                capability: capability.clone(),
                version: version.to_string(),
            });
        }

        let magic_name = literal(fields, capability, "name")?;
        let name = magic2path(magic_name)?;

        let (content_cap, metadata) = match fields.get("content") {
            Some(FieldValue::Capability { cap, metadata }) => (cap.clone(), metadata.clone()),
            Some(_) => {
                return Err(SnapshotError::InvalidField {
                    capability: capability.clone(),
                    field: "content",
                    reason: "expected a capability".to_string(),
                })
            }
            None => {
                return Err(SnapshotError::MissingField {
                    capability: capability.clone(),
                    field: "content",
                })
            }
        };

        let raw_timestamp = literal(fields, capability, "timestamp")?;
        let timestamp = raw_timestamp
            .parse::<i64>()
            .map_err(|e| SnapshotError::InvalidField {
                capability: capability.clone(),
                field: "timestamp",
                reason: e.to_string(),
            })?;

        let parents_raw = match fields.get("parents") {
            Some(FieldValue::List(caps)) => caps.clone(),
            Some(_) => {
                return Err(SnapshotError::InvalidField {
                    capability: capability.clone(),
                    field: "parents",
                    reason: "expected a list".to_string(),
                })
            }
            None => Vec::new(),
        };

        let author = RemoteAuthor::from_json(literal(fields, capability, "author")?)?;
        let signature = Signature::from_hex(literal(fields, capability, "author_signature")?)?;
        let message = signing_message(&content_cap, magic_name, timestamp, &parents_raw);
        author
            .verify(&message, &signature)
            .map_err(|_| SnapshotError::BadSignature(capability.clone()))?;

        Ok(Self {
            name,
            author,
            metadata,
            capability: capability.clone(),
            parents_raw,
            content_cap,
            timestamp,
        })
    }

    pub async fn fetch_content(&self, grid: &dyn Grid) -> Result<Bytes, SnapshotError> {
        Ok(grid.get(&self.content_cap).await?)
    }

    /// Copy the content into `sink`, returning the byte count
    pub async fn stream_content(
        &self,
        grid: &dyn Grid,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64, SnapshotError> {
        Ok(grid.stream(&self.content_cap, sink).await?)
    }
}
