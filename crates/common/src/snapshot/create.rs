use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use uuid::Uuid;

use super::{LocalSnapshot, Metadata, RemoteSnapshot, SnapshotError, SNAPSHOT_VERSION};
use crate::crypto::LocalAuthor;
use crate::grid::{Capability, DirectoryFields, FieldValue, Grid};
use crate::magic_path::path2magic;

const SIGNING_CONTEXT: &str = "magic-folder-snapshot-v1";

/// Everything a new commit is made of
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    /// Relative path, `/`-separated
    pub name: String,
    pub content: Bytes,
    /// Parent commits; order is kept as given
    pub parents: Vec<Capability>,
    pub metadata: Metadata,
    /// POSIX seconds
    pub timestamp: i64,
}

/// Current POSIX time in seconds
pub fn now_timestamp() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// The bytes an author signs to vouch for a commit
pub fn signing_message(
    content_cap: &Capability,
    magic_name: &str,
    timestamp: i64,
    parents: &[Capability],
) -> Vec<u8> {
    let mut message = format!(
        "{}\n{}\n{}\n{}\n",
        SIGNING_CONTEXT, content_cap, magic_name, timestamp
    );
    let parents: Vec<&str> = parents.iter().map(Capability::as_str).collect();
    message.push_str(&parents.join("\n"));
    message.into_bytes()
}

/// Store `snapshot.content`, then commit it
///
/// The two grid calls are not atomic. If the commit fails the content object
/// stays behind; it is immutable and content-addressed, so a retry from the
/// start reuses it.
pub async fn create_remote_snapshot(
    grid: &dyn Grid,
    author: &LocalAuthor,
    snapshot: NewSnapshot,
) -> Result<RemoteSnapshot, SnapshotError> {
    let content_cap = grid.put_immutable(snapshot.content).await?;
    tracing::debug!(name = %snapshot.name, content = %content_cap, "stored snapshot content");

    create_commit(
        grid,
        author,
        content_cap,
        &snapshot.name,
        &snapshot.parents,
        &snapshot.metadata,
        snapshot.timestamp,
    )
    .await
}

/// Create the commit directory for already-stored content
pub async fn create_commit(
    grid: &dyn Grid,
    author: &LocalAuthor,
    content_cap: Capability,
    name: &str,
    parents: &[Capability],
    metadata: &Metadata,
    timestamp: i64,
) -> Result<RemoteSnapshot, SnapshotError> {
    let magic_name = path2magic(name);
    let remote_author = author.to_remote_author();
    let signature = author.sign(&signing_message(&content_cap, &magic_name, timestamp, parents));

    let mut fields = DirectoryFields::new();
    fields
        .insert(
            "content",
            FieldValue::Capability {
                cap: content_cap.clone(),
                metadata: metadata.clone(),
            },
        )
        .insert("version", FieldValue::literal(SNAPSHOT_VERSION))
        .insert("timestamp", FieldValue::literal(timestamp.to_string()))
        .insert("name", FieldValue::literal(magic_name))
        .insert("author", FieldValue::literal(remote_author.to_json()))
        .insert("author_signature", FieldValue::literal(signature.to_hex()));
    if !parents.is_empty() {
        fields.insert("parents", FieldValue::List(parents.to_vec()));
    }

    let capability = grid.put_immutable_directory(&fields).await?;
    tracing::debug!(name, capability = %capability, parents = parents.len(), "created commit");

    Ok(RemoteSnapshot {
        name: name.to_string(),
        author: remote_author,
        metadata: metadata.clone(),
        capability,
        parents_raw: parents.to_vec(),
        content_cap,
        timestamp,
    })
}

/// Upload a local snapshot together with every un-uploaded ancestor
///
/// Ancestors are committed first. Each commit's parents are its
/// `parents_remote` followed by the commits of its `parents_local`.
/// Returns the commit for `snapshot` itself.
pub async fn upload_local_snapshot(
    grid: &dyn Grid,
    snapshot: &LocalSnapshot,
) -> Result<RemoteSnapshot, SnapshotError> {
    let mut uploaded: HashMap<Uuid, Capability> = HashMap::new();
    for ancestor in ancestors_oldest_first(snapshot) {
        let remote = commit_local(grid, ancestor, &uploaded).await?;
        uploaded.insert(ancestor.identifier, remote.capability);
    }
    commit_local(grid, snapshot, &uploaded).await
}

/// Post-order walk of the local ancestors, excluding `snapshot` itself
fn ancestors_oldest_first(snapshot: &LocalSnapshot) -> Vec<&LocalSnapshot> {
    let mut order = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<(&LocalSnapshot, bool)> = snapshot
        .parents_local
        .iter()
        .rev()
        .map(|p| (p, false))
        .collect();

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !seen.insert(node.identifier) {
            continue;
        }
        stack.push((node, true));
        stack.extend(node.parents_local.iter().rev().map(|p| (p, false)));
    }
    order
}

async fn commit_local(
    grid: &dyn Grid,
    node: &LocalSnapshot,
    uploaded: &HashMap<Uuid, Capability>,
) -> Result<RemoteSnapshot, SnapshotError> {
    let mut parents = node.parents_remote.clone();
    parents.extend(
        node.parents_local
            .iter()
            .filter_map(|p| uploaded.get(&p.identifier).cloned()),
    );

    let content = node.read_content().await?;
    create_remote_snapshot(
        grid,
        &node.author,
        NewSnapshot {
            name: node.name.clone(),
            content,
            parents,
            metadata: node.metadata.clone(),
            timestamp: node.timestamp,
        },
    )
    .await
}
