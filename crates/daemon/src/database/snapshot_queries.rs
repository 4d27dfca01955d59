use std::collections::BTreeSet;

use sqlx::Row;
use uuid::Uuid;

use common::crypto::LocalAuthor;
use common::magic_path::path2magic;
use common::snapshot::{LocalSnapshot, LocalSnapshotRecord, RemoteSnapshot};

use super::{now_unix, Database, DatabaseError};

/// What [`Database::complete_upload`] did with the local chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The uploaded snapshot was the head; the local row is gone
    Removed,
    /// A newer capture sits on top; the uploaded snapshot was spliced out of it
    Spliced,
    /// The uploaded snapshot is no longer in the local chain; nothing changed
    Stale,
}

fn decode_local(raw: &str, author: &LocalAuthor) -> Result<LocalSnapshot, DatabaseError> {
    let record: LocalSnapshotRecord = serde_json::from_str(raw)?;
    Ok(LocalSnapshot::from_record(record, author))
}

impl Database {
    /// The current local snapshot for `relpath` by `author`
    pub async fn get_local_snapshot(
        &self,
        relpath: &str,
        author: &LocalAuthor,
    ) -> Result<Option<LocalSnapshot>, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT snapshot
            FROM local_snapshots
            WHERE relpath = ?1 AND author = ?2
            "#,
        )
        .bind(path2magic(relpath))
        .bind(author.public_key().to_hex())
        .fetch_optional(&**self)
        .await?;

        row.map(|r| decode_local(r.get("snapshot"), author))
            .transpose()
    }

    /// Store `snapshot`, replacing whatever was recorded for its path
    pub async fn store_local_snapshot(&self, snapshot: &LocalSnapshot) -> Result<(), DatabaseError> {
        let record = serde_json::to_string(&snapshot.to_record())?;

        sqlx::query(
            r#"
            INSERT INTO local_snapshots (relpath, author, snapshot, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (relpath, author) DO UPDATE
            SET snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(path2magic(&snapshot.name))
        .bind(snapshot.author.public_key().to_hex())
        .bind(record)
        .bind(now_unix())
        .execute(&**self)
        .await?;

        Ok(())
    }

    pub async fn delete_local_snapshot(
        &self,
        relpath: &str,
        author: &LocalAuthor,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            DELETE FROM local_snapshots
            WHERE relpath = ?1 AND author = ?2
            "#,
        )
        .bind(path2magic(relpath))
        .bind(author.public_key().to_hex())
        .execute(&**self)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Encoded (magic) names of every path with a pending local snapshot
    pub async fn list_local_paths(&self) -> Result<BTreeSet<String>, DatabaseError> {
        let rows = sqlx::query("SELECT DISTINCT relpath FROM local_snapshots")
            .fetch_all(&**self)
            .await?;

        Ok(rows.iter().map(|r| r.get::<String, _>("relpath")).collect())
    }

    /// Every pending local snapshot by `author`
    pub async fn list_local_snapshots(
        &self,
        author: &LocalAuthor,
    ) -> Result<Vec<LocalSnapshot>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT snapshot
            FROM local_snapshots
            WHERE author = ?1
            ORDER BY relpath
            "#,
        )
        .bind(author.public_key().to_hex())
        .fetch_all(&**self)
        .await?;

        rows.iter()
            .map(|r| decode_local(r.get("snapshot"), author))
            .collect()
    }

    /// The remote head we know for `relpath`
    pub async fn get_remote_snapshot(
        &self,
        relpath: &str,
    ) -> Result<Option<RemoteSnapshot>, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT snapshot
            FROM remote_snapshots
            WHERE relpath = ?1
            "#,
        )
        .bind(path2magic(relpath))
        .fetch_optional(&**self)
        .await?;

        Ok(row
            .map(|r| serde_json::from_str(r.get("snapshot")))
            .transpose()?)
    }

    pub async fn store_remote_snapshot(&self, snapshot: &RemoteSnapshot) -> Result<(), DatabaseError> {
        let raw = serde_json::to_string(snapshot)?;

        sqlx::query(
            r#"
            INSERT INTO remote_snapshots (relpath, capability, snapshot, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (relpath) DO UPDATE
            SET capability = excluded.capability,
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(path2magic(&snapshot.name))
        .bind(snapshot.capability.as_str())
        .bind(raw)
        .bind(now_unix())
        .execute(&**self)
        .await?;

        Ok(())
    }

    pub async fn list_remote_snapshots(&self) -> Result<Vec<RemoteSnapshot>, DatabaseError> {
        let rows = sqlx::query("SELECT snapshot FROM remote_snapshots ORDER BY relpath")
            .fetch_all(&**self)
            .await?;

        rows.iter()
            .map(|r| serde_json::from_str(r.get("snapshot")).map_err(DatabaseError::from))
            .collect()
    }

    /// Record that the local snapshot `uploaded` is now the commit `remote`
    ///
    /// In one transaction: the remote head for the path becomes `remote`, and
    /// the uploaded snapshot leaves the local chain (the row is deleted when it
    /// was the head, otherwise it is spliced out of the newer head).
    pub async fn complete_upload(
        &self,
        author: &LocalAuthor,
        uploaded: Uuid,
        remote: &RemoteSnapshot,
    ) -> Result<UploadOutcome, DatabaseError> {
        let relpath = path2magic(&remote.name);
        let author_key = author.public_key().to_hex();
        let mut tx = self.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT snapshot
            FROM local_snapshots
            WHERE relpath = ?1 AND author = ?2
            "#,
        )
        .bind(&relpath)
        .bind(&author_key)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(UploadOutcome::Stale);
        };
        let mut head = decode_local(row.get("snapshot"), author)?;

        let outcome = if head.identifier == uploaded {
            sqlx::query("DELETE FROM local_snapshots WHERE relpath = ?1 AND author = ?2")
                .bind(&relpath)
                .bind(&author_key)
                .execute(&mut *tx)
                .await?;
            UploadOutcome::Removed
        } else if head.replace_uploaded(uploaded, &remote.capability) {
            sqlx::query(
                r#"
                UPDATE local_snapshots
                SET snapshot = ?1,
                    updated_at = ?2
                WHERE relpath = ?3 AND author = ?4
                "#,
            )
            .bind(serde_json::to_string(&head.to_record())?)
            .bind(now_unix())
            .bind(&relpath)
            .bind(&author_key)
            .execute(&mut *tx)
            .await?;
            UploadOutcome::Spliced
        } else {
            return Ok(UploadOutcome::Stale);
        };

        sqlx::query(
            r#"
            INSERT INTO remote_snapshots (relpath, capability, snapshot, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (relpath) DO UPDATE
            SET capability = excluded.capability,
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&relpath)
        .bind(remote.capability.as_str())
        .bind(serde_json::to_string(remote)?)
        .bind(now_unix())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use common::crypto::create_local_author;
    use common::grid::Capability;
    use common::snapshot::Metadata;

    use super::*;

    fn local(name: &str, author: &LocalAuthor, parents: Vec<LocalSnapshot>) -> LocalSnapshot {
        LocalSnapshot::new(
            name,
            author.clone(),
            Metadata::new(),
            PathBuf::from("/stash/x"),
            1,
            parents,
            vec![],
        )
    }

    fn remote(name: &str, author: &LocalAuthor, cap: &str) -> RemoteSnapshot {
        RemoteSnapshot {
            name: name.to_string(),
            author: author.to_remote_author(),
            metadata: Metadata::new(),
            capability: Capability::new(cap),
            parents_raw: vec![],
            content_cap: Capability::new("URI:CHK:content"),
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn test_local_snapshot_put_get_replace() {
        let db = Database::in_memory().await.unwrap();
        let alice = create_local_author("alice").unwrap();

        assert!(db.get_local_snapshot("a/b", &alice).await.unwrap().is_none());

        let first = local("a/b", &alice, vec![]);
        db.store_local_snapshot(&first).await.unwrap();
        let second = local("a/b", &alice, vec![first.clone()]);
        db.store_local_snapshot(&second).await.unwrap();

        let stored = db.get_local_snapshot("a/b", &alice).await.unwrap().unwrap();
        assert_eq!(stored, second);
        assert_eq!(stored.parents_local[0].identifier, first.identifier);
        assert_eq!(
            db.list_local_paths().await.unwrap().into_iter().collect::<Vec<_>>(),
            vec!["a@_b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_local_snapshots_are_keyed_by_author() {
        let db = Database::in_memory().await.unwrap();
        let alice = create_local_author("alice").unwrap();
        // same name, different key
        let bob = create_local_author("alice").unwrap();

        db.store_local_snapshot(&local("foo", &alice, vec![])).await.unwrap();
        assert!(db.get_local_snapshot("foo", &bob).await.unwrap().is_none());
        assert!(!db.delete_local_snapshot("foo", &bob).await.unwrap());
        assert!(db.delete_local_snapshot("foo", &alice).await.unwrap());
    }

    #[tokio::test]
    async fn test_complete_upload_of_head_removes_row() {
        let db = Database::in_memory().await.unwrap();
        let alice = create_local_author("alice").unwrap();
        let head = local("foo", &alice, vec![]);
        db.store_local_snapshot(&head).await.unwrap();

        let uploaded = remote("foo", &alice, "URI:DIR2-CHK:1");
        let outcome = db
            .complete_upload(&alice, head.identifier, &uploaded)
            .await
            .unwrap();

        assert_eq!(outcome, UploadOutcome::Removed);
        assert!(db.get_local_snapshot("foo", &alice).await.unwrap().is_none());
        assert_eq!(db.get_remote_snapshot("foo").await.unwrap(), Some(uploaded));
    }

    #[tokio::test]
    async fn test_complete_upload_splices_under_newer_head() {
        let db = Database::in_memory().await.unwrap();
        let alice = create_local_author("alice").unwrap();
        let older = local("foo", &alice, vec![]);
        let newer = local("foo", &alice, vec![older.clone()]);
        db.store_local_snapshot(&newer).await.unwrap();

        let uploaded = remote("foo", &alice, "URI:DIR2-CHK:older");
        let outcome = db
            .complete_upload(&alice, older.identifier, &uploaded)
            .await
            .unwrap();
        assert_eq!(outcome, UploadOutcome::Spliced);

        let head = db.get_local_snapshot("foo", &alice).await.unwrap().unwrap();
        assert_eq!(head.identifier, newer.identifier);
        assert!(head.parents_local.is_empty());
        assert_eq!(head.parents_remote, vec![uploaded.capability.clone()]);

        // the same completion again finds nothing to do
        let again = db
            .complete_upload(&alice, older.identifier, &uploaded)
            .await
            .unwrap();
        assert_eq!(again, UploadOutcome::Stale);
    }
}
