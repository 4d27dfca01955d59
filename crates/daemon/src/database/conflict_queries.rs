use serde::{Deserialize, Serialize};
use sqlx::Row;

use common::crypto::RemoteAuthor;
use common::grid::Capability;
use common::magic_path::{magic2path, path2magic};
use common::snapshot::RemoteSnapshot;

use super::{now_unix, Database, DatabaseError};

/// An incoming commit that could not be applied to a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub relpath: String,
    pub capability: Capability,
    pub author: RemoteAuthor,
    pub recorded_at: i64,
}

fn row_to_conflict(row: &sqlx::sqlite::SqliteRow) -> Result<ConflictRecord, DatabaseError> {
    let author: &str = row.get("author");
    Ok(ConflictRecord {
        relpath: magic2path(row.get("relpath"))?,
        capability: Capability::new(row.get::<String, _>("capability")),
        author: serde_json::from_str(author)?,
        recorded_at: row.get("recorded_at"),
    })
}

impl Database {
    /// Flag `incoming` as conflicting with our history for its path
    ///
    /// Recording the same commit twice keeps the first record.
    pub async fn record_conflict(&self, incoming: &RemoteSnapshot) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO conflicts (relpath, capability, author, recorded_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (relpath, capability) DO NOTHING
            "#,
        )
        .bind(path2magic(&incoming.name))
        .bind(incoming.capability.as_str())
        .bind(serde_json::to_string(&incoming.author)?)
        .bind(now_unix())
        .execute(&**self)
        .await?;

        Ok(())
    }

    /// Conflicts for one path, or for every path
    pub async fn list_conflicts(
        &self,
        relpath: Option<&str>,
    ) -> Result<Vec<ConflictRecord>, DatabaseError> {
        let rows = match relpath {
            Some(relpath) => {
                sqlx::query(
                    r#"
                    SELECT relpath, capability, author, recorded_at
                    FROM conflicts
                    WHERE relpath = ?1
                    ORDER BY recorded_at, capability
                    "#,
                )
                .bind(path2magic(relpath))
                .fetch_all(&**self)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT relpath, capability, author, recorded_at
                    FROM conflicts
                    ORDER BY relpath, recorded_at, capability
                    "#,
                )
                .fetch_all(&**self)
                .await?
            }
        };

        rows.iter().map(row_to_conflict).collect()
    }
}

#[cfg(test)]
mod tests {
    use common::crypto::create_local_author;
    use common::snapshot::Metadata;

    use super::*;

    #[tokio::test]
    async fn test_record_and_list_conflicts() {
        let db = Database::in_memory().await.unwrap();
        let bob = create_local_author("bob").unwrap();
        let incoming = RemoteSnapshot {
            name: "docs/plan.txt".to_string(),
            author: bob.to_remote_author(),
            metadata: Metadata::new(),
            capability: Capability::new("URI:DIR2-CHK:theirs"),
            parents_raw: vec![],
            content_cap: Capability::new("URI:CHK:c"),
            timestamp: 3,
        };

        db.record_conflict(&incoming).await.unwrap();
        db.record_conflict(&incoming).await.unwrap();

        let all = db.list_conflicts(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].relpath, "docs/plan.txt");
        assert_eq!(all[0].capability, incoming.capability);
        assert_eq!(all[0].author, bob.to_remote_author());

        assert_eq!(db.list_conflicts(Some("docs/plan.txt")).await.unwrap(), all);
        assert!(db.list_conflicts(Some("other")).await.unwrap().is_empty());
    }
}
