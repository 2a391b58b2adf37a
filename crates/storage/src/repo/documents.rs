use std::collections::HashMap;

use domain::query::PopulateNode;
use domain::{now, Collection, Document};
use sqlx::{QueryBuilder, Sqlite};

use crate::models::{encode_ts, into_documents, SqlDocument, DOCUMENT_COLUMNS};
use crate::Db;

/// Which rows a by-id lookup may return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Active,
    Any,
}

fn push_id_list(qb: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) {
    qb.push(" AND id IN (");
    let mut sep = qb.separated(", ");
    for id in ids {
        sep.push_bind(id.clone());
    }
    sep.push_unseparated(")");
}

impl Db {
    pub async fn insert_document(&self, collection: Collection, doc: &Document) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, tombstoned_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(collection.as_str())
        .bind(&doc.id)
        .bind(serde_json::to_string(&doc.body)?)
        .bind(doc.tombstoned_at.as_ref().map(encode_ts))
        .bind(encode_ts(&doc.created_at))
        .bind(encode_ts(&doc.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_document(
        &self,
        collection: Collection,
        id: &str,
        visibility: Visibility,
    ) -> anyhow::Result<Option<Document>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM documents WHERE collection = ",
            DOCUMENT_COLUMNS
        ));
        qb.push_bind(collection.as_str());
        qb.push(" AND id = ");
        qb.push_bind(id.to_string());
        if visibility == Visibility::Active {
            qb.push(" AND tombstoned_at IS NULL");
        }
        let row = qb
            .build_query_as::<SqlDocument>()
            .fetch_optional(&self.pool)
            .await?;
        row.map(Document::try_from).transpose()
    }

    /// Active document by id with the requested relations expanded.
    pub async fn find_document(
        &self,
        collection: Collection,
        id: &str,
        populate: &[PopulateNode],
    ) -> anyhow::Result<Option<Document>> {
        let Some(doc) = self.get_document(collection, id, Visibility::Active).await? else {
            return Ok(None);
        };
        let mut docs = vec![doc];
        self.populate(&mut docs, populate).await?;
        Ok(docs.pop())
    }

    pub async fn find_by_slug(
        &self,
        collection: Collection,
        slug: &str,
        populate: &[PopulateNode],
    ) -> anyhow::Result<Option<Document>> {
        let row = sqlx::query_as::<_, SqlDocument>(&format!(
            r#"
            SELECT {}
            FROM documents
            WHERE collection = ? AND json_extract(body, '$.slug') = ? AND tombstoned_at IS NULL
            LIMIT 1
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(collection.as_str())
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        let Some(doc) = row.map(Document::try_from).transpose()? else {
            return Ok(None);
        };
        let mut docs = vec![doc];
        self.populate(&mut docs, populate).await?;
        Ok(docs.pop())
    }

    /// Documents of `collection` keyed by id; ids with no record are absent.
    pub async fn fetch_by_ids(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> anyhow::Result<HashMap<String, Document>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM documents WHERE collection = ",
            DOCUMENT_COLUMNS
        ));
        qb.push_bind(collection.as_str());
        push_id_list(&mut qb, ids);
        let rows = qb
            .build_query_as::<SqlDocument>()
            .fetch_all(&self.pool)
            .await?;
        Ok(into_documents(rows)?
            .into_iter()
            .map(|doc| (doc.id.clone(), doc))
            .collect())
    }

    /// Tombstones the active ones among `ids`; returns what changed.
    pub async fn tombstone_documents(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> anyhow::Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ts = encode_ts(&now());
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE documents SET tombstoned_at = ");
        qb.push_bind(ts.clone());
        qb.push(", updated_at = ");
        qb.push_bind(ts);
        qb.push(" WHERE collection = ");
        qb.push_bind(collection.as_str());
        qb.push(" AND tombstoned_at IS NULL");
        push_id_list(&mut qb, ids);
        qb.push(format!(" RETURNING {}", DOCUMENT_COLUMNS));
        let rows = qb
            .build_query_as::<SqlDocument>()
            .fetch_all(&self.pool)
            .await?;
        into_documents(rows)
    }

    /// Clears the tombstone of the tombstoned ones among `ids`.
    pub async fn untombstone_documents(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> anyhow::Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "UPDATE documents SET tombstoned_at = NULL, updated_at = ",
        );
        qb.push_bind(encode_ts(&now()));
        qb.push(" WHERE collection = ");
        qb.push_bind(collection.as_str());
        qb.push(" AND tombstoned_at IS NOT NULL");
        push_id_list(&mut qb, ids);
        qb.push(format!(" RETURNING {}", DOCUMENT_COLUMNS));
        let rows = qb
            .build_query_as::<SqlDocument>()
            .fetch_all(&self.pool)
            .await?;
        into_documents(rows)
    }

    /// Permanently removes `ids`; returns the records as they were.
    pub async fn delete_documents(
        &self,
        collection: Collection,
        ids: &[String],
    ) -> anyhow::Result<Vec<Document>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("DELETE FROM documents WHERE collection = ");
        qb.push_bind(collection.as_str());
        push_id_list(&mut qb, ids);
        qb.push(format!(" RETURNING {}", DOCUMENT_COLUMNS));
        let rows = qb
            .build_query_as::<SqlDocument>()
            .fetch_all(&self.pool)
            .await?;
        into_documents(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert, memory_db};
    use serde_json::json;

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let db = memory_db().await;
        let doc = insert(&db, Collection::Articles, json!({ "title": "Hello", "slug": "hello" })).await;

        let found = db
            .get_document(Collection::Articles, &doc.id, Visibility::Active)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, doc);

        let by_slug = db
            .find_by_slug(Collection::Articles, "hello", &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_slug.id, doc.id);

        // same id under another collection is a different record
        assert!(db
            .get_document(Collection::Pages, &doc.id, Visibility::Any)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_tombstone_is_idempotent_and_hides_from_active_reads() {
        let db = memory_db().await;
        let doc = insert(&db, Collection::Tags, json!({ "name": "rust" })).await;
        let ids = vec![doc.id.clone(), "missing".to_string()];

        let changed = db.tombstone_documents(Collection::Tags, &ids).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert!(changed[0].is_tombstoned());

        let again = db.tombstone_documents(Collection::Tags, &ids).await.unwrap();
        assert!(again.is_empty());

        assert!(db
            .get_document(Collection::Tags, &doc.id, Visibility::Active)
            .await
            .unwrap()
            .is_none());

        let restored = db.untombstone_documents(Collection::Tags, &ids).await.unwrap();
        assert_eq!(restored.len(), 1);
        assert!(!restored[0].is_tombstoned());
    }

    #[tokio::test]
    async fn test_delete_returns_removed_records() {
        let db = memory_db().await;
        let a = insert(&db, Collection::Pages, json!({ "title": "a" })).await;
        let b = insert(&db, Collection::Pages, json!({ "title": "b" })).await;

        let removed = db
            .delete_documents(Collection::Pages, &[a.id.clone()])
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, a.id);

        let left = db
            .fetch_by_ids(Collection::Pages, &[a.id.clone(), b.id.clone()])
            .await
            .unwrap();
        assert_eq!(left.len(), 1);
        assert!(left.contains_key(&b.id));
    }
}
