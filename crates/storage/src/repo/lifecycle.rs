use async_trait::async_trait;
use domain::{Collection, Document};
use tracing::info;

use crate::repo::comments::CommentLifecycle;
use crate::Db;

/// Soft-delete, restore and hard-destroy for one collection.
///
/// Every operation takes an already-authorized set of ids, skips ids that
/// match nothing or are already in the requested state, and returns the
/// records it acted on. Only a storage failure makes it fail.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    fn collection(&self) -> Collection;

    async fn soft_delete(&self, ids: &[String]) -> anyhow::Result<Vec<Document>>;

    async fn restore(&self, ids: &[String]) -> anyhow::Result<Vec<Document>>;

    /// Returns the removed records as they were before removal.
    async fn hard_destroy(&self, ids: &[String]) -> anyhow::Result<Vec<Document>>;
}

/// Collections with no cascade: a single bulk statement per operation.
pub struct DocumentLifecycle {
    db: Db,
    collection: Collection,
}

impl DocumentLifecycle {
    pub fn new(db: Db, collection: Collection) -> Self {
        Self { db, collection }
    }
}

#[async_trait]
impl Lifecycle for DocumentLifecycle {
    fn collection(&self) -> Collection {
        self.collection
    }

    async fn soft_delete(&self, ids: &[String]) -> anyhow::Result<Vec<Document>> {
        let changed = self.db.tombstone_documents(self.collection, ids).await?;
        info!(
            "Tombstoned {}/{} {}",
            changed.len(),
            ids.len(),
            self.collection
        );
        Ok(changed)
    }

    async fn restore(&self, ids: &[String]) -> anyhow::Result<Vec<Document>> {
        let changed = self.db.untombstone_documents(self.collection, ids).await?;
        info!("Restored {}/{} {}", changed.len(), ids.len(), self.collection);
        Ok(changed)
    }

    async fn hard_destroy(&self, ids: &[String]) -> anyhow::Result<Vec<Document>> {
        let removed = self.db.delete_documents(self.collection, ids).await?;
        info!("Destroyed {}/{} {}", removed.len(), ids.len(), self.collection);
        Ok(removed)
    }
}

pub fn lifecycle_for(db: &Db, collection: Collection) -> Box<dyn Lifecycle> {
    match collection {
        Collection::Comments => Box::new(CommentLifecycle::new(db.clone())),
        other => Box::new(DocumentLifecycle::new(db.clone(), other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::documents::Visibility;
    use crate::testing::{insert, memory_db};
    use serde_json::json;

    #[tokio::test]
    async fn test_bulk_operations_ignore_unknown_ids() {
        let db = memory_db().await;
        let a = insert(&db, Collection::Categories, json!({ "name": "a" })).await;
        let b = insert(&db, Collection::Categories, json!({ "name": "b" })).await;
        let lifecycle = lifecycle_for(&db, Collection::Categories);
        assert_eq!(lifecycle.collection(), Collection::Categories);

        let ids = vec![a.id.clone(), b.id.clone(), "nope".to_string()];
        let deleted = lifecycle.soft_delete(&ids).await.unwrap();
        assert_eq!(deleted.len(), 2);

        let restored = lifecycle.restore(&[a.id.clone()]).await.unwrap();
        assert_eq!(restored.len(), 1);
        assert!(lifecycle.restore(&[a.id.clone()]).await.unwrap().is_empty());

        let destroyed = lifecycle.hard_destroy(&ids).await.unwrap();
        assert_eq!(destroyed.len(), 2);
        assert!(db
            .get_document(Collection::Categories, &b.id, Visibility::Any)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_empty_batches_touch_nothing() {
        let db = memory_db().await;
        let lifecycle = lifecycle_for(&db, Collection::Users);
        assert!(lifecycle.soft_delete(&[]).await.unwrap().is_empty());
        assert!(lifecycle.restore(&[]).await.unwrap().is_empty());
        assert!(lifecycle.hard_destroy(&[]).await.unwrap().is_empty());
    }
}
