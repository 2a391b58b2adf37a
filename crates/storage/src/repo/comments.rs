//! Comment threads.
//!
//! A root owns an ordered `replyIds` list; a reply points back through
//! `rootRef`. Every write below touches one record (or one bulk statement),
//! so a cascade that fails halfway is logged and left for a later restore.

use anyhow::Context;
use async_trait::async_trait;
use domain::{now, Collection, Comment, CommentView, Document};
use tracing::{error, info};

use crate::models::{encode_ts, into_documents, SqlDocument, DOCUMENT_COLUMNS};
use crate::repo::documents::Visibility;
use crate::repo::lifecycle::Lifecycle;
use crate::Db;

const COMMENTS: Collection = Collection::Comments;

impl Db {
    pub async fn get_comment(
        &self,
        id: &str,
        visibility: Visibility,
    ) -> anyhow::Result<Option<Comment>> {
        let doc = self.get_document(COMMENTS, id, visibility).await?;
        Ok(doc.map(Comment::try_from).transpose()?)
    }

    pub async fn insert_comment(&self, comment: &Comment) -> anyhow::Result<()> {
        let doc = comment.clone().into_document()?;
        self.insert_document(COMMENTS, &doc).await
    }

    /// Attaches the reply to its root, then persists it. A failure between
    /// the two leaves a dangling id in `replyIds`, which reads skip.
    pub async fn insert_reply(&self, reply: &Comment) -> anyhow::Result<()> {
        let root_id = reply
            .root_ref
            .as_deref()
            .context("reply has no rootRef")?;
        self.attach_reply(root_id, &reply.id).await?;
        if let Err(e) = self.insert_comment(reply).await {
            error!(
                reply_id = %reply.id,
                root_id = %root_id,
                "Reply attached to root but not persisted: {:#}", e
            );
            return Err(e);
        }
        Ok(())
    }

    pub async fn update_comment_content(
        &self,
        id: &str,
        content: &str,
    ) -> anyhow::Result<Option<Comment>> {
        let row = sqlx::query_as::<_, SqlDocument>(&format!(
            r#"
            UPDATE documents
            SET body = json_set(body, '$.content', ?), updated_at = ?
            WHERE collection = ? AND id = ? AND tombstoned_at IS NULL
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(content)
        .bind(encode_ts(&now()))
        .bind(COMMENTS.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Comment::try_from(Document::try_from(row)?)?)),
            None => Ok(None),
        }
    }

    /// Appends `reply_id` to the root's `replyIds` unless already present.
    /// Returns whether the list changed.
    pub async fn attach_reply(&self, root_id: &str, reply_id: &str) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET body = json_insert(
                    CASE WHEN json_type(body, '$.replyIds') = 'array'
                         THEN body
                         ELSE json_set(body, '$.replyIds', json('[]'))
                    END,
                    '$.replyIds[#]', ?),
                updated_at = ?
            WHERE collection = ? AND id = ?
              AND NOT EXISTS (
                  SELECT 1 FROM json_each(documents.body, '$.replyIds') AS je
                  WHERE je.value = ?
              )
            "#,
        )
        .bind(reply_id)
        .bind(encode_ts(&now()))
        .bind(COMMENTS.as_str())
        .bind(root_id)
        .bind(reply_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Removes every occurrence of `reply_id` from the root's `replyIds`.
    /// Returns how many entries went away; absent ids are not an error.
    pub async fn detach_reply(&self, root_id: &str, reply_id: &str) -> anyhow::Result<u64> {
        let mut removed = 0;
        loop {
            let result = sqlx::query(
                r#"
                UPDATE documents
                SET body = json_remove(body, (
                        SELECT je.fullkey FROM json_each(documents.body, '$.replyIds') AS je
                        WHERE je.value = ?
                        LIMIT 1
                    )),
                    updated_at = ?
                WHERE collection = ? AND id = ?
                  AND EXISTS (
                      SELECT 1 FROM json_each(documents.body, '$.replyIds') AS je
                      WHERE je.value = ?
                  )
                "#,
            )
            .bind(reply_id)
            .bind(encode_ts(&now()))
            .bind(COMMENTS.as_str())
            .bind(root_id)
            .bind(reply_id)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                return Ok(removed);
            }
            removed += 1;
        }
    }

    /// Tombstones every active comment whose `rootRef` is `root_id`,
    /// whether or not the root still lists it.
    pub async fn tombstone_thread_replies(&self, root_id: &str) -> anyhow::Result<Vec<Document>> {
        let ts = encode_ts(&now());
        let rows = sqlx::query_as::<_, SqlDocument>(&format!(
            r#"
            UPDATE documents
            SET tombstoned_at = ?, updated_at = ?
            WHERE collection = ? AND tombstoned_at IS NULL
              AND json_extract(body, '$.rootRef') = ?
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(&ts)
        .bind(&ts)
        .bind(COMMENTS.as_str())
        .bind(root_id)
        .fetch_all(&self.pool)
        .await?;
        into_documents(rows)
    }

    /// Rebuilds the root's `replyIds` from the active comments pointing at
    /// it, in creation order. The previous list is discarded.
    pub async fn recompute_reply_ids(&self, root_id: &str) -> anyhow::Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT id FROM documents
            WHERE collection = ? AND tombstoned_at IS NULL
              AND json_extract(body, '$.rootRef') = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(COMMENTS.as_str())
        .bind(root_id)
        .fetch_all(&self.pool)
        .await?;

        sqlx::query(
            r#"
            UPDATE documents
            SET body = json_set(body, '$.replyIds', json(?)), updated_at = ?
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(serde_json::to_string(&ids)?)
        .bind(encode_ts(&now()))
        .bind(COMMENTS.as_str())
        .bind(root_id)
        .execute(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Permanently removes every comment whose `rootRef` is `root_id`.
    pub async fn delete_thread_replies(&self, root_id: &str) -> anyhow::Result<Vec<Document>> {
        let rows = sqlx::query_as::<_, SqlDocument>(&format!(
            r#"
            DELETE FROM documents
            WHERE collection = ? AND json_extract(body, '$.rootRef') = ?
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(COMMENTS.as_str())
        .bind(root_id)
        .fetch_all(&self.pool)
        .await?;
        into_documents(rows)
    }

    /// Public shape of a comment: author expanded when the user exists.
    pub async fn comment_view(&self, comment: Comment) -> anyhow::Result<CommentView> {
        let author = self
            .get_document(Collection::Users, &comment.author_ref, Visibility::Any)
            .await?;
        Ok(CommentView::new(comment, author))
    }
}

fn cascade_failed(stage: &str, comment: &Comment, e: anyhow::Error) -> anyhow::Error {
    error!(
        comment_id = %comment.id,
        root_id = ?comment.root_ref,
        stage,
        "Cascade incomplete, thread left partially updated: {:#}", e
    );
    e.context(format!("{} cascade for comment {} incomplete", stage, comment.id))
}

/// Lifecycle for comments: applies each change to the target, then
/// carries it across the thread.
pub struct CommentLifecycle {
    db: Db,
}

impl CommentLifecycle {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    async fn soft_delete_one(&self, id: &str) -> anyhow::Result<Option<Document>> {
        let Some(doc) = self
            .db
            .tombstone_documents(COMMENTS, &[id.to_string()])
            .await?
            .pop()
        else {
            return Ok(None);
        };
        let comment = Comment::try_from(doc.clone())?;

        let cascade = match comment.root_ref.as_deref() {
            Some(root_id) => self.db.detach_reply(root_id, &comment.id).await.map(|_| ()),
            None => self
                .db
                .tombstone_thread_replies(&comment.id)
                .await
                .map(|replies| {
                    info!("Root {} tombstoned with {} replies", comment.id, replies.len())
                }),
        };
        cascade.map_err(|e| cascade_failed("soft-delete", &comment, e))?;
        Ok(Some(doc))
    }

    async fn restore_one(&self, id: &str) -> anyhow::Result<Option<Document>> {
        let Some(doc) = self
            .db
            .untombstone_documents(COMMENTS, &[id.to_string()])
            .await?
            .pop()
        else {
            return Ok(None);
        };
        let comment = Comment::try_from(doc.clone())?;

        match comment.root_ref.as_deref() {
            Some(root_id) => {
                self.db
                    .attach_reply(root_id, &comment.id)
                    .await
                    .map_err(|e| cascade_failed("restore", &comment, e))?;
                Ok(Some(doc))
            }
            None => {
                self.db
                    .recompute_reply_ids(&comment.id)
                    .await
                    .map_err(|e| cascade_failed("restore", &comment, e))?;
                self.db
                    .get_document(COMMENTS, &comment.id, Visibility::Any)
                    .await
            }
        }
    }

    async fn hard_destroy_one(&self, id: &str) -> anyhow::Result<Option<Document>> {
        let Some(doc) = self.db.get_document(COMMENTS, id, Visibility::Any).await? else {
            return Ok(None);
        };
        let comment = Comment::try_from(doc)?;

        let cascade = match comment.root_ref.as_deref() {
            Some(root_id) => self.db.detach_reply(root_id, &comment.id).await.map(|_| ()),
            None => self
                .db
                .delete_thread_replies(&comment.id)
                .await
                .map(|replies| {
                    info!("Root {} destroys {} replies", comment.id, replies.len())
                }),
        };
        cascade.map_err(|e| cascade_failed("hard-destroy", &comment, e))?;

        let removed = self
            .db
            .delete_documents(COMMENTS, &[comment.id.clone()])
            .await
            .map_err(|e| cascade_failed("hard-destroy", &comment, e))?;
        Ok(removed.into_iter().next())
    }
}

#[async_trait]
impl Lifecycle for CommentLifecycle {
    fn collection(&self) -> Collection {
        COMMENTS
    }

    async fn soft_delete(&self, ids: &[String]) -> anyhow::Result<Vec<Document>> {
        let mut changed = Vec::new();
        for id in ids {
            changed.extend(self.soft_delete_one(id).await?);
        }
        Ok(changed)
    }

    async fn restore(&self, ids: &[String]) -> anyhow::Result<Vec<Document>> {
        let mut changed = Vec::new();
        for id in ids {
            changed.extend(self.restore_one(id).await?);
        }
        Ok(changed)
    }

    async fn hard_destroy(&self, ids: &[String]) -> anyhow::Result<Vec<Document>> {
        let mut removed = Vec::new();
        for id in ids {
            removed.extend(self.hard_destroy_one(id).await?);
        }
        Ok(removed)
    }
}
