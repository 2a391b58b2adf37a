use std::collections::HashMap;

use domain::query::PopulateNode;
use domain::Document;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;

use crate::Db;

fn referenced_ids(docs: &[Document], field: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for doc in docs {
        match doc.body.get(field) {
            Some(Value::String(id)) => ids.push(id.clone()),
            Some(Value::Array(items)) => {
                ids.extend(items.iter().filter_map(Value::as_str).map(str::to_string))
            }
            _ => {}
        }
    }
    ids.sort();
    ids.dedup();
    ids
}

fn substitute(doc: &mut Document, node: &PopulateNode, resolved: &HashMap<String, Value>) {
    let Some(current) = doc.body.get_mut(&node.field) else {
        return;
    };
    match current {
        Value::Array(items) => {
            // dangling ids (record gone or never written) are skipped
            let expanded = items
                .iter()
                .filter_map(|item| item.as_str().and_then(|id| resolved.get(id)).cloned())
                .collect();
            *current = Value::Array(expanded);
        }
        Value::String(id) => {
            if let Some(value) = resolved.get(id.as_str()) {
                *current = value.clone();
            }
        }
        _ => {}
    }
}

impl Db {
    /// Replaces reference ids in `docs` with the referenced documents,
    /// following nested populate paths depth first.
    pub fn populate<'a>(
        &'a self,
        docs: &'a mut [Document],
        nodes: &'a [PopulateNode],
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        async move {
            for node in nodes {
                let ids = referenced_ids(docs, &node.field);
                if ids.is_empty() {
                    continue;
                }
                let found = self.fetch_by_ids(node.target, &ids).await?;
                let mut targets: Vec<Document> = found.into_values().collect();
                if !node.nested.is_empty() {
                    self.populate(&mut targets, &node.nested).await?;
                }
                let resolved = targets
                    .into_iter()
                    .map(|t| Ok((t.id.clone(), serde_json::to_value(t)?)))
                    .collect::<anyhow::Result<HashMap<_, _>>>()?;
                for doc in docs.iter_mut() {
                    substitute(doc, node, &resolved);
                }
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{insert, memory_db, user};
    use domain::query::parse_populate;
    use domain::Collection;
    use serde_json::json;

    #[tokio::test]
    async fn test_populate_expands_scalars_and_skips_dangling_array_entries() {
        let db = memory_db().await;
        let alice = user(&db, "alice").await;
        let bob = user(&db, "bob").await;
        let reply = insert(
            &db,
            Collection::Comments,
            json!({ "content": "hi back", "authorRef": bob.id }),
        )
        .await;
        let root = insert(
            &db,
            Collection::Comments,
            json!({
                "content": "hello",
                "authorRef": alice.id,
                "replyIds": [reply.id, "gone"],
            }),
        )
        .await;

        let nodes =
            parse_populate(Collection::Comments, "authorRef,replyIds.authorRef").unwrap();
        let mut docs = vec![root];
        db.populate(&mut docs, &nodes).await.unwrap();

        let body = &docs[0].body;
        assert_eq!(body["authorRef"]["username"], "alice");
        let replies = body["replyIds"].as_array().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["content"], "hi back");
        assert_eq!(replies[0]["authorRef"]["username"], "bob");
    }

    #[tokio::test]
    async fn test_unresolved_scalar_keeps_the_raw_id() {
        let db = memory_db().await;
        let article = insert(
            &db,
            Collection::Articles,
            json!({ "title": "t", "user": "nobody" }),
        )
        .await;
        let nodes = parse_populate(Collection::Articles, "user").unwrap();
        let mut docs = vec![article];
        db.populate(&mut docs, &nodes).await.unwrap();
        assert_eq!(docs[0].body["user"], "nobody");
    }
}
