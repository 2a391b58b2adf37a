use std::time::Duration;

use anyhow::Context;
use domain::query::{ListQuery, Predicate};
use domain::Document;
use serde::Serialize;
use tracing::warn;

use crate::models::{into_documents, SqlDocument};
use crate::plan::{count_query, page_query};
use crate::Db;

/// How the count side of a listing ended, independent of the page side.
#[derive(Debug)]
pub enum CountOutcome {
    Counted(i64),
    Failed(anyhow::Error),
    TimedOut(Duration),
}

/// What a listing does with a count that did not arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountPolicy {
    /// Report zero and keep the page.
    DegradeToZero,
    /// Fail the listing.
    Propagate,
}

impl CountPolicy {
    pub fn resolve(self, outcome: CountOutcome) -> anyhow::Result<i64> {
        match (self, outcome) {
            (_, CountOutcome::Counted(n)) => Ok(n),
            (CountPolicy::DegradeToZero, CountOutcome::Failed(e)) => {
                warn!("count query failed, reporting 0: {:#}", e);
                Ok(0)
            }
            (CountPolicy::DegradeToZero, CountOutcome::TimedOut(after)) => {
                warn!("count query timed out after {:?}, reporting 0", after);
                Ok(0)
            }
            (CountPolicy::Propagate, CountOutcome::Failed(e)) => Err(e.context("count query failed")),
            (CountPolicy::Propagate, CountOutcome::TimedOut(after)) => {
                Err(anyhow::anyhow!("count query timed out after {:?}", after))
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListPage {
    pub items: Vec<Document>,
    pub count: i64,
}

impl Db {
    /// One page of matching documents, relations expanded.
    pub async fn fetch_page(&self, query: &ListQuery) -> anyhow::Result<Vec<Document>> {
        let rows = page_query(query)
            .build_query_as::<SqlDocument>()
            .fetch_all(&self.pool)
            .await?;
        let mut docs = into_documents(rows)?;
        self.populate(&mut docs, &query.populate).await?;
        Ok(docs)
    }

    pub async fn count(&self, predicate: &Predicate) -> anyhow::Result<i64> {
        let count: i64 = count_query(predicate)
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Runs the page query and the count query side by side, each on its
    /// own handle. The page side failing fails the listing; the count side
    /// is bounded by `count_timeout` and handed to `policy`.
    pub async fn list(
        &self,
        query: &ListQuery,
        policy: CountPolicy,
        count_timeout: Duration,
    ) -> anyhow::Result<ListPage> {
        let page_db = self.clone();
        let count_db = self.clone();
        let predicate = query.counting();

        let page = async move { page_db.fetch_page(query).await };
        let count = async move {
            match tokio::time::timeout(count_timeout, count_db.count(&predicate)).await {
                Ok(Ok(n)) => CountOutcome::Counted(n),
                Ok(Err(e)) => CountOutcome::Failed(e),
                Err(_) => CountOutcome::TimedOut(count_timeout),
            }
        };

        let (items, outcome) = tokio::join!(page, count);
        let items = items.context("page query failed")?;
        let count = policy.resolve(outcome)?;
        Ok(ListPage { items, count })
    }
}
