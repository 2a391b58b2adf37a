use anyhow::Context;
use chrono::{DateTime, Utc};
use domain::Document;
use serde_json::{Map, Value};
use sqlx::FromRow;

/// Fixed-width RFC 3339 so that text order in SQLite equals time order.
pub fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub fn decode_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid stored timestamp '{}'", raw))?;
    Ok(parsed.with_timezone(&Utc))
}

pub const DOCUMENT_COLUMNS: &str = "id, body, tombstoned_at, created_at, updated_at";

#[derive(FromRow)]
pub struct SqlDocument {
    pub id: String,
    pub body: String,
    pub tombstoned_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<SqlDocument> for Document {
    type Error = anyhow::Error;

    fn try_from(sql: SqlDocument) -> anyhow::Result<Self> {
        let body: Map<String, Value> = serde_json::from_str(&sql.body)
            .with_context(|| format!("document {} has a malformed body", sql.id))?;
        Ok(Document {
            tombstoned_at: sql.tombstoned_at.as_deref().map(decode_ts).transpose()?,
            created_at: decode_ts(&sql.created_at)?,
            updated_at: decode_ts(&sql.updated_at)?,
            id: sql.id,
            body,
        })
    }
}

pub fn into_documents(rows: Vec<SqlDocument>) -> anyhow::Result<Vec<Document>> {
    rows.into_iter().map(Document::try_from).collect()
}
