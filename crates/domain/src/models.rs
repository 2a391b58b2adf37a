use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Fields that live in dedicated columns rather than in the document body.
pub const COLUMN_FIELDS: [&str; 4] = ["id", "createdAt", "updatedAt", "tombstonedAt"];

pub fn new_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Current time at the microsecond precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Articles,
    Tags,
    Categories,
    Pages,
    Users,
    Comments,
}

/// A reference from one document field to documents of another collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub target: Collection,
    pub many: bool,
}

impl Relation {
    const fn one(target: Collection) -> Self {
        Self {
            target,
            many: false,
        }
    }

    const fn many(target: Collection) -> Self {
        Self { target, many: true }
    }
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Articles,
        Collection::Tags,
        Collection::Categories,
        Collection::Pages,
        Collection::Users,
        Collection::Comments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Articles => "articles",
            Collection::Tags => "tags",
            Collection::Categories => "categories",
            Collection::Pages => "pages",
            Collection::Users => "users",
            Collection::Comments => "comments",
        }
    }

    /// Body fields covered by the `search` parameter.
    pub fn text_fields(&self) -> &'static [&'static str] {
        match self {
            Collection::Articles | Collection::Pages => &["title"],
            Collection::Tags | Collection::Categories => &["name"],
            Collection::Users => &["username"],
            Collection::Comments => &["content"],
        }
    }

    pub fn relation(&self, field: &str) -> Option<Relation> {
        use Collection::*;
        match (self, field) {
            (Articles, "user") => Some(Relation::one(Users)),
            (Articles, "tag") => Some(Relation::one(Tags)),
            (Tags, "category") => Some(Relation::one(Categories)),
            (Comments, "authorRef" | "articleAuthorRef" | "replyToUserRef") => {
                Some(Relation::one(Users))
            }
            (Comments, "articleRef") => Some(Relation::one(Articles)),
            (Comments, "rootRef") => Some(Relation::one(Comments)),
            (Comments, "replyIds") => Some(Relation::many(Comments)),
            _ => None,
        }
    }

    pub fn has_slug(&self) -> bool {
        matches!(
            self,
            Collection::Articles | Collection::Tags | Collection::Pages
        )
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| AppError::NotFound(format!("unknown collection '{}'", s)))
    }
}

/// A stored record: fixed lifecycle columns plus a free-form body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    #[serde(flatten)]
    pub body: Map<String, Value>,
    pub tombstoned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(body: Map<String, Value>) -> Self {
        let now = now();
        Self {
            id: new_id(),
            body,
            tombstoned_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned_at.is_some()
    }

    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.body.get(field).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author_ref: String,
    pub article_ref: String,
    pub article_author_ref: String,
    pub content: String,
    #[serde(default)]
    pub reply_ids: Vec<String>,
    #[serde(default)]
    pub reply_to_user_ref: Option<String>,
    /// `None` marks a root comment.
    #[serde(default)]
    pub root_ref: Option<String>,
    #[serde(default)]
    pub tombstoned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_root(&self) -> bool {
        self.root_ref.is_none()
    }

    pub fn into_document(self) -> Result<Document, serde_json::Error> {
        let mut body = match serde_json::to_value(&self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for column in COLUMN_FIELDS {
            body.remove(column);
        }
        Ok(Document {
            id: self.id,
            body,
            tombstoned_at: self.tombstoned_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<Document> for Comment {
    type Error = serde_json::Error;

    fn try_from(doc: Document) -> Result<Self, Self::Error> {
        serde_json::from_value(serde_json::to_value(doc)?)
    }
}

/// What realtime viewers receive: the comment with its author expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub article_ref: String,
    pub root_ref: Option<String>,
    pub reply_to_user_ref: Option<String>,
    pub reply_ids: Vec<String>,
    pub content: String,
    pub author: Option<Document>,
    pub tombstoned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommentView {
    pub fn new(comment: Comment, author: Option<Document>) -> Self {
        Self {
            id: comment.id,
            article_ref: comment.article_ref,
            root_ref: comment.root_ref,
            reply_to_user_ref: comment.reply_to_user_ref,
            reply_ids: comment.reply_ids,
            content: comment.content,
            author,
            tombstoned_at: comment.tombstoned_at,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
        }
    }
}
