use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::models::{new_id, now, Comment};

pub const MAX_CONTENT_CHARS: usize = 1000;

fn normalize_content(raw: &str) -> AppResult<String> {
    let content = raw.trim();
    if content.is_empty() {
        return Err(AppError::validation("content must not be empty"));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(AppError::validation(format!(
            "content must be at most {} characters",
            MAX_CONTENT_CHARS
        )));
    }
    Ok(content.to_string())
}

fn require(field: &str, value: String) -> AppResult<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(AppError::validation(format!("{} is required", field)));
    }
    Ok(value)
}

/// Body of a request creating a root comment.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub author_ref: String,
    pub article_ref: String,
    pub article_author_ref: String,
    pub content: String,
}

impl NewComment {
    pub fn into_comment(self) -> AppResult<Comment> {
        let now = now();
        Ok(Comment {
            id: new_id(),
            author_ref: require("authorRef", self.author_ref)?,
            article_ref: require("articleRef", self.article_ref)?,
            article_author_ref: require("articleAuthorRef", self.article_author_ref)?,
            content: normalize_content(&self.content)?,
            reply_ids: Vec::new(),
            reply_to_user_ref: None,
            root_ref: None,
            tombstoned_at: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Body of a request replying inside an existing thread.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReply {
    pub author_ref: String,
    pub article_ref: String,
    pub article_author_ref: String,
    pub content: String,
    pub root_ref: String,
    #[serde(default)]
    pub reply_to_user_ref: Option<String>,
}

impl NewReply {
    pub fn into_comment(self) -> AppResult<Comment> {
        let root_ref = require("rootRef", self.root_ref)?;
        let mut comment = NewComment {
            author_ref: self.author_ref,
            article_ref: self.article_ref,
            article_author_ref: self.article_author_ref,
            content: self.content,
        }
        .into_comment()?;
        comment.root_ref = Some(root_ref);
        comment.reply_to_user_ref = self
            .reply_to_user_ref
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        Ok(comment)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentEdit {
    pub content: String,
}

impl CommentEdit {
    pub fn content(&self) -> AppResult<String> {
        normalize_content(&self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_comment(content: &str) -> NewComment {
        NewComment {
            author_ref: "u1".into(),
            article_ref: "A1".into(),
            article_author_ref: "u2".into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_root_comment_is_trimmed_and_rootless() {
        let comment = new_comment("  hello  ").into_comment().unwrap();
        assert_eq!(comment.content, "hello");
        assert!(comment.is_root());
        assert!(comment.reply_ids.is_empty());
        assert_eq!(comment.created_at, comment.updated_at);
    }

    #[test]
    fn test_content_limits() {
        assert!(matches!(
            new_comment("   ").into_comment(),
            Err(AppError::Validation(_))
        ));
        let long = "é".repeat(MAX_CONTENT_CHARS + 1);
        assert!(matches!(
            new_comment(&long).into_comment(),
            Err(AppError::Validation(_))
        ));
        let exact = "é".repeat(MAX_CONTENT_CHARS);
        assert!(new_comment(&exact).into_comment().is_ok());
    }

    #[test]
    fn test_reply_carries_root_and_target_user() {
        let reply = NewReply {
            author_ref: "u3".into(),
            article_ref: "A1".into(),
            article_author_ref: "u2".into(),
            content: "hi back".into(),
            root_ref: "c1".into(),
            reply_to_user_ref: Some(" ".into()),
        }
        .into_comment()
        .unwrap();
        assert_eq!(reply.root_ref.as_deref(), Some("c1"));
        assert_eq!(reply.reply_to_user_ref, None);
        assert!(!reply.is_root());
    }

    #[test]
    fn test_reply_requires_root_ref() {
        let err = NewReply {
            author_ref: "u3".into(),
            article_ref: "A1".into(),
            article_author_ref: "u2".into(),
            content: "hi".into(),
            root_ref: "".into(),
            reply_to_user_ref: None,
        }
        .into_comment()
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
