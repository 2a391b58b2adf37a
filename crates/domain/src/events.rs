use crate::models::CommentView;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RoomEventKind {
    CommentCreated,
    ReplyCreated,
    CommentUpdated,
    CommentDeleted,
}

impl RoomEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomEventKind::CommentCreated => "commentCreated",
            RoomEventKind::ReplyCreated => "replyCreated",
            RoomEventKind::CommentUpdated => "commentUpdated",
            RoomEventKind::CommentDeleted => "commentDeleted",
        }
    }
}

/// A lifecycle change of one comment, addressed to the room of its article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEvent {
    pub kind: RoomEventKind,
    pub room: String,
    pub comment: CommentView,
}

impl RoomEvent {
    pub fn new(kind: RoomEventKind, comment: CommentView) -> Self {
        Self {
            kind,
            room: comment.article_ref.clone(),
            comment,
        }
    }
}
