mod commands;
pub mod criteria;
mod error;
mod events;
mod models;
pub mod query;

pub use commands::{CommentEdit, NewComment, NewReply, MAX_CONTENT_CHARS};
pub use error::{AppError, AppResult};
pub use events::{RoomEvent, RoomEventKind};
pub use models::{
    new_id, now, Collection, Comment, CommentView, Document, Relation, COLUMN_FIELDS,
};
