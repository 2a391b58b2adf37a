pub mod admin;
pub mod comments;
pub mod documents;
pub mod sse;
