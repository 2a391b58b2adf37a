pub mod comments;
pub mod documents;
pub mod lifecycle;
pub mod listing;
pub mod populate;
