//! Blocking HTTP client for the traplist service plus an optimistic comment
//! feed that reconciles local edits with server answers.

pub mod api;
pub mod cache;
pub mod error;
pub mod feed;
pub mod models;

pub use api::{ApiClient, Identity};
pub use error::{ClientError, ClientResult, ErrorCode};
pub use feed::CommentFeed;
