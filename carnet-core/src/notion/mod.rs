//! Remote source adapter for the Notion workout log.

pub mod client;
pub mod parse;
pub mod properties;

pub use client::{
    Backoff, DatabaseInfo, MockNotion, NotionError, NotionInterface, Page, PageCursor,
    QueryResponse, RetryPolicy, Sort,
};
pub use parse::{ParseError, muscle_group_ids, parse_datetime, workout_set_ids};
pub use properties::PropertyBag;
