//! Core data models for the photo-sharing service.
//!
//! `bucket` and `object` map to SQLite tables via `sqlx::FromRow`;
//! `listing` holds the transient shapes used while paging through a bucket.

pub mod bucket;
pub mod listing;
pub mod object;
