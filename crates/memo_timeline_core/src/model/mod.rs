//! Memo domain model shared by codec, timeline and services.
//!
//! # Responsibility
//! - Define the memo, per-record log and timeline projection types.
//! - Keep display/filter parameters as plain value types.
//!
//! # Invariants
//! - A memo id is unique only inside its owning record's log.
//! - The global key of a timeline entry is `(record_id, memo.id)`.

pub mod memo;
pub mod timeline;
