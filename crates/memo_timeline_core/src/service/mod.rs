//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store, codec and cache calls into memo use-cases.
//! - Keep CLI/host layers decoupled from storage and cache details.
//!
//! # See also
//! - `timeline::cache` for how mutations reach readers.

pub mod engine;
pub mod memo_service;
pub mod timeline_service;
