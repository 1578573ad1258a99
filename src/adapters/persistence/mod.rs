//! Persistence Adapters - JSONL-based File Storage
//!
//! Implements the archive port using append-only JSONL files.
//! No database dependency: lightweight and crash-recoverable.

pub mod archive;

pub use archive::JsonlArchive;
