//! Batch conversion of stored HTML documents into Markdown.
//!
//! This crate ties together location parsing, the object and row store
//! contracts, content filtering, and Markdown conversion into the per-file
//! [`FileProcessor`] and the status-driven [`BatchRunner`].

pub mod batch;
pub mod decompress;
pub mod object_store;
pub mod paths;
pub mod processor;
pub mod rows;

#[cfg(test)]
mod testing;

pub use batch::{BatchProgress, BatchRunner, BatchSummary, ExitStatus, SilentProgress};
pub use object_store::{FsObjectStore, ObjectStore, ObjectStoreError};
pub use paths::{Location, PathResolver};
pub use processor::{Failure, FailureKind, FileProcessor, Outcome, Stage};
pub use rows::RowStore;
