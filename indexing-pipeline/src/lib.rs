#![allow(clippy::missing_docs_in_private_items)]

pub mod content;
pub mod pipeline;

pub use content::{ContentAccess, ObjectStoreContent, StaticContent};
pub use pipeline::{FailedDocument, IndexOutcome, IndexingPipeline};
