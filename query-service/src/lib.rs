#![allow(clippy::missing_docs_in_private_items)]

pub mod answer;
pub mod service;

pub use service::{AnswerGenerator, GroundedAnswer, QueryService};
