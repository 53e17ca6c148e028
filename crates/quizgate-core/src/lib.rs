//! quizgate-core — Assessment and gating core.
//!
//! Pure evaluators for gating, scoring, retention and structure signatures,
//! the data model they share, an in-process event bus, an i18n resolver and
//! the [`service::AssessmentService`] façade that ties them to storage.

pub mod config;
pub mod error;
pub mod events;
pub mod gating;
pub mod i18n;
pub mod memory;
pub mod model;
pub mod retention;
pub mod scoring;
pub mod service;
pub mod signature;
pub mod traits;
