//! quizgate-storage — Storage adapters.
//!
//! Implements the [`Storage`](quizgate_core::traits::Storage) contract on
//! top of a JSON file, plus a wrapper that injects failures for exercising
//! the retry and degradation paths of the assessment service.

pub mod file;
pub mod flaky;

pub use file::JsonFileStorage;
pub use flaky::{FailureMode, FlakyStorage};
pub use quizgate_core::memory::MemoryStorage;
