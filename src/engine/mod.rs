//! Rule evaluation engine: evaluator, result cache, batch driver.

mod batch;
mod cache;
mod evaluate;

pub use batch::{BatchDriver, BatchResult, FileOutcome, PartialResult};
pub use cache::ResultCache;
pub use evaluate::{evaluate, evaluate_until, Evaluation, Violation};
