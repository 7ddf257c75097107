pub mod compute;
pub mod error;
pub mod evaluator;
pub mod runner;


pub use compute::{compute, Evaluation};
pub use error::{AlertError, Result};
pub use evaluator::{AlertEvaluator, EvaluatorSettings, MachineReport};
pub use runner::{AlertRunner, CycleReport, RunnerHandle, RunnerSettings};
