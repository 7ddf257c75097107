pub mod error;
pub mod metric;
pub mod model;

pub use error::{ModelError, Result};
pub use metric::{Aggregate, Metric, Operator};
pub use model::{Condition, Machine, Rule, RuleSpec, DEFAULT_REMINDER_LIST};
