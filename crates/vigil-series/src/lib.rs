pub mod aggregator;
pub mod backend;
pub mod error;
pub mod graphite;
pub mod model;
pub mod query;
pub mod stats;

pub use aggregator::SeriesAggregator;
pub use backend::{RawSeries, RenderRequest, SeriesBackend};
pub use error::{MetricBackendError, Result};
pub use graphite::{GraphiteBackend, GraphiteConfig};
pub use model::{DataPoint, SeriesData};
pub use query::{SeriesQuery, TargetBuilder, TimeBound, TimeRange};
pub use stats::{stats_queries, StatsGroup, StatsWindow, DEFAULT_STEP_MS};
