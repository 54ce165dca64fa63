pub mod builder;
pub mod config;
pub mod error;
pub mod models;
pub mod timeutils;

pub use builder::{BuildMode, QueryBuilder};
pub use config::{BuilderConfig, Config, LoggingConfig, Preset, PresetAggregator, PresetMetric};
pub use error::ConfigurationError;
pub use models::{
    AggregatorSpec, Direction, GroupBy, MetricSpec, QueryDocument, RelativeTime, Sampling,
    TagFilter, TagValues, TimeBound,
};
pub use timeutils::{epoch_millis, now_millis, parse_sampling, parse_time_bound};
