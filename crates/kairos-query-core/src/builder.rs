//! Fluent assembly of a KairosDB query document.
//!
//! Metrics are opened with [`QueryBuilder::add_metric`]; every per-metric call that follows
//! applies to that metric until the next `add_metric` or [`QueryBuilder::build`] finalizes it.
//!
//! ```
//! use kairos_query_core::{QueryBuilder, TimeBound};
//!
//! let query = QueryBuilder::new()
//!     .start(TimeBound::relative(1, "days"))
//!     .add_metric("cpu")
//!     .max(1, "hours")
//!     .group_by_tags(["host"])
//!     .build()
//!     .unwrap();
//! assert_eq!(query.metrics.len(), 1);
//! ```

use crate::error::ConfigurationError;
use crate::models::{
    AggregatorSpec, Direction, GroupBy, MetricSpec, QueryDocument, Sampling, TagValues, TimeBound,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Malformed input is tolerated and logged.
    #[default]
    Permissive,
    /// The first malformed call is latched and reported by `build`.
    Strict,
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    mode: BuildMode,
    query: QueryDocument,
    metrics: Vec<MetricSpec>,
    current: Option<MetricSpec>,
    error: Option<ConfigurationError>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self::with_mode(BuildMode::Strict)
    }

    pub fn with_mode(mode: BuildMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Finalizes the metric in progress, if any, and opens a new one named `name`.
    pub fn add_metric<N: Into<String>>(&mut self, name: N) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        self.finalize_current();
        self.current = Some(MetricSpec::named(name));
        self
    }

    pub fn add_aggregator<N: Into<String>>(&mut self, name: N, sampling: Sampling) -> &mut Self {
        let aggregator = AggregatorSpec::new(name, sampling);
        if let Some(metric) = self.current_metric("add_aggregator") {
            metric.aggregators.push(aggregator);
        }
        self
    }

    pub fn add_aggregator_unsampled<N: Into<String>>(&mut self, name: N) -> &mut Self {
        self.add_aggregator(name, Sampling::new())
    }

    pub fn max<U: Into<String>>(&mut self, value: i64, unit: U) -> &mut Self {
        self.sampled("max", value, unit)
    }

    pub fn min<U: Into<String>>(&mut self, value: i64, unit: U) -> &mut Self {
        self.sampled("min", value, unit)
    }

    pub fn avg<U: Into<String>>(&mut self, value: i64, unit: U) -> &mut Self {
        self.sampled("avg", value, unit)
    }

    pub fn sum<U: Into<String>>(&mut self, value: i64, unit: U) -> &mut Self {
        self.sampled("sum", value, unit)
    }

    pub fn count<U: Into<String>>(&mut self, value: i64, unit: U) -> &mut Self {
        self.sampled("count", value, unit)
    }

    pub fn group_by_value(&mut self, range_size: i64) -> &mut Self {
        if let Some(metric) = self.current_metric("group_by_value") {
            metric.group_by = Some(GroupBy::Value { range_size });
        }
        self
    }

    pub fn group_by_tags<I, T>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let tags = tags.into_iter().map(Into::into).collect();
        if let Some(metric) = self.current_metric("group_by_tags") {
            metric.group_by = Some(GroupBy::Tag { tags });
        }
        self
    }

    pub fn limit(&mut self, limit: u64) -> &mut Self {
        if let Some(metric) = self.current_metric("limit") {
            metric.limit = Some(limit);
        }
        self
    }

    /// Replaces the tag filter of the metric in progress.
    pub fn tags<I, K, V>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<TagValues>,
    {
        let tags = tags
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if let Some(metric) = self.current_metric("tags") {
            metric.tags = Some(tags);
        }
        self
    }

    pub fn start<B: Into<TimeBound>>(&mut self, bound: B) -> &mut Self {
        self.set_time_limit(Direction::Start, bound.into())
    }

    pub fn end<B: Into<TimeBound>>(&mut self, bound: B) -> &mut Self {
        self.set_time_limit(Direction::End, bound.into())
    }

    /// Amount of time in seconds the server caches the query output.
    pub fn cache(&mut self, seconds: u64) -> &mut Self {
        if self.error.is_none() {
            self.query.cache_time = Some(seconds);
        }
        self
    }

    pub fn time_zone<Z: Into<String>>(&mut self, zone: Z) -> &mut Self {
        if self.error.is_none() {
            self.query.time_zone = Some(zone.into());
        }
        self
    }

    /// Records a failure from outside the builder, such as an unparseable textual bound.
    /// Strict builders latch it; permissive builders log and carry on.
    pub fn reject(&mut self, error: ConfigurationError) -> &mut Self {
        self.fail(error);
        self
    }

    /// Finalizes the metric in progress and returns a snapshot of the document.
    ///
    /// The in-progress slot is cleared, so a second `build` without new calls returns the
    /// same metrics instead of duplicating the last one.
    pub fn build(&mut self) -> Result<QueryDocument, ConfigurationError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        self.finalize_current();
        if self.metrics.is_empty() {
            if self.mode == BuildMode::Strict {
                return Err(ConfigurationError::NoMetrics);
            }
            warn!("building query without any metric");
        }
        self.query.metrics = self.metrics.clone();
        Ok(self.query.clone())
    }

    fn sampled<U: Into<String>>(&mut self, name: &str, value: i64, unit: U) -> &mut Self {
        let aggregator = AggregatorSpec::sampled(name, value, unit);
        if let Some(metric) = self.current_metric("add_aggregator") {
            metric.aggregators.push(aggregator);
        }
        self
    }

    fn set_time_limit(&mut self, direction: Direction, bound: TimeBound) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        self.query.set_bound(direction, bound);
        if self.query.has_conflicting_bounds(direction) {
            warn!(
                direction = direction.as_str(),
                "query has both absolute and relative {} bounds",
                direction.as_str()
            );
        }
        self
    }

    fn current_metric(&mut self, operation: &'static str) -> Option<&mut MetricSpec> {
        if self.error.is_some() {
            return None;
        }
        if self.current.is_none() {
            self.fail(ConfigurationError::NoMetricInProgress { operation });
            if self.mode == BuildMode::Strict {
                return None;
            }
        }
        Some(self.current.get_or_insert_with(MetricSpec::default))
    }

    fn fail(&mut self, error: ConfigurationError) {
        match self.mode {
            BuildMode::Strict => {
                if self.error.is_none() {
                    self.error = Some(error);
                }
            }
            BuildMode::Permissive => warn!("tolerating malformed query: {error}"),
        }
    }

    fn finalize_current(&mut self) {
        if let Some(metric) = self.current.take() {
            debug!(
                metric = metric.name.as_deref().unwrap_or("<unnamed>"),
                aggregators = metric.aggregators.len(),
                "finalized metric"
            );
            self.metrics.push(metric);
        }
    }
}
