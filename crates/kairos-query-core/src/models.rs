use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Free-form sampling object attached to an aggregator, usually `{value, unit}`.
pub type Sampling = Map<String, Value>;

/// Tag filter of a metric, keyed by tag name.
pub type TagFilter = BTreeMap<String, TagValues>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_absolute: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_relative: Option<RelativeTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_absolute: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_relative: Option<RelativeTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

impl QueryDocument {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn set_bound(&mut self, direction: Direction, bound: TimeBound) {
        match (direction, bound) {
            (Direction::Start, TimeBound::Absolute(ms)) => self.start_absolute = Some(ms),
            (Direction::Start, TimeBound::Relative(rel)) => self.start_relative = Some(rel),
            (Direction::End, TimeBound::Absolute(ms)) => self.end_absolute = Some(ms),
            (Direction::End, TimeBound::Relative(rel)) => self.end_relative = Some(rel),
        }
    }

    /// True when both an absolute and a relative bound are set for `direction`.
    pub fn has_conflicting_bounds(&self, direction: Direction) -> bool {
        match direction {
            Direction::Start => self.start_absolute.is_some() && self.start_relative.is_some(),
            Direction::End => self.end_absolute.is_some() && self.end_relative.is_some(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregators: Vec<AggregatorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl MetricSpec {
    pub fn named<N: Into<String>>(name: N) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorSpec {
    pub name: String,
    #[serde(default)]
    pub sampling: Sampling,
}

impl AggregatorSpec {
    pub fn new<N: Into<String>>(name: N, sampling: Sampling) -> Self {
        Self {
            name: name.into(),
            sampling,
        }
    }

    /// Aggregator sampled over `value` `unit`s, e.g. `max` over 1 `days`.
    pub fn sampled<N: Into<String>, U: Into<String>>(name: N, value: i64, unit: U) -> Self {
        let mut sampling = Sampling::new();
        sampling.insert("value".into(), Value::from(value));
        sampling.insert("unit".into(), Value::from(unit.into()));
        Self::new(name, sampling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum GroupBy {
    Value { range_size: i64 },
    Tag { tags: Vec<String> },
}

/// One tag value or several alternatives for the same tag key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValues {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for TagValues {
    fn from(value: &str) -> Self {
        TagValues::One(value.to_string())
    }
}

impl From<String> for TagValues {
    fn from(value: String) -> Self {
        TagValues::One(value)
    }
}

impl From<Vec<String>> for TagValues {
    fn from(values: Vec<String>) -> Self {
        TagValues::Many(values)
    }
}

impl From<Vec<&str>> for TagValues {
    fn from(values: Vec<&str>) -> Self {
        TagValues::Many(values.into_iter().map(String::from).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeTime {
    pub value: i64,
    pub unit: String,
}

impl RelativeTime {
    pub fn new<U: Into<String>>(value: i64, unit: U) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }
}

/// Start or end bound of a query. Units of relative bounds are passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeBound {
    /// Epoch milliseconds.
    Absolute(i64),
    Relative(RelativeTime),
}

impl TimeBound {
    pub fn relative<U: Into<String>>(value: i64, unit: U) -> Self {
        TimeBound::Relative(RelativeTime::new(value, unit))
    }
}

impl From<i64> for TimeBound {
    fn from(ms: i64) -> Self {
        TimeBound::Absolute(ms)
    }
}

impl From<RelativeTime> for TimeBound {
    fn from(rel: RelativeTime) -> Self {
        TimeBound::Relative(rel)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Start,
    End,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Start => "start",
            Direction::End => "end",
        }
    }
}
