use kairos_query_core::{
    ConfigurationError, GroupBy, MetricSpec, QueryBuilder, RelativeTime, TagValues, TimeBound,
};
use serde_json::json;

#[test]
fn add_metric_sets_only_name() {
    let query = QueryBuilder::new().add_metric("network_in").build().unwrap();
    assert_eq!(query.metrics, vec![MetricSpec::named("network_in")]);
    let value = serde_json::to_value(&query).unwrap();
    assert_eq!(value, json!({ "metrics": [{ "name": "network_in" }] }));
}

#[test]
fn empty_metric_name_is_accepted() {
    let query = QueryBuilder::new().add_metric("").build().unwrap();
    assert_eq!(query.metrics[0].name.as_deref(), Some(""));
}

#[test]
fn metrics_keep_call_order() {
    let query = QueryBuilder::new()
        .add_metric("network_in")
        .add_metric("network_out")
        .add_metric("disk")
        .build()
        .unwrap();
    let names: Vec<_> = query
        .metrics
        .iter()
        .map(|m| m.name.as_deref().unwrap())
        .collect();
    assert_eq!(names, ["network_in", "network_out", "disk"]);
}

#[test]
fn sampled_aggregators_render_value_and_unit() {
    let query = QueryBuilder::new()
        .add_metric("cpu")
        .max(1, "days")
        .min(2, "hours")
        .avg(30, "minutes")
        .build()
        .unwrap();
    let value = serde_json::to_value(&query.metrics[0].aggregators).unwrap();
    assert_eq!(
        value,
        json!([
            { "name": "max", "sampling": { "value": 1, "unit": "days" } },
            { "name": "min", "sampling": { "value": 2, "unit": "hours" } },
            { "name": "avg", "sampling": { "value": 30, "unit": "minutes" } },
        ])
    );
}

#[test]
fn custom_sampling_passes_through() {
    let sampling = json!({ "value": 2, "unit": "days", "time_zone": "UTC" });
    let sampling = sampling.as_object().unwrap().clone();
    let query = QueryBuilder::new()
        .add_metric("cpu")
        .add_aggregator("percentile", sampling.clone())
        .add_aggregator_unsampled("diff")
        .build()
        .unwrap();
    let aggs = &query.metrics[0].aggregators;
    assert_eq!(aggs[0].sampling, sampling);
    assert_eq!(aggs[1].name, "diff");
    assert!(aggs[1].sampling.is_empty());
}

#[test]
fn group_by_renders_with_name_discriminator() {
    let query = QueryBuilder::new()
        .add_metric("a")
        .group_by_value(1000)
        .add_metric("b")
        .group_by_tags(["host", "dc", "host"])
        .build()
        .unwrap();
    let value = serde_json::to_value(&query).unwrap();
    assert_eq!(
        value["metrics"][0]["group_by"],
        json!({ "name": "value", "range_size": 1000 })
    );
    assert_eq!(
        value["metrics"][1]["group_by"],
        json!({ "name": "tag", "tags": ["host", "dc", "host"] })
    );
}

#[test]
fn group_by_last_write_wins() {
    let query = QueryBuilder::new()
        .add_metric("a")
        .group_by_tags(["host"])
        .group_by_value(10)
        .build()
        .unwrap();
    assert_eq!(
        query.metrics[0].group_by,
        Some(GroupBy::Value { range_size: 10 })
    );
}

#[test]
fn cpu_scenario_populates_every_field() {
    let query = QueryBuilder::new()
        .add_metric("cpu")
        .max(1, "days")
        .group_by_tags(["host"])
        .limit(100)
        .tags([("host", "a")])
        .build()
        .unwrap();
    assert_eq!(query.metrics.len(), 1);
    let value = serde_json::to_value(&query.metrics[0]).unwrap();
    assert_eq!(
        value,
        json!({
            "name": "cpu",
            "tags": { "host": "a" },
            "aggregators": [{ "name": "max", "sampling": { "value": 1, "unit": "days" } }],
            "group_by": { "name": "tag", "tags": ["host"] },
            "limit": 100,
        })
    );
}

#[test]
fn tags_replace_previous_filter() {
    let query = QueryBuilder::new()
        .add_metric("cpu")
        .tags([("host", "a")])
        .tags([("dc", vec!["eu", "us"])])
        .build()
        .unwrap();
    let tags = query.metrics[0].tags.as_ref().unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(
        tags["dc"],
        TagValues::Many(vec!["eu".to_string(), "us".to_string()])
    );
}

#[test]
fn relative_and_absolute_bounds() {
    let query = QueryBuilder::new()
        .start(TimeBound::relative(1, "days"))
        .end(1_609_459_200_000i64)
        .build()
        .unwrap();
    let value = serde_json::to_value(&query).unwrap();
    assert_eq!(value["start_relative"], json!({ "value": 1, "unit": "days" }));
    assert!(value.get("start_absolute").is_none());
    assert_eq!(value["end_absolute"], json!(1_609_459_200_000i64));
    assert!(value.get("end_relative").is_none());

    let query = QueryBuilder::new()
        .start(TimeBound::Absolute(1_609_459_200_000))
        .end(RelativeTime::new(5, "minutes"))
        .build()
        .unwrap();
    assert_eq!(query.start_absolute, Some(1_609_459_200_000));
    assert!(query.start_relative.is_none());
    assert_eq!(query.end_relative, Some(RelativeTime::new(5, "minutes")));
    assert!(query.end_absolute.is_none());
}

#[test]
fn both_bound_shapes_coexist_for_one_direction() {
    let query = QueryBuilder::new()
        .start(TimeBound::relative(1, "days"))
        .start(TimeBound::Absolute(1_609_459_200_000))
        .build()
        .unwrap();
    assert!(query.start_relative.is_some());
    assert!(query.start_absolute.is_some());
}

#[test]
fn cache_and_time_zone_are_query_level() {
    let query = QueryBuilder::new()
        .cache(3600)
        .time_zone("Europe/Paris")
        .build()
        .unwrap();
    assert_eq!(query.cache_time, Some(3600));
    let value = serde_json::to_value(&query).unwrap();
    assert_eq!(value["time_zone"], "Europe/Paris");
    assert_eq!(value["metrics"], json!([]));
}

#[test]
fn permissive_builder_creates_nameless_metric() {
    let query = QueryBuilder::new().max(1, "days").limit(3).build().unwrap();
    assert_eq!(query.metrics.len(), 1);
    assert!(query.metrics[0].name.is_none());
    assert_eq!(query.metrics[0].limit, Some(3));
    let value = serde_json::to_value(&query.metrics[0]).unwrap();
    assert!(value.get("name").is_none());
}

#[test]
fn repeated_build_does_not_duplicate_last_metric() {
    let mut builder = QueryBuilder::new();
    builder.add_metric("a").add_metric("b");
    let first = builder.build().unwrap();
    let second = builder.build().unwrap();
    assert_eq!(first.metrics.len(), 2);
    assert_eq!(first, second);

    builder.add_metric("c");
    let third = builder.build().unwrap();
    assert_eq!(third.metrics.len(), 3);
}

#[test]
fn strict_builder_rejects_orphan_metric_options() {
    let err = QueryBuilder::strict()
        .group_by_tags(["host"])
        .add_metric("cpu")
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::NoMetricInProgress {
            operation: "group_by_tags"
        }
    );
}

#[test]
fn strict_builder_requires_a_metric() {
    let err = QueryBuilder::strict().cache(60).build().unwrap_err();
    assert_eq!(err, ConfigurationError::NoMetrics);
}

#[test]
fn strict_builder_latches_rejected_bounds() {
    let bad = "yesterday-ish".parse::<TimeBound>().unwrap_err();
    let err = QueryBuilder::strict()
        .reject(bad.clone())
        .add_metric("cpu")
        .build()
        .unwrap_err();
    assert_eq!(err, bad);

    let query = QueryBuilder::new()
        .reject(bad)
        .add_metric("cpu")
        .build()
        .unwrap();
    assert_eq!(query.metrics.len(), 1);
}

#[test]
fn strict_builder_accepts_well_formed_chain() {
    let query = QueryBuilder::strict()
        .start(TimeBound::relative(2, "weeks"))
        .add_metric("cpu")
        .sum(1, "hours")
        .count(1, "hours")
        .build()
        .unwrap();
    let names: Vec<_> = query.metrics[0]
        .aggregators
        .iter()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(names, ["sum", "count"]);
}

#[test]
fn document_deserializes_from_wire_shape() {
    let raw = r#"{
        "start_relative": { "value": 1, "unit": "hours" },
        "metrics": [{ "name": "cpu", "tags": { "host": ["a", "b"] }, "limit": 5 }]
    }"#;
    let query: kairos_query_core::QueryDocument = serde_json::from_str(raw).unwrap();
    assert_eq!(query.start_relative, Some(RelativeTime::new(1, "hours")));
    assert_eq!(query.metrics[0].limit, Some(5));
    assert_eq!(
        query.metrics[0].tags.as_ref().unwrap()["host"],
        TagValues::from(vec!["a", "b"])
    );
}
