use anyhow::{Context, Result};
use clap::Parser;
use kairos_query_core::{
    parse_sampling, parse_time_bound, BuildMode, Config, QueryBuilder, TagValues,
};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser, Debug)]
#[command(author, version, about = "kairos-query: KairosDB query document builder")]
struct Args {
    /// Path to config TOML
    #[arg(long)]
    config: Option<PathBuf>,
    /// Named preset from the config to start from
    #[arg(long)]
    preset: Option<String>,
    /// Print the available presets and exit
    #[arg(long)]
    list_presets: bool,
    /// Metric to query; repeat for several metrics
    #[arg(long = "metric")]
    metrics: Vec<String>,
    /// max aggregator sampled over the given window, e.g. 1h
    #[arg(long)]
    max: Option<String>,
    #[arg(long)]
    min: Option<String>,
    #[arg(long)]
    avg: Option<String>,
    #[arg(long)]
    sum: Option<String>,
    #[arg(long)]
    count: Option<String>,
    /// Comma separated tags to group by
    #[arg(long, value_delimiter = ',')]
    group_by_tags: Vec<String>,
    #[arg(long, conflicts_with = "group_by_tags")]
    group_by_value: Option<i64>,
    #[arg(long)]
    limit: Option<u64>,
    /// Tag filter as key=value; repeat a key to match several values
    #[arg(long = "tag", value_parser = parse_tag)]
    tags: Vec<(String, String)>,
    /// Epoch millis, RFC 3339 timestamp or relative duration like 1d
    #[arg(long)]
    start: Option<String>,
    #[arg(long)]
    end: Option<String>,
    /// Server side cache duration
    #[arg(long)]
    cache: Option<humantime::Duration>,
    #[arg(long)]
    time_zone: Option<String>,
    /// Fail on malformed input instead of tolerating it
    #[arg(long)]
    strict: bool,
    #[arg(long)]
    pretty: bool,
}

impl Args {
    fn has_metric_options(&self) -> bool {
        self.max.is_some()
            || self.min.is_some()
            || self.avg.is_some()
            || self.sum.is_some()
            || self.count.is_some()
            || !self.group_by_tags.is_empty()
            || self.group_by_value.is_some()
            || self.limit.is_some()
            || !self.tags.is_empty()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    init_logging(&config)?;

    if args.list_presets {
        let mut names: Vec<&String> = config.presets.keys().collect();
        names.sort();
        for name in names {
            println!("{name}");
        }
        return Ok(());
    }

    let mut builder = config.new_builder();
    if let Some(name) = &args.preset {
        info!("applying preset {name}");
        config.preset(name)?.apply(&mut builder)?;
    }
    apply_query_options(&mut builder, &args);

    if args.metrics.is_empty() {
        if args.has_metric_options() {
            debug!("applying metric options to the last preset metric");
            apply_metric_options(&mut builder, &args)?;
        }
    } else {
        for metric in &args.metrics {
            builder.add_metric(metric.clone());
            apply_metric_options(&mut builder, &args)?;
        }
    }

    let query = builder.build().context("building query")?;
    let json = if args.pretty {
        query.to_json_pretty()
    } else {
        query.to_json()
    }
    .context("serializing query")?;
    println!("{json}");
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if args.strict {
        config.builder.mode = BuildMode::Strict;
    }
    if let Some(zone) = &args.time_zone {
        config.builder.time_zone = Some(zone.clone());
    }
}

fn apply_query_options(builder: &mut QueryBuilder, args: &Args) {
    for (text, is_start) in [(&args.start, true), (&args.end, false)] {
        let Some(text) = text else { continue };
        match parse_time_bound(text) {
            Ok(bound) if is_start => {
                builder.start(bound);
            }
            Ok(bound) => {
                builder.end(bound);
            }
            Err(err) => {
                builder.reject(err);
            }
        }
    }
    if let Some(cache) = args.cache {
        builder.cache(cache.as_secs());
    }
}

fn apply_metric_options(builder: &mut QueryBuilder, args: &Args) -> Result<()> {
    let sampled = [
        ("max", &args.max),
        ("min", &args.min),
        ("avg", &args.avg),
        ("sum", &args.sum),
        ("count", &args.count),
    ];
    for (name, window) in sampled {
        let Some(window) = window else { continue };
        let (value, unit) = parse_sampling(window).with_context(|| format!("--{name}"))?;
        match name {
            "max" => builder.max(value, unit),
            "min" => builder.min(value, unit),
            "avg" => builder.avg(value, unit),
            "sum" => builder.sum(value, unit),
            _ => builder.count(value, unit),
        };
    }
    if !args.group_by_tags.is_empty() {
        builder.group_by_tags(args.group_by_tags.iter().cloned());
    }
    if let Some(range) = args.group_by_value {
        builder.group_by_value(range);
    }
    if let Some(limit) = args.limit {
        builder.limit(limit);
    }
    if !args.tags.is_empty() {
        builder.tags(collect_tags(&args.tags));
    }
    Ok(())
}

fn collect_tags(pairs: &[(String, String)]) -> BTreeMap<String, TagValues> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in pairs {
        grouped.entry(key.clone()).or_default().push(value.clone());
    }
    grouped
        .into_iter()
        .map(|(key, mut values)| {
            let tag = if values.len() == 1 {
                TagValues::One(values.remove(0))
            } else {
                TagValues::Many(values)
            };
            (key, tag)
        })
        .collect()
}

fn parse_tag(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

fn init_logging(config: &Config) -> Result<()> {
    let writer: BoxMakeWriter = if let Some(path) = &config.logging.file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file at {:?}", path))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        static LOG_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
        let _ = LOG_GUARD.set(guard);
        BoxMakeWriter::new(writer)
    } else {
        BoxMakeWriter::new(std::io::stderr)
    };

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.level.clone())
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .with_level(true)
        .with_writer(writer)
        .finish()
        .try_init()
        .ok();
    Ok(())
}
