use crate::builder::{BuildMode, QueryBuilder};
use crate::models::{Sampling, TagValues};
use crate::timeutils::{parse_sampling, parse_time_bound};
use anyhow::{Context, Result};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub builder: BuilderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "Preset::default_presets")]
    pub presets: HashMap<String, Preset>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            builder: BuilderConfig::default(),
            logging: LoggingConfig::default(),
            presets: Preset::default_presets(),
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "kairos-query", "kairos-query")
            .context("cannot locate config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(PathBuf::from).unwrap_or_else(|| {
            Config::default_path().unwrap_or_else(|_| PathBuf::from("./config.toml"))
        });
        let mut cfg = if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("reading config at {:?}", path))?;
            Config::parse(&content)?
        } else {
            Config::default()
        };
        cfg.expand_paths();
        Ok(cfg)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("parsing config")
    }

    pub fn expand_paths(&mut self) {
        if let Some(file) = &self.logging.file {
            self.logging.file = Some(expand_tilde(file));
        }
    }

    /// A builder configured with the mode and query-level defaults of this config.
    pub fn new_builder(&self) -> QueryBuilder {
        let mut builder = QueryBuilder::with_mode(self.builder.mode);
        if let Some(cache) = self.builder.default_cache {
            builder.cache(cache.as_secs());
        }
        if let Some(zone) = &self.builder.time_zone {
            builder.time_zone(zone.clone());
        }
        builder
    }

    pub fn preset(&self, name: &str) -> Result<&Preset> {
        self.presets
            .get(name)
            .with_context(|| format!("unknown preset {name:?}"))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuilderConfig {
    #[serde(default)]
    pub mode: BuildMode,
    #[serde(default, with = "humantime_serde")]
    pub default_cache: Option<Duration>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "warn".into()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub cache: Option<Duration>,
    #[serde(default)]
    pub metrics: Vec<PresetMetric>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetMetric {
    pub name: String,
    #[serde(default)]
    pub aggregators: Vec<PresetAggregator>,
    #[serde(default)]
    pub group_by_tags: Option<Vec<String>>,
    #[serde(default)]
    pub group_by_value: Option<i64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub tags: BTreeMap<String, TagValues>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetAggregator {
    pub name: String,
    /// Window such as `"1h"`; the aggregator is unsampled when absent.
    #[serde(default)]
    pub sampling: Option<String>,
}

impl Preset {
    pub fn default_presets() -> HashMap<String, Preset> {
        let mut map = HashMap::new();
        map.insert(
            "cpu_day".into(),
            Preset {
                start: Some("1d".into()),
                end: None,
                cache: None,
                metrics: vec![PresetMetric {
                    name: "cpu".into(),
                    aggregators: vec![PresetAggregator {
                        name: "avg".into(),
                        sampling: Some("1h".into()),
                    }],
                    group_by_tags: Some(vec!["host".into()]),
                    ..PresetMetric::default()
                }],
            },
        );
        map.insert(
            "network_week".into(),
            Preset {
                start: Some("1w".into()),
                end: None,
                cache: Some(Duration::from_secs(3600)),
                metrics: ["network_in", "network_out"]
                    .into_iter()
                    .map(|name| PresetMetric {
                        name: name.into(),
                        aggregators: vec![PresetAggregator {
                            name: "max".into(),
                            sampling: Some("1d".into()),
                        }],
                        ..PresetMetric::default()
                    })
                    .collect(),
            },
        );
        map
    }

    /// Replays this preset onto `builder`, metric by metric.
    pub fn apply(&self, builder: &mut QueryBuilder) -> Result<()> {
        if let Some(start) = &self.start {
            builder.start(parse_time_bound(start).context("preset start")?);
        }
        if let Some(end) = &self.end {
            builder.end(parse_time_bound(end).context("preset end")?);
        }
        if let Some(cache) = self.cache {
            builder.cache(cache.as_secs());
        }
        for metric in &self.metrics {
            metric.apply(builder)?;
        }
        Ok(())
    }
}

impl PresetMetric {
    fn apply(&self, builder: &mut QueryBuilder) -> Result<()> {
        builder.add_metric(self.name.clone());
        for agg in &self.aggregators {
            match &agg.sampling {
                Some(window) => {
                    let (value, unit) = parse_sampling(window)
                        .with_context(|| format!("aggregator {} of {}", agg.name, self.name))?;
                    let mut sampling = Sampling::new();
                    sampling.insert("value".into(), value.into());
                    sampling.insert("unit".into(), unit.into());
                    builder.add_aggregator(agg.name.clone(), sampling);
                }
                None => {
                    builder.add_aggregator_unsampled(agg.name.clone());
                }
            }
        }
        if let Some(range) = self.group_by_value {
            builder.group_by_value(range);
        }
        if let Some(tags) = &self.group_by_tags {
            builder.group_by_tags(tags.iter().cloned());
        }
        if let Some(limit) = self.limit {
            builder.limit(limit);
        }
        if !self.tags.is_empty() {
            builder.tags(self.tags.clone());
        }
        Ok(())
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if !path_str.starts_with('~') {
        return path.to_path_buf();
    }

    let home = BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));

    if path_str == "~" {
        home
    } else {
        let mut expanded = home;
        expanded.push(path_str.trim_start_matches("~/"));
        expanded
    }
}
