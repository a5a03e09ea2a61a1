use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::version::parse_lenient;
use crate::types::{ChartDetails, ChartInfo, ChartVersion, Dependency};

pub const CHART_FILE: &str = "Chart.yaml";
pub const REQUIREMENTS_FILE: &str = "requirements.yaml";
pub const VALUES_FILE: &str = "values.yaml";
pub const README_FILE: &str = "README.md";

/// A file of a chart archive, path relative to the chart root.
#[derive(Debug, Clone)]
pub struct ArchiveFile {
    pub name: String,
    pub data: Vec<u8>,
}

/// Decoded chart archive.
#[derive(Debug, Clone)]
pub struct ChartArchive {
    /// Contents of `Chart.yaml`.
    pub metadata: ChartVersion,
    /// Regular files in archive order.
    pub files: Vec<ArchiveFile>,
    /// sha256 of the compressed archive, hex encoded.
    pub digest: String,
}

impl ChartArchive {
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&ArchiveFile> {
        self.files.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Default, Deserialize)]
struct DependencyList {
    #[serde(default)]
    dependencies: Vec<Dependency>,
}

/// Decodes chart archives and the JSON documents of the backend API.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChartOperator;

impl ChartOperator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn get_chart_data(&self, content: &[u8]) -> Result<ChartArchive> {
        if content.is_empty() {
            return Err(Error::EmptyContent);
        }

        let files = read_archive(content)?;
        let chart_file = files
            .iter()
            .find(|f| f.name == CHART_FILE)
            .ok_or_else(|| Error::MalformedArchive(format!("{CHART_FILE} is missing")))?;
        let metadata: ChartVersion = serde_yaml::from_slice(&chart_file.data)
            .map_err(|e| Error::MalformedArchive(format!("invalid {CHART_FILE}: {e}")))?;

        Ok(ChartArchive {
            metadata,
            files,
            digest: hex::encode(Sha256::digest(content)),
        })
    }

    /// Extracts dependencies, flattened values and the readme from a chart archive.
    pub fn get_chart_details(&self, content: &[u8]) -> Result<ChartDetails> {
        let archive = self.get_chart_data(content)?;
        let mut details = ChartDetails::default();

        let dependency_source = archive
            .file(REQUIREMENTS_FILE)
            .or_else(|| archive.file(CHART_FILE));
        if let Some(file) = dependency_source {
            let list: Option<DependencyList> = serde_yaml::from_slice(&file.data)?;
            details.dependencies = list.unwrap_or_default().dependencies;
        }

        if let Some(file) = archive.file(VALUES_FILE) {
            let raw = String::from_utf8_lossy(&file.data).into_owned();
            if !raw.trim().is_empty() {
                details.values = match serde_yaml::from_str::<YamlValue>(&raw)? {
                    YamlValue::Mapping(mapping) => flatten_values(&mapping),
                    YamlValue::Null => BTreeMap::new(),
                    _ => {
                        return Err(Error::Decode(format!(
                            "{VALUES_FILE} is not a mapping"
                        )));
                    }
                };
                details.files.insert(VALUES_FILE.to_string(), raw);
            }
        }

        if let Some(readme) = archive
            .files
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(README_FILE))
        {
            details.files.insert(
                README_FILE.to_string(),
                String::from_utf8_lossy(&readme.data).into_owned(),
            );
        }

        Ok(details)
    }

    /// Summarises a backend listing (`{chart name: [versions]}`), most recently
    /// updated chart first.
    pub fn get_chart_list(&self, content: &[u8]) -> Result<Vec<ChartInfo>> {
        if content.is_empty() {
            return Err(Error::EmptyContent);
        }

        let listing: BTreeMap<String, Vec<ChartVersion>> = serde_json::from_slice(content)?;
        let mut charts: Vec<ChartInfo> = listing
            .into_iter()
            .filter_map(|(name, versions)| summarize_chart(name, &versions))
            .collect();

        charts.sort_by(|a, b| b.updated.cmp(&a.updated).then_with(|| a.name.cmp(&b.name)));
        Ok(charts)
    }

    pub fn get_chart_versions(&self, content: &[u8]) -> Result<Vec<ChartVersion>> {
        if content.is_empty() {
            return Err(Error::EmptyContent);
        }
        Ok(serde_json::from_slice(content)?)
    }
}

fn read_archive(content: &[u8]) -> Result<Vec<ArchiveFile>> {
    let mut archive = tar::Archive::new(GzDecoder::new(content));
    let entries = archive
        .entries()
        .map_err(|e| Error::MalformedArchive(e.to_string()))?;

    let mut files = Vec::new();
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::MalformedArchive(e.to_string()))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| Error::MalformedArchive(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        // Entries live under a single top-level directory named after the chart.
        let Some((_, name)) = path.split_once('/') else {
            continue;
        };
        let name = name.to_string();

        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| Error::MalformedArchive(e.to_string()))?;
        files.push(ArchiveFile { name, data });
    }

    if files.is_empty() {
        return Err(Error::MalformedArchive("archive has no files".to_string()));
    }
    Ok(files)
}

fn summarize_chart(name: String, versions: &[ChartVersion]) -> Option<ChartInfo> {
    let mut latest: Option<(semver::Version, &ChartVersion)> = None;
    let mut oldest: Option<&ChartVersion> = None;

    for version in versions {
        if oldest.is_none_or(|o| version.created < o.created) {
            oldest = Some(version);
        }

        match parse_lenient(&version.version) {
            Ok(parsed) => {
                if latest.as_ref().is_none_or(|(v, _)| parsed > *v) {
                    latest = Some((parsed, version));
                }
            }
            Err(e) => {
                warn!(
                    chart = %name,
                    version = %version.version,
                    "Skipping malformed chart version: {e}"
                );
            }
        }
    }

    let (_, latest) = latest?;
    let oldest = oldest?;

    Some(ChartInfo {
        total_versions: versions.len(),
        latest_version: latest.version.clone(),
        created: oldest.created,
        updated: latest.created,
        icon: latest.icon.clone(),
        home: latest.home.clone(),
        deprecated: latest.deprecated,
        name,
    })
}

/// Flattens nested mappings into dotted key paths. Every non-mapping value,
/// sequences included, is a leaf.
pub fn flatten_values(values: &serde_yaml::Mapping) -> BTreeMap<String, serde_json::Value> {
    let mut flat = BTreeMap::new();
    flatten_into(values, "", &mut flat);
    flat
}

fn flatten_into(
    values: &serde_yaml::Mapping,
    prefix: &str,
    flat: &mut BTreeMap<String, serde_json::Value>,
) {
    for (key, value) in values {
        let key = scalar_key(key);
        let long_key = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };

        match value {
            YamlValue::Mapping(nested) => flatten_into(nested, &long_key, flat),
            leaf => {
                flat.insert(long_key, yaml_to_json(leaf));
            }
        }
    }
}

fn scalar_key(key: &YamlValue) -> String {
    match key {
        YamlValue::String(s) => s.clone(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Number(n) => n.to_string(),
        YamlValue::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn yaml_to_json(value: &YamlValue) -> serde_json::Value {
    match value {
        YamlValue::Null => serde_json::Value::Null,
        YamlValue::Bool(b) => serde_json::Value::Bool(*b),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else if let Some(u) = n.as_u64() {
                u.into()
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or_else(|| serde_json::Value::String(n.to_string()), Into::into)
            }
        }
        YamlValue::String(s) => serde_json::Value::String(s.clone()),
        YamlValue::Sequence(items) => items.iter().map(yaml_to_json).collect(),
        YamlValue::Mapping(mapping) => mapping
            .iter()
            .map(|(k, v)| (scalar_key(k), yaml_to_json(v)))
            .collect::<serde_json::Map<_, _>>()
            .into(),
        YamlValue::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}
