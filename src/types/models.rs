use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use super::version::parse_lenient;

pub const INDEX_API_VERSION: &str = "v1";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Maintainer {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// One version of a chart, as it appears in an index, a backend listing or a
/// `Chart.yaml`.
///
/// Versions are kept as the literal scalar text of the source document, so
/// `version: 1.20` stays `"1.20"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub name: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub home: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub maintainers: Vec<Maintainer>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "scalar_string")]
    pub app_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kube_version: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub chart_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tags: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub digest: String,
}

/// Reads a scalar as its source text. YAML resolves bare `1.10` to a float,
/// so the value is requested as a string instead of going through
/// `deserialize_any`.
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    struct ScalarText;

    impl Visitor<'_> for ScalarText {
        type Value = String;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a string or scalar")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_str(ScalarText)
}

impl ChartVersion {
    /// Orders by semantic version, highest first. Unparseable versions sort last.
    fn cmp_newest_first(&self, other: &Self) -> Ordering {
        match (parse_lenient(&self.version), parse_lenient(&other.version)) {
            (Ok(a), Ok(b)) => b.cmp(&a),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => Ordering::Equal,
        }
    }
}

/// A chart repository index document (`index.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFile {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub entries: BTreeMap<String, Vec<ChartVersion>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub public_keys: Vec<String>,
}

impl IndexFile {
    #[must_use]
    pub fn new() -> Self {
        Self {
            api_version: INDEX_API_VERSION.to_string(),
            ..Self::default()
        }
    }

    /// Sorts every entry so that the newest version comes first.
    pub fn sort_entries(&mut self) {
        for versions in self.entries.values_mut() {
            versions.sort_by(ChartVersion::cmp_newest_first);
        }
    }
}

/// Summary of one chart in a namespace listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartInfo {
    pub name: String,
    pub total_versions: usize,
    pub latest_version: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub deprecated: bool,
}

/// An entry of `requirements.yaml` (or the `dependencies` of `Chart.yaml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(default)]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigitalSignature {
    pub signed: bool,
    #[serde(rename = "prov_file")]
    pub provenance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub signature: DigitalSignature,
}

impl SecurityReport {
    #[must_use]
    pub fn signed(provenance: impl Into<String>) -> Self {
        Self {
            signature: DigitalSignature {
                signed: true,
                provenance: provenance.into(),
            },
        }
    }

    #[must_use]
    pub fn unsigned() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
}

/// Content derived from a chart archive alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartDetails {
    pub dependencies: Vec<Dependency>,
    /// Flattened values: dotted key path to leaf value.
    pub values: BTreeMap<String, serde_json::Value>,
    /// `README.md` and `values.yaml` contents, when present.
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartVersionDetails {
    pub metadata: ChartVersion,
    pub dependencies: Vec<Dependency>,
    pub values: BTreeMap<String, serde_json::Value>,
    pub files: BTreeMap<String, String>,
    /// Recomputed on every lookup, never taken from the cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityReport>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

impl ChartVersionDetails {
    #[must_use]
    pub fn new(metadata: ChartVersion, details: ChartDetails) -> Self {
        Self {
            metadata,
            dependencies: details.dependencies,
            values: details.values,
            files: details.files,
            security: None,
            labels: Vec::new(),
        }
    }

    /// Copy suitable for caching: everything except the security report.
    #[must_use]
    pub fn without_security(&self) -> Self {
        Self {
            security: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(v: &str) -> ChartVersion {
        ChartVersion {
            name: "harbor".to_string(),
            version: v.to_string(),
            ..ChartVersion::default()
        }
    }

    #[test]
    fn test_sort_entries_newest_first() {
        let mut index = IndexFile::new();
        index.entries.insert(
            "harbor".to_string(),
            vec![version("0.1.0"), version("broken"), version("0.10.0"), version("0.2.0")],
        );
        index.sort_entries();

        let ordered: Vec<&str> = index.entries["harbor"]
            .iter()
            .map(|v| v.version.as_str())
            .collect();
        assert_eq!(ordered, ["0.10.0", "0.2.0", "0.1.0", "broken"]);
    }

    #[test]
    fn test_chart_version_metadata_fields() {
        let raw = r#"{"name":"harbor","version":"0.2.0","type":"application","kubeVersion":">=1.19","annotations":{"category":"Registry"},"removed":false,"urls":["charts/harbor-0.2.0.tgz"],"created":"2018-08-30T03:33:20Z","digest":"abc"}"#;
        let parsed: ChartVersion = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.chart_type, "application");
        assert_eq!(parsed.kube_version, ">=1.19");
        assert_eq!(parsed.annotations["category"], "Registry");

        let encoded = serde_json::to_value(&parsed).unwrap();
        assert_eq!(encoded["type"], "application");
        assert_eq!(encoded["kubeVersion"], ">=1.19");
        assert!(encoded.get("removed").is_none());
    }

    #[test]
    fn test_numeric_versions_keep_source_text() {
        let raw = "name: harbor\nversion: 1.20\nappVersion: 1.10\nurls: []\n";
        let parsed: ChartVersion = serde_yaml::from_str(raw).unwrap();
        assert_eq!(parsed.version, "1.20");
        assert_eq!(parsed.app_version, "1.10");

        let index: IndexFile = serde_yaml::from_str(
            "apiVersion: v1\nentries:\n  harbor:\n  - name: harbor\n    version: 1.20\n    appVersion: 1.10\n    urls: []\n",
        )
        .unwrap();
        assert_eq!(index.entries["harbor"][0].version, "1.20");
        assert_eq!(index.entries["harbor"][0].app_version, "1.10");
    }

    #[test]
    fn test_versions_from_json() {
        let parsed: ChartVersion =
            serde_json::from_str(r#"{"name":"harbor","version":"1.20","appVersion":"1.10"}"#).unwrap();
        assert_eq!(parsed.version, "1.20");
        assert_eq!(parsed.app_version, "1.10");
    }

    #[test]
    fn test_index_file_from_yaml() {
        let raw = r#"
apiVersion: v1
entries:
  harbor:
  - name: harbor
    version: 0.2.0
    urls:
    - charts/harbor-0.2.0.tgz
    created: 2018-08-30T03:33:20.929Z
    digest: 8ba2d1f9a0d4d1a0bbb4aa4f4d1c3e7e
generated: 2018-08-30T03:33:21Z
publicKeys:
- key-a
"#;
        let index: IndexFile = serde_yaml::from_str(raw).unwrap();
        assert_eq!(index.entries["harbor"][0].urls, ["charts/harbor-0.2.0.tgz"]);
        assert!(index.generated.is_some());
        assert_eq!(index.public_keys, ["key-a"]);
    }

    #[test]
    fn test_without_security() {
        let mut details = ChartVersionDetails::new(version("0.2.0"), ChartDetails::default());
        details.security = Some(SecurityReport::signed("charts/harbor-0.2.0.tgz.prov"));
        assert!(details.without_security().security.is_none());
    }
}
