use std::cmp::Ordering;
use std::collections::BTreeMap;

use regex::RegexBuilder;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::version::parse_lenient;
use crate::types::{ChartVersion, IndexFile};

/// Field separator of an indexed line.
const SEP: &str = "\u{0b}";
/// Separates the chart name from the version in keys of all-versions indices.
const VERSION_SEP: char = ' ';

/// One search hit.
///
/// `score` is the position of the first field that matched (name, qualified
/// name, description, keywords), so lower is better.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SearchResult {
    pub name: String,
    pub score: usize,
    pub chart: ChartVersion,
}

/// In-memory search index over chart repository indices.
#[derive(Debug, Default)]
pub struct SearchIndex {
    lines: BTreeMap<String, String>,
    charts: BTreeMap<String, ChartVersion>,
}

impl SearchIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every chart of `index`. Without `all_versions` only the newest
    /// version of each chart is indexed.
    pub fn add_repo(&mut self, repo: &str, index: &IndexFile, all_versions: bool) {
        let mut index = index.clone();
        index.sort_entries();

        for (name, versions) in index.entries {
            let Some(latest) = versions.first() else {
                continue;
            };
            let full_name = join_repo(repo, &name);

            if !all_versions {
                self.lines
                    .insert(full_name.clone(), index_line(repo, latest));
                self.charts.insert(full_name, latest.clone());
                continue;
            }

            for version in versions {
                let key = format!("{full_name}{VERSION_SEP}{}", version.version);
                self.lines.insert(key.clone(), index_line(repo, &version));
                self.charts.insert(key, version);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Runs a search keeping hits whose score is below `threshold`.
    ///
    /// Literal searches are case-insensitive substring matches. Regex searches are
    /// case-insensitive as well; an invalid pattern is a `BadInput` error.
    pub fn search(&self, term: &str, threshold: usize, regex: bool) -> Result<Vec<SearchResult>> {
        if regex {
            self.search_regex(term, threshold)
        } else {
            Ok(self.search_literal(term, threshold))
        }
    }

    fn search_literal(&self, term: &str, threshold: usize) -> Vec<SearchResult> {
        let term = term.to_lowercase();
        self.lines
            .iter()
            .filter_map(|(key, line)| {
                let line = line.to_lowercase();
                let pos = line.find(&term)?;
                self.hit(key, score_at(pos, &line), threshold)
            })
            .collect()
    }

    fn search_regex(&self, pattern: &str, threshold: usize) -> Result<Vec<SearchResult>> {
        let matcher = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::BadInput(format!("invalid search expression: {e}")))?;

        Ok(self
            .lines
            .iter()
            .filter_map(|(key, line)| {
                let pos = matcher.find(line)?.start();
                self.hit(key, score_at(pos, line), threshold)
            })
            .collect())
    }

    fn hit(&self, key: &str, score: usize, threshold: usize) -> Option<SearchResult> {
        if score >= threshold {
            return None;
        }
        let name = key.split(VERSION_SEP).next().unwrap_or(key);
        Some(SearchResult {
            name: name.to_string(),
            score,
            chart: self.charts.get(key)?.clone(),
        })
    }
}

/// Best score first, then by name, then newest version first.
pub fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        a.score
            .cmp(&b.score)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| cmp_versions_desc(&a.chart, &b.chart))
    });
}

fn cmp_versions_desc(a: &ChartVersion, b: &ChartVersion) -> Ordering {
    match (parse_lenient(&a.version), parse_lenient(&b.version)) {
        (Ok(va), Ok(vb)) => vb.cmp(&va),
        _ => b.version.cmp(&a.version),
    }
}

fn join_repo(repo: &str, name: &str) -> String {
    if repo.is_empty() {
        name.to_string()
    } else {
        format!("{}/{name}", repo.trim_end_matches('/'))
    }
}

fn index_line(repo: &str, chart: &ChartVersion) -> String {
    [
        chart.name.clone(),
        join_repo(repo, &chart.name),
        chart.description.clone(),
        chart.keywords.join(" "),
    ]
    .join(SEP)
}

/// Number of field separators before byte offset `pos`.
fn score_at(pos: usize, line: &str) -> usize {
    line.match_indices(SEP)
        .take_while(|(sep_pos, _)| *sep_pos < pos)
        .count()
}
