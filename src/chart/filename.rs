/// Extension of packaged charts.
pub const CHART_PACKAGE_EXTENSION: &str = "tgz";

/// Splits a package file name such as `hello-helm-0.1.0.tgz` into chart name and
/// version.
///
/// The version starts at the first dash-separated part that begins with a digit.
/// When no part does, everything after the last dash is taken as the version.
#[must_use]
pub fn parse_chart_version_from_filename(filename: &str) -> (String, String) {
    let base = filename.rsplit('/').next().unwrap_or(filename);
    let stem = base
        .strip_suffix(CHART_PACKAGE_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(base);
    let parts: Vec<&str> = stem.split('-').collect();

    let version_start = parts
        .iter()
        .skip(1)
        .position(|part| part.starts_with(|c: char| c.is_ascii_digit()))
        .map(|i| i + 1);

    match version_start {
        Some(i) => (parts[..i].join("-"), parts[i..].join("-")),
        None => {
            let last = parts.len() - 1;
            (parts[..last].join("-"), parts[last].to_string())
        }
    }
}

/// `<namespace>/<name>:<version>`, or `<name>:<version>` when the name is already
/// an absolute URL.
#[must_use]
pub fn chart_full_name(namespace: &str, name: &str, version: &str) -> String {
    if name.starts_with("http") {
        format!("{name}:{version}")
    } else {
        format!("{namespace}/{name}:{version}")
    }
}
