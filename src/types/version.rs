use semver::Version;

/// Parses a chart version the way chart repositories accept them: an optional
/// leading `v` and missing minor or patch components (`v1.2` is `1.2.0`).
pub fn parse_lenient(raw: &str) -> Result<Version, semver::Error> {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);

    if let Ok(version) = Version::parse(trimmed) {
        return Ok(version);
    }

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Version::parse(trimmed);
    }

    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);
    Version::parse(&padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strict() {
        assert_eq!(parse_lenient("0.2.0").unwrap(), Version::new(0, 2, 0));
    }

    #[test]
    fn test_parse_leading_v_and_padding() {
        assert_eq!(parse_lenient("v1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_lenient("3").unwrap(), Version::new(3, 0, 0));
        let pre = parse_lenient("1.4-rc.1").unwrap();
        assert_eq!(pre.to_string(), "1.4.0-rc.1");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(parse_lenient("latest").is_err());
        assert!(parse_lenient("1.2.3.4").is_err());
        assert!(parse_lenient("").is_err());
    }
}
