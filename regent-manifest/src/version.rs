/// Prefix a module version with the server series unless it already carries it.
///
/// `adapt_version("2.0", "1.3")` yields `"2.0.1.3"`; `"2.0.1.3"` and `"2.0"` are
/// returned unchanged.
pub fn adapt_version(series: &str, version: &str) -> String {
    let prefix = format!("{series}.");
    if version == series || version.starts_with(&prefix) {
        version.to_string()
    } else {
        format!("{prefix}{version}")
    }
}

#[cfg(test)]
mod tests {
    use super::adapt_version;

    #[test]
    fn prefixes_bare_versions_only() {
        assert_eq!(adapt_version("2.0", "1.3"), "2.0.1.3");
        assert_eq!(adapt_version("2.0", "2.0.1.3"), "2.0.1.3");
        assert_eq!(adapt_version("2.0", "2.0"), "2.0");
        assert_eq!(adapt_version("2.0", "2.01"), "2.0.2.01");
    }
}
