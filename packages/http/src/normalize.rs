//! Turning request paths into absolute URLs.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};

lazy_static! {
    static ref NON_LOCAL: Regex = Regex::new(r"^(?://|[\w+]{3,}://)").unwrap();
}

/// Whether `path` already names a scheme (`https://...`) or is
/// protocol-relative (`//host/...`).
pub fn is_absolute(path: &str) -> bool {
    NON_LOCAL.is_match(path)
}

/// Resolve `path` against `base_url`.
///
/// Absolute paths pass through unchanged. Relative paths are appended to the
/// base with exactly one `/` inserted when the path lacks a leading slash.
pub fn fix_up_url(path: &str, base_url: Option<&str>) -> Result<String> {
    if is_absolute(path) {
        return Ok(path.to_string());
    }

    let base = base_url.ok_or_else(|| Error::MissingBaseUrl {
        path: path.to_string(),
    })?;
    let separator = if path.starts_with('/') { "" } else { "/" };

    Ok(format!("{}{}{}", base, separator, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_relative_paths() {
        assert_eq!(
            fix_up_url("path", Some("https://h")).unwrap(),
            "https://h/path"
        );
    }

    #[test]
    fn no_double_slash_for_rooted_paths() {
        assert_eq!(
            fix_up_url("/path", Some("https://h")).unwrap(),
            "https://h/path"
        );
    }

    #[test]
    fn absolute_urls_pass_through() {
        assert_eq!(
            fix_up_url("https://other/x", Some("https://h")).unwrap(),
            "https://other/x"
        );
        assert_eq!(fix_up_url("https://other/x", None).unwrap(), "https://other/x");
        assert_eq!(fix_up_url("//cdn/x", None).unwrap(), "//cdn/x");
        assert_eq!(
            fix_up_url("git+ssh://host/repo", None).unwrap(),
            "git+ssh://host/repo"
        );
    }

    #[test]
    fn short_schemes_are_relative() {
        assert!(!is_absolute("ab://x"));
        assert_eq!(
            fix_up_url("ab://x", Some("https://h")).unwrap(),
            "https://h/ab://x"
        );
    }

    #[test]
    fn empty_path_is_base_root() {
        assert_eq!(fix_up_url("", Some("https://h")).unwrap(), "https://h/");
    }

    #[test]
    fn relative_path_without_base_fails() {
        let err = fix_up_url("users", None).unwrap_err();
        assert!(matches!(err, Error::MissingBaseUrl { path } if path == "users"));
    }
}
