//! Helpers for provider-relative storage paths.
//!
//! Paths are `/`-separated strings relative to a provider root. A leading or
//! trailing separator is not significant, and the empty string (or `/`) is the
//! root itself.

/// Path separator used by every provider.
pub const SEPARATOR: char = '/';

/// Strip leading and trailing separators and collapse empty segments.
pub fn normalize(path: &str) -> String {
    path.split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check whether a path refers to the provider root.
pub fn is_root(path: &str) -> bool {
    path.trim_matches(SEPARATOR).is_empty()
}

/// Join a base path with a relative child path.
pub fn join(base: &str, child: &str) -> String {
    let base = base.trim_end_matches(SEPARATOR);
    let child = child.trim_start_matches(SEPARATOR);
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{}/{}", base, child),
    }
}

/// Substring before the last separator, or `None` if there is none.
pub fn parent(path: &str) -> Option<&str> {
    path.rfind(SEPARATOR).map(|idx| &path[..idx])
}

/// Substring after the last separator (the whole path if there is none).
pub fn file_name(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Substring after the last `.` of the file name, if any.
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    name.rfind('.').map(|idx| &name[idx + 1..])
}

/// Path of `path` relative to `base`.
///
/// The `base` prefix is stripped case-insensitively and a leading separator
/// trimmed. Returns `None` when `path` does not start with `base`.
pub fn relative_to<'a>(path: &'a str, base: &str) -> Option<&'a str> {
    let path = path.trim_start_matches(SEPARATOR);
    let base = base.trim_matches(SEPARATOR);
    if base.is_empty() {
        return Some(path);
    }
    let head = path.get(..base.len())?;
    if !head.eq_ignore_ascii_case(base) {
        return None;
    }
    let rest = &path[base.len()..];
    if !rest.is_empty() && !rest.starts_with(SEPARATOR) {
        return None;
    }
    Some(rest.trim_start_matches(SEPARATOR))
}

/// Whether `path` equals `base` or lies below it (case-insensitive).
pub fn is_within(path: &str, base: &str) -> bool {
    relative_to(path, base).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a//b/"), "a/b");
        assert_eq!(normalize("/"), "");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("a", "b/c"), "a/b/c");
        assert_eq!(join("", "b"), "b");
        assert_eq!(join("a/", ""), "a");
    }

    #[test]
    fn test_parent_name_extension() {
        assert_eq!(parent("docs/readme.md"), Some("docs"));
        assert_eq!(parent("readme.md"), None);
        assert_eq!(file_name("docs/readme.md"), "readme.md");
        assert_eq!(extension("docs/archive.tar.gz"), Some("gz"));
        assert_eq!(extension("docs/Makefile"), None);
        assert_eq!(extension("v1.2/Makefile"), None);
    }

    #[test]
    fn test_relative_to_is_case_insensitive() {
        assert_eq!(relative_to("Src/Sub/file.txt", "src"), Some("Sub/file.txt"));
        assert_eq!(relative_to("src", "SRC"), Some(""));
        assert_eq!(relative_to("srcdir/file", "src"), None);
        assert_eq!(relative_to("other/file", "src"), None);
        assert_eq!(relative_to("a/b", ""), Some("a/b"));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("a/b", "a"));
        assert!(is_within("A", "a/"));
        assert!(!is_within("ab", "a"));
    }

    proptest! {
        #[test]
        fn prop_parent_and_name_rebuild_path(
            segments in prop::collection::vec("[a-z0-9._-]{1,8}", 1..5)
        ) {
            let path = segments.join("/");
            let rebuilt = match parent(&path) {
                Some(p) => join(p, file_name(&path)),
                None => file_name(&path).to_string(),
            };
            prop_assert_eq!(rebuilt, path);
        }

        #[test]
        fn prop_join_then_relative_roundtrips(
            base in "[a-z]{1,6}(/[a-z]{1,6}){0,2}",
            child in "[a-z]{1,6}(/[a-z]{1,6}){0,2}",
        ) {
            let joined = join(&base, &child);
            prop_assert_eq!(relative_to(&joined, &base.to_uppercase()), Some(child.as_str()));
        }
    }
}
