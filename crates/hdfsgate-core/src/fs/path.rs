//! Cluster path helpers: normalization, joining and URI qualification.

/// Splits `scheme://authority/path` into `(scheme, authority, path)`.
///
/// Bare paths yield empty scheme and authority.
pub fn split_uri(uri: &str) -> (&str, &str, &str) {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return ("", "", uri);
    };
    match rest.find('/') {
        Some(idx) => (scheme, &rest[..idx], &rest[idx..]),
        None => (scheme, rest, ""),
    }
}

/// Reduces any path or fully-qualified URI to a normalized cluster-absolute path.
pub fn normalize(path: &str) -> String {
    let (_, _, path) = split_uri(path);
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Joins a child name onto a parent; an empty parent means the root.
pub fn join(parent: &str, name: &str) -> String {
    let parent = if parent.is_empty() { "/" } else { parent };
    normalize(&format!("{}/{}", normalize(parent), name))
}

/// Parent of a normalized path, `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    let path = normalize(path);
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Leaf component of a path; empty for the root.
pub fn basename(path: &str) -> String {
    let path = normalize(path);
    path.rsplit('/').next().unwrap_or_default().to_string()
}

/// Prefixes a cluster-absolute path with the filesystem URI.
pub fn qualify(uri: &str, path: &str) -> String {
    format!("{}{}", trim_uri(uri), normalize(path))
}

/// Drops trailing slashes from a URI while keeping the `scheme://` separator.
pub fn trim_uri(uri: &str) -> &str {
    let mut base = uri;
    while base.ends_with('/') && !base.ends_with("://") {
        base = &base[..base.len() - 1];
    }
    base
}

/// True when `ancestor` is `path` or one of its parents.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    let ancestor = normalize(ancestor);
    let path = normalize(path);
    ancestor == "/" || path == ancestor || path.starts_with(&format!("{ancestor}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_uri() {
        assert_eq!(
            split_uri("hdfs://NameNodeCluster/t/a"),
            ("hdfs", "NameNodeCluster", "/t/a")
        );
        assert_eq!(split_uri("hdfs://nn:8020"), ("hdfs", "nn:8020", ""));
        assert_eq!(split_uri("file:///tmp/x"), ("file", "", "/tmp/x"));
        assert_eq!(split_uri("/plain"), ("", "", "/plain"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/a//b/./c/"), "/a/b/c");
        assert_eq!(normalize("a/b"), "/a/b");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("hdfs://ns/x/y"), "/x/y");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("/t", "a"), "/t/a");
        assert_eq!(join("", "a"), "/a");
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/t/", "/a"), "/t/a");
    }

    #[test]
    fn test_parent_and_basename() {
        assert_eq!(parent("/t/a").as_deref(), Some("/t"));
        assert_eq!(parent("/t").as_deref(), Some("/"));
        assert_eq!(parent("/"), None);
        assert_eq!(basename("/t/a"), "a");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("hdfs://ns", "/t/a"), "hdfs://ns/t/a");
        assert_eq!(qualify("file://", "/tmp"), "file:///tmp");
        assert_eq!(qualify("file:///", "/tmp"), "file:///tmp");
        assert_eq!(qualify("hdfs://ns/", "/t"), "hdfs://ns/t");
    }

    #[test]
    fn test_is_ancestor() {
        assert!(is_ancestor("/t", "/t/a"));
        assert!(is_ancestor("/t", "/t"));
        assert!(!is_ancestor("/t", "/tx"));
        assert!(is_ancestor("/", "/anything"));
    }
}
