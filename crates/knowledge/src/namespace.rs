//! Coarse domain detection from a file path.

/// Keyword tokens and the namespace they map to.
const KEYWORDS: &[(&str, &str)] = &[
    ("auth", "auth"),
    ("authentication", "auth"),
    ("login", "auth"),
    ("identity", "auth"),
    ("ui", "ui"),
    ("components", "ui"),
    ("views", "ui"),
    ("pages", "ui"),
    ("layouts", "ui"),
    ("api", "api"),
    ("controllers", "api"),
    ("routes", "api"),
    ("endpoints", "api"),
    ("handlers", "api"),
    ("test", "tests"),
    ("tests", "tests"),
    ("spec", "tests"),
    ("specs", "tests"),
    ("storage", "storage"),
    ("db", "storage"),
    ("database", "storage"),
    ("repositories", "storage"),
    ("migrations", "storage"),
];

/// Directory names that carry no domain meaning.
const GENERIC_DIRS: &[&str] = &[
    "src", "lib", "app", "apps", "crates", "packages", "source", "main", "internal", "pkg",
];

/// Derive a namespace: a known domain keyword anywhere in the path wins,
/// otherwise the first meaningful directory segment.
pub fn detect_namespace(path: &str) -> Option<String> {
    let normalized = path.replace('\\', "/");
    let segments: Vec<&str> = normalized
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();

    for segment in &segments {
        for token in tokens(segment) {
            if let Some((_, namespace)) = KEYWORDS.iter().find(|(k, _)| *k == token) {
                return Some((*namespace).to_string());
            }
        }
    }

    let (_, dirs) = segments.split_last()?;
    dirs.iter()
        .map(|d| d.to_lowercase())
        .find(|d| !GENERIC_DIRS.contains(&d.as_str()))
}

/// Lower-cased words of a path segment, split on punctuation and camel case.
fn tokens(segment: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for c in segment.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
