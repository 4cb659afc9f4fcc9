//! Dot/bracket JSON paths rooted at `$`.
//!
//! Paths are parsed once, at schema build or filter parse time, into typed
//! segments. The canonical string form is what the SQL layer embeds in
//! `json_extract` expressions, so the parser rejects quote characters
//! outright rather than attempting to escape them.

use serde_json::{Map, Value};

/// One step of a JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object member access (`.name` or `["name"]`).
    Key(String),
    /// Array element access (`[0]`).
    Index(usize),
}

/// A parsed, canonicalized JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    canonical: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Parses a `$`-rooted dot/bracket path.
    ///
    /// Accepted forms: `$`, `$.a.b`, `$.a[0].b`, `$["a b"]`. Returns a plain
    /// message on failure; callers wrap it into the appropriate error class.
    pub fn parse(input: &str) -> std::result::Result<Self, String> {
        let mut chars = input.chars().peekable();
        if chars.next() != Some('$') {
            return Err(format!("path {input:?} must start with '$'"));
        }

        let mut segments = Vec::new();
        while let Some(&c) = chars.peek() {
            match c {
                '.' => {
                    chars.next();
                    let mut key = String::new();
                    while let Some(&k) = chars.peek() {
                        if k == '.' || k == '[' {
                            break;
                        }
                        chars.next();
                        key.push(k);
                    }
                    validate_key(input, &key)?;
                    segments.push(Segment::Key(key));
                }
                '[' => {
                    chars.next();
                    match chars.peek() {
                        Some('"') => {
                            chars.next();
                            let mut key = String::new();
                            loop {
                                match chars.next() {
                                    Some('"') => break,
                                    Some(k) => key.push(k),
                                    None => {
                                        return Err(format!(
                                            "path {input:?} has an unterminated bracket key"
                                        ))
                                    }
                                }
                            }
                            if chars.next() != Some(']') {
                                return Err(format!("path {input:?} is missing ']'"));
                            }
                            validate_key(input, &key)?;
                            segments.push(Segment::Key(key));
                        }
                        Some(d) if d.is_ascii_digit() => {
                            let mut digits = String::new();
                            while let Some(&d) = chars.peek() {
                                if !d.is_ascii_digit() {
                                    break;
                                }
                                chars.next();
                                digits.push(d);
                            }
                            if chars.next() != Some(']') {
                                return Err(format!("path {input:?} is missing ']'"));
                            }
                            let index: usize = digits
                                .parse()
                                .map_err(|_| format!("path {input:?} has an invalid index"))?;
                            segments.push(Segment::Index(index));
                        }
                        _ => {
                            return Err(format!(
                                "path {input:?} has an invalid bracket segment"
                            ))
                        }
                    }
                }
                other => {
                    return Err(format!(
                        "path {input:?} has an unexpected character {other:?}"
                    ))
                }
            }
        }

        Ok(Self { canonical: canonicalize(&segments), segments })
    }

    /// Normalizes a filter/field path: `$`-rooted input is parsed as-is,
    /// anything else is treated as a dot path relative to the document root
    /// (`profile.age` becomes `$.profile.age`).
    pub fn normalize(input: &str) -> std::result::Result<Self, String> {
        if input.starts_with('$') {
            Self::parse(input)
        } else {
            Self::parse(&format!("$.{input}"))
        }
    }

    /// The default top-level path for a schema field: `$.<name>`.
    pub fn for_field(name: &str) -> std::result::Result<Self, String> {
        Self::parse(&format!("$.{name}"))
    }

    /// The canonical string form, safe to embed in a single-quoted SQL
    /// literal.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// The parsed segments, root first.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Looks the path up inside a document.
    pub fn lookup<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match segment {
                Segment::Key(k) => current.get(k.as_str())?,
                Segment::Index(i) => current.get(i)?,
            };
        }
        Some(current)
    }

    /// Sets `value` at this path inside `root`, creating intermediate
    /// objects as needed. Paths traversing array indexes are skipped (there
    /// is no sensible way to materialize them in a fresh document); returns
    /// whether the write happened.
    pub fn seed(&self, root: &mut Map<String, Value>, value: Value) -> bool {
        let mut keys = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Key(k) => keys.push(k.clone()),
                Segment::Index(_) => return false,
            }
        }
        let Some((last, parents)) = keys.split_last() else {
            return false;
        };

        let mut current = root;
        for key in parents {
            let entry = current
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(map) => current = map,
                _ => return false,
            }
        }
        current.insert(last.clone(), value);
        true
    }
}

impl std::fmt::Display for JsonPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.canonical)
    }
}

fn validate_key(path: &str, key: &str) -> std::result::Result<(), String> {
    if key.is_empty() {
        return Err(format!("path {path:?} has an empty key segment"));
    }
    if key.contains(['\'', '"', '[', ']']) || key.chars().any(char::is_control) {
        return Err(format!("path {path:?} key {key:?} contains invalid characters"));
    }
    Ok(())
}

fn canonicalize(segments: &[Segment]) -> String {
    let mut out = String::from("$");
    for segment in segments {
        match segment {
            Segment::Key(k) => {
                out.push('.');
                // Non-identifier keys need the quoted form SQLite's JSON
                // path grammar understands.
                if k.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    out.push_str(k);
                } else {
                    out.push('"');
                    out.push_str(k);
                    out.push('"');
                }
            }
            Segment::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_dot_and_bracket_forms() {
        let path = JsonPath::parse("$.a.b[2].c").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("a".into()),
                Segment::Key("b".into()),
                Segment::Index(2),
                Segment::Key("c".into()),
            ]
        );
        assert_eq!(path.as_str(), "$.a.b[2].c");

        let bracket = JsonPath::parse(r#"$["a b"].c"#).unwrap();
        assert_eq!(bracket.as_str(), r#"$."a b".c"#);
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(JsonPath::parse("a.b").is_err());
        assert!(JsonPath::parse("$.").is_err());
        assert!(JsonPath::parse("$.a..b").is_err());
        assert!(JsonPath::parse("$.a[").is_err());
        assert!(JsonPath::parse("$.a'b").is_err());
        assert!(JsonPath::parse(r#"$["x"#).is_err());
    }

    #[test]
    fn normalize_roots_bare_field_paths() {
        assert_eq!(JsonPath::normalize("profile.age").unwrap().as_str(), "$.profile.age");
        assert_eq!(JsonPath::normalize("$.x").unwrap().as_str(), "$.x");
    }

    #[test]
    fn lookup_walks_nested_values() {
        let doc = json!({"profile": {"tags": ["a", "b"]}});
        let path = JsonPath::parse("$.profile.tags[1]").unwrap();
        assert_eq!(path.lookup(&doc), Some(&json!("b")));
        assert_eq!(JsonPath::parse("$.missing").unwrap().lookup(&doc), None);
    }

    #[test]
    fn seed_creates_intermediate_objects() {
        let mut root = Map::new();
        assert!(JsonPath::parse("$.a.b").unwrap().seed(&mut root, json!(1)));
        assert_eq!(Value::Object(root.clone()), json!({"a": {"b": 1}}));
        // Array segments cannot be seeded.
        assert!(!JsonPath::parse("$.a[0]").unwrap().seed(&mut root, json!(2)));
    }
}
