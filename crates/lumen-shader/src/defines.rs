use std::collections::HashMap;

/// Active preprocessor symbols for one evaluation pass.
///
/// Built from an ordered list of `"NAME"` / `"NAME VALUE"` strings. A leading
/// `#define` and a trailing `;` are tolerated so the same list can be fed with
/// ready-made define lines. Duplicates are allowed; the last occurrence wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Defines {
    map: HashMap<String, String>,
}

impl Defines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_list<S: AsRef<str>>(list: &[S]) -> Self {
        let mut defines = Self::new();
        for entry in list {
            defines.insert_line(entry.as_ref());
        }
        defines
    }

    /// Parses one define entry and inserts it. Empty entries are ignored.
    pub fn insert_line(&mut self, entry: &str) {
        if let Some((name, value)) = split_define(entry) {
            self.map.insert(name, value.unwrap_or_default());
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.map.remove(name)
    }

    #[inline]
    pub fn is_defined(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    #[inline]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Splits `"#define NAME VALUE;"`, `"NAME VALUE"` or `"NAME"` into its parts.
pub fn split_define(entry: &str) -> Option<(String, Option<String>)> {
    let body = entry.trim();
    let body = body.strip_prefix("#define").unwrap_or(body);
    let body = body.trim().trim_end_matches(';').trim();

    let mut parts = body.split_whitespace();
    let name = parts.next()?;
    let rest: Vec<&str> = parts.collect();
    let value = if rest.is_empty() { None } else { Some(rest.join(" ")) };
    Some((name.to_string(), value))
}

/// Formats a define entry as a `#define` line (the form injected ahead of
/// compiled sources and used in program cache keys).
pub fn to_define_line(entry: &str) -> Option<String> {
    let (name, value) = split_define(entry)?;
    Some(match value {
        Some(v) => format!("#define {} {}", name, v),
        None => format!("#define {}", name),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_duplicate_wins() {
        let d = Defines::from_list(&["NUM_LIGHTS 2", "FOG", "NUM_LIGHTS 4"]);
        assert_eq!(d.value("NUM_LIGHTS"), Some("4"));
        assert!(d.is_defined("FOG"));
        assert_eq!(d.value("FOG"), Some(""));
    }

    #[test]
    fn define_prefix_and_semicolon_are_stripped() {
        assert_eq!(
            split_define("#define MAX_BONES 64;"),
            Some(("MAX_BONES".to_string(), Some("64".to_string())))
        );
        assert_eq!(split_define("   "), None);
    }

    #[test]
    fn define_line_formatting() {
        assert_eq!(to_define_line("A"), Some("#define A".to_string()));
        assert_eq!(to_define_line("#define B 3"), Some("#define B 3".to_string()));
    }
}
