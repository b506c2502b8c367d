//! `#include<name>` expansion.
//!
//! Accepted forms:
//!
//! ```text
//! #include<lightFragment>
//! #include<lightFragment>[0]
//! #include<lightFragment>[0..maxLights]
//! #include<bonesDeclaration>(vPosition,vPositionW,BONE,JOINT)
//! ```
//!
//! The parenthesised list holds literal `pattern,replacement` pairs applied to
//! the included text. An index suffix substitutes `{X}`; a range suffix
//! replicates the block once per index. A non-numeric range bound is looked up
//! in the index parameters.

use std::collections::HashMap;

use crate::error::ShaderError;
use crate::lexer::parse_int_prefix;

/// Fetches include text the store does not hold yet.
pub trait IncludeResolver {
    /// Returns the include body, or `None` when it cannot be found.
    fn resolve(&mut self, name: &str) -> Option<String>;
}

impl<F> IncludeResolver for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn resolve(&mut self, name: &str) -> Option<String> {
        self(name)
    }
}

// ── Directive parsing ─────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct IncludeDirective<'l> {
    name: &'l str,
    substitutions: Option<&'l str>,
    index: Option<&'l str>,
}

fn is_include(line: &str) -> bool {
    line.trim_start().starts_with("#include")
}

fn parse_directive(line: &str, number: usize) -> Result<IncludeDirective<'_>, ShaderError> {
    let bad = |what: &str| ShaderError::include(format!("{}: {:?}", what, line.trim()), number);

    let rest = line.trim().strip_prefix("#include").ok_or_else(|| bad("not an include"))?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('<').ok_or_else(|| bad("expected '<' after #include"))?;
    let close = rest.find('>').ok_or_else(|| bad("unterminated include name"))?;
    let name = rest[..close].trim();
    if name.is_empty() {
        return Err(bad("empty include name"));
    }

    let mut rest = rest[close + 1..].trim_start();
    let mut substitutions = None;
    let mut index = None;

    if let Some(body) = rest.strip_prefix('(') {
        let end = body.rfind(')').ok_or_else(|| bad("unterminated substitution list"))?;
        substitutions = Some(&body[..end]);
        rest = body[end + 1..].trim_start();
    }
    if let Some(body) = rest.strip_prefix('[') {
        let end = body.find(']').ok_or_else(|| bad("unterminated index suffix"))?;
        index = Some(body[..end].trim());
        rest = body[end + 1..].trim_start();
    }
    if !rest.is_empty() && !rest.starts_with("//") {
        return Err(bad("unexpected text after include"));
    }

    Ok(IncludeDirective { name, substitutions, index })
}

// ── Expansion ─────────────────────────────────────────────────────────────

/// Expands a single include body according to its directive suffixes.
fn instantiate(
    body: &str,
    directive: &IncludeDirective<'_>,
    index_parameters: &HashMap<String, u32>,
    number: usize,
) -> Result<String, ShaderError> {
    let mut text = body.to_string();

    if let Some(list) = directive.substitutions {
        let parts: Vec<&str> = list.split(',').map(str::trim).collect();
        if parts.len() % 2 != 0 {
            return Err(ShaderError::include(
                format!("include <{}> has an odd substitution list", directive.name),
                number,
            ));
        }
        for pair in parts.chunks(2) {
            if !pair[0].is_empty() {
                text = text.replace(pair[0], pair[1]);
            }
        }
    }

    let Some(index) = directive.index else {
        return Ok(text);
    };

    let Some((min, max)) = index.split_once("..") else {
        return Ok(text.replace("{X}", index));
    };

    let min = parse_int_prefix(min).ok_or_else(|| {
        ShaderError::include(format!("include <{}> has a non-numeric range start", directive.name), number)
    })?;
    let max = match parse_int_prefix(max) {
        Some(v) => v,
        None => match index_parameters.get(max.trim()) {
            Some(&v) => i64::from(v),
            None => {
                return Err(ShaderError::include(
                    format!("unknown index parameter {:?} in include <{}>", max.trim(), directive.name),
                    number,
                ));
            }
        },
    };

    let mut out = String::new();
    for i in min..max {
        let instance = text.replace("{X}", &i.to_string());
        out.push_str(&instance);
        if !instance.ends_with('\n') {
            out.push('\n');
        }
    }
    Ok(out)
}

/// Replaces every `#include` line in `source` until none remain.
///
/// Unknown includes are fetched through `resolver` and added to `includes`.
/// Each nesting level is one pass; more than `max_depth` passes is reported as
/// an include cycle.
pub fn expand_includes(
    source: &str,
    includes: &mut HashMap<String, String>,
    mut resolver: Option<&mut (dyn IncludeResolver + '_)>,
    index_parameters: &HashMap<String, u32>,
    max_depth: usize,
) -> Result<String, ShaderError> {
    let mut current = source.to_string();
    let mut depth = 0;

    while current.lines().any(is_include) {
        if depth >= max_depth {
            let line = current.lines().position(is_include).map_or(1, |i| i + 1);
            return Err(ShaderError::include(
                format!("include nesting deeper than {} levels (cycle?)", max_depth),
                line,
            ));
        }
        depth += 1;

        let mut out = String::with_capacity(current.len());
        for (i, line) in current.lines().enumerate() {
            if !is_include(line) {
                out.push_str(line);
                out.push('\n');
                continue;
            }

            let number = i + 1;
            let directive = parse_directive(line, number)?;

            if !includes.contains_key(directive.name) {
                let fetched = resolver.as_deref_mut().and_then(|r| r.resolve(directive.name));
                match fetched {
                    Some(body) => {
                        includes.insert(directive.name.to_string(), body);
                    }
                    None => {
                        return Err(ShaderError::include(
                            format!("unknown include <{}>", directive.name),
                            number,
                        ));
                    }
                }
            }

            let body = &includes[directive.name];
            let expanded = instantiate(body, &directive, index_parameters, number)?;
            out.push_str(&expanded);
            if !expanded.ends_with('\n') {
                out.push('\n');
            }
        }
        current = out;
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn expand(src: &str, includes: &mut HashMap<String, String>) -> Result<String, ShaderError> {
        expand_includes(src, includes, None, &HashMap::new(), 8)
    }

    #[test]
    fn directive_forms() {
        let d = parse_directive("#include<light>(a,b)[0..N]", 1).unwrap();
        assert_eq!(d.name, "light");
        assert_eq!(d.substitutions, Some("a,b"));
        assert_eq!(d.index, Some("0..N"));

        let d = parse_directive("  #include <fog>", 1).unwrap();
        assert_eq!(d.name, "fog");
        assert_eq!(d.substitutions, None);
        assert_eq!(d.index, None);
    }

    #[test]
    fn plain_include_is_inlined() {
        let mut inc = store(&[("fog", "float fog;")]);
        assert_eq!(expand("a\n#include<fog>\nb", &mut inc).unwrap(), "a\nfloat fog;\nb\n");
    }

    #[test]
    fn nested_includes_expand() {
        let mut inc = store(&[("outer", "o\n#include<inner>"), ("inner", "i")]);
        assert_eq!(expand("#include<outer>", &mut inc).unwrap(), "o\ni\n");
    }

    #[test]
    fn substitutions_are_literal_pairs() {
        let mut inc = store(&[("bones", "attribute vec4 BONE; // BONE")]);
        let out = expand("#include<bones>(BONE, matricesIndices)", &mut inc).unwrap();
        assert_eq!(out, "attribute vec4 matricesIndices; // matricesIndices\n");
    }

    #[test]
    fn single_index_substitutes() {
        let mut inc = store(&[("light", "uniform vec4 vLight{X};")]);
        assert_eq!(expand("#include<light>[2]", &mut inc).unwrap(), "uniform vec4 vLight2;\n");
    }

    #[test]
    fn range_replicates_with_parameter_bound() {
        let mut inc = store(&[("light", "l{X}")]);
        let mut params = HashMap::new();
        params.insert("maxLights".to_string(), 3);
        let out = expand_includes("#include<light>[0..maxLights]", &mut inc, None, &params, 8).unwrap();
        assert_eq!(out, "l0\nl1\nl2\n");

        let out = expand_includes("#include<light>[1..2]", &mut inc, None, &params, 8).unwrap();
        assert_eq!(out, "l1\n");
    }

    #[test]
    fn missing_include_uses_resolver_then_store() {
        let mut inc = HashMap::new();
        let mut calls = 0;
        let mut resolver = |name: &str| {
            calls += 1;
            (name == "remote").then(|| "r".to_string())
        };
        let out = expand_includes("#include<remote>", &mut inc, Some(&mut resolver), &HashMap::new(), 8).unwrap();
        assert_eq!(out, "r\n");
        assert_eq!(inc.get("remote").map(String::as_str), Some("r"));

        expand_includes("#include<remote>", &mut inc, Some(&mut resolver), &HashMap::new(), 8).unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn unresolved_include_is_an_error() {
        let err = expand("x\n#include<nope>", &mut HashMap::new()).unwrap_err();
        assert_eq!(err.kind, crate::error::ShaderErrorKind::Include);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn include_cycle_hits_depth_limit() {
        let mut inc = store(&[("a", "#include<b>"), ("b", "#include<a>")]);
        assert!(expand("#include<a>", &mut inc).is_err());
    }

    #[test]
    fn unknown_range_parameter_is_an_error() {
        let mut inc = store(&[("light", "l{X}")]);
        assert!(expand("#include<light>[0..count]", &mut inc).is_err());
    }

    #[test]
    fn malformed_directive_is_an_error() {
        let mut inc = store(&[("a", "x")]);
        assert!(expand("#include a", &mut inc).is_err());
        assert!(expand("#include<a", &mut inc).is_err());
        assert!(expand("#include<a>(x)", &mut inc).is_err());
    }
}
