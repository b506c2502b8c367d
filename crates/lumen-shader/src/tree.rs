//! Conditional line tree.
//!
//! A template is parsed once into a tree of plain lines and `#if` chains. The
//! tree is stateless: [`ConditionalTree::evaluate`] can be run repeatedly with
//! different define sets.

use crate::defines::{split_define, Defines};
use crate::error::ShaderError;
use crate::expr::Expr;

// ── Nodes ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct LineNode {
    text: String,
    /// Set for `#define NAME [VALUE]` lines; registered when the line is emitted.
    define: Option<(String, Option<String>)>,
}

#[derive(Debug, Clone, PartialEq)]
struct Branch {
    /// `None` for `#else`.
    test: Option<Expr>,
    children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Line(LineNode),
    /// `#if` / `#elif`* / `#else`? chain; the first true branch wins.
    Conditional(Vec<Branch>),
}

/// How a nested block ended.
enum BlockEnd {
    Eof,
    Else,
    Elif(Expr),
    Endif,
}

// ── Directive detection ───────────────────────────────────────────────────

enum Directive<'l> {
    IfDef(&'l str),
    IfNDef(&'l str),
    If(&'l str),
    Elif(&'l str),
    Else,
    Endif,
}

fn directive(line: &str) -> Option<Directive<'_>> {
    let body = line.strip_prefix('#')?.trim_start();
    let (keyword, rest) = match body.find(|c: char| c.is_whitespace() || c == '(' || c == '!') {
        Some(i) => (&body[..i], body[i..].trim()),
        None => (body, ""),
    };
    Some(match keyword {
        "ifdef" => Directive::IfDef(strip_comment(rest)),
        "ifndef" => Directive::IfNDef(strip_comment(rest)),
        "if" => Directive::If(rest),
        "elif" => Directive::Elif(rest),
        "else" => Directive::Else,
        "endif" => Directive::Endif,
        _ => return None,
    })
}

fn strip_comment(s: &str) -> &str {
    s.find("//").map_or(s, |i| &s[..i]).trim()
}

fn define_of(line: &str) -> Option<(String, Option<String>)> {
    let body = line.strip_prefix("#define")?;
    if !body.starts_with(char::is_whitespace) {
        return None;
    }
    split_define(strip_comment(body))
}

// ── Builder ───────────────────────────────────────────────────────────────

struct Builder {
    /// `(1-based line number, trimmed text)`; blank lines are already dropped.
    lines: Vec<(usize, String)>,
    pos: usize,
}

impl Builder {
    fn new(src: &str) -> Self {
        let lines = src
            .lines()
            .enumerate()
            .filter_map(|(i, l)| {
                let t = l.trim();
                (!t.is_empty()).then(|| (i + 1, t.to_string()))
            })
            .collect();
        Self { lines, pos: 0 }
    }

    fn next_line(&mut self) -> Option<(usize, String)> {
        let line = self.lines.get(self.pos).cloned();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    fn last_line_number(&self) -> usize {
        self.lines.last().map_or(1, |(n, _)| *n)
    }

    /// Parses nodes until EOF or a branch terminator.
    ///
    /// `nested` controls whether `#else/#elif/#endif` are legal here.
    fn parse_block(&mut self, nested: bool) -> Result<(Vec<Node>, BlockEnd), ShaderError> {
        let mut nodes = Vec::new();

        while let Some((number, text)) = self.next_line() {
            let Some(dir) = directive(&text) else {
                let define = define_of(&text);
                nodes.push(Node::Line(LineNode { text, define }));
                continue;
            };

            let first_test = match dir {
                Directive::IfDef(name) => Expr::Defined(require_name(name, "#ifdef", number)?),
                Directive::IfNDef(name) => {
                    Expr::Not(Box::new(Expr::Defined(require_name(name, "#ifndef", number)?)))
                }
                Directive::If(expr) => Expr::parse(expr, number)?,
                Directive::Elif(expr) => {
                    if !nested {
                        return Err(ShaderError::directive("#elif without matching #if", number));
                    }
                    return Ok((nodes, BlockEnd::Elif(Expr::parse(expr, number)?)));
                }
                Directive::Else => {
                    if !nested {
                        return Err(ShaderError::directive("#else without matching #if", number));
                    }
                    return Ok((nodes, BlockEnd::Else));
                }
                Directive::Endif => {
                    if !nested {
                        return Err(ShaderError::directive("#endif without matching #if", number));
                    }
                    return Ok((nodes, BlockEnd::Endif));
                }
            };

            nodes.push(Node::Conditional(self.parse_chain(first_test, number)?));
        }

        Ok((nodes, BlockEnd::Eof))
    }

    fn parse_chain(&mut self, first: Expr, opened_at: usize) -> Result<Vec<Branch>, ShaderError> {
        let mut branches = Vec::new();
        let mut test = first;

        loop {
            let (children, end) = self.parse_block(true)?;
            branches.push(Branch { test: Some(test), children });
            match end {
                BlockEnd::Endif => return Ok(branches),
                BlockEnd::Elif(next) => test = next,
                BlockEnd::Else => {
                    let (children, end) = self.parse_block(true)?;
                    branches.push(Branch { test: None, children });
                    return match end {
                        BlockEnd::Endif => Ok(branches),
                        BlockEnd::Eof => Err(self.unterminated(opened_at)),
                        BlockEnd::Else | BlockEnd::Elif(_) => Err(ShaderError::directive(
                            format!("#else/#elif after #else (block opened at line {})", opened_at),
                            self.current_line_number(),
                        )),
                    };
                }
                BlockEnd::Eof => return Err(self.unterminated(opened_at)),
            }
        }
    }

    fn current_line_number(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.lines.get(i))
            .map_or(1, |(n, _)| *n)
    }

    fn unterminated(&self, opened_at: usize) -> ShaderError {
        ShaderError::directive(
            format!("conditional opened at line {} is missing #endif", opened_at),
            self.last_line_number(),
        )
    }
}

fn require_name(name: &str, directive: &str, line: usize) -> Result<String, ShaderError> {
    let name = name.split_whitespace().next().unwrap_or("");
    if name.is_empty() {
        return Err(ShaderError::directive(format!("{} requires a name", directive), line));
    }
    Ok(name.to_string())
}

// ── Tree ──────────────────────────────────────────────────────────────────

/// Parsed conditional structure of one (include-expanded) template.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalTree {
    root: Vec<Node>,
}

impl ConditionalTree {
    pub fn parse(src: &str) -> Result<Self, ShaderError> {
        let (root, _) = Builder::new(src).parse_block(false)?;
        Ok(Self { root })
    }

    /// Emits every surviving line followed by `\n`.
    ///
    /// Surviving `#define` lines are added to `defines` as they are emitted, so
    /// they affect conditionals further down the same pass.
    pub fn evaluate(&self, defines: &mut Defines) -> String {
        let mut out = String::new();
        emit(&self.root, defines, &mut out);
        out
    }
}

fn emit(nodes: &[Node], defines: &mut Defines, out: &mut String) {
    for node in nodes {
        match node {
            Node::Line(line) => {
                out.push_str(&line.text);
                out.push('\n');
                if let Some((name, value)) = &line.define {
                    let value = value.clone().unwrap_or_else(|| "true".to_string());
                    defines.insert(name.clone(), value);
                }
            }
            Node::Conditional(branches) => {
                let taken = branches
                    .iter()
                    .find(|b| b.test.as_ref().is_none_or(|t| t.evaluate(defines)));
                if let Some(branch) = taken {
                    emit(&branch.children, defines, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str, defines: &[&str]) -> String {
        ConditionalTree::parse(src).unwrap().evaluate(&mut Defines::from_list(defines))
    }

    #[test]
    fn ifdef_else() {
        let src = "#ifdef FOO\nA\n#else\nB\n#endif";
        assert_eq!(run(src, &["FOO"]), "A\n");
        assert_eq!(run(src, &[]), "B\n");
    }

    #[test]
    fn ifndef() {
        assert_eq!(run("#ifndef FOO\nA\n#endif\nC", &[]), "A\nC\n");
        assert_eq!(run("#ifndef FOO\nA\n#endif\nC", &["FOO"]), "C\n");
    }

    #[test]
    fn elif_chain_first_true_wins() {
        let src = "#if N > 2\nbig\n#elif N > 0\nsmall\n#else\nnone\n#endif";
        assert_eq!(run(src, &["N 3"]), "big\n");
        assert_eq!(run(src, &["N 1"]), "small\n");
        assert_eq!(run(src, &["N 0"]), "none\n");
    }

    #[test]
    fn no_true_branch_yields_nothing() {
        assert_eq!(run("#if defined(A)\nx\n#elif defined(B)\ny\n#endif", &[]), "");
    }

    #[test]
    fn nested_conditionals() {
        let src = "#ifdef A\n#ifdef B\nab\n#else\na\n#endif\n#endif";
        assert_eq!(run(src, &["A", "B"]), "ab\n");
        assert_eq!(run(src, &["A"]), "a\n");
        assert_eq!(run(src, &["B"]), "");
    }

    #[test]
    fn inline_define_affects_later_tests() {
        let src = "#define LATE\n#ifdef LATE\nyes\n#endif";
        assert_eq!(run(src, &[]), "#define LATE\nyes\n");
    }

    #[test]
    fn define_inside_excluded_branch_is_ignored() {
        let src = "#ifdef NOPE\n#define LATE\n#endif\n#ifdef LATE\nyes\n#endif";
        assert_eq!(run(src, &[]), "");
    }

    #[test]
    fn blank_lines_dropped_and_lines_trimmed() {
        assert_eq!(run("  a  \n\n\r\n\tb", &[]), "a\nb\n");
    }

    #[test]
    fn tree_is_reusable() {
        let tree = ConditionalTree::parse("#ifdef X\nx\n#endif").unwrap();
        assert_eq!(tree.evaluate(&mut Defines::from_list(&["X"])), "x\n");
        assert_eq!(tree.evaluate(&mut Defines::new()), "");
    }

    #[test]
    fn unbalanced_directives_are_errors() {
        assert!(ConditionalTree::parse("#ifdef A\nx").is_err());
        assert!(ConditionalTree::parse("#endif").is_err());
        assert!(ConditionalTree::parse("#else").is_err());
        assert!(ConditionalTree::parse("#ifdef A\n#else\n#else\n#endif").is_err());
        assert!(ConditionalTree::parse("#ifdef\n#endif").is_err());
    }

    #[test]
    fn error_reports_line() {
        let err = ConditionalTree::parse("a\nb\n#if (A\n#endif").unwrap_err();
        assert_eq!(err.line, 3);
    }
}
