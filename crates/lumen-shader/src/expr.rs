//! `#if` expression parsing and evaluation.
//!
//! Parsing runs in three steps:
//! 1. tokenize (see [`crate::lexer`]),
//! 2. fold leaf forms (`defined(X)`, `X == 3`, bare names/numbers) into operands
//!    and convert the infix stream to postfix with a fixed-size operator stack,
//! 3. build an [`Expr`] tree from the postfix sequence.

use crate::defines::Defines;
use crate::error::ShaderError;
use crate::lexer::{parse_int_prefix, CmpOp, Lexer, Token};

/// Capacity of the infix-to-postfix operator stack.
pub const OPERATOR_STACK_SIZE: usize = 20;

// ── Tree ──────────────────────────────────────────────────────────────────

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Name(String),
    Number(i64),
}

/// Boolean expression tree evaluated against a [`Defines`] map.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Defined(String),
    Literal(bool),
    Compare { left: Operand, op: CmpOp, right: Operand },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parses the text following `#if` / `#elif`.
    pub fn parse(src: &str, line: usize) -> Result<Expr, ShaderError> {
        let tokens = Lexer::new(src, line).tokenize()?;
        if tokens.is_empty() {
            return Err(ShaderError::expression("empty expression", line));
        }
        let items = fold_operands(tokens, line)?;
        let postfix = infix_to_postfix(items, line)?;
        build_tree(postfix, line)
    }

    pub fn evaluate(&self, defines: &Defines) -> bool {
        match self {
            Expr::Defined(name) => defines.is_defined(name),
            Expr::Literal(v) => *v,
            Expr::Compare { left, op, right } => compare(left, *op, right, defines),
            Expr::Not(inner) => !inner.evaluate(defines),
            Expr::And(a, b) => a.evaluate(defines) && b.evaluate(defines),
            Expr::Or(a, b) => a.evaluate(defines) || b.evaluate(defines),
        }
    }
}

fn resolve(operand: &Operand, defines: &Defines) -> Option<i64> {
    match operand {
        Operand::Number(n) => Some(*n),
        Operand::Name(name) => match defines.value(name) {
            Some(value) => parse_int_prefix(value),
            None => parse_int_prefix(name),
        },
    }
}

/// Non-numeric sides only satisfy `!=`.
fn compare(left: &Operand, op: CmpOp, right: &Operand, defines: &Defines) -> bool {
    let (Some(l), Some(r)) = (resolve(left, defines), resolve(right, defines)) else {
        return op == CmpOp::Ne;
    };
    match op {
        CmpOp::Eq => l == r,
        CmpOp::Ne => l != r,
        CmpOp::Gt => l > r,
        CmpOp::Lt => l < r,
        CmpOp::Ge => l >= r,
        CmpOp::Le => l <= r,
    }
}

// ── Operand folding ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    LParen,
    Or,
    And,
    Not,
}

impl Op {
    fn priority(self) -> u8 {
        match self {
            Op::LParen => 1,
            Op::Or => 2,
            Op::And => 3,
            Op::Not => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Operand(Expr),
    Op(Op),
    RParen,
}

fn atom(tok: Option<Token>, line: usize) -> Result<Operand, ShaderError> {
    match tok {
        Some(Token::Ident(name)) => Ok(Operand::Name(name)),
        Some(Token::Number(n)) => Ok(Operand::Number(n)),
        other => Err(ShaderError::expression(
            format!("expected a name or number, got {:?}", other),
            line,
        )),
    }
}

fn fold_operands(tokens: Vec<Token>, line: usize) -> Result<Vec<Item>, ShaderError> {
    let mut items = Vec::with_capacity(tokens.len());
    let mut it = tokens.into_iter().peekable();

    while let Some(tok) = it.next() {
        match tok {
            Token::LParen => items.push(Item::Op(Op::LParen)),
            Token::RParen => items.push(Item::RParen),
            Token::And => items.push(Item::Op(Op::And)),
            Token::Or => items.push(Item::Op(Op::Or)),
            Token::Not => items.push(Item::Op(Op::Not)),
            Token::Defined => {
                // `defined(NAME)` or `defined NAME`
                let name = if it.peek() == Some(&Token::LParen) {
                    it.next();
                    let name = atom(it.next(), line)?;
                    if it.next() != Some(Token::RParen) {
                        return Err(ShaderError::expression("expected ')' after defined(NAME", line));
                    }
                    name
                } else {
                    atom(it.next(), line)?
                };
                let Operand::Name(name) = name else {
                    return Err(ShaderError::expression("defined() expects a name", line));
                };
                items.push(Item::Operand(Expr::Defined(name)));
            }
            Token::Ident(_) | Token::Number(_) => {
                let left = atom(Some(tok), line)?;
                if let Some(Token::Cmp(op)) = it.peek().cloned() {
                    it.next();
                    let right = atom(it.next(), line)?;
                    items.push(Item::Operand(Expr::Compare { left, op, right }));
                } else {
                    items.push(Item::Operand(match left {
                        Operand::Name(name) => Expr::Defined(name),
                        Operand::Number(n) => Expr::Literal(n != 0),
                    }));
                }
            }
            Token::Cmp(op) => {
                return Err(ShaderError::expression(
                    format!("comparison '{}' is missing its left side", op.as_str()),
                    line,
                ));
            }
        }
    }

    Ok(items)
}

// ── Infix → postfix ───────────────────────────────────────────────────────

/// Fixed-capacity operator stack; overflowing it is a parse error.
struct OperatorStack {
    slots: [Op; OPERATOR_STACK_SIZE],
    len: usize,
}

impl OperatorStack {
    fn new() -> Self {
        Self { slots: [Op::LParen; OPERATOR_STACK_SIZE], len: 0 }
    }

    fn push(&mut self, op: Op, line: usize) -> Result<(), ShaderError> {
        if self.len == OPERATOR_STACK_SIZE {
            return Err(ShaderError::expression(
                format!("expression nests deeper than {} operators", OPERATOR_STACK_SIZE),
                line,
            ));
        }
        self.slots[self.len] = op;
        self.len += 1;
        Ok(())
    }

    fn peek(&self) -> Option<Op> {
        self.len.checked_sub(1).map(|i| self.slots[i])
    }

    fn pop(&mut self) -> Option<Op> {
        let op = self.peek()?;
        self.len -= 1;
        Some(op)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Postfix {
    Operand(Expr),
    Op(Op),
}

fn infix_to_postfix(items: Vec<Item>, line: usize) -> Result<Vec<Postfix>, ShaderError> {
    let mut out = Vec::with_capacity(items.len());
    let mut stack = OperatorStack::new();
    // Alternates between "operand expected" and "binary operator expected".
    let mut expect_operand = true;

    for item in items {
        match item {
            Item::Operand(expr) => {
                if !expect_operand {
                    return Err(ShaderError::expression("missing operator between operands", line));
                }
                out.push(Postfix::Operand(expr));
                expect_operand = false;
            }
            Item::Op(op @ (Op::LParen | Op::Not)) => {
                if !expect_operand {
                    return Err(ShaderError::expression("missing operator before '(' or '!'", line));
                }
                stack.push(op, line)?;
            }
            Item::Op(op) => {
                if expect_operand {
                    return Err(ShaderError::expression("dangling '&&' or '||'", line));
                }
                while let Some(top) = stack.peek() {
                    if top.priority() < op.priority() {
                        break;
                    }
                    stack.pop();
                    out.push(Postfix::Op(top));
                }
                stack.push(op, line)?;
                expect_operand = true;
            }
            Item::RParen => {
                if expect_operand {
                    return Err(ShaderError::expression("empty parentheses or dangling operator", line));
                }
                loop {
                    match stack.pop() {
                        Some(Op::LParen) => break,
                        Some(op) => out.push(Postfix::Op(op)),
                        None => return Err(ShaderError::expression("unbalanced ')'", line)),
                    }
                }
            }
        }
    }

    if expect_operand {
        return Err(ShaderError::expression("expression ends with an operator", line));
    }

    while let Some(op) = stack.pop() {
        if op == Op::LParen {
            return Err(ShaderError::expression("unbalanced '('", line));
        }
        out.push(Postfix::Op(op));
    }

    Ok(out)
}

// ── Postfix → tree ────────────────────────────────────────────────────────

fn build_tree(postfix: Vec<Postfix>, line: usize) -> Result<Expr, ShaderError> {
    let mut stack: Vec<Expr> = Vec::new();
    let underflow = || ShaderError::expression("operator is missing an operand", line);

    for entry in postfix {
        match entry {
            Postfix::Operand(expr) => stack.push(expr),
            Postfix::Op(Op::Not) => {
                let inner = stack.pop().ok_or_else(underflow)?;
                stack.push(Expr::Not(Box::new(inner)));
            }
            Postfix::Op(op) => {
                let right = stack.pop().ok_or_else(underflow)?;
                let left = stack.pop().ok_or_else(underflow)?;
                stack.push(match op {
                    Op::And => Expr::And(Box::new(left), Box::new(right)),
                    _ => Expr::Or(Box::new(left), Box::new(right)),
                });
            }
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(expr), true) => Ok(expr),
        _ => Err(ShaderError::expression("malformed expression", line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str, defines: &[&str]) -> bool {
        Expr::parse(src, 1).unwrap().evaluate(&Defines::from_list(defines))
    }

    #[test]
    fn defined_and_not_defined() {
        assert!(eval("defined(A) && !defined(B)", &["A"]));
        assert!(!eval("defined(A) && !defined(B)", &["A", "B"]));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        // A || (B && C)
        assert!(eval("A || B && C", &["A"]));
        assert!(!eval("A || B && C", &["B"]));
        assert!(eval("A || B && C", &["B", "C"]));
    }

    #[test]
    fn parentheses_override_precedence() {
        assert!(!eval("(A || B) && C", &["A"]));
        assert!(eval("(A || B) && C", &["A", "C"]));
    }

    #[test]
    fn not_applies_to_groups() {
        assert!(eval("!(A && B)", &["A"]));
        assert!(!eval("!(A && B)", &["A", "B"]));
    }

    #[test]
    fn numeric_comparisons_use_define_values() {
        assert!(eval("NUM_LIGHTS > 2", &["NUM_LIGHTS 4"]));
        assert!(!eval("NUM_LIGHTS > 2", &["NUM_LIGHTS 1"]));
        assert!(eval("NUM_LIGHTS >= 4 && NUM_LIGHTS <= 4", &["NUM_LIGHTS 4"]));
        assert!(eval("__VERSION__ == 300", &["__VERSION__ 300"]));
    }

    #[test]
    fn undefined_or_non_numeric_sides_are_not_equal() {
        assert!(!eval("MISSING == 1", &[]));
        assert!(eval("MISSING != 1", &[]));
        assert!(!eval("FLAG > 0", &["FLAG"]));
    }

    #[test]
    fn bare_numbers_are_truthy_when_non_zero() {
        assert!(eval("1", &[]));
        assert!(!eval("0", &[]));
    }

    #[test]
    fn defined_without_parentheses() {
        assert!(eval("defined A", &["A"]));
    }

    #[test]
    fn malformed_expressions_are_errors() {
        for src in ["(A && B", "A && B)", "A &&", "&& A", "A B", "defined(", "()", "== 2"] {
            assert!(Expr::parse(src, 7).is_err(), "{src:?} should fail");
        }
    }

    #[test]
    fn operator_stack_overflow_is_reported() {
        let deep = format!("{}A{}", "(".repeat(OPERATOR_STACK_SIZE + 1), ")".repeat(OPERATOR_STACK_SIZE + 1));
        let err = Expr::parse(&deep, 2).unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn tree_shape() {
        let expr = Expr::parse("A || B && !C", 1).unwrap();
        assert_eq!(
            expr,
            Expr::Or(
                Box::new(Expr::Defined("A".into())),
                Box::new(Expr::And(
                    Box::new(Expr::Defined("B".into())),
                    Box::new(Expr::Not(Box::new(Expr::Defined("C".into())))),
                )),
            )
        );
    }
}
