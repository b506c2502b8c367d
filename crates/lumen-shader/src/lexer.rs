use crate::error::ShaderError;

// ── Token ─────────────────────────────────────────────────────────────────

/// Comparison operator usable in `#if` expressions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Number(i64),
    /// The `defined` keyword.
    Defined,
    LParen,
    RParen,
    And,
    Or,
    Not,
    Cmp(CmpOp),
}

// ── Lexer ─────────────────────────────────────────────────────────────────

/// Tokenizer for a single `#if` / `#elif` expression.
///
/// `line` is only used to anchor errors.
pub struct Lexer<'s> {
    src: &'s str,
    pos: usize,
    line: usize,
}

impl<'s> Lexer<'s> {
    pub fn new(src: &'s str, line: usize) -> Self {
        Self { src, pos: 0, line }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, ShaderError> {
        let mut tokens = Vec::new();
        while let Some(tok) = self.next_token()? {
            tokens.push(tok);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.src[self.pos..].chars().next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn rest(&self) -> &str {
        &self.src[self.pos..]
    }

    fn err(&self, msg: impl Into<String>) -> ShaderError {
        ShaderError::expression(msg, self.line)
    }

    fn next_token(&mut self) -> Result<Option<Token>, ShaderError> {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }

        // Trailing `//` comments end the expression.
        if self.rest().starts_with("//") {
            self.pos = self.src.len();
        }

        let ch = match self.peek() {
            None => return Ok(None),
            Some(c) => c,
        };

        let two = self.rest().get(..2).unwrap_or("");
        let tok = match two {
            "&&" => Some(Token::And),
            "||" => Some(Token::Or),
            "==" => Some(Token::Cmp(CmpOp::Eq)),
            "!=" => Some(Token::Cmp(CmpOp::Ne)),
            ">=" => Some(Token::Cmp(CmpOp::Ge)),
            "<=" => Some(Token::Cmp(CmpOp::Le)),
            _ => None,
        };
        if let Some(tok) = tok {
            self.pos += 2;
            return Ok(Some(tok));
        }

        let tok = match ch {
            '(' => { self.advance(); Token::LParen }
            ')' => { self.advance(); Token::RParen }
            '!' => { self.advance(); Token::Not }
            '>' => { self.advance(); Token::Cmp(CmpOp::Gt) }
            '<' => { self.advance(); Token::Cmp(CmpOp::Lt) }
            c if c.is_ascii_digit() || c == '-' => self.lex_number()?,
            c if c.is_alphabetic() || c == '_' => self.lex_ident_or_keyword(),
            other => return Err(self.err(format!("unexpected character {:?} in expression", other))),
        };
        Ok(Some(tok))
    }

    fn lex_number(&mut self) -> Result<Token, ShaderError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.advance();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '.') {
            self.advance();
        }
        let s = &self.src[start..self.pos];
        parse_int_prefix(s)
            .map(Token::Number)
            .ok_or_else(|| self.err(format!("invalid number {:?}", s)))
    }

    fn lex_ident_or_keyword(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.advance();
        }
        let word = &self.src[start..self.pos];
        match word {
            "defined" => Token::Defined,
            _ => Token::Ident(word.to_string()),
        }
    }
}

/// Parses the leading integer of `s` (`"12"`, `"-3"`, `"4.5"` -> 4, `"7u"` -> 7).
///
/// Returns `None` when `s` does not start with a digit (after an optional sign).
pub fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim();
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(digits.len(), |(i, _)| i);
    if end == 0 {
        return None;
    }
    let value: i64 = digits[..end].parse().ok()?;
    Some(if neg { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Lexer::new(src, 1).tokenize().unwrap()
    }

    #[test]
    fn operators_and_names() {
        assert_eq!(
            lex("defined(A) && !B || C >= 2"),
            vec![
                Token::Defined,
                Token::LParen,
                Token::Ident("A".into()),
                Token::RParen,
                Token::And,
                Token::Not,
                Token::Ident("B".into()),
                Token::Or,
                Token::Ident("C".into()),
                Token::Cmp(CmpOp::Ge),
                Token::Number(2),
            ]
        );
    }

    #[test]
    fn trailing_comment_is_ignored() {
        assert_eq!(lex("A // unused"), vec![Token::Ident("A".into())]);
    }

    #[test]
    fn unknown_character_is_an_error() {
        assert!(Lexer::new("A & B", 3).tokenize().is_err());
    }

    #[test]
    fn int_prefix_follows_parse_int_rules() {
        assert_eq!(parse_int_prefix("12"), Some(12));
        assert_eq!(parse_int_prefix("-3"), Some(-3));
        assert_eq!(parse_int_prefix("4.5"), Some(4));
        assert_eq!(parse_int_prefix("true"), None);
        assert_eq!(parse_int_prefix(""), None);
    }
}
