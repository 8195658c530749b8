/// Expression tree and precedence-climbing parser.
use std::fmt;
use thiserror::Error;

use super::lexer::{self, LexError, Token, TokenKind};
use crate::schema::value::TYPE_NAMES;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("empty expression")]
    Empty,
    #[error("unexpected '{found}' at byte {at}")]
    Unexpected { found: String, at: usize },
    #[error("expression ended early, expected {expected}")]
    UnexpectedEnd { expected: &'static str },
}

/// One possessive step of a property path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// `'s length`
    Length,
    /// 1-based position (`1st`, `3`); zero never matches.
    Nth(usize),
    /// `'s last`
    Last,
    /// Datamap key.
    Key(String),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length => write!(f, "length"),
            Self::Nth(n) => write!(f, "{n}{}", ordinal_suffix(*n)),
            Self::Last => write!(f, "last"),
            Self::Key(key) => write!(f, "{key}"),
        }
    }
}

fn ordinal_suffix(n: usize) -> &'static str {
    match (n % 10, n % 100) {
        (1, r) if r != 11 => "st",
        (2, r) if r != 12 => "nd",
        (3, r) if r != 13 => "rd",
        _ => "th",
    }
}

/// `7th` -> 7. Any number followed by its proper suffix.
fn parse_ordinal(word: &str) -> Option<usize> {
    let digits = word.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let n: usize = digits.parse().ok()?;
    (word[digits.len()..] == *ordinal_suffix(n)).then_some(n)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    IsA,
    IsNotA,
    Matches,
    DoesNotMatch,
    DoesNotContain,
    IsIn,
    IsNot,
    Is,
    Contains,
    Ge,
    Le,
    Gt,
    Lt,
    Of,
    Add,
    Sub,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::IsA => "is a",
            Self::IsNotA => "is not a",
            Self::Matches => "matches",
            Self::DoesNotMatch => "does not match",
            Self::DoesNotContain => "does not contain",
            Self::IsIn => "is in",
            Self::IsNot => "is not",
            Self::Is => "is",
            Self::Contains => "contains",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Of => "of",
            Self::Add => "+",
            Self::Sub => "-",
        }
    }

    fn prec(self) -> Prec {
        match self {
            Self::IsA | Self::IsNotA => Prec::TypeTest,
            Self::Matches | Self::DoesNotMatch => Prec::Match,
            Self::DoesNotContain => Prec::DoesNotContain,
            Self::IsIn => Prec::IsIn,
            Self::IsNot => Prec::IsNot,
            Self::Is => Prec::Is,
            Self::Contains => Prec::Contains,
            Self::Ge | Self::Le | Self::Gt | Self::Lt => Prec::Compare,
            Self::Of => Prec::Of,
            Self::Add => Prec::Add,
            Self::Sub => Prec::Sub,
        }
    }

    /// Operators whose right side may be a bare datatype name.
    fn takes_type_name(self) -> bool {
        matches!(
            self,
            Self::IsA | Self::IsNotA | Self::Matches | Self::DoesNotMatch
        )
    }
}

/// Binding levels, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    And,
    Or,
    TypeTest,
    Match,
    DoesNotContain,
    IsIn,
    IsNot,
    Is,
    Contains,
    Compare,
    Of,
    Add,
    Sub,
    Unary,
}

impl Prec {
    fn tighter(self) -> Prec {
        match self {
            Prec::And => Prec::Or,
            Prec::Or => Prec::TypeTest,
            Prec::TypeTest => Prec::Match,
            Prec::Match => Prec::DoesNotContain,
            Prec::DoesNotContain => Prec::IsIn,
            Prec::IsIn => Prec::IsNot,
            Prec::IsNot => Prec::Is,
            Prec::Is => Prec::Contains,
            Prec::Contains => Prec::Compare,
            Prec::Compare => Prec::Of,
            Prec::Of => Prec::Add,
            Prec::Add => Prec::Sub,
            Prec::Sub | Prec::Unary => Prec::Unary,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Variable(String),
    /// `visits`: visit count of the current passage.
    Visits,
    /// `it`: only meaningful inside an assignment.
    It,
    /// Bare datatype name after a type test.
    TypeName(String),
    /// Identifier with no meaning of its own.
    Word(String),
    Macro {
        name: String,
        body: String,
        raw: String,
    },
    Property {
        base: Box<Expr>,
        segments: Vec<Segment>,
    },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

const RESERVED: [&str; 10] = [
    "and", "or", "not", "is", "contains", "matches", "does", "of", "to", "into",
];

/// Parse an expression string into a tree.
pub fn parse(source: &str) -> Result<Expr, ParseError> {
    let tokens = lexer::tokenize(source)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_level(Prec::And)?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(parser.unexpected(token)),
    }
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_word(&self, offset: usize) -> Option<&str> {
        match self.tokens.get(self.pos + offset).map(|t| &t.kind) {
            Some(TokenKind::Word(w)) => Some(w.as_str()),
            _ => None,
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, token: &Token) -> ParseError {
        ParseError::Unexpected {
            found: self.source[token.start..token.end].to_string(),
            at: token.start,
        }
    }

    /// The binary operator at the cursor and how many tokens spell it.
    fn peek_operator(&self) -> Option<(BinaryOp, usize)> {
        let kind = &self.peek()?.kind;
        let op = match kind {
            TokenKind::Plus => (BinaryOp::Add, 1),
            TokenKind::Minus => (BinaryOp::Sub, 1),
            TokenKind::Ge => (BinaryOp::Ge, 1),
            TokenKind::Le => (BinaryOp::Le, 1),
            TokenKind::Gt => (BinaryOp::Gt, 1),
            TokenKind::Lt => (BinaryOp::Lt, 1),
            TokenKind::EqEq => (BinaryOp::Is, 1),
            TokenKind::Word(w) => match w.as_str() {
                "is" => match (self.peek_word(1), self.peek_word(2)) {
                    (Some("not"), Some("a" | "an")) => (BinaryOp::IsNotA, 3),
                    (Some("not"), _) => (BinaryOp::IsNot, 2),
                    (Some("a" | "an"), _) => (BinaryOp::IsA, 2),
                    (Some("in"), _) => (BinaryOp::IsIn, 2),
                    _ => (BinaryOp::Is, 1),
                },
                "does" => match (self.peek_word(1), self.peek_word(2)) {
                    (Some("not"), Some("match")) => (BinaryOp::DoesNotMatch, 3),
                    (Some("not"), Some("contain")) => (BinaryOp::DoesNotContain, 3),
                    _ => return None,
                },
                "matches" => (BinaryOp::Matches, 1),
                "contains" => (BinaryOp::Contains, 1),
                "of" => (BinaryOp::Of, 1),
                _ => return None,
            },
            _ => return None,
        };
        Some(op)
    }

    fn parse_level(&mut self, level: Prec) -> Result<Expr, ParseError> {
        // `not` negates everything it can reach at the level it opens.
        if self.peek_word(0) == Some("not") {
            self.pos += 1;
            let operand = self.parse_level(level)?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        match level {
            Prec::And => self.parse_chain(level, "and", Expr::And),
            Prec::Or => self.parse_chain(level, "or", Expr::Or),
            Prec::Unary => self.parse_unary(),
            _ => self.parse_binary(level),
        }
    }

    fn parse_chain(
        &mut self,
        level: Prec,
        word: &str,
        build: fn(Vec<Expr>) -> Expr,
    ) -> Result<Expr, ParseError> {
        let mut operands = vec![self.parse_level(level.tighter())?];
        while self.peek_word(0) == Some(word) {
            self.pos += 1;
            operands.push(self.parse_level(level.tighter())?);
        }
        Ok(if operands.len() == 1 {
            operands.remove(0)
        } else {
            build(operands)
        })
    }

    fn parse_binary(&mut self, level: Prec) -> Result<Expr, ParseError> {
        let mut left = self.parse_level(level.tighter())?;
        while let Some((op, width)) = self.peek_operator() {
            if op.prec() != level {
                break;
            }
            self.pos += width;
            let right = match self.peek_word(0) {
                Some(name) if op.takes_type_name() && TYPE_NAMES.contains(&name) => {
                    let name = name.to_string();
                    self.pos += 1;
                    Expr::TypeName(name)
                }
                _ => self.parse_level(level.tighter())?,
            };
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Minus)) {
            self.pos += 1;
            return Ok(match self.parse_unary()? {
                Expr::Number(n) => Expr::Number(-n),
                other => Expr::Neg(Box::new(other)),
            });
        }
        let primary = self.parse_primary()?;
        self.parse_possessives(primary)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.next().ok_or(ParseError::UnexpectedEnd {
            expected: "a value",
        })?;
        let expr = match token.kind {
            TokenKind::Number(n) => Expr::Number(n),
            TokenKind::Str(ref s) => Expr::Str(s.clone()),
            TokenKind::Variable(ref name) => Expr::Variable(name.clone()),
            TokenKind::Macro { ref name, ref body } => Expr::Macro {
                name: name.clone(),
                body: body.clone(),
                raw: self.source[token.start..token.end].to_string(),
            },
            TokenKind::Word(ref w) => match w.as_str() {
                "true" => Expr::Bool(true),
                "false" => Expr::Bool(false),
                "visits" | "visit" => Expr::Visits,
                "it" => Expr::It,
                w if RESERVED.contains(&w) => return Err(self.unexpected(&token)),
                w => Expr::Word(w.to_string()),
            },
            TokenKind::LParen => {
                let inner = self.parse_level(Prec::And)?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => inner,
                    Some(other) => return Err(self.unexpected(&other)),
                    None => {
                        return Err(ParseError::UnexpectedEnd {
                            expected: "')'",
                        })
                    }
                }
            }
            _ => return Err(self.unexpected(&token)),
        };
        Ok(expr)
    }

    fn parse_possessives(&mut self, base: Expr) -> Result<Expr, ParseError> {
        let mut segments = Vec::new();
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Possessive)) {
            self.pos += 1;
            let token = self.next().ok_or(ParseError::UnexpectedEnd {
                expected: "a property name",
            })?;
            let segment = match &token.kind {
                TokenKind::Word(w) if w == "length" => Segment::Length,
                TokenKind::Word(w) if w == "last" => Segment::Last,
                TokenKind::Word(w) => match parse_ordinal(w) {
                    Some(n) => Segment::Nth(n),
                    None => Segment::Key(w.clone()),
                },
                TokenKind::Number(n) if n.fract() == 0.0 && *n >= 0.0 => Segment::Nth(*n as usize),
                TokenKind::Str(s) => Segment::Key(s.clone()),
                _ => return Err(self.unexpected(&token)),
            };
            segments.push(segment);
        }
        Ok(if segments.is_empty() {
            base
        } else {
            Expr::Property {
                base: Box::new(base),
                segments,
            }
        })
    }
}
