//! Pratt parser rule table.

use super::scanner::TokenKind;

/// Binding power, lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // ()
    Primary,
}

impl Precedence {
    /// The next-higher level. Binary operators parse their right operand at
    /// this level, which makes them left-associative.
    pub fn next(self) -> Self {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call | Precedence::Primary => Precedence::Primary,
        }
    }
}

/// The parse functions a rule can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFn {
    Grouping,
    Call,
    Unary,
    Binary,
    Variable,
    String,
    Number,
    Literal,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseRule {
    pub prefix: Option<ParseFn>,
    pub infix: Option<ParseFn>,
    pub precedence: Precedence,
}

impl ParseRule {
    const fn new(prefix: Option<ParseFn>, infix: Option<ParseFn>, precedence: Precedence) -> Self {
        Self {
            prefix,
            infix,
            precedence,
        }
    }
}

pub fn rule(kind: TokenKind) -> ParseRule {
    use ParseFn as F;
    use Precedence as P;

    match kind {
        TokenKind::LeftParen => ParseRule::new(Some(F::Grouping), Some(F::Call), P::Call),
        TokenKind::Minus => ParseRule::new(Some(F::Unary), Some(F::Binary), P::Term),
        TokenKind::Plus => ParseRule::new(None, Some(F::Binary), P::Term),
        TokenKind::Slash | TokenKind::Star => ParseRule::new(None, Some(F::Binary), P::Factor),
        TokenKind::Bang => ParseRule::new(Some(F::Unary), None, P::None),
        TokenKind::BangEqual | TokenKind::EqualEqual => {
            ParseRule::new(None, Some(F::Binary), P::Equality)
        }
        TokenKind::Greater
        | TokenKind::GreaterEqual
        | TokenKind::Less
        | TokenKind::LessEqual => ParseRule::new(None, Some(F::Binary), P::Comparison),
        TokenKind::Identifier => ParseRule::new(Some(F::Variable), None, P::None),
        TokenKind::String => ParseRule::new(Some(F::String), None, P::None),
        TokenKind::Number => ParseRule::new(Some(F::Number), None, P::None),
        TokenKind::And => ParseRule::new(None, Some(F::And), P::And),
        TokenKind::Or => ParseRule::new(None, Some(F::Or), P::Or),
        TokenKind::False | TokenKind::Nil | TokenKind::True => {
            ParseRule::new(Some(F::Literal), None, P::None)
        }
        _ => ParseRule::new(None, None, P::None),
    }
}
