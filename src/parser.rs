use std::mem;

use thiserror::Error;

use crate::ast::{Expr, Namespace, Op, PathExpr, Token};
use crate::lexer::{LexError, Lexer};

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("unexpected {found}")]
    UnexpectedToken { found: String },

    #[error("expected {expected}, got {found}")]
    ExpectedToken { expected: String, found: String },

    #[error("'{key}' is not a property of component type '{component_type}'")]
    UnknownProperty { key: String, component_type: String },

    #[error("template block {number} names no component type")]
    MissingComponentType { number: usize },

    #[error("the name of a '{component_type}' template must be a plain identifier or string")]
    InvalidTemplateName { component_type: String },

    #[error("expected cardinality 'one' or 'many', got {found}")]
    ExpectedCardinality { found: String },

    #[error("expected keyword '{keyword}', got {found}")]
    ExpectedKeyword { keyword: String, found: String },

    #[error("map file must start with a StartUpForm block")]
    MissingHeader,
}

/// Which surface language is being parsed.
///
/// Both share one expression grammar but rank the operators differently:
/// the map language treats `:` and `&` as low-precedence pair separators
/// inside relation clauses, the form language does not parse them as binary
/// operators at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    Map,
    Form,
}

impl Grammar {
    /// Binding power of `op`, or `None` when the operator is not infix in
    /// this grammar (which ends the enclosing expression).
    fn precedence(&self, op: Op) -> Option<u8> {
        Some(match (self, op) {
            (Grammar::Map, Op::Colon | Op::Amp) => 1,
            (Grammar::Map, Op::Where) => 2,
            (Grammar::Map, Op::ExpandMany | Op::ExpandOne) => 3,

            (Grammar::Form, Op::Where) => 1,
            (Grammar::Form, Op::ExpandMany | Op::ExpandOne) => 2,

            (
                _,
                Op::Eq | Op::Lt | Op::Gt | Op::LtEq | Op::GtEq | Op::EqEq | Op::NotEq,
            ) => 7,
            (_, Op::Plus | Op::Minus) => 10,
            (_, Op::Star | Op::Slash | Op::Percent) => 20,

            _ => return None,
        })
    }
}

/// Token cursor shared by the map and form parsers.
///
/// Holds the current token; `advance` pulls the next one from the lexer.
pub struct Cursor {
    lexer: Lexer,
    current: Token,
}

impl Cursor {
    pub fn new(mut lexer: Lexer) -> Result<Self, ParseError> {
        let current = lexer.next_token()?;
        Ok(Cursor { lexer, current })
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn advance(&mut self) -> Result<(), ParseError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    /// Take ownership of the current token and advance past it.
    pub fn take(&mut self) -> Result<Token, ParseError> {
        let token = mem::replace(&mut self.current, self.lexer.next_token()?);
        Ok(token)
    }

    pub fn check_punc(&self, ch: char) -> bool {
        self.current == Token::Punc(ch)
    }

    pub fn check_op(&self, op: Op) -> bool {
        self.current == Token::Op(op)
    }

    pub fn expect_punc(&mut self, ch: char) -> Result<(), ParseError> {
        if self.check_punc(ch) {
            self.advance()
        } else {
            Err(self.expected(&format!("'{ch}'")))
        }
    }

    pub fn expect_op(&mut self, op: Op) -> Result<(), ParseError> {
        if self.check_op(op) {
            self.advance()
        } else {
            Err(self.expected(&format!("'{op}'")))
        }
    }

    /// Consume the end of a line. End of input counts: the last line of a
    /// file needs no trailing newline.
    pub fn expect_eol(&mut self) -> Result<(), ParseError> {
        match self.current {
            Token::Eol => self.advance(),
            Token::Eof => Ok(()),
            _ => Err(self.expected("end of line")),
        }
    }

    /// Skip blank lines.
    pub fn skip_eols(&mut self) -> Result<(), ParseError> {
        while self.current == Token::Eol {
            self.advance()?;
        }
        Ok(())
    }

    pub fn at_separator(&self) -> bool {
        self.current == Token::Separator
    }

    pub fn at_eof(&self) -> bool {
        self.current == Token::Eof
    }

    pub fn expected(&self, expected: &str) -> ParseError {
        ParseError::ExpectedToken {
            expected: expected.to_string(),
            found: self.current.describe(),
        }
    }
}

/// Parse one formula expression. The expression ends at the first token
/// that is not part of it (end of line, separator, closing punctuation, or
/// an operator the grammar does not rank).
pub fn parse_expr(cur: &mut Cursor, grammar: Grammar) -> Result<Expr, ParseError> {
    let left = parse_operand(cur, grammar)?;
    maybe_binary(cur, grammar, left, 0)
}

/// An operand: an atom, possibly extended into a reference chain.
fn parse_operand(cur: &mut Cursor, grammar: Grammar) -> Result<Expr, ParseError> {
    let atom = parse_atom(cur)?;
    maybe_path(cur, grammar, atom)
}

fn parse_atom(cur: &mut Cursor) -> Result<Expr, ParseError> {
    match cur.take()? {
        Token::Num(n) => Ok(Expr::Num(n)),
        Token::Str(s) => Ok(Expr::Str(s)),
        Token::Id(name) => Ok(Expr::Id(name)),
        Token::Datetime(dt) => Ok(Expr::Datetime(dt)),
        token => Err(ParseError::UnexpectedToken {
            found: token.describe(),
        }),
    }
}

/// Operator-precedence climbing, one recursion level per operator consumed.
///
/// While the current token is an infix operator binding tighter than
/// `my_prec`, consume it, parse its right operand at the operator's own
/// level, and fold the result into `left`.
fn maybe_binary(
    cur: &mut Cursor,
    grammar: Grammar,
    left: Expr,
    my_prec: u8,
) -> Result<Expr, ParseError> {
    if let Token::Op(op) = *cur.current() {
        if let Some(his_prec) = grammar.precedence(op) {
            if his_prec > my_prec {
                cur.advance()?;
                let operand = parse_operand(cur, grammar)?;
                let right = maybe_binary(cur, grammar, operand, his_prec)?;
                let combined = Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                };
                return maybe_binary(cur, grammar, combined, my_prec);
            }
        }
    }
    Ok(left)
}

/// Extend an atom into a path if a `.` or `!` follows it.
///
/// The head identifier fixes the namespace of the whole chain; nested links
/// are tagged [`Namespace::Local`]. Any link may carry a bracketed subscript
/// (`Map.Patient[index - 1].name`), parsed as a full expression.
fn maybe_path(cur: &mut Cursor, grammar: Grammar, head: Expr) -> Result<Expr, ParseError> {
    if !cur.check_punc('.') && !cur.check_punc('!') {
        return Ok(head);
    }

    let route = match &head {
        Expr::Id(name) => Namespace::of(name),
        _ => Namespace::Local,
    };

    let mut links: Vec<(Expr, Option<Expr>)> = Vec::new();
    while cur.check_punc('.') || cur.check_punc('!') {
        cur.advance()?;
        let content = parse_atom(cur)?;
        let index = if cur.check_punc('[') {
            cur.advance()?;
            let index = parse_expr(cur, grammar)?;
            cur.expect_punc(']')?;
            Some(index)
        } else {
            None
        };
        links.push((content, index));
    }

    let mut chain: Option<Box<PathExpr>> = None;
    for (content, index) in links.into_iter().rev() {
        chain = Some(Box::new(PathExpr {
            route: Namespace::Local,
            content: Box::new(content),
            index: index.map(Box::new),
            next: chain,
        }));
    }

    Ok(Expr::Path(PathExpr {
        route,
        content: Box::new(head),
        index: None,
        next: chain,
    }))
}
