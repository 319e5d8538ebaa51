use chrono::NaiveDateTime;

use crate::ast::Op;

/// Lexical token of the formula languages.
///
/// Both the map and the form grammar consume the same token stream. Line
/// structure is significant: a newline produces [`Token::Eol`] (it terminates
/// a property line), and a line of dashes produces [`Token::Separator`]
/// (it terminates a template or table block).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Number literal
    ///
    /// # Examples
    /// ```text
    /// 42
    /// 3.14
    /// ```
    Num(f64),

    /// String literal in double quotes, backslash-escaped
    ///
    /// # Examples
    /// ```text
    /// "hello"
    /// "a \"quoted\" word"
    /// ```
    Str(String),

    /// Identifier (letters followed by letters or digits)
    ///
    /// The reserved word `WHERE` is an operator, not an identifier.
    Id(String),

    /// Datetime literal delimited by hashes
    ///
    /// # Examples
    /// ```text
    /// #24-12-2019 18:30:00#
    /// #24-12-2019#
    /// #18:30:00#
    /// ```
    Datetime(NaiveDateTime),

    /// Operator (`: + - * / % = & | < > -< >- WHERE`)
    Op(Op),

    /// Punctuation (`! , ; ( ) { } [ ] .`)
    Punc(char),

    /// End of line (significant: terminates a formula)
    Eol,

    /// Block separator: a line of dashes ending one template/table block
    Separator,

    /// End of input
    Eof,
}

impl Token {
    /// Short description used in parse diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Token::Num(n) => format!("number `{n}`"),
            Token::Str(s) => format!("string \"{s}\""),
            Token::Id(name) => format!("identifier `{name}`"),
            Token::Datetime(dt) => format!("datetime `{dt}`"),
            Token::Op(op) => format!("operator `{op}`"),
            Token::Punc(ch) => format!("punctuation `{ch}`"),
            Token::Eol => "end of line".to_string(),
            Token::Separator => "block separator".to_string(),
            Token::Eof => "end of input".to_string(),
        }
    }
}
