use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use crate::ast::{Op, Token};

/// Accepted datetime literal formats, tried in order.
const DATETIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";
const DATE_FORMAT: &str = "%d-%m-%Y";
const TIME_FORMAT: &str = "%H:%M:%S";

const OP_CHARS: &str = ":+-*/%=&|<>";
const PUNC_CHARS: &str = "!,;(){}[].";

/// Errors raised while tokenizing source text. All are fatal: the run is
/// aborted with the offending character and position.
#[derive(Debug, Clone, Error)]
pub enum LexError {
    #[error("can't handle character '{ch}' at line {line}, column {column}")]
    UnexpectedChar { ch: char, line: usize, column: usize },

    #[error("unterminated string literal starting at line {line}, column {column}")]
    UnterminatedString { line: usize, column: usize },

    #[error("unknown operator '{op}' at line {line}, column {column}")]
    UnknownOperator {
        op: String,
        line: usize,
        column: usize,
    },

    #[error("invalid datetime literal '#{text}#' at line {line}, column {column}")]
    InvalidDatetime {
        text: String,
        line: usize,
        column: usize,
    },

    #[error("invalid number literal '{text}' at line {line}, column {column}")]
    InvalidNumber {
        text: String,
        line: usize,
        column: usize,
    },
}

/// Hand-written tokenizer for the map and form languages.
///
/// Single-token lookahead: [`peek_token`](Lexer::peek_token) is idempotent,
/// [`next_token`](Lexer::next_token) consumes. The stream ends with
/// [`Token::Eof`].
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    peeked: Option<Token>,
    epoch_fallback: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            peeked: None,
            epoch_fallback: false,
        }
    }

    /// Restore the historical behavior of substituting the epoch for an
    /// unparseable datetime literal instead of raising a lex error.
    pub fn with_epoch_fallback(mut self, enabled: bool) -> Self {
        self.epoch_fallback = enabled;
        self
    }

    fn current_char(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn advance(&mut self) {
        if self.current_char() == Some('\n') {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.position += 1;
    }

    fn skip_whitespace(&mut self) {
        // newline is significant, only space and tab are skipped
        while let Some(ch) = self.current_char() {
            if ch == ' ' || ch == '\t' || ch == '\r' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        // a comment is discarded including its trailing newline
        while let Some(ch) = self.current_char() {
            self.advance();
            if ch == '\n' {
                break;
            }
        }
    }

    fn read_while(&mut self, mut predicate: impl FnMut(char) -> bool) -> String {
        let mut result = String::new();
        while let Some(ch) = self.current_char() {
            if predicate(ch) {
                result.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        result
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let mut has_dot = false;
        let number = self.read_while(|ch| {
            if ch == '.' {
                if has_dot {
                    return false;
                }
                has_dot = true;
                return true;
            }
            ch.is_ascii_digit()
        });

        match number.trim_end_matches('.').parse::<f64>() {
            Ok(n) => Ok(Token::Num(n)),
            Err(_) => Err(LexError::InvalidNumber {
                text: number,
                line,
                column,
            }),
        }
    }

    fn read_ident(&mut self) -> Token {
        let id = self.read_while(|ch| ch.is_ascii_alphanumeric());
        if id == "WHERE" {
            Token::Op(Op::Where)
        } else {
            Token::Id(id)
        }
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote
        let mut result = String::new();
        let mut escaped = false;
        while let Some(ch) = self.current_char() {
            self.advance();
            if escaped {
                result.push(ch);
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                return Ok(Token::Str(result));
            } else {
                result.push(ch);
            }
        }
        Err(LexError::UnterminatedString { line, column })
    }

    fn read_datetime(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening hash
        let text = self.read_while(|ch| ch != '#' && ch != '\n');
        if self.current_char() == Some('#') {
            self.advance();
        }

        match parse_datetime(&text) {
            Some(dt) => Ok(Token::Datetime(dt)),
            None if self.epoch_fallback => Ok(Token::Datetime(epoch())),
            None => Err(LexError::InvalidDatetime { text, line, column }),
        }
    }

    fn read_operator(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let run = self.read_while(|ch| OP_CHARS.contains(ch));

        // a run of two or more dashes is a block separator consuming the
        // rest of its line, newline included
        if run.starts_with("--") {
            while let Some(ch) = self.current_char() {
                self.advance();
                if ch == '\n' {
                    break;
                }
            }
            return Ok(Token::Separator);
        }

        match Op::from_symbol(&run) {
            Some(op) => Ok(Token::Op(op)),
            None => Err(LexError::UnknownOperator {
                op: run,
                line,
                column,
            }),
        }
    }

    fn read_next(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let Some(ch) = self.current_char() else {
            return Ok(Token::Eof);
        };

        if ch == '\'' {
            self.skip_comment();
            return self.read_next();
        }
        if ch == '\n' {
            self.advance();
            return Ok(Token::Eol);
        }
        if ch == '#' {
            return self.read_datetime();
        }
        if ch == '"' {
            return self.read_string();
        }
        if ch.is_ascii_digit() {
            return self.read_number();
        }
        if ch.is_ascii_alphabetic() {
            return Ok(self.read_ident());
        }
        if OP_CHARS.contains(ch) {
            return self.read_operator();
        }
        if PUNC_CHARS.contains(ch) {
            self.advance();
            // `!` doubles as the path join and the first half of `!=`
            if ch == '!' && self.current_char() == Some('=') {
                self.advance();
                return Ok(Token::Op(Op::NotEq));
            }
            return Ok(Token::Punc(ch));
        }

        Err(LexError::UnexpectedChar {
            ch,
            line: self.line,
            column: self.column,
        })
    }

    /// Consume and return the next token.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }
        self.read_next()
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Token, LexError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.read_next()?);
        }
        Ok(self.peeked.clone().unwrap_or(Token::Eof))
    }

    /// True when the stream is exhausted.
    pub fn eof(&mut self) -> Result<bool, LexError> {
        Ok(self.peek_token()? == Token::Eof)
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT) {
        return Some(dt);
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, DATE_FORMAT) {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(time) = NaiveTime::parse_from_str(text, TIME_FORMAT) {
        return Some(NaiveDate::from_ymd_opt(1970, 1, 1)?.and_time(time));
    }
    None
}

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("epoch is a valid datetime")
}

#[test]
fn test_property_line() {
    let mut lexer = Lexer::new("A: 1 + 2--\n");
    assert_eq!(lexer.next_token().unwrap(), Token::Id("A".to_string()));
    assert_eq!(lexer.next_token().unwrap(), Token::Op(Op::Colon));
    assert_eq!(lexer.next_token().unwrap(), Token::Num(1.0));
    assert_eq!(lexer.next_token().unwrap(), Token::Op(Op::Plus));
    assert_eq!(lexer.next_token().unwrap(), Token::Num(2.0));
    assert_eq!(lexer.next_token().unwrap(), Token::Separator);
    assert_eq!(lexer.next_token().unwrap(), Token::Eof);
}

#[test]
fn test_relation_operators() {
    let mut lexer = Lexer::new("a -< b >- c");
    assert_eq!(lexer.next_token().unwrap(), Token::Id("a".to_string()));
    assert_eq!(lexer.next_token().unwrap(), Token::Op(Op::ExpandMany));
    assert_eq!(lexer.next_token().unwrap(), Token::Id("b".to_string()));
    assert_eq!(lexer.next_token().unwrap(), Token::Op(Op::ExpandOne));
    assert_eq!(lexer.next_token().unwrap(), Token::Id("c".to_string()));
}

#[test]
fn test_peek_is_idempotent() {
    let mut lexer = Lexer::new("x");
    assert_eq!(lexer.peek_token().unwrap(), Token::Id("x".to_string()));
    assert_eq!(lexer.peek_token().unwrap(), Token::Id("x".to_string()));
    assert_eq!(lexer.next_token().unwrap(), Token::Id("x".to_string()));
    assert!(lexer.eof().unwrap());
}
