// tests/lexer_tests.rs

use chrono::NaiveDate;
use visform::ast::{Op, Token};
use visform::lexer::{LexError, Lexer};

fn tokens(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut out = Vec::new();
    loop {
        let token = lexer.next_token().expect("lex error");
        if token == Token::Eof {
            return out;
        }
        out.push(token);
    }
}

// ============================================================================
// Basic token kinds
// ============================================================================

#[test]
fn test_property_line() {
    assert_eq!(
        tokens("A: 1 + 2--\n"),
        vec![
            Token::Id("A".to_string()),
            Token::Op(Op::Colon),
            Token::Num(1.0),
            Token::Op(Op::Plus),
            Token::Num(2.0),
            Token::Separator,
        ]
    );
}

#[test]
fn test_numbers() {
    assert_eq!(tokens("42"), vec![Token::Num(42.0)]);
    assert_eq!(tokens("3.14"), vec![Token::Num(3.14)]);
    // a second dot ends the number and starts punctuation
    assert_eq!(
        tokens("1.2.3"),
        vec![Token::Num(1.2), Token::Punc('.'), Token::Num(3.0)]
    );
}

#[test]
fn test_strings() {
    assert_eq!(
        tokens(r#""hello world""#),
        vec![Token::Str("hello world".to_string())]
    );
    assert_eq!(
        tokens(r#""a \"quoted\" word""#),
        vec![Token::Str("a \"quoted\" word".to_string())]
    );
}

#[test]
fn test_unterminated_string() {
    let mut lexer = Lexer::new("\"oops");
    assert!(matches!(
        lexer.next_token(),
        Err(LexError::UnterminatedString { .. })
    ));
}

#[test]
fn test_identifiers_and_where() {
    assert_eq!(
        tokens("Rows WHERE ward2"),
        vec![
            Token::Id("Rows".to_string()),
            Token::Op(Op::Where),
            Token::Id("ward2".to_string()),
        ]
    );
}

#[test]
fn test_punctuation() {
    assert_eq!(
        tokens("a[0].b!c"),
        vec![
            Token::Id("a".to_string()),
            Token::Punc('['),
            Token::Num(0.0),
            Token::Punc(']'),
            Token::Punc('.'),
            Token::Id("b".to_string()),
            Token::Punc('!'),
            Token::Id("c".to_string()),
        ]
    );
}

// ============================================================================
// Operators and separators
// ============================================================================

#[test]
fn test_relation_operators() {
    assert_eq!(
        tokens("a -< b >- c"),
        vec![
            Token::Id("a".to_string()),
            Token::Op(Op::ExpandMany),
            Token::Id("b".to_string()),
            Token::Op(Op::ExpandOne),
            Token::Id("c".to_string()),
        ]
    );
}

#[test]
fn test_comparison_operators() {
    assert_eq!(
        tokens("a <= b >= c == d != e"),
        vec![
            Token::Id("a".to_string()),
            Token::Op(Op::LtEq),
            Token::Id("b".to_string()),
            Token::Op(Op::GtEq),
            Token::Id("c".to_string()),
            Token::Op(Op::EqEq),
            Token::Id("d".to_string()),
            Token::Op(Op::NotEq),
            Token::Id("e".to_string()),
        ]
    );
}

#[test]
fn test_separator_consumes_its_line() {
    // anything after the dashes is part of the separator line
    assert_eq!(
        tokens("a\n---- end of block ----\nb"),
        vec![
            Token::Id("a".to_string()),
            Token::Eol,
            Token::Separator,
            Token::Id("b".to_string()),
        ]
    );
}

#[test]
fn test_unknown_operator() {
    let mut lexer = Lexer::new("a <> b");
    lexer.next_token().unwrap();
    assert!(matches!(
        lexer.next_token(),
        Err(LexError::UnknownOperator { op, .. }) if op == "<>"
    ));
}

#[test]
fn test_unexpected_character_reports_position() {
    let mut lexer = Lexer::new("ok\n  ?");
    lexer.next_token().unwrap();
    lexer.next_token().unwrap();
    match lexer.next_token() {
        Err(LexError::UnexpectedChar { ch, line, column }) => {
            assert_eq!(ch, '?');
            assert_eq!(line, 2);
            assert_eq!(column, 3);
        }
        other => panic!("expected UnexpectedChar, got {:?}", other),
    }
}

// ============================================================================
// Comments and line structure
// ============================================================================

#[test]
fn test_comment_swallows_the_newline() {
    // the comment runs through the end of its line, newline included
    assert_eq!(
        tokens("a ' ignore this\nb"),
        vec![Token::Id("a".to_string()), Token::Id("b".to_string())]
    );
}

#[test]
fn test_newlines_are_significant() {
    assert_eq!(
        tokens("a\n\nb"),
        vec![
            Token::Id("a".to_string()),
            Token::Eol,
            Token::Eol,
            Token::Id("b".to_string()),
        ]
    );
}

// ============================================================================
// Datetime literals
// ============================================================================

#[test]
fn test_full_datetime() {
    let expected = NaiveDate::from_ymd_opt(2019, 12, 24)
        .unwrap()
        .and_hms_opt(18, 30, 0)
        .unwrap();
    assert_eq!(
        tokens("#24-12-2019 18:30:00#"),
        vec![Token::Datetime(expected)]
    );
}

#[test]
fn test_date_only_is_midnight() {
    let expected = NaiveDate::from_ymd_opt(2019, 12, 24)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    assert_eq!(tokens("#24-12-2019#"), vec![Token::Datetime(expected)]);
}

#[test]
fn test_time_only_uses_the_epoch_date() {
    let expected = NaiveDate::from_ymd_opt(1970, 1, 1)
        .unwrap()
        .and_hms_opt(18, 30, 0)
        .unwrap();
    assert_eq!(tokens("#18:30:00#"), vec![Token::Datetime(expected)]);
}

#[test]
fn test_invalid_datetime_is_an_error() {
    let mut lexer = Lexer::new("#not a date#");
    assert!(matches!(
        lexer.next_token(),
        Err(LexError::InvalidDatetime { .. })
    ));
}

#[test]
fn test_invalid_datetime_with_epoch_fallback() {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let mut lexer = Lexer::new("#not a date#").with_epoch_fallback(true);
    assert_eq!(lexer.next_token().unwrap(), Token::Datetime(epoch));
}
