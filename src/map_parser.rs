use std::collections::HashMap;

use crate::ast::{Expr, Op, Token};
use crate::lexer::Lexer;
use crate::parser::{parse_expr, Cursor, Grammar, ParseError};
use crate::query::Cardinality;

/// A parsed map file: which form to open, where the data lives, and how
/// the tables relate.
#[derive(Debug, Clone, PartialEq)]
pub struct MapModel {
    /// Form file named by the `StartUpForm` block.
    pub startup_form: String,
    pub database: Option<DatabaseInfo>,
    /// Relation declarations: owning table, then joined table.
    pub relations: HashMap<String, HashMap<String, RelationDecl>>,
}

impl MapModel {
    /// True when the map names a database whose schema must be fetched.
    pub fn has_schema_definition(&self) -> bool {
        self.database.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    pub provider: String,
    pub source: String,
}

/// One relation clause of a table block.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDecl {
    pub cardinality: Cardinality,
    pub join: String,
    pub from: RelationJoin,
    pub to: RelationJoin,
}

/// One side of an `on` clause: a table and its join columns.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationJoin {
    pub table: String,
    pub fields: Vec<String>,
}

/// Parse a map file.
///
/// ```text
/// StartUpForm: patients.vis
/// --------------------------
/// Database: pgsql
/// Source: "schema.json"
/// --------------------------
/// Table: Patient
/// Activity: many, join Activity on Patient.patientID = Activity.patientID
/// --------------------------
/// ```
///
/// The first block must be `StartUpForm`; the `Database`/`Source` block is
/// optional; any number of `Table` blocks follow.
pub fn parse_map(source: &str) -> Result<MapModel, ParseError> {
    let mut cur = Cursor::new(Lexer::new(source))?;
    cur.skip_eols()?;

    if key_name(&cur) != Some("StartUpForm") {
        return Err(ParseError::MissingHeader);
    }
    cur.advance()?;
    cur.expect_op(Op::Colon)?;
    let startup_form = parse_file_name(&mut cur)?;
    cur.expect_eol()?;
    end_block(&mut cur)?;

    let mut database = None;
    if key_name(&cur) == Some("Database") {
        cur.advance()?;
        cur.expect_op(Op::Colon)?;
        let provider = parse_word(&mut cur)?;
        cur.expect_eol()?;

        expect_key(&mut cur, "Source")?;
        cur.expect_op(Op::Colon)?;
        let source = parse_file_name(&mut cur)?;
        cur.expect_eol()?;
        end_block(&mut cur)?;

        database = Some(DatabaseInfo { provider, source });
    }

    let mut relations: HashMap<String, HashMap<String, RelationDecl>> = HashMap::new();
    while !cur.at_eof() {
        expect_key(&mut cur, "Table")?;
        cur.expect_op(Op::Colon)?;
        let table = parse_word(&mut cur)?;
        cur.expect_eol()?;
        cur.skip_eols()?;

        let entry = relations.entry(table.clone()).or_default();
        while !cur.at_separator() && !cur.at_eof() {
            let relation = parse_relation(&mut cur)?;
            entry.insert(relation.join.clone(), relation);
            cur.expect_eol()?;
            cur.skip_eols()?;
        }
        end_block(&mut cur)?;
    }

    Ok(MapModel {
        startup_form,
        database,
        relations,
    })
}

/// `Activity: many, join Activity on Patient.patientID = Activity.patientID`
fn parse_relation(cur: &mut Cursor) -> Result<RelationDecl, ParseError> {
    parse_word(cur)?; // the joined entity, repeated after `join`
    cur.expect_op(Op::Colon)?;

    let cardinality = match parse_word(cur)?.as_str() {
        "one" => Cardinality::One,
        "many" => Cardinality::Many,
        other => {
            return Err(ParseError::ExpectedCardinality {
                found: other.to_string(),
            })
        }
    };

    cur.expect_punc(',')?;
    expect_key(cur, "join")?;
    let join = parse_word(cur)?;
    expect_key(cur, "on")?;

    let on = parse_expr(cur, Grammar::Map)?;
    let mut pairs = Vec::new();
    collect_equalities(&on, &mut pairs)?;

    let mut from: Option<RelationJoin> = None;
    let mut to: Option<RelationJoin> = None;
    for (left, right) in pairs {
        push_join_field(&mut from, left)?;
        push_join_field(&mut to, right)?;
    }
    let (Some(from), Some(to)) = (from, to) else {
        return Err(ParseError::ExpectedToken {
            expected: "join condition".to_string(),
            found: "nothing".to_string(),
        });
    };

    Ok(RelationDecl {
        cardinality,
        join,
        from,
        to,
    })
}

/// Flatten an `on` clause (`a.x = b.x & a.y = b.y`) into equality pairs.
fn collect_equalities<'a>(
    expr: &'a Expr,
    pairs: &mut Vec<(&'a Expr, &'a Expr)>,
) -> Result<(), ParseError> {
    match expr {
        Expr::Binary {
            op: Op::Amp,
            left,
            right,
        } => {
            collect_equalities(left, pairs)?;
            collect_equalities(right, pairs)
        }
        Expr::Binary {
            op: Op::Eq,
            left,
            right,
        } => {
            pairs.push((left, right));
            Ok(())
        }
        other => Err(ParseError::ExpectedToken {
            expected: "'table.field = table.field'".to_string(),
            found: format!("`{other}`"),
        }),
    }
}

/// Accumulate one `Table.field` reference into a join side, checking that
/// every pair names the same table.
fn push_join_field(side: &mut Option<RelationJoin>, expr: &Expr) -> Result<(), ParseError> {
    let Expr::Path(path) = expr else {
        return Err(malformed_join(expr));
    };
    let (Some(table), Some(field)) = (
        path.ident(),
        path.next.as_deref().and_then(|link| link.ident()),
    ) else {
        return Err(malformed_join(expr));
    };

    match side {
        None => {
            *side = Some(RelationJoin {
                table: table.to_string(),
                fields: vec![field.to_string()],
            });
        }
        Some(join) if join.table == table => join.fields.push(field.to_string()),
        Some(join) => {
            return Err(ParseError::ExpectedToken {
                expected: format!("a field of '{}'", join.table),
                found: format!("`{expr}`"),
            })
        }
    }
    Ok(())
}

fn malformed_join(expr: &Expr) -> ParseError {
    ParseError::ExpectedToken {
        expected: "'table.field' reference".to_string(),
        found: format!("`{expr}`"),
    }
}

fn key_name(cur: &Cursor) -> Option<&str> {
    match cur.current() {
        Token::Id(name) => Some(name),
        _ => None,
    }
}

fn expect_key(cur: &mut Cursor, key: &str) -> Result<(), ParseError> {
    if key_name(cur) == Some(key) {
        cur.advance()
    } else {
        Err(ParseError::ExpectedKeyword {
            keyword: key.to_string(),
            found: cur.current().describe(),
        })
    }
}

/// A single identifier or string.
fn parse_word(cur: &mut Cursor) -> Result<String, ParseError> {
    match cur.take()? {
        Token::Id(name) | Token::Str(name) => Ok(name),
        token => Err(ParseError::ExpectedToken {
            expected: "identifier".to_string(),
            found: token.describe(),
        }),
    }
}

/// A file name: a quoted string, or dotted identifiers (`patients.vis`).
fn parse_file_name(cur: &mut Cursor) -> Result<String, ParseError> {
    let mut name = parse_word(cur)?;
    while cur.check_punc('.') {
        cur.advance()?;
        name.push('.');
        name.push_str(&parse_word(cur)?);
    }
    Ok(name)
}

/// Consume the separator ending a block, plus surrounding blank lines.
fn end_block(cur: &mut Cursor) -> Result<(), ParseError> {
    cur.skip_eols()?;
    if cur.at_separator() {
        cur.advance()?;
    }
    cur.skip_eols()
}
