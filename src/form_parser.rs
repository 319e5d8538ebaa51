use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Expr, Formula, Op, Token};
use crate::lexer::Lexer;
use crate::parser::{parse_expr, Cursor, Grammar, ParseError};
use crate::registry::TypeRegistry;
use crate::template::{FormModel, Template, TemplateRef};

const ROOT_TYPE: &str = "Canvas";
const ROOT_WIDTH: f64 = 640.0;
const ROOT_HEIGHT: f64 = 480.0;

/// Parse a form file into its template list.
///
/// A form is a sequence of blocks separated by dash lines. The first block
/// may be a *header* (no component type, only `Name`, `Width`, `Height`)
/// describing the root canvas; when it is missing, a default root is
/// synthesized with the file's name. Every other block must name its
/// component type:
///
/// ```text
/// Name: Patients
/// Width: 800
/// --------------------------
/// TextBox: PatientData
/// Rows: Map.Patient
/// Text: Map.Patient.name
/// --------------------------
/// ```
///
/// The key equal to the block's component type carries the template's
/// display name; `Rows` binds the template to data; every other key must
/// be a property the registry knows for that type.
pub fn parse_form(
    source: &str,
    file_name: &str,
    registry: &TypeRegistry,
) -> Result<FormModel, ParseError> {
    let mut blocks = parse_blocks(source)?;

    let header = match blocks.first() {
        Some(lines) if type_key(lines, registry).is_none() => Some(blocks.remove(0)),
        _ => None,
    };
    let root = build_root(header, file_name)?;

    let mut templates = vec![Rc::clone(&root)];
    for (number, lines) in blocks.into_iter().enumerate() {
        let Some(component_type) = type_key(&lines, registry) else {
            // block 1 is the header slot, user blocks count from 2
            return Err(ParseError::MissingComponentType { number: number + 2 });
        };
        templates.push(build_template(lines, &component_type, registry)?);
    }

    Ok(FormModel { templates, root })
}

/// Split the source into blocks of `key: formula` lines.
fn parse_blocks(source: &str) -> Result<Vec<Vec<(String, Expr)>>, ParseError> {
    let mut cur = Cursor::new(Lexer::new(source))?;
    let mut blocks = Vec::new();

    cur.skip_eols()?;
    while !cur.at_eof() {
        let mut lines = Vec::new();
        while !cur.at_separator() && !cur.at_eof() {
            let key = match cur.take()? {
                Token::Id(name) => name,
                token => {
                    return Err(ParseError::ExpectedToken {
                        expected: "property name".to_string(),
                        found: token.describe(),
                    })
                }
            };
            cur.expect_op(Op::Colon)?;
            let expr = parse_expr(&mut cur, Grammar::Form)?;
            cur.expect_eol()?;
            cur.skip_eols()?;
            lines.push((key, expr));
        }
        if cur.at_separator() {
            cur.advance()?;
        }
        cur.skip_eols()?;
        if !lines.is_empty() {
            blocks.push(lines);
        }
    }

    Ok(blocks)
}

/// The component type declared by a block: its last key that names a
/// registered type.
fn type_key(lines: &[(String, Expr)], registry: &TypeRegistry) -> Option<String> {
    lines
        .iter()
        .rev()
        .find(|(key, _)| registry.contains(key))
        .map(|(key, _)| key.clone())
}

fn build_root(
    header: Option<Vec<(String, Expr)>>,
    file_name: &str,
) -> Result<TemplateRef, ParseError> {
    let mut name = None;
    let mut width = None;
    let mut height = None;

    for (key, expr) in header.unwrap_or_default() {
        match key.as_str() {
            "Name" => name = Some(literal_name(&expr, ROOT_TYPE)?),
            "Width" => width = Some(expr),
            "Height" => height = Some(expr),
            _ => {
                return Err(ParseError::UnknownProperty {
                    key,
                    component_type: ROOT_TYPE.to_string(),
                })
            }
        }
    }

    let mut root = Template::new(ROOT_TYPE);
    root.name = Some(name.unwrap_or_else(|| file_name.to_string()));
    root.properties.push((
        "Width".to_string(),
        Rc::new(Formula::new(width.unwrap_or(Expr::Num(ROOT_WIDTH)))),
    ));
    root.properties.push((
        "Height".to_string(),
        Rc::new(Formula::new(height.unwrap_or(Expr::Num(ROOT_HEIGHT)))),
    ));
    Ok(Rc::new(RefCell::new(root)))
}

fn build_template(
    lines: Vec<(String, Expr)>,
    component_type: &str,
    registry: &TypeRegistry,
) -> Result<TemplateRef, ParseError> {
    let mut template = Template::new(component_type);

    for (key, expr) in lines {
        if key == component_type {
            template.name = Some(literal_name(&expr, component_type)?);
        } else if key == "Rows" {
            template.rows = Some(Rc::new(Formula::new(expr)));
        } else if registry.inspect(false, component_type, &key).is_some() {
            template.properties.push((key, Rc::new(Formula::new(expr))));
        } else {
            return Err(ParseError::UnknownProperty {
                key,
                component_type: component_type.to_string(),
            });
        }
    }

    Ok(Rc::new(RefCell::new(template)))
}

/// A template name must be a bare identifier or a string literal.
fn literal_name(expr: &Expr, component_type: &str) -> Result<String, ParseError> {
    match expr {
        Expr::Id(name) | Expr::Str(name) => Ok(name.clone()),
        _ => Err(ParseError::InvalidTemplateName {
            component_type: component_type.to_string(),
        }),
    }
}
