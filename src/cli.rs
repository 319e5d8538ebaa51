//! Command implementations behind the `cli` feature.

use std::io;
use std::path::Path;

use thiserror::Error;

use crate::ast::Token;
use crate::compiler::{self, Compiler};
use crate::form_parser::parse_form;
use crate::lexer::{LexError, Lexer};
use crate::output::{component_to_json, component_to_json_pretty};
use crate::parser::ParseError;
use crate::provider::FsResourceProvider;
use crate::registry::TypeRegistry;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] compiler::Error),

    #[error("no form given and stdin is a terminal")]
    MissingInput,

    #[error("'{path}' is not a file path")]
    InvalidPath { path: String },
}

/// Parse a form file and summarize what it declares.
pub fn check_form(source: &str, name: &str) -> Result<String, CliError> {
    let registry = TypeRegistry::with_builtins();
    let form = parse_form(source, name, &registry)?;
    let bound = form
        .templates
        .iter()
        .filter(|t| t.borrow().rows.is_some())
        .count();
    let root_name = form.root.borrow().name.clone().unwrap_or_default();
    Ok(format!(
        "{} template(s), {} data-bound, root '{}'",
        form.templates.len(),
        bound,
        root_name
    ))
}

/// Dump the token stream of a source file, one token per line.
pub fn list_tokens(source: &str) -> Result<String, CliError> {
    let mut lexer = Lexer::new(source);
    let mut out = String::new();
    loop {
        let token = lexer.next_token()?;
        if token == Token::Eof {
            break;
        }
        out.push_str(&token.describe());
        out.push('\n');
    }
    Ok(out)
}

/// Bind a map's startup form and print the SQL of every data-bound
/// template.
pub fn print_sql(map_path: &Path) -> Result<String, CliError> {
    let (provider, name) = provider_for(map_path)?;
    let compiler = Compiler::new(provider);
    let compilation = compiler.bind_form(&name)?;

    let mut out = String::new();
    for (template, sql) in compiler.statements(&compilation)? {
        out.push_str(&format!("-- {template}\n{sql};\n"));
    }
    Ok(out)
}

/// Compile a map end to end and return the component tree as JSON.
pub fn run(map_path: &Path, data_dir: Option<&Path>, pretty: bool) -> Result<String, CliError> {
    let (mut provider, name) = provider_for(map_path)?;
    if let Some(dir) = data_dir {
        provider = provider.with_data_dir(dir);
    }
    let compiler = Compiler::new(provider);
    let component = compiler.run(&name)?;
    Ok(if pretty {
        component_to_json_pretty(&component)
    } else {
        component_to_json(&component)
    })
}

/// A filesystem provider rooted next to the map file.
fn provider_for(map_path: &Path) -> Result<(FsResourceProvider, String), CliError> {
    let name = map_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CliError::InvalidPath {
            path: map_path.display().to_string(),
        })?;
    let root = map_path.parent().filter(|p| !p.as_os_str().is_empty());
    let provider = FsResourceProvider::new(root.unwrap_or_else(|| Path::new(".")));
    Ok((provider, name))
}
