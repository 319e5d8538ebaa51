pub mod ast;
pub mod binder;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compiler;
pub mod evaluator;
pub mod form_parser;
pub mod lexer;
pub mod map_parser;
pub mod output;
pub mod parser;
pub mod path;
pub mod provider;
pub mod query;
pub mod registry;
pub mod schema;
pub mod template;
pub mod translator;
pub mod value;

pub use ast::{Expr, Formula, Namespace, Op, PathExpr, Token};
pub use binder::{bind, BindError};
pub use compiler::{Compilation, Compiler};
pub use evaluator::{Component, EvalError, Evaluator};
pub use form_parser::parse_form;
pub use lexer::{LexError, Lexer};
pub use map_parser::{parse_map, MapModel};
pub use output::{component_to_json, component_to_json_pretty, to_json, to_json_pretty};
pub use parser::{Grammar, ParseError};
pub use provider::{FsResourceProvider, Request, Resource, ResourceProvider, TransportError};
pub use query::{Cardinality, CompareOp, Filter, Query};
pub use registry::{ComponentType, PropertyDescriptor, PropertyKind, RegistryError, TypeRegistry};
pub use schema::{build_entity_schemas, EntitySchema, SchemaDoc, SchemaError};
pub use template::{FormModel, Template, TemplateRef};
pub use translator::{translate, TranslateError};
pub use value::Value;
