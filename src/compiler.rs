use std::collections::HashMap;

use thiserror::Error;

use crate::binder::{bind, BindError};
use crate::evaluator::{Component, EvalError, Evaluator};
use crate::form_parser::parse_form;
use crate::map_parser::{parse_map, MapModel};
use crate::parser::ParseError;
use crate::provider::{Request, ResourceProvider, TransportError};
use crate::registry::TypeRegistry;
use crate::schema::{build_entity_schemas, EntitySchema, SchemaDoc, SchemaError};
use crate::template::FormModel;
use crate::translator::{translate, TranslateError};
use crate::value::Value;

/// Any failure of the compile pipeline, stage by stage.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A map and form compiled up to (and including) binding.
pub struct Compilation {
    pub map: MapModel,
    pub schemas: HashMap<String, EntitySchema>,
    pub form: FormModel,
}

/// Drives the pipeline: fetch and parse the map, fetch the schema, fetch
/// and parse the startup form, bind, translate, fetch data, evaluate.
pub struct Compiler<P> {
    provider: P,
    registry: TypeRegistry,
}

impl<P: ResourceProvider> Compiler<P> {
    pub fn new(provider: P) -> Compiler<P> {
        Compiler {
            provider,
            registry: TypeRegistry::with_builtins(),
        }
    }

    pub fn with_registry(provider: P, registry: TypeRegistry) -> Compiler<P> {
        Compiler { provider, registry }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Compile up to binding: after this, every data-bound template holds
    /// its query descriptor and the template tree is wired.
    pub fn bind_form(&self, map_name: &str) -> Result<Compilation, Error> {
        let map_text = self
            .provider
            .fetch(Request::MapFile { name: map_name })?
            .into_text()?;
        let map = parse_map(&map_text)?;

        let mut schemas = HashMap::new();
        if let Some(database) = &map.database {
            let schema_text = self
                .provider
                .fetch(Request::DataSchema {
                    source: &database.source,
                })?
                .into_text()?;
            let doc: SchemaDoc =
                serde_json::from_str(&schema_text).map_err(TransportError::from)?;
            schemas = build_entity_schemas(&map, &doc)?;
        }

        let form_text = self
            .provider
            .fetch(Request::FormFile {
                name: &map.startup_form,
            })?
            .into_text()?;
        let form = parse_form(&form_text, &map.startup_form, &self.registry)?;

        bind(&form, &schemas, &self.registry)?;
        Ok(Compilation { map, schemas, form })
    }

    /// The SQL statement of every data-bound template, paired with the
    /// template's name.
    pub fn statements(&self, compilation: &Compilation) -> Result<Vec<(String, String)>, Error> {
        let mut statements = Vec::new();
        for template in &compilation.form.templates {
            let t = template.borrow();
            if let Some(query) = &t.query {
                let name = t.name.clone().unwrap_or_else(|| t.component_type.clone());
                statements.push((name, translate(query)?));
            }
        }
        Ok(statements)
    }

    /// Run the whole pipeline and return the evaluated component tree.
    pub fn run(&self, map_name: &str) -> Result<Component, Error> {
        let compilation = self.bind_form(map_name)?;
        self.fetch_data(&compilation)?;
        let evaluator = Evaluator::new(&compilation.form, &self.registry);
        Ok(evaluator.evaluate_tree()?)
    }

    /// Translate each bound query and install the fetched rows on its
    /// template.
    pub fn fetch_data(&self, compilation: &Compilation) -> Result<(), Error> {
        let source = compilation
            .map
            .database
            .as_ref()
            .map(|db| db.source.as_str())
            .unwrap_or_default();

        for template in &compilation.form.templates {
            let fetched = {
                let t = template.borrow();
                let Some(query) = &t.query else { continue };
                let sql = translate(query)?;
                let rows = self
                    .provider
                    .fetch(Request::Query {
                        source,
                        relation: &query.name,
                        sql: &sql,
                    })?
                    .into_rows()?;
                (
                    query.name.clone(),
                    rows.iter().map(Value::from_json).collect::<Vec<_>>(),
                )
            };
            let (name, rows) = fetched;
            template.borrow_mut().data.insert(name, rows);
        }
        Ok(())
    }
}
