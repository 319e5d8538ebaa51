use crate::schema::{EntitySchema, ForeignKey};
use crate::value::Value;

/// How many rows of a related entity one parent row expands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Comparison operator of a row filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Lt,
    Gt,
}

impl CompareOp {
    pub fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
        }
    }
}

/// A `WHERE` clause attached to one record set of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub resource: String,
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

/// Relational query descriptor built up by the binder.
///
/// One `Query` describes the record set of one entity: which columns the
/// form actually reads (`properties`), the key columns needed to stitch
/// rows together, and at most one nested record set reached through a
/// relation (`expand`). The chain mirrors the template tree: the root
/// template owns the root query, each `-<` or `>-` bound below it extends
/// the chain by one link.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub name: String,
    pub cardinality: Cardinality,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    /// Columns referenced by property formulas, in first-use order.
    pub properties: Vec<String>,
    pub filter: Option<Filter>,
    pub expand: Option<Box<Query>>,
}

impl Query {
    /// A fresh record set for `schema`, with no columns selected yet.
    pub fn from_schema(schema: &EntitySchema, cardinality: Cardinality) -> Query {
        Query {
            name: schema.name.clone(),
            cardinality,
            primary_key: schema.primary_key.clone(),
            foreign_keys: schema.foreign_keys.clone(),
            properties: Vec::new(),
            filter: None,
            expand: None,
        }
    }

    /// Find the record set for `resource` in this chain.
    pub fn record_set_mut(&mut self, resource: &str) -> Option<&mut Query> {
        if self.name == resource {
            return Some(self);
        }
        self.expand.as_deref_mut()?.record_set_mut(resource)
    }

    /// Record that a formula reads `field`, once.
    pub fn push_property(&mut self, field: &str) {
        if !self.properties.iter().any(|p| p == field) {
            self.properties.push(field.to_string());
        }
    }

    /// The last record set of the expand chain.
    pub fn deepest_mut(&mut self) -> &mut Query {
        let mut current = self;
        loop {
            match current.expand {
                Some(ref mut next) => current = next,
                None => return current,
            }
        }
    }
}
