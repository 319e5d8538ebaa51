use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::map_parser::MapModel;

#[derive(Debug, Clone, Error)]
pub enum SchemaError {
    #[error("schema document declares no schema for resource '{resource}'")]
    MissingSchema { resource: String },

    #[error("table '{table}' declares a relation to unknown resource '{joined}'")]
    UnknownRelationTarget { table: String, joined: String },

    #[error("relation between '{table}' and '{joined}' joins on neither of them")]
    MismatchedRelationJoin { table: String, joined: String },
}

/// The schema document published by the data source, as fetched.
///
/// ```json
/// {
///   "resources": [{ "name": "Patient" }],
///   "schemas": {
///     "Patient": {
///       "fields": [{ "name": "patientID", "type": "integer" }],
///       "primaryKey": ["patientID"]
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDoc {
    pub resources: Vec<ResourceDecl>,
    pub schemas: HashMap<String, SchemaDecl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResourceDecl {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDecl {
    pub fields: Vec<FieldDecl>,
    #[serde(rename = "primaryKey", default)]
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type", default)]
    pub field_type: String,
    #[serde(default)]
    pub description: String,
}

/// One column of an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: String,
    pub is_primary_key: bool,
}

/// The key of another entity that a foreign key points at.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyReference {
    pub resource: String,
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    /// Columns on the owning entity.
    pub fields: Vec<String>,
    pub reference: KeyReference,
}

/// An entity as the binder and the translator see it: the declared columns
/// merged with the foreign keys derived from the map's relation clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySchema {
    pub name: String,
    pub fields: Vec<Field>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl EntitySchema {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Combine the fetched schema document with the map's relation clauses into
/// one entity schema per resource.
///
/// A relation declared on table `T` joining `J` on `T.a = J.b` gives `J` a
/// foreign key `[b]` referencing `T.[a]`; the translator later matches that
/// key in either direction when it builds the join predicate.
pub fn build_entity_schemas(
    map: &MapModel,
    doc: &SchemaDoc,
) -> Result<HashMap<String, EntitySchema>, SchemaError> {
    let mut entities = HashMap::new();

    for resource in &doc.resources {
        let decl = doc
            .schemas
            .get(&resource.name)
            .ok_or_else(|| SchemaError::MissingSchema {
                resource: resource.name.clone(),
            })?;

        let fields = decl
            .fields
            .iter()
            .map(|f| Field {
                name: f.name.clone(),
                field_type: f.field_type.clone(),
                is_primary_key: decl.primary_key.contains(&f.name),
            })
            .collect();

        entities.insert(
            resource.name.clone(),
            EntitySchema {
                name: resource.name.clone(),
                fields,
                primary_key: decl.primary_key.clone(),
                foreign_keys: Vec::new(),
            },
        );
    }

    for (table, relations) in &map.relations {
        for (joined, relation) in relations {
            let (local, remote) = if &relation.to.table == joined {
                (&relation.to, &relation.from)
            } else if &relation.from.table == joined {
                (&relation.from, &relation.to)
            } else {
                return Err(SchemaError::MismatchedRelationJoin {
                    table: table.clone(),
                    joined: joined.clone(),
                });
            };

            let entity =
                entities
                    .get_mut(joined)
                    .ok_or_else(|| SchemaError::UnknownRelationTarget {
                        table: table.clone(),
                        joined: joined.clone(),
                    })?;

            entity.foreign_keys.push(ForeignKey {
                fields: local.fields.clone(),
                reference: KeyReference {
                    resource: table.clone(),
                    fields: remote.fields.clone(),
                },
            });
        }
    }

    Ok(entities)
}
