use thiserror::Error;

use crate::query::{Cardinality, Filter, Query};
use crate::value::Value;

#[derive(Debug, Clone, Error)]
pub enum TranslateError {
    #[error("no relation links '{parent}' to '{child}'")]
    MissingRelation { parent: String, child: String },
}

/// Translate a query descriptor into one PostgreSQL statement.
///
/// The root record set becomes a plain `SELECT`; each expanded record set
/// becomes a `LEFT JOIN` onto a subselect that folds the related rows into
/// JSON, so the whole tree comes back in a single round trip. A `many`
/// relation aggregates with `json_agg` grouped by the join key, a `one`
/// relation builds a single `json_build_object`. The evaluator then finds
/// each nested record set under its resource name inside the parent row.
pub fn translate(query: &Query) -> Result<String, TranslateError> {
    let mut sql = String::from("SELECT ");

    let columns = selected_columns(query);
    let mut select: Vec<String> = columns
        .iter()
        .map(|col| format!("{}.{}", query.name, col))
        .collect();

    let mut join = String::new();
    if let Some(child) = query.expand.as_deref() {
        select.push(format!("{}.fields AS \"{}\"", child.name, child.name));
        join = joined_subselect(query, child)?;
    }

    sql.push_str(&select.join(", "));
    sql.push_str(&format!(" FROM {}", query.name));
    sql.push_str(&join);
    if let Some(filter) = &query.filter {
        sql.push_str(&format!(" WHERE {}", filter_sql(filter)));
    }

    Ok(sql)
}

/// The columns a record set selects: every property the form reads plus
/// any primary key columns not already among them.
fn selected_columns(query: &Query) -> Vec<String> {
    let mut columns = query.properties.clone();
    for key in &query.primary_key {
        if !columns.contains(key) {
            columns.push(key.clone());
        }
    }
    columns
}

/// ` LEFT JOIN (SELECT ... ) AS child ON parent.a = child.a`
fn joined_subselect(parent: &Query, child: &Query) -> Result<String, TranslateError> {
    let (parent_fields, child_fields) = join_fields(parent, child)?;

    let mut pairs: Vec<String> = selected_columns(child)
        .iter()
        .map(|col| format!("'{col}', {}.{col}", child.name))
        .collect();

    let mut nested_join = String::new();
    if let Some(grandchild) = child.expand.as_deref() {
        pairs.push(format!("'{0}', {0}.fields", grandchild.name));
        nested_join = joined_subselect(child, grandchild)?;
    }

    let object = format!("json_build_object({})", pairs.join(", "));
    let aggregated = match child.cardinality {
        Cardinality::Many => format!("json_agg({object})"),
        Cardinality::One => object,
    };

    let join_columns: Vec<String> = child_fields
        .iter()
        .map(|field| format!("{}.{}", child.name, field))
        .collect();

    let mut sub = format!(
        "SELECT {}, {} AS fields FROM {}",
        join_columns.join(", "),
        aggregated,
        child.name
    );
    sub.push_str(&nested_join);
    if let Some(filter) = &child.filter {
        sub.push_str(&format!(" WHERE {}", filter_sql(filter)));
    }
    if child.cardinality == Cardinality::Many {
        sub.push_str(&format!(" GROUP BY {}", join_columns.join(", ")));
    }

    let on: Vec<String> = parent_fields
        .iter()
        .zip(&child_fields)
        .map(|(pf, cf)| format!("{}.{} = {}.{}", parent.name, pf, child.name, cf))
        .collect();

    Ok(format!(
        " LEFT JOIN ({}) AS {} ON {}",
        sub,
        child.name,
        on.join(" AND ")
    ))
}

/// The join columns linking a parent record set to an expanded one, taken
/// from whichever side declares the foreign key.
fn join_fields(parent: &Query, child: &Query) -> Result<(Vec<String>, Vec<String>), TranslateError> {
    if let Some(fk) = child
        .foreign_keys
        .iter()
        .find(|fk| fk.reference.resource == parent.name)
    {
        return Ok((fk.reference.fields.clone(), fk.fields.clone()));
    }
    if let Some(fk) = parent
        .foreign_keys
        .iter()
        .find(|fk| fk.reference.resource == child.name)
    {
        return Ok((fk.fields.clone(), fk.reference.fields.clone()));
    }
    Err(TranslateError::MissingRelation {
        parent: parent.name.clone(),
        child: child.name.clone(),
    })
}

fn filter_sql(filter: &Filter) -> String {
    format!(
        "{}.{} {} {}",
        filter.resource,
        filter.field,
        filter.op.sql(),
        literal_sql(&filter.value)
    )
}

fn literal_sql(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Num(_) => value.display_string(),
        Value::Datetime(dt) => format!("'{}'", dt.format("%Y-%m-%d %H:%M:%S")),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        _ => "NULL".to_string(),
    }
}
