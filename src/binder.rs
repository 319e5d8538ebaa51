use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{Expr, Namespace, Op, PathExpr};
use crate::path::PathReader;
use crate::query::{Cardinality, CompareOp, Filter, Query};
use crate::registry::TypeRegistry;
use crate::schema::EntitySchema;
use crate::template::{FormModel, TemplateRef};
use crate::value::Value;

#[derive(Debug, Clone, Error)]
pub enum BindError {
    #[error("unknown entity '{name}'")]
    UnknownEntity { name: String },

    #[error("entity '{entity}' has no field '{field}'")]
    UnknownField { entity: String, field: String },

    #[error("unknown template '{name}'")]
    UnknownTemplate { name: String },

    #[error("cyclic Rows reference through template '{name}'")]
    CyclicReference { name: String },

    #[error("the map declares no database, Map references cannot be resolved")]
    NoSchema,

    #[error("template '{template}' is not bound to data")]
    NotDataBound { template: String },

    #[error("the Rows formula of template '{template}' does not describe a record set")]
    InvalidRowsFormula { template: String },

    #[error("template '{template}' reads '{resource}' which its query does not reach")]
    UnboundResource { template: String, resource: String },

    #[error("the parent of template '{template}' has no property '{property}'")]
    UnknownParentProperty { template: String, property: String },

    #[error("template '{template}' has no parent")]
    MissingParent { template: String },

    #[error("cannot resolve reference '{name}'")]
    UnresolvedReference { name: String },
}

/// What a sub-expression of a `Rows` formula denotes, before any data
/// exists. The binder folds these through the formula's operators to
/// produce query descriptors.
enum BindValue {
    /// `Map.Entity`, optionally filtered
    Entity {
        name: String,
        filter: Option<Filter>,
    },
    /// `Form.Template`, not yet part of a query chain here
    Template(TemplateRef),
    /// A template whose query chain was just extended
    QueryHandle(TemplateRef),
    /// `Map.Entity.field` awaiting a comparison operand
    FilterStub { resource: String, field: String },
    /// A completed comparison
    Filter(Filter),
    /// A literal operand
    Literal(Value),
}

/// Per-run traversal state. `in_progress` catches Rows cycles, `bound`
/// keeps templates from being bound twice when recursion got to them
/// before the sweep did.
#[derive(Default)]
struct BinderContext {
    in_progress: HashSet<usize>,
    bound: HashSet<usize>,
}

fn key_of(template: &TemplateRef) -> usize {
    Rc::as_ptr(template) as usize
}

fn name_of(template: &TemplateRef) -> String {
    let t = template.borrow();
    t.name.clone().unwrap_or_else(|| t.component_type.clone())
}

/// Resolve every reference of the form against the map schemas and wire
/// the template tree.
///
/// Runs in three passes: first every `Rows` formula is folded into a query
/// descriptor (building parent/child links along `-<` and `>-` as it
/// goes), then every property formula is checked and its `Map` reads are
/// recorded on the owning query, and finally templates that no formula
/// claimed are attached under the root.
pub fn bind(
    form: &FormModel,
    schemas: &HashMap<String, EntitySchema>,
    registry: &TypeRegistry,
) -> Result<(), BindError> {
    let binder = Binder {
        form,
        schemas,
        registry,
    };
    let mut ctx = BinderContext::default();

    for template in &form.templates {
        if template.borrow().rows.is_some() {
            binder.bind_rows(template, &mut ctx)?;
        }
    }

    for template in &form.templates {
        let properties: Vec<_> = template
            .borrow()
            .properties
            .iter()
            .map(|(_, formula)| Rc::clone(formula))
            .collect();
        for formula in properties {
            binder.check_expr(&formula.value, template)?;
        }
    }

    for template in &form.templates {
        if form.is_root(template) {
            continue;
        }
        if template.borrow().parent.is_none() {
            attach(&form.root, template);
        }
    }

    Ok(())
}

struct Binder<'a> {
    form: &'a FormModel,
    schemas: &'a HashMap<String, EntitySchema>,
    registry: &'a TypeRegistry,
}

impl Binder<'_> {
    fn schema(&self, name: &str) -> Result<&EntitySchema, BindError> {
        if self.schemas.is_empty() {
            return Err(BindError::NoSchema);
        }
        self.schemas.get(name).ok_or_else(|| BindError::UnknownEntity {
            name: name.to_string(),
        })
    }

    fn bind_rows(&self, template: &TemplateRef, ctx: &mut BinderContext) -> Result<(), BindError> {
        let key = key_of(template);
        if ctx.bound.contains(&key) {
            return Ok(());
        }
        if !ctx.in_progress.insert(key) {
            return Err(BindError::CyclicReference {
                name: name_of(template),
            });
        }

        let rows = template.borrow().rows.as_ref().map(Rc::clone);
        if let Some(rows) = rows {
            match self.pre_eval_rows(&rows.value, template, ctx)? {
                BindValue::Entity { name, filter } => {
                    let mut query = Query::from_schema(self.schema(&name)?, Cardinality::Many);
                    query.filter = filter;
                    template.borrow_mut().query = Some(query);
                    if template.borrow().parent.is_none() && !self.form.is_root(template) {
                        attach(&self.form.root, template);
                    }
                }
                BindValue::QueryHandle(_) => {}
                _ => {
                    return Err(BindError::InvalidRowsFormula {
                        template: name_of(template),
                    })
                }
            }
        }

        ctx.in_progress.remove(&key);
        ctx.bound.insert(key);
        Ok(())
    }

    fn pre_eval_rows(
        &self,
        expr: &Expr,
        template: &TemplateRef,
        ctx: &mut BinderContext,
    ) -> Result<BindValue, BindError> {
        match expr {
            Expr::Binary { op, left, right } => {
                let left = self.pre_eval_rows(left, template, ctx)?;
                let right = self.pre_eval_rows(right, template, ctx)?;
                self.apply_op(*op, left, right, template)
            }
            Expr::Path(path) => match path.route {
                Namespace::Map => self.rows_map_path(path, template),
                Namespace::Form => {
                    let target = self.resolve_form_target(path, ctx)?;
                    Ok(BindValue::Template(target))
                }
                _ => Err(BindError::InvalidRowsFormula {
                    template: name_of(template),
                }),
            },
            Expr::Num(n) => Ok(BindValue::Literal(Value::Num(*n))),
            Expr::Str(s) => Ok(BindValue::Literal(Value::Str(s.clone()))),
            Expr::Datetime(dt) => Ok(BindValue::Literal(Value::Datetime(*dt))),
            Expr::Id(_) => Err(BindError::InvalidRowsFormula {
                template: name_of(template),
            }),
        }
    }

    /// `Map.Entity` denotes a record set, `Map.Entity.field` the left side
    /// of a filter comparison.
    fn rows_map_path(
        &self,
        path: &PathExpr,
        template: &TemplateRef,
    ) -> Result<BindValue, BindError> {
        let mut reader = PathReader::new(path);
        reader.next(); // the `Map` head

        let entity = ident_link(&mut reader)?;
        let schema = self.schema(&entity)?;

        if !reader.has_next() {
            return Ok(BindValue::Entity {
                name: entity,
                filter: None,
            });
        }

        let field = ident_link(&mut reader)?;
        if schema.field(&field).is_none() {
            return Err(BindError::UnknownField {
                entity,
                field,
            });
        }
        if reader.has_next() {
            return Err(BindError::InvalidRowsFormula {
                template: name_of(template),
            });
        }
        Ok(BindValue::FilterStub {
            resource: entity,
            field,
        })
    }

    /// Resolve `Form.Template` inside a `Rows` formula, binding the target
    /// first if its own `Rows` has not been processed yet.
    fn resolve_form_target(
        &self,
        path: &PathExpr,
        ctx: &mut BinderContext,
    ) -> Result<TemplateRef, BindError> {
        let mut reader = PathReader::new(path);
        reader.next(); // the `Form` head

        let name = ident_link(&mut reader)?;
        let target = self
            .form
            .find_template(&name)
            .ok_or_else(|| BindError::UnknownTemplate { name: name.clone() })?;

        if ctx.bound.contains(&key_of(&target)) || target.borrow().query.is_some() {
            return Ok(target);
        }
        if ctx.in_progress.contains(&key_of(&target)) {
            return Err(BindError::CyclicReference { name });
        }
        self.bind_rows(&target, ctx)?;
        Ok(target)
    }

    fn apply_op(
        &self,
        op: Op,
        left: BindValue,
        right: BindValue,
        template: &TemplateRef,
    ) -> Result<BindValue, BindError> {
        match (op, left, right) {
            (
                Op::ExpandMany | Op::ExpandOne,
                BindValue::Template(target) | BindValue::QueryHandle(target),
                BindValue::Entity { name, filter },
            ) => {
                let cardinality = if op == Op::ExpandMany {
                    Cardinality::Many
                } else {
                    Cardinality::One
                };
                let mut sub = Query::from_schema(self.schema(&name)?, cardinality);
                sub.filter = filter;

                let owner = query_owner(&target).ok_or_else(|| BindError::NotDataBound {
                    template: name_of(&target),
                })?;
                if let Some(query) = owner.borrow_mut().query.as_mut() {
                    query.deepest_mut().expand = Some(Box::new(sub));
                }

                attach(&target, template);
                Ok(BindValue::QueryHandle(target))
            }
            (Op::Where, BindValue::Entity { name, .. }, BindValue::Filter(filter)) => {
                Ok(BindValue::Entity {
                    name,
                    filter: Some(filter),
                })
            }
            (Op::Where, BindValue::QueryHandle(target), BindValue::Filter(filter)) => {
                let owner = query_owner(&target).ok_or_else(|| BindError::NotDataBound {
                    template: name_of(&target),
                })?;
                let mut owner = owner.borrow_mut();
                let record_set = owner
                    .query
                    .as_mut()
                    .and_then(|query| query.record_set_mut(&filter.resource))
                    .ok_or_else(|| BindError::UnboundResource {
                        template: name_of(template),
                        resource: filter.resource.clone(),
                    })?;
                record_set.filter = Some(filter);
                drop(owner);
                Ok(BindValue::QueryHandle(target))
            }
            (
                Op::Eq | Op::Gt | Op::Lt,
                BindValue::FilterStub { resource, field },
                BindValue::Literal(value),
            ) => {
                let op = match op {
                    Op::Gt => CompareOp::Gt,
                    Op::Lt => CompareOp::Lt,
                    _ => CompareOp::Eq,
                };
                Ok(BindValue::Filter(Filter {
                    resource,
                    field,
                    op,
                    value,
                }))
            }
            _ => Err(BindError::InvalidRowsFormula {
                template: name_of(template),
            }),
        }
    }

    /// Structural check of a property formula. Nothing is computed; each
    /// reference is resolved and `Map` reads are recorded on the owning
    /// query so the translator selects their columns.
    fn check_expr(&self, expr: &Expr, template: &TemplateRef) -> Result<(), BindError> {
        match expr {
            Expr::Binary { left, right, .. } => {
                self.check_expr(left, template)?;
                self.check_expr(right, template)
            }
            Expr::Path(path) => {
                self.check_indexes(path, template)?;
                match path.route {
                    Namespace::Map => self.check_map_read(path, template),
                    Namespace::Form => self.check_form_read(path, template),
                    Namespace::Parent => self.check_parent_read(path, template),
                    Namespace::Local => self.check_local_read(path, template),
                }
            }
            Expr::Num(_) | Expr::Str(_) | Expr::Datetime(_) | Expr::Id(_) => Ok(()),
        }
    }

    fn check_indexes(&self, path: &PathExpr, template: &TemplateRef) -> Result<(), BindError> {
        let mut link = Some(path);
        while let Some(node) = link {
            if let Some(index) = &node.index {
                self.check_expr(index, template)?;
            }
            link = node.next.as_deref();
        }
        Ok(())
    }

    fn check_map_read(&self, path: &PathExpr, template: &TemplateRef) -> Result<(), BindError> {
        let mut reader = PathReader::new(path);
        reader.next(); // the `Map` head

        let entity = ident_link(&mut reader)?;
        let schema = self.schema(&entity)?;
        let field = ident_link(&mut reader)?;
        if schema.field(&field).is_none() {
            return Err(BindError::UnknownField { entity, field });
        }

        let template_name = name_of(template);
        let owner = query_owner(template).ok_or_else(|| BindError::NotDataBound {
            template: template_name.clone(),
        })?;
        let mut owner = owner.borrow_mut();
        let record_set = owner
            .query
            .as_mut()
            .and_then(|query| query.record_set_mut(&entity))
            .ok_or_else(|| BindError::UnboundResource {
                template: template_name,
                resource: entity.clone(),
            })?;
        record_set.push_property(&field);
        Ok(())
    }

    fn check_form_read(&self, path: &PathExpr, template: &TemplateRef) -> Result<(), BindError> {
        let mut reader = PathReader::new(path);
        reader.next(); // the `Form` head

        let name = ident_link(&mut reader)?;
        let target = self
            .form
            .find_template(&name)
            .ok_or_else(|| BindError::UnknownTemplate { name })?;

        if !reader.has_next() {
            // `Form.X` alone embeds this template under X
            attach(&target, template);
        }
        Ok(())
    }

    fn check_parent_read(&self, path: &PathExpr, template: &TemplateRef) -> Result<(), BindError> {
        let parent = template
            .borrow()
            .parent()
            .ok_or_else(|| BindError::MissingParent {
                template: name_of(template),
            })?;

        let mut reader = PathReader::new(path);
        reader.next(); // the `Parent` head
        let property = ident_link(&mut reader)?;

        let known = parent.borrow().property(&property).is_some()
            || self
                .registry
                .inspect(true, &parent.borrow().component_type, &property)
                .is_some();
        if !known {
            return Err(BindError::UnknownParentProperty {
                template: name_of(template),
                property,
            });
        }
        Ok(())
    }

    /// A path with an unreserved head: a parent property, or a sibling
    /// template, or the row counter.
    fn check_local_read(&self, path: &PathExpr, template: &TemplateRef) -> Result<(), BindError> {
        let mut reader = PathReader::new(path);
        let head = ident_link(&mut reader)?;

        if head == "index" {
            return Ok(());
        }
        if let Some(parent) = template.borrow().parent() {
            if parent.borrow().property(&head).is_some() {
                return Ok(());
            }
        }
        if self.form.find_template(&head).is_some() {
            return Ok(());
        }
        Err(BindError::UnresolvedReference { name: head })
    }
}

/// Make `child` a child of `parent`, once.
fn attach(parent: &TemplateRef, child: &TemplateRef) {
    if Rc::ptr_eq(parent, child) {
        return;
    }
    let already = parent
        .borrow()
        .children
        .iter()
        .any(|c| Rc::ptr_eq(c, child));
    if !already {
        child.borrow_mut().parent = Some(Rc::downgrade(parent));
        parent.borrow_mut().children.push(Rc::clone(child));
    }
}

/// The nearest template up the parent chain that owns a query.
fn query_owner(template: &TemplateRef) -> Option<TemplateRef> {
    let mut current = Rc::clone(template);
    loop {
        if current.borrow().query.is_some() {
            return Some(current);
        }
        let parent = current.borrow().parent()?;
        current = parent;
    }
}

/// The next link of a path, which must be a plain identifier.
fn ident_link(reader: &mut PathReader<'_>) -> Result<String, BindError> {
    match reader.next() {
        Some(Expr::Id(name)) => Ok(name.clone()),
        Some(other) => Err(BindError::UnresolvedReference {
            name: other.to_string(),
        }),
        None => Err(BindError::UnresolvedReference {
            name: String::new(),
        }),
    }
}
