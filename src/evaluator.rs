use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{Expr, Formula, Namespace, Op, PathExpr};
use crate::path::PathReader;
use crate::registry::{RegistryError, TypeRegistry};
use crate::template::{FormModel, TemplateRef};
use crate::value::Value;

#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("unknown template '{name}'")]
    UnknownTemplate { name: String },

    #[error("template '{template}' has no property '{property}'")]
    UnknownProperty { template: String, property: String },

    #[error("operator '{op}' requires numeric operands")]
    NonNumericOperand { op: Op },

    #[error("operator '{op}' cannot be evaluated here")]
    UnsupportedOperator { op: Op },

    #[error("row index {index} is out of range for {len} rows")]
    RowIndexOutOfRange { index: usize, len: usize },

    #[error("a subscript must evaluate to a non-negative number")]
    InvalidIndex,

    #[error("template '{template}' has no current row")]
    NoInstance { template: String },

    #[error("'index' is only defined inside a data-bound template")]
    NoRowContext { template: String },

    #[error("the Rows formula of template '{template}' did not produce a record set")]
    NotARecordSet { template: String },

    #[error("no rows were fetched for resource '{resource}'")]
    NoData { resource: String },

    #[error("template '{template}' has no parent")]
    MissingParent { template: String },

    #[error("cannot resolve reference '{name}'")]
    UnresolvedReference { name: String },

    #[error(transparent)]
    InvalidValue(#[from] RegistryError),
}

/// A fully evaluated component instance, one per data row.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub component_type: String,
    pub name: Option<String>,
    /// Row number within the parent's record set, when data-bound.
    pub index: Option<usize>,
    pub properties: Vec<(String, Value)>,
    pub children: Vec<Component>,
}

/// Walks the bound template tree and computes the component tree.
///
/// A data-bound template is rendered once per row of its record set; while
/// a row is current, its record is installed as the template's *instance*
/// so that `Map` reads in the template (and `Parent`/`Form` reads from
/// below) see that row. Property values are cached on their formula, so a
/// property referenced through the `Form` namespace is computed at most
/// once per row.
pub struct Evaluator<'a> {
    form: &'a FormModel,
    registry: &'a TypeRegistry,
    evaluations: Cell<usize>,
}

impl<'a> Evaluator<'a> {
    pub fn new(form: &'a FormModel, registry: &'a TypeRegistry) -> Evaluator<'a> {
        Evaluator {
            form,
            registry,
            evaluations: Cell::new(0),
        }
    }

    /// How many formula bodies have been computed so far. Cache hits do
    /// not count; tests use this to pin the caching behavior down.
    pub fn formula_evaluations(&self) -> usize {
        self.evaluations.get()
    }

    /// Evaluate the whole form into its component tree.
    pub fn evaluate_tree(&self) -> Result<Component, EvalError> {
        let mut rendered = self.render(&self.form.root)?;
        match rendered.pop() {
            Some(component) if rendered.is_empty() => Ok(component),
            _ => Err(EvalError::NotARecordSet {
                template: name_of(&self.form.root),
            }),
        }
    }

    /// Render one template: one component per row when data-bound, a
    /// single component otherwise.
    fn render(&self, template: &TemplateRef) -> Result<Vec<Component>, EvalError> {
        let rows = template.borrow().rows.as_ref().map(Rc::clone);
        let Some(rows) = rows else {
            return Ok(vec![self.render_instance(template, None)?]);
        };

        let value = self.eval_formula(&rows, template, "Rows")?;
        let records = match value {
            Value::List(records) => records,
            Value::Null => Vec::new(),
            _ => {
                return Err(EvalError::NotARecordSet {
                    template: name_of(template),
                })
            }
        };

        let mut components = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            {
                let mut t = template.borrow_mut();
                t.index = Some(index);
                t.instance = Some(record);
            }
            components.push(self.render_instance(template, Some(index))?);
        }
        Ok(components)
    }

    fn render_instance(
        &self,
        template: &TemplateRef,
        index: Option<usize>,
    ) -> Result<Component, EvalError> {
        let (component_type, name, declared, children_refs) = {
            let t = template.borrow();
            (
                t.component_type.clone(),
                t.name.clone(),
                t.properties.clone(),
                t.children.clone(),
            )
        };

        let mut properties = Vec::with_capacity(declared.len());
        for (key, formula) in declared {
            let value = self.eval_formula(&formula, template, &key)?;
            if let Some(descriptor) = self.registry.inspect(true, &component_type, &key) {
                descriptor.kind.validate(&value, &key)?;
            }
            formula.set_cache(value.clone());
            properties.push((key, value));
        }

        let mut children = Vec::new();
        for child in children_refs {
            children.extend(self.render(&child)?);
        }

        Ok(Component {
            component_type,
            name,
            index,
            properties,
            children,
        })
    }

    fn eval_formula(
        &self,
        formula: &Formula,
        template: &TemplateRef,
        property: &str,
    ) -> Result<Value, EvalError> {
        self.evaluations.set(self.evaluations.get() + 1);
        self.eval(&formula.value, template, property)
    }

    fn eval(&self, expr: &Expr, template: &TemplateRef, property: &str) -> Result<Value, EvalError> {
        match expr {
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Datetime(dt) => Ok(Value::Datetime(*dt)),
            Expr::Id(name) => self.eval_ident(name, template),
            Expr::Path(path) => match path.route {
                Namespace::Map => self.walk_to_map(path, template, property),
                Namespace::Form => self.walk_to_form(path, template, property),
                Namespace::Parent => self.walk_to_parent(path, template),
                Namespace::Local => self.walk_local(path, template),
            },
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, template, property)?;
                let right = self.eval(right, template, property)?;
                if property == "Rows" {
                    apply_op_rows(*op, left, right)
                } else {
                    apply_op_props(*op, left, right)
                }
            }
        }
    }

    /// A bare identifier: the row counter, or plain text (color names and
    /// the like read as themselves).
    fn eval_ident(&self, name: &str, template: &TemplateRef) -> Result<Value, EvalError> {
        if name == "index" {
            let index = template
                .borrow()
                .index
                .ok_or_else(|| EvalError::NoRowContext {
                    template: name_of(template),
                })?;
            return Ok(Value::Num(index as f64));
        }
        Ok(Value::Str(name.to_string()))
    }

    /// `Map.Entity...` - read from the fetched data.
    ///
    /// In a `Rows` formula the read names a record set: the owning
    /// template answers with its fetched row list, a template further down
    /// answers with the resource name for the expand operator to look up
    /// in the parent's record. In a property formula the read addresses
    /// one field of the current row.
    fn walk_to_map(
        &self,
        path: &PathExpr,
        template: &TemplateRef,
        property: &str,
    ) -> Result<Value, EvalError> {
        let mut reader = PathReader::new(path);
        reader.next(); // the `Map` head
        let entity = ident_link(&mut reader)?;

        if property == "Rows" {
            if template.borrow().query.is_some() {
                let data = template.borrow().data.get(&entity).cloned();
                return Ok(Value::List(data.ok_or(EvalError::NoData {
                    resource: entity,
                })?));
            }
            return Ok(Value::Str(entity));
        }

        let subscript = reader.index().cloned();
        let field = ident_link(&mut reader)?;

        let record = if let Some(subscript) = subscript {
            self.subscripted_record(&entity, &subscript, template, property)?
        } else {
            self.current_record(&entity, template)?
        };

        match record {
            Value::Record(map) => Ok(map.get(&field).cloned().unwrap_or(Value::Null)),
            _ => Ok(Value::Null),
        }
    }

    /// The row a plain `Map.Entity.field` read addresses: the nearest
    /// current instance, descending into a one-expanded nested record when
    /// the instance carries one under the entity's name.
    fn current_record(&self, entity: &str, template: &TemplateRef) -> Result<Value, EvalError> {
        let instance = nearest_instance(template).ok_or_else(|| EvalError::NoInstance {
            template: name_of(template),
        })?;

        if let Value::Record(map) = &instance {
            if let Some(nested @ Value::Record(_)) = map.get(entity) {
                return Ok(nested.clone());
            }
        }
        Ok(instance)
    }

    /// `Map.Entity[expr].field` - address an explicit row of a record set
    /// instead of the current one.
    fn subscripted_record(
        &self,
        entity: &str,
        subscript: &Expr,
        template: &TemplateRef,
        property: &str,
    ) -> Result<Value, EvalError> {
        let index = self.eval(subscript, template, property)?;
        let index = match index.as_num() {
            Some(n) if n >= 0.0 && n.fract() == 0.0 => n as usize,
            _ => return Err(EvalError::InvalidIndex),
        };

        let rows = self.record_list(entity, template)?;
        let len = rows.len();
        rows.into_iter()
            .nth(index)
            .ok_or(EvalError::RowIndexOutOfRange { index, len })
    }

    /// The row list a subscripted read indexes into: the owning query's
    /// fetched data, or a many-expanded list inside the current instance.
    fn record_list(&self, entity: &str, template: &TemplateRef) -> Result<Vec<Value>, EvalError> {
        let mut current = Some(Rc::clone(template));
        while let Some(t) = current {
            if let Some(rows) = t.borrow().data.get(entity) {
                return Ok(rows.clone());
            }
            if let Some(Value::Record(map)) = &t.borrow().instance {
                if let Some(Value::List(rows)) = map.get(entity) {
                    return Ok(rows.clone());
                }
            }
            current = t.borrow().parent();
        }
        Err(EvalError::NoData {
            resource: entity.to_string(),
        })
    }

    /// `Form.Template...` - in a `Rows` formula this yields the target's
    /// current row for the expand operator; in a property formula it reads
    /// a property of the target, through the cache.
    fn walk_to_form(
        &self,
        path: &PathExpr,
        template: &TemplateRef,
        property: &str,
    ) -> Result<Value, EvalError> {
        let mut reader = PathReader::new(path);
        reader.next(); // the `Form` head
        let name = ident_link(&mut reader)?;
        let target = self
            .form
            .find_template(&name)
            .ok_or(EvalError::UnknownTemplate { name })?;

        if property == "Rows" {
            return target
                .borrow()
                .instance
                .clone()
                .ok_or_else(|| EvalError::NoInstance {
                    template: name_of(&target),
                });
        }

        let wanted = ident_link(&mut reader)?;
        self.read_property(&target, &wanted)
    }

    /// Read a property of another template, computing and caching it if it
    /// has not been evaluated for the current row yet.
    fn read_property(&self, target: &TemplateRef, property: &str) -> Result<Value, EvalError> {
        let formula = target
            .borrow()
            .property(property)
            .ok_or_else(|| EvalError::UnknownProperty {
                template: name_of(target),
                property: property.to_string(),
            })?;

        if let Some(cached) = formula.cached() {
            return Ok(cached);
        }
        let value = self.eval_formula(&formula, target, property)?;
        formula.set_cache(value.clone());
        Ok(value)
    }

    /// `Parent.Property` - read from the enclosing template, falling back
    /// to the registry default when the parent does not declare the
    /// property. No cache: the parent may be mid-row.
    fn walk_to_parent(&self, path: &PathExpr, template: &TemplateRef) -> Result<Value, EvalError> {
        let parent = template
            .borrow()
            .parent()
            .ok_or_else(|| EvalError::MissingParent {
                template: name_of(template),
            })?;

        let mut reader = PathReader::new(path);
        reader.next(); // the `Parent` head
        let property = ident_link(&mut reader)?;

        let formula = parent.borrow().property(&property);
        if let Some(formula) = formula {
            return self.eval(&formula.value, &parent, &property);
        }

        let component_type = parent.borrow().component_type.clone();
        if let Some(descriptor) = self.registry.inspect(true, &component_type, &property) {
            return Ok(descriptor.initial.clone());
        }
        Err(EvalError::UnknownProperty {
            template: name_of(&parent),
            property,
        })
    }

    /// A path with an unreserved head: `X.Prop` reads a sibling template
    /// like `Form.X.Prop` would.
    fn walk_local(&self, path: &PathExpr, template: &TemplateRef) -> Result<Value, EvalError> {
        let mut reader = PathReader::new(path);
        let head = ident_link(&mut reader)?;

        if head == "index" {
            return self.eval_ident("index", template);
        }

        let parent = template.borrow().parent();
        if let Some(parent) = parent {
            let formula = parent.borrow().property(&head);
            if let Some(formula) = formula {
                return self.eval(&formula.value, &parent, &head);
            }
        }

        if let Some(target) = self.form.find_template(&head) {
            let property = ident_link(&mut reader)?;
            return self.read_property(&target, &property);
        }

        Err(EvalError::UnresolvedReference { name: head })
    }
}

/// Operator semantics inside a `Rows` formula: the expand operator picks a
/// nested record set out of the parent's row, everything else is already
/// settled (filters ran in SQL) or meaningless.
fn apply_op_rows(op: Op, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        Op::ExpandMany => match (&left, &right) {
            (Value::Record(map), Value::Str(resource)) => {
                Ok(map.get(resource).cloned().unwrap_or(Value::List(Vec::new())))
            }
            _ => Ok(Value::Null),
        },
        Op::ExpandOne | Op::Where => Ok(left),
        Op::Eq | Op::Lt | Op::Gt | Op::LtEq | Op::GtEq | Op::EqEq | Op::NotEq => Ok(Value::Null),
        _ => Err(EvalError::UnsupportedOperator { op }),
    }
}

/// Operator semantics in a property formula. `+` adds numbers and
/// concatenates anything else; the rest of the arithmetic wants numbers.
fn apply_op_props(op: Op, left: Value, right: Value) -> Result<Value, EvalError> {
    match op {
        Op::Plus => match (&left, &right) {
            (Value::Num(a), Value::Num(b)) => Ok(Value::Num(a + b)),
            _ => Ok(Value::Str(format!(
                "{}{}",
                left.display_string(),
                right.display_string()
            ))),
        },
        Op::Minus | Op::Star | Op::Slash | Op::Percent => {
            let (Some(a), Some(b)) = (left.as_num(), right.as_num()) else {
                return Err(EvalError::NonNumericOperand { op });
            };
            Ok(Value::Num(match op {
                Op::Minus => a - b,
                Op::Star => a * b,
                Op::Slash => a / b,
                _ => a % b,
            }))
        }
        _ => Err(EvalError::UnsupportedOperator { op }),
    }
}

fn nearest_instance(template: &TemplateRef) -> Option<Value> {
    let mut current = Some(Rc::clone(template));
    while let Some(t) = current {
        if let Some(instance) = &t.borrow().instance {
            return Some(instance.clone());
        }
        current = t.borrow().parent();
    }
    None
}

fn name_of(template: &TemplateRef) -> String {
    let t = template.borrow();
    t.name.clone().unwrap_or_else(|| t.component_type.clone())
}

fn ident_link(reader: &mut PathReader<'_>) -> Result<String, EvalError> {
    match reader.next() {
        Some(Expr::Id(name)) => Ok(name.clone()),
        Some(other) => Err(EvalError::UnresolvedReference {
            name: other.to_string(),
        }),
        None => Err(EvalError::UnresolvedReference {
            name: String::new(),
        }),
    }
}
