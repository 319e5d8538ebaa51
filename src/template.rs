use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::ast::Formula;
use crate::query::Query;
use crate::value::Value;

/// Shared handle to a template node.
///
/// Templates form a tree with parent back-references, so they live behind
/// `Rc<RefCell<..>>`; parents are held weakly to keep the tree droppable.
pub type TemplateRef = Rc<RefCell<Template>>;

/// One template block of a form file.
///
/// Parsing fills the static part (component type, name, property formulas).
/// Binding wires up `parent`, `children` and `query`; evaluation then runs
/// row by row, updating `index` and `instance` as it goes.
#[derive(Debug)]
pub struct Template {
    pub component_type: String,
    pub name: Option<String>,
    /// Property formulas in source order.
    pub properties: Vec<(String, Rc<Formula>)>,
    /// The `Rows` formula, when the template is data-bound.
    pub rows: Option<Rc<Formula>>,
    pub children: Vec<TemplateRef>,
    pub parent: Option<Weak<RefCell<Template>>>,
    /// Query descriptor produced by the binder for a root-bound template.
    pub query: Option<Query>,
    /// Index of the row currently being rendered.
    pub index: Option<usize>,
    /// The record of the row currently being rendered.
    pub instance: Option<Value>,
    /// Fetched result rows, keyed by resource name.
    pub data: HashMap<String, Vec<Value>>,
}

impl Template {
    pub fn new(component_type: impl Into<String>) -> Template {
        Template {
            component_type: component_type.into(),
            name: None,
            properties: Vec::new(),
            rows: None,
            children: Vec::new(),
            parent: None,
            query: None,
            index: None,
            instance: None,
            data: HashMap::new(),
        }
    }

    pub fn property(&self, name: &str) -> Option<Rc<Formula>> {
        self.properties
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, formula)| Rc::clone(formula))
    }

    pub fn parent(&self) -> Option<TemplateRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }
}

/// A parsed form: the flat template list plus the synthesized root.
///
/// The root is also the first entry of `templates`; keeping the flat list
/// lets `Form.<name>` references resolve without walking the tree.
#[derive(Debug)]
pub struct FormModel {
    pub templates: Vec<TemplateRef>,
    pub root: TemplateRef,
}

impl FormModel {
    pub fn find_template(&self, name: &str) -> Option<TemplateRef> {
        self.templates
            .iter()
            .find(|t| t.borrow().name.as_deref() == Some(name))
            .map(Rc::clone)
    }

    /// True if `template` is the root node.
    pub fn is_root(&self, template: &TemplateRef) -> bool {
        Rc::ptr_eq(template, &self.root)
    }
}
