use std::cell::RefCell;
use std::fmt;

use chrono::NaiveDateTime;

use crate::ast::Op;
use crate::value::Value;

/// Namespace selected by the head identifier of a path.
///
/// Resolved once at parse time; the binder and the evaluator dispatch on it
/// instead of re-inspecting the identifier. Heads that are none of the three
/// reserved namespaces are tagged `Local` and resolved contextually (parent
/// properties first, then the template list) or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// `Map.Entity[...].Field` - the data map
    Map,
    /// `Form.Template.Property` - sibling templates
    Form,
    /// `Parent.Property` - the enclosing template
    Parent,
    /// Contextual lookup
    Local,
}

impl Namespace {
    /// Classify a path head identifier.
    pub fn of(head: &str) -> Namespace {
        match head {
            "Map" => Namespace::Map,
            "Form" => Namespace::Form,
            "Parent" => Namespace::Parent,
            _ => Namespace::Local,
        }
    }
}

/// One link of a dotted/bang-joined reference chain.
///
/// `Map.Patient[index - 1].name` becomes three links: `Map`, then `Patient`
/// carrying the bracketed index expression, then `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    /// Namespace of the chain. Meaningful on the head link only; nested
    /// links carry `Local`.
    pub route: Namespace,
    /// The component at this link, usually an identifier atom.
    pub content: Box<Expr>,
    /// Optional `[expr]` subscript addressing one row of a many-relation.
    pub index: Option<Box<Expr>>,
    /// The rest of the chain.
    pub next: Option<Box<PathExpr>>,
}

impl PathExpr {
    /// The identifier at this link, if it is a plain identifier.
    pub fn ident(&self) -> Option<&str> {
        match self.content.as_ref() {
            Expr::Id(name) => Some(name),
            _ => None,
        }
    }
}

/// Expression node of the formula languages.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number literal
    Num(f64),

    /// String literal
    Str(String),

    /// Datetime literal
    Datetime(NaiveDateTime),

    /// Bare identifier (`index`, a color name, a template name)
    Id(String),

    /// Reference chain (`Map.Patient.name`, `Form.Header.Width`)
    Path(PathExpr),

    /// Infix operation
    Binary {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl fmt::Display for Expr {
    /// Renders the expression back to source text. Parsing the rendered text
    /// yields a structurally identical AST (the grammars are
    /// whitespace-insensitive within a line and fully parenthesis-free).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(n) => write!(f, "{}", Value::Num(*n).display_string()),
            Expr::Str(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
            Expr::Datetime(dt) => write!(f, "#{}#", dt.format("%-d-%-m-%Y %H:%M:%S")),
            Expr::Id(name) => f.write_str(name),
            Expr::Path(path) => {
                let mut link = Some(path);
                let mut first = true;
                while let Some(node) = link {
                    if !first {
                        f.write_str(".")?;
                    }
                    first = false;
                    write!(f, "{}", node.content)?;
                    if let Some(index) = &node.index {
                        write!(f, "[{index}]")?;
                    }
                    link = node.next.as_deref();
                }
                Ok(())
            }
            Expr::Binary { op, left, right } => write!(f, "{left} {op} {right}"),
        }
    }
}

/// Top-level wrapper for a property or row binding.
///
/// Carries the per-run value cache: once the evaluator computes a property,
/// the value is stored here and any other formula referencing it through the
/// `Form` namespace reads the cache instead of re-evaluating. The template
/// tree is rebuilt for every compile run, so the cache never leaks across
/// runs.
#[derive(Debug)]
pub struct Formula {
    pub value: Expr,
    cache: RefCell<Option<Value>>,
}

impl Formula {
    pub fn new(value: Expr) -> Formula {
        Formula {
            value,
            cache: RefCell::new(None),
        }
    }

    /// The cached evaluated value, if this formula was already computed
    /// during the current run.
    pub fn cached(&self) -> Option<Value> {
        self.cache.borrow().clone()
    }

    pub fn set_cache(&self, value: Value) {
        *self.cache.borrow_mut() = Some(value);
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Formula) -> bool {
        // cache is transient evaluator state, not part of the AST
        self.value == other.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_of_head() {
        assert_eq!(Namespace::of("Map"), Namespace::Map);
        assert_eq!(Namespace::of("Form"), Namespace::Form);
        assert_eq!(Namespace::of("Parent"), Namespace::Parent);
        assert_eq!(Namespace::of("index"), Namespace::Local);
    }

    #[test]
    fn display_renders_paths() {
        let expr = Expr::Path(PathExpr {
            route: Namespace::Map,
            content: Box::new(Expr::Id("Map".to_string())),
            index: None,
            next: Some(Box::new(PathExpr {
                route: Namespace::Local,
                content: Box::new(Expr::Id("Patient".to_string())),
                index: Some(Box::new(Expr::Num(0.0))),
                next: Some(Box::new(PathExpr {
                    route: Namespace::Local,
                    content: Box::new(Expr::Id("name".to_string())),
                    index: None,
                    next: None,
                })),
            })),
        });
        assert_eq!(expr.to_string(), "Map.Patient[0].name");
    }
}
