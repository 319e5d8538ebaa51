use crate::ast::{Expr, PathExpr};

/// Forward iterator over the links of a [`PathExpr`] chain.
///
/// The binder and the evaluator both walk reference chains link by link
/// while carrying their own state between steps; a plain `Iterator` is too
/// little (they need [`peek`](PathReader::peek) and the subscript of the
/// link just consumed), so this small reader wraps the traversal instead.
pub struct PathReader<'a> {
    next: Option<&'a PathExpr>,
    last: Option<&'a PathExpr>,
}

impl<'a> PathReader<'a> {
    pub fn new(path: &'a PathExpr) -> Self {
        PathReader {
            next: Some(path),
            last: None,
        }
    }

    /// Consume the next link and return its content expression.
    pub fn next(&mut self) -> Option<&'a Expr> {
        let node = self.next.take()?;
        self.next = node.next.as_deref();
        self.last = Some(node);
        Some(&node.content)
    }

    /// The content of the next link without consuming it.
    pub fn peek(&self) -> Option<&'a Expr> {
        self.next.map(|node| node.content.as_ref())
    }

    /// Whether any links remain.
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    /// The `[...]` subscript of the most recently consumed link.
    pub fn index(&self) -> Option<&'a Expr> {
        self.last.and_then(|node| node.index.as_deref())
    }
}
