//! # Abstract syntax for the form and map languages
//!
//! Two small declarative languages share this AST: the *map* language, which
//! declares a data source and its entity relationships, and the *form*
//! language, which declares a tree of UI templates bound to that data.
//!
//! The module is organized into focused submodules:
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (formulas, binaries, paths, atoms)
//! - **[operators]** - Operator tokens shared by both grammars
//!
//! ## The formula language at a glance
//!
//! ```text
//! TextBox: PatientData
//! Rows: Map.Patient WHERE Map.Patient.ward = "A"
//! Text: Map.Patient.name + " (" + index + ")"
//! Top: 10 + index * 30
//! ----------------------------------------------
//! ```
//!
//! A block of `key: formula` lines terminated by a dash separator is one
//! template definition (form grammar) or one table definition (map grammar).
//! Formulas are ordinary infix expressions extended with *paths*: dotted or
//! bang-joined identifier chains (`Map.Patient.name`, `Form.Header.Width`,
//! `Parent.Top`) whose head selects one of the namespaces `Map`, `Form`,
//! `Parent`, or falls back to a contextual `Local` lookup.

pub mod expressions;
pub mod operators;
pub mod tokens;

pub use expressions::{Expr, Formula, Namespace, PathExpr};
pub use operators::Op;
pub use tokens::Token;
