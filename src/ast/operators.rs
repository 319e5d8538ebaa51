use std::fmt;

/// Operator tokens shared by the map and form grammars.
///
/// Each grammar ranks these in its own precedence table; the lexer only
/// recognizes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Map-grammar separators
    /// Property / pair separator (`:`)
    Colon,
    /// Pair separator (`&`)
    Amp,
    /// Alternative separator (`|`)
    Pipe,

    // Relational binding
    /// Expand to many (`-<`)
    ///
    /// Combines a template or query on the left with an entity on the
    /// right, extending the query's expand chain with a `many` relation.
    ExpandMany,
    /// Expand to one (`>-`)
    ExpandOne,
    /// Attach a row filter (`WHERE`)
    Where,

    // Comparison (filters)
    /// Equality (`=`)
    Eq,
    /// Less than (`<`)
    Lt,
    /// Greater than (`>`)
    Gt,
    /// Less than or equal (`<=`)
    LtEq,
    /// Greater than or equal (`>=`)
    GtEq,
    /// Strict equality (`==`)
    EqEq,
    /// Inequality (`!=`)
    NotEq,

    // Arithmetic
    /// Addition or string concatenation (`+`)
    Plus,
    /// Subtraction (`-`)
    Minus,
    /// Multiplication (`*`)
    Star,
    /// Division (`/`)
    Slash,
    /// Modulo (`%`)
    Percent,
}

impl Op {
    /// The operator as it appears in source text.
    pub fn symbol(&self) -> &'static str {
        match self {
            Op::Colon => ":",
            Op::Amp => "&",
            Op::Pipe => "|",
            Op::ExpandMany => "-<",
            Op::ExpandOne => ">-",
            Op::Where => "WHERE",
            Op::Eq => "=",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::LtEq => "<=",
            Op::GtEq => ">=",
            Op::EqEq => "==",
            Op::NotEq => "!=",
            Op::Plus => "+",
            Op::Minus => "-",
            Op::Star => "*",
            Op::Slash => "/",
            Op::Percent => "%",
        }
    }

    /// Look an operator up from its source spelling.
    pub fn from_symbol(symbol: &str) -> Option<Op> {
        Some(match symbol {
            ":" => Op::Colon,
            "&" => Op::Amp,
            "|" => Op::Pipe,
            "-<" => Op::ExpandMany,
            ">-" => Op::ExpandOne,
            "WHERE" => Op::Where,
            "=" => Op::Eq,
            "<" => Op::Lt,
            ">" => Op::Gt,
            "<=" => Op::LtEq,
            ">=" => Op::GtEq,
            "==" => Op::EqEq,
            "!=" => Op::NotEq,
            "+" => Op::Plus,
            "-" => Op::Minus,
            "*" => Op::Star,
            "/" => Op::Slash,
            "%" => Op::Percent,
            _ => return None,
        })
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
