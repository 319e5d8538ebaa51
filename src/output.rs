//! JSON serialization of evaluated values and component trees.
//!
//! Output is deterministic: record keys are sorted alphabetically and
//! component fields appear in a fixed order. Compact and pretty (2-space
//! indented) variants are provided.

use crate::evaluator::Component;
use crate::value::Value;

pub struct JsonPrinter {
    pretty: bool,
}

impl JsonPrinter {
    pub fn new(pretty: bool) -> Self {
        JsonPrinter { pretty }
    }

    pub fn print(&self, value: &Value) -> String {
        self.print_value(value, 0)
    }

    pub fn print_component(&self, component: &Component) -> String {
        self.print_component_at(component, 0)
    }

    fn print_value(&self, value: &Value, indent: usize) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Num(_) => value.display_string(),
            Value::Str(s) => format!("\"{}\"", self.escape_string(s)),
            Value::Datetime(_) => format!("\"{}\"", value.display_string()),
            Value::List(items) => {
                let rendered: Vec<String> = items
                    .iter()
                    .map(|item| self.print_value(item, indent + 1))
                    .collect();
                self.wrap('[', ']', rendered, indent)
            }
            Value::Record(map) => {
                let mut keys: Vec<_> = map.keys().collect();
                keys.sort();
                let rendered: Vec<String> = keys
                    .iter()
                    .map(|key| {
                        self.pair(key, map.get(*key).map_or_else(
                            || "null".to_string(),
                            |v| self.print_value(v, indent + 1),
                        ))
                    })
                    .collect();
                self.wrap('{', '}', rendered, indent)
            }
        }
    }

    fn print_component_at(&self, component: &Component, indent: usize) -> String {
        let mut fields = Vec::new();
        fields.push(self.pair("type", format!("\"{}\"", self.escape_string(&component.component_type))));
        if let Some(name) = &component.name {
            fields.push(self.pair("name", format!("\"{}\"", self.escape_string(name))));
        }
        if let Some(index) = component.index {
            fields.push(self.pair("index", index.to_string()));
        }

        let properties: Vec<String> = component
            .properties
            .iter()
            .map(|(key, value)| self.pair(key, self.print_value(value, indent + 2)))
            .collect();
        fields.push(self.pair("properties", self.wrap('{', '}', properties, indent + 1)));

        let children: Vec<String> = component
            .children
            .iter()
            .map(|child| self.print_component_at(child, indent + 2))
            .collect();
        fields.push(self.pair("children", self.wrap('[', ']', children, indent + 1)));

        self.wrap('{', '}', fields, indent)
    }

    fn pair(&self, key: &str, value: String) -> String {
        if self.pretty {
            format!("\"{}\": {}", self.escape_string(key), value)
        } else {
            format!("\"{}\":{}", self.escape_string(key), value)
        }
    }

    fn wrap(&self, open: char, close: char, items: Vec<String>, indent: usize) -> String {
        if items.is_empty() {
            return format!("{open}{close}");
        }
        if self.pretty {
            let inner = self.indent(indent + 1);
            let mut result = format!("{open}\n{inner}");
            result.push_str(&items.join(&format!(",\n{inner}")));
            result.push('\n');
            result.push_str(&self.indent(indent));
            result.push(close);
            result
        } else {
            format!("{open}{}{close}", items.join(","))
        }
    }

    fn indent(&self, level: usize) -> String {
        "  ".repeat(level)
    }

    fn escape_string(&self, s: &str) -> String {
        s.chars()
            .flat_map(|c| match c {
                '"' => vec!['\\', '"'],
                '\\' => vec!['\\', '\\'],
                '\n' => vec!['\\', 'n'],
                '\r' => vec!['\\', 'r'],
                '\t' => vec!['\\', 't'],
                c if c.is_control() => format!("\\u{:04x}", c as u32).chars().collect(),
                c => vec![c],
            })
            .collect()
    }
}

/// Compact JSON for a value.
pub fn to_json(value: &Value) -> String {
    JsonPrinter::new(false).print(value)
}

/// Pretty JSON for a value, 2-space indented.
pub fn to_json_pretty(value: &Value) -> String {
    JsonPrinter::new(true).print(value)
}

/// Compact JSON for an evaluated component tree.
pub fn component_to_json(component: &Component) -> String {
    JsonPrinter::new(false).print_component(component)
}

/// Pretty JSON for an evaluated component tree.
pub fn component_to_json_pretty(component: &Component) -> String {
    JsonPrinter::new(true).print_component(component)
}
