use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("component type '{name}' is already registered")]
    DuplicateType { name: String },

    #[error("component type '{name}' cannot extend itself")]
    SelfExtend { name: String },

    #[error("component type '{name}' extends unknown type '{parent}'")]
    UnknownParent { name: String, parent: String },

    #[error("property '{property}' requires an integer, got {found}")]
    NotAnInteger { property: String, found: String },

    #[error("property '{property}' requires text, got {found}")]
    NotText { property: String, found: String },

    #[error("property '{property}' requires 'left', 'center' or 'right', got {found}")]
    InvalidAlignment { property: String, found: String },

    #[error("property '{property}' requires a CSS color name or hex code, got {found}")]
    InvalidColor { property: String, found: String },
}

static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").expect("valid pattern")
});

const CSS_COLORS: &[&str] = &[
    "aliceblue", "antiquewhite", "aqua", "aquamarine", "azure", "beige", "bisque", "black",
    "blanchedalmond", "blue", "blueviolet", "brown", "burlywood", "cadetblue", "chartreuse",
    "chocolate", "coral", "cornflowerblue", "cornsilk", "crimson", "cyan", "darkblue", "darkcyan",
    "darkgoldenrod", "darkgray", "darkgreen", "darkgrey", "darkkhaki", "darkmagenta",
    "darkolivegreen", "darkorange", "darkorchid", "darkred", "darksalmon", "darkseagreen",
    "darkslateblue", "darkslategray", "darkslategrey", "darkturquoise", "darkviolet", "deeppink",
    "deepskyblue", "dimgray", "dimgrey", "dodgerblue", "firebrick", "floralwhite", "forestgreen",
    "fuchsia", "gainsboro", "ghostwhite", "gold", "goldenrod", "gray", "green", "greenyellow",
    "grey", "honeydew", "hotpink", "indianred", "indigo", "ivory", "khaki", "lavender",
    "lavenderblush", "lawngreen", "lemonchiffon", "lightblue", "lightcoral", "lightcyan",
    "lightgoldenrodyellow", "lightgray", "lightgreen", "lightgrey", "lightpink", "lightsalmon",
    "lightseagreen", "lightskyblue", "lightslategray", "lightslategrey", "lightsteelblue",
    "lightyellow", "lime", "limegreen", "linen", "magenta", "maroon", "mediumaquamarine",
    "mediumblue", "mediumorchid", "mediumpurple", "mediumseagreen", "mediumslateblue",
    "mediumspringgreen", "mediumturquoise", "mediumvioletred", "midnightblue", "mintcream",
    "mistyrose", "moccasin", "navajowhite", "navy", "oldlace", "olive", "olivedrab", "orange",
    "orangered", "orchid", "palegoldenrod", "palegreen", "paleturquoise", "palevioletred",
    "papayawhip", "peachpuff", "peru", "pink", "plum", "powderblue", "purple", "rebeccapurple",
    "red", "rosybrown", "royalblue", "saddlebrown", "salmon", "sandybrown", "seagreen",
    "seashell", "sienna", "silver", "skyblue", "slateblue", "slategray", "slategrey", "snow",
    "springgreen", "steelblue", "tan", "teal", "thistle", "tomato", "turquoise", "violet",
    "wheat", "white", "whitesmoke", "yellow", "yellowgreen",
];

/// Validation rule of a component property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Integer,
    Text,
    TextAlignment,
    Color,
}

impl PropertyKind {
    /// Check an evaluated value against this rule.
    pub fn validate(&self, value: &Value, property: &str) -> Result<(), RegistryError> {
        match self {
            PropertyKind::Integer => match value {
                Value::Num(n) if n.fract() == 0.0 => Ok(()),
                other => Err(RegistryError::NotAnInteger {
                    property: property.to_string(),
                    found: other.display_string(),
                }),
            },
            PropertyKind::Text => match value {
                Value::Str(_) | Value::Num(_) | Value::Datetime(_) => Ok(()),
                other => Err(RegistryError::NotText {
                    property: property.to_string(),
                    found: other.display_string(),
                }),
            },
            PropertyKind::TextAlignment => match value {
                Value::Str(s) if matches!(s.as_str(), "left" | "center" | "right") => Ok(()),
                other => Err(RegistryError::InvalidAlignment {
                    property: property.to_string(),
                    found: other.display_string(),
                }),
            },
            PropertyKind::Color => match value {
                Value::Str(s)
                    if CSS_COLORS.contains(&s.to_lowercase().as_str())
                        || HEX_COLOR.is_match(s) =>
                {
                    Ok(())
                }
                other => Err(RegistryError::InvalidColor {
                    property: property.to_string(),
                    found: other.display_string(),
                }),
            },
        }
    }
}

/// Declared property of a component type: its default and its rule.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub initial: Value,
    pub kind: PropertyKind,
}

impl PropertyDescriptor {
    fn integer(n: f64) -> PropertyDescriptor {
        PropertyDescriptor {
            initial: Value::Num(n),
            kind: PropertyKind::Integer,
        }
    }

    fn text(s: &str) -> PropertyDescriptor {
        PropertyDescriptor {
            initial: Value::Str(s.to_string()),
            kind: PropertyKind::Text,
        }
    }

    fn color(s: &str) -> PropertyDescriptor {
        PropertyDescriptor {
            initial: Value::Str(s.to_string()),
            kind: PropertyKind::Color,
        }
    }
}

/// A component type: its parent in the extension chain and its own
/// properties. Inherited properties are found by walking the chain.
#[derive(Debug, Clone)]
pub struct ComponentType {
    pub parent: Option<String>,
    /// Abstract types structure the hierarchy but cannot be placed on a
    /// form; external inspection of them yields nothing.
    pub abstract_type: bool,
    pub properties: HashMap<String, PropertyDescriptor>,
}

/// The component type registry.
///
/// The form parser consults it to classify block keys, the evaluator to
/// validate computed property values and fill in defaults.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: HashMap<String, ComponentType>,
}

impl TypeRegistry {
    pub fn new() -> TypeRegistry {
        TypeRegistry {
            types: HashMap::new(),
        }
    }

    /// The built-in component types.
    ///
    /// `Base` (abstract) carries the geometry and color properties every
    /// component has; `SimpleBox` makes it placeable; `Canvas` is the
    /// (abstract) root type; `TextBox` adds the text properties.
    pub fn with_builtins() -> TypeRegistry {
        let mut registry = TypeRegistry::new();

        let defs: &[(&str, Option<&str>, bool, &[(&str, PropertyDescriptor)])] = &[
            (
                "Base",
                None,
                true,
                &[
                    ("Top", PropertyDescriptor::integer(10.0)),
                    ("Bottom", PropertyDescriptor::integer(0.0)),
                    ("Left", PropertyDescriptor::integer(10.0)),
                    ("Width", PropertyDescriptor::integer(100.0)),
                    ("Height", PropertyDescriptor::integer(50.0)),
                    ("Color", PropertyDescriptor::color("Black")),
                    ("BackgroundColor", PropertyDescriptor::color("White")),
                    ("Border", PropertyDescriptor::integer(1.0)),
                    ("ZIndex", PropertyDescriptor::integer(0.0)),
                ],
            ),
            ("SimpleBox", Some("Base"), false, &[]),
            ("Canvas", Some("SimpleBox"), true, &[]),
            (
                "TextBox",
                Some("SimpleBox"),
                false,
                &[
                    ("Text", PropertyDescriptor::text("No Text")),
                    (
                        "TextAlignment",
                        PropertyDescriptor {
                            initial: Value::Str("left".to_string()),
                            kind: PropertyKind::TextAlignment,
                        },
                    ),
                    ("FontSize", PropertyDescriptor::integer(14.0)),
                    ("FontFamily", PropertyDescriptor::text("Arial")),
                ],
            ),
        ];

        for (name, parent, abstract_type, properties) in defs {
            let ty = ComponentType {
                parent: parent.map(str::to_string),
                abstract_type: *abstract_type,
                properties: properties
                    .iter()
                    .map(|(key, desc)| (key.to_string(), desc.clone()))
                    .collect(),
            };
            // the built-in table is well-formed
            let _ = registry.register(name, ty);
        }

        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        component_type: ComponentType,
    ) -> Result<(), RegistryError> {
        if self.types.contains_key(name) {
            return Err(RegistryError::DuplicateType {
                name: name.to_string(),
            });
        }
        if let Some(parent) = &component_type.parent {
            if parent == name {
                return Err(RegistryError::SelfExtend {
                    name: name.to_string(),
                });
            }
            if !self.types.contains_key(parent) {
                return Err(RegistryError::UnknownParent {
                    name: name.to_string(),
                    parent: parent.clone(),
                });
            }
        }
        self.types.insert(name.to_string(), component_type);
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Look up a property of `type_name`, walking the extension chain.
    ///
    /// With `internal` false, abstract types answer no queries at all; the
    /// parser uses the internal view when it synthesizes the root canvas.
    pub fn inspect(
        &self,
        internal: bool,
        type_name: &str,
        property: &str,
    ) -> Option<&PropertyDescriptor> {
        let ty = self.types.get(type_name)?;
        if !internal && ty.abstract_type {
            return None;
        }

        let mut current = Some(ty);
        while let Some(ty) = current {
            if let Some(descriptor) = ty.properties.get(property) {
                return Some(descriptor);
            }
            current = ty.parent.as_deref().and_then(|p| self.types.get(p));
        }
        None
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        TypeRegistry::with_builtins()
    }
}
