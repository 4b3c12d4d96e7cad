//! Structural description of JSON artifacts.
//!
//! Artifacts carry no schema, so code written against them has to guess
//! field names. [`Shape`] answers "what keys and types does this artifact
//! have?" without dumping the data itself: arrays are summarized by length
//! plus the merged shape of their elements, and keys missing from some
//! elements are marked optional.
//!
//! ```text
//! list[2] of {
//!   linked_service: string
//!   name: string
//!   folder?: string | null
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Nesting depth below which values are summarized as [`Shape::Elided`].
pub const DEFAULT_MAX_DEPTH: usize = 6;

/// How many array elements are merged into the element shape.
pub const DEFAULT_MAX_SAMPLES: usize = 50;

/// Limits for [`Shape::with_options`].
#[derive(Debug, Clone, Copy)]
pub struct ShapeOptions {
    pub max_depth: usize,
    pub max_samples: usize,
}

impl Default for ShapeOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }
}

/// Inferred structure of a JSON value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Shape {
    Null,
    Bool,
    Number,
    String,
    Array {
        len: usize,
        /// Merged shape of the sampled elements; `None` for empty arrays.
        items: Option<Box<Shape>>,
    },
    Object {
        fields: BTreeMap<String, Field>,
    },
    /// Values of differing kinds seen at the same position.
    Union { variants: Vec<Shape> },
    /// Nested deeper than the configured limit.
    Elided,
}

/// One key of an object shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub shape: Shape,
    /// Absent from at least one sampled object.
    pub optional: bool,
}

impl Shape {
    /// Describe a value with the default limits.
    pub fn of(value: &Value) -> Self {
        Self::with_options(value, ShapeOptions::default())
    }

    pub fn with_options(value: &Value, options: ShapeOptions) -> Self {
        describe(value, options, 0)
    }

    /// Short type label used when rendering (`string`, `list[3]`, ...).
    pub fn label(&self) -> String {
        match self {
            Shape::Null => "null".into(),
            Shape::Bool => "bool".into(),
            Shape::Number => "number".into(),
            Shape::String => "string".into(),
            Shape::Array { len, .. } => format!("list[{len}]"),
            Shape::Object { .. } => "object".into(),
            Shape::Union { .. } => "union".into(),
            Shape::Elided => "...".into(),
        }
    }

    fn kind(&self) -> u8 {
        match self {
            Shape::Null => 0,
            Shape::Bool => 1,
            Shape::Number => 2,
            Shape::String => 3,
            Shape::Array { .. } => 4,
            Shape::Object { .. } => 5,
            Shape::Union { .. } => 6,
            Shape::Elided => 7,
        }
    }

    /// Combine two shapes observed at the same position.
    pub fn merge(self, other: Shape) -> Shape {
        match (self, other) {
            (Shape::Union { variants }, other) => union_with(variants, other),
            (this, Shape::Union { variants }) => {
                let mut merged = Shape::Union {
                    variants: vec![this],
                };
                for v in variants {
                    merged = merged.merge(v);
                }
                merged
            }
            (Shape::Array { len: a, items: ia }, Shape::Array { len: b, items: ib }) => {
                let items = match (ia, ib) {
                    (Some(x), Some(y)) => Some(Box::new(x.merge(*y))),
                    (x, y) => x.or(y),
                };
                Shape::Array {
                    len: a.max(b),
                    items,
                }
            }
            (Shape::Object { fields: ours }, Shape::Object { fields: mut theirs }) => {
                let mut fields = BTreeMap::new();
                for (key, field) in ours {
                    let merged = match theirs.remove(&key) {
                        Some(other) => Field {
                            optional: field.optional || other.optional,
                            shape: field.shape.merge(other.shape),
                        },
                        None => Field {
                            shape: field.shape,
                            optional: true,
                        },
                    };
                    fields.insert(key, merged);
                }
                for (key, other) in theirs {
                    fields.insert(
                        key,
                        Field {
                            shape: other.shape,
                            optional: true,
                        },
                    );
                }
                Shape::Object { fields }
            }
            (a, b) if a.kind() == b.kind() => a,
            (a, b) => Shape::Union {
                variants: vec![a, b],
            },
        }
    }

    fn render(&self, out: &mut String, indent: usize) {
        match self {
            Shape::Array { len, items } => {
                out.push_str(&format!("list[{len}]"));
                if let Some(items) = items {
                    out.push_str(" of ");
                    let wrap = matches!(**items, Shape::Union { .. });
                    if wrap {
                        out.push('(');
                    }
                    items.render(out, indent);
                    if wrap {
                        out.push(')');
                    }
                }
            }
            Shape::Object { fields } => {
                if fields.is_empty() {
                    out.push_str("{}");
                    return;
                }
                out.push_str("{\n");
                let pad = "  ".repeat(indent + 1);
                // Required keys first, then optional ones; alphabetical within each.
                let ordered = fields
                    .iter()
                    .filter(|(_, f)| !f.optional)
                    .chain(fields.iter().filter(|(_, f)| f.optional));
                for (key, field) in ordered {
                    out.push_str(&pad);
                    out.push_str(key);
                    if field.optional {
                        out.push('?');
                    }
                    out.push_str(": ");
                    field.shape.render(out, indent + 1);
                    out.push('\n');
                }
                out.push_str(&"  ".repeat(indent));
                out.push('}');
            }
            Shape::Union { variants } => {
                for (i, v) in variants.iter().enumerate() {
                    if i > 0 {
                        out.push_str(" | ");
                    }
                    v.render(out, indent);
                }
            }
            other => out.push_str(&other.label()),
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render(&mut out, 0);
        f.write_str(&out)
    }
}

fn union_with(mut variants: Vec<Shape>, other: Shape) -> Shape {
    if let Shape::Union { variants: more } = other {
        let mut merged = Shape::Union { variants };
        for v in more {
            merged = merged.merge(v);
        }
        return merged;
    }
    match variants.iter().position(|v| v.kind() == other.kind()) {
        Some(i) => {
            let existing = variants.remove(i);
            variants.insert(i, existing.merge(other));
        }
        None => variants.push(other),
    }
    Shape::Union { variants }
}

fn describe(value: &Value, options: ShapeOptions, depth: usize) -> Shape {
    match value {
        Value::Null => Shape::Null,
        Value::Bool(_) => Shape::Bool,
        Value::Number(_) => Shape::Number,
        Value::String(_) => Shape::String,
        _ if depth >= options.max_depth => Shape::Elided,
        Value::Array(items) => {
            let items_shape = items
                .iter()
                .take(options.max_samples)
                .map(|v| describe(v, options, depth + 1))
                .reduce(Shape::merge);
            Shape::Array {
                len: items.len(),
                items: items_shape.map(Box::new),
            }
        }
        Value::Object(map) => Shape::Object {
            fields: map
                .iter()
                .map(|(k, v)| {
                    (
                        k.clone(),
                        Field {
                            shape: describe(v, options, depth + 1),
                            optional: false,
                        },
                    )
                })
                .collect(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars() {
        assert_eq!(Shape::of(&json!(null)), Shape::Null);
        assert_eq!(Shape::of(&json!(true)), Shape::Bool);
        assert_eq!(Shape::of(&json!(1.5)), Shape::Number);
        assert_eq!(Shape::of(&json!("x")), Shape::String);
    }

    #[test]
    fn array_of_objects_marks_missing_keys_optional() {
        let shape = Shape::of(&json!([
            {"name": "d1", "linked_service": "ls1"},
            {"name": "d2", "linked_service": "ls2", "folder": "raw"}
        ]));
        let Shape::Array { len, items } = &shape else {
            panic!("expected array, got {shape:?}");
        };
        assert_eq!(*len, 2);
        let Some(items) = items else {
            panic!("expected element shape");
        };
        let Shape::Object { fields } = items.as_ref() else {
            panic!("expected object elements");
        };
        assert!(!fields["name"].optional);
        assert!(!fields["linked_service"].optional);
        assert!(fields["folder"].optional);
    }

    #[test]
    fn key_missing_from_first_element_is_optional() {
        let shape = Shape::of(&json!([{"a": 1}, {"a": 2, "b": 3}, {"a": 3}]));
        let rendered = shape.to_string();
        assert!(rendered.contains("  a: number\n"), "got: {rendered}");
        assert!(rendered.contains("  b?: number\n"), "got: {rendered}");
    }

    #[test]
    fn optional_key_stays_optional_across_later_elements() {
        let shape = Shape::of(&json!([{"a": 1, "b": 1}, {"a": 2}, {"a": 3, "b": 2}]));
        let rendered = shape.to_string();
        assert!(rendered.contains("  b?: number\n"), "got: {rendered}");
        assert!(rendered.contains("  a: number\n"), "got: {rendered}");
    }

    #[test]
    fn mixed_kinds_become_union() {
        let shape = Shape::of(&json!([{"folder": "raw"}, {"folder": null}]));
        assert_eq!(shape.to_string(), "list[2] of {\n  folder: string | null\n}");
    }

    #[test]
    fn array_of_mixed_scalars_is_parenthesized() {
        let shape = Shape::of(&json!(["a", 1, "b"]));
        assert_eq!(shape.to_string(), "list[3] of (string | number)");
    }

    #[test]
    fn empty_containers() {
        assert_eq!(Shape::of(&json!([])).to_string(), "list[0]");
        assert_eq!(Shape::of(&json!({})).to_string(), "{}");
    }

    #[test]
    fn nested_rendering_indents() {
        let shape = Shape::of(&json!({
            "name": "p1",
            "properties": {"activities": [{"type": "Copy"}]}
        }));
        assert_eq!(
            shape.to_string(),
            "{\n  name: string\n  properties: {\n    activities: list[1] of {\n      type: string\n    }\n  }\n}"
        );
    }

    #[test]
    fn depth_limit_elides() {
        let shape = Shape::with_options(
            &json!({"a": {"b": {"c": 1}}}),
            ShapeOptions {
                max_depth: 2,
                max_samples: 10,
            },
        );
        assert_eq!(shape.to_string(), "{\n  a: {\n    b: ...\n  }\n}");
    }

    #[test]
    fn sampling_limits_merged_elements() {
        let shape = Shape::with_options(
            &json!([{"a": 1}, {"a": 2}, {"z": 3}]),
            ShapeOptions {
                max_depth: 6,
                max_samples: 2,
            },
        );
        let rendered = shape.to_string();
        assert!(rendered.starts_with("list[3] of {"));
        assert!(!rendered.contains('z'));
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(Shape::of(&json!({"n": 1}))).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["fields"]["n"]["shape"]["type"], "number");
        assert_eq!(json["fields"]["n"]["optional"], false);
    }
}
