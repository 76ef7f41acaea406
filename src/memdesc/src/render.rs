//! Serialisation of descriptor/value pairs (spec §4.3, §6). Two renderings
//! are provided out of the box: [`SerializeOptions::default_brace_dot`]
//! (the `{ .key = value }` notation) and [`SerializeOptions::json`].

use std::sync::Arc;

use crate::descriptor::{DescKind, Descriptor};
use crate::value::Value;

type Int64Producer = dyn Fn(i64) -> String + Send + Sync;
type UInt64Producer = dyn Fn(u64) -> String + Send + Sync;
type DoubleProducer = dyn Fn(f64) -> String + Send + Sync;
type BoolProducer = dyn Fn(bool) -> String + Send + Sync;
type PointerProducer = dyn Fn(Option<&str>) -> String + Send + Sync;
type StringProducer = dyn Fn(Option<&str>) -> String + Send + Sync;
type EnumProducer = dyn Fn(Option<&str>, i64) -> String + Send + Sync;
type StructureMemberProducer = dyn Fn(&Shape, &str, &str) -> String + Send + Sync;
type ArrayItemProducer = dyn Fn(&Shape, usize, &str) -> String + Send + Sync;
type StructureProducer = dyn Fn(&Shape, usize, &[String]) -> String + Send + Sync;
type ArrayProducer = dyn Fn(&Shape, usize, &[String]) -> String + Send + Sync;

/// The eleven pluggable rendering callbacks (spec §4.3): one per scalar
/// kind, plus the structure-member/array-item joiners and the two
/// container wrappers.
#[derive(Clone)]
pub struct Producers {
    pub int64: Arc<Int64Producer>,
    pub uint64: Arc<UInt64Producer>,
    pub double: Arc<DoubleProducer>,
    pub boolean: Arc<BoolProducer>,
    pub pointer: Arc<PointerProducer>,
    pub string: Arc<StringProducer>,
    pub enumeration: Arc<EnumProducer>,
    pub structure_member: Arc<StructureMemberProducer>,
    pub array_item: Arc<ArrayItemProducer>,
    pub structure: Arc<StructureProducer>,
    pub array: Arc<ArrayProducer>,
}

/// A `start`/`end` bracket pair with a per-depth `indent` (spec §6).
#[derive(Clone, Default)]
pub struct Surround {
    pub start: String,
    pub end: String,
    pub indent: String,
}

impl Surround {
    fn new(start: &str, end: &str, indent: &str) -> Surround {
        Surround { start: start.to_string(), end: end.to_string(), indent: indent.to_string() }
    }

    fn pad(&self, depth: usize) -> String {
        self.indent.repeat(depth)
    }
}

/// Bundles the surround strings for one of `key` (structure) or `index`
/// (array) plus the shared `container`/`value`/`description` shapes.
#[derive(Clone)]
pub struct Shape {
    pub container: Surround,
    pub key: Surround,
    pub value: Surround,
    pub description: Option<Surround>,
}

#[derive(Clone)]
pub struct SerializeOptions {
    pub producers: Producers,
    pub structure_shape: Shape,
    pub array_shape: Shape,
    pub separator: String,
    pub show_key: bool,
    pub detailed: bool,
    pub show_description: bool,
    pub show_index: bool,
}

impl SerializeOptions {
    /// The default brace-and-dot rendering (spec §6).
    pub fn default_brace_dot() -> SerializeOptions {
        SerializeOptions {
            producers: Producers {
                int64: Arc::new(|v| v.to_string()),
                uint64: Arc::new(|v| v.to_string()),
                double: Arc::new(|v| format!("{v}")),
                boolean: Arc::new(|v| v.to_string()),
                pointer: Arc::new(|inner| match inner {
                    Some(rendered) => rendered.to_string(),
                    None => "NULL".to_string(),
                }),
                string: Arc::new(|s| match s {
                    Some(s) => format!("\"{}\"", escape_c(s)),
                    None => "NULL".to_string(),
                }),
                enumeration: Arc::new(|name, raw| match name {
                    Some(name) => format!("\"{name}\""),
                    None => raw.to_string(),
                }),
                structure_member: Arc::new(|shape, key, value| format!("{}{key}{} = {value}", shape.key.start, shape.key.end)),
                array_item: Arc::new(|shape, index, value| format!("{}{index}{} = {value}", shape.key.start, shape.key.end)),
                structure: Arc::new(|shape, depth, members| brace_join(shape, depth, members)),
                array: Arc::new(|shape, depth, items| brace_join(shape, depth, items)),
            },
            structure_shape: Shape {
                container: Surround::new("{", "}", "    "),
                key: Surround::new(".", "", ""),
                value: Surround::new("", "", ""),
                description: Some(Surround::new(" /* ", " */", "")),
            },
            array_shape: Shape {
                container: Surround::new("{", "}", "    "),
                key: Surround::new("[", "]", ""),
                value: Surround::new("", "", ""),
                description: None,
            },
            separator: ",\n".to_string(),
            show_key: true,
            detailed: false,
            show_description: false,
            show_index: true,
        }
    }

    /// JSON rendering: substitutes surround strings and overrides the
    /// primitive producers with RFC-8259-compliant ones (spec §6).
    pub fn json() -> SerializeOptions {
        SerializeOptions {
            producers: Producers {
                int64: Arc::new(|v| v.to_string()),
                uint64: Arc::new(|v| v.to_string()),
                double: Arc::new(|v| {
                    if v.fract() == 0.0 && v.is_finite() {
                        format!("{v:.1}")
                    } else {
                        format!("{v}")
                    }
                }),
                boolean: Arc::new(|v| v.to_string()),
                pointer: Arc::new(|inner| match inner {
                    Some(rendered) => rendered.to_string(),
                    None => "null".to_string(),
                }),
                string: Arc::new(|s| match s {
                    Some(s) => format!("\"{}\"", escape_json(s)),
                    None => "null".to_string(),
                }),
                enumeration: Arc::new(|name, raw| match name {
                    Some(name) => format!("\"{name}\""),
                    None => raw.to_string(),
                }),
                structure_member: Arc::new(|_shape, key, value| format!("\"{key}\": {value}")),
                array_item: Arc::new(|_shape, _index, value| value.to_string()),
                structure: Arc::new(|shape, depth, members| brace_join(shape, depth, members)),
                array: Arc::new(|shape, depth, items| brace_join(shape, depth, items)),
            },
            structure_shape: Shape {
                container: Surround::new("{", "}", "  "),
                key: Surround::new("", "", ""),
                value: Surround::new("", "", ""),
                description: None,
            },
            array_shape: Shape {
                container: Surround::new("[", "]", "  "),
                key: Surround::new("", "", ""),
                value: Surround::new("", "", ""),
                description: None,
            },
            separator: ",\n".to_string(),
            show_key: true,
            detailed: false,
            show_description: false,
            show_index: false,
        }
    }
}

fn brace_join(shape: &Shape, depth: usize, items: &[String]) -> String {
    if items.is_empty() {
        return format!("{}{}", shape.container.start, shape.container.end);
    }
    let pad = shape.container.pad(depth + 1);
    let closing_pad = shape.container.pad(depth);
    let body = items
        .iter()
        .map(|item| format!("{pad}{item}"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("{}\n{body}\n{closing_pad}{}", shape.container.start, shape.container.end)
}

fn escape_c(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || (c as u32) == 0x7f => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn escape_json(s: &str) -> String {
    let mut out = String::new();
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Renders `v` (described by `d`) under `opts` (spec §4.3, §6).
pub fn render(d: &Descriptor, v: &Value, opts: &SerializeOptions) -> String {
    render_at(d, v, opts, 0)
}

fn render_at(d: &Descriptor, v: &Value, opts: &SerializeOptions, depth: usize) -> String {
    let p = &opts.producers;

    match (&d.kind, v) {
        (Some(DescKind::Struct(members)), Value::Struct(fields)) => {
            let rendered: Vec<String> = members
                .iter()
                .zip(fields.iter())
                .filter(|(m, _)| opts.detailed || !m.detail)
                .map(|(m, field)| {
                    let value_str = render_at(&m.base, field, opts, depth + 1);
                    if opts.show_key {
                        (p.structure_member)(&opts.structure_shape, m.name, &value_str)
                    } else {
                        value_str
                    }
                })
                .collect();
            (p.structure)(&opts.structure_shape, depth, &rendered)
        }
        (Some(DescKind::Array(element)), _) => {
            let array_ops = match &d.ops.array {
                Some(a) => a,
                None => return "[]".to_string(),
            };
            let len = (array_ops.get_length)(v);
            let rendered: Vec<String> = (0..len)
                .filter_map(|i| (array_ops.get_element)(v, i).ok().map(|elem| (i, elem)))
                .map(|(i, elem)| {
                    let value_str = render_at(element, &elem, opts, depth + 1);
                    if opts.show_index {
                        (p.array_item)(&opts.array_shape, i, &value_str)
                    } else {
                        value_str
                    }
                })
                .collect();
            (p.array)(&opts.array_shape, depth, &rendered)
        }
        (Some(DescKind::Pointer(target)), Value::Pointer(inner)) => {
            let rendered = inner.as_ref().map(|boxed| render_at(target, boxed, opts, depth));
            (p.pointer)(rendered.as_deref())
        }
        (Some(DescKind::Enum(mapping)), _) => {
            let raw = v.as_int64().unwrap_or(0);
            let name = match &d.ops.enum_ops {
                Some(ops) => (ops.to_str)(raw),
                None => mapping.to_str(raw),
            };
            (p.enumeration)(name, raw)
        }
        _ => match v {
            Value::UInt(n) => (p.uint64)(*n),
            Value::Int(n) => (p.int64)(*n),
            Value::Bool(b) => (p.boolean)(*b),
            Value::Double(f) => (p.double)(*f),
            Value::OwnedString(s) => (p.string)(s.as_deref()),
            Value::BorrowedString(s) => (p.string)(*s),
            Value::Pointer(inner) => (p.pointer)(inner.as_ref().map(|_| "").as_deref()),
            Value::Enum(n) => (p.enumeration)(None, *n),
            Value::Struct(_) | Value::Array(_) | Value::HandleArray(_) => String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{EnumMapping, Member};
    use crate::ty::Type;
    use std::sync::Arc as StdArc;

    #[test]
    fn renders_scalar_under_default_and_json() {
        let d = Descriptor::scalar(Type::U32).unwrap();
        let v = Value::UInt(42);
        assert_eq!(render(&d, &v, &SerializeOptions::default_brace_dot()), "42");
        assert_eq!(render(&d, &v, &SerializeOptions::json()), "42");
    }

    #[test]
    fn renders_struct_with_dotted_keys() {
        let x = StdArc::new(Descriptor::scalar(Type::U32).unwrap());
        let d = Descriptor::structure(
            4,
            vec![Member { base: x, name: "x", offset: 0, optional: false, detail: false }],
        )
        .unwrap();
        let v = Value::Struct(vec![Value::UInt(7)]);
        let out = render(&d, &v, &SerializeOptions::default_brace_dot());
        assert!(out.contains(".x = 7"), "{out}");
    }

    #[test]
    fn renders_struct_as_json_object() {
        let x = StdArc::new(Descriptor::scalar(Type::U32).unwrap());
        let d = Descriptor::structure(
            4,
            vec![Member { base: x, name: "x", offset: 0, optional: false, detail: false }],
        )
        .unwrap();
        let v = Value::Struct(vec![Value::UInt(7)]);
        let out = render(&d, &v, &SerializeOptions::json());
        assert!(out.contains("\"x\": 7"), "{out}");
    }

    #[test]
    fn string_escapes_match_c_style() {
        let d = Descriptor::scalar(Type::OwnedString).unwrap();
        let v = Value::OwnedString(Some("a\tb\"c".to_string()));
        let out = render(&d, &v, &SerializeOptions::default_brace_dot());
        assert_eq!(out, "\"a\\tb\\\"c\"");
    }

    #[test]
    fn enum_renders_mapped_name() {
        let mapping = EnumMapping { entries: vec![("one", 1), ("two", 2)] };
        let d = Descriptor::enumeration(2, mapping).unwrap();
        let out = render(&d, &Value::Enum(1), &SerializeOptions::default_brace_dot());
        assert_eq!(out, "\"one\"");
        let out_unmapped = render(&d, &Value::Enum(9), &SerializeOptions::default_brace_dot());
        assert_eq!(out_unmapped, "9");
    }
}
