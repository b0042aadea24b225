//! The schema algebra and JSON validation
//!
//! A step's parameter and return types derive [`JsonSchema`]. The generated
//! JSON Schema document is converted once, by [`Schema::from_json_schema`],
//! into a closed [`Schema`], rejecting anything without a fixed shape. The
//! same schema is rendered back as JSON Schema for the exported document and
//! used to validate values crossing the invocation boundary.

use crate::core::error::{BridgeError, Result, ShapeMismatch};
use schemars::JsonSchema;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Scalar JSON types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    String,
    /// Whole number, bounded by the range of the declared Rust type
    Integer {
        min: Option<i128>,
        max: Option<i128>,
    },
    Number,
    Boolean,
    Null,
}

impl Primitive {
    pub fn json_type(self) -> &'static str {
        match self {
            Primitive::String => "string",
            Primitive::Integer { .. } => "integer",
            Primitive::Number => "number",
            Primitive::Boolean => "boolean",
            Primitive::Null => "null",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Primitive::String => value.is_string(),
            Primitive::Integer { min, max } => integer_value(value).is_some_and(|v| {
                min.map_or(true, |lower| v >= lower) && max.map_or(true, |upper| v <= upper)
            }),
            Primitive::Number => value.is_number(),
            Primitive::Boolean => value.is_boolean(),
            Primitive::Null => value.is_null(),
        }
    }

    fn shape(self) -> String {
        match self {
            Primitive::Integer {
                min: Some(lower),
                max: Some(upper),
            } => format!("integer in [{}, {}]", lower, upper),
            Primitive::Integer {
                min: Some(lower),
                max: None,
            } => format!("integer >= {}", lower),
            Primitive::Integer {
                min: None,
                max: Some(upper),
            } => format!("integer <= {}", upper),
            other => other.json_type().to_string(),
        }
    }
}

/// Where a schema is being generated, for error messages
#[derive(Debug, Clone, Copy)]
pub struct SchemaSite<'a> {
    pub step: &'a str,
    pub param: &'a str,
}

/// The structural description of a value
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    Primitive(Primitive),
    Record {
        title: String,
        fields: Vec<SchemaField>,
    },
    Sequence(Box<Schema>),
    /// Object with string keys and uniformly typed values
    Mapping(Box<Schema>),
    Enum {
        title: String,
        values: Vec<Value>,
    },
    /// Either the inner schema or an explicit null
    Optional(Box<Schema>),
    Union(Vec<Schema>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub name: String,
    pub schema: Schema,
    pub description: Option<String>,
    /// Whether deserialization needs the field to be present
    pub required: bool,
}

impl SchemaField {
    pub fn is_required(&self) -> bool {
        self.required
    }
}

impl Schema {
    /// Generate the schema for `T` from its derived JSON Schema
    pub fn of<T: JsonSchema + ?Sized>(site: SchemaSite<'_>) -> Result<Schema> {
        Self::from_json_schema(&schemars::schema_for!(T), site)
    }

    /// Convert a generated JSON Schema document.
    ///
    /// Fails with `UnsupportedType` for open forms (`true`, `{}`, objects with
    /// unconstrained values), mappings keyed by anything but strings, tuples,
    /// intersections, empty enumerations or unions, and recursive types.
    pub fn from_json_schema(root: &schemars::Schema, site: SchemaSite<'_>) -> Result<Schema> {
        let root = root.as_value();
        let mut converter = Converter {
            site,
            defs: root.get("$defs").and_then(Value::as_object),
            resolving: Vec::new(),
        };
        converter.convert(root, "$", None)
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Schema::Optional(_))
    }

    /// Render as a JSON Schema document.
    ///
    /// Output is a pure function of the schema; record fields keep their
    /// declaration order.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Schema::Primitive(Primitive::Integer { min, max }) => {
                let mut object = Map::new();
                object.insert("type".to_string(), json!("integer"));
                if let Some(lower) = min {
                    object.insert("minimum".to_string(), bound_value(*lower));
                }
                if let Some(upper) = max {
                    object.insert("maximum".to_string(), bound_value(*upper));
                }
                Value::Object(object)
            }
            Schema::Primitive(primitive) => json!({ "type": primitive.json_type() }),
            Schema::Record { title, fields } => {
                let mut properties = Map::new();
                for field in fields {
                    let mut rendered = field.schema.to_json_schema();
                    if let (Some(description), Value::Object(object)) =
                        (&field.description, &mut rendered)
                    {
                        object.insert("description".to_string(), json!(description));
                    }
                    properties.insert(field.name.clone(), rendered);
                }
                let required: Vec<&str> = fields
                    .iter()
                    .filter(|f| f.is_required())
                    .map(|f| f.name.as_str())
                    .collect();

                let mut object = Map::new();
                object.insert("title".to_string(), json!(title));
                object.insert("type".to_string(), json!("object"));
                object.insert("properties".to_string(), Value::Object(properties));
                if !required.is_empty() {
                    object.insert("required".to_string(), json!(required));
                }
                Value::Object(object)
            }
            Schema::Sequence(items) => json!({
                "type": "array",
                "items": items.to_json_schema(),
            }),
            Schema::Mapping(values) => json!({
                "type": "object",
                "additionalProperties": values.to_json_schema(),
            }),
            Schema::Enum { title, values } => {
                let mut object = Map::new();
                object.insert("title".to_string(), json!(title));
                object.insert("enum".to_string(), Value::Array(values.clone()));
                if let Some(kind) = homogeneous_type(values) {
                    object.insert("type".to_string(), json!(kind));
                }
                Value::Object(object)
            }
            Schema::Optional(inner) => json!({
                "anyOf": [inner.to_json_schema(), { "type": "null" }],
            }),
            Schema::Union(variants) => json!({
                "anyOf": variants.iter().map(Schema::to_json_schema).collect::<Vec<_>>(),
            }),
        }
    }

    /// Short human-readable description of the expected shape
    pub fn shape(&self) -> String {
        match self {
            Schema::Primitive(primitive) => primitive.shape(),
            Schema::Record { title, .. } => format!("object {}", title),
            Schema::Sequence(items) => format!("array of {}", items.shape()),
            Schema::Mapping(values) => format!("map of {}", values.shape()),
            Schema::Enum { title, values } => {
                let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
                format!("{} (one of {})", title, rendered.join(", "))
            }
            Schema::Optional(inner) => format!("{} or null", inner.shape()),
            Schema::Union(variants) => {
                let rendered: Vec<String> = variants.iter().map(Schema::shape).collect();
                format!("any of [{}]", rendered.join(", "))
            }
        }
    }

    /// Check that `value` conforms to this schema
    pub fn validate(&self, value: &Value) -> std::result::Result<(), ShapeMismatch> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> std::result::Result<(), ShapeMismatch> {
        let mismatch = || ShapeMismatch {
            path: path.to_string(),
            expected: self.shape(),
            actual: value_shape(value).to_string(),
        };

        match self {
            Schema::Primitive(primitive) => {
                if primitive.accepts(value) {
                    Ok(())
                } else if let (Primitive::Integer { .. }, Some(out_of_range)) =
                    (primitive, integer_value(value))
                {
                    Err(ShapeMismatch {
                        actual: format!("integer {}", out_of_range),
                        ..mismatch()
                    })
                } else {
                    Err(mismatch())
                }
            }
            Schema::Record { fields, .. } => {
                let object = value.as_object().ok_or_else(mismatch)?;
                for field in fields {
                    let field_path = format!("{}.{}", path, field.name);
                    match object.get(&field.name) {
                        Some(field_value) => field.schema.validate_at(field_value, &field_path)?,
                        None if field.is_required() => {
                            return Err(ShapeMismatch {
                                path: field_path,
                                expected: field.schema.shape(),
                                actual: "nothing (field is missing)".to_string(),
                            });
                        }
                        None => {}
                    }
                }
                Ok(())
            }
            Schema::Sequence(items) => {
                let array = value.as_array().ok_or_else(mismatch)?;
                for (index, item) in array.iter().enumerate() {
                    items.validate_at(item, &format!("{}[{}]", path, index))?;
                }
                Ok(())
            }
            Schema::Mapping(values) => {
                let object = value.as_object().ok_or_else(mismatch)?;
                for (key, item) in object {
                    values.validate_at(item, &format!("{}.{}", path, key))?;
                }
                Ok(())
            }
            Schema::Enum { values, .. } => {
                if values.contains(value) {
                    Ok(())
                } else {
                    Err(ShapeMismatch {
                        actual: value.to_string(),
                        ..mismatch()
                    })
                }
            }
            Schema::Optional(inner) => {
                if value.is_null() {
                    Ok(())
                } else {
                    inner.validate_at(value, path)
                }
            }
            Schema::Union(variants) => {
                if variants.iter().any(|v| v.validate_at(value, path).is_ok()) {
                    Ok(())
                } else {
                    Err(mismatch())
                }
            }
        }
    }
}

/// Walks one generated document, resolving `$ref`s against its `$defs`
struct Converter<'a> {
    site: SchemaSite<'a>,
    defs: Option<&'a Map<String, Value>>,
    /// Definitions currently being expanded, outermost first
    resolving: Vec<String>,
}

impl<'a> Converter<'a> {
    fn unsupported(&self, path: &str, reason: impl Into<String>) -> BridgeError {
        BridgeError::UnsupportedType {
            step: self.site.step.to_string(),
            param: self.site.param.to_string(),
            reason: format!("{} (at {})", reason.into(), path),
        }
    }

    /// `name` is the definition `schema` was reached through, if any
    fn convert(&mut self, schema: &'a Value, path: &str, name: Option<&str>) -> Result<Schema> {
        let object = match schema {
            Value::Object(object) => object,
            Value::Bool(true) => {
                return Err(self.unsupported(path, "accepts any value and has no fixed shape"))
            }
            Value::Bool(false) => return Err(self.unsupported(path, "accepts no value")),
            other => {
                return Err(self.unsupported(path, format!("{} is not a schema", value_shape(other))))
            }
        };

        if let Some(reference) = object.get("$ref") {
            return self.convert_ref(reference, path);
        }
        if let Some(parts) = object.get("allOf").and_then(Value::as_array) {
            return match parts.as_slice() {
                [single] => self.convert(single, path, name),
                _ => Err(self.unsupported(path, "intersections (allOf) are not supported")),
            };
        }
        if let Some(constant) = object.get("const") {
            return Ok(Schema::Enum {
                title: title_of(object, name).unwrap_or_else(|| "constant".to_string()),
                values: vec![constant.clone()],
            });
        }
        if let Some(values) = object.get("enum").and_then(Value::as_array) {
            if values.is_empty() {
                return Err(self.unsupported(path, "enumeration has no values"));
            }
            return Ok(Schema::Enum {
                title: title_of(object, name).unwrap_or_else(|| "enum".to_string()),
                values: values.clone(),
            });
        }
        for keyword in ["oneOf", "anyOf"] {
            if let Some(variants) = object.get(keyword).and_then(Value::as_array) {
                return self.convert_variants(variants, object, path, name);
            }
        }

        match object.get("type") {
            Some(Value::String(kind)) => self.convert_typed(kind, object, path, name),
            Some(Value::Array(kinds)) => self.convert_type_list(kinds, object, path, name),
            _ => Err(self.unsupported(path, "declares no type and has no fixed shape")),
        }
    }

    fn convert_ref(&mut self, reference: &'a Value, path: &str) -> Result<Schema> {
        let reference = reference
            .as_str()
            .ok_or_else(|| self.unsupported(path, "$ref is not a string"))?;
        if reference == "#" {
            return Err(self.unsupported(path, "type refers back to itself"));
        }
        let name = reference
            .strip_prefix("#/$defs/")
            .ok_or_else(|| self.unsupported(path, format!("reference '{}' is not local", reference)))?;
        if self.resolving.iter().any(|n| n == name) {
            return Err(self.unsupported(
                path,
                format!("recursive type '{}' has no finite schema", name),
            ));
        }
        let target = self
            .defs
            .and_then(|defs| defs.get(name))
            .ok_or_else(|| self.unsupported(path, format!("reference '{}' has no definition", reference)))?;

        self.resolving.push(name.to_string());
        let converted = self.convert(target, path, Some(name));
        self.resolving.pop();
        converted
    }

    fn convert_variants(
        &mut self,
        variants: &'a [Value],
        object: &Map<String, Value>,
        path: &str,
        name: Option<&str>,
    ) -> Result<Schema> {
        let mut nullable = false;
        let mut kept = Vec::with_capacity(variants.len());
        for variant in variants {
            if is_null_schema(variant) {
                nullable = true;
            } else {
                kept.push(self.convert(variant, path, None)?);
            }
        }

        let schema = if kept.is_empty() {
            if !nullable {
                return Err(self.unsupported(path, "union has no variants"));
            }
            Schema::Primitive(Primitive::Null)
        } else if kept.len() == 1 {
            kept.remove(0)
        } else if kept.iter().all(|s| matches!(s, Schema::Enum { .. })) {
            // Unit variants with documentation arrive as one `const` each
            let values = kept
                .into_iter()
                .flat_map(|s| match s {
                    Schema::Enum { values, .. } => values,
                    _ => Vec::new(),
                })
                .collect();
            Schema::Enum {
                title: title_of(object, name).unwrap_or_else(|| "enum".to_string()),
                values,
            }
        } else {
            Schema::Union(kept)
        };

        Ok(if nullable && !matches!(schema, Schema::Primitive(Primitive::Null)) {
            optional(schema)
        } else {
            schema
        })
    }

    /// `"type": ["string", "null"]` and friends
    fn convert_type_list(
        &mut self,
        kinds: &'a [Value],
        object: &'a Map<String, Value>,
        path: &str,
        name: Option<&str>,
    ) -> Result<Schema> {
        let mut nullable = false;
        let mut variants = Vec::with_capacity(kinds.len());
        for kind in kinds {
            match kind.as_str() {
                Some("null") => nullable = true,
                Some(kind) => variants.push(self.convert_typed(kind, object, path, name)?),
                None => return Err(self.unsupported(path, "type list holds a non-string")),
            }
        }

        let schema = match variants.len() {
            0 => return Ok(Schema::Primitive(Primitive::Null)),
            1 => variants.remove(0),
            _ => Schema::Union(variants),
        };
        Ok(if nullable { optional(schema) } else { schema })
    }

    fn convert_typed(
        &mut self,
        kind: &str,
        object: &'a Map<String, Value>,
        path: &str,
        name: Option<&str>,
    ) -> Result<Schema> {
        match kind {
            "string" => Ok(Schema::Primitive(Primitive::String)),
            "boolean" => Ok(Schema::Primitive(Primitive::Boolean)),
            "number" => Ok(Schema::Primitive(Primitive::Number)),
            "null" => Ok(Schema::Primitive(Primitive::Null)),
            "integer" => {
                let (min, max) = integer_bounds(object);
                Ok(Schema::Primitive(Primitive::Integer { min, max }))
            }
            "array" => {
                if object.contains_key("prefixItems") {
                    return Err(self.unsupported(path, "tuples are not supported; use a record"));
                }
                match object.get("items") {
                    Some(items) => Ok(Schema::Sequence(Box::new(self.convert(
                        items,
                        &format!("{}[]", path),
                        None,
                    )?))),
                    None => Err(self.unsupported(path, "array items have no declared type")),
                }
            }
            "object" => self.convert_object(object, path, name),
            other => Err(self.unsupported(path, format!("unknown type '{}'", other))),
        }
    }

    fn convert_object(
        &mut self,
        object: &'a Map<String, Value>,
        path: &str,
        name: Option<&str>,
    ) -> Result<Schema> {
        if let Some(key_schema) = object.get("propertyNames") {
            if key_schema != &json!({ "type": "string" }) {
                return Err(self.unsupported(
                    path,
                    "mapping keys must be strings to be represented as a JSON object",
                ));
            }
        }
        if object.contains_key("patternProperties") {
            return Err(self.unsupported(path, "pattern-keyed objects are not supported"));
        }

        let additional = object.get("additionalProperties");
        let open_extras = matches!(additional, Some(Value::Bool(true)) | Some(Value::Object(_)));

        match object.get("properties") {
            Some(Value::Object(properties)) => {
                if open_extras {
                    return Err(self.unsupported(path, "records with open extra properties are not supported"));
                }
                let required: HashSet<&str> = object
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|names| names.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();

                let mut fields = Vec::with_capacity(properties.len());
                for (field, field_schema) in properties {
                    let schema = self.convert(field_schema, &format!("{}.{}", path, field), None)?;
                    fields.push(SchemaField {
                        name: field.clone(),
                        schema,
                        description: field_schema
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                        required: required.contains(field.as_str()),
                    });
                }
                Ok(Schema::Record {
                    title: title_of(object, name).unwrap_or_else(|| "object".to_string()),
                    fields,
                })
            }
            Some(_) => Err(self.unsupported(path, "properties is not an object")),
            None => match additional {
                Some(values @ Value::Object(_)) => {
                    Ok(Schema::Mapping(Box::new(self.convert(
                        values,
                        &format!("{}.*", path),
                        None,
                    )?)))
                }
                Some(Value::Bool(true)) => {
                    Err(self.unsupported(path, "object values have no fixed shape"))
                }
                _ => Ok(Schema::Record {
                    title: title_of(object, name).unwrap_or_else(|| "object".to_string()),
                    fields: Vec::new(),
                }),
            },
        }
    }
}

fn title_of(object: &Map<String, Value>, name: Option<&str>) -> Option<String> {
    object
        .get("title")
        .and_then(Value::as_str)
        .or(name)
        .map(str::to_string)
}

fn is_null_schema(schema: &Value) -> bool {
    schema.get("type") == Some(&json!("null"))
        && schema.get("const").is_none()
        && schema.get("enum").is_none()
}

/// `Option<Option<T>>` has no distinct JSON form
fn optional(schema: Schema) -> Schema {
    match schema {
        Schema::Optional(_) => schema,
        other => Schema::Optional(Box::new(other)),
    }
}

/// Range implied by the integer `format`, narrowed by explicit bounds
fn integer_bounds(object: &Map<String, Value>) -> (Option<i128>, Option<i128>) {
    let (mut min, mut max): (Option<i128>, Option<i128>) =
        match object.get("format").and_then(Value::as_str) {
            Some("int8") => (Some(i8::MIN.into()), Some(i8::MAX.into())),
            Some("int16") => (Some(i16::MIN.into()), Some(i16::MAX.into())),
            Some("int32") => (Some(i32::MIN.into()), Some(i32::MAX.into())),
            Some("int64") => (Some(i64::MIN.into()), Some(i64::MAX.into())),
            Some("int") => (Some(isize::MIN as i128), Some(isize::MAX as i128)),
            Some("uint8") => (Some(0), Some(u8::MAX.into())),
            Some("uint16") => (Some(0), Some(u16::MAX.into())),
            Some("uint32") => (Some(0), Some(u32::MAX.into())),
            Some("uint64") => (Some(0), Some(u64::MAX.into())),
            Some("uint") => (Some(0), Some(usize::MAX as i128)),
            Some("uint128") => (Some(0), None),
            _ => (None, None),
        };

    if let Some(lower) = object.get("minimum").and_then(integer_value) {
        min = Some(min.map_or(lower, |m| m.max(lower)));
    }
    if let Some(upper) = object.get("maximum").and_then(integer_value) {
        max = Some(max.map_or(upper, |m| m.min(upper)));
    }
    (min, max)
}

fn integer_value(value: &Value) -> Option<i128> {
    value
        .as_i64()
        .map(i128::from)
        .or_else(|| value.as_u64().map(i128::from))
}

fn bound_value(bound: i128) -> Value {
    if let Ok(signed) = i64::try_from(bound) {
        Value::from(signed)
    } else if let Ok(unsigned) = u64::try_from(bound) {
        Value::from(unsigned)
    } else {
        Value::from(bound as f64)
    }
}

/// JSON type name of a concrete value
pub fn value_shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn homogeneous_type(values: &[Value]) -> Option<&'static str> {
    let first = value_shape(values.first()?);
    values
        .iter()
        .all(|v| value_shape(v) == first)
        .then_some(first)
}
