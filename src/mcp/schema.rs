//! Tool input schema adaptation and validation
//!
//! Source schemas (hand-written JSON Schema or generated from a type by `schemars`) are
//! adapted once, at registration, into a canonical [`SchemaDescriptor`]: local `$ref`s are
//! inlined, meta keywords are dropped and unsupported constructs are rejected. The same
//! descriptor is advertised through `tools/list` and used to check every call's arguments.

use regex::Regex;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

const DROPPED_KEYWORDS: [&str; 4] = ["$schema", "$id", "$defs", "definitions"];
/// Keywords kept for discovery that carry no validation meaning.
const ANNOTATION_KEYWORDS: [&str; 12] = [
    "title",
    "description",
    "format",
    "default",
    "examples",
    "deprecated",
    "readOnly",
    "writeOnly",
    "$comment",
    "$anchor",
    "contentEncoding",
    "contentMediaType",
];
const COUNT_KEYWORDS: [&str; 6] = [
    "minLength",
    "maxLength",
    "minItems",
    "maxItems",
    "minProperties",
    "maxProperties",
];
const BOUND_KEYWORDS: [&str; 4] = ["minimum", "maximum", "exclusiveMinimum", "exclusiveMaximum"];
const KNOWN_TYPES: [&str; 7] = [
    "object", "array", "string", "number", "integer", "boolean", "null",
];

pub const ARGUMENTS_PATH: &str = "arguments";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaAdaptationError {
    #[error("input schema root must be an object schema")]
    NonObjectRoot,
    #[error("schema at {path} must be a JSON object or boolean")]
    NotASchema { path: String },
    #[error("unsupported schema keyword `{keyword}` at {path}")]
    UnsupportedKeyword { keyword: String, path: String },
    #[error("unknown schema type `{type_name}` at {path}")]
    UnknownType { type_name: String, path: String },
    #[error("malformed `{keyword}` at {path}")]
    Malformed { keyword: String, path: String },
    #[error("unresolvable reference `{reference}`")]
    UnresolvedRef { reference: String },
    #[error("recursive reference `{reference}` cannot be inlined")]
    RecursiveRef { reference: String },
}

/// A single failing location inside the tool arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid arguments: {}", summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new(path, message)],
        }
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|error| format!("{}: {}", error.path, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Canonical structural schema of a tool's input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SchemaDescriptor {
    schema: Value,
}

impl SchemaDescriptor {
    /// Derives the source schema of `T` with `schemars` and adapts it.
    pub fn for_type<T: JsonSchema>() -> Result<Self, SchemaAdaptationError> {
        adapt(&schemars::schema_for!(T).to_value())
    }

    /// Structural JSON advertised as the tool's `inputSchema`.
    pub fn describe(&self) -> &Value {
        &self.schema
    }

    /// Checks `value` against the descriptor, collecting every failing field.
    ///
    /// On success the value is handed back untouched so callers can decode it.
    pub fn validate(&self, value: Value) -> Result<Value, ValidationError> {
        let mut errors = Vec::new();
        check(&self.schema, &value, ARGUMENTS_PATH, &mut errors);
        if errors.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError { errors })
        }
    }
}

/// Adapts a source JSON Schema into a [`SchemaDescriptor`].
pub fn adapt(source: &Value) -> Result<SchemaDescriptor, SchemaAdaptationError> {
    let Value::Object(root) = source else {
        return Err(SchemaAdaptationError::NonObjectRoot);
    };

    let definitions = collect_definitions(root);
    let mut resolving = Vec::new();
    let schema = canonicalize(source, &definitions, &mut resolving, "#")?;

    if schema.get("type").and_then(Value::as_str) != Some("object") {
        return Err(SchemaAdaptationError::NonObjectRoot);
    }

    Ok(SchemaDescriptor { schema })
}

fn collect_definitions(root: &Map<String, Value>) -> Vec<(String, &Value)> {
    ["$defs", "definitions"]
        .into_iter()
        .filter_map(|section| {
            root.get(section)
                .and_then(Value::as_object)
                .map(|defs| (section, defs))
        })
        .flat_map(|(section, defs)| {
            defs.iter()
                .map(move |(name, schema)| (format!("#/{section}/{name}"), schema))
        })
        .collect()
}

fn canonicalize(
    node: &Value,
    definitions: &[(String, &Value)],
    resolving: &mut Vec<String>,
    path: &str,
) -> Result<Value, SchemaAdaptationError> {
    let object = match node {
        Value::Bool(_) => return Ok(node.clone()),
        Value::Object(object) => object,
        _ => {
            return Err(SchemaAdaptationError::NotASchema {
                path: path.to_string(),
            })
        }
    };

    if let Some(reference) = object.get("$ref") {
        return inline_reference(object, reference, definitions, resolving, path);
    }

    let mut canonical = Map::new();
    for (keyword, value) in object {
        if DROPPED_KEYWORDS.contains(&keyword.as_str()) {
            continue;
        }

        let keyword_path = format!("{path}/{keyword}");
        let adapted = match keyword.as_str() {
            "type" => {
                check_type_keyword(value, &keyword_path)?;
                value.clone()
            }
            "required" => {
                let all_strings = value
                    .as_array()
                    .is_some_and(|items| items.iter().all(Value::is_string));
                if !all_strings {
                    return Err(malformed(keyword, path));
                }
                value.clone()
            }
            "enum" => {
                if !value.is_array() {
                    return Err(malformed(keyword, path));
                }
                value.clone()
            }
            "properties" => {
                let Some(properties) = value.as_object() else {
                    return Err(malformed(keyword, path));
                };
                let mut adapted = Map::new();
                for (name, schema) in properties {
                    let child = canonicalize(
                        schema,
                        definitions,
                        resolving,
                        &format!("{keyword_path}/{name}"),
                    )?;
                    adapted.insert(name.clone(), child);
                }
                Value::Object(adapted)
            }
            "items" | "additionalProperties" | "propertyNames" | "contains" => {
                canonicalize(value, definitions, resolving, &keyword_path)?
            }
            "pattern" => {
                let compiles = value
                    .as_str()
                    .is_some_and(|pattern| Regex::new(pattern).is_ok());
                if !compiles {
                    return Err(malformed(keyword, path));
                }
                value.clone()
            }
            "multipleOf" => {
                if !value.as_f64().is_some_and(|divisor| divisor > 0.0) {
                    return Err(malformed(keyword, path));
                }
                value.clone()
            }
            "uniqueItems" => {
                if !value.is_boolean() {
                    return Err(malformed(keyword, path));
                }
                value.clone()
            }
            "dependentRequired" => {
                let well_formed = value.as_object().is_some_and(|dependencies| {
                    dependencies.values().all(|names| {
                        names
                            .as_array()
                            .is_some_and(|names| names.iter().all(Value::is_string))
                    })
                });
                if !well_formed {
                    return Err(malformed(keyword, path));
                }
                value.clone()
            }
            count if COUNT_KEYWORDS.contains(&count) => {
                if value.as_u64().is_none() {
                    return Err(malformed(keyword, path));
                }
                value.clone()
            }
            bound if BOUND_KEYWORDS.contains(&bound) => {
                if !value.is_number() {
                    return Err(malformed(keyword, path));
                }
                value.clone()
            }
            "const" => value.clone(),
            annotation if ANNOTATION_KEYWORDS.contains(&annotation) => value.clone(),
            "anyOf" | "oneOf" | "allOf" => {
                let Some(branches) = value.as_array().filter(|branches| !branches.is_empty())
                else {
                    return Err(malformed(keyword, path));
                };
                let adapted = branches
                    .iter()
                    .enumerate()
                    .map(|(index, branch)| {
                        canonicalize(
                            branch,
                            definitions,
                            resolving,
                            &format!("{keyword_path}/{index}"),
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(adapted)
            }
            _ => {
                return Err(SchemaAdaptationError::UnsupportedKeyword {
                    keyword: keyword.clone(),
                    path: path.to_string(),
                })
            }
        };
        canonical.insert(keyword.clone(), adapted);
    }

    Ok(Value::Object(canonical))
}

fn inline_reference(
    object: &Map<String, Value>,
    reference: &Value,
    definitions: &[(String, &Value)],
    resolving: &mut Vec<String>,
    path: &str,
) -> Result<Value, SchemaAdaptationError> {
    let Some(reference) = reference.as_str() else {
        return Err(malformed("$ref", path));
    };
    if resolving.iter().any(|active| active == reference) {
        return Err(SchemaAdaptationError::RecursiveRef {
            reference: reference.to_string(),
        });
    }
    let Some((_, target)) = definitions.iter().find(|(name, _)| name == reference) else {
        return Err(SchemaAdaptationError::UnresolvedRef {
            reference: reference.to_string(),
        });
    };

    resolving.push(reference.to_string());
    let resolved = canonicalize(target, definitions, resolving, reference);
    resolving.pop();
    let mut resolved = resolved?;

    // Sibling keywords (usually `description`) sit next to `$ref` and win over the target.
    let siblings = object
        .iter()
        .filter(|(keyword, _)| keyword.as_str() != "$ref")
        .map(|(keyword, value)| (keyword.clone(), value.clone()))
        .collect::<Map<_, _>>();
    if !siblings.is_empty() {
        let siblings = canonicalize(&Value::Object(siblings), definitions, resolving, path)?;
        if let (Value::Object(target), Value::Object(extra)) = (&mut resolved, siblings) {
            target.extend(extra);
        }
    }

    Ok(resolved)
}

fn check_type_keyword(value: &Value, path: &str) -> Result<(), SchemaAdaptationError> {
    let names: Vec<&Value> = match value {
        Value::String(_) => vec![value],
        Value::Array(items) if !items.is_empty() => items.iter().collect(),
        _ => return Err(malformed("type", path)),
    };

    for name in names {
        let Some(name) = name.as_str() else {
            return Err(malformed("type", path));
        };
        if !KNOWN_TYPES.contains(&name) {
            return Err(SchemaAdaptationError::UnknownType {
                type_name: name.to_string(),
                path: path.to_string(),
            });
        }
    }
    Ok(())
}

fn malformed(keyword: &str, path: &str) -> SchemaAdaptationError {
    SchemaAdaptationError::Malformed {
        keyword: keyword.to_string(),
        path: path.to_string(),
    }
}

fn check(schema: &Value, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let schema = match schema {
        Value::Bool(true) => return,
        Value::Bool(false) => {
            errors.push(FieldError::new(path, "no value is allowed here"));
            return;
        }
        Value::Object(schema) => schema,
        _ => return,
    };

    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, value) {
            errors.push(FieldError::new(
                path,
                format!("expected {}, found {}", expected_types(expected), kind_of(value)),
            ));
            return;
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            let options = allowed
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            errors.push(FieldError::new(path, format!("must be one of: {options}")));
        }
    }

    if let Some(constant) = schema.get("const") {
        if constant != value {
            errors.push(FieldError::new(path, format!("must equal {constant}")));
        }
    }

    match value {
        Value::Object(object) => check_object(schema, object, path, errors),
        Value::Array(items) => check_array(schema, items, path, errors),
        Value::String(text) => check_string(schema, text, path, errors),
        Value::Number(number) => {
            if let Some(number) = number.as_f64() {
                check_number(schema, number, path, errors);
            }
        }
        Value::Bool(_) | Value::Null => {}
    }

    check_combinators(schema, value, path, errors);
}

fn check_object(
    schema: &Map<String, Value>,
    object: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(name) {
                errors.push(FieldError::new(
                    format!("{path}.{name}"),
                    "missing required property",
                ));
            }
        }
    }

    let count = object.len() as u64;
    if let Some(min) = schema.get("minProperties").and_then(Value::as_u64) {
        if count < min {
            errors.push(FieldError::new(path, format!("must have at least {min} properties")));
        }
    }
    if let Some(max) = schema.get("maxProperties").and_then(Value::as_u64) {
        if count > max {
            errors.push(FieldError::new(path, format!("must have at most {max} properties")));
        }
    }

    if let Some(Value::Object(dependencies)) = schema.get("dependentRequired") {
        for (trigger, names) in dependencies {
            if !object.contains_key(trigger) {
                continue;
            }
            for name in names.as_array().into_iter().flatten().filter_map(Value::as_str) {
                if !object.contains_key(name) {
                    errors.push(FieldError::new(
                        format!("{path}.{name}"),
                        format!("required when `{trigger}` is present"),
                    ));
                }
            }
        }
    }

    if let Some(name_schema) = schema.get("propertyNames") {
        for name in object.keys() {
            let mut name_errors = Vec::new();
            check(name_schema, &Value::String(name.clone()), path, &mut name_errors);
            if !name_errors.is_empty() {
                errors.push(FieldError::new(
                    format!("{path}.{name}"),
                    "property name is not allowed",
                ));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    for (name, item) in object {
        let item_path = format!("{path}.{name}");
        match properties.and_then(|properties| properties.get(name)) {
            Some(property_schema) => check(property_schema, item, &item_path, errors),
            None => match schema.get("additionalProperties") {
                Some(Value::Bool(false)) => {
                    errors.push(FieldError::new(item_path, "unexpected property"));
                }
                Some(extra_schema) => check(extra_schema, item, &item_path, errors),
                None => {}
            },
        }
    }
}

fn check_array(
    schema: &Map<String, Value>,
    items: &[Value],
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64) {
        if (items.len() as u64) < min {
            errors.push(FieldError::new(path, format!("must contain at least {min} items")));
        }
    }
    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64) {
        if (items.len() as u64) > max {
            errors.push(FieldError::new(path, format!("must contain at most {max} items")));
        }
    }
    if schema.get("uniqueItems") == Some(&Value::Bool(true)) {
        let duplicate = items
            .iter()
            .enumerate()
            .find_map(|(index, item)| items[..index].contains(item).then_some(index));
        if let Some(index) = duplicate {
            errors.push(FieldError::new(
                format!("{path}[{index}]"),
                "duplicates an earlier item",
            ));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (index, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{path}[{index}]"), errors);
        }
    }
    if let Some(contained) = schema.get("contains") {
        let found = items.iter().any(|item| {
            let mut item_errors = Vec::new();
            check(contained, item, path, &mut item_errors);
            item_errors.is_empty()
        });
        if !found {
            errors.push(FieldError::new(path, "no item matches the required schema"));
        }
    }
}

fn check_string(
    schema: &Map<String, Value>,
    text: &str,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    let length = text.chars().count() as u64;
    if let Some(min) = schema.get("minLength").and_then(Value::as_u64) {
        if length < min {
            errors.push(FieldError::new(
                path,
                format!("must be at least {min} characters long"),
            ));
        }
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64) {
        if length > max {
            errors.push(FieldError::new(
                path,
                format!("must be at most {max} characters long"),
            ));
        }
    }
    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        // Adaptation already rejected patterns that do not compile.
        if let Ok(regex) = Regex::new(pattern) {
            if !regex.is_match(text) {
                errors.push(FieldError::new(path, format!("must match pattern {pattern}")));
            }
        }
    }
}

fn check_number(
    schema: &Map<String, Value>,
    number: f64,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    if let Some(minimum) = schema.get("minimum").and_then(Value::as_f64) {
        if number < minimum {
            errors.push(FieldError::new(path, format!("must be >= {minimum}")));
        }
    }
    if let Some(maximum) = schema.get("maximum").and_then(Value::as_f64) {
        if number > maximum {
            errors.push(FieldError::new(path, format!("must be <= {maximum}")));
        }
    }
    if let Some(minimum) = schema.get("exclusiveMinimum").and_then(Value::as_f64) {
        if number <= minimum {
            errors.push(FieldError::new(path, format!("must be > {minimum}")));
        }
    }
    if let Some(maximum) = schema.get("exclusiveMaximum").and_then(Value::as_f64) {
        if number >= maximum {
            errors.push(FieldError::new(path, format!("must be < {maximum}")));
        }
    }
    if let Some(divisor) = schema.get("multipleOf").and_then(Value::as_f64) {
        let quotient = number / divisor;
        if (quotient - quotient.round()).abs() > 1e-9 {
            errors.push(FieldError::new(path, format!("must be a multiple of {divisor}")));
        }
    }
}

fn check_combinators(
    schema: &Map<String, Value>,
    value: &Value,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    if let Some(Value::Array(branches)) = schema.get("allOf") {
        for branch in branches {
            check(branch, value, path, errors);
        }
    }

    if let Some(Value::Array(branches)) = schema.get("anyOf") {
        let mut closest: Option<Vec<FieldError>> = None;
        for branch in branches {
            let mut branch_errors = Vec::new();
            check(branch, value, path, &mut branch_errors);
            if branch_errors.is_empty() {
                closest = None;
                break;
            }
            if closest
                .as_ref()
                .map_or(true, |best| branch_errors.len() < best.len())
            {
                closest = Some(branch_errors);
            }
        }
        if let Some(branch_errors) = closest {
            errors.extend(branch_errors);
        }
    }

    if let Some(Value::Array(branches)) = schema.get("oneOf") {
        let matching = branches
            .iter()
            .filter(|branch| {
                let mut branch_errors = Vec::new();
                check(branch, value, path, &mut branch_errors);
                branch_errors.is_empty()
            })
            .count();
        if matching != 1 {
            errors.push(FieldError::new(
                path,
                format!("must match exactly one schema, matched {matching}"),
            ));
        }
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => matches_type_name(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| matches_type_name(name, value)),
        _ => true,
    }
}

fn matches_type_name(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(number) => {
                number.is_i64()
                    || number.is_u64()
                    || number.as_f64().is_some_and(|float| float.fract() == 0.0)
            }
            _ => false,
        },
        _ => false,
    }
}

fn expected_types(expected: &Value) -> String {
    match expected {
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        Value::String(name) => name.clone(),
        other => other.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct Author {
        name: String,
    }

    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct PaperArgs {
        title: String,
        year: Option<u32>,
        authors: Vec<Author>,
    }

    #[test]
    fn adapts_derived_schema_and_inlines_definitions() {
        let descriptor = SchemaDescriptor::for_type::<PaperArgs>().expect("schema adapts");
        let schema = descriptor.describe();

        assert_eq!(schema["type"], "object");
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("$defs").is_none());
        assert_eq!(schema["properties"]["authors"]["items"]["type"], "object");
        assert_eq!(
            schema["properties"]["authors"]["items"]["properties"]["name"]["type"],
            "string"
        );
        assert_eq!(schema["additionalProperties"], false);
    }

    #[test]
    fn adaptation_is_deterministic() {
        let first = SchemaDescriptor::for_type::<PaperArgs>().expect("schema adapts");
        let second = SchemaDescriptor::for_type::<PaperArgs>().expect("schema adapts");
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_non_object_root() {
        let error = adapt(&json!({"type": "string"})).expect_err("string root must fail");
        assert_eq!(error, SchemaAdaptationError::NonObjectRoot);

        let error = adapt(&json!(true)).expect_err("boolean root must fail");
        assert_eq!(error, SchemaAdaptationError::NonObjectRoot);
    }

    #[test]
    fn rejects_unsupported_keywords() {
        let error = adapt(&json!({
            "type": "object",
            "properties": {
                "mode": {"not": {"type": "string"}}
            }
        }))
        .expect_err("`not` is unsupported");

        assert!(matches!(
            error,
            SchemaAdaptationError::UnsupportedKeyword { ref keyword, .. } if keyword == "not"
        ));
    }

    #[test]
    fn rejects_keywords_it_cannot_enforce() {
        for keyword in ["patternProperties", "dependencies", "minContains", "unevaluatedItems"] {
            let mut property = Map::new();
            property.insert("type".to_string(), json!("object"));
            property.insert(keyword.to_string(), json!({}));
            let error = adapt(&json!({
                "type": "object",
                "properties": {"field": Value::Object(property)}
            }))
            .expect_err("unenforced keyword must fail");

            let SchemaAdaptationError::UnsupportedKeyword { keyword: found, .. } = error else {
                panic!("expected an unsupported keyword error for {keyword}");
            };
            assert_eq!(found, keyword);
        }
    }

    #[test]
    fn rejects_malformed_validation_keywords() {
        for (keyword, value) in [
            ("pattern", json!("([unclosed")),
            ("multipleOf", json!(0)),
            ("uniqueItems", json!("yes")),
            ("minProperties", json!(-1)),
            ("dependentRequired", json!({"a": "b"})),
        ] {
            let mut property = Map::new();
            property.insert(keyword.to_string(), value);
            let error = adapt(&json!({
                "type": "object",
                "properties": {"field": Value::Object(property)}
            }))
            .expect_err("malformed keyword must fail");

            assert!(matches!(error, SchemaAdaptationError::Malformed { .. }), "{keyword}");
        }
    }

    #[test]
    fn pattern_is_enforced() {
        let descriptor = adapt(&json!({
            "type": "object",
            "properties": {"id": {"type": "string", "pattern": "^[0-9]+$"}}
        }))
        .expect("schema adapts");

        assert!(descriptor.validate(json!({"id": "2301"})).is_ok());
        let error = descriptor
            .validate(json!({"id": "abc"}))
            .expect_err("pattern mismatch");
        assert_eq!(error.errors[0].path, "arguments.id");
    }

    #[test]
    fn multiple_of_is_enforced() {
        let descriptor = adapt(&json!({
            "type": "object",
            "properties": {
                "step": {"type": "integer", "multipleOf": 5},
                "ratio": {"type": "number", "multipleOf": 0.1}
            }
        }))
        .expect("schema adapts");

        assert!(descriptor.validate(json!({"step": 10, "ratio": 0.3})).is_ok());
        let error = descriptor
            .validate(json!({"step": 3}))
            .expect_err("not a multiple");
        assert_eq!(error.errors[0].path, "arguments.step");
    }

    #[test]
    fn unique_items_is_enforced() {
        let descriptor = adapt(&json!({
            "type": "object",
            "properties": {"tags": {"type": "array", "uniqueItems": true}}
        }))
        .expect("schema adapts");

        assert!(descriptor.validate(json!({"tags": [1, 2]})).is_ok());
        let error = descriptor
            .validate(json!({"tags": [1, 2, 1]}))
            .expect_err("duplicate item");
        assert_eq!(error.errors[0].path, "arguments.tags[2]");
    }

    #[test]
    fn property_counts_are_enforced() {
        let descriptor = adapt(&json!({
            "type": "object",
            "properties": {
                "filters": {"type": "object", "minProperties": 1, "maxProperties": 2}
            }
        }))
        .expect("schema adapts");

        assert!(descriptor.validate(json!({"filters": {"a": 1}})).is_ok());
        assert!(descriptor.validate(json!({"filters": {}})).is_err());
        assert!(descriptor
            .validate(json!({"filters": {"a": 1, "b": 2, "c": 3}}))
            .is_err());
    }

    #[test]
    fn property_names_are_enforced() {
        let descriptor = adapt(&json!({
            "type": "object",
            "properties": {
                "labels": {"type": "object", "propertyNames": {"pattern": "^[a-z]+$"}}
            }
        }))
        .expect("schema adapts");

        assert!(descriptor.validate(json!({"labels": {"env": "prod"}})).is_ok());
        let error = descriptor
            .validate(json!({"labels": {"Env": "prod"}}))
            .expect_err("bad property name");
        assert_eq!(error.errors[0].path, "arguments.labels.Env");
    }

    #[test]
    fn contains_is_enforced() {
        let descriptor = adapt(&json!({
            "type": "object",
            "properties": {
                "ids": {"type": "array", "contains": {"type": "string", "const": "primary"}}
            }
        }))
        .expect("schema adapts");

        assert!(descriptor.validate(json!({"ids": ["x", "primary"]})).is_ok());
        let error = descriptor
            .validate(json!({"ids": ["x", "y"]}))
            .expect_err("no matching item");
        assert_eq!(error.errors[0].path, "arguments.ids");
    }

    #[test]
    fn dependent_required_is_enforced() {
        let descriptor = adapt(&json!({
            "type": "object",
            "properties": {
                "start": {"type": "string"},
                "end": {"type": "string"}
            },
            "dependentRequired": {"start": ["end"]}
        }))
        .expect("schema adapts");

        assert!(descriptor.validate(json!({})).is_ok());
        assert!(descriptor.validate(json!({"start": "a", "end": "b"})).is_ok());
        let error = descriptor
            .validate(json!({"start": "a"}))
            .expect_err("end missing");
        assert_eq!(error.errors[0].path, "arguments.end");
    }

    #[test]
    fn rejects_unknown_type_names() {
        let error = adapt(&json!({
            "type": "object",
            "properties": {"when": {"type": "date"}}
        }))
        .expect_err("unknown type must fail");

        assert!(matches!(error, SchemaAdaptationError::UnknownType { .. }));
    }

    #[test]
    fn rejects_recursive_and_dangling_references() {
        let recursive = adapt(&json!({
            "type": "object",
            "properties": {"node": {"$ref": "#/$defs/Node"}},
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {"next": {"$ref": "#/$defs/Node"}}
                }
            }
        }))
        .expect_err("recursive reference must fail");
        assert!(matches!(recursive, SchemaAdaptationError::RecursiveRef { .. }));

        let dangling = adapt(&json!({
            "type": "object",
            "properties": {"node": {"$ref": "#/$defs/Missing"}}
        }))
        .expect_err("dangling reference must fail");
        assert!(matches!(dangling, SchemaAdaptationError::UnresolvedRef { .. }));
    }

    #[test]
    fn validation_reports_field_paths() {
        let descriptor = SchemaDescriptor::for_type::<PaperArgs>().expect("schema adapts");

        let error = descriptor
            .validate(json!({
                "year": "1999",
                "authors": [{"name": "Ada"}, {"name": 7}],
                "extra": true
            }))
            .expect_err("invalid arguments");

        let paths: Vec<&str> = error.errors.iter().map(|item| item.path.as_str()).collect();
        assert!(paths.contains(&"arguments.title"));
        assert!(paths.contains(&"arguments.year"));
        assert!(paths.contains(&"arguments.authors[1].name"));
        assert!(paths.contains(&"arguments.extra"));
    }

    #[test]
    fn validation_accepts_matching_value_unchanged() {
        let descriptor = SchemaDescriptor::for_type::<PaperArgs>().expect("schema adapts");
        let arguments = json!({"title": "Attention", "authors": [], "year": null});

        let validated = descriptor
            .validate(arguments.clone())
            .expect("valid arguments");
        assert_eq!(validated, arguments);
    }

    #[test]
    fn integer_type_rejects_fractions() {
        let descriptor = adapt(&json!({
            "type": "object",
            "properties": {"count": {"type": "integer", "minimum": 1}}
        }))
        .expect("schema adapts");

        assert!(descriptor.validate(json!({"count": 3})).is_ok());
        assert!(descriptor.validate(json!({"count": 3.0})).is_ok());
        assert!(descriptor.validate(json!({"count": 1.5})).is_err());

        let error = descriptor
            .validate(json!({"count": 0}))
            .expect_err("below minimum");
        assert_eq!(error.errors[0].path, "arguments.count");
    }

    #[test]
    fn one_of_requires_exactly_one_match() {
        let descriptor = adapt(&json!({
            "type": "object",
            "properties": {
                "id": {"oneOf": [{"type": "string"}, {"type": "integer"}, {"type": "number"}]}
            }
        }))
        .expect("schema adapts");

        assert!(descriptor.validate(json!({"id": "abc"})).is_ok());
        assert!(descriptor.validate(json!({"id": 1.5})).is_ok());
        // 4 is both an integer and a number
        assert!(descriptor.validate(json!({"id": 4})).is_err());
    }

    #[test]
    fn enum_and_string_bounds_are_checked() {
        let descriptor = adapt(&json!({
            "type": "object",
            "properties": {
                "order": {"enum": ["asc", "desc"]},
                "query": {"type": "string", "minLength": 2, "maxLength": 4}
            }
        }))
        .expect("schema adapts");

        assert!(descriptor
            .validate(json!({"order": "asc", "query": "ok"}))
            .is_ok());
        let error = descriptor
            .validate(json!({"order": "up", "query": "toolong"}))
            .expect_err("invalid values");
        assert_eq!(error.errors.len(), 2);
    }
}
