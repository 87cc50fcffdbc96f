//! Declarative output schemas and the generic validator.
//!
//! A schema is data: an ordered list of fields, each with a kind and an
//! optional constraint. One validator walks any schema, so a new stage only
//! adds a schema value. Issues come back in schema declaration order (not
//! input order) so corrective prompts are reproducible.

pub mod catalog;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::domain::clock::{parse_clock, parse_date, Day, CLOCK_PATTERN};

/// Path used for issues about the document as a whole
pub const ROOT: &str = "$";

/// A named structured schema
#[derive(Debug, Clone)]
pub struct Schema {
    name: &'static str,
    fields: Vec<Field>,
}

/// One declared field
#[derive(Debug, Clone)]
pub struct Field {
    name: &'static str,
    kind: Kind,
    required: bool,
    description: &'static str,
}

/// Field kinds with their constraints
#[derive(Debug, Clone)]
pub enum Kind {
    Text { non_empty: bool },
    Integer { min: Option<i64>, max: Option<i64> },
    /// Enumerated string
    OneOf(&'static [&'static str]),
    /// `YYYY-MM-DD`
    Date,
    /// `HH:MM`
    Time,
    /// `mon`..`sun`
    Weekday,
    List(Box<Kind>),
    Object(Vec<Field>),
}

impl Kind {
    pub fn text() -> Self {
        Self::Text { non_empty: false }
    }

    pub fn non_empty_text() -> Self {
        Self::Text { non_empty: true }
    }

    pub fn integer(min: i64, max: i64) -> Self {
        Self::Integer {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn list(item: Kind) -> Self {
        Self::List(Box::new(item))
    }
}

impl Field {
    /// A required field
    pub fn new(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            kind,
            required: true,
            description: "",
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn describe(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// One reason a document failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Location, e.g. `session_templates[1].intensity`; `$` for the whole document
    pub path: String,
    pub problem: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, problem: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            problem: problem.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.problem)
    }
}

/// The model output is not well-formed JSON
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("response is not well-formed JSON: {message}")]
pub struct ParseError {
    pub message: String,
}

/// Well-formed but non-compliant output; the issues are ordered
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} validation issue(s): {}", .issues.len(), render_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    pub fn single(path: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::new(vec![ValidationIssue::new(path, problem)])
    }
}

impl From<ParseError> for ValidationError {
    fn from(err: ParseError) -> Self {
        Self::single(ROOT, err.to_string())
    }
}

fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Schema {
    pub fn new(name: &'static str, fields: Vec<Field>) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Parse raw model text and check it against this schema
    pub fn validate(&self, raw: &str) -> Result<Value, ValidationError> {
        let value = parse_json(raw)?;
        self.check(&value)?;
        Ok(value)
    }

    /// Validate and deserialize into the typed output
    pub fn validate_as<T: DeserializeOwned>(&self, raw: &str) -> Result<T, ValidationError> {
        let value = self.validate(raw)?;
        self.convert(value)
    }

    /// Check an already-parsed document
    pub fn check(&self, value: &Value) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        check_object(&self.fields, value, ROOT, &mut issues);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(issues))
        }
    }

    /// Deserialize a document that already passed `check`
    pub fn convert<T: DeserializeOwned>(&self, value: Value) -> Result<T, ValidationError> {
        serde_json::from_value(value).map_err(|e| {
            ValidationError::single(ROOT, format!("does not match {}: {}", self.name, e))
        })
    }

    /// JSON-Schema description handed to the model
    pub fn json_schema(&self) -> Value {
        let mut schema = object_schema(&self.fields);
        schema["title"] = json!(self.name);
        schema
    }

    /// Format instructions embedded in every prompt for this schema
    pub fn format_instructions(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.json_schema()).unwrap_or_default();
        format!(
            "The output must be a single JSON object that conforms to the JSON schema below. \
             Do not add fields that are not in the schema.\n\n```json\n{}\n```",
            schema
        )
    }
}

/// Parse model text as JSON.
///
/// Models often wrap the object in a Markdown fence, sometimes after a line
/// of prose. The whole text is tried first, then the first fenced block,
/// then the outermost `{ ... }` span.
pub fn parse_json(raw: &str) -> Result<Value, ParseError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(ParseError {
            message: "empty response".to_string(),
        });
    }

    let mut error = match serde_json::from_str(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Some(block) = fenced_block(text) {
        match serde_json::from_str(block) {
            Ok(value) => return Ok(value),
            // Report against the fenced block, not the prose around it
            Err(e) => error = e,
        }
    }

    braced_span(text)
        .and_then(|span| serde_json::from_str(span).ok())
        .ok_or_else(|| ParseError {
            message: error.to_string(),
        })
}

/// Contents of the first ``` fence, minus its info string (`json`)
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let rest = &text[start + 3..];
    // Unclosed fences happen when the reply is cut off
    let inner = rest.find("```").map_or(rest, |end| &rest[..end]);

    let inner = inner.trim_start_matches([' ', '\t']);
    let tag_len = inner
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(inner.len());
    let inner = if inner[tag_len..].starts_with(char::is_whitespace) {
        &inner[tag_len..]
    } else {
        inner
    };
    Some(inner.trim())
}

fn braced_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_object(fields: &[Field], value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Value::Object(map) = value else {
        issues.push(ValidationIssue::new(
            path,
            format!("expected object, found {}", value_kind(value)),
        ));
        return;
    };

    for field in fields {
        let field_path = child_path(path, field.name);
        match map.get(field.name) {
            None | Some(Value::Null) if field.required => {
                issues.push(ValidationIssue::new(field_path, "field required"));
            }
            None | Some(Value::Null) => {}
            Some(v) => check_value(&field.kind, v, &field_path, issues),
        }
    }

    let mut unknown: Vec<&String> = map
        .keys()
        .filter(|key| !fields.iter().any(|f| f.name == key.as_str()))
        .collect();
    unknown.sort();
    for key in unknown {
        issues.push(ValidationIssue::new(
            child_path(path, key),
            "unexpected field (extra fields are not permitted)",
        ));
    }
}

fn check_value(kind: &Kind, value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let mismatch = |expected: &str| {
        ValidationIssue::new(
            path,
            format!("expected {}, found {}", expected, value_kind(value)),
        )
    };

    match kind {
        Kind::Text { non_empty } => match value.as_str() {
            None => issues.push(mismatch("string")),
            Some(s) if *non_empty && s.trim().is_empty() => {
                issues.push(ValidationIssue::new(path, "must not be empty"));
            }
            Some(_) => {}
        },
        Kind::Integer { min, max } => match value.as_i64() {
            None if value.is_u64() => {
                issues.push(ValidationIssue::new(path, "integer out of range"));
            }
            None => issues.push(mismatch("integer")),
            Some(n) => {
                if let Some(min) = min.filter(|min| n < *min) {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("must be >= {} (got {})", min, n),
                    ));
                } else if let Some(max) = max.filter(|max| n > *max) {
                    issues.push(ValidationIssue::new(
                        path,
                        format!("must be <= {} (got {})", max, n),
                    ));
                }
            }
        },
        Kind::OneOf(allowed) => match value.as_str() {
            None => issues.push(mismatch("string")),
            Some(s) if !allowed.contains(&s) => issues.push(ValidationIssue::new(
                path,
                format!("must be one of [{}] (got \"{}\")", allowed.join(", "), s),
            )),
            Some(_) => {}
        },
        Kind::Date => match value.as_str() {
            None => issues.push(mismatch("date string")),
            Some(s) if parse_date(s).is_none() => issues.push(ValidationIssue::new(
                path,
                format!("expected date as YYYY-MM-DD (got \"{}\")", s),
            )),
            Some(_) => {}
        },
        Kind::Time => match value.as_str() {
            None => issues.push(mismatch("time string")),
            Some(s) if parse_clock(s).is_none() => issues.push(ValidationIssue::new(
                path,
                format!("expected time as HH:MM (got \"{}\")", s),
            )),
            Some(_) => {}
        },
        Kind::Weekday => check_value(&Kind::OneOf(Day::NAMES), value, path, issues),
        Kind::List(item) => match value.as_array() {
            None => issues.push(mismatch("array")),
            Some(items) => {
                for (i, v) in items.iter().enumerate() {
                    check_value(item, v, &format!("{}[{}]", path, i), issues);
                }
            }
        },
        Kind::Object(fields) => check_object(fields, value, path, issues),
    }
}

fn object_schema(fields: &[Field]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in fields {
        let mut property = kind_schema(&field.kind);
        if !field.description.is_empty() {
            property["description"] = json!(field.description);
        }
        properties.insert(field.name.to_string(), property);
        if field.required {
            required.push(json!(field.name));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn kind_schema(kind: &Kind) -> Value {
    match kind {
        Kind::Text { non_empty: true } => json!({ "type": "string", "minLength": 1 }),
        Kind::Text { non_empty: false } => json!({ "type": "string" }),
        Kind::Integer { min, max } => {
            let mut schema = json!({ "type": "integer" });
            if let Some(min) = min {
                schema["minimum"] = json!(min);
            }
            if let Some(max) = max {
                schema["maximum"] = json!(max);
            }
            schema
        }
        Kind::OneOf(allowed) => json!({ "type": "string", "enum": allowed }),
        Kind::Date => json!({ "type": "string", "format": "date" }),
        Kind::Time => json!({ "type": "string", "pattern": CLOCK_PATTERN }),
        Kind::Weekday => json!({ "type": "string", "enum": Day::NAMES }),
        Kind::List(item) => json!({ "type": "array", "items": kind_schema(item) }),
        Kind::Object(fields) => object_schema(fields),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new(
            "Sample",
            vec![
                Field::new("level", Kind::OneOf(&["low", "high"])),
                Field::new("count", Kind::integer(0, 10)),
                Field::new(
                    "items",
                    Kind::list(Kind::Object(vec![
                        Field::new("when", Kind::Time),
                        Field::new("note", Kind::text()).optional(),
                    ])),
                ),
            ],
        )
    }

    #[test]
    fn test_valid_document() {
        let raw = r#"{"level":"low","count":3,"items":[{"when":"18:00"}]}"#;
        assert!(sample().validate(raw).is_ok());
    }

    #[test]
    fn test_issues_follow_declaration_order() {
        // Input order is items, count, level; issues must come back level, count, items
        let raw = r#"{"items":[{"when":"6pm"}],"count":-1,"level":"extreme"}"#;
        let err = sample().validate(raw).unwrap_err();

        let paths: Vec<&str> = err.issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["level", "count", "items[0].when"]);
    }

    #[test]
    fn test_missing_and_extra_fields() {
        let raw = r#"{"level":"low","zeta":1,"alpha":2,"items":[]}"#;
        let err = sample().validate(raw).unwrap_err();

        assert_eq!(err.issues[0], ValidationIssue::new("count", "field required"));
        assert_eq!(err.issues[1].path, "alpha");
        assert_eq!(err.issues[2].path, "zeta");
    }

    #[test]
    fn test_null_optional_is_absent() {
        let raw = r#"{"level":"low","count":0,"items":[{"when":"07:00","note":null}]}"#;
        assert!(sample().validate(raw).is_ok());
    }

    #[test]
    fn test_parse_error_becomes_root_issue() {
        let err = sample().validate("Sure! Here is your plan").unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].path, ROOT);
        assert!(err.issues[0].problem.contains("not well-formed JSON"));
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let raw = "```json\n{\"level\":\"high\",\"count\":1,\"items\":[]}\n```";
        assert!(sample().validate(raw).is_ok());
    }

    #[test]
    fn test_fence_after_prose() {
        let raw = "Here is the assessment:\n```json\n{\"a\": 1}\n```\nLet me know if you need more.";
        assert_eq!(parse_json(raw).unwrap(), json!({ "a": 1 }));
    }

    #[test]
    fn test_single_line_fence() {
        assert_eq!(parse_json("```json {\"a\":1}```").unwrap(), json!({ "a": 1 }));
        assert_eq!(parse_json("```{\"a\":1}```").unwrap(), json!({ "a": 1 }));
    }

    #[test]
    fn test_unclosed_fence() {
        assert_eq!(parse_json("```json\n{\"a\": 1}").unwrap(), json!({ "a": 1 }));
    }

    #[test]
    fn test_object_inside_prose() {
        let raw = "Sure, the plan is {\"a\": [1, 2]} as requested.";
        assert_eq!(parse_json(raw).unwrap(), json!({ "a": [1, 2] }));
    }

    #[test]
    fn test_backticks_inside_valid_json_are_kept() {
        let raw = r#"{"note": "use ```code``` sparingly"}"#;
        assert_eq!(parse_json(raw).unwrap()["note"], "use ```code``` sparingly");
    }

    #[test]
    fn test_broken_fence_reports_block_error() {
        let err = parse_json("Result:\n```json\n{\"a\": }\n```").unwrap_err();
        assert!(!err.message.contains("line 1 column 1"), "{}", err.message);
    }

    #[test]
    fn test_fractional_number_is_not_integer() {
        let raw = r#"{"level":"low","count":2.5,"items":[]}"#;
        let err = sample().validate(raw).unwrap_err();
        assert_eq!(
            err.issues,
            vec![ValidationIssue::new("count", "expected integer, found number")]
        );
    }

    #[test]
    fn test_json_schema_shape() {
        let schema = sample().json_schema();
        assert_eq!(schema["title"], "Sample");
        assert_eq!(schema["additionalProperties"], false);
        assert_eq!(schema["properties"]["count"]["maximum"], 10);
        assert_eq!(
            schema["properties"]["items"]["items"]["required"],
            json!(["when"])
        );
    }
}
