//! Field schemas and input validation.

use crate::model::{Fields, StateId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Declared value kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    /// An ISO-8601 calendar date string (`YYYY-MM-DD`).
    Date,
    Integer,
    Number,
    Boolean,
    /// Any JSON value.
    Any,
}

impl FieldKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Date => "date",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Any => "any",
        }
    }

    /// Whether a non-null value has this kind.
    #[must_use]
    pub fn admits(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Date => value
                .as_str()
                .is_some_and(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Any => true,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    /// Closed set of allowed values. Empty means unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<Value>,
    /// States in which the field may not be edited.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub frozen_in: BTreeSet<StateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    #[must_use]
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            one_of: Vec::new(),
            frozen_in: BTreeSet::new(),
            description: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn one_of(mut self, values: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        self.one_of = values.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn frozen_in(mut self, states: impl IntoIterator<Item = impl Into<StateId>>) -> Self {
        self.frozen_in = states.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn is_frozen_in(&self, state: &StateId) -> bool {
        self.frozen_in.contains(state)
    }

    fn check(&self, name: &str, value: &Value) -> Option<FieldViolation> {
        if !self.kind.admits(value) {
            return Some(FieldViolation::new(name, Problem::WrongKind(self.kind)));
        }
        if !self.one_of.is_empty() && !self.one_of.contains(value) {
            return Some(FieldViolation::new(
                name,
                Problem::NotAllowed(self.one_of.clone()),
            ));
        }
        None
    }
}

/// Field declarations keyed by field name.
pub type FieldSchema = BTreeMap<String, FieldSpec>;

/// What is wrong with one input field.
#[derive(Debug, Clone, PartialEq)]
pub enum Problem {
    /// The schema does not declare the field.
    Unknown,
    /// A required field is missing.
    Missing,
    /// A required field was set to `null`.
    Cleared,
    WrongKind(FieldKind),
    NotAllowed(Vec<Value>),
    /// The state field was given a value other than the initial state.
    NotInitialState(StateId),
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("is not declared"),
            Self::Missing => f.write_str("is required"),
            Self::Cleared => f.write_str("is required and cannot be cleared"),
            Self::WrongKind(kind) => write!(f, "must be a {kind}"),
            Self::NotAllowed(values) => {
                let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "must be one of {}", rendered.join(", "))
            }
            Self::NotInitialState(state) => write!(f, "must start as '{state}'"),
        }
    }
}

/// One schema violation in caller input.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldViolation {
    pub field: String,
    pub problem: Problem,
}

impl FieldViolation {
    #[must_use]
    pub fn new(field: &str, problem: Problem) -> Self {
        Self {
            field: field.to_string(),
            problem,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.problem)
    }
}

/// Validate a complete document (create input or sub-resource payload).
///
/// `null` values are treated as absent and dropped from the returned map.
/// Violations come back in field-name order.
///
/// # Errors
///
/// Returns every violation found when the document does not match.
pub fn validate_document(schema: &FieldSchema, input: Fields) -> Result<Fields, Vec<FieldViolation>> {
    let mut violations = Vec::new();

    for (name, value) in &input {
        match schema.get(name) {
            None => violations.push(FieldViolation::new(name, Problem::Unknown)),
            Some(_) if value.is_null() => {}
            Some(spec) => violations.extend(spec.check(name, value)),
        }
    }

    for (name, spec) in schema {
        let provided = input.get(name).is_some_and(|v| !v.is_null());
        if spec.required && !provided {
            violations.push(FieldViolation::new(name, Problem::Missing));
        }
    }

    if violations.is_empty() {
        Ok(input.into_iter().filter(|(_, v)| !v.is_null()).collect())
    } else {
        violations.sort_by(|a, b| a.field.cmp(&b.field));
        Err(violations)
    }
}

/// Validate a set of merge-patch changes.
///
/// `null` clears an optional field and is rejected for required ones.
///
/// # Errors
///
/// Returns every violation found.
pub fn validate_changes(schema: &FieldSchema, changes: &Fields) -> Result<(), Vec<FieldViolation>> {
    let mut violations = Vec::new();
    for (name, value) in changes {
        match schema.get(name) {
            None => violations.push(FieldViolation::new(name, Problem::Unknown)),
            Some(spec) if value.is_null() => {
                if spec.required {
                    violations.push(FieldViolation::new(name, Problem::Cleared));
                }
            }
            Some(spec) => violations.extend(spec.check(name, value)),
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// Apply merge-patch changes to `fields`: `null` removes, anything else sets.
pub fn merge_into(fields: &mut Fields, changes: &Fields) {
    for (name, value) in changes {
        if value.is_null() {
            fields.remove(name);
        } else {
            fields.insert(name.clone(), value.clone());
        }
    }
}
