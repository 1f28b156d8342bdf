//! Declarative guard predicates over field maps.
//!
//! Guards are plain data so they can be loaded from type definition files,
//! compared, and rendered into rejection messages. Evaluation is a pure
//! function of the supplied fields: no clock, no randomness.

use crate::model::Fields;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A predicate over a field map.
///
/// In TOML definitions a guard is an inline table tagged by `op`:
///
/// ```toml
/// guard = { op = "all", of = [
///     { op = "present", field = "from" },
///     { op = "ordered", lower = "from", upper = "to" },
/// ] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Guard {
    /// The field is set to a non-null value.
    Present { field: String },
    /// The field is missing or null.
    Absent { field: String },
    Equals { field: String, value: Value },
    NotEquals { field: String, value: Value },
    OneOf { field: String, values: Vec<Value> },
    /// `lower <= upper`. Numbers compare numerically, strings
    /// lexicographically (so ISO-8601 dates compare chronologically).
    /// Any other combination, including a missing side, fails.
    Ordered { lower: String, upper: String },
    All { of: Vec<Guard> },
    Any { of: Vec<Guard> },
    Not { of: Box<Guard> },
}

impl Guard {
    #[must_use]
    pub fn present(field: &str) -> Self {
        Self::Present {
            field: field.to_string(),
        }
    }

    #[must_use]
    pub fn absent(field: &str) -> Self {
        Self::Absent {
            field: field.to_string(),
        }
    }

    #[must_use]
    pub fn equals(field: &str, value: impl Into<Value>) -> Self {
        Self::Equals {
            field: field.to_string(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn ordered(lower: &str, upper: &str) -> Self {
        Self::Ordered {
            lower: lower.to_string(),
            upper: upper.to_string(),
        }
    }

    #[must_use]
    pub fn all(of: Vec<Self>) -> Self {
        Self::All { of }
    }

    #[must_use]
    pub fn any(of: Vec<Self>) -> Self {
        Self::Any { of }
    }

    #[must_use]
    pub fn negate(guard: Self) -> Self {
        Self::Not { of: Box::new(guard) }
    }

    /// Evaluate against a field map.
    #[must_use]
    pub fn eval(&self, fields: &Fields) -> bool {
        match self {
            Self::Present { field } => lookup(fields, field).is_some(),
            Self::Absent { field } => lookup(fields, field).is_none(),
            Self::Equals { field, value } => lookup(fields, field) == Some(value),
            Self::NotEquals { field, value } => lookup(fields, field) != Some(value),
            Self::OneOf { field, values } => {
                lookup(fields, field).is_some_and(|v| values.contains(v))
            }
            Self::Ordered { lower, upper } => {
                match (lookup(fields, lower), lookup(fields, upper)) {
                    (Some(a), Some(b)) => {
                        matches!(compare(a, b), Some(Ordering::Less | Ordering::Equal))
                    }
                    _ => false,
                }
            }
            Self::All { of } => of.iter().all(|g| g.eval(fields)),
            Self::Any { of } => of.iter().any(|g| g.eval(fields)),
            Self::Not { of } => !of.eval(fields),
        }
    }

    /// Every field name the guard reads.
    #[must_use]
    pub fn referenced_fields(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Self::Present { field }
            | Self::Absent { field }
            | Self::Equals { field, .. }
            | Self::NotEquals { field, .. }
            | Self::OneOf { field, .. } => {
                out.insert(field);
            }
            Self::Ordered { lower, upper } => {
                out.insert(lower);
                out.insert(upper);
            }
            Self::All { of } | Self::Any { of } => {
                for guard in of {
                    guard.collect_fields(out);
                }
            }
            Self::Not { of } => of.collect_fields(out),
        }
    }

    /// Field values the guard fixes unconditionally: top-level `equals`
    /// predicates, possibly nested inside `all`.
    ///
    /// Used to pre-fill action inputs, e.g. `decision = "approved"`.
    #[must_use]
    pub fn pinned_values(&self) -> BTreeMap<&str, &Value> {
        let mut out = BTreeMap::new();
        self.collect_pinned(&mut out);
        out
    }

    fn collect_pinned<'a>(&'a self, out: &mut BTreeMap<&'a str, &'a Value>) {
        match self {
            Self::Equals { field, value } => {
                out.insert(field, value);
            }
            Self::All { of } => {
                for guard in of {
                    guard.collect_pinned(out);
                }
            }
            _ => {}
        }
    }
}

fn lookup<'a>(fields: &'a Fields, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| !v.is_null())
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present { field } => write!(f, "{field} is present"),
            Self::Absent { field } => write!(f, "{field} is absent"),
            Self::Equals { field, value } => write!(f, "{field} == {value}"),
            Self::NotEquals { field, value } => write!(f, "{field} != {value}"),
            Self::OneOf { field, values } => {
                let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{field} in [{}]", rendered.join(", "))
            }
            Self::Ordered { lower, upper } => write!(f, "{lower} <= {upper}"),
            Self::All { of } => write_joined(f, of, " and "),
            Self::Any { of } => write_joined(f, of, " or "),
            Self::Not { of } => write!(f, "not ({of})"),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, guards: &[Guard], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, guard) in guards.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{guard}")?;
    }
    f.write_str(")")
}
