//! Resource type definitions and their registration-time validation.
//!
//! A [`TypeDefinition`] is plain data (deserializable from TOML). Turning it
//! into a [`ResourceType`] checks the whole graph once; after that the type
//! is immutable and every resource of the type is judged by the same table.

use super::guard::Guard;
use super::schema::{self, FieldSchema, FieldSpec, FieldViolation, Problem};
use crate::model::{Capability, Fields, StateId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

fn default_state_field() -> String {
    "status".to_string()
}

/// Declarative description of a resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDefinition {
    pub name: String,
    /// Field under which the current state is exposed.
    #[serde(default = "default_state_field")]
    pub state_field: String,
    pub initial: StateId,
    pub states: Vec<StateId>,
    /// ALPS profile describing the type's semantics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    /// Capability required to see the `edit` action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_capability: Option<Capability>,
    #[serde(default)]
    pub fields: FieldSchema,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionSpec>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

/// An explicit edge, exercised by patching the state field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Transition {
    pub name: String,
    pub from: StateId,
    pub to: StateId,
    /// Evaluated against the current fields merged with the proposed change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
}

/// An implicit edge fired by appending to a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Trigger {
    pub name: String,
    pub collection: String,
    pub from: StateId,
    pub to: StateId,
    /// Predicate over the appended item's payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Guard>,
    /// Overrides the collection's capability for this action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
}

/// A named child collection and its item schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionSpec {
    #[serde(default)]
    pub fields: FieldSchema,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<Capability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Problems found while registering a type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("invalid name '{0}': names must be non-empty and contain no whitespace or '/'")]
    InvalidName(String),

    #[error("type '{ty}' declares no states")]
    NoStates { ty: String },

    #[error("type '{ty}' declares state '{state}' more than once")]
    DuplicateState { ty: String, state: StateId },

    #[error("type '{ty}': {context} references undeclared state '{state}'")]
    UnknownState {
        ty: String,
        context: String,
        state: StateId,
    },

    #[error("type '{ty}': trigger '{trigger}' references undeclared collection '{collection}'")]
    UnknownCollection {
        ty: String,
        trigger: String,
        collection: String,
    },

    #[error("type '{ty}': transition '{name}' is declared twice from state '{from}'")]
    DuplicateTransition {
        ty: String,
        name: String,
        from: StateId,
    },

    #[error("type '{ty}': transition '{name}' leads from '{state}' back to itself")]
    SelfLoop {
        ty: String,
        name: String,
        state: StateId,
    },

    #[error("type '{ty}': field '{field}' collides with the state field")]
    StateFieldCollision { ty: String, field: String },

    #[error("type '{ty}': guard of {context} references undeclared field '{field}'")]
    UnknownGuardField {
        ty: String,
        context: String,
        field: String,
    },

    #[error("type '{ty}': field '{field}' allows {value}, which is not a {kind}")]
    BadAllowedValue {
        ty: String,
        field: String,
        value: String,
        kind: String,
    },

    #[error("type '{ty}': states unreachable from '{initial}': {}", join_states(.states))]
    Unreachable {
        ty: String,
        initial: StateId,
        states: Vec<StateId>,
    },

    #[error("type '{0}' is registered twice")]
    DuplicateType(String),

    #[error("failed to parse type definition: {0}")]
    Parse(String),
}

fn join_states(states: &[StateId]) -> String {
    states
        .iter()
        .map(StateId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl TypeDefinition {
    /// Parse a definition from TOML text without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::Parse`] for malformed TOML or unknown keys.
    pub fn from_toml(text: &str) -> Result<Self, DefinitionError> {
        toml::from_str(text).map_err(|e| DefinitionError::Parse(e.to_string()))
    }
}

/// A validated, immutable resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceType {
    def: TypeDefinition,
}

impl ResourceType {
    /// Validate a definition and freeze it.
    ///
    /// # Errors
    ///
    /// Returns the first [`DefinitionError`] found.
    pub fn new(def: TypeDefinition) -> Result<Self, DefinitionError> {
        validate_definition(&def)?;
        Ok(Self { def })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    #[must_use]
    pub fn state_field(&self) -> &str {
        &self.def.state_field
    }

    #[must_use]
    pub fn initial(&self) -> &StateId {
        &self.def.initial
    }

    #[must_use]
    pub fn states(&self) -> &[StateId] {
        &self.def.states
    }

    #[must_use]
    pub fn has_state(&self, state: &StateId) -> bool {
        self.def.states.contains(state)
    }

    #[must_use]
    pub fn profile(&self) -> Option<&str> {
        self.def.profile.as_deref()
    }

    #[must_use]
    pub fn edit_capability(&self) -> Option<&Capability> {
        self.def.edit_capability.as_ref()
    }

    #[must_use]
    pub fn fields(&self) -> &FieldSchema {
        &self.def.fields
    }

    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.def.transitions
    }

    #[must_use]
    pub fn triggers(&self) -> &[Trigger] {
        &self.def.triggers
    }

    #[must_use]
    pub fn collections(&self) -> &BTreeMap<String, CollectionSpec> {
        &self.def.collections
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&CollectionSpec> {
        self.def.collections.get(name)
    }

    #[must_use]
    pub fn definition(&self) -> &TypeDefinition {
        &self.def
    }

    /// Explicit transitions leaving `state`, in registration order.
    pub fn outgoing<'a, 's>(
        &'a self,
        state: &'s StateId,
    ) -> impl Iterator<Item = &'a Transition> + use<'a, 's> {
        self.def.transitions.iter().filter(move |t| &t.from == state)
    }

    /// Implicit triggers leaving `state`, in registration order.
    pub fn triggers_from<'a, 's>(
        &'a self,
        state: &'s StateId,
    ) -> impl Iterator<Item = &'a Trigger> + use<'a, 's> {
        self.def.triggers.iter().filter(move |t| &t.from == state)
    }

    /// Declared fields editable in `state`, in name order.
    pub fn editable_fields<'a, 's>(
        &'a self,
        state: &'s StateId,
    ) -> impl Iterator<Item = (&'a String, &'a FieldSpec)> + use<'a, 's> {
        self.def
            .fields
            .iter()
            .filter(move |(_, spec)| !spec.is_frozen_in(state))
    }

    /// Validate create input and return the stored field map, with the state
    /// field set to the initial state.
    ///
    /// # Errors
    ///
    /// Returns every schema violation, including a state field that names
    /// anything but the initial state.
    pub fn check_create(&self, mut input: Fields) -> Result<Fields, Vec<FieldViolation>> {
        let state_value = input.remove(&self.def.state_field);
        let mut violations = Vec::new();
        if let Some(value) = state_value.filter(|v| !v.is_null()) {
            if value.as_str() != Some(self.def.initial.as_str()) {
                violations.push(FieldViolation::new(
                    &self.def.state_field,
                    Problem::NotInitialState(self.def.initial.clone()),
                ));
            }
        }

        let mut fields = match schema::validate_document(&self.def.fields, input) {
            Ok(fields) if violations.is_empty() => fields,
            Ok(_) => return Err(violations),
            Err(mut found) => {
                found.append(&mut violations);
                found.sort_by(|a, b| a.field.cmp(&b.field));
                return Err(found);
            }
        };
        fields.insert(
            self.def.state_field.clone(),
            Value::String(self.def.initial.to_string()),
        );
        Ok(fields)
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || c == '/')
}

fn validate_definition(def: &TypeDefinition) -> Result<(), DefinitionError> {
    let ty = def.name.clone();
    if !valid_name(&def.name) {
        return Err(DefinitionError::InvalidName(def.name.clone()));
    }
    if !valid_name(&def.state_field) {
        return Err(DefinitionError::InvalidName(def.state_field.clone()));
    }
    if def.states.is_empty() {
        return Err(DefinitionError::NoStates { ty });
    }

    let mut declared = BTreeSet::new();
    for state in &def.states {
        if !valid_name(state.as_str()) {
            return Err(DefinitionError::InvalidName(state.to_string()));
        }
        if !declared.insert(state) {
            return Err(DefinitionError::DuplicateState {
                ty,
                state: state.clone(),
            });
        }
    }

    let require_state = |context: &str, state: &StateId| {
        if declared.contains(state) {
            Ok(())
        } else {
            Err(DefinitionError::UnknownState {
                ty: def.name.clone(),
                context: context.to_string(),
                state: state.clone(),
            })
        }
    };

    require_state("initial state", &def.initial)?;

    if def.fields.contains_key(&def.state_field) {
        return Err(DefinitionError::StateFieldCollision {
            ty,
            field: def.state_field.clone(),
        });
    }
    check_schema(&ty, &def.fields, &require_state)?;

    let mut parent_fields: BTreeSet<&str> = def.fields.keys().map(String::as_str).collect();
    parent_fields.insert(&def.state_field);

    let mut seen = BTreeSet::new();
    for transition in &def.transitions {
        if !valid_name(&transition.name) {
            return Err(DefinitionError::InvalidName(transition.name.clone()));
        }
        let context = format!("transition '{}'", transition.name);
        require_state(&context, &transition.from)?;
        require_state(&context, &transition.to)?;
        if transition.from == transition.to {
            return Err(DefinitionError::SelfLoop {
                ty,
                name: transition.name.clone(),
                state: transition.from.clone(),
            });
        }
        if !seen.insert((&transition.from, &transition.name)) {
            return Err(DefinitionError::DuplicateTransition {
                ty,
                name: transition.name.clone(),
                from: transition.from.clone(),
            });
        }
        if let Some(guard) = &transition.guard {
            check_guard_fields(&ty, &context, guard, &parent_fields)?;
        }
    }

    for (name, collection) in &def.collections {
        if !valid_name(name) {
            return Err(DefinitionError::InvalidName(name.clone()));
        }
        check_schema(&ty, &collection.fields, &require_state)?;
    }

    for trigger in &def.triggers {
        if !valid_name(&trigger.name) {
            return Err(DefinitionError::InvalidName(trigger.name.clone()));
        }
        let context = format!("trigger '{}'", trigger.name);
        require_state(&context, &trigger.from)?;
        require_state(&context, &trigger.to)?;
        let Some(collection) = def.collections.get(&trigger.collection) else {
            return Err(DefinitionError::UnknownCollection {
                ty,
                trigger: trigger.name.clone(),
                collection: trigger.collection.clone(),
            });
        };
        if !seen.insert((&trigger.from, &trigger.name)) {
            return Err(DefinitionError::DuplicateTransition {
                ty,
                name: trigger.name.clone(),
                from: trigger.from.clone(),
            });
        }
        if let Some(guard) = &trigger.when {
            let item_fields: BTreeSet<&str> =
                collection.fields.keys().map(String::as_str).collect();
            check_guard_fields(&ty, &context, guard, &item_fields)?;
        }
    }

    let unreachable = unreachable_states(def);
    if !unreachable.is_empty() {
        return Err(DefinitionError::Unreachable {
            ty,
            initial: def.initial.clone(),
            states: unreachable,
        });
    }

    Ok(())
}

fn check_schema(
    ty: &str,
    fields: &FieldSchema,
    require_state: &impl Fn(&str, &StateId) -> Result<(), DefinitionError>,
) -> Result<(), DefinitionError> {
    for (name, spec) in fields {
        if !valid_name(name) {
            return Err(DefinitionError::InvalidName(name.clone()));
        }
        for state in &spec.frozen_in {
            require_state(&format!("field '{name}'"), state)?;
        }
        if let Some(bad) = spec.one_of.iter().find(|v| !spec.kind.admits(v)) {
            return Err(DefinitionError::BadAllowedValue {
                ty: ty.to_string(),
                field: name.clone(),
                value: bad.to_string(),
                kind: spec.kind.to_string(),
            });
        }
    }
    Ok(())
}

fn check_guard_fields(
    ty: &str,
    context: &str,
    guard: &Guard,
    known: &BTreeSet<&str>,
) -> Result<(), DefinitionError> {
    match guard.referenced_fields().into_iter().find(|f| !known.contains(f)) {
        Some(field) => Err(DefinitionError::UnknownGuardField {
            ty: ty.to_string(),
            context: context.to_string(),
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

/// States not reachable from the initial state over any declared edge,
/// in declaration order.
fn unreachable_states(def: &TypeDefinition) -> Vec<StateId> {
    let edges: Vec<(&StateId, &StateId)> = def
        .transitions
        .iter()
        .map(|t| (&t.from, &t.to))
        .chain(def.triggers.iter().map(|t| (&t.from, &t.to)))
        .collect();

    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::from([&def.initial]);
    while let Some(state) = queue.pop_front() {
        if !visited.insert(state) {
            continue;
        }
        for (from, to) in &edges {
            if *from == state && !visited.contains(to) {
                queue.push_back(*to);
            }
        }
    }

    def.states
        .iter()
        .filter(|s| !visited.contains(s))
        .cloned()
        .collect()
}
