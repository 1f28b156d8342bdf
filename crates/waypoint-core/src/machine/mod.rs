//! The state machine engine.
//!
//! An [`Engine`] is an immutable registry of validated [`ResourceType`]s. It
//! is the sole authority on whether a proposed change is legal from a given
//! state, and on which implicit trigger (if any) a new sub-resource fires.

pub mod definition;
pub mod guard;
pub mod schema;

pub use definition::{CollectionSpec, DefinitionError, ResourceType, Transition, Trigger, TypeDefinition};
pub use guard::Guard;
pub use schema::{FieldKind, FieldSchema, FieldSpec, FieldViolation, Problem};

use crate::catalog;
use crate::error::Error;
use crate::model::{Fields, StateId};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A patch split into its state change and its plain field changes.
///
/// Entries equal to the current value have already been dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposedChange {
    /// Requested destination state, when it differs from the current one.
    pub state: Option<StateId>,
    /// Non-state field changes with merge-patch semantics.
    pub fields: Fields,
}

impl ProposedChange {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.fields.is_empty()
    }
}

/// Why the engine refused a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("no transition from '{from}' to '{to}'")]
    NoSuchTransition { from: StateId, to: StateId },

    #[error("guard of transition '{transition}' failed: {guard}")]
    GuardFailed { transition: String, guard: String },

    #[error("field '{field}' is frozen in state '{state}'")]
    FieldFrozen { field: String, state: StateId },
}

impl RejectReason {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoSuchTransition { .. } => "no_such_transition",
            Self::GuardFailed { .. } => "guard_failed",
            Self::FieldFrozen { .. } => "field_frozen",
        }
    }
}

/// Outcome of [`ResourceType::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDecision {
    /// The change is legal. `via` names the transition taken, if any.
    Allowed { next: StateId, via: Option<String> },
    Rejected(RejectReason),
}

impl ResourceType {
    /// Split a merge patch against the current field view.
    ///
    /// The state field becomes [`ProposedChange::state`]; unchanged entries
    /// and removals of absent fields are dropped.
    ///
    /// # Errors
    ///
    /// Returns a violation when the state field is cleared or is not a string.
    pub fn split_patch(
        &self,
        current_state: &StateId,
        current_fields: &Fields,
        changes: Fields,
    ) -> Result<ProposedChange, Vec<FieldViolation>> {
        let mut proposed = ProposedChange::default();
        for (name, value) in changes {
            if name == self.state_field() {
                match value {
                    Value::String(s) if s == current_state.as_str() => {}
                    Value::String(s) => proposed.state = Some(StateId::from(s)),
                    Value::Null => {
                        return Err(vec![FieldViolation::new(&name, Problem::Cleared)]);
                    }
                    _ => {
                        return Err(vec![FieldViolation::new(
                            &name,
                            Problem::WrongKind(FieldKind::String),
                        )]);
                    }
                }
                continue;
            }
            let unchanged = match current_fields.get(&name) {
                Some(existing) => *existing == value,
                None => value.is_null(),
            };
            if !unchanged {
                proposed.fields.insert(name, value);
            }
        }
        Ok(proposed)
    }

    /// Decide whether `change` is legal from `current_state`.
    ///
    /// Frozen fields are checked against the current state. Guards see the
    /// current fields merged with the change, including the new state.
    #[must_use]
    pub fn validate(
        &self,
        current_state: &StateId,
        current_fields: &Fields,
        change: &ProposedChange,
    ) -> TransitionDecision {
        for name in change.fields.keys() {
            if self
                .fields()
                .get(name)
                .is_some_and(|spec| spec.is_frozen_in(current_state))
            {
                return TransitionDecision::Rejected(RejectReason::FieldFrozen {
                    field: name.clone(),
                    state: current_state.clone(),
                });
            }
        }

        let Some(to) = &change.state else {
            return TransitionDecision::Allowed {
                next: current_state.clone(),
                via: None,
            };
        };

        let candidates: Vec<&Transition> = self
            .outgoing(current_state)
            .filter(|t| &t.to == to)
            .collect();
        let Some(first) = candidates.first() else {
            return TransitionDecision::Rejected(RejectReason::NoSuchTransition {
                from: current_state.clone(),
                to: to.clone(),
            });
        };

        let mut view = current_fields.clone();
        schema::merge_into(&mut view, &change.fields);
        view.insert(self.state_field().to_string(), Value::String(to.to_string()));

        match candidates
            .iter()
            .find(|t| t.guard.as_ref().is_none_or(|g| g.eval(&view)))
        {
            Some(taken) => TransitionDecision::Allowed {
                next: to.clone(),
                via: Some(taken.name.clone()),
            },
            None => TransitionDecision::Rejected(RejectReason::GuardFailed {
                transition: first.name.clone(),
                guard: first
                    .guard
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            }),
        }
    }

    /// First trigger, in registration order, fired by appending `payload`
    /// to `collection` while the resource is in `current_state`.
    #[must_use]
    pub fn resolve_trigger(
        &self,
        collection: &str,
        payload: &Fields,
        current_state: &StateId,
    ) -> Option<&Trigger> {
        self.triggers_from(current_state).find(|t| {
            t.collection == collection && t.when.as_ref().is_none_or(|g| g.eval(payload))
        })
    }
}

/// Registry of resource types, immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    types: BTreeMap<String, Arc<ResourceType>>,
}

impl Engine {
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// An engine with the built-in catalog registered.
    ///
    /// # Errors
    ///
    /// Fails only if an embedded definition is invalid.
    pub fn with_builtin() -> Result<Self, DefinitionError> {
        Ok(Self::builder().with_builtin()?.build())
    }

    /// Look up a registered type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownType`] if no type has this name.
    pub fn resource_type(&self, name: &str) -> Result<&Arc<ResourceType>, Error> {
        self.types.get(name).ok_or_else(|| Error::UnknownType {
            name: name.to_string(),
        })
    }

    /// Registered types in name order.
    pub fn types(&self) -> impl Iterator<Item = &Arc<ResourceType>> {
        self.types.values()
    }

    /// See [`ResourceType::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownType`] if the type is not registered.
    pub fn validate(
        &self,
        type_name: &str,
        current_state: &StateId,
        current_fields: &Fields,
        change: &ProposedChange,
    ) -> Result<TransitionDecision, Error> {
        let ty = self.resource_type(type_name)?;
        let decision = ty.validate(current_state, current_fields, change);
        debug!(r#type = type_name, from = %current_state, ?decision, "validated change");
        Ok(decision)
    }

    /// See [`ResourceType::resolve_trigger`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownType`] if the type is not registered.
    pub fn resolve_trigger(
        &self,
        type_name: &str,
        collection: &str,
        payload: &Fields,
        current_state: &StateId,
    ) -> Result<Option<&Trigger>, Error> {
        let ty = self.resource_type(type_name)?;
        Ok(ty.resolve_trigger(collection, payload, current_state))
    }
}

/// Collects definitions and validates each as it is registered.
#[derive(Debug, Default)]
pub struct EngineBuilder {
    types: BTreeMap<String, Arc<ResourceType>>,
}

impl EngineBuilder {
    /// Validate and add a definition.
    ///
    /// # Errors
    ///
    /// Returns the definition's first problem, or
    /// [`DefinitionError::DuplicateType`] if the name is taken.
    pub fn register(mut self, def: TypeDefinition) -> Result<Self, DefinitionError> {
        if self.types.contains_key(&def.name) {
            return Err(DefinitionError::DuplicateType(def.name));
        }
        let ty = ResourceType::new(def)?;
        debug!(
            r#type = ty.name(),
            states = ty.states().len(),
            transitions = ty.transitions().len(),
            triggers = ty.triggers().len(),
            "registered resource type"
        );
        self.types.insert(ty.name().to_string(), Arc::new(ty));
        Ok(self)
    }

    /// Parse a TOML definition and register it.
    ///
    /// # Errors
    ///
    /// Returns parse or validation problems.
    pub fn register_toml(self, text: &str) -> Result<Self, DefinitionError> {
        self.register(TypeDefinition::from_toml(text)?)
    }

    /// Register every type in the built-in catalog.
    ///
    /// # Errors
    ///
    /// Fails if a catalog name is already registered.
    pub fn with_builtin(self) -> Result<Self, DefinitionError> {
        catalog::SOURCES
            .iter()
            .try_fold(self, |builder, (_, text)| builder.register_toml(text))
    }

    #[must_use]
    pub fn build(self) -> Engine {
        Engine { types: self.types }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> Engine {
        Engine::with_builtin().expect("builtin catalog")
    }

    fn fields(value: Value) -> Fields {
        serde_json::from_value(value).expect("fields object")
    }

    fn draft_fields() -> Fields {
        fields(json!({
            "employee": "alice",
            "from": "2025-11-12",
            "to": "2025-11-15",
            "status": "draft",
        }))
    }

    fn state(s: &str) -> StateId {
        StateId::from(s)
    }

    #[test]
    fn split_patch_drops_unchanged_entries() {
        let engine = engine();
        let ty = engine.resource_type("leave-request").expect("type");
        let change = ty
            .split_patch(
                &state("draft"),
                &draft_fields(),
                fields(json!({"status": "draft", "employee": "alice", "reason": null, "to": "2025-11-16"})),
            )
            .expect("split");
        assert_eq!(change.state, None);
        assert_eq!(change.fields, fields(json!({"to": "2025-11-16"})));

        let change = ty
            .split_patch(&state("draft"), &draft_fields(), fields(json!({"status": "submitted"})))
            .expect("split");
        assert_eq!(change.state, Some(state("submitted")));
        assert!(change.fields.is_empty());
    }

    #[test]
    fn split_patch_rejects_bad_state_values() {
        let engine = engine();
        let ty = engine.resource_type("leave-request").expect("type");
        let err = ty
            .split_patch(&state("draft"), &draft_fields(), fields(json!({"status": 3})))
            .expect_err("wrong kind");
        assert_eq!(err[0].problem, Problem::WrongKind(FieldKind::String));
        let err = ty
            .split_patch(&state("draft"), &draft_fields(), fields(json!({"status": null})))
            .expect_err("cleared");
        assert_eq!(err[0].problem, Problem::Cleared);
    }

    #[test]
    fn declared_transition_is_allowed() {
        let engine = engine();
        let change = ProposedChange {
            state: Some(state("submitted")),
            ..ProposedChange::default()
        };
        let decision = engine
            .validate("leave-request", &state("draft"), &draft_fields(), &change)
            .expect("known type");
        assert_eq!(
            decision,
            TransitionDecision::Allowed {
                next: state("submitted"),
                via: Some("submit".into()),
            }
        );
    }

    #[test]
    fn undeclared_edge_is_rejected() {
        let engine = engine();
        let change = ProposedChange {
            state: Some(state("closed")),
            ..ProposedChange::default()
        };
        let decision = engine
            .validate("leave-request", &state("draft"), &draft_fields(), &change)
            .expect("known type");
        assert_eq!(
            decision,
            TransitionDecision::Rejected(RejectReason::NoSuchTransition {
                from: state("draft"),
                to: state("closed"),
            })
        );
    }

    #[test]
    fn guard_sees_merged_fields() {
        let engine = engine();
        let ty = engine.resource_type("leave-request").expect("type");
        let mut change = ProposedChange {
            state: Some(state("submitted")),
            fields: fields(json!({"to": "2025-11-01"})),
        };
        let decision = ty.validate(&state("draft"), &draft_fields(), &change);
        let TransitionDecision::Rejected(RejectReason::GuardFailed { transition, guard }) = decision
        else {
            panic!("expected guard failure, got {decision:?}");
        };
        assert_eq!(transition, "submit");
        assert!(guard.contains("from <= to"));

        change.fields = fields(json!({"to": "2025-11-20"}));
        assert!(matches!(
            ty.validate(&state("draft"), &draft_fields(), &change),
            TransitionDecision::Allowed { .. }
        ));
    }

    #[test]
    fn frozen_field_is_rejected_in_current_state() {
        let engine = engine();
        let ty = engine.resource_type("leave-request").expect("type");
        let change = ProposedChange {
            state: None,
            fields: fields(json!({"employee": "mallory"})),
        };
        assert_eq!(
            ty.validate(&state("submitted"), &draft_fields(), &change),
            TransitionDecision::Rejected(RejectReason::FieldFrozen {
                field: "employee".into(),
                state: state("submitted"),
            })
        );
        assert!(matches!(
            ty.validate(&state("draft"), &draft_fields(), &change),
            TransitionDecision::Allowed { via: None, .. }
        ));
    }

    #[test]
    fn first_passing_edge_wins() {
        let engine = Engine::builder()
            .register_toml(
                r#"
                name = "gate"
                initial = "a"
                states = ["a", "b"]

                [fields.n]
                kind = "integer"

                [fields.m]
                kind = "integer"

                [[transitions]]
                name = "small"
                from = "a"
                to = "b"
                guard = { op = "ordered", lower = "n", upper = "m" }

                [[transitions]]
                name = "any"
                from = "a"
                to = "b"
                "#,
            )
            .expect("valid")
            .build();
        let ty = engine.resource_type("gate").expect("type");
        let change = ProposedChange {
            state: Some(state("b")),
            ..ProposedChange::default()
        };
        let view = fields(json!({"n": 1, "m": 2}));
        assert_eq!(
            ty.validate(&state("a"), &view, &change),
            TransitionDecision::Allowed {
                next: state("b"),
                via: Some("small".into())
            }
        );
        let view = fields(json!({"n": 3, "m": 2}));
        assert_eq!(
            ty.validate(&state("a"), &view, &change),
            TransitionDecision::Allowed {
                next: state("b"),
                via: Some("any".into())
            }
        );
    }

    #[test]
    fn trigger_resolution_checks_collection_state_and_payload() {
        let engine = engine();
        let approved = fields(json!({"reviewer": "bob", "decision": "approved"}));
        let rejected = fields(json!({"reviewer": "bob", "decision": "rejected"}));

        let fired = engine
            .resolve_trigger("leave-request", "approvals", &approved, &state("submitted"))
            .expect("type");
        assert_eq!(fired.map(|t| t.to.as_str()), Some("approved"));

        let fired = engine
            .resolve_trigger("leave-request", "approvals", &rejected, &state("submitted"))
            .expect("type");
        assert_eq!(fired.map(|t| t.name.as_str()), Some("reject"));

        let fired = engine
            .resolve_trigger("leave-request", "approvals", &approved, &state("draft"))
            .expect("type");
        assert!(fired.is_none());
    }

    #[test]
    fn duplicate_and_unknown_types() {
        let err = Engine::builder()
            .with_builtin()
            .and_then(EngineBuilder::with_builtin)
            .expect_err("registered twice");
        assert!(matches!(err, DefinitionError::DuplicateType(_)));

        let err = engine().resource_type("invoice").expect_err("unknown");
        assert!(matches!(err, Error::UnknownType { .. }));
    }
}
