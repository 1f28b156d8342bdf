//! Hypermedia affordances: what a caller can do next with a resource.
//!
//! An [`AffordanceSet`] is derived on every read and never stored. It is a
//! pure function of the resource's state and fields, the type's transition
//! table and the caller's capabilities, so equal inputs serialize to equal
//! bytes.

use crate::machine::{FieldKind, FieldSpec, ResourceType};
use crate::model::{Capabilities, Resource};
use serde::Serialize;
use serde_json::Value;

/// Navigational links and currently legal actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffordanceSet {
    pub links: Vec<Link>,
    pub actions: Vec<Action>,
}

impl AffordanceSet {
    #[must_use]
    pub fn link(&self, rel: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.rel == rel)
    }

    #[must_use]
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    /// Action names in advertised order.
    pub fn action_names(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(|a| a.name.as_str())
    }
}

/// A typed link (RFC 8288 style relation and target).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
}

/// Method category of an action. Encoders map these onto their transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Merge-patch the target resource.
    PartialUpdate,
    /// Create a new item in the target collection.
    Create,
}

impl Method {
    /// The HTTP verb conventionally used for this method.
    #[must_use]
    pub const fn http_verb(self) -> &'static str {
        match self {
            Self::PartialUpdate => "PATCH",
            Self::Create => "POST",
        }
    }
}

/// One advertised operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub name: String,
    pub method: Method,
    pub href: String,
    pub fields: Vec<ActionField>,
}

/// An input of an action, optionally pre-filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<Value>,
}

impl ActionField {
    fn from_spec(name: &str, spec: &FieldSpec, value: Option<Value>) -> Self {
        Self {
            name: name.to_string(),
            kind: spec.kind,
            required: spec.required,
            value,
            one_of: spec.one_of.clone(),
        }
    }
}

/// Path of a resource.
#[must_use]
pub fn resource_href(resource: &Resource) -> String {
    format!("/{}/{}", resource.type_name, resource.id)
}

/// Compute the affordances of `resource` for a caller holding `caps`.
///
/// Links: `self`, `history`, one per collection in name order, then
/// `profile` when the type declares one. Actions: explicit transitions
/// whose guard passes, then triggers on the collections, then `edit`.
#[must_use]
pub fn resolve(ty: &ResourceType, resource: &Resource, caps: &Capabilities) -> AffordanceSet {
    let self_href = resource_href(resource);
    let collection_href = |name: &str| format!("{self_href}/{name}");

    let mut links = vec![
        Link {
            rel: "self".into(),
            href: self_href.clone(),
        },
        Link {
            rel: "history".into(),
            href: collection_href("history"),
        },
    ];
    links.extend(ty.collections().keys().map(|name| Link {
        rel: name.clone(),
        href: collection_href(name),
    }));
    if let Some(profile) = ty.profile() {
        links.push(Link {
            rel: "profile".into(),
            href: profile.to_string(),
        });
    }

    let mut actions = Vec::new();

    for transition in ty.outgoing(&resource.state) {
        let guard_ok = transition
            .guard
            .as_ref()
            .is_none_or(|g| g.eval(&resource.fields));
        if !guard_ok || !caps.allows(transition.capability.as_ref()) {
            continue;
        }
        actions.push(Action {
            name: transition.name.clone(),
            method: Method::PartialUpdate,
            href: self_href.clone(),
            fields: vec![ActionField {
                name: ty.state_field().to_string(),
                kind: FieldKind::String,
                required: true,
                value: Some(Value::String(transition.to.to_string())),
                one_of: Vec::new(),
            }],
        });
    }

    for trigger in ty.triggers_from(&resource.state) {
        let Some(collection) = ty.collection(&trigger.collection) else {
            continue;
        };
        let required = trigger
            .capability
            .as_ref()
            .or(collection.capability.as_ref());
        if !caps.allows(required) {
            continue;
        }
        let pinned = trigger
            .when
            .as_ref()
            .map(crate::machine::Guard::pinned_values)
            .unwrap_or_default();
        actions.push(Action {
            name: trigger.name.clone(),
            method: Method::Create,
            href: collection_href(&trigger.collection),
            fields: collection
                .fields
                .iter()
                .map(|(name, spec)| {
                    let value = pinned.get(name.as_str()).map(|v| (*v).clone());
                    ActionField::from_spec(name, spec, value)
                })
                .collect(),
        });
    }

    let editable: Vec<ActionField> = ty
        .editable_fields(&resource.state)
        .map(|(name, spec)| ActionField::from_spec(name, spec, resource.field(name).cloned()))
        .collect();
    if !editable.is_empty() && caps.allows(ty.edit_capability()) {
        actions.push(Action {
            name: "edit".into(),
            method: Method::PartialUpdate,
            href: self_href,
            fields: editable,
        });
    }

    AffordanceSet { links, actions }
}
