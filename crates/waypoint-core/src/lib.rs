//! waypoint-core library.
//!
//! Resources with versioned state, sub-resource collections, an audit history
//! and hypermedia affordances computed from current state.
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`Error`]; configuration and
//!   startup helpers return `anyhow::Result`.
//! - **Logging**: `tracing` macros (`info!` for committed mutations, `warn!`
//!   for rejected writes, `debug!` for everything else).

pub mod affordance;
pub mod catalog;
pub mod clock;
pub mod collection;
pub mod config;
pub mod error;
pub mod history;
pub mod id;
pub mod lock;
pub mod machine;
pub mod model;
pub mod storage;
pub mod store;

pub use affordance::{Action, ActionField, AffordanceSet, Link, Method};
pub use error::{Error, ErrorCode, Result};
pub use history::{Event, EventKind, EventSeq};
pub use machine::{Engine, RejectReason, ResourceType, TransitionDecision, TypeDefinition};
pub use model::{
    Actor, Capabilities, Capability, Fields, OperationId, Resource, ResourceId, StateId,
    Subresource, SubresourceId,
};
pub use store::{Appended, ResourceStore};
