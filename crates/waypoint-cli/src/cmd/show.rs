//! `wp show`: a resource with the links and actions open to the caller.

use super::{CapArgs, Context, compact};
use crate::output::{pretty_kv, pretty_rule, pretty_section, render_mode};
use clap::Args;
use serde::Serialize;
use std::io::Write;
use waypoint_core::{Action, AffordanceSet, Resource, ResourceId};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Resource ID to display.
    pub id: String,

    #[command(flatten)]
    pub caps: CapArgs,
}

/// A resource plus its affordances, as printed by `show`, `create` and `patch`.
#[derive(Debug, Serialize)]
pub struct ShowView<'a> {
    #[serde(flatten)]
    pub resource: &'a Resource,
    pub links: Vec<waypoint_core::Link>,
    pub actions: Vec<Action>,
}

impl<'a> ShowView<'a> {
    pub fn new(resource: &'a Resource, affordances: AffordanceSet) -> Self {
        Self {
            resource,
            links: affordances.links,
            actions: affordances.actions,
        }
    }
}

/// Execute `wp show <id>`.
///
/// Affordances are resolved for the capabilities passed with `--cap`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, the resource does not
/// exist, or rendering fails.
pub fn run_show(args: &ShowArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let id = ResourceId::from(args.id.as_str());

    let resource = store.get(&id).map_err(|e| ctx.fail(&e))?;
    let affordances = store
        .resolve_affordances(&id, &ctx.capabilities())
        .map_err(|e| ctx.fail(&e))?;

    let view = ShowView::new(&resource, affordances);
    render_mode(ctx.output, &view, render_show_text, render_show_human)
}

fn action_inputs(action: &Action) -> String {
    action
        .fields
        .iter()
        .map(|f| match &f.value {
            Some(v) => format!("{}={}", f.name, compact(v)),
            None if f.required => format!("{}!", f.name),
            None => f.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn render_show_text(view: &ShowView<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    let r = view.resource;
    writeln!(w, "{}  {}  {}  v{}", r.id, r.type_name, r.state, r.version)?;
    for (name, value) in &r.fields {
        writeln!(w, "field {name}={}", compact(value))?;
    }
    for link in &view.links {
        writeln!(w, "link {} {}", link.rel, link.href)?;
    }
    for action in &view.actions {
        writeln!(
            w,
            "action {} {} {} {}",
            action.name,
            action.method.http_verb(),
            action.href,
            action_inputs(action)
        )?;
    }
    Ok(())
}

pub fn render_show_human(view: &ShowView<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    let r = view.resource;
    pretty_section(w, &format!("{} {}", r.type_name, r.id))?;
    pretty_kv(w, "state", r.state.as_str())?;
    pretty_kv(w, "version", r.version.to_string())?;
    pretty_kv(w, "created", r.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string())?;
    pretty_kv(w, "updated", r.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string())?;

    writeln!(w)?;
    pretty_section(w, "Fields")?;
    for (name, value) in &r.fields {
        pretty_kv(w, name, compact(value))?;
    }

    writeln!(w)?;
    pretty_section(w, "Links")?;
    for link in &view.links {
        pretty_kv(w, &link.rel, &link.href)?;
    }

    writeln!(w)?;
    pretty_section(w, "Actions")?;
    if view.actions.is_empty() {
        writeln!(w, "(none for the given capabilities)")?;
    }
    for action in &view.actions {
        writeln!(
            w,
            "{:<14} {:<6} {}",
            action.name,
            action.method.http_verb(),
            action.href
        )?;
        let inputs = action_inputs(action);
        if !inputs.is_empty() {
            writeln!(w, "{:<14} {inputs}", "")?;
        }
    }
    pretty_rule(w)
}
