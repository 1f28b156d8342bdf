//! `wp append`: add an item to one of a resource's collections.

use super::{Context, collect_fields, parse_field};
use crate::output::{pretty_kv, pretty_section, render_mode};
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use tracing::info;
use waypoint_core::{Resource, ResourceId, Subresource};

#[derive(Args, Debug)]
pub struct AppendArgs {
    /// Parent resource ID.
    pub id: String,

    /// Collection name, e.g. `approvals`.
    pub collection: String,

    /// Item fields as `key=value`.
    #[arg(value_parser = parse_field)]
    pub fields: Vec<(String, Value)>,
}

#[derive(Debug, Serialize)]
struct AppendOutput<'a> {
    item: &'a Subresource,
    parent: &'a Resource,
    #[serde(skip_serializing_if = "Option::is_none")]
    fired: Option<&'a str>,
}

/// Execute `wp append <id> <collection> [key=value...]`.
///
/// # Errors
///
/// Returns an error if no actor is set, the store cannot be opened, or the
/// store rejects the item.
pub fn run_append(args: &AppendArgs, ctx: &Context) -> anyhow::Result<()> {
    let actor = ctx.require_actor()?;
    let store = ctx.open_store()?;
    let id = ResourceId::from(args.id.as_str());

    let appended = store
        .add_subresource(&id, &args.collection, collect_fields(&args.fields), &actor)
        .map_err(|e| ctx.fail(&e))?;
    info!(
        id = %id,
        item = %appended.subresource.id,
        fired = appended.fired.as_deref().unwrap_or("-"),
        "appended item"
    );

    let out = AppendOutput {
        item: &appended.subresource,
        parent: &appended.parent,
        fired: appended.fired.as_deref(),
    };
    render_mode(ctx.output, &out, render_append_text, render_append_human)
}

fn render_append_text(out: &AppendOutput<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    writeln!(w, "{}  {}  {}", out.item.id, out.item.collection, out.item.parent)?;
    writeln!(
        w,
        "parent {}  {}  v{}",
        out.parent.id, out.parent.state, out.parent.version
    )?;
    if let Some(fired) = out.fired {
        writeln!(w, "fired {fired}")?;
    }
    Ok(())
}

fn render_append_human(out: &AppendOutput<'_>, w: &mut dyn Write) -> std::io::Result<()> {
    pretty_section(w, &format!("Added {} to {}", out.item.id, out.item.collection))?;
    for (name, value) in &out.item.fields {
        pretty_kv(w, name, super::compact(value))?;
    }
    writeln!(w)?;
    match out.fired {
        Some(fired) => writeln!(
            w,
            "{} moved to '{}' (v{}) by trigger '{fired}'",
            out.parent.id, out.parent.state, out.parent.version
        ),
        None => writeln!(
            w,
            "{} stays '{}' (v{})",
            out.parent.id, out.parent.state, out.parent.version
        ),
    }
}
