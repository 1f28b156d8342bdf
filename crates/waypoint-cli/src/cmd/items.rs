//! `wp items`: list a collection's items in creation order.

use super::{Context, compact};
use crate::output::{Renderable, render_list};
use clap::Args;
use std::io::{self, Write};
use waypoint_core::{ResourceId, Subresource};

#[derive(Args, Debug)]
pub struct ItemsArgs {
    /// Parent resource ID.
    pub id: String,

    /// Collection name.
    pub collection: String,
}

impl Renderable for Subresource {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  by {} at {}",
            self.id,
            self.created_by,
            self.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        for (name, value) in &self.fields {
            writeln!(w, "  {name}: {}", compact(value))?;
        }
        Ok(())
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={}", compact(v)))
            .collect();
        writeln!(w, "{}  {}  {}", self.id, self.created_by, fields.join(" "))
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "by", "fields"]
    }
}

/// Execute `wp items <id> <collection>`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened, the parent is missing, or
/// its type declares no such collection.
pub fn run_items(args: &ItemsArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let id = ResourceId::from(args.id.as_str());
    let items = store
        .list_subresources(&id, &args.collection)
        .map_err(|e| ctx.fail(&e))?;
    render_list(&items, ctx.output)
}
