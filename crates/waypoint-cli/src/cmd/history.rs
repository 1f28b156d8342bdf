//! `wp history`: a resource's audit trail, oldest first.

use super::Context;
use crate::output::{Renderable, render_list};
use clap::Args;
use std::io::{self, Write};
use waypoint_core::history::EventData;
use waypoint_core::{Event, ResourceId};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Resource ID.
    pub id: String,
}

impl Renderable for Event {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let detail = match &self.data {
            EventData::Create(d) => format!("created in '{}'", d.state),
            EventData::Update(d) => {
                let names: Vec<&str> = d.changes.keys().map(String::as_str).collect();
                format!("changed {}", names.join(", "))
            }
            EventData::Transition(d) => {
                format!("{} -> {} via '{}'", d.from, d.to, d.transition)
            }
            EventData::Append(d) => format!("added {} to {}", d.subresource, d.collection),
        };
        writeln!(
            w,
            "#{:<3} v{:<3} {}  {:<10} {detail}",
            self.seq,
            self.version,
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.actor.as_str(),
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{self}")
    }
}

/// Execute `wp history <id>`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the resource has no
/// history.
pub fn run_history(args: &HistoryArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let id = ResourceId::from(args.id.as_str());
    let events = store.list_history(&id).map_err(|e| ctx.fail(&e))?;
    render_list(events.as_slice(), ctx.output)
}
