//! `wp list`: stored resources, optionally of one type.

use super::Context;
use crate::output::{Renderable, render_list};
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};
use waypoint_core::Resource;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list resources of this type.
    #[arg(long = "type", short = 't', value_name = "TYPE")]
    pub type_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ListRow {
    pub id: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub state: String,
    pub version: u64,
}

impl From<&Resource> for ListRow {
    fn from(r: &Resource) -> Self {
        Self {
            id: r.id.to_string(),
            type_name: r.type_name.clone(),
            state: r.state.to_string(),
            version: r.version,
        }
    }
}

impl Renderable for ListRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{:<16} {:<16} {:<12} v{}",
            self.id, self.type_name, self.state, self.version
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}  {}  {}  {}", self.id, self.type_name, self.state, self.version)
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "type", "state", "version"]
    }
}

/// Execute `wp list [--type T]`.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the type is unknown.
pub fn run_list(args: &ListArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let ids = store
        .list(args.type_name.as_deref())
        .map_err(|e| ctx.fail(&e))?;

    let mut rows = Vec::with_capacity(ids.len());
    for id in &ids {
        let resource = store.get(id).map_err(|e| ctx.fail(&e))?;
        rows.push(ListRow::from(&resource));
    }
    render_list(&rows, ctx.output)
}
