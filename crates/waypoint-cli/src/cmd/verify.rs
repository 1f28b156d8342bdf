//! `wp verify`: check stored history against hash chain and replay.

use super::{Context, report};
use crate::output::{CliError, Renderable, render_list};
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};
use tracing::warn;
use waypoint_core::ResourceId;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Resources to verify. Verifies every stored resource when omitted.
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyRow {
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Renderable for VerifyRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        match &self.detail {
            None => writeln!(w, "✓ {}", self.id),
            Some(detail) => writeln!(w, "✗ {}  {detail}", self.id),
        }
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let status = if self.ok { "ok" } else { "FAIL" };
        match &self.detail {
            None => writeln!(w, "{}  {status}", self.id),
            Some(detail) => writeln!(w, "{}  {status}  {detail}", self.id),
        }
    }

    fn table_headers() -> &'static [&'static str] {
        &["id", "status", "detail"]
    }
}

/// Execute `wp verify [id...]`.
///
/// Every resource is checked and reported before the command fails, so one
/// corrupt history does not hide another.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or any history fails
/// verification.
pub fn run_verify(args: &VerifyArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.open_store()?;
    let ids: Vec<ResourceId> = if args.ids.is_empty() {
        store.list(None).map_err(|e| ctx.fail(&e))?
    } else {
        args.ids.iter().map(|id| ResourceId::from(id.as_str())).collect()
    };

    let rows: Vec<VerifyRow> = ids
        .iter()
        .map(|id| match store.verify_history(id) {
            Ok(()) => VerifyRow {
                id: id.to_string(),
                ok: true,
                error_code: None,
                detail: None,
            },
            Err(e) => {
                warn!(id = %id, error = %e, "history verification failed");
                VerifyRow {
                    id: id.to_string(),
                    ok: false,
                    error_code: Some(e.code().code().to_string()),
                    detail: Some(e.to_string()),
                }
            }
        })
        .collect();

    render_list(&rows, ctx.output)?;

    let failed = rows.iter().filter(|r| !r.ok).count();
    if failed > 0 {
        return Err(report(
            ctx.output,
            &CliError::with_details(
                format!("{failed} of {} histories failed verification", rows.len()),
                "Restore the store from a backup; history is append-only.",
                "verify_failed",
            ),
        ));
    }
    Ok(())
}
