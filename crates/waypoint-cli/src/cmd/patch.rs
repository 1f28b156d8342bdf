//! `wp patch`: merge-patch a resource at an expected version.

use super::{CapArgs, Context, collect_fields, parse_field};
use crate::cmd::show::{ShowView, render_show_human, render_show_text};
use crate::output::render_mode;
use clap::Args;
use serde_json::Value;
use tracing::info;
use waypoint_core::ResourceId;

#[derive(Args, Debug)]
pub struct PatchArgs {
    /// Resource ID to patch.
    pub id: String,

    /// Version the caller last read. A stale version is rejected.
    #[arg(long = "version", value_name = "N")]
    pub expected_version: u64,

    /// Field changes as `key=value`; `key=null` removes an optional field.
    /// Setting the state field requests a transition.
    #[arg(value_parser = parse_field)]
    pub changes: Vec<(String, Value)>,

    #[command(flatten)]
    pub caps: CapArgs,
}

/// Execute `wp patch <id> --version N [key=value...]`.
///
/// # Errors
///
/// Returns an error if no actor is set, the store cannot be opened, or the
/// store rejects the change.
pub fn run_patch(args: &PatchArgs, ctx: &Context) -> anyhow::Result<()> {
    let actor = ctx.require_actor()?;
    let store = ctx.open_store()?;
    let id = ResourceId::from(args.id.as_str());

    let resource = store
        .apply_patch(&id, args.expected_version, collect_fields(&args.changes), &actor)
        .map_err(|e| ctx.fail(&e))?;
    info!(id = %resource.id, version = resource.version, state = %resource.state, "patched resource");

    let affordances = store
        .resolve_affordances(&id, &ctx.capabilities())
        .map_err(|e| ctx.fail(&e))?;
    let view = ShowView::new(&resource, affordances);
    render_mode(ctx.output, &view, render_show_text, render_show_human)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serde_json::json;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: PatchArgs,
    }

    #[test]
    fn version_is_required() {
        assert!(Wrapper::try_parse_from(["test", "lr-1", "status=submitted"]).is_err());
    }

    #[test]
    fn null_removes_a_field() {
        let w = Wrapper::parse_from(["test", "lr-1", "--version", "2", "reason=null"]);
        assert_eq!(w.args.expected_version, 2);
        assert_eq!(w.args.changes, vec![("reason".to_string(), Value::Null)]);
    }

    #[test]
    fn state_change_is_an_ordinary_field() {
        let w = Wrapper::parse_from(["test", "lr-1", "--version", "1", "status=submitted"]);
        assert_eq!(w.args.expected_version, 1);
        assert_eq!(w.args.changes, vec![("status".to_string(), json!("submitted"))]);
    }
}
