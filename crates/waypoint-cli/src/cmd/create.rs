//! `wp create`: create a resource in its type's initial state.

use super::{CapArgs, Context, collect_fields, parse_field};
use crate::cmd::show::{ShowView, render_show_human, render_show_text};
use crate::output::render_mode;
use clap::Args;
use serde_json::Value;
use tracing::info;

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Resource type, e.g. `leave-request`.
    pub type_name: String,

    /// Initial fields as `key=value`. Values parse as JSON when valid.
    #[arg(value_parser = parse_field)]
    pub fields: Vec<(String, Value)>,

    #[command(flatten)]
    pub caps: CapArgs,
}

/// Execute `wp create <type> [key=value...]`.
///
/// Prints the new resource together with its affordances.
///
/// # Errors
///
/// Returns an error if no actor is set, the store cannot be opened, or the
/// store rejects the resource.
pub fn run_create(args: &CreateArgs, ctx: &Context) -> anyhow::Result<()> {
    let actor = ctx.require_actor()?;
    let store = ctx.open_store()?;

    let resource = store
        .create(&args.type_name, collect_fields(&args.fields), &actor)
        .map_err(|e| ctx.fail(&e))?;
    info!(id = %resource.id, r#type = %resource.type_name, "created resource");

    let affordances = store
        .resolve_affordances(&resource.id, &ctx.capabilities())
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
        args: CreateArgs,
    }

    #[test]
    fn fields_are_parsed_in_order() {
        let w = Wrapper::parse_from([
            "test",
            "leave-request",
            "employee=alice",
            "from=2025-11-12",
            "days=3",
        ]);
        assert_eq!(w.args.type_name, "leave-request");
        assert_eq!(
            w.args.fields,
            vec![
                ("employee".to_string(), json!("alice")),
                ("from".to_string(), json!("2025-11-12")),
                ("days".to_string(), json!(3)),
            ]
        );
    }

    #[test]
    fn fields_are_optional() {
        let w = Wrapper::parse_from(["test", "render-job"]);
        assert!(w.args.fields.is_empty());
    }

    #[test]
    fn malformed_field_is_a_usage_error() {
        assert!(Wrapper::try_parse_from(["test", "leave-request", "employee"]).is_err());
    }
}
