//! `wp types`: list registered resource types or show one definition.

use super::Context;
use crate::output::{
    OutputMode, Renderable, pretty_kv, pretty_rule, pretty_section, render_list, render_mode,
};
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};
use waypoint_core::TypeDefinition;
use waypoint_core::machine::ResourceType;

#[derive(Args, Debug)]
pub struct TypesArgs {
    /// Show the full definition of one type.
    pub name: Option<String>,
}

/// One row of the type listing.
#[derive(Debug, Serialize)]
pub struct TypeRow {
    pub name: String,
    pub initial: String,
    pub states: Vec<String>,
    pub collections: Vec<String>,
}

impl TypeRow {
    fn from_type(ty: &ResourceType) -> Self {
        Self {
            name: ty.name().to_string(),
            initial: ty.initial().to_string(),
            states: ty.states().iter().map(ToString::to_string).collect(),
            collections: ty.collections().keys().cloned().collect(),
        }
    }
}

impl Renderable for TypeRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}", self.name)?;
        writeln!(w, "  states:      {}", self.states.join(" | "))?;
        if !self.collections.is_empty() {
            writeln!(w, "  collections: {}", self.collections.join(", "))?;
        }
        Ok(())
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}",
            self.name,
            self.initial,
            self.states.join(",")
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["name", "initial", "states"]
    }
}

/// Execute `wp types [NAME]`.
///
/// # Errors
///
/// Returns an error if type definitions cannot be loaded, the named type is
/// unknown, or rendering fails.
pub fn run_types(args: &TypesArgs, ctx: &Context) -> anyhow::Result<()> {
    let engine = ctx.engine()?;

    let Some(name) = &args.name else {
        let rows: Vec<TypeRow> = engine.types().map(|ty| TypeRow::from_type(ty)).collect();
        return render_list(&rows, ctx.output);
    };

    let ty = engine.resource_type(name).map_err(|e| ctx.fail(&e))?;
    render_definition(ctx.output, ty.definition())
}

fn render_definition(mode: OutputMode, def: &TypeDefinition) -> anyhow::Result<()> {
    render_mode(mode, def, render_definition_text, render_definition_human)
}

fn guard_text<T: Serialize>(guard: Option<&T>) -> String {
    guard
        .and_then(|g| serde_json::to_string(g).ok())
        .map_or_else(String::new, |g| format!(" if {g}"))
}

fn cap_text(cap: Option<&waypoint_core::Capability>) -> String {
    cap.map_or_else(String::new, |c| format!(" [{c}]"))
}

fn render_definition_text(def: &TypeDefinition, w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "type {}", def.name)?;
    writeln!(w, "state_field {}", def.state_field)?;
    writeln!(w, "initial {}", def.initial)?;
    let states: Vec<String> = def.states.iter().map(ToString::to_string).collect();
    writeln!(w, "states {}", states.join(","))?;
    if let Some(profile) = &def.profile {
        writeln!(w, "profile {profile}")?;
    }
    for (name, spec) in &def.fields {
        writeln!(
            w,
            "field {name} {}{}",
            spec.kind,
            if spec.required { " required" } else { "" }
        )?;
    }
    for t in &def.transitions {
        writeln!(
            w,
            "transition {} {} -> {}{}{}",
            t.name,
            t.from,
            t.to,
            cap_text(t.capability.as_ref()),
            guard_text(t.guard.as_ref())
        )?;
    }
    for (name, coll) in &def.collections {
        let fields: Vec<&str> = coll.fields.keys().map(String::as_str).collect();
        writeln!(
            w,
            "collection {name} ({}){}",
            fields.join(","),
            cap_text(coll.capability.as_ref())
        )?;
    }
    for t in &def.triggers {
        writeln!(
            w,
            "trigger {} on {} {} -> {}{}",
            t.name,
            t.collection,
            t.from,
            t.to,
            guard_text(t.when.as_ref())
        )?;
    }
    Ok(())
}

fn render_definition_human(def: &TypeDefinition, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("Type {}", def.name))?;
    pretty_kv(w, "initial", def.initial.as_str())?;
    let states: Vec<String> = def.states.iter().map(ToString::to_string).collect();
    pretty_kv(w, "states", states.join(" | "))?;
    pretty_kv(w, "state field", &def.state_field)?;
    if let Some(profile) = &def.profile {
        pretty_kv(w, "profile", profile)?;
    }
    if let Some(cap) = &def.edit_capability {
        pretty_kv(w, "edit cap", cap.as_str())?;
    }

    if !def.fields.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Fields")?;
        for (name, spec) in &def.fields {
            let mut notes = vec![spec.kind.to_string()];
            if spec.required {
                notes.push("required".into());
            }
            if !spec.one_of.is_empty() {
                let allowed: Vec<String> = spec.one_of.iter().map(super::compact).collect();
                notes.push(format!("one of {}", allowed.join("/")));
            }
            if !spec.frozen_in.is_empty() {
                let states: Vec<&str> = spec.frozen_in.iter().map(|s| s.as_str()).collect();
                notes.push(format!("frozen in {}", states.join(", ")));
            }
            pretty_kv(w, name, notes.join(", "))?;
        }
    }

    if !def.transitions.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Transitions")?;
        for t in &def.transitions {
            writeln!(
                w,
                "{:<14} {} -> {}{}{}",
                t.name,
                t.from,
                t.to,
                cap_text(t.capability.as_ref()),
                guard_text(t.guard.as_ref())
            )?;
        }
    }

    if !def.collections.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Collections")?;
        for (name, coll) in &def.collections {
            let fields: Vec<&str> = coll.fields.keys().map(String::as_str).collect();
            pretty_kv(
                w,
                name,
                format!("{}{}", fields.join(", "), cap_text(coll.capability.as_ref())),
            )?;
        }
    }

    if !def.triggers.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Triggers")?;
        for t in &def.triggers {
            writeln!(
                w,
                "{:<14} on {} {} -> {}{}",
                t.name,
                t.collection,
                t.from,
                t.to,
                guard_text(t.when.as_ref())
            )?;
        }
    }
    pretty_rule(w)
}
