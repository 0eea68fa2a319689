use crate::app::App;
use crate::output::{or_dash, print_fields, print_json};
use anyhow::Context;
use arrival_core::Action;
use clap::Subcommand;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// Replace the current action
    Set {
        /// Provider-assigned action id (omit if not yet assigned)
        id: Option<String>,
        /// External correlation key
        #[arg(long)]
        lookup_id: Option<String>,
        /// Extra provider field, KEY=VALUE (repeatable)
        #[arg(long = "field", value_name = "KEY=VALUE", value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// Show the current action
    Show,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

pub async fn run(root: &Path, subcmd: ActionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ActionSubcommand::Set {
            id,
            lookup_id,
            fields,
        } => set(root, id, lookup_id, fields, json),
        ActionSubcommand::Show => show(root, json),
    }
}

fn set(
    root: &Path,
    id: Option<String>,
    lookup_id: Option<String>,
    fields: Vec<(String, String)>,
    json: bool,
) -> anyhow::Result<()> {
    let extra: Map<String, Value> = fields
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    let action = Action {
        id,
        lookup_id,
        extra,
    };

    let app = App::open(root)?;
    app.manager
        .set_action(action.clone())
        .context("failed to save action")?;

    if json {
        print_json(&action)?;
    } else {
        println!("Action set: {}", or_dash(action.non_empty_id()));
    }
    Ok(())
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let app = App::open(root)?;
    let action = app.manager.action();

    if json {
        return print_json(&action);
    }
    match action {
        None => println!("No current action."),
        Some(action) => {
            let mut rows = vec![
                ("id", or_dash(app.manager.action_id())),
                ("lookup id", or_dash(action.lookup_id.as_deref())),
            ];
            for (key, value) in &action.extra {
                rows.push((key.as_str(), value.to_string()));
            }
            print_fields(&rows);
        }
    }
    Ok(())
}
