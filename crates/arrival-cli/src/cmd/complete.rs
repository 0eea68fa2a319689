use crate::app::App;
use crate::output::print_json;
use anyhow::Context;
use std::path::Path;

pub async fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let app = App::open(root)?;
    let action_id = app
        .manager
        .complete()
        .context("cannot complete action")?;

    if json {
        print_json(&serde_json::json!({ "completed": action_id }))?;
    } else {
        println!("Completed {action_id}.");
    }
    Ok(())
}
