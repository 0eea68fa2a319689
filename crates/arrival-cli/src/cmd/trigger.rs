use crate::app::App;
use crate::output::print_json;
use arrival_core::LifecycleEvent;
use std::path::Path;

/// Deliver the arrival trigger. A completed trip is cleared unless `keep`.
pub async fn run(root: &Path, keep: bool, json: bool) -> anyhow::Result<()> {
    let app = App::open(root)?;
    let mut events = app.manager.subscribe();
    app.manager.on_trigger_fired();

    let mut completed = None;
    while let Ok(event) = events.try_recv() {
        if let LifecycleEvent::Completed { action_id } = event {
            completed = Some(action_id);
        }
    }
    let Some(action_id) = completed else {
        anyhow::bail!("trigger fired but no live action was completed");
    };

    if !keep {
        app.manager.clear();
        app.settle().await?;
    }

    if json {
        print_json(&serde_json::json!({
            "completed": action_id,
            "cleared": !keep,
        }))?;
    } else if keep {
        println!("Completed {action_id}.");
    } else {
        println!("Completed {action_id}; trip cleared.");
    }
    Ok(())
}
