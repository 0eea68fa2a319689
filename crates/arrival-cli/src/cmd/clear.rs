use crate::app::App;
use crate::output::print_json;
use std::path::Path;

pub async fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let app = App::open(root)?;
    app.manager.clear();
    // Disarm runs on the controller task
    let snapshot = app.settle().await?;

    if json {
        print_json(&snapshot)?;
    } else {
        println!("Trip cleared.");
    }
    Ok(())
}
