use crate::app::App;
use crate::cmd::report_arm;
use std::path::Path;

pub async fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let app = App::open(root)?;
    let watch = app.watch();
    app.manager.start();
    let outcome = app.await_arm(watch).await?;
    report_arm(outcome, json)
}
