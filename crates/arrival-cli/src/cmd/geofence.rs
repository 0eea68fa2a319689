use crate::app::App;
use crate::output::{label, print_fields, print_json};
use arrival_core::geofence::GeofencingRequest;
use std::path::Path;

/// Show the request the current destination produces and the controller state.
pub async fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let app = App::open(root)?;
    let place = app.manager.place();
    let request = GeofencingRequest::build_with(place.as_ref(), &app.config.geofence);
    let snapshot = app.settle().await?;

    if json {
        let value = serde_json::json!({
            "request": request,
            "state": snapshot.state,
            "registered": snapshot.registered,
        });
        return print_json(&value);
    }

    let Some(request) = request else {
        println!("No geofence: destination has no coordinate.");
        return Ok(());
    };
    let mut rows = vec![("state", label(&snapshot.state))];
    for fence in &request.geofences {
        rows.extend([
            ("request id", fence.request_id.clone()),
            ("center", format!("{}, {}", fence.latitude, fence.longitude)),
            ("radius", format!("{} m", fence.radius_m)),
            ("transitions", format!("{:#05b}", fence.transitions.bits())),
            ("loitering", format!("{} ms", fence.loitering_delay_ms)),
            (
                "responsiveness",
                format!("{} ms", fence.notification_responsiveness_ms),
            ),
        ]);
    }
    print_fields(&rows);
    Ok(())
}
