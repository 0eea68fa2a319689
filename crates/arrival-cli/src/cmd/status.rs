use crate::app::App;
use crate::output::{label, or_dash, print_fields, print_json};
use crate::providers::load_registry;
use anyhow::Context;
use arrival_core::geofence::{ArmState, GeofencingRequest};
use arrival_core::{paths, Action, Place, TripPhase};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct StatusOutput {
    phase: TripPhase,
    live: bool,
    action_id: Option<String>,
    lookup_id: Option<String>,
    action: Option<Action>,
    place: Option<Place>,
    geofence: ArmState,
    request: Option<GeofencingRequest>,
    registered_geofences: usize,
}

pub async fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let app = App::open(root)?;
    let manager = &app.manager;

    let phase = manager.phase().await;
    let snapshot = app.settle().await?;
    let registry = load_registry(&paths::geofences_path(root))
        .context("failed to read geofence registry")?;

    let status = StatusOutput {
        phase,
        live: manager.is_live(),
        action_id: manager.action_id(),
        lookup_id: manager.lookup_id(),
        action: manager.action(),
        place: manager.place(),
        geofence: snapshot.state,
        request: snapshot.request,
        registered_geofences: registry.len(),
    };

    if json {
        return print_json(&status);
    }

    let destination = status.place.as_ref().and_then(|p| p.location).map(|c| {
        format!("{}, {}", c.latitude, c.longitude)
    });
    print_fields(&[
        ("phase", status.phase.to_string()),
        ("action", or_dash(status.action_id)),
        ("lookup id", or_dash(status.lookup_id)),
        ("destination", or_dash(destination)),
        ("geofence", label(&status.geofence)),
        ("registered", status.registered_geofences.to_string()),
    ]);
    Ok(())
}
