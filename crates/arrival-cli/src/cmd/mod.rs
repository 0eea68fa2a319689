pub mod action;
pub mod clear;
pub mod complete;
pub mod config;
pub mod geofence;
pub mod place;
pub mod start;
pub mod status;
pub mod trigger;

use crate::app::ArmOutcome;
use crate::output::print_json;

/// Report an arm outcome. A failure is returned as an error.
pub(crate) fn report_arm(outcome: ArmOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(&outcome)?;
    } else {
        match &outcome {
            ArmOutcome::Unarmed => {}
            ArmOutcome::Armed => println!("Geofence armed."),
            ArmOutcome::Pending => println!("Geofence requested; provider has not answered yet."),
            ArmOutcome::Failed { .. } => {}
        }
    }
    if let ArmOutcome::Failed { message } = outcome {
        anyhow::bail!("geofence not armed: {message}");
    }
    Ok(())
}
