use crate::app::App;
use crate::cmd::report_arm;
use crate::output::{or_dash, print_fields, print_json};
use anyhow::Context;
use arrival_core::{Coordinate, Place};
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum PlaceSubcommand {
    /// Replace the destination. A started trip is re-armed around it.
    Set {
        /// Latitude in degrees
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// Longitude in degrees
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        address: Option<String>,
        /// Provider place id
        #[arg(long)]
        id: Option<String>,
    },

    /// Show the destination
    Show,
}

pub async fn run(root: &Path, subcmd: PlaceSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PlaceSubcommand::Set {
            lat,
            lon,
            name,
            address,
            id,
        } => {
            let location = lat.zip(lon).map(|(lat, lon)| Coordinate::new(lat, lon));
            let place = Place {
                id,
                name,
                address,
                location,
            };
            set(root, place, json).await
        }
        PlaceSubcommand::Show => show(root, json),
    }
}

async fn set(root: &Path, place: Place, json: bool) -> anyhow::Result<()> {
    let app = App::open(root)?;
    let watch = app.watch();
    app.manager
        .set_place(place)
        .context("failed to save destination")?;

    if !json {
        println!("Destination set.");
    }
    let outcome = app.await_arm(watch).await?;
    report_arm(outcome, json)
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let app = App::open(root)?;
    let place = app.manager.place();

    if json {
        return print_json(&place);
    }
    match place {
        None => println!("No destination."),
        Some(place) => {
            let location = place
                .location
                .map(|c| format!("{}, {}", c.latitude, c.longitude));
            print_fields(&[
                ("id", or_dash(place.id)),
                ("name", or_dash(place.name)),
                ("address", or_dash(place.address)),
                ("location", or_dash(location)),
            ]);
        }
    }
    Ok(())
}
