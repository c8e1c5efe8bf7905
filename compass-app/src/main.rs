//! compass-app — bootstrap a session and poll nearby map objects.
//!
//! Fill in the constants below and run:
//!   cargo run -p compass-app

use std::time::Duration;

use compass_client::{Client, Config};
use compass_wire::GeoPosition;

// ── Fill in your credentials ──────────────────────────────────────────────────
const USERNAME:  &str = "";
const PASSWORD:  &str = "";
const LATITUDE:  f64  = 48.2082;   // Vienna
const LONGITUDE: f64  = 16.3738;
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Enable logging: RUST_LOG=compass_client=info cargo run -p compass-app
    if std::env::var("RUST_LOG").is_err() {
        // SAFETY: single-threaded at this point, no other threads reading env
        unsafe { std::env::set_var("RUST_LOG", "compass_client=info,compass_app=info"); }
    }
    env_logger::init();

    if let Err(e) = run().await {
        eprintln!("\n✗ {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if USERNAME.is_empty() {
        eprintln!("Edit USERNAME and PASSWORD at the top of compass-app/src/main.rs");
        std::process::exit(1);
    }

    let client = Client::new(Config::default())?;
    client.login(USERNAME, PASSWORD).await?;
    client.set_position(GeoPosition {
        latitude:  LATITUDE,
        longitude: LONGITUDE,
        accuracy:  10.0,
        altitude:  170.0,
    })
    .await;

    let messages = client.init().await?;
    println!("Session established ({} bootstrap responses)", messages.len());
    println!("RPC endpoint: {}", client.endpoint().await);

    let cells = nearby_cells(LATITUDE, LONGITUDE);
    loop {
        let map = client.get_map_objects(&cells, LATITUDE, LONGITUDE).await?;
        let beacons: usize = map.cells.iter().map(|c| c.beacons.len()).sum();
        let spawns:  usize = map.cells.iter().map(|c| c.spawn_points.len()).sum();
        println!("{} cells, {beacons} beacons, {spawns} spawn points", map.cells.len());

        tokio::time::sleep(client.min_call_delay().await.max(Duration::from_secs(5))).await;
    }
}

/// Crude 3×3 grid of cell IDs around the player. A real deployment derives
/// these from a proper geospatial cell library.
fn nearby_cells(latitude: f64, longitude: f64) -> Vec<u64> {
    let base_lat = (latitude * 1e4) as i64;
    let base_lng = (longitude * 1e4) as i64;
    let mut cells = Vec::with_capacity(9);
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            let lat = (base_lat + dy * 16) as u64;
            let lng = (base_lng + dx * 16) as u64;
            cells.push((lat << 32) | (lng & 0xffff_ffff));
        }
    }
    cells
}
