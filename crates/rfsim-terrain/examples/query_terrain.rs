//! Resolve terrain and building height at a point.
//!
//! Usage: cargo run --example query_terrain -- <config.json> <lon> <lat>
//!
//! The config is a [`TerrainModelConfig`] JSON document naming whichever
//! sources are available locally. Set RUST_LOG=debug to watch which files
//! and tiles each query touches.

use rfsim_terrain::{sample_path, TerrainModel, TerrainModelConfig};
use std::time::Instant;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <config.json> <lon> <lat>", args[0]);
        eprintln!("Example: {} terrain.json -122.3321 47.6062", args[0]);
        std::process::exit(1);
    }
    let config_text = std::fs::read_to_string(&args[1]).expect("Failed to read config file");
    let config: TerrainModelConfig =
        serde_json::from_str(&config_text).expect("Invalid terrain config");
    let lon: f64 = args[2].parse().expect("Invalid longitude");
    let lat: f64 = args[3].parse().expect("Invalid latitude");

    let start = Instant::now();
    let mut model = TerrainModel::from_config(&config).expect("Failed to build terrain model");
    println!("Model ready in {:.3} s", start.elapsed().as_secs_f64());

    let start = Instant::now();
    let sample = model.query(lon, lat).expect("Query failed");
    println!(
        "({lon}, {lat}): terrain {:.2} m, building {:.2} m, {:?} via {:?} in {:.6} s",
        sample.terrain_m,
        sample.building_m,
        sample.result,
        sample.source,
        start.elapsed().as_secs_f64()
    );

    // A nearby follow-up should be answered from cache.
    let start = Instant::now();
    let nearby = model.query(lon + 0.0005, lat + 0.0005).expect("Query failed");
    println!(
        "nearby: terrain {:.2} m via {:?} in {:.6} s",
        nearby.terrain_m,
        nearby.source,
        start.elapsed().as_secs_f64()
    );

    // A short profile eastward, the shape a propagation model consumes.
    let profile = sample_path(&mut model, (lon, lat), (lon + 0.02, lat), 30.0)
        .expect("Profile sampling failed");
    println!(
        "profile: {} points over {:.0} m",
        profile.points.len(),
        profile.length_m
    );

    println!(
        "stats: {}",
        serde_json::to_string_pretty(model.stats()).expect("Stats serialization failed")
    );
}
