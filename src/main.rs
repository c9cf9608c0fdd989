//! Entry point: loads a config and a scene, runs the simulation to its
//! horizon, and prints the metrics report (§6 "Metrics output").

mod channel;
mod config;
mod energy;
mod geometry;
mod mac;
mod metrics;
mod mobility;
mod node;
mod packet;
mod phy;
mod resources;
mod routing;
mod scene;
mod scheduler;
mod simulator;
mod time_driver;
mod world;

use anyhow::Context;
use config::Config;
use env_logger::Builder;
use log::{LevelFilter, info};
use scene::Scene;
use simulator::Simulator;
use std::path::PathBuf;

fn init_logging() {
    Builder::new().filter_level(LevelFilter::Info).filter(Some("fanet_mesh_simulator"), LevelFilter::Debug).init();
}

fn run() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("config.toml"));
    let scene_path = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("scene.json"));

    let config = Config::load(&config_path).with_context(|| format!("loading config from {}", config_path.display()))?;
    let scene = Scene::load(&scene_path).with_context(|| format!("loading scene from {}", scene_path.display()))?;

    info!("starting run: {} nodes, horizon {} us", config.number_of_drones, config.sim_time);
    let simulator = Simulator::new(config, &scene).with_context(|| "validating scene against config")?;
    let report = simulator.run();

    println!("{report}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_logging();
    run()
}
