use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;

use farm_sim::simulation::{
    demo_configs, Destination, EquipmentConfig, MapConfig, PaddockId, PaddockState, SimConfig, SimEvent, SimWorld,
    ToolType, VehicleId,
};

#[derive(Parser)]
#[command(name = "farm_sim")]
#[command(about = "Headless farm simulation: coverage planning, hitch kinematics and harvest logistics")]
struct Cli {
    /// Number of simulation ticks to run
    #[arg(long, default_value = "3000")]
    ticks: u32,

    /// Time delta per tick in seconds
    #[arg(long, default_value = "0.1")]
    delta: f32,

    /// Map JSON (paddocks, roads, sell points); the demo farm when omitted
    #[arg(long, requires = "equipment")]
    map: Option<PathBuf>,

    /// Equipment JSON (vehicles and implements)
    #[arg(long, requires = "map")]
    equipment: Option<PathBuf>,

    /// Simulation tuning JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for reproducible paddock states
    #[arg(long)]
    seed: Option<u64>,

    /// Print the ASCII map with each summary
    #[arg(long)]
    draw: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut world = build_world(&cli)?;
    dispatch_demo_tasks(&mut world);
    run_headless(&mut world, &cli);
    Ok(())
}

fn build_world(cli: &Cli) -> Result<SimWorld> {
    let config = match &cli.config {
        Some(path) => SimConfig::load(path).with_context(|| format!("Loading {}", path.display()))?,
        None => SimConfig::default(),
    };
    match (&cli.map, &cli.equipment) {
        (Some(map), Some(equipment)) => {
            let map = MapConfig::load(map).with_context(|| format!("Loading {}", map.display()))?;
            let equipment =
                EquipmentConfig::load(equipment).with_context(|| format!("Loading {}", equipment.display()))?;
            SimWorld::from_configs(config, &map, &equipment, cli.seed)
        }
        _ => {
            let (map, equipment) = demo_configs();
            SimWorld::from_configs(config, &map, &equipment, cli.seed)
        }
    }
}

/// Send every harvester to the first ready paddock and every tractor with a
/// working tool to the first paddock that tool can work. Trailers stay home
/// until a harvester asks for one.
fn dispatch_demo_tasks(world: &mut SimWorld) {
    let vehicles: Vec<(VehicleId, bool)> = world
        .shed
        .vehicles
        .values()
        .map(|v| (v.id, v.is_harvester()))
        .collect();
    let mut free_implements: Vec<_> = world
        .shed
        .implements
        .values()
        .filter(|i| i.attached_to.is_none() && i.tool_type() != ToolType::Trailer)
        .map(|i| (i.id, i.tool_type()))
        .collect();
    let trailers: Vec<_> = world
        .shed
        .implements
        .values()
        .filter(|i| i.tool_type() == ToolType::Trailer)
        .map(|i| i.id)
        .collect();
    let mut trailers = trailers.into_iter();

    let mut taken: Vec<PaddockId> = Vec::new();
    for (vehicle, is_harvester) in vehicles {
        let wanted = |world: &SimWorld, tool: Option<ToolType>| -> Option<PaddockId> {
            world
                .paddocks
                .values()
                .filter(|p| !taken.contains(&p.id))
                .find(|p| match tool {
                    None => p.state == PaddockState::ReadyToHarvest,
                    Some(ToolType::Cultivator) => p.state == PaddockState::Harvested,
                    Some(_) => false,
                })
                .map(|p| p.id)
        };

        if is_harvester {
            if let Some(paddock) = wanted(world, None) {
                match world.assign_task(vehicle, None, Destination::Paddock(paddock), None) {
                    Ok(()) => taken.push(paddock),
                    Err(e) => warn!("Could not dispatch harvester: {}", e),
                }
            }
            continue;
        }

        let Some(index) = free_implements
            .iter()
            .position(|(_, tool)| wanted(world, Some(*tool)).is_some())
        else {
            // Tractors with nothing to work keep a trailer hitched for unloads
            if let Some(trailer) = trailers.next() {
                if let Err(e) = world.attach_implement(vehicle, trailer) {
                    warn!("Could not hitch trailer: {}", e);
                }
            }
            continue;
        };
        let (implement, tool) = free_implements.remove(index);
        if let Some(paddock) = wanted(world, Some(tool)) {
            match world.assign_task(vehicle, Some(implement), Destination::Paddock(paddock), None) {
                Ok(()) => taken.push(paddock),
                Err(e) => warn!("Could not dispatch tractor: {}", e),
            }
        }
    }
}

/// Find an idle or still-inbound tractor with a trailer for a full harvester
fn handle_unload_request(world: &mut SimWorld, header: VehicleId) {
    let candidates: Vec<VehicleId> = world
        .shed
        .vehicles
        .values()
        .filter(|v| v.unload_target.is_none())
        .filter(|v| {
            v.implement
                .and_then(|id| world.implement(id))
                .is_some_and(|i| i.tool_type() == ToolType::Trailer)
        })
        .map(|v| v.id)
        .collect();

    for tractor in candidates {
        match world.assign_unloader(header, tractor) {
            Ok(()) => return,
            Err(e) => info!("Skipping unloader {:?}: {}", tractor, e),
        }
    }
    warn!("No trailer available for {:?}", header);
}

/// Run the simulation in headless mode (no graphics)
fn run_headless(world: &mut SimWorld, cli: &Cli) {
    println!("Running farm simulation in headless mode...");
    println!("Ticks: {}, Delta: {}s", cli.ticks, cli.delta);

    // Calculate how many ticks equal 10 seconds of simulation time
    let ticks_per_report = (10.0 / cli.delta).ceil() as u32;
    println!();

    println!("Initial state:");
    world.print_summary();
    if cli.draw {
        world.draw_map();
    }
    println!();

    let mut tick = 0;
    while tick < cli.ticks {
        let ticks_to_run = ticks_per_report.min(cli.ticks - tick);
        for _ in 0..ticks_to_run {
            tick += 1;
            world.tick(cli.delta);
            for event in world.drain_events() {
                if let SimEvent::UnloadRequested { header, .. } = event {
                    handle_unload_request(world, header);
                }
            }
        }

        println!("--- After tick {} ({:.1}s simulated time) ---", tick, tick as f32 * cli.delta);
        world.print_summary();
        if cli.draw {
            world.draw_map();
        }
        println!();
    }

    println!("=== Final State ===");
    world.print_summary();
    world.draw_map();
}
