//! Task lifecycle tests
//!
//! Dispatch a vehicle through the world and watch it walk its stages.

use farm_sim::simulation::{
    Destination, FillType, ImplementConfig, ImplementId, PaddockConfig, PaddockId, PaddockState, Position,
    SellPointConfig, SimConfig, SimError, SimId, SimEvent, SimWorld, Stage, TaskKind, ToolType, TrailerPhase, VehicleConfig,
    VehicleId,
};

const STEP: f32 = 1.0 / 60.0;

fn rect(x: f32, y: f32, w: f32, h: f32) -> Vec<Position> {
    vec![
        Position::new(x, y),
        Position::new(x + w, y),
        Position::new(x + w, y + h),
        Position::new(x, y + h),
    ]
}

fn paddock(state: PaddockState) -> PaddockConfig {
    PaddockConfig {
        number: 1,
        boundary: rect(60.0, 0.0, 100.0, 60.0),
        gate: Position::new(60.0, 30.0),
        hectares: 6.0,
        state: Some(state),
        lime_years: 0,
        super_spread: false,
        urea_spread: false,
        weeds: 0,
        crop: None,
    }
}

fn tractor_config() -> VehicleConfig {
    VehicleConfig::Tractor {
        brand: "Fendt".to_string(),
        model: "724".to_string(),
        max_fuel: 400.0,
        hitch: Position::new(-8.0, 0.0),
    }
}

fn implement_config(tool_type: ToolType, width: f32, capacity: f32) -> ImplementConfig {
    ImplementConfig {
        tool_type,
        brand: "Test".to_string(),
        model: format!("{:?}", tool_type),
        working_width: width,
        capacity,
        hitch_length: 6.0,
    }
}

/// Shed to the west of a single paddock, no roads
fn farm(state: PaddockState) -> SimWorld {
    let mut world = SimWorld::new(SimConfig::default());
    world.shed.position = Position::new(20.0, 30.0);
    world.add_paddock(&paddock(state));
    world
}

fn add_tractor(world: &mut SimWorld) -> VehicleId {
    let shed = world.shed.position;
    world.add_vehicle(tractor_config(), shed)
}

/// Tick until the vehicle goes idle, returning every stage it was seen in
fn run_to_idle(world: &mut SimWorld, vehicle: VehicleId, max_ticks: usize) -> Vec<Stage> {
    let mut stages = Vec::new();
    for _ in 0..max_ticks {
        let v = world.vehicle(vehicle).expect("vehicle");
        if !v.active {
            return stages;
        }
        if stages.last() != Some(&v.stage) {
            stages.push(v.stage);
        }
        world.tick(STEP);
    }
    panic!("vehicle still active after {} ticks, stages {:?}", max_ticks, stages);
}

#[test]
fn test_work_task_walks_its_stages() {
    let mut world = farm(PaddockState::Harvested);
    let tractor = add_tractor(&mut world);
    let cultivator = world.add_implement(implement_config(ToolType::Cultivator, 16.0, 0.0));

    world
        .assign_task(tractor, Some(cultivator), Destination::Paddock(PaddockId(1)), None)
        .expect("dispatch");
    let v = world.vehicle(tractor).expect("vehicle");
    assert_eq!(v.task, Some(TaskKind::Work));
    assert_eq!(v.stage, Stage::TravellingTo);
    assert_eq!(v.status, "Travelling to Paddock 1...");
    assert_eq!(v.waypoints.iter().copied().collect::<Vec<_>>(), vec![Position::new(60.0, 30.0)]);
    assert_eq!(world.paddock(PaddockId(1)).and_then(|p| p.assigned), Some(tractor));
    assert_eq!(world.implement(cultivator).and_then(|i| i.attached_to), Some(tractor));

    let stages = run_to_idle(&mut world, tractor, 20_000);
    assert_eq!(stages, vec![Stage::TravellingTo, Stage::Working, Stage::TravellingFrom]);
    assert!(stages.windows(2).all(|pair| pair[0] < pair[1]));

    let paddock = world.paddock(PaddockId(1)).expect("paddock");
    assert_eq!(paddock.state, PaddockState::Tilled);
    assert_eq!(paddock.assigned, None);
    assert_eq!(paddock.painted_pixels(), 0);

    let v = world.vehicle(tractor).expect("vehicle");
    assert_eq!(v.status, "Idle");
    assert_eq!(v.destination, None);
    assert!(v.position.distance(&world.shed.position) < 10.0);
    assert!(v.fuel < 400.0);
}

#[test]
fn test_working_paints_most_of_the_paddock() {
    let mut world = farm(PaddockState::Harvested);
    let tractor = add_tractor(&mut world);
    let cultivator = world.add_implement(implement_config(ToolType::Cultivator, 16.0, 0.0));
    world
        .assign_task(tractor, Some(cultivator), Destination::Paddock(PaddockId(1)), None)
        .expect("dispatch");

    let mut best = 0.0_f32;
    let mut saw_working = false;
    for _ in 0..20_000 {
        world.tick(STEP);
        let v = world.vehicle(tractor).expect("vehicle");
        if v.stage == Stage::Working {
            saw_working = true;
            assert!(world.implement(cultivator).is_some_and(|i| i.working));
            best = best.max(world.paddock(PaddockId(1)).map_or(0.0, |p| p.completion()));
        } else if saw_working {
            break;
        }
    }
    assert!(saw_working);
    assert!(best > 0.5, "only {:.0}% painted", best * 100.0);
    assert!(!world.implement(cultivator).is_some_and(|i| i.working));
}

#[test]
fn test_seeder_running_dry_abandons_the_paddock() {
    let mut world = farm(PaddockState::Tilled);
    let tractor = add_tractor(&mut world);
    let seeder = world.add_implement(implement_config(ToolType::Seeder, 14.0, 40.0));
    world.set_implement_fill(seeder, FillType::Wheat, 0.05).expect("fill");

    world
        .assign_task(tractor, Some(seeder), Destination::Paddock(PaddockId(1)), None)
        .expect("dispatch");

    let mut statuses = Vec::new();
    let mut stages = Vec::new();
    for _ in 0..20_000 {
        world.tick(STEP);
        for event in world.drain_events() {
            if let SimEvent::StatusChanged { vehicle, status } = event {
                if vehicle == tractor {
                    statuses.push(status);
                }
            }
        }
        let v = world.vehicle(tractor).expect("vehicle");
        if stages.last() != Some(&v.stage) {
            stages.push(v.stage);
        }
        if !v.active {
            break;
        }
    }

    assert!(statuses.iter().any(|s| s == "Out of Wheat"), "{:?}", statuses);
    assert_eq!(stages.last(), Some(&Stage::TravellingFrom));
    let paddock = world.paddock(PaddockId(1)).expect("paddock");
    assert_eq!(paddock.state, PaddockState::Tilled);
    assert_eq!(paddock.crop, None);
    let seeder = world.implement(seeder).expect("seeder");
    assert_eq!(seeder.fill, 0.0);
    assert_eq!(seeder.fill_type, None);
    assert!(!world.vehicle(tractor).expect("vehicle").active);
}

#[test]
fn test_invalid_dispatches_are_rejected() {
    let mut world = farm(PaddockState::Harvested);
    let tractor = add_tractor(&mut world);
    let shed = world.shed.position;
    let harvester = world.add_vehicle(
        VehicleConfig::Harvester {
            brand: "Claas".to_string(),
            model: "Lexion".to_string(),
            max_fuel: 600.0,
            working_width: 20.0,
            capacity: 12.0,
            header_offset: 10.0,
        },
        shed,
    );
    let cultivator = world.add_implement(implement_config(ToolType::Cultivator, 16.0, 0.0));
    let paddock = Destination::Paddock(PaddockId(1));

    assert_eq!(
        world.assign_task(tractor, None, paddock, None),
        Err(SimError::InvalidTask(tractor))
    );
    assert_eq!(
        world.assign_task(tractor, Some(cultivator), paddock, Some(Stage::TransportingTo)),
        Err(SimError::InvalidTask(tractor))
    );
    assert_eq!(
        world.assign_task(tractor, Some(cultivator), Destination::Paddock(PaddockId(9)), None),
        Err(SimError::PaddockNotFound(PaddockId(9)))
    );
    assert_eq!(
        world.assign_task(harvester, Some(cultivator), paddock, None),
        Err(SimError::CannotTow(harvester))
    );
    assert_eq!(
        world.assign_task(VehicleId(SimId(99)), None, paddock, None),
        Err(SimError::VehicleNotFound(VehicleId(SimId(99))))
    );
    assert!(!world.vehicle(tractor).expect("vehicle").active);
}

#[test]
fn test_resume_at_working_stage() {
    let mut world = farm(PaddockState::Harvested);
    let tractor = add_tractor(&mut world);
    let cultivator = world.add_implement(implement_config(ToolType::Cultivator, 16.0, 0.0));
    world
        .assign_task(tractor, Some(cultivator), Destination::Paddock(PaddockId(1)), Some(Stage::Working))
        .expect("dispatch");

    let v = world.vehicle(tractor).expect("vehicle");
    assert_eq!(v.stage, Stage::Working);
    assert_eq!(v.status, "Cultivating...");
    assert_eq!(v.waypoints.back(), Some(&Position::new(60.0, 30.0)));
    assert!(v.waypoints.len() > 4);
}

#[test]
fn test_shared_paddock_goes_to_latest_vehicle() {
    let mut world = farm(PaddockState::Harvested);
    let first = add_tractor(&mut world);
    let second = add_tractor(&mut world);
    let a = world.add_implement(implement_config(ToolType::Cultivator, 16.0, 0.0));
    let b = world.add_implement(implement_config(ToolType::Cultivator, 16.0, 0.0));
    let paddock = Destination::Paddock(PaddockId(1));

    world.assign_task(first, Some(a), paddock, None).expect("first");
    world.assign_task(second, Some(b), paddock, None).expect("second");
    assert_eq!(world.paddock(PaddockId(1)).and_then(|p| p.assigned), Some(second));
    assert!(world.vehicle(first).expect("first").active);
}

#[test]
fn test_reassigning_swaps_the_implement() {
    let mut world = farm(PaddockState::Harvested);
    let tractor = add_tractor(&mut world);
    let cultivator = world.add_implement(implement_config(ToolType::Cultivator, 16.0, 0.0));
    let seeder = world.add_implement(implement_config(ToolType::Seeder, 14.0, 40.0));
    let paddock = Destination::Paddock(PaddockId(1));

    world.assign_task(tractor, Some(cultivator), paddock, None).expect("cultivate");
    world.assign_task(tractor, Some(seeder), paddock, None).expect("seed");

    assert_eq!(world.vehicle(tractor).and_then(|v| v.implement), Some(seeder));
    assert_eq!(world.implement(cultivator).and_then(|i| i.attached_to), None);

    // Sending it home without an implement is a plain return trip
    world.assign_task(tractor, None, Destination::Shed, None).expect("home");
    let v = world.vehicle(tractor).expect("vehicle");
    assert_eq!(v.stage, Stage::TravellingFrom);
    assert_eq!(v.implement, None);
    assert_eq!(world.paddock(PaddockId(1)).and_then(|p| p.assigned), None);
}

fn delivery_farm(with_silo: bool) -> (SimWorld, VehicleId, ImplementId) {
    let mut world = farm(PaddockState::ReadyToHarvest);
    if with_silo {
        world.add_sell_point(&SellPointConfig {
            name: "Silo".to_string(),
            position: Position::new(20.0, 90.0),
            silo: true,
        });
    }
    let tractor = add_tractor(&mut world);
    let trailer = world.add_implement(ImplementConfig {
        hitch_length: 8.0,
        ..implement_config(ToolType::Trailer, 0.0, 30.0)
    });
    world.set_implement_fill(trailer, FillType::Wheat, 10.0).expect("fill");
    (world, tractor, trailer)
}

#[test]
fn test_delivery_holds_twice_then_unloads_at_silo() {
    let (mut world, tractor, trailer) = delivery_farm(true);
    world
        .assign_task(tractor, Some(trailer), Destination::Paddock(PaddockId(1)), None)
        .expect("dispatch");
    assert_eq!(world.vehicle(tractor).and_then(|v| v.task), Some(TaskKind::Delivery));
    // Carting does not claim the paddock
    assert_eq!(world.paddock(PaddockId(1)).and_then(|p| p.assigned), None);

    let mut left_field_after = None;
    for _ in 0..5_000 {
        world.tick(STEP);
        let v = world.vehicle(tractor).expect("vehicle");
        if v.stage == Stage::TransportingFrom {
            left_field_after = Some(v.wait_cycles);
            assert_eq!(v.trailer_phase, TrailerPhase::ToSilo);
            break;
        }
    }
    assert_eq!(left_field_after, Some(2));

    let stages = run_to_idle(&mut world, tractor, 10_000);
    assert_eq!(stages, vec![Stage::TransportingFrom, Stage::TravellingFrom]);

    let silo = world.silo().expect("silo");
    assert!((silo.stored(FillType::Wheat) - 10.0).abs() < 1e-3);
    let trailer = world.implement(trailer).expect("trailer");
    assert_eq!(trailer.fill, 0.0);
    assert_eq!(trailer.fill_type, None);
}

#[test]
fn test_delivery_without_silo_waits_at_gate() {
    let (mut world, tractor, trailer) = delivery_farm(false);
    world
        .assign_task(tractor, Some(trailer), Destination::Paddock(PaddockId(1)), None)
        .expect("dispatch");

    for _ in 0..600 {
        world.tick(STEP);
    }
    let v = world.vehicle(tractor).expect("vehicle");
    assert!(v.active);
    assert_eq!(v.stage, Stage::TransportingTo);
    assert_eq!(v.trailer_phase, TrailerPhase::AtGate { has_waited: true });
    assert_eq!(v.status, "Waiting for silo...");
    assert_eq!(world.implement(trailer).map(|t| t.fill), Some(10.0));
}

#[test]
fn test_delivery_straight_to_a_sell_point() {
    let (mut world, tractor, trailer) = delivery_farm(true);
    let buyer = world.add_sell_point(&SellPointConfig {
        name: "Grain Co-op".to_string(),
        position: Position::new(200.0, 120.0),
        silo: false,
    });

    world
        .assign_task(tractor, Some(trailer), Destination::SellPoint(buyer), None)
        .expect("dispatch");
    let v = world.vehicle(tractor).expect("vehicle");
    assert_eq!(v.stage, Stage::TransportingFrom);
    assert_eq!(v.status, "Transporting to Grain Co-op...");

    run_to_idle(&mut world, tractor, 10_000);
    let buyer = world.sell_points.get(&buyer).expect("buyer");
    assert!((buyer.stored(FillType::Wheat) - 10.0).abs() < 1e-3);
    assert_eq!(world.silo().map(|s| s.total_stored()), Some(0.0));
}
