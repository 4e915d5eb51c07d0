//! Harvester to trailer unload handshake

use farm_sim::simulation::{
    headland_lap, tick_interval, transfer, Destination, FillType, HeaderUnload, ImplementConfig, ImplementId, PaddockConfig, PaddockId,
    PaddockState, Position, SellPointConfig, SimConfig, SimError, SimEvent, SimWorld, Stage, TaskKind, ToolType,
    TrailerPhase, VehicleConfig, VehicleId,
};

const STEP: f32 = 1.0 / 60.0;

struct Harvest {
    world: SimWorld,
    harvester: VehicleId,
    tractor: VehicleId,
    trailer: ImplementId,
}

/// A ready wheat paddock, a silo, a harvester with a tiny tank and an idle
/// tractor with an empty trailer
fn harvest() -> Harvest {
    harvest_with_trailer(30.0)
}

fn harvest_with_trailer(trailer_capacity: f32) -> Harvest {
    let mut world = SimWorld::new(SimConfig::default());
    world.shed.position = Position::new(20.0, 50.0);
    world.add_paddock(&PaddockConfig {
        number: 2,
        boundary: vec![
            Position::new(60.0, 0.0),
            Position::new(260.0, 0.0),
            Position::new(260.0, 100.0),
            Position::new(60.0, 100.0),
        ],
        gate: Position::new(60.0, 50.0),
        hectares: 20.0,
        state: Some(PaddockState::ReadyToHarvest),
        lime_years: 0,
        super_spread: false,
        urea_spread: false,
        weeds: 0,
        crop: Some(FillType::Wheat),
    });
    world.add_sell_point(&SellPointConfig {
        name: "Silo".to_string(),
        position: Position::new(20.0, 120.0),
        silo: true,
    });

    let shed = world.shed.position;
    let harvester = world.add_vehicle(
        VehicleConfig::Harvester {
            brand: "Claas".to_string(),
            model: "Lexion".to_string(),
            max_fuel: 600.0,
            working_width: 20.0,
            capacity: 0.5,
            header_offset: 10.0,
        },
        shed,
    );
    let tractor = world.add_vehicle(
        VehicleConfig::Tractor {
            brand: "Fendt".to_string(),
            model: "724".to_string(),
            max_fuel: 400.0,
            hitch: Position::new(-8.0, 0.0),
        },
        shed,
    );
    let trailer = world.add_implement(ImplementConfig {
        tool_type: ToolType::Trailer,
        brand: "Bergmann".to_string(),
        model: "GTW".to_string(),
        working_width: 0.0,
        capacity: trailer_capacity,
        hitch_length: 8.0,
    });
    world.attach_implement(tractor, trailer).expect("hitch trailer");

    Harvest {
        world,
        harvester,
        tractor,
        trailer,
    }
}

/// Tick until the harvester asks for a trailer
fn fill_tank(h: &mut Harvest) {
    h.world
        .assign_task(h.harvester, None, Destination::Paddock(PaddockId(2)), None)
        .expect("dispatch harvester");
    for _ in 0..10_000 {
        h.world.tick(STEP);
        let requested = h.world.drain_events().into_iter().any(|e| {
            matches!(e, SimEvent::UnloadRequested { header, paddock }
                if header == h.harvester && paddock == Some(PaddockId(2)))
        });
        if requested {
            return;
        }
    }
    panic!("harvester never filled up");
}

#[test]
fn test_full_harvester_stalls_and_asks_for_a_trailer() {
    let mut h = harvest();
    fill_tank(&mut h);

    let header = h.world.vehicle(h.harvester).expect("harvester");
    assert_eq!(header.header_unload, HeaderUnload::WaitingForAssignment);
    assert_eq!(header.status, "Waiting for trailer...");
    assert_eq!(header.stage, Stage::Working);
    assert_eq!(header.fill_type, Some(FillType::Wheat));
    assert!(header.fill > 0.45 && header.fill <= 0.5);

    let parked = header.position;
    let waypoints = header.waypoints.len();
    for _ in 0..120 {
        h.world.tick(STEP);
    }
    let header = h.world.vehicle(h.harvester).expect("harvester");
    assert_eq!(header.position, parked);
    assert_eq!(header.waypoints.len(), waypoints);
    assert_eq!(h.world.paddock(PaddockId(2)).map(|p| p.state), Some(PaddockState::ReadyToHarvest));
}

#[test]
fn test_unload_moves_the_whole_tank() {
    let mut h = harvest();
    fill_tank(&mut h);

    h.world.assign_unloader(h.harvester, h.tractor).expect("assign unloader");
    let tractor = h.world.vehicle(h.tractor).expect("tractor");
    assert_eq!(tractor.task, Some(TaskKind::Delivery));
    assert_eq!(tractor.stage, Stage::TransportingTo);
    assert_eq!(tractor.unload_target, Some(h.harvester));
    assert_eq!(tractor.docking_path.last(), Some(&h.world.vehicle(h.harvester).expect("harvester").position));
    assert!(matches!(
        h.world.vehicle(h.harvester).map(|v| v.header_unload),
        Some(HeaderUnload::WaitingForArrival { unloader }) if unloader == h.tractor
    ));

    // A second request for the same harvester is refused
    assert_eq!(
        h.world.assign_unloader(h.harvester, h.tractor),
        Err(SimError::UnloaderAlreadyAssigned(h.harvester))
    );

    let mut total = None;
    let mut released = false;
    for _ in 0..10_000 {
        h.world.tick(STEP);
        h.world.drain_events();
        let header = h.world.vehicle(h.harvester).expect("harvester");
        let trailer = h.world.implement(h.trailer).expect("trailer");
        match header.header_unload {
            HeaderUnload::Unloading { .. } => {
                let sum = header.fill + trailer.fill;
                let first = *total.get_or_insert(sum);
                assert!((sum - first).abs() < 1e-4, "fill not conserved: {} vs {}", sum, first);
                let tractor = h.world.vehicle(h.tractor).expect("tractor");
                assert!(matches!(tractor.trailer_phase, TrailerPhase::AtField { .. }));
            }
            HeaderUnload::Normal if total.is_some() => {
                released = true;
                let first = total.unwrap_or_default();
                assert_eq!(header.fill, 0.0);
                assert_eq!(header.fill_type, None);
                assert!((trailer.fill - first).abs() < 1e-4);
                assert_eq!(trailer.fill_type, Some(FillType::Wheat));
                break;
            }
            _ => {}
        }
    }
    assert!(released, "harvester was never unloaded");
    assert_eq!(h.world.vehicle(h.tractor).and_then(|t| t.unload_target), None);
}

#[test]
fn test_trailer_carts_the_load_to_the_silo() {
    let mut h = harvest();
    fill_tank(&mut h);
    h.world.assign_unloader(h.harvester, h.tractor).expect("assign unloader");

    let mut loaded = 0.0;
    let mut stages = Vec::new();
    for _ in 0..20_000 {
        h.world.tick(STEP);
        h.world.drain_events();
        let tractor = h.world.vehicle(h.tractor).expect("tractor");
        if !tractor.active {
            break;
        }
        if stages.last() != Some(&tractor.stage) {
            stages.push(tractor.stage);
        }
        loaded = h.world.implement(h.trailer).map_or(0.0, |t| t.fill).max(loaded);
    }

    assert_eq!(stages, vec![Stage::TransportingTo, Stage::TransportingFrom, Stage::TravellingFrom]);
    assert!(loaded > 0.45);
    let silo = h.world.silo().expect("silo");
    assert!((silo.stored(FillType::Wheat) - loaded).abs() < 1e-4);
    assert_eq!(h.world.implement(h.trailer).map(|t| t.fill), Some(0.0));

    // The harvester went back to work and has filled up again
    let header = h.world.vehicle(h.harvester).expect("harvester");
    assert_eq!(header.stage, Stage::Working);
    assert_eq!(header.header_unload, HeaderUnload::WaitingForAssignment);
}

#[test]
fn test_small_trailer_takes_what_fits() {
    let mut h = harvest_with_trailer(0.2);
    fill_tank(&mut h);
    h.world.assign_unloader(h.harvester, h.tractor).expect("assign unloader");

    let mut total = None;
    let mut released = false;
    for _ in 0..10_000 {
        h.world.tick(STEP);
        h.world.drain_events();
        let header = h.world.vehicle(h.harvester).expect("harvester");
        let trailer = h.world.implement(h.trailer).expect("trailer");
        let sum = header.fill + trailer.fill;
        match header.header_unload {
            HeaderUnload::Unloading { .. } => {
                let first = *total.get_or_insert(sum);
                assert!((sum - first).abs() < 1e-4, "fill not conserved: {} vs {}", sum, first);
                assert!(trailer.fill <= 0.2 + 1e-4);
            }
            HeaderUnload::Normal if total.is_some() => {
                released = true;
                let first = total.unwrap_or_default();
                assert!((sum - first).abs() < 1e-4);
                assert!(trailer.is_full());
                assert_eq!(trailer.fill_type, Some(FillType::Wheat));
                // The harvester keeps the rest and goes back to work
                assert!(header.fill > 0.2);
                assert_eq!(header.fill_type, Some(FillType::Wheat));
                break;
            }
            _ => {}
        }
    }
    assert!(released, "harvester was never released");
    assert_eq!(h.world.vehicle(h.tractor).and_then(|t| t.unload_target), None);

    for _ in 0..10 {
        h.world.tick(STEP);
    }
    let tractor = h.world.vehicle(h.tractor).expect("tractor");
    assert!(!matches!(tractor.trailer_phase, TrailerPhase::AtField { .. }));
}

#[test]
fn test_trailer_with_another_crop_is_refused() {
    let mut h = harvest();
    h.world
        .set_implement_fill(h.trailer, FillType::Barley, 10.0)
        .expect("preload barley");
    fill_tank(&mut h);

    assert_eq!(
        h.world.assign_unloader(h.harvester, h.tractor),
        Err(SimError::MixedLoad {
            trailer: h.trailer,
            loaded: FillType::Barley,
            incoming: FillType::Wheat,
        })
    );
    assert_eq!(h.world.vehicle(h.tractor).map(|t| t.active), Some(false));
    assert_eq!(
        h.world.vehicle(h.harvester).map(|v| v.header_unload),
        Some(HeaderUnload::WaitingForAssignment)
    );
}

#[test]
fn test_crop_changed_after_assignment_is_refused() {
    let mut h = harvest();
    fill_tank(&mut h);
    let tank = h.world.vehicle(h.harvester).map_or(0.0, |v| v.fill);
    h.world.assign_unloader(h.harvester, h.tractor).expect("assign unloader");
    h.world
        .set_implement_fill(h.trailer, FillType::Barley, 10.0)
        .expect("load barley on the way");
    h.world.drain_events();

    let mut handed_back = false;
    for _ in 0..10_000 {
        h.world.tick(STEP);
        handed_back = h
            .world
            .drain_events()
            .into_iter()
            .any(|e| matches!(e, SimEvent::UnloadRequested { header, .. } if header == h.harvester));
        if handed_back {
            break;
        }
    }
    assert!(handed_back, "harvester was never handed back");

    let trailer = h.world.implement(h.trailer).expect("trailer");
    assert_eq!((trailer.fill, trailer.fill_type), (10.0, Some(FillType::Barley)));
    let header = h.world.vehicle(h.harvester).expect("harvester");
    assert_eq!(header.fill, tank);
    assert_eq!(header.fill_type, Some(FillType::Wheat));
    assert_eq!(header.header_unload, HeaderUnload::WaitingForAssignment);
    assert_eq!(h.world.vehicle(h.tractor).and_then(|t| t.unload_target), None);
}

#[test]
fn test_restored_harvester_docks_along_the_headland() {
    let mut h = harvest();
    fill_tank(&mut h);
    let snapshot = h.world.snapshot();

    let mut restored = harvest();
    restored.world.restore(&snapshot).expect("restore");
    for _ in 0..600 {
        restored.world.tick(STEP);
        if restored.world.vehicle(restored.harvester).map(|v| v.header_unload)
            == Some(HeaderUnload::WaitingForAssignment)
        {
            break;
        }
    }
    let header = restored.world.vehicle(restored.harvester).expect("harvester");
    assert_eq!(header.header_unload, HeaderUnload::WaitingForAssignment);
    assert!(header.job.is_none());

    restored
        .world
        .assign_unloader(restored.harvester, restored.tractor)
        .expect("assign unloader");
    let paddock = restored.world.paddock(PaddockId(2)).expect("paddock");
    let lap_1 = headland_lap(&paddock.boundary, paddock.gate, 20.0);
    let docking = &restored.world.vehicle(restored.tractor).expect("tractor").docking_path;
    assert!(docking.len() >= 2, "docking path: {:?}", docking);
    assert!(docking[0].distance(&paddock.gate) <= 10.5);
    for point in &docking[..docking.len() - 1] {
        let on_lap = lap_1.iter().any(|p| p.distance(point) < 1.5);
        assert!(on_lap, "{:?} is off the headland", point);
    }
}

#[test]
fn test_assign_unloader_rejections() {
    let mut h = harvest();

    // Not full yet
    h.world
        .assign_task(h.harvester, None, Destination::Paddock(PaddockId(2)), None)
        .expect("dispatch harvester");
    assert_eq!(
        h.world.assign_unloader(h.harvester, h.tractor),
        Err(SimError::NotWaitingForUnload(h.harvester))
    );
    assert_eq!(
        h.world.assign_unloader(h.tractor, h.harvester),
        Err(SimError::NotAHarvester(h.tractor))
    );

    for _ in 0..10_000 {
        h.world.tick(STEP);
        if h.world.vehicle(h.harvester).map(|v| v.header_unload) == Some(HeaderUnload::WaitingForAssignment) {
            break;
        }
    }

    // No trailer
    h.world.detach_implement(h.tractor).expect("detach");
    assert_eq!(
        h.world.assign_unloader(h.harvester, h.tractor),
        Err(SimError::NoTrailer(h.tractor))
    );

    // Busy heading home
    h.world.assign_task(h.tractor, Some(h.trailer), Destination::Shed, None).expect("home");
    assert_eq!(h.world.vehicle(h.tractor).map(|t| t.stage), Some(Stage::TravellingFrom));
    assert_eq!(
        h.world.assign_unloader(h.harvester, h.tractor),
        Err(SimError::UnloaderUnavailable(h.tractor))
    );
}

#[test]
fn test_cancelled_unloader_hands_the_request_back() {
    let mut h = harvest();
    fill_tank(&mut h);
    h.world.assign_unloader(h.harvester, h.tractor).expect("assign unloader");

    // Send the tractor home before it docks
    h.world
        .assign_task(h.tractor, Some(h.trailer), Destination::Shed, None)
        .expect("recall");
    let events = h.world.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, SimEvent::UnloadRequested { header, .. } if *header == h.harvester)));
    assert_eq!(
        h.world.vehicle(h.harvester).map(|v| v.header_unload),
        Some(HeaderUnload::WaitingForAssignment)
    );
    assert_eq!(h.world.vehicle(h.tractor).and_then(|t| t.unload_target), None);
}

#[test]
fn test_transfer_conserves_and_caps() {
    let (mut source, mut target) = (5.0_f32, 1.0_f32);
    let moved = transfer(&mut source, &mut target, 3.0, 4.0);
    assert_eq!(moved, 2.0);
    assert_eq!((source, target), (3.0, 3.0));

    let moved = transfer(&mut source, &mut target, 3.0, 4.0);
    assert_eq!(moved, 0.0);

    let (mut source, mut target) = (0.5_f32, 0.0_f32);
    assert_eq!(transfer(&mut source, &mut target, 30.0, 2.0), 0.5);
    assert_eq!(source + target, 0.5);
}

#[test]
fn test_tick_interval_counts_elapsed_intervals() {
    let mut timer = 0.0;
    assert_eq!(tick_interval(&mut timer, 0.1, 0.25), 0);
    assert_eq!(tick_interval(&mut timer, 0.2, 0.25), 1);
    assert!((timer - 0.05).abs() < 1e-6);
    assert_eq!(tick_interval(&mut timer, 0.5, 0.25), 2);
}
