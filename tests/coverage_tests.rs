//! Coverage planner tests

use farm_sim::simulation::{
    distance_to_polygon, get_polygon_rect, plan_coverage, CoverageOptions, Destination, Job, PaddockConfig,
    PaddockId, PlanningContext, Position, SimConfig, SimId, SimWorld, ToolType, VehicleId,
};
use proptest::prelude::*;

fn rect(x: f32, y: f32, w: f32, h: f32) -> Vec<Position> {
    vec![
        Position::new(x, y),
        Position::new(x + w, y),
        Position::new(x + w, y + h),
        Position::new(x, y + h),
    ]
}

fn options(width: f32) -> CoverageOptions {
    CoverageOptions {
        working_width: width,
        headland_laps: 2,
        skip_rows: false,
        collision_from_innermost_lap: false,
    }
}

#[test]
fn test_rectangle_scenario_laps_and_run_lines() {
    let field = rect(0.0, 0.0, 200.0, 100.0);
    let gate = Position::new(0.0, 50.0);
    let plan = plan_coverage(&field, gate, &options(20.0));

    assert_eq!(plan.laps.len(), 2);
    for p in &plan.laps[0] {
        assert!((distance_to_polygon(p, &field) - 10.0).abs() <= 1.0);
    }
    for p in &plan.laps[1] {
        assert!((distance_to_polygon(p, &field) - 30.0).abs() <= 1.0);
    }

    // Lap 1 starts at the vertex nearest the gate
    assert_eq!(plan.lap_1().first(), Some(&Position::new(10.0, 50.0)));

    // floor((100 - 40) / 20) run-lines, along the 200px axis
    assert_eq!(plan.run_lines.len(), 3);
    let mut rows: Vec<f32> = Vec::new();
    for line in &plan.run_lines {
        let y = line[0].y;
        assert!(line.iter().all(|p| p.y == y), "run-line is not east-west");
        let span = line.last().map_or(0.0, |p| p.x) - line[0].x;
        assert!(span > 150.0, "run-line only {}px long", span);
        rows.push(y);
    }
    assert_eq!(rows, vec![30.0, 50.0, 70.0]);
}

#[test]
fn test_path_ends_at_gate_and_serpentines() {
    let field = rect(0.0, 0.0, 200.0, 100.0);
    let gate = Position::new(0.0, 50.0);
    let plan = plan_coverage(&field, gate, &options(20.0));

    assert_eq!(plan.waypoints.last(), Some(&gate));
    assert_eq!(plan.waypoints.first(), plan.lap_1().first());

    // Every run-line appears in the stitched path, alternating direction
    for (i, line) in plan.run_lines.iter().enumerate() {
        let (first, last) = (line[0], line[line.len() - 1]);
        let entry = if i % 2 == 0 { first } else { last };
        let exit = if i % 2 == 0 { last } else { first };
        let entry_at = plan.waypoints.iter().position(|p| *p == entry).expect("entry in path");
        let exit_at = plan.waypoints.iter().position(|p| *p == exit).expect("exit in path");
        assert!(entry_at < exit_at);
    }
}

#[test]
fn test_run_lines_sampled_every_ten_pixels() {
    let plan = plan_coverage(&rect(0.0, 0.0, 200.0, 100.0), Position::new(0.0, 50.0), &options(20.0));
    for line in &plan.run_lines {
        for pair in line.windows(2) {
            assert!(pair[0].distance(&pair[1]) <= 10.0 + 1e-3);
        }
    }
}

#[test]
fn test_skip_rows_visit_order() {
    let field = rect(0.0, 0.0, 300.0, 200.0);
    let gate = Position::new(150.0, 0.0);
    let straight = plan_coverage(&field, gate, &options(20.0));
    let skipped = plan_coverage(
        &field,
        gate,
        &CoverageOptions {
            skip_rows: true,
            ..options(20.0)
        },
    );

    let n = straight.run_lines.len();
    assert!(n >= 4);
    assert_eq!(skipped.run_lines.len(), n);

    // Even rows forward, then odd rows backwards
    let mut expected: Vec<usize> = (0..n).step_by(2).collect();
    expected.extend((1..n).step_by(2).rev());
    for (visit, row) in expected.into_iter().enumerate() {
        assert_eq!(skipped.run_lines[visit], straight.run_lines[row]);
    }
}

#[test]
fn test_tall_field_scans_north_south() {
    let plan = plan_coverage(&rect(0.0, 0.0, 100.0, 240.0), Position::new(50.0, 240.0), &options(20.0));
    assert_eq!(plan.run_lines.len(), 3);
    for line in &plan.run_lines {
        let x = line[0].x;
        assert!(line.iter().all(|p| p.x == x));
    }
}

#[test]
fn test_concave_field_stays_out_of_notch() {
    // Paddock with a deep notch; links between run-lines either side of it
    // follow lap 1 around the notch
    let field = vec![
        Position::new(0.0, 0.0),
        Position::new(120.0, 0.0),
        Position::new(120.0, 200.0),
        Position::new(180.0, 200.0),
        Position::new(180.0, 0.0),
        Position::new(300.0, 0.0),
        Position::new(300.0, 320.0),
        Position::new(0.0, 320.0),
    ];
    let plan = plan_coverage(&field, Position::new(150.0, 320.0), &options(20.0));
    assert!(!plan.run_lines.is_empty());
    assert_eq!(plan.waypoints.last(), Some(&Position::new(150.0, 320.0)));

    // No waypoint lands inside the notch
    for p in &plan.waypoints {
        let in_notch = p.x > 121.0 && p.x < 179.0 && p.y < 199.0;
        assert!(!in_notch, "{:?} is inside the notch", p);
    }
}

#[test]
fn test_innermost_lap_collision_option() {
    let field = rect(0.0, 0.0, 200.0, 140.0);
    let plan = plan_coverage(
        &field,
        Position::new(0.0, 70.0),
        &CoverageOptions {
            collision_from_innermost_lap: true,
            ..options(20.0)
        },
    );
    // Innermost lap sits 30px in, the collision region another 10px
    let bounds = get_polygon_rect(&plan.collision_polygon);
    assert_eq!((bounds.x, bounds.y), (40, 40));
    assert_eq!((bounds.right(), bounds.bottom()), (160, 100));
}

#[test]
fn test_small_field_degrades_without_panicking() {
    // Room for lap 1 only
    let plan = plan_coverage(&rect(0.0, 0.0, 50.0, 30.0), Position::new(0.0, 15.0), &options(20.0));
    assert_eq!(plan.laps.len(), 1);
    assert!(plan.run_lines.is_empty());
    assert_eq!(plan.waypoints.last(), Some(&Position::new(0.0, 15.0)));

    // No room at all
    let plan = plan_coverage(&rect(0.0, 0.0, 10.0, 10.0), Position::new(0.0, 5.0), &options(20.0));
    assert!(plan.laps.is_empty());
    assert!(plan.waypoints.is_empty());

    let plan = plan_coverage(&rect(0.0, 0.0, 100.0, 100.0), Position::new(0.0, 5.0), &options(0.0));
    assert!(plan.waypoints.is_empty());
}

#[test]
fn test_plan_is_deterministic() {
    let field = rect(10.0, 20.0, 230.0, 170.0);
    let gate = Position::new(10.0, 100.0);
    let opts = CoverageOptions {
        skip_rows: true,
        ..options(18.0)
    };
    assert_eq!(plan_coverage(&field, gate, &opts), plan_coverage(&field, gate, &opts));
}

#[test]
fn test_job_working_leg_keeps_lap_one() {
    let mut world = SimWorld::new(SimConfig::default());
    world.add_paddock(&PaddockConfig {
        number: 4,
        boundary: rect(0.0, 0.0, 200.0, 100.0),
        gate: Position::new(0.0, 50.0),
        hectares: 2.0,
        state: None,
        lime_years: 0,
        super_spread: false,
        urea_spread: false,
        weeds: 0,
        crop: None,
    });
    let ctx = PlanningContext {
        paddocks: &world.paddocks,
        sell_points: &world.sell_points,
        roads: &world.road_network,
        shed: world.shed.position,
        config: &world.config,
    };
    let here = Destination::Paddock(PaddockId(4));
    let vehicle = VehicleId(SimId(0));

    let mut job = Job::new(here, here, vehicle, None, Some(ToolType::Cultivator), 20.0);
    let path = job.generate_path(&ctx);
    assert!(!path.is_empty());
    assert_eq!(job.lap_1().first(), Some(&Position::new(10.0, 50.0)));

    // Trailers have nothing to work
    let mut job = Job::new(here, here, vehicle, None, Some(ToolType::Trailer), 20.0);
    assert!(job.generate_path(&ctx).is_empty());

    // Unknown paddock: empty path, treated as already there
    let missing = Destination::Paddock(PaddockId(99));
    let mut job = Job::new(missing, missing, vehicle, None, Some(ToolType::Cultivator), 20.0);
    assert!(job.generate_path(&ctx).is_empty());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_run_line_count_matches_width(
        long in 150u16..320,
        short in 80u16..200,
        width in 10u16..30,
    ) {
        let (long, short, width) = (long as f32, short as f32, width as f32);
        prop_assume!(short - 2.0 * width >= width);
        let plan = plan_coverage(&rect(0.0, 0.0, long, short), Position::new(0.0, short / 2.0), &options(width));

        let margin = 2.0 * width;
        let expected = ((long.min(short) - margin) / width).floor() as i64;
        let actual = plan.run_lines.len() as i64;
        prop_assert!((actual - expected).abs() <= 1, "expected ~{} run-lines, got {}", expected, actual);
    }
}
