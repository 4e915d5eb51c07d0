//! Path planning for a single task leg
//!
//! A `Job` ties a start and end destination to a vehicle and its optional
//! implement and produces exactly one waypoint list. Legs inside a paddock
//! get a full coverage path; every other leg is a transport route.

use log::{debug, warn};
use std::collections::BTreeMap;

use super::config::SimConfig;
use super::destination::Destination;
use super::geometry::{
    closest_point_index, get_polygon_rect, line_collides_mask, shrink_polygon, simplify_path,
    trace_collision_boundary,
};
use super::mask::CoverageMask;
use super::paddock::Paddock;
use super::road_network::SimRoadNetwork;
use super::sellpoint::SellPoint;
use super::types::{ImplementId, PaddockId, Position, SellPointId, ToolType, VehicleId};

/// Run-line points are kept every this many pixels
const RUN_SAMPLE_SPACING: usize = 10;
/// Tolerance used when collapsing dense boundary arcs into corners
const SIMPLIFY_TOLERANCE: f32 = 1.0;

/// Everything the planners read from the world
pub struct PlanningContext<'a> {
    pub paddocks: &'a BTreeMap<PaddockId, Paddock>,
    pub sell_points: &'a BTreeMap<SellPointId, SellPoint>,
    pub roads: &'a SimRoadNetwork,
    pub shed: Position,
    pub config: &'a SimConfig,
}

/// Options for one coverage plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverageOptions {
    pub working_width: f32,
    pub headland_laps: usize,
    pub skip_rows: bool,
    pub collision_from_innermost_lap: bool,
}

impl CoverageOptions {
    pub fn from_config(working_width: f32, config: &SimConfig) -> Self {
        Self {
            working_width,
            headland_laps: config.headland_laps,
            skip_rows: config.skip_rows,
            collision_from_innermost_lap: config.collision_from_innermost_lap,
        }
    }
}

/// The pieces of a coverage path, kept so callers can inspect its structure
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoveragePlan {
    /// Headland laps, outermost first, each rotated to start near the
    /// previous lap's end (lap 1 near the gate). Dense, one point per pixel.
    pub laps: Vec<Vec<Position>>,
    /// Interior region the run-lines are clipped against
    pub collision_polygon: Vec<Position>,
    /// Run-lines in visit order, each in scan direction (not yet serpentined)
    pub run_lines: Vec<Vec<Position>>,
    /// The stitched waypoint list, ending at the gate
    pub waypoints: Vec<Position>,
}

impl CoveragePlan {
    pub fn lap_1(&self) -> &[Position] {
        self.laps.first().map_or(&[], Vec::as_slice)
    }
}

/// Rotate a closed polygon's point list to start at the vertex nearest `point`
fn start_nearest(mut polygon: Vec<Position>, point: &Position) -> Vec<Position> {
    if let Some(index) = closest_point_index(point, &polygon) {
        polygon.rotate_left(index);
    }
    polygon
}

fn sample_run(run: &[Position]) -> Vec<Position> {
    let mut sampled: Vec<Position> = run.iter().step_by(RUN_SAMPLE_SPACING).copied().collect();
    if let Some(last) = run.last() {
        if sampled.last() != Some(last) {
            sampled.push(*last);
        }
    }
    sampled
}

/// Cast evenly spaced scan lines through the collision polygon.
///
/// Scans run along the longer side of the polygon's bounding rect, the first
/// one `w/2` in from the edge. Each scan line becomes one run-line; concave
/// gaps within a line are bridged with a detour around lap 1.
fn scan_run_lines(collision_polygon: &[Position], lap_1: &[Position], working_width: f32) -> Vec<Vec<Position>> {
    let Some(mask) = CoverageMask::from_polygon(collision_polygon) else {
        return Vec::new();
    };
    let rect = get_polygon_rect(collision_polygon);
    let north = rect.h > rect.w;
    let (from, to) = if north {
        (rect.x as f32, rect.right() as f32)
    } else {
        (rect.y as f32, rect.bottom() as f32)
    };

    let mut run_lines = Vec::new();
    let mut offset = from + working_width / 2.0;
    while offset < to {
        let line = if north {
            (
                Position::new(offset, rect.y as f32),
                Position::new(offset, rect.bottom() as f32),
            )
        } else {
            (
                Position::new(rect.x as f32, offset),
                Position::new(rect.right() as f32, offset),
            )
        };

        let runs = line_collides_mask(line, &mask);
        let mut run_line = Vec::new();
        for (i, run) in runs.iter().enumerate() {
            run_line.extend(sample_run(run));
            if let (Some(end), Some(next_start)) = (run.last(), runs.get(i + 1).and_then(|r| r.first())) {
                run_line.extend(trace_collision_boundary(end, next_start, lap_1));
            }
        }
        if !run_line.is_empty() {
            run_lines.push(run_line);
        }
        offset += working_width;
    }
    run_lines
}

/// Every other run-line first, then the rest on the way back
fn skip_row_order(run_lines: Vec<Vec<Position>>) -> Vec<Vec<Position>> {
    let mut forward = Vec::new();
    let mut back = Vec::new();
    for (i, line) in run_lines.into_iter().enumerate() {
        if i % 2 == 0 {
            forward.push(line);
        } else {
            back.push(line);
        }
    }
    back.reverse();
    forward.extend(back);
    forward
}

/// The outermost headland lap, starting at the point nearest the gate
pub fn headland_lap(boundary: &[Position], gate: Position, working_width: f32) -> Vec<Position> {
    start_nearest(shrink_polygon(boundary, working_width / 2.0), &gate)
}

/// Full coverage path for a paddock: headland laps, run-lines, then back to
/// the gate. Degenerate fields give a shorter (possibly empty) plan.
pub fn plan_coverage(boundary: &[Position], gate: Position, options: &CoverageOptions) -> CoveragePlan {
    let w = options.working_width;
    let mut plan = CoveragePlan::default();
    if w <= 0.0 {
        warn!("Cannot plan coverage with working width {}", w);
        return plan;
    }

    let lap_1 = headland_lap(boundary, gate, w);
    if lap_1.is_empty() {
        warn!("Paddock too small for a {}px implement, no coverage path", w);
        return plan;
    }
    plan.laps.push(lap_1);

    for i in 1..options.headland_laps {
        let lap = shrink_polygon(boundary, w * i as f32 + w / 2.0);
        if lap.is_empty() {
            debug!("Only room for {} headland laps", plan.laps.len());
            break;
        }
        let previous_end = plan.laps.last().and_then(|l| l.last()).copied().unwrap_or(gate);
        plan.laps.push(start_nearest(lap, &previous_end));
    }

    plan.collision_polygon = if options.collision_from_innermost_lap {
        let innermost = plan.laps.last().map_or(&[][..], Vec::as_slice);
        shrink_polygon(innermost, w / 2.0)
    } else {
        shrink_polygon(boundary, w)
    };

    let lap_1 = plan.lap_1().to_vec();
    let run_lines = scan_run_lines(&plan.collision_polygon, &lap_1, w);
    plan.run_lines = if options.skip_rows {
        skip_row_order(run_lines)
    } else {
        run_lines
    };

    let mut waypoints: Vec<Position> = Vec::new();
    for lap in &plan.laps {
        waypoints.extend(simplify_path(lap, SIMPLIFY_TOLERANCE));
    }
    let mut current = plan.laps.last().and_then(|l| l.last()).copied().unwrap_or(gate);

    for (i, run_line) in plan.run_lines.iter().enumerate() {
        let mut directed = run_line.clone();
        if i % 2 == 1 {
            directed.reverse();
        }
        let (Some(&entry), Some(&exit)) = (directed.first(), directed.last()) else {
            continue;
        };
        if i == 0 || current.distance(&entry) > w * 2.0 {
            let trace = trace_collision_boundary(&current, &entry, &lap_1);
            waypoints.extend(simplify_path(&trace, SIMPLIFY_TOLERANCE));
        }
        waypoints.extend(directed);
        current = exit;
    }

    let trace = trace_collision_boundary(&current, &gate, &lap_1);
    waypoints.extend(simplify_path(&trace, SIMPLIFY_TOLERANCE));
    waypoints.push(gate);
    waypoints.dedup();

    debug!(
        "Coverage plan: {} laps, {} run-lines, {} waypoints",
        plan.laps.len(),
        plan.run_lines.len(),
        waypoints.len()
    );
    plan.waypoints = waypoints;
    plan
}

/// One leg of a task
#[derive(Debug, Clone)]
pub struct Job {
    pub start: Destination,
    pub end: Destination,
    pub vehicle: VehicleId,
    pub implement: Option<ImplementId>,
    pub tool_type: Option<ToolType>,
    pub working_width: f32,
    lap_1: Vec<Position>,
}

impl Job {
    pub fn new(
        start: Destination,
        end: Destination,
        vehicle: VehicleId,
        implement: Option<ImplementId>,
        tool_type: Option<ToolType>,
        working_width: f32,
    ) -> Self {
        Self {
            start,
            end,
            vehicle,
            implement,
            tool_type,
            working_width,
            lap_1: Vec::new(),
        }
    }

    /// Lap 1 of the last coverage plan, shared with docking traces
    pub fn lap_1(&self) -> &[Position] {
        &self.lap_1
    }

    /// Waypoints for this leg. Missing paddocks or sell points give an empty
    /// path, which the vehicle treats as already arrived.
    pub fn generate_path(&mut self, ctx: &PlanningContext<'_>) -> Vec<Position> {
        match (self.start, self.end) {
            (Destination::Paddock(from), Destination::Paddock(to)) if from == to => {
                if self.tool_type == Some(ToolType::Trailer) {
                    warn!("Trailers have no work to do inside {}", to);
                    return Vec::new();
                }
                let Some(paddock) = ctx.paddocks.get(&to) else {
                    warn!("{} not found, no working path", to);
                    return Vec::new();
                };
                let options = CoverageOptions::from_config(self.working_width, ctx.config);
                let plan = plan_coverage(&paddock.boundary, paddock.gate, &options);
                self.lap_1 = plan.lap_1().to_vec();
                plan.waypoints
            }
            (start, end) if start == end => end
                .position(ctx.paddocks, ctx.sell_points, ctx.shed)
                .into_iter()
                .collect(),
            (start, end) => {
                let (Some(from), Some(to)) = (
                    start.position(ctx.paddocks, ctx.sell_points, ctx.shed),
                    end.position(ctx.paddocks, ctx.sell_points, ctx.shed),
                ) else {
                    warn!("Unresolved destination for {:?} -> {:?}", start, end);
                    return Vec::new();
                };
                let from_shed = !start.is_paddock() && end.is_paddock();
                ctx.roads.generate_transport_path(from, to, from_shed)
            }
        }
    }
}
