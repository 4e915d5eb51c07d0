//! Standalone farm simulation module
//!
//! This module contains the field planning and vehicle simulation logic. It
//! runs without any renderer and can be driven and tested from the console.

mod config;
mod destination;
mod error;
mod geometry;
mod hitch;
mod implement;
mod job;
mod mask;
mod paddock;
mod paint;
mod road_network;
mod sellpoint;
mod shed;
mod snapshot;
mod stage;
mod types;
mod unload;
mod vehicle;
mod world;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use config::{
    ConfigError, EquipmentConfig, FillRates, ImplementConfig, MapConfig, PaddockConfig, RoadConfig,
    SellPointConfig, SimConfig, VehicleConfig, GATE_TOLERANCE,
};
#[allow(unused_imports)]
pub use destination::{Destination, DestinationRef};
pub use error::SimError;
#[allow(unused_imports)]
pub use geometry::{
    angle_difference, bresenham, closest_point_index, complementary_arc_length, densify,
    distance_to_polygon, get_polygon_rect, line_collides_mask, lines_from_points, path_length,
    point_in_polygon, shrink_polygon, signed_area, simplify_path, trace_collision_boundary,
};
#[allow(unused_imports)]
pub use hitch::Hitch;
#[allow(unused_imports)]
pub use implement::SimImplement;
#[allow(unused_imports)]
pub use job::{headland_lap, plan_coverage, CoverageOptions, CoveragePlan, Job, PlanningContext};
#[allow(unused_imports)]
pub use mask::{CoverageMask, PixelRect};
#[allow(unused_imports)]
pub use paddock::{Paddock, PaddockState, WorkKind, LIME_YEARS, MAX_WEEDS};
#[allow(unused_imports)]
pub use paint::{paint_consume, paint_harvest, paint_plain, PaintOutcome, PaintSampler};
#[allow(unused_imports)]
pub use road_network::{SimRoad, SimRoadNetwork};
#[allow(unused_imports)]
pub use sellpoint::SellPoint;
#[allow(unused_imports)]
pub use shed::Shed;
#[allow(unused_imports)]
pub use snapshot::{ImplementSnapshot, PaddockSnapshot, VehicleSnapshot, WorldSnapshot};
#[allow(unused_imports)]
pub use stage::{stage_status, Stage, TaskKind};
#[allow(unused_imports)]
pub use types::{
    FillType, ImplementId, PaddockId, Position, SellPointId, SimId, ToolType, VehicleId, FILL_EPSILON,
};
#[allow(unused_imports)]
pub use unload::{tick_interval, transfer, HeaderUnload, TrailerPhase};
#[allow(unused_imports)]
pub use vehicle::{SimVehicle, VehicleUpdateResult};
pub use world::{demo_configs, SimEvent, SimWorld};
