//! Road polylines and transport routing
//!
//! Roads are a fixed, externally authored set of named polylines. Routing does
//! no graph search: it snaps to the single closest road vertex and follows that
//! road, which is all the farm map needs.

use log::{debug, warn};
use ordered_float::OrderedFloat;

use super::config::RoadConfig;
use super::types::Position;

/// A named road polyline in map pixel space
#[derive(Debug, Clone, PartialEq)]
pub struct SimRoad {
    pub name: String,
    pub points: Vec<Position>,
}

impl SimRoad {
    pub fn length(&self) -> f32 {
        super::geometry::path_length(&self.points)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimRoadNetwork {
    roads: Vec<SimRoad>,
}

impl SimRoadNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(roads: &[RoadConfig]) -> Self {
        let mut network = Self::new();
        for road in roads {
            network.add_road(road.name.clone(), road.points.clone());
        }
        network
    }

    pub fn add_road(&mut self, name: impl Into<String>, points: Vec<Position>) {
        self.roads.push(SimRoad {
            name: name.into(),
            points,
        });
    }

    pub fn roads(&self) -> &[SimRoad] {
        &self.roads
    }

    pub fn road_count(&self) -> usize {
        self.roads.len()
    }

    /// Find the closest road vertex to a given position.
    /// Returns (road index, vertex index, distance). There is no distance
    /// cutoff: the nearest road is used however far away it is.
    pub fn find_closest_point_on_road(&self, position: &Position) -> Option<(usize, usize, f32)> {
        self.roads
            .iter()
            .enumerate()
            .flat_map(|(road_index, road)| {
                road.points
                    .iter()
                    .enumerate()
                    .map(move |(point_index, point)| (road_index, point_index, position.distance(point)))
            })
            .min_by_key(|(_, _, distance)| OrderedFloat(*distance))
    }

    /// Route between `start` and `end` along the nearest road.
    ///
    /// The road is matched against the end that is away from home: `end` when
    /// leaving the shed, `start` otherwise. The path is the remainder of that
    /// road from the matched vertex, flipped so it begins on the `start` side,
    /// with `end` appended. Without any road the path is just `[end]`.
    pub fn generate_transport_path(&self, start: Position, end: Position, from_shed: bool) -> Vec<Position> {
        let anchor = if from_shed { end } else { start };
        let Some((road_index, point_index, distance)) = self.find_closest_point_on_road(&anchor) else {
            warn!("No roads on the map, driving straight to ({:.0}, {:.0})", end.x, end.y);
            return vec![end];
        };

        let road = &self.roads[road_index];
        let mut path: Vec<Position> = road.points[point_index..].to_vec();
        if let Some(first) = path.first() {
            if start.distance(first) > end.distance(first) {
                path.reverse();
            }
        }
        path.push(end);

        debug!(
            "Transport path via {} ({} points, snapped {:.1}px)",
            road.name,
            path.len(),
            distance
        );
        path
    }
}
