//! Where a vehicle is headed
//!
//! A `Destination` is the live, resolved form. `DestinationRef` is what gets
//! persisted: it only names the target and is resolved against the world
//! once paddocks and sell points have loaded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::paddock::Paddock;
use super::sellpoint::SellPoint;
use super::types::{PaddockId, Position, SellPointId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Paddock(PaddockId),
    SellPoint(SellPointId),
    /// Home base; it has no location of its own beyond the shed position
    Shed,
}

impl Destination {
    pub fn is_paddock(&self) -> bool {
        matches!(self, Destination::Paddock(_))
    }

    pub fn paddock(&self) -> Option<PaddockId> {
        match self {
            Destination::Paddock(id) => Some(*id),
            _ => None,
        }
    }

    pub fn name(&self, sell_points: &BTreeMap<SellPointId, SellPoint>) -> String {
        match self {
            Destination::Paddock(id) => id.to_string(),
            Destination::SellPoint(id) => sell_points
                .get(id)
                .map_or_else(|| "Unknown".to_string(), |s| s.name.clone()),
            Destination::Shed => "Shed".to_string(),
        }
    }

    /// Concrete map position: a paddock's gate, a sell point's position or
    /// the shed. `None` when the target no longer exists.
    pub fn position(
        &self,
        paddocks: &BTreeMap<PaddockId, Paddock>,
        sell_points: &BTreeMap<SellPointId, SellPoint>,
        shed: Position,
    ) -> Option<Position> {
        match self {
            Destination::Paddock(id) => paddocks.get(id).map(|p| p.gate),
            Destination::SellPoint(id) => sell_points.get(id).map(|s| s.position),
            Destination::Shed => Some(shed),
        }
    }

    pub fn to_ref(&self, sell_points: &BTreeMap<SellPointId, SellPoint>) -> DestinationRef {
        match self {
            Destination::Paddock(id) => DestinationRef::Paddock(id.0),
            Destination::SellPoint(_) => DestinationRef::SellPoint(self.name(sell_points)),
            Destination::Shed => DestinationRef::Shed,
        }
    }
}

/// Serializable reference to a destination. Sell points are referenced by
/// name since their ids are only assigned at load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestinationRef {
    Paddock(u32),
    SellPoint(String),
    Shed,
}

impl DestinationRef {
    /// Resolve against the loaded world. `None` while the target is not
    /// (yet) present.
    pub fn resolve(
        &self,
        paddocks: &BTreeMap<PaddockId, Paddock>,
        sell_points: &BTreeMap<SellPointId, SellPoint>,
    ) -> Option<Destination> {
        match self {
            DestinationRef::Paddock(number) => {
                let id = PaddockId(*number);
                paddocks.contains_key(&id).then_some(Destination::Paddock(id))
            }
            DestinationRef::SellPoint(name) => sell_points
                .values()
                .find(|s| &s.name == name)
                .map(|s| Destination::SellPoint(s.id)),
            DestinationRef::Shed => Some(Destination::Shed),
        }
    }
}
