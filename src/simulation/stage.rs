//! Task stages
//!
//! Stages carry a fixed numeric order. Each kind of task walks a subset of
//! them in that order, so the counter only ever increases within a task.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    TransportingTo = 0,
    TransportingFrom = 1,
    TravellingTo = 2,
    Working = 3,
    TravellingFrom = 4,
}

impl Stage {
    /// Transport legs use the fast speed profile and a wider pop radius
    pub fn is_transport(self) -> bool {
        self != Stage::Working
    }
}

/// What a vehicle was dispatched to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Tractor and implement working a paddock
    Work,
    /// Self-propelled harvester working a paddock
    Harvest,
    /// Tractor and trailer carting grain from a paddock to the silo
    Delivery,
}

impl TaskKind {
    pub fn stages(self) -> &'static [Stage] {
        match self {
            TaskKind::Work | TaskKind::Harvest => {
                &[Stage::TravellingTo, Stage::Working, Stage::TravellingFrom]
            }
            TaskKind::Delivery => &[
                Stage::TransportingTo,
                Stage::TransportingFrom,
                Stage::TravellingFrom,
            ],
        }
    }

    pub fn first_stage(self) -> Stage {
        self.stages()[0]
    }

    pub fn contains(self, stage: Stage) -> bool {
        self.stages().contains(&stage)
    }

    /// The stage after `stage`, or `None` once the task is complete
    pub fn next(self, stage: Stage) -> Option<Stage> {
        let stages = self.stages();
        let position = stages.iter().position(|s| *s == stage)?;
        stages.get(position + 1).copied()
    }
}

/// Human readable status shown for a stage
pub fn stage_status(stage: Stage, destination: &str, working: &str) -> String {
    match stage {
        Stage::TransportingTo => format!("Transporting to {}...", destination),
        Stage::TransportingFrom => format!("Transporting to {}...", destination),
        Stage::TravellingTo => format!("Travelling to {}...", destination),
        Stage::Working => working.to_string(),
        Stage::TravellingFrom => "Travelling to Shed...".to_string(),
    }
}
