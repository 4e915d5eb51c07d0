//! Header unload handshake and trailer hold states
//!
//! Waiting is never a suspended computation: both sides keep an explicit
//! state that the world polls every sub-step.

use super::types::VehicleId;

/// Harvester side of the handshake
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum HeaderUnload {
    #[default]
    Normal,
    /// Full, path following halted, asking for a trailer
    WaitingForAssignment,
    /// A trailer has been assigned and is driving over
    WaitingForArrival { unloader: VehicleId },
    /// Trailer docked, grain moving across every interval
    Unloading { unloader: VehicleId, timer: f32 },
}

impl HeaderUnload {
    /// Whether the harvester must hold position
    pub fn is_stalled(&self) -> bool {
        !matches!(self, HeaderUnload::Normal)
    }

    pub fn unloader(&self) -> Option<VehicleId> {
        match self {
            HeaderUnload::WaitingForArrival { unloader } | HeaderUnload::Unloading { unloader, .. } => {
                Some(*unloader)
            }
            _ => None,
        }
    }
}

/// Tractor-and-trailer side of a delivery task
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TrailerPhase {
    /// Driving to the paddock (and on to a header when one is assigned)
    #[default]
    ToField,
    /// Holding at the end of the field leg. Held while docked to a header.
    AtField { has_waited: bool },
    /// Backing out along the docking path to the gate
    ToGate,
    /// Holding at the gate before heading to the silo
    AtGate { has_waited: bool },
    /// Driving to the silo
    ToSilo,
    /// Emptying into the silo
    AtSilo { timer: f32 },
}

impl TrailerPhase {
    /// Parked at a hold point or emptying at the silo
    pub fn is_holding(&self) -> bool {
        matches!(
            self,
            TrailerPhase::AtField { .. } | TrailerPhase::AtGate { .. } | TrailerPhase::AtSilo { .. }
        )
    }
}

/// Move up to `rate` from `source` into `target` without exceeding
/// `target_capacity`. Returns the amount moved; the sum is conserved.
pub fn transfer(source: &mut f32, target: &mut f32, target_capacity: f32, rate: f32) -> f32 {
    let amount = rate.min(*source).min(target_capacity - *target).max(0.0);
    *source -= amount;
    *target += amount;
    amount
}

/// Advance an interval timer by `step`. Returns how many intervals elapsed.
pub fn tick_interval(timer: &mut f32, step: f32, interval: f32) -> u32 {
    *timer += step;
    let mut fired = 0;
    while *timer >= interval {
        *timer -= interval;
        fired += 1;
    }
    fired
}
