//! Errors returned by the dispatch surface of the simulation

use thiserror::Error;

use super::types::{FillType, ImplementId, PaddockId, SellPointId, ToolType, VehicleId};

#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("vehicle {0:?} not found")]
    VehicleNotFound(VehicleId),
    #[error("implement {0:?} not found")]
    ImplementNotFound(ImplementId),
    #[error("{0} not found")]
    PaddockNotFound(PaddockId),
    #[error("sell point {0:?} not found")]
    SellPointNotFound(SellPointId),
    #[error("vehicle {0:?} already has an implement attached")]
    AlreadyAttached(VehicleId),
    #[error("implement {0:?} is attached to another vehicle")]
    ImplementInUse(ImplementId),
    #[error("vehicle {0:?} cannot tow an implement")]
    CannotTow(VehicleId),
    #[error("vehicle {0:?} is not a harvester")]
    NotAHarvester(VehicleId),
    #[error("vehicle {0:?} has no trailer attached")]
    NoTrailer(VehicleId),
    #[error("harvester {0:?} is not waiting for an unloader")]
    NotWaitingForUnload(VehicleId),
    #[error("tractor {0:?} cannot take on an unload right now")]
    UnloaderUnavailable(VehicleId),
    #[error("harvester {0:?} already has a trailer assigned")]
    UnloaderAlreadyAssigned(VehicleId),
    #[error("trailer {trailer:?} holds {loaded:?} and cannot take {incoming:?}")]
    MixedLoad {
        trailer: ImplementId,
        loaded: FillType,
        incoming: FillType,
    },
    #[error("{tool_type:?} cannot hold {fill_type:?}")]
    InvalidFill { tool_type: ToolType, fill_type: FillType },
    #[error("{tool_type:?} has nothing to apply (fill {fill_type:?})")]
    NothingToApply { tool_type: ToolType, fill_type: Option<FillType> },
    #[error("vehicle {0:?} has no task for this destination")]
    InvalidTask(VehicleId),
}
