//! Paddocks (fields) and their work state
//!
//! A paddock owns its rasterised interior and a paint overlay. Work painted
//! into the overlay is only turned into a state change when the working
//! stage ends, so the paddock never changes state half way through a job.

use log::{debug, error};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::config::PaddockConfig;
use super::error::SimError;
use super::mask::CoverageMask;
use super::types::{FillType, PaddockId, Position, ToolType, VehicleId};

/// Lime lasts this many harvests
pub const LIME_YEARS: u8 = 3;
/// Weed severity never exceeds this
pub const MAX_WEEDS: u8 = 3;

/// Growth/work stage of a paddock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaddockState {
    Harvested,
    Tilled,
    Growing1,
    Growing2,
    Growing3,
    ReadyToHarvest,
    Blank,
}

impl PaddockState {
    pub fn from_index(index: u8) -> Self {
        match index {
            0 => PaddockState::Harvested,
            1 => PaddockState::Tilled,
            2 => PaddockState::Growing1,
            3 => PaddockState::Growing2,
            4 => PaddockState::Growing3,
            5 => PaddockState::ReadyToHarvest,
            _ => PaddockState::Blank,
        }
    }

    pub fn is_growing(self) -> bool {
        matches!(
            self,
            PaddockState::Growing1 | PaddockState::Growing2 | PaddockState::Growing3
        )
    }
}

/// What a finished working stage does to a paddock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    Tool(ToolType, Option<FillType>),
    Harvest,
}

#[derive(Debug, Clone)]
pub struct Paddock {
    pub id: PaddockId,
    pub boundary: Vec<Position>,
    pub gate: Position,
    pub hectares: f32,
    pub state: PaddockState,
    pub lime_years: u8,
    pub super_spread: bool,
    pub urea_spread: bool,
    pub weeds: u8,
    pub crop: Option<FillType>,
    /// The vehicle currently working this paddock, if any
    pub assigned: Option<VehicleId>,
    field_mask: Option<CoverageMask>,
    paint: Option<CoverageMask>,
    field_pixels: usize,
}

impl Paddock {
    pub fn new(id: PaddockId, boundary: Vec<Position>, gate: Position, state: PaddockState) -> Self {
        let field_mask = CoverageMask::from_polygon(&boundary);
        let paint = field_mask.as_ref().map(|mask| CoverageMask::empty(mask.rect()));
        let field_pixels = field_mask.as_ref().map_or(0, CoverageMask::count);
        Self {
            id,
            boundary,
            gate,
            hectares: 0.0,
            state,
            lime_years: 0,
            super_spread: false,
            urea_spread: false,
            weeds: 0,
            crop: None,
            assigned: None,
            field_mask,
            paint,
            field_pixels,
        }
    }

    /// Build from map config. Paddocks without a saved state start at a
    /// random stage between Harvested and ReadyToHarvest.
    pub fn from_config(config: &PaddockConfig, rng: &mut impl Rng) -> Self {
        let state = config
            .state
            .unwrap_or_else(|| PaddockState::from_index(rng.random_range(0..=5)));
        let mut paddock = Self::new(PaddockId(config.number), config.boundary.clone(), config.gate, state);
        paddock.hectares = config.hectares;
        paddock.lime_years = config.lime_years;
        paddock.super_spread = config.super_spread;
        paddock.urea_spread = config.urea_spread;
        paddock.weeds = config.weeds.min(MAX_WEEDS);
        paddock.crop = config.crop;
        paddock
    }

    pub fn name(&self) -> String {
        self.id.to_string()
    }

    pub fn field_pixels(&self) -> usize {
        self.field_pixels
    }

    pub fn painted_pixels(&self) -> usize {
        self.paint.as_ref().map_or(0, CoverageMask::count)
    }

    /// Fraction of the paddock covered by the current overlay
    pub fn completion(&self) -> f32 {
        if self.field_pixels == 0 {
            return 0.0;
        }
        self.painted_pixels() as f32 / self.field_pixels as f32
    }

    /// Paint the part of `footprint` that lies inside the paddock and was not
    /// painted yet, stopping after `limit` new pixels. Returns the number of
    /// newly painted pixels.
    pub fn paint(&mut self, footprint: &CoverageMask, limit: Option<usize>) -> usize {
        let (Some(field), Some(paint)) = (self.field_mask.as_ref(), self.paint.as_mut()) else {
            return 0;
        };
        let limit = limit.unwrap_or(usize::MAX);
        let mut painted = 0;
        for (x, y) in footprint.iter_set() {
            if painted >= limit {
                break;
            }
            if field.get(x, y) && paint.set(x, y) {
                painted += 1;
            }
        }
        painted
    }

    pub fn reset_paint(&mut self) {
        if let Some(paint) = self.paint.as_mut() {
            paint.clear();
        }
    }

    /// Yield scale for a harvest, from soil treatment, weeds and crop.
    /// Nothing planted yields nothing.
    pub fn yield_multiplier(&self) -> f32 {
        let crop = self.crop.map_or(0.0, FillType::crop_yield_factor);
        let lime = if self.lime_years > 0 { 1.15 } else { 0.9 };
        let super_phosphate = if self.super_spread { 1.1 } else { 1.0 };
        let urea = if self.urea_spread { 1.1 } else { 1.0 };
        let weeds = 1.0 - 0.15 * self.weeds.min(MAX_WEEDS) as f32;
        crop * lime * super_phosphate * urea * weeds
    }

    /// Commit a finished working stage
    pub fn apply_work(&mut self, work: WorkKind) -> Result<(), SimError> {
        match work {
            WorkKind::Harvest => {
                self.state = PaddockState::Harvested;
                self.super_spread = false;
                self.urea_spread = false;
                self.lime_years = self.lime_years.saturating_sub(1);
            }
            WorkKind::Tool(ToolType::Cultivator, _) => self.state = PaddockState::Tilled,
            WorkKind::Tool(tool_type, Some(fill_type)) if !tool_type.accepts(fill_type) => {
                error!("{:?} cannot apply {:?} to {}", tool_type, fill_type, self.id);
                return Err(SimError::InvalidFill { tool_type, fill_type });
            }
            WorkKind::Tool(ToolType::Seeder, Some(crop)) => {
                self.state = PaddockState::Growing1;
                self.crop = Some(crop);
            }
            WorkKind::Tool(ToolType::Spreader, Some(FillType::Lime)) => self.lime_years = LIME_YEARS,
            WorkKind::Tool(ToolType::Spreader, Some(FillType::Super)) => self.super_spread = true,
            WorkKind::Tool(ToolType::Spreader, Some(FillType::Urea)) => self.urea_spread = true,
            WorkKind::Tool(ToolType::Sprayer, Some(FillType::Herbicide)) => self.weeds = 0,
            WorkKind::Tool(ToolType::Trailer, _) => {}
            WorkKind::Tool(tool_type, fill_type) => {
                error!("{:?} has nothing to apply to {} (fill {:?})", tool_type, self.id, fill_type);
                return Err(SimError::NothingToApply { tool_type, fill_type });
            }
        }
        debug!("{} is now {:?}", self.id, self.state);
        Ok(())
    }

    /// Step a growing crop one stage; weeds may creep in while it grows
    pub fn advance_growth(&mut self, rng: &mut impl Rng) {
        let next = match self.state {
            PaddockState::Growing1 => PaddockState::Growing2,
            PaddockState::Growing2 => PaddockState::Growing3,
            PaddockState::Growing3 => PaddockState::ReadyToHarvest,
            other => other,
        };
        if self.state.is_growing() && rng.random_bool(0.25) {
            self.weeds = (self.weeds + 1).min(MAX_WEEDS);
        }
        self.state = next;
    }
}
