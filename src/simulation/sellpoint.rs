//! Sell points and the farm silo

use std::collections::BTreeMap;

use log::debug;

use super::config::SellPointConfig;
use super::types::{FillType, Position, SellPointId};

/// A place trailers can deliver to. The silo is the one sell point that only
/// stores crop instead of buying it.
#[derive(Debug, Clone)]
pub struct SellPoint {
    pub id: SellPointId,
    pub name: String,
    pub position: Position,
    pub silo: bool,
    /// Stored or delivered amount per fill type
    pub contents: BTreeMap<FillType, f32>,
}

impl SellPoint {
    pub fn from_config(id: SellPointId, config: &SellPointConfig) -> Self {
        Self {
            id,
            name: config.name.clone(),
            position: config.position,
            silo: config.silo,
            contents: BTreeMap::new(),
        }
    }

    pub fn deposit(&mut self, fill_type: FillType, amount: f32) {
        if amount <= 0.0 {
            return;
        }
        *self.contents.entry(fill_type).or_insert(0.0) += amount;
        debug!("{} received {:.2} {:?}", self.name, amount, fill_type);
    }

    pub fn stored(&self, fill_type: FillType) -> f32 {
        self.contents.get(&fill_type).copied().unwrap_or(0.0)
    }

    pub fn total_stored(&self) -> f32 {
        self.contents.values().sum()
    }
}
