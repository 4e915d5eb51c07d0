//! Footprint painting and fill accounting
//!
//! While working, the tool footprint is rasterised and painted into the
//! paddock overlay. Only pixels that were not painted before count, and the
//! count is turned into fill: harvesters gain, consuming implements lose.

use super::mask::CoverageMask;
use super::paddock::Paddock;
use super::types::{Position, FILL_EPSILON};

/// Remembers where the footprint was last sampled
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaintSampler {
    last_center: Option<Position>,
}

impl PaintSampler {
    pub fn reset(&mut self) {
        self.last_center = None;
    }

    /// Rasterised footprint when it has moved at least `threshold` pixels
    /// since the last sample, `None` otherwise.
    pub fn sample(
        &mut self,
        center: Position,
        across: f32,
        along: f32,
        heading: f32,
        threshold: f32,
    ) -> Option<CoverageMask> {
        if let Some(last) = self.last_center {
            if last.distance(&center) < threshold {
                return None;
            }
        }
        self.last_center = Some(center);
        CoverageMask::from_rotated_rect(center, across, along, heading)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaintOutcome {
    /// Newly covered pixels
    pub pixels: usize,
    /// Signed change of the tool's fill
    pub fill_delta: f32,
    /// Storage is full (harvest) or empty (consume); no further pixel fits
    pub exhausted: bool,
}

/// Paint without any fill, as a cultivator does
pub fn paint_plain(paddock: &mut Paddock, footprint: &CoverageMask) -> PaintOutcome {
    PaintOutcome {
        pixels: paddock.paint(footprint, None),
        ..PaintOutcome::default()
    }
}

/// Harvest into a tank of `capacity`. Pixels that would overflow the tank
/// stay unpainted so nothing is ever discarded.
pub fn paint_harvest(
    paddock: &mut Paddock,
    footprint: &CoverageMask,
    fill: &mut f32,
    capacity: f32,
    rate: f32,
) -> PaintOutcome {
    let gain = rate * paddock.yield_multiplier();
    if gain <= 0.0 {
        return paint_plain(paddock, footprint);
    }
    let room = ((capacity - *fill) / gain + FILL_EPSILON).floor().max(0.0) as usize;
    let pixels = if room > 0 { paddock.paint(footprint, Some(room)) } else { 0 };
    let delta = (pixels as f32 * gain).min(capacity - *fill).max(0.0);
    *fill += delta;
    PaintOutcome {
        pixels,
        fill_delta: delta,
        exhausted: capacity - *fill < gain - FILL_EPSILON,
    }
}

/// Spend fill from storage for every new pixel, stopping when it runs out
pub fn paint_consume(paddock: &mut Paddock, footprint: &CoverageMask, fill: &mut f32, rate: f32) -> PaintOutcome {
    if rate <= 0.0 {
        return paint_plain(paddock, footprint);
    }
    let available = (*fill / rate + FILL_EPSILON).floor().max(0.0) as usize;
    let pixels = if available > 0 { paddock.paint(footprint, Some(available)) } else { 0 };
    let delta = (pixels as f32 * rate).min(*fill);
    *fill -= delta;
    PaintOutcome {
        pixels,
        fill_delta: -delta,
        exhausted: *fill < rate - FILL_EPSILON,
    }
}
