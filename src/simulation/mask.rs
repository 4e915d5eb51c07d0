//! Rasterised pixel masks
//!
//! Field interiors, collision polygons and tool footprints are all rasterised
//! with tiny-skia into a boolean grid that remembers its map-space origin, so
//! a mask only covers the polygon's own bounding rect instead of the whole map.

use tiny_skia::{FillRule, Mask, PathBuilder, Transform};

use super::types::Position;

/// Integer axis-aligned rectangle in map pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl PixelRect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }
}

/// A boolean pixel grid anchored at a map-space origin
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageMask {
    origin_x: i32,
    origin_y: i32,
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl CoverageMask {
    /// Empty mask covering `rect` (plus its far edge row/column)
    pub fn empty(rect: PixelRect) -> Self {
        let width = (rect.w.max(0) + 1) as u32;
        let height = (rect.h.max(0) + 1) as u32;
        Self {
            origin_x: rect.x,
            origin_y: rect.y,
            width,
            height,
            bits: vec![false; (width * height) as usize],
        }
    }

    /// Rasterise a closed polygon. Returns `None` for fewer than three points.
    pub fn from_polygon(polygon: &[Position]) -> Option<Self> {
        if polygon.len() < 3 {
            return None;
        }
        let rect = super::geometry::get_polygon_rect(polygon);
        let mut mask = Self::empty(rect);

        let mut pb = PathBuilder::new();
        let (ox, oy) = (rect.x as f32, rect.y as f32);
        pb.move_to(polygon[0].x - ox, polygon[0].y - oy);
        for point in &polygon[1..] {
            pb.line_to(point.x - ox, point.y - oy);
        }
        pb.close();
        let path = pb.finish()?;

        let mut raster = Mask::new(mask.width, mask.height)?;
        raster.fill_path(&path, FillRule::Winding, false, Transform::identity());
        for (bit, value) in mask.bits.iter_mut().zip(raster.data()) {
            *bit = *value > 0;
        }
        Some(mask)
    }

    /// Rasterise a rectangle centred on `center`, `across` wide perpendicular
    /// to `heading` and `along` long in the heading direction.
    pub fn from_rotated_rect(center: Position, across: f32, along: f32, heading: f32) -> Option<Self> {
        let forward = Position::from_heading(heading) * (along / 2.0);
        let right = Position::from_heading(heading + 90.0) * (across / 2.0);
        let corners = [
            center + forward - right,
            center + forward + right,
            center - forward + right,
            center - forward - right,
        ];
        Self::from_polygon(&corners)
    }

    pub fn rect(&self) -> PixelRect {
        PixelRect::new(
            self.origin_x,
            self.origin_y,
            self.width as i32 - 1,
            self.height as i32 - 1,
        )
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let lx = x - self.origin_x;
        let ly = y - self.origin_y;
        if lx < 0 || ly < 0 || lx >= self.width as i32 || ly >= self.height as i32 {
            return None;
        }
        Some(ly as usize * self.width as usize + lx as usize)
    }

    /// Whether the map pixel `(x, y)` is set; pixels outside the mask are unset
    pub fn get(&self, x: i32, y: i32) -> bool {
        self.index(x, y).is_some_and(|i| self.bits[i])
    }

    /// Set a map pixel. Returns `true` if it was previously unset.
    pub fn set(&mut self, x: i32, y: i32) -> bool {
        match self.index(x, y) {
            Some(i) if !self.bits[i] => {
                self.bits[i] = true;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.bits.iter_mut().for_each(|bit| *bit = false);
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|bit| **bit).count()
    }

    /// Map-space coordinates of every set pixel, row by row
    pub fn iter_set(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        let width = self.width as usize;
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, bit)| **bit)
            .map(move |(i, _)| {
                (
                    self.origin_x + (i % width) as i32,
                    self.origin_y + (i / width) as i32,
                )
            })
    }
}
