use super::types::Position;

/// A local attach point that follows its owner. Only ever derived, never stored
/// in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Hitch {
    /// Offset from the owner's centre, x forward and y to the right
    pub local: Position,
}

impl Hitch {
    pub fn new(local: Position) -> Self {
        Self { local }
    }

    /// Straight behind (negative) or ahead of the owner's centre
    pub fn inline(offset: f32) -> Self {
        Self::new(Position::new(offset, 0.0))
    }

    pub fn world(&self, owner_position: Position, owner_rotation: f32) -> Position {
        owner_position + self.local.rotated(owner_rotation)
    }
}
