use crate::{Size, SizeConstraint};

/// A lightweight, serializable snapshot of a scroll position.
///
/// `index` is the first visible item, `offset` the distance of that item's leading edge from the
/// surface's leading edge. The binder keeps one across unmount/mount so a remounted surface comes
/// back where it left off.
///
/// With `feature = "serde"`, this type implements `Serialize`/`Deserialize`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScrollPosition {
    pub index: usize,
    pub offset: i32,
}

/// Measurement state of the whole list surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeasureState {
    #[default]
    Unmeasured,
    Measured {
        constraint: SizeConstraint,
        size: Size,
    },
    /// A previous measurement exists but must not be reused.
    RemeasurePending {
        constraint: SizeConstraint,
        size: Size,
    },
}

impl MeasureState {
    pub fn size(&self) -> Option<Size> {
        match self {
            Self::Unmeasured => None,
            Self::Measured { size, .. } | Self::RemeasurePending { size, .. } => Some(*size),
        }
    }

    pub fn is_measured(&self) -> bool {
        !matches!(self, Self::Unmeasured)
    }
}
