#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScrollDirection {
    Forward,
    Backward,
}

/// How items are arranged on the cross axis.
///
/// `span_count == 1` is a plain linear list; larger values describe a grid where each item takes
/// `span_size` columns (or the whole row when it is full-span).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LayoutInfo {
    pub orientation: Orientation,
    pub span_count: u32,
}

impl LayoutInfo {
    pub fn linear(orientation: Orientation) -> Self {
        Self {
            orientation,
            span_count: 1,
        }
    }

    pub fn grid(orientation: Orientation, span_count: u32) -> Self {
        Self {
            orientation,
            span_count: span_count.max(1),
        }
    }
}

impl Default for LayoutInfo {
    fn default() -> Self {
        Self::linear(Orientation::Vertical)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn from_main_cross(orientation: Orientation, main: u32, cross: u32) -> Self {
        match orientation {
            Orientation::Vertical => Self::new(cross, main),
            Orientation::Horizontal => Self::new(main, cross),
        }
    }

    /// Size along the scroll axis.
    pub fn main(&self, orientation: Orientation) -> u32 {
        match orientation {
            Orientation::Vertical => self.height,
            Orientation::Horizontal => self.width,
        }
    }

    pub fn cross(&self, orientation: Orientation) -> u32 {
        match orientation {
            Orientation::Vertical => self.width,
            Orientation::Horizontal => self.height,
        }
    }
}

/// One axis of a [`SizeConstraint`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SizeSpec {
    Exact(u32),
    AtMost(u32),
    #[default]
    Unspecified,
}

impl SizeSpec {
    /// The bound carried by this spec, if any.
    pub fn size(self) -> Option<u32> {
        match self {
            Self::Exact(v) | Self::AtMost(v) => Some(v),
            Self::Unspecified => None,
        }
    }

    pub fn is_unspecified(self) -> bool {
        matches!(self, Self::Unspecified)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SizeConstraint {
    pub width: SizeSpec,
    pub height: SizeSpec,
}

impl SizeConstraint {
    pub const fn new(width: SizeSpec, height: SizeSpec) -> Self {
        Self { width, height }
    }

    pub const fn exact(width: u32, height: u32) -> Self {
        Self::new(SizeSpec::Exact(width), SizeSpec::Exact(height))
    }

    pub fn from_main_cross(orientation: Orientation, main: SizeSpec, cross: SizeSpec) -> Self {
        match orientation {
            Orientation::Vertical => Self::new(cross, main),
            Orientation::Horizontal => Self::new(main, cross),
        }
    }

    pub fn main(&self, orientation: Orientation) -> SizeSpec {
        match orientation {
            Orientation::Vertical => self.height,
            Orientation::Horizontal => self.width,
        }
    }

    pub fn cross(&self, orientation: Orientation) -> SizeSpec {
        match orientation {
            Orientation::Vertical => self.width,
            Orientation::Horizontal => self.height,
        }
    }
}

/// A half-open range of item indexes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IndexRange {
    pub start_index: usize,
    pub end_index: usize, // exclusive
}

impl IndexRange {
    pub const fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index,
            end_index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start_index >= self.end_index
    }

    pub fn len(&self) -> usize {
        self.end_index.saturating_sub(self.start_index)
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index < self.end_index
    }

    /// Smallest range covering both `self` and `other`.
    pub fn union(&self, other: IndexRange) -> IndexRange {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return *self;
        }
        IndexRange::new(
            self.start_index.min(other.start_index),
            self.end_index.max(other.end_index),
        )
    }

    pub fn clamp_to(&self, count: usize) -> IndexRange {
        IndexRange::new(self.start_index.min(count), self.end_index.min(count))
    }
}

/// Visible indexes as last reported by the display surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VisibleRange {
    pub first_visible: Option<usize>,
    pub last_visible: Option<usize>,
    pub first_fully_visible: Option<usize>,
    pub last_fully_visible: Option<usize>,
}

impl VisibleRange {
    pub fn new(first_visible: usize, last_visible: usize) -> Self {
        Self {
            first_visible: Some(first_visible),
            last_visible: Some(last_visible),
            first_fully_visible: Some(first_visible),
            last_fully_visible: Some(last_visible),
        }
    }
}
