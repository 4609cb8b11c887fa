use std::fmt;

use crate::SizeConstraint;

/// Kind of a list mutation, carried by index errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OpKind {
    Insert,
    InsertRange,
    Update,
    UpdateRange,
    Remove,
    RemoveRange,
    Move,
    Clear,
    Access,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::InsertRange => "insert range",
            Self::Update => "update",
            Self::UpdateRange => "update range",
            Self::Remove => "remove",
            Self::RemoveRange => "remove range",
            Self::Move => "move",
            Self::Clear => "clear",
            Self::Access => "access",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`crate::LayoutEngine`] for a single item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutError {
    message: String,
}

impl LayoutError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layout failed: {}", self.message)
    }
}

impl std::error::Error for LayoutError {}

#[derive(Clone, Debug, PartialEq)]
pub enum BinderError {
    /// A mutation or query named a position outside the list.
    ///
    /// This usually means the backing data was mutated or contains duplicates; positions are
    /// never clamped.
    IndexOutOfBounds {
        op: OpKind,
        position: usize,
        count: usize,
        size: usize,
    },
    /// The surface was measured with a constraint the binder cannot honor.
    InvalidConstraint {
        constraint: SizeConstraint,
        reason: &'static str,
    },
    /// The surface stayed mid relayout for longer than the retry bound.
    RetryExhausted {
        retries: u32,
        pending_batches: usize,
        surface_attached: bool,
        surface_computing_layout: bool,
    },
    /// Layout of a single item failed.
    Layout {
        index: Option<usize>,
        error: LayoutError,
    },
}

impl fmt::Display for BinderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfBounds {
                op,
                position,
                count,
                size,
            } => write!(
                f,
                "index out of bounds: {op} at {position} (count {count}) on a list of size {size}; \
                 check the backing data for duplicates or concurrent modification"
            ),
            Self::InvalidConstraint { constraint, reason } => {
                write!(f, "invalid measure constraint {constraint:?}: {reason}")
            }
            Self::RetryExhausted {
                retries,
                pending_batches,
                surface_attached,
                surface_computing_layout,
            } => write!(
                f,
                "gave up applying batches after {retries} frames \
                 (pending_batches={pending_batches}, surface_attached={surface_attached}, \
                 surface_computing_layout={surface_computing_layout})"
            ),
            Self::Layout {
                index: Some(index),
                error,
            } => write!(f, "item {index}: {error}"),
            Self::Layout { index: None, error } => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for BinderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Layout { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Reports a programmer error that cannot be recovered from at runtime.
#[track_caller]
pub(crate) fn protocol_violation(message: &str) -> ! {
    verror!(detail = message, "protocol violation");
    panic!("listbinder protocol violation: {message}")
}
