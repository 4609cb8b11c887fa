//! Mutation queue and batch processor.
//!
//! Asynchronous mutations are recorded as [`Operation`]s into an open batch. Closing the batch
//! pushes it onto a FIFO of pending batches; the binder pops batches from the front, in order,
//! as soon as each one satisfies its [`CommitPolicy`].
//!
//! Positions are validated twice: at submission against the length the list will have once
//! every queued operation is applied, and again at application against the live list.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::entry::{ItemEntry, LayoutEngine, RenderInfo};
use crate::{BinderError, OpKind};

/// When a closed batch may be applied to the live list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CommitPolicy {
    /// As soon as the surface is not mid relayout.
    #[default]
    Immediate,
    /// Only once every inserted item has finished its layout.
    LayoutBeforeInsert,
}

/// Summary passed to a batch's completion callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub is_data_changed: bool,
    pub applied: usize,
    pub failed: usize,
}

pub type BatchCallback = Box<dyn FnOnce(BatchOutcome) + Send + 'static>;

pub(crate) enum Operation<E: LayoutEngine> {
    Insert {
        position: usize,
        entry: Arc<ItemEntry<E>>,
    },
    InsertRange {
        position: usize,
        entries: Vec<Arc<ItemEntry<E>>>,
    },
    Update {
        position: usize,
        info: RenderInfo<E::Content>,
    },
    UpdateRange {
        position: usize,
        infos: Vec<RenderInfo<E::Content>>,
    },
    Remove {
        position: usize,
    },
    RemoveRange {
        position: usize,
        count: usize,
    },
    Move {
        from: usize,
        to: usize,
    },
    Clear,
}

impl<E: LayoutEngine> Operation<E> {
    /// Checks positions against a list of `size` items and returns the size afterwards.
    pub(crate) fn validate(&self, size: usize) -> Result<usize, BinderError> {
        let oob = |op: OpKind, position: usize, count: usize| BinderError::IndexOutOfBounds {
            op,
            position,
            count,
            size,
        };
        match self {
            Self::Insert { position, .. } => {
                if *position > size {
                    return Err(oob(OpKind::Insert, *position, 1));
                }
                Ok(size + 1)
            }
            Self::InsertRange { position, entries } => {
                if *position > size {
                    return Err(oob(OpKind::InsertRange, *position, entries.len()));
                }
                Ok(size + entries.len())
            }
            Self::Update { position, .. } => {
                if *position >= size {
                    return Err(oob(OpKind::Update, *position, 1));
                }
                Ok(size)
            }
            Self::UpdateRange { position, infos } => {
                let end = position.checked_add(infos.len());
                if end.is_none_or(|end| end > size) || (*position >= size && !infos.is_empty()) {
                    return Err(oob(OpKind::UpdateRange, *position, infos.len()));
                }
                Ok(size)
            }
            Self::Remove { position } => {
                if *position >= size {
                    return Err(oob(OpKind::Remove, *position, 1));
                }
                Ok(size - 1)
            }
            Self::RemoveRange { position, count } => {
                let end = position.checked_add(*count);
                if end.is_none_or(|end| end > size) || (*position >= size && *count > 0) {
                    return Err(oob(OpKind::RemoveRange, *position, *count));
                }
                Ok(size - count)
            }
            Self::Move { from, to } => {
                if *from >= size {
                    return Err(oob(OpKind::Move, *from, 1));
                }
                if *to >= size {
                    return Err(oob(OpKind::Move, *to, 1));
                }
                Ok(size)
            }
            Self::Clear => Ok(0),
        }
    }

    pub(crate) fn inserted_entries(&self) -> &[Arc<ItemEntry<E>>] {
        match self {
            Self::Insert { entry, .. } => core::slice::from_ref(entry),
            Self::InsertRange { entries, .. } => entries,
            _ => &[],
        }
    }
}

/// What applying an operation did to the live list.
pub(crate) enum Change<E: LayoutEngine> {
    Inserted {
        position: usize,
        count: usize,
    },
    Changed {
        position: usize,
        count: usize,
    },
    Removed {
        position: usize,
        removed: Vec<Arc<ItemEntry<E>>>,
    },
    Moved {
        from: usize,
        to: usize,
    },
}

/// Applies `op` to `entries`, leaving them untouched when a position is out of bounds.
pub(crate) fn apply_operation<E: LayoutEngine>(
    entries: &mut Vec<Arc<ItemEntry<E>>>,
    op: Operation<E>,
) -> Result<Change<E>, BinderError> {
    op.validate(entries.len())?;
    let change = match op {
        Operation::Insert { position, entry } => {
            entries.insert(position, entry);
            Change::Inserted { position, count: 1 }
        }
        Operation::InsertRange {
            position,
            entries: inserted,
        } => {
            let count = inserted.len();
            entries.splice(position..position, inserted);
            Change::Inserted { position, count }
        }
        Operation::Update { position, info } => {
            entries[position].set_render_info(info);
            Change::Changed { position, count: 1 }
        }
        Operation::UpdateRange { position, infos } => {
            let count = infos.len();
            for (entry, info) in entries[position..position + count].iter().zip(infos) {
                entry.set_render_info(info);
            }
            Change::Changed { position, count }
        }
        Operation::Remove { position } => Change::Removed {
            position,
            removed: vec![entries.remove(position)],
        },
        Operation::RemoveRange { position, count } => Change::Removed {
            position,
            removed: entries.drain(position..position + count).collect(),
        },
        Operation::Move { from, to } => {
            let entry = entries.remove(from);
            entries.insert(to, entry);
            Change::Moved { from, to }
        }
        Operation::Clear => Change::Removed {
            position: 0,
            removed: core::mem::take(entries),
        },
    };
    Ok(change)
}

pub(crate) struct Batch<E: LayoutEngine> {
    pub(crate) ops: Vec<Operation<E>>,
    pub(crate) is_data_changed: bool,
    pub(crate) on_complete: Option<BatchCallback>,
    pub(crate) policy: CommitPolicy,
}

impl<E: LayoutEngine> Batch<E> {
    pub(crate) fn inserted_entries(&self) -> impl Iterator<Item = &Arc<ItemEntry<E>>> {
        self.ops.iter().flat_map(|op| op.inserted_entries())
    }
}

/// The open batch plus the FIFO of closed, not yet applied batches.
pub(crate) struct MutationQueue<E: LayoutEngine> {
    open: Vec<Operation<E>>,
    pending: VecDeque<Batch<E>>,
    /// List length once every queued operation is applied.
    projected_len: usize,
}

impl<E: LayoutEngine> MutationQueue<E> {
    pub(crate) fn new() -> Self {
        Self {
            open: Vec::new(),
            pending: VecDeque::new(),
            projected_len: 0,
        }
    }

    pub(crate) fn set_projected_len(&mut self, len: usize) {
        debug_assert!(
            self.open.is_empty() && self.pending.is_empty(),
            "projected length can only be reset while the queue is empty"
        );
        self.projected_len = len;
    }

    /// Validates `op` against the projected list and appends it to the open batch.
    pub(crate) fn enqueue(&mut self, op: Operation<E>) -> Result<(), BinderError> {
        self.projected_len = op.validate(self.projected_len)?;
        self.open.push(op);
        Ok(())
    }

    pub(crate) fn open_len(&self) -> usize {
        self.open.len()
    }

    pub(crate) fn close_batch(
        &mut self,
        is_data_changed: bool,
        on_complete: Option<BatchCallback>,
        policy: CommitPolicy,
    ) {
        let ops = core::mem::take(&mut self.open);
        vdebug!(ops = ops.len(), is_data_changed, "close_batch");
        self.pending.push_back(Batch {
            ops,
            is_data_changed,
            on_complete,
            policy,
        });
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn front(&self) -> Option<&Batch<E>> {
        self.pending.front()
    }

    pub(crate) fn pop_front(&mut self) -> Option<Batch<E>> {
        self.pending.pop_front()
    }

    /// Entries inserted by any queued operation, open batch included.
    pub(crate) fn inserted_entries(&self) -> impl Iterator<Item = &Arc<ItemEntry<E>>> {
        self.pending
            .iter()
            .flat_map(|b| b.inserted_entries())
            .chain(self.open.iter().flat_map(|op| op.inserted_entries()))
    }
}
