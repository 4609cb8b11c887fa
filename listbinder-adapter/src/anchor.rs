use listbinder::{Binder, LayoutEngine};

/// A scroll anchor that can be used to preserve visual position across data changes.
///
/// Unlike the index-based position a binder saves on unmount, an anchor follows the item's
/// identity, so it survives inserts above the anchored item. Typical use cases:
/// - chat/timeline "prepend" (load older messages above) without content jumping
/// - replacing the data set with one that shares stable ids
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScrollAnchor {
    pub id: u64,
    /// Distance of the anchored item's leading edge from the surface's leading edge.
    pub offset: i32,
}

/// Captures an anchor for the first visible item.
///
/// Returns `None` when nothing is visible (or, unmounted, no position was saved).
pub fn capture_first_visible_anchor<E: LayoutEngine>(binder: &Binder<E>) -> Option<ScrollAnchor> {
    let position = binder.scroll_position()?;
    let id = binder.item_id(position.index)?;
    Some(ScrollAnchor {
        id,
        offset: position.offset,
    })
}

/// Scrolls back to a previously captured anchor.
///
/// Call on the UI thread after the data change has been applied. Returns `true` when the
/// anchored item is still in the list.
pub fn apply_anchor<E: LayoutEngine>(binder: &Binder<E>, anchor: &ScrollAnchor) -> bool {
    let Some(index) = binder.index_of_id(anchor.id) else {
        vdebug!(id = anchor.id, "anchor item is gone");
        return false;
    };
    binder.scroll_to_position(index, anchor.offset);
    true
}
