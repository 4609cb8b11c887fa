/// The display surface a binder is mounted on (a recycling list view or equivalent).
///
/// Every method is called on the UI thread, and never while the binder holds its internal lock,
/// so implementations may call back into the binder (e.g. `Binder::bind_item` from a
/// notification).
///
/// Scroll changes reach the binder through [`crate::Binder::on_scrolled`], which the surface
/// calls after it moved.
pub trait Surface: Send + Sync {
    fn attach(&self);

    fn detach(&self);

    fn scroll_to_index(&self, index: usize, offset: i32);

    fn first_visible_index(&self) -> Option<usize>;

    fn last_visible_index(&self) -> Option<usize>;

    fn first_fully_visible_index(&self) -> Option<usize> {
        self.first_visible_index()
    }

    fn last_fully_visible_index(&self) -> Option<usize> {
        self.last_visible_index()
    }

    /// Offset of the first visible item's leading edge from the surface's leading edge.
    fn first_visible_offset(&self) -> i32 {
        0
    }

    /// Whether the surface is in the middle of a relayout and cannot take mutations right now.
    fn is_computing_layout(&self) -> bool {
        false
    }

    fn notify_item_range_inserted(&self, _position: usize, _count: usize) {}

    fn notify_item_range_changed(&self, _position: usize, _count: usize) {}

    fn notify_item_range_removed(&self, _position: usize, _count: usize) {}

    fn notify_item_moved(&self, _from: usize, _to: usize) {}

    fn notify_data_set_changed(&self) {}

    /// The binder's own size may have changed; measure it again.
    fn request_layout(&self) {}
}
