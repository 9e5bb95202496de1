use crate::media::CapturedItem;
use std::collections::VecDeque;
use tracing::{debug, trace};
use uuid::Uuid;

/// Bounded, ordered collection of captured items with per-item selection
/// state. Insertion order is preserved; when full, the oldest item is
/// evicted first (FIFO), never an arbitrary one.
pub struct ItemBuffer {
    items: VecDeque<CapturedItem>,
    capacity: usize,
    stats: ItemBufferStats,
}

/// Counters for buffer activity monitoring
#[derive(Debug, Clone, Default)]
pub struct ItemBufferStats {
    /// Total items added over the buffer's lifetime
    pub items_added: u64,
    /// Items dropped because the buffer was full
    pub evictions: u64,
}

impl ItemBuffer {
    /// Create a new item buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Item buffer capacity must be greater than 0");

        debug!("Created item buffer with capacity {}", capacity);

        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            stats: ItemBufferStats::default(),
        }
    }

    /// Add an item, evicting the oldest one first if the buffer is full.
    /// The new item is auto-selected by its constructor. Returns the
    /// evicted item, if any, so the caller can surface the drop.
    pub fn add(&mut self, item: CapturedItem) -> Option<CapturedItem> {
        let evicted = if self.items.len() == self.capacity {
            let oldest = self.items.pop_front();
            if let Some(ref old) = oldest {
                self.stats.evictions += 1;
                trace!("Buffer full; evicting oldest item {}", old.id);
            }
            oldest
        } else {
            None
        };

        trace!("Adding item {} ({:?})", item.id, item.kind);
        self.items.push_back(item);
        self.stats.items_added += 1;

        evicted
    }

    /// Toggle the selection state of one item. Unknown ids are ignored.
    pub fn toggle_select(&mut self, id: Uuid) {
        if let Some(item) = self.items.iter_mut().find(|i| i.id == id) {
            item.selected = !item.selected;
            trace!("Item {} selection toggled to {}", id, item.selected);
        }
    }

    /// Select every item
    pub fn select_all(&mut self) {
        for item in self.items.iter_mut() {
            item.selected = true;
        }
    }

    /// Deselect every item
    pub fn deselect_all(&mut self) {
        for item in self.items.iter_mut() {
            item.selected = false;
        }
    }

    /// Remove one item by id. Returns the removed item, if present.
    pub fn remove(&mut self, id: Uuid) -> Option<CapturedItem> {
        let index = self.items.iter().position(|i| i.id == id)?;
        let removed = self.items.remove(index);
        if removed.is_some() {
            trace!("Removed item {}", id);
        }
        removed
    }

    /// Drop every item
    pub fn clear(&mut self) {
        debug!("Clearing item buffer ({} items)", self.items.len());
        self.items.clear();
    }

    /// All items in insertion order
    pub fn items(&self) -> impl Iterator<Item = &CapturedItem> {
        self.items.iter()
    }

    /// Selected items in insertion order
    pub fn selected(&self) -> Vec<&CapturedItem> {
        self.items.iter().filter(|i| i.selected).collect()
    }

    /// Number of selected items
    pub fn selected_count(&self) -> usize {
        self.items.iter().filter(|i| i.selected).count()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get current buffer statistics
    pub fn stats(&self) -> ItemBufferStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{ItemMetadata, MediaKind, MediaPayload};

    fn test_item(name: &str) -> CapturedItem {
        CapturedItem::new(
            MediaKind::Photo,
            name.to_string(),
            MediaPayload::new(vec![0u8; 64], 640, 480),
            MediaPayload::new(vec![0u8; 128], 1920, 1080),
            MediaPayload::new(vec![0u8; 16], 160, 120),
            ItemMetadata::default(),
        )
    }

    #[test]
    fn test_add_and_order() {
        let mut buffer = ItemBuffer::new(15);
        for i in 0..5 {
            buffer.add(test_item(&format!("Item {}", i)));
        }

        assert_eq!(buffer.len(), 5);
        let names: Vec<_> = buffer.items().map(|i| i.name.clone()).collect();
        assert_eq!(names, ["Item 0", "Item 1", "Item 2", "Item 3", "Item 4"]);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let mut buffer = ItemBuffer::new(15);
        for i in 0..40 {
            buffer.add(test_item(&format!("Item {}", i)));
            assert!(buffer.len() <= 15);
        }
        assert_eq!(buffer.len(), 15);
        assert_eq!(buffer.stats().items_added, 40);
        assert_eq!(buffer.stats().evictions, 25);
    }

    #[test]
    fn test_sixteenth_add_evicts_first_item_only() {
        // Scenario: a full 15-item buffer receives one more item
        let mut buffer = ItemBuffer::new(15);
        for i in 1..=15 {
            buffer.add(test_item(&format!("Item {}", i)));
        }

        let evicted = buffer.add(test_item("Item 16"));

        assert_eq!(evicted.unwrap().name, "Item 1");
        assert_eq!(buffer.len(), 15);
        let names: Vec<_> = buffer.items().map(|i| i.name.clone()).collect();
        let expected: Vec<_> = (2..=16).map(|i| format!("Item {}", i)).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_eviction_is_fifo_among_survivors() {
        let mut buffer = ItemBuffer::new(3);
        for i in 0..3 {
            buffer.add(test_item(&format!("Item {}", i)));
        }
        // Removing the middle item must not change who gets evicted next
        let middle_id = buffer.items().nth(1).unwrap().id;
        buffer.remove(middle_id);
        buffer.add(test_item("Item 3"));
        let evicted = buffer.add(test_item("Item 4")).unwrap();

        assert_eq!(evicted.name, "Item 0");
    }

    #[test]
    fn test_new_item_is_auto_selected() {
        let mut buffer = ItemBuffer::new(5);
        buffer.deselect_all();
        buffer.add(test_item("Item"));
        assert_eq!(buffer.selected_count(), 1);
    }

    #[test]
    fn test_selection_operations() {
        let mut buffer = ItemBuffer::new(5);
        for i in 0..3 {
            buffer.add(test_item(&format!("Item {}", i)));
        }

        buffer.deselect_all();
        assert_eq!(buffer.selected_count(), 0);

        buffer.select_all();
        assert_eq!(buffer.selected_count(), 3);

        let id = buffer.items().next().unwrap().id;
        buffer.toggle_select(id);
        assert_eq!(buffer.selected_count(), 2);
        buffer.toggle_select(id);
        assert_eq!(buffer.selected_count(), 3);

        // Toggling an unknown id is a no-op
        buffer.toggle_select(Uuid::new_v4());
        assert_eq!(buffer.selected_count(), 3);
    }

    #[test]
    fn test_selected_preserves_insertion_order() {
        let mut buffer = ItemBuffer::new(5);
        for i in 0..4 {
            buffer.add(test_item(&format!("Item {}", i)));
        }
        let second = buffer.items().nth(1).unwrap().id;
        buffer.toggle_select(second);

        let selected: Vec<_> = buffer.selected().iter().map(|i| i.name.clone()).collect();
        assert_eq!(selected, ["Item 0", "Item 2", "Item 3"]);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut buffer = ItemBuffer::new(5);
        let item = test_item("Item");
        let id = item.id;
        buffer.add(item);

        assert!(buffer.remove(id).is_some());
        assert!(buffer.remove(id).is_none());
        assert!(buffer.is_empty());

        buffer.add(test_item("A"));
        buffer.add(test_item("B"));
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_panics() {
        ItemBuffer::new(0);
    }
}
