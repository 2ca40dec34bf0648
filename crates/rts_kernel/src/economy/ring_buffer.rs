//! Fixed-capacity FIFO ring.

/// A queue that never grows past its capacity.
#[derive(Debug, Clone)]
pub struct FixedRing<T> {
    slots: Vec<Option<T>>,
    head: usize,
    len: usize,
}

impl<T> FixedRing<T> {
    /// Create an empty ring holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of items.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the ring holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the ring is at capacity.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Append an item, handing it back if the ring is full.
    pub fn push_back(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        let slot = self.physical(self.len);
        self.slots[slot] = Some(value);
        self.len += 1;
        Ok(())
    }

    /// Oldest item.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    /// Mutable oldest item.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        if self.is_empty() {
            return None;
        }
        let slot = self.head;
        self.slots[slot].as_mut()
    }

    /// Remove the oldest item.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        value
    }

    /// Item at queue position `index`, 0 being the oldest.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        self.slots[self.physical(index)].as_ref()
    }

    /// Remove the item at queue position `index`, closing the gap.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.len {
            return None;
        }
        if index == 0 {
            return self.pop_front();
        }
        let at = self.physical(index);
        let removed = self.slots[at].take();
        for position in index..self.len - 1 {
            let from = self.physical(position + 1);
            let next = self.slots[from].take();
            let slot = self.physical(position);
            self.slots[slot] = next;
        }
        self.len -= 1;
        removed
    }

    /// Items from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |index| self.get(index))
    }

    fn physical(&self, index: usize) -> usize {
        (self.head + index) % self.capacity()
    }
}
