//! Min-ordered priority queue of bar handles.
//!
//! The container pops bars in ascending priority to decide render order. Elements record their
//! own heap position (see [`Prioritized::set_index`]) so that removal and re-prioritisation can
//! jump straight to the element instead of scanning.

/// A handle that can live in a [`PriorityQueue`].
///
/// Priority and index use interior mutability because the handle is shared with callers;
/// only the thread owning the queue writes them.
pub(crate) trait Prioritized {
    /// Ordering key, lower values pop first.
    fn priority(&self) -> i64;
    /// Overwrites the ordering key.
    fn set_priority(&self, priority: i64);
    /// Current position in the heap, `None` when not queued.
    fn index(&self) -> Option<usize>;
    /// Records the position in the heap.
    fn set_index(&self, index: Option<usize>);
    /// Identity comparison, two handles to the same element.
    fn same(&self, other: &Self) -> bool;
}

/// Binary min-heap keyed by [`Prioritized::priority`].
///
/// Ties are not ordered by insertion.
pub(crate) struct PriorityQueue<T> {
    items: Vec<T>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Prioritized> PriorityQueue<T> {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates in heap order, not priority order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub(crate) fn push(&mut self, item: T) {
        let i = self.items.len();
        item.set_index(Some(i));
        self.items.push(item);
        self.sift_up(i);
    }

    /// Removes and returns the element with the lowest priority.
    pub(crate) fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let last = self.items.len() - 1;
        self.swap(0, last);
        let item = self.items.pop()?;
        item.set_index(None);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(item)
    }

    /// Removes `item` using its recorded position.
    ///
    /// Returns `None` if it is not queued here.
    pub(crate) fn remove(&mut self, item: &T) -> Option<T> {
        let i = self.locate(item)?;
        let last = self.items.len() - 1;
        if i != last {
            self.swap(i, last);
        }
        let removed = self.items.pop()?;
        removed.set_index(None);
        if i < self.items.len() {
            self.fix(i);
        }
        Some(removed)
    }

    /// Changes the priority of a queued `item` and restores heap order.
    ///
    /// Returns `false` if it is not queued here.
    pub(crate) fn update(&mut self, item: &T, priority: i64) -> bool {
        let Some(i) = self.locate(item) else {
            return false;
        };
        self.items[i].set_priority(priority);
        self.fix(i);
        true
    }

    pub(crate) fn contains(&self, item: &T) -> bool {
        self.locate(item).is_some()
    }

    fn locate(&self, item: &T) -> Option<usize> {
        let i = item.index()?;
        self.items
            .get(i)
            .filter(|queued| queued.same(item))
            .map(|_| i)
    }

    fn fix(&mut self, i: usize) {
        if !self.sift_down(i) {
            self.sift_up(i);
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        self.items[a].priority() < self.items[b].priority()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.items.swap(a, b);
        self.items[a].set_index(Some(a));
        self.items[b].set_index(Some(b));
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    /// Returns whether the element moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let n = self.items.len();
        let mut i = start;
        loop {
            let left = 2 * i + 1;
            if left >= n {
                break;
            }
            let mut child = left;
            let right = left + 1;
            if right < n && self.less(right, left) {
                child = right;
            }
            if !self.less(child, i) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
        i > start
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc};

    use super::{PriorityQueue, Prioritized};

    struct Item {
        name: &'static str,
        priority: Cell<i64>,
        index: Cell<Option<usize>>,
    }

    fn item(name: &'static str, priority: i64) -> Rc<Item> {
        Rc::new(Item {
            name,
            priority: Cell::new(priority),
            index: Cell::new(None),
        })
    }

    impl Prioritized for Rc<Item> {
        fn priority(&self) -> i64 {
            self.priority.get()
        }
        fn set_priority(&self, priority: i64) {
            self.priority.set(priority);
        }
        fn index(&self) -> Option<usize> {
            self.index.get()
        }
        fn set_index(&self, index: Option<usize>) {
            self.index.set(index);
        }
        fn same(&self, other: &Self) -> bool {
            Rc::ptr_eq(self, other)
        }
    }

    fn drain(q: &mut PriorityQueue<Rc<Item>>) -> Vec<&'static str> {
        std::iter::from_fn(|| q.pop()).map(|i| i.name).collect()
    }

    /// Ordering
    /// Pops come out in ascending priority regardless of push order.
    #[test]
    fn test_pop_in_priority_order() {
        let mut q = PriorityQueue::new();
        for (name, p) in [("c", 7), ("a", 1), ("e", 12), ("b", 3), ("d", 9)] {
            q.push(item(name, p));
        }
        assert_eq!(q.len(), 5);
        assert_eq!(drain(&mut q), ["a", "b", "c", "d", "e"]);
        assert!(q.is_empty());
    }

    /// Remove by Handle
    /// Removal uses the recorded index, clears it, and rejects foreign handles.
    #[test]
    fn test_remove_by_handle() {
        let mut q = PriorityQueue::new();
        let items: Vec<_> = [("a", 4), ("b", 2), ("c", 8), ("d", 1), ("e", 6)]
            .into_iter()
            .map(|(n, p)| item(n, p))
            .collect();
        for i in &items {
            q.push(i.clone());
        }

        let removed = q.remove(&items[0]).expect("queued item is removable");
        assert_eq!(removed.name, "a");
        assert_eq!(items[0].index(), None);
        assert!(q.remove(&items[0]).is_none(), "second removal fails");

        let stranger = item("x", 0);
        stranger.set_index(Some(0));
        assert!(q.remove(&stranger).is_none(), "index alone is not identity");

        assert_eq!(drain(&mut q), ["d", "b", "e", "c"]);
    }

    /// Update Priority
    /// Moving an element up or down takes effect on the next pops, and repeating is stable.
    #[test]
    fn test_update_priority() {
        let mut q = PriorityQueue::new();
        let a = item("a", 0);
        let b = item("b", 1);
        let c = item("c", 2);
        for i in [&a, &b, &c] {
            q.push(i.clone());
        }

        assert!(q.update(&a, 5));
        assert!(q.update(&a, 5));
        assert!(q.update(&c, -1));

        let order = drain(&mut q);
        assert_eq!(order, ["c", "b", "a"]);
        assert!(!q.update(&a, 0), "unqueued handles are rejected");
    }

    /// Index Bookkeeping
    /// After arbitrary churn every queued element's recorded index points at itself.
    #[test]
    fn test_indices_stay_consistent() {
        let mut q = PriorityQueue::new();
        let items: Vec<_> = (0..32).map(|i| item("n", (i * 37) % 19)).collect();
        for i in &items {
            q.push(i.clone());
        }
        for i in items.iter().step_by(3) {
            q.remove(i);
        }
        for (n, i) in items.iter().enumerate().skip(1).step_by(4) {
            q.update(i, -(n as i64));
        }
        q.pop();

        for (pos, queued) in q.iter().enumerate() {
            assert_eq!(queued.index(), Some(pos));
        }

        let mut last = i64::MIN;
        while let Some(i) = q.pop() {
            assert!(i.priority() >= last);
            last = i.priority();
        }
    }
}
