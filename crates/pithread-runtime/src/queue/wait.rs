//! Wait queue
//!
//! Parked threads live in one of two zones:
//!
//! ```text
//!   old:    [oldest ............ youngest]   <- push_old, max_active_reset
//!   active: [oldest ............ youngest]   <- push
//! ```
//!
//! Both zones are FIFO: new entries go to the back, `pop_old` takes the
//! front of the old zone. `max_active_reset` appends the whole active
//! zone after the old one, so relative order is kept across rotation.

use super::Keyed;
use pithread_core::SpinLock;
use std::collections::VecDeque;

struct Zones<T> {
    active: VecDeque<T>,
    old: VecDeque<T>,
}

/// Parked work, fetched by identity when a partner matches it
pub struct WaitQueue<T> {
    zones: SpinLock<Zones<T>>,
}

impl<T: Keyed> WaitQueue<T> {
    pub fn new() -> Self {
        Self {
            zones: SpinLock::new(Zones { active: VecDeque::new(), old: VecDeque::new() }),
        }
    }

    /// Park in the active zone
    pub fn push(&self, item: T) {
        self.zones.lock().active.push_back(item);
    }

    /// Put back into the old zone (sweep survivors)
    pub fn push_old(&self, item: T) {
        self.zones.lock().old.push_back(item);
    }

    /// Remove a specific entry, searching active then old
    pub fn fetch(&self, key: &T::Key) -> Option<T> {
        let mut z = self.zones.lock();
        if let Some(pos) = z.active.iter().position(|t| t.key() == *key) {
            return z.active.remove(pos);
        }
        let pos = z.old.iter().position(|t| t.key() == *key)?;
        z.old.remove(pos)
    }

    /// Remove the oldest entry of the old zone
    pub fn pop_old(&self) -> Option<T> {
        self.zones.lock().old.pop_front()
    }

    /// Remove the oldest old entry for which `f` yields a value
    ///
    /// `f` runs under the queue lock, so nobody can fetch the entry while
    /// it is being inspected.
    pub fn take_old<R, F>(&self, mut f: F) -> Option<(T, R)>
    where
        F: FnMut(&T) -> Option<R>,
    {
        let mut z = self.zones.lock();
        let (pos, r) = z.old.iter().enumerate().find_map(|(i, t)| f(t).map(|r| (i, r)))?;
        z.old.remove(pos).map(|t| (t, r))
    }

    /// Move every active entry to the back of the old zone
    pub fn max_active_reset(&self) -> usize {
        let mut z = self.zones.lock();
        let moved = z.active.len();
        let Zones { active, old } = &mut *z;
        old.append(active);
        moved
    }

    pub fn size(&self) -> usize {
        let z = self.zones.lock();
        z.active.len() + z.old.len()
    }

    pub fn active_len(&self) -> usize {
        self.zones.lock().active.len()
    }

    pub fn old_len(&self) -> usize {
        self.zones.lock().old.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Remove everything, old zone first
    pub fn drain(&self) -> Vec<T> {
        let mut z = self.zones.lock();
        let mut items: Vec<T> = z.old.drain(..).collect();
        items.extend(z.active.drain(..));
        items
    }
}

impl<T: Keyed> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl Keyed for u32 {
        type Key = u32;

        fn key(&self) -> u32 {
            *self
        }
    }

    fn contents(q: &WaitQueue<u32>) -> (Vec<u32>, Vec<u32>) {
        let z = q.zones.lock();
        (z.active.iter().copied().collect(), z.old.iter().copied().collect())
    }

    #[test]
    fn test_reset_keeps_order() {
        let q = WaitQueue::new();
        q.push_old(1);
        q.push_old(2);
        q.push(3);
        q.push(4);
        q.push(5);
        assert_eq!(q.max_active_reset(), 3);
        let (active, old) = contents(&q);
        assert!(active.is_empty());
        assert_eq!(old, vec![1, 2, 3, 4, 5]);
        assert_eq!(q.active_len(), 0);
        assert_eq!(q.size(), 5);
    }

    #[test]
    fn test_pop_old_oldest_first() {
        let q = WaitQueue::new();
        q.push(10);
        q.push(11);
        assert_eq!(q.pop_old(), None);
        q.max_active_reset();
        q.push(12);
        assert_eq!(q.pop_old(), Some(10));
        assert_eq!(q.pop_old(), Some(11));
        assert_eq!(q.pop_old(), None);
        assert_eq!(q.active_len(), 1);
    }

    #[test]
    fn test_fetch_either_zone() {
        let q = WaitQueue::new();
        q.push(1);
        q.push_old(2);
        q.push(3);
        assert_eq!(q.fetch(&2), Some(2));
        assert_eq!(q.fetch(&2), None);
        assert_eq!(q.fetch(&3), Some(3));
        assert_eq!(q.size(), 1);
        assert_eq!(contents(&q), (vec![1], vec![]));
    }

    #[test]
    fn test_take_old_skips_refused() {
        let q = WaitQueue::new();
        for i in 1..=4 {
            q.push_old(i);
        }
        let got = q.take_old(|&t| if t % 2 == 0 { Some(t * 10) } else { None });
        assert_eq!(got, Some((2, 20)));
        assert_eq!(contents(&q).1, vec![1, 3, 4]);
        assert_eq!(q.take_old(|_| None::<()>), None);
    }

    #[test]
    fn test_drain_old_first() {
        let q = WaitQueue::new();
        q.push(3);
        q.push_old(1);
        q.push_old(2);
        assert_eq!(q.drain(), vec![1, 2, 3]);
        assert!(q.is_empty());
    }
}
