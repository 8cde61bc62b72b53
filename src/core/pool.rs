//! Bounded recycling pool for expensive backend objects (players, renderers).
//!
//! The pool owns every object it ever created. Callers hold an [`ObjectId`]
//! handle while an object is checked out and reach the object through
//! [`ResourcePool::get_mut`]. This makes a second `release` of the same
//! handle detectable: it is a caller bug and comes back as an error.
//!
//! Structure:
//! - `idle`: released objects, LRU ordered, bounded by capacity
//! - `checked_out`: objects currently owned by exactly one caller
//!
//! When `idle` is full a release evicts and destroys the least recently
//! released resident. Checked-out objects are never evicted.

use log::{debug, error, trace};
use lru::LruCache;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::num::NonZeroUsize;

use crate::entities::{ObjectId, PoolFactory};
use crate::error::{Error, Result};

struct Entry<K, T> {
    key: K,
    item: T,
}

pub struct ResourcePool<K, T> {
    name: String,
    capacity: NonZeroUsize,
    factory: Box<dyn PoolFactory<K, T>>,
    idle: LruCache<ObjectId, Entry<K, T>>,
    checked_out: HashMap<ObjectId, Entry<K, T>>,
    next_id: u64,
}

impl<K, T> ResourcePool<K, T>
where
    K: Clone + Eq + Hash + Debug,
{
    /// Create a pool holding at most `capacity` idle objects.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        factory: Box<dyn PoolFactory<K, T>>,
    ) -> Result<Self> {
        let name = name.into();
        let Some(cap) = NonZeroUsize::new(capacity) else {
            error!("ResourcePool '{}': capacity must be positive", name);
            return Err(Error::InvalidPoolCapacity(capacity));
        };
        debug!("ResourcePool '{}' created: capacity={}", name, capacity);
        Ok(Self {
            name,
            capacity: cap,
            factory,
            idle: LruCache::new(cap),
            checked_out: HashMap::new(),
            next_id: 1,
        })
    }

    /// Check out an object compatible with `key`, reusing the most recently
    /// released one if possible. `None` when the factory cannot create one.
    pub fn acquire(&mut self, key: &K) -> Option<ObjectId> {
        let resident = self
            .idle
            .iter()
            .find(|(_, entry)| &entry.key == key)
            .map(|(id, _)| *id);

        let (id, entry) = match resident {
            Some(id) => {
                let entry = self.idle.pop(&id)?;
                trace!("ResourcePool '{}': reuse {} for {:?}", self.name, id, key);
                (id, entry)
            }
            None => {
                let Some(item) = self.factory.create(key) else {
                    debug!("ResourcePool '{}': factory could not create {:?}", self.name, key);
                    return None;
                };
                let id = ObjectId(self.next_id);
                self.next_id += 1;
                trace!("ResourcePool '{}': created {} for {:?}", self.name, id, key);
                (
                    id,
                    Entry {
                        key: key.clone(),
                        item,
                    },
                )
            }
        };
        self.checked_out.insert(id, entry);
        Some(id)
    }

    /// Return a checked-out object. Releasing anything that is not checked
    /// out (including a second release) is an error.
    pub fn release(&mut self, id: ObjectId) -> Result<()> {
        let Some(mut entry) = self.checked_out.remove(&id) else {
            error!("ResourcePool '{}': release of {} which is not checked out", self.name, id);
            return Err(Error::NotCheckedOut(id));
        };

        if !self.factory.recyclable(&entry.key) {
            trace!("ResourcePool '{}': {} not recyclable, destroying", self.name, id);
            self.factory.destroy(entry.item);
            return Ok(());
        }

        self.factory.reset(&mut entry.item);
        if let Some((evicted_id, evicted)) = self.idle.push(id, entry) {
            debug!(
                "ResourcePool '{}': full ({}), evicting {}",
                self.name, self.capacity, evicted_id
            );
            self.factory.destroy(evicted.item);
        }
        Ok(())
    }

    pub fn get(&self, id: ObjectId) -> Option<&T> {
        self.checked_out.get(&id).map(|e| &e.item)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut T> {
        self.checked_out.get_mut(&id).map(|e| &mut e.item)
    }

    pub fn is_checked_out(&self, id: ObjectId) -> bool {
        self.checked_out.contains_key(&id)
    }

    /// Destroy every idle object. Checked-out objects are untouched.
    pub fn clear(&mut self) {
        let count = self.idle.len();
        while let Some((_, entry)) = self.idle.pop_lru() {
            self.factory.destroy(entry.item);
        }
        if count > 0 {
            debug!("ResourcePool '{}': cleared {} idle", self.name, count);
        }
    }

    pub fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub fn checked_out_len(&self) -> usize {
        self.checked_out.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<K, T> Drop for ResourcePool<K, T> {
    fn drop(&mut self) {
        while let Some((_, entry)) = self.idle.pop_lru() {
            self.factory.destroy(entry.item);
        }
        if !self.checked_out.is_empty() {
            debug!(
                "ResourcePool '{}' dropped with {} checked out",
                self.name,
                self.checked_out.len()
            );
        }
    }
}

impl<K, T> std::fmt::Debug for ResourcePool<K, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("idle", &self.idle.len())
            .field("checked_out", &self.checked_out.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, PartialEq)]
    struct Item(u32);

    #[derive(Default)]
    struct Tracker {
        created: u32,
        destroyed: Vec<u32>,
        resets: u32,
    }

    struct TrackingFactory {
        tracker: Rc<RefCell<Tracker>>,
        fail: bool,
    }

    impl PoolFactory<&'static str, Item> for TrackingFactory {
        fn create(&mut self, _key: &&'static str) -> Option<Item> {
            if self.fail {
                return None;
            }
            let mut t = self.tracker.borrow_mut();
            t.created += 1;
            Some(Item(t.created))
        }

        fn destroy(&mut self, item: Item) {
            self.tracker.borrow_mut().destroyed.push(item.0);
        }

        fn reset(&mut self, _item: &mut Item) {
            self.tracker.borrow_mut().resets += 1;
        }

        fn recyclable(&self, key: &&'static str) -> bool {
            *key != "oneshot"
        }
    }

    fn pool(capacity: usize) -> (ResourcePool<&'static str, Item>, Rc<RefCell<Tracker>>) {
        let tracker = Rc::new(RefCell::new(Tracker::default()));
        let factory = TrackingFactory {
            tracker: Rc::clone(&tracker),
            fail: false,
        };
        let pool = ResourcePool::new("test", capacity, Box::new(factory)).unwrap();
        (pool, tracker)
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let factory = TrackingFactory {
            tracker: Rc::default(),
            fail: false,
        };
        let err = ResourcePool::new("test", 0, Box::new(factory)).unwrap_err();
        assert!(matches!(err, Error::InvalidPoolCapacity(0)));
    }

    #[test]
    fn test_acquire_release_reuse() {
        let (mut pool, tracker) = pool(2);
        let a = pool.acquire(&"clear").unwrap();
        assert_eq!(pool.get(a), Some(&Item(1)));
        pool.release(a).unwrap();
        assert_eq!(tracker.borrow().resets, 1);

        let b = pool.acquire(&"clear").unwrap();
        assert_eq!(a, b);
        assert_eq!(tracker.borrow().created, 1);
    }

    #[test]
    fn test_double_release_is_error() {
        let (mut pool, _) = pool(2);
        let a = pool.acquire(&"clear").unwrap();
        pool.release(a).unwrap();
        assert!(matches!(pool.release(a), Err(Error::NotCheckedOut(id)) if id == a));
    }

    #[test]
    fn test_capacity_one_evicts_oldest() {
        let (mut pool, tracker) = pool(1);
        let p1 = pool.acquire(&"clear").unwrap();
        let p2 = pool.acquire(&"clear").unwrap();

        pool.release(p1).unwrap();
        pool.release(p2).unwrap();

        assert_eq!(tracker.borrow().destroyed, vec![1]);
        assert_eq!(pool.idle_len(), 1);
        // The survivor is p2
        assert_eq!(pool.acquire(&"clear"), Some(p2));
    }

    #[test]
    fn test_keys_are_not_mixed() {
        let (mut pool, tracker) = pool(4);
        let clear = pool.acquire(&"clear").unwrap();
        pool.release(clear).unwrap();

        let drm = pool.acquire(&"drm").unwrap();
        assert_ne!(clear, drm);
        assert_eq!(tracker.borrow().created, 2);
        assert_eq!(pool.idle_len(), 1);
    }

    #[test]
    fn test_checked_out_never_evicted() {
        let (mut pool, tracker) = pool(1);
        let held = pool.acquire(&"clear").unwrap();
        let a = pool.acquire(&"clear").unwrap();
        let b = pool.acquire(&"clear").unwrap();
        pool.release(a).unwrap();
        pool.release(b).unwrap();
        pool.clear();

        assert!(pool.is_checked_out(held));
        assert!(!tracker.borrow().destroyed.contains(&1));
        assert_eq!(pool.get(held), Some(&Item(1)));
    }

    #[test]
    fn test_not_recyclable_destroyed_on_release() {
        let (mut pool, tracker) = pool(2);
        let id = pool.acquire(&"oneshot").unwrap();
        pool.release(id).unwrap();
        assert_eq!(tracker.borrow().destroyed, vec![1]);
        assert_eq!(pool.idle_len(), 0);
    }

    #[test]
    fn test_factory_failure_is_transient() {
        let factory = TrackingFactory {
            tracker: Rc::default(),
            fail: true,
        };
        let mut pool: ResourcePool<&'static str, Item> =
            ResourcePool::new("test", 1, Box::new(factory)).unwrap();
        assert!(pool.acquire(&"clear").is_none());
        assert_eq!(pool.checked_out_len(), 0);
    }
}
