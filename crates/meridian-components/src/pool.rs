//! Bounded object pool for component instances.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// A bounded pool of reusable objects.
///
/// Up to `capacity` objects may be outstanding at once; `reserve` objects
/// are pre-built at construction. Acquire and release are thread-safe.
pub struct ObjectPool<T> {
    factory: Box<dyn Fn() -> T + Send + Sync>,
    idle: Mutex<Vec<T>>,
    capacity: usize,
    outstanding: AtomicUsize,
}

impl<T> std::fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.capacity)
            .field("idle", &self.idle.lock().len())
            .field("outstanding", &self.outstanding.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T> ObjectPool<T> {
    /// Create a pool with the given capacity, pre-warming `reserve` objects.
    #[must_use]
    pub fn new(capacity: usize, reserve: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        let idle: Vec<T> = (0..reserve.min(capacity)).map(|_| factory()).collect();
        Self {
            factory: Box::new(factory),
            idle: Mutex::new(idle),
            capacity,
            outstanding: AtomicUsize::new(0),
        }
    }

    /// Take an object from the pool, building one when the idle list is
    /// empty. Returns `None` when `capacity` objects are already
    /// outstanding.
    #[must_use]
    pub fn acquire(&self) -> Option<T> {
        loop {
            let outstanding = self.outstanding.load(Ordering::Acquire);
            if outstanding >= self.capacity {
                trace!(capacity = self.capacity, "pool exhausted");
                return None;
            }
            if self
                .outstanding
                .compare_exchange(outstanding, outstanding + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        let recycled = self.idle.lock().pop();
        Some(recycled.unwrap_or_else(|| (self.factory)()))
    }

    /// Return an object to the pool.
    pub fn release(&self, object: T) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(object);
        }
    }

    /// Objects currently handed out.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Relaxed)
    }

    /// Objects waiting in the pool.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_is_prewarmed() {
        let pool: ObjectPool<u32> = ObjectPool::new(100, 10, || 0);
        assert_eq!(pool.idle(), 10);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn acquire_release_cycle() {
        let pool: ObjectPool<u32> = ObjectPool::new(2, 1, || 7);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.outstanding(), 2);
        assert!(pool.acquire().is_none());

        pool.release(a);
        assert_eq!(pool.outstanding(), 1);
        assert!(pool.acquire().is_some());
        pool.release(b);
    }

    #[test]
    fn released_objects_are_recycled() {
        let pool: ObjectPool<Vec<u8>> = ObjectPool::new(4, 0, Vec::new);
        let mut v = pool.acquire().unwrap();
        v.push(1);
        pool.release(v);
        assert_eq!(pool.idle(), 1);
    }
}
