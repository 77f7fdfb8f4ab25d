//! Free-list object pool.
//!
//! Each system owns the pools for the entity kinds it recycles (snowballs,
//! parachute canopies, icebergs, drops, players). The pool only tracks
//! identities; resetting state on allocation and detaching references on
//! free is the owner's job, done right around the pool call.

/// Pool of reusable handles. `T` is usually an `Entity`.
#[derive(Debug, Clone)]
pub struct Pool<T> {
    free: Vec<T>,
    allocated: Vec<T>,
    constructed: usize,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            free: Vec::new(),
            allocated: Vec::new(),
            constructed: 0,
        }
    }
}

impl<T: Copy + PartialEq> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse the most recently freed instance, or build a new one with
    /// `construct` when the free list is empty.
    pub fn allocate_with(&mut self, construct: impl FnOnce() -> T) -> T {
        let instance = match self.free.pop() {
            Some(instance) => instance,
            None => {
                self.constructed += 1;
                construct()
            }
        };
        self.allocated.push(instance);
        instance
    }

    /// Returns false (and does nothing) if `instance` is not allocated.
    pub fn free(&mut self, instance: T) -> bool {
        match self.allocated.iter().position(|a| *a == instance) {
            Some(index) => {
                self.allocated.swap_remove(index);
                self.free.push(instance);
                true
            }
            None => false,
        }
    }

    /// Move every allocated instance back to the free list, returning them.
    pub fn release_all(&mut self) -> Vec<T> {
        let released: Vec<T> = self.allocated.drain(..).collect();
        self.free.extend(released.iter().copied());
        released
    }

    pub fn is_allocated(&self, instance: T) -> bool {
        self.allocated.contains(&instance)
    }

    pub fn allocated(&self) -> &[T] {
        &self.allocated
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Number of instances ever built by this pool.
    pub fn constructed(&self) -> usize {
        self.constructed
    }
}
