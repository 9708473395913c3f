use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counts the prediction temporaries that are currently alive.
///
/// Every buffer created while preprocessing or running the model is wrapped in a
/// [`Scoped`] guard handed out by [`AllocationTracker::track`]. Dropping the guard
/// releases the buffer and decrements the counter, so the count returns to zero on
/// every exit path of a prediction, including early returns through `?`.
#[derive(Debug, Default, Clone)]
pub struct AllocationTracker {
    live: Arc<AtomicUsize>,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked values that have not been dropped yet.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Takes ownership of a temporary for the rest of the enclosing scope.
    pub fn track<T>(&self, value: T) -> Scoped<T> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Scoped {
            value,
            live: Arc::clone(&self.live),
        }
    }
}

/// A temporary owned by the current prediction scope.
#[derive(Debug)]
pub struct Scoped<T> {
    value: T,
    live: Arc<AtomicUsize>,
}

impl<T> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Scoped<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T> Drop for Scoped<T> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
