//! A small object pool for the `Vec<T>` arrays the inbound/outbound buffers rent.
//!
//! Keeps allocation churn out of the steady state. Not a generic
//! "object pool" abstraction — just the one shape this crate needs.

use std::sync::Mutex;

pub struct ArrayPool<T> {
    capacity: usize,
    free: Mutex<Vec<Vec<T>>>,
}

impl<T> ArrayPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            free: Mutex::new(Vec::new()),
        }
    }

    pub fn rent(&self) -> Vec<T> {
        let mut free = self.free.lock().expect("array pool mutex poisoned");
        free.pop().unwrap_or_else(|| Vec::with_capacity(self.capacity))
    }

    pub fn release(&self, mut array: Vec<T>) {
        array.clear();
        let mut free = self.free.lock().expect("array pool mutex poisoned");
        // Cap how many idle arrays we hoard; excess just gets dropped.
        if free.len() < 64 {
            free.push(array);
        }
    }
}
