// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Free lists for values reused across requests

use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use std::thread::available_parallelism;

/// A value that can be put back into a [`Pool`]
pub trait Reusable: Default {
    /// Clears the value before it is handed out again.
    fn reset(&mut self);
}

/// Buffers that grew beyond this capacity give the excess memory back before being reused
pub const MAX_RETAINED_CAPACITY: usize = 64 * 1024;

impl Reusable for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
        self.shrink_to(MAX_RETAINED_CAPACITY);
    }
}

/// Number of idle values kept by default: twice the available parallelism
pub fn default_pool_size() -> usize {
    available_parallelism().map_or(4, |count| count.get()) * 2
}

/// A bounded free list
///
/// Values are checked out with [`Pool::get`] and come back when the returned guard is dropped.
/// At most `max_idle` values are kept, anything beyond that is deallocated.
#[derive(Debug)]
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    max_idle: usize,
}

impl<T: Reusable> Pool<T> {
    /// Creates an empty pool keeping up to `max_idle` values.
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(max_idle)),
            max_idle,
        }
    }

    /// Checks out an idle value or creates a new one.
    pub fn get(&self) -> Pooled<'_, T> {
        let value = self
            .idle
            .lock()
            .ok()
            .and_then(|mut idle| idle.pop())
            .unwrap_or_default();
        Pooled {
            pool: self,
            value: Some(value),
        }
    }

    /// Number of values currently waiting to be reused
    pub fn idle(&self) -> usize {
        self.idle.lock().map_or(0, |idle| idle.len())
    }

    fn put(&self, mut value: T) {
        value.reset();
        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < self.max_idle {
                idle.push(value);
            }
        }
    }
}

/// A value checked out of a [`Pool`], returned to it on drop
#[derive(Debug)]
pub struct Pooled<'a, T: Reusable> {
    pool: &'a Pool<T>,
    value: Option<T>,
}

impl<T: Reusable> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only empty while dropping
        self.value.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Reusable> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Reusable> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.put(value);
        }
    }
}
