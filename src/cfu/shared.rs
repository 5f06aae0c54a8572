use std::sync::{Mutex, MutexGuard, PoisonError};

/// Serializes access to a single accelerator shared between threads.
///
/// Hold the guard from [`SharedCfu::session`] for a whole convolution call so
/// no other thread's configure/accumulate sequence interleaves with it.
#[derive(Default)]
pub struct SharedCfu<C> {
    unit: Mutex<C>,
}

impl<C> SharedCfu<C> {
    pub fn new(unit: C) -> Self { Self { unit: Mutex::new(unit) } }

    /// Lock the unit. A poisoned lock is recovered: every invocation
    /// re-arms all registers before its first accumulate.
    pub fn session(&self) -> MutexGuard<'_, C> { self.unit.lock().unwrap_or_else(PoisonError::into_inner) }

    pub fn into_inner(self) -> C { self.unit.into_inner().unwrap_or_else(PoisonError::into_inner) }
}
