//! Exclusive access to a peripheral bus shared between devices.
//!
//! Invariant: while a `with` closure runs, no other holder of the same
//! `SharedBus` can start a transaction. Keep closures to a single device
//! transaction; never call back into the bus from inside one.
use std::sync::{Arc, Mutex};

use crate::error::VentError;

#[derive(Debug)]
pub struct SharedBus<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for SharedBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedBus<T> {
    pub fn new(device: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(device)),
        }
    }

    /// Run one transaction with the bus held.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, VentError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| VentError::State("bus lock poisoned".into()))?;
        Ok(f(&mut guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_device() {
        let a = SharedBus::new(0_u32);
        let b = a.clone();
        a.with(|v| *v += 2).unwrap();
        assert_eq!(b.with(|v| *v).unwrap(), 2);
    }
}
