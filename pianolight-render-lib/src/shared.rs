//! Key state shared between a MIDI callback thread and a fixed-rate frame loop.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::input::KeyUpdate;
use crate::render::RenderError;

/// A consistent copy of the shared state, taken under the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub intensities: Vec<f64>,
    pub rotation: i64,
}

/// Per-key intensities plus a dirty flag and the palette rotation.
///
/// Writers call [`set`](Self::set) / [`set_rotation`](Self::set_rotation),
/// which mark the state dirty. The frame loop calls
/// [`take_snapshot`](Self::take_snapshot), which clears the flag atomically
/// and returns a copy only when something changed since the last call.
#[derive(Debug)]
pub struct SharedKeyState {
    intensities: Mutex<Vec<f64>>,
    dirty: AtomicBool,
    rotation: AtomicI64,
}

impl SharedKeyState {
    #[must_use]
    pub fn new(keys: usize) -> Self {
        Self {
            intensities: Mutex::new(vec![0.0; keys]),
            dirty: AtomicBool::new(false),
            rotation: AtomicI64::new(0),
        }
    }

    // A writer that panicked mid-update leaves at worst one stale key.
    fn lock(&self) -> MutexGuard<'_, Vec<f64>> {
        self.intensities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn keys(&self) -> usize {
        self.lock().len()
    }

    /// Store a key update and mark the state dirty.
    ///
    /// # Errors
    /// [`RenderError::KeyOutOfRange`] if the key does not exist; nothing is
    /// stored.
    pub fn set(&self, update: KeyUpdate) -> Result<(), RenderError> {
        let mut intensities = self.lock();
        let keys = intensities.len();
        let slot = intensities
            .get_mut(update.key)
            .ok_or(RenderError::KeyOutOfRange {
                key: update.key,
                keys,
            })?;
        *slot = update.intensity;
        drop(intensities);
        self.mark_dirty();
        Ok(())
    }

    #[must_use]
    pub fn rotation(&self) -> i64 {
        self.rotation.load(Ordering::SeqCst)
    }

    /// Change the palette rotation. Takes effect on the next snapshot.
    pub fn set_rotation(&self, rotation: i64) {
        self.rotation.store(rotation, Ordering::SeqCst);
        self.mark_dirty();
    }

    /// Force the next [`take_snapshot`](Self::take_snapshot) to return a copy.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Clear the dirty flag and, if it was set, return a copy of the state.
    pub fn take_snapshot(&self) -> Option<Snapshot> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return None;
        }
        let intensities = self.lock().clone();
        Some(Snapshot {
            intensities,
            rotation: self.rotation(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_snapshot_only_when_dirty() {
        let state = SharedKeyState::new(4);
        assert!(state.take_snapshot().is_none());

        state
            .set(KeyUpdate {
                key: 2,
                intensity: 0.5,
            })
            .unwrap();
        let snapshot = state.take_snapshot().unwrap();
        assert_eq!(snapshot.intensities, vec![0.0, 0.0, 0.5, 0.0]);
        assert_eq!(snapshot.rotation, 0);

        assert!(state.take_snapshot().is_none());
    }

    #[test]
    fn test_rotation_marks_dirty() {
        let state = SharedKeyState::new(2);
        state.set_rotation(-7);
        assert!(state.is_dirty());
        assert_eq!(state.take_snapshot().unwrap().rotation, -7);
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_out_of_range_key_is_not_stored() {
        let state = SharedKeyState::new(2);
        assert_eq!(
            state.set(KeyUpdate {
                key: 2,
                intensity: 1.0,
            }),
            Err(RenderError::KeyOutOfRange { key: 2, keys: 2 })
        );
        assert!(!state.is_dirty());
    }

    #[test]
    fn test_concurrent_writers_are_all_seen() {
        let state = Arc::new(SharedKeyState::new(8));
        let handles: Vec<_> = (0..8)
            .map(|key| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    state
                        .set(KeyUpdate {
                            key,
                            intensity: 1.0,
                        })
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = state.take_snapshot().unwrap();
        assert!(snapshot.intensities.iter().all(|&i| i == 1.0));
    }
}
