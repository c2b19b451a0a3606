// Atomic parameters - Lock-free communication between control and audio threads
// Uses atomic operations to share parameters between threads without locks

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Thread-safe f32 parameter using atomic operations
/// Converts f32 to u32 bits for atomic storage
#[derive(Clone)]
pub struct AtomicF32 {
    inner: Arc<AtomicU32>,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            inner: Arc::new(AtomicU32::new(value.to_bits())),
        }
    }

    /// Set the value (called from the control thread)
    pub fn set(&self, value: f32) {
        self.inner.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Get the value (called from the audio thread)
    pub fn get(&self) -> f32 {
        f32::from_bits(self.inner.load(Ordering::Relaxed))
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl std::fmt::Debug for AtomicF32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicF32").field(&self.get()).finish()
    }
}

/// Thread-safe f64 parameter, same scheme as `AtomicF32`
/// Used for clock positions where f32 precision would drift audibly
#[derive(Clone)]
pub struct AtomicF64 {
    inner: Arc<AtomicU64>,
}

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self {
            inner: Arc::new(AtomicU64::new(value.to_bits())),
        }
    }

    pub fn set(&self, value: f64) {
        self.inner.store(value.to_bits(), Ordering::Release);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.inner.load(Ordering::Acquire))
    }

    /// Store `value` only if it is larger than the current one.
    /// Returns the value held afterwards.
    pub fn fetch_max(&self, value: f64) -> f64 {
        let mut current = self.inner.load(Ordering::Acquire);
        loop {
            let current_value = f64::from_bits(current);
            if value <= current_value {
                return current_value;
            }
            match self.inner.compare_exchange_weak(
                current,
                value.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return value,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl std::fmt::Debug for AtomicF64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AtomicF64").field(&self.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_f32_shared_between_clones() {
        let volume = AtomicF32::new(0.5);
        let audio_side = volume.clone();

        volume.set(0.8);
        assert_eq!(audio_side.get(), 0.8);
    }

    #[test]
    fn test_atomic_f64_fetch_max() {
        let position = AtomicF64::new(1.0);

        assert_eq!(position.fetch_max(0.5), 1.0);
        assert_eq!(position.get(), 1.0);

        assert_eq!(position.fetch_max(2.5), 2.5);
        assert_eq!(position.get(), 2.5);
    }
}
