//! Persistent encoder input surface
//!
//! Created on first use, handed to every take, released once at teardown.

use super::{EncoderError, EncoderFactory, InputSurface};
use parking_lot::Mutex;
use std::sync::Arc;

enum Slot {
    Vacant,
    Live(Arc<dyn InputSurface>),
    Released,
}

/// Owns the encoder input surface for the recorder's lifetime
pub struct PersistentSurface {
    factory: Arc<dyn EncoderFactory>,
    slot: Mutex<Slot>,
}

impl PersistentSurface {
    pub fn new(factory: Arc<dyn EncoderFactory>) -> Self {
        Self {
            factory,
            slot: Mutex::new(Slot::Vacant),
        }
    }

    /// The surface, creating it on first call
    pub fn get(&self) -> Result<Arc<dyn InputSurface>, EncoderError> {
        let mut slot = self.slot.lock();
        match &*slot {
            Slot::Live(surface) => return Ok(Arc::clone(surface)),
            Slot::Released => return Err(EncoderError::SurfaceReleased),
            Slot::Vacant => {}
        }

        let surface = self.factory.create_input_surface()?;
        tracing::info!("Created persistent input surface {}", surface.label());
        *slot = Slot::Live(Arc::clone(&surface));
        Ok(surface)
    }

    /// Release the surface. Returns `true` only for the call that released it.
    pub fn release(&self) -> bool {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Released);
        match previous {
            Slot::Live(surface) => {
                surface.release();
                tracing::info!("Released persistent input surface {}", surface.label());
                true
            }
            Slot::Vacant | Slot::Released => false,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Live(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEncoderFactory;

    #[test]
    fn test_created_once() {
        let factory = FakeEncoderFactory::new();
        let surface = PersistentSurface::new(factory.clone());

        let first = surface.get().unwrap();
        let second = surface.get().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.surfaces_created(), 1);
        assert!(surface.is_created());
    }

    #[test]
    fn test_release_once() {
        let factory = FakeEncoderFactory::new();
        let surface = PersistentSurface::new(factory.clone());
        let input = surface.get().unwrap();

        assert!(surface.release());
        assert!(!surface.release());
        assert!(input.is_released());
        assert_eq!(factory.surface_releases(), 1);
        assert!(matches!(surface.get(), Err(EncoderError::SurfaceReleased)));
    }

    #[test]
    fn test_release_before_creation() {
        let factory = FakeEncoderFactory::new();
        let surface = PersistentSurface::new(factory.clone());

        assert!(!surface.release());
        assert!(surface.is_released());
        assert!(surface.get().is_err());
        assert_eq!(factory.surfaces_created(), 0);
    }
}
