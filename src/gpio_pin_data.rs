/// GPIO lines broken out on the Onion Omega expansion header, in header order.
///
/// Bulk export walks this list front to back.
pub static OMEGA_PINS: [u32; 14] = [0, 1, 6, 7, 8, 12, 13, 14, 18, 19, 20, 21, 23, 26];

/// The fixed set of pins a controller may touch.
///
/// The registry never changes after construction; there is no pin discovery.
///
/// # Example
///
/// ```rust
/// use omega_gpio::gpio_pin_data::PinRegistry;
///
/// let registry = PinRegistry::omega();
/// assert!(registry.is_valid(8));
/// assert!(!registry.is_valid(2));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PinRegistry {
    pins: &'static [u32],
}

impl PinRegistry {
    /// Registry of the Onion Omega header.
    pub const fn omega() -> Self {
        PinRegistry { pins: &OMEGA_PINS }
    }

    /// Returns `true` if `pin` belongs to the board.
    pub fn is_valid(&self, pin: u32) -> bool {
        self.pins.contains(&pin)
    }

    /// Pins in registry order.
    pub fn pins(&self) -> &'static [u32] {
        self.pins
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

impl Default for PinRegistry {
    fn default() -> Self {
        Self::omega()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_membership() {
        let registry = PinRegistry::omega();
        for pin in OMEGA_PINS {
            assert!(registry.is_valid(pin), "pin {} should be valid", pin);
        }
        for pin in [2, 3, 4, 5, 9, 10, 11, 15, 16, 17, 22, 24, 25, 27, u32::MAX] {
            assert!(!registry.is_valid(pin), "pin {} should be invalid", pin);
        }
    }

    #[test]
    fn test_registry_order() {
        assert_eq!(
            PinRegistry::default().pins(),
            &[0, 1, 6, 7, 8, 12, 13, 14, 18, 19, 20, 21, 23, 26]
        );
        assert_eq!(PinRegistry::omega().len(), 14);
    }
}
