//! Simple GPIO control for the Onion Omega through the sysfs interface.
//!
//! Every operation is self-contained: by default a pin is exported, configured,
//! used and unexported again within a single call. See [`Lifecycle`] for the
//! alternative that exports every pin up front.

pub mod error;
pub mod gpio;
pub mod gpio_pin_data;
pub mod sysfs;

pub use error::{GpioError, Result};
pub use gpio::{Direction, IntoStateRequest, Level, Lifecycle, OmegaGpio, PinSession, StateRequest};
pub use gpio_pin_data::{PinRegistry, OMEGA_PINS};
