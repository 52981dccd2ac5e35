use std::io;

use thiserror::Error;

/// Errors returned by the GPIO controller.
///
/// Validation errors (`InvalidPin`, `InvalidState`, `TypeMismatch`) are always
/// raised before any sysfs resource is touched. `Io` carries the error of the
/// underlying port unchanged.
#[derive(Debug, Error)]
pub enum GpioError {
    #[error("pin '{0}' invalid")]
    InvalidPin(u32),

    #[error("'{0}' state invalid")]
    InvalidState(String),

    #[error("state must be string type")]
    TypeMismatch,

    #[error("'{0}' is not a valid pin value")]
    InvalidValue(String),

    #[error("pin {pin} is configured as an input and cannot be written")]
    DirectionMismatch { pin: u32 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl GpioError {
    /// Returns `true` for errors raised while checking the caller's arguments.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GpioError::InvalidPin(_) | GpioError::InvalidState(_) | GpioError::TypeMismatch
        )
    }
}

pub type Result<T, E = GpioError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_echo_the_offending_input() {
        assert_eq!(GpioError::InvalidPin(3).to_string(), "pin '3' invalid");
        assert_eq!(
            GpioError::InvalidState("foo".to_string()).to_string(),
            "'foo' state invalid"
        );
        assert_eq!(GpioError::TypeMismatch.to_string(), "state must be string type");
    }

    #[test]
    fn io_errors_are_transparent() {
        let err: GpioError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.to_string(), "denied");
        assert!(!err.is_validation());
    }
}
