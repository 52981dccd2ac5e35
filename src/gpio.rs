use anyhow::anyhow;
use log::{debug, info, warn};
use std::{fmt, str::FromStr};

use crate::error::{GpioError, Result};
use crate::gpio_pin_data::PinRegistry;
use crate::sysfs::{self, SysfsFs, SysfsPort, EXPORT_PATH, UNEXPORT_PATH};

/// Specifies the GPIO pin value.
///
/// * `Low` - 0
/// * `High` - 1
///
/// The value is written to and read from the pin's `value` attribute as its
/// decimal string.
///
/// # Example
///
/// ```rust
/// use omega_gpio::Level;
///
/// assert_eq!(Level::from(true), Level::High);
/// assert_eq!("0\n".parse::<Level>().unwrap(), Level::Low);
/// assert_eq!(Level::try_from(1u8).unwrap().as_u8(), 1);
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Level {
    Low = 0,
    High = 1,
}

impl Level {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Level::Low => "0",
            Level::High => "1",
        }
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

impl TryFrom<u8> for Level {
    type Error = GpioError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Level::Low),
            1 => Ok(Level::High),
            _ => Err(GpioError::InvalidValue(value.to_string())),
        }
    }
}

impl FromStr for Level {
    type Err = GpioError;

    // the kernel terminates attribute contents with a newline
    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(GpioError::InvalidValue(other.to_string())),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Specifies the GPIO pin direction.
///
/// * `Input` - written as `"in"`
/// * `Output` - written as `"out"`
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Input => "in",
            Direction::Output => "out",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a pin session is opened for.
///
/// Parsed case-insensitively from `"r"`, `"read"`, `"w"` or `"write"`.
///
/// # Example
///
/// ```rust
/// use omega_gpio::{Direction, StateRequest};
///
/// let request: StateRequest = "WRITE".parse().unwrap();
/// assert_eq!(request, StateRequest::Write);
/// assert_eq!(request.direction(), Direction::Output);
/// assert!("rw".parse::<StateRequest>().is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StateRequest {
    Read,
    Write,
}

impl StateRequest {
    pub fn direction(self) -> Direction {
        match self {
            StateRequest::Read => Direction::Input,
            StateRequest::Write => Direction::Output,
        }
    }
}

impl FromStr for StateRequest {
    type Err = GpioError;

    fn from_str(s: &str) -> Result<Self> {
        let state = s.to_lowercase();
        match state.as_str() {
            "r" | "read" => Ok(StateRequest::Read),
            "w" | "write" => Ok(StateRequest::Write),
            _ => Err(GpioError::InvalidState(state)),
        }
    }
}

/// Conversion of a caller-supplied state token into a [`StateRequest`].
///
/// Text is parsed with [`StateRequest::from_str`]. `None` is not a string at all
/// and is rejected with [`GpioError::TypeMismatch`].
pub trait IntoStateRequest {
    fn into_state_request(self) -> Result<StateRequest>;
}

impl IntoStateRequest for StateRequest {
    fn into_state_request(self) -> Result<StateRequest> {
        Ok(self)
    }
}

impl IntoStateRequest for Direction {
    fn into_state_request(self) -> Result<StateRequest> {
        Ok(match self {
            Direction::Input => StateRequest::Read,
            Direction::Output => StateRequest::Write,
        })
    }
}

impl IntoStateRequest for &str {
    fn into_state_request(self) -> Result<StateRequest> {
        self.parse()
    }
}

impl IntoStateRequest for String {
    fn into_state_request(self) -> Result<StateRequest> {
        self.parse()
    }
}

impl IntoStateRequest for &String {
    fn into_state_request(self) -> Result<StateRequest> {
        self.parse()
    }
}

impl IntoStateRequest for char {
    fn into_state_request(self) -> Result<StateRequest> {
        self.to_string().parse()
    }
}

impl<T: IntoStateRequest> IntoStateRequest for Option<T> {
    fn into_state_request(self) -> Result<StateRequest> {
        match self {
            Some(state) => state.into_state_request(),
            None => Err(GpioError::TypeMismatch),
        }
    }
}

/// Selects how pins are exported.
///
/// * `PerOperation` - every operation exports the pin, configures it, does its
///   work and unexports it again, even when the work fails. This is the default.
/// * `Eager` - every registry pin is exported once when the controller is built
///   and stays exported; operations only configure the direction.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum Lifecycle {
    #[default]
    PerOperation,
    Eager,
}

impl Lifecycle {
    pub fn as_str(&self) -> &str {
        match self {
            Lifecycle::PerOperation => "per-operation",
            Lifecycle::Eager => "eager",
        }
    }
}

impl FromStr for Lifecycle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "per-operation" | "per_operation" | "b" => Ok(Lifecycle::PerOperation),
            "eager" | "a" => Ok(Lifecycle::Eager),
            _ => Err(anyhow!("Invalid lifecycle: {}", s)),
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pin that is exported and configured for one direction.
///
/// Obtained from [`OmegaGpio::open_session`] or handed to the body of
/// [`OmegaGpio::pin_state`]. Under [`Lifecycle::PerOperation`] the session owes
/// exactly one unexport write: [`PinSession::close`] performs it, and dropping
/// an unclosed session performs it as well, so an early return or a panic
/// cannot leave the pin exported.
pub struct PinSession<'a, P: SysfsPort> {
    port: &'a mut P,
    pin: u32,
    direction: Direction,
    owes_unexport: bool,
}

impl<'a, P: SysfsPort> PinSession<'a, P> {
    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Writes `level` to the pin's `value` attribute.
    ///
    /// Fails with [`GpioError::DirectionMismatch`] if the session was opened
    /// for reading.
    pub fn write_value(&mut self, level: Level) -> Result<()> {
        if self.direction != Direction::Output {
            return Err(GpioError::DirectionMismatch { pin: self.pin });
        }
        self.port
            .write_text(&sysfs::value_path(self.pin), level.as_str())?;
        Ok(())
    }

    /// Reads the pin's `value` attribute.
    pub fn read_value(&mut self) -> Result<Level> {
        let raw = self.port.read_text(&sysfs::value_path(self.pin))?;
        raw.parse()
    }

    /// Ends the session, unexporting the pin if this session exported it.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn configure(&mut self) -> Result<()> {
        self.port
            .write_text(&sysfs::direction_path(self.pin), self.direction.as_str())?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if !self.owes_unexport {
            return Ok(());
        }
        self.owes_unexport = false;
        debug!("unexporting pin {}", self.pin);
        self.port.write_text(UNEXPORT_PATH, &self.pin.to_string())?;
        Ok(())
    }

    /// Tears the session down and merges the teardown result into `outcome`.
    ///
    /// An error in `outcome` always wins; a teardown failure behind it is only
    /// logged.
    fn finish<T>(mut self, outcome: Result<T>) -> Result<T> {
        let teardown = self.release();
        match (outcome, teardown) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
            (Err(err), Err(teardown_err)) => {
                warn!(
                    "failed to unexport pin {} after error '{}': {}",
                    self.pin, err, teardown_err
                );
                Err(err)
            }
        }
    }
}

impl<'a, P: SysfsPort> Drop for PinSession<'a, P> {
    fn drop(&mut self) {
        if !self.owes_unexport {
            return;
        }
        warn!("session for pin {} dropped without close", self.pin);
        if let Err(err) = self.release() {
            warn!("failed to unexport pin {}: {}", self.pin, err);
        }
    }
}

/// Controller for the GPIO pins of an Onion Omega board.
///
/// All sysfs access goes through the [`SysfsPort`] the controller owns. The
/// default port is the real filesystem; tests inject
/// [`MemorySysfs`](crate::sysfs::MemorySysfs) instead.
///
/// # Example
///
/// ```rust
/// use omega_gpio::{Level, Lifecycle, OmegaGpio};
/// use omega_gpio::sysfs::MemorySysfs;
///
/// let mut gpio = OmegaGpio::with_port(MemorySysfs::new(), Lifecycle::PerOperation).unwrap();
///
/// gpio.pin_on(8).unwrap();
/// assert_eq!(gpio.get_value(8).unwrap(), Level::High);
///
/// gpio.pin_off(8).unwrap();
/// assert_eq!(gpio.get_value(8).unwrap(), Level::Low);
/// ```
pub struct OmegaGpio<P: SysfsPort = SysfsFs> {
    port: P,
    registry: PinRegistry,
    lifecycle: Lifecycle,
}

impl OmegaGpio<SysfsFs> {
    /// Creates a controller on the real sysfs tree with the default lifecycle.
    pub fn new() -> Result<Self> {
        Self::with_port(SysfsFs::new(), Lifecycle::default())
    }
}

impl<P: SysfsPort> OmegaGpio<P> {
    /// Creates a controller on top of `port`.
    ///
    /// With [`Lifecycle::Eager`] every registry pin is exported here, in
    /// registry order, one write per pin.
    ///
    /// # Arguments
    ///
    /// * `port` - The port used for every sysfs read and write.
    /// * `lifecycle` - How pins are exported.
    pub fn with_port(port: P, lifecycle: Lifecycle) -> Result<Self> {
        let mut gpio = OmegaGpio {
            port,
            registry: PinRegistry::omega(),
            lifecycle,
        };

        if lifecycle == Lifecycle::Eager {
            gpio.export_all()?;
        }

        Ok(gpio)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn registry(&self) -> &PinRegistry {
        &self.registry
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn into_port(self) -> P {
        self.port
    }

    fn export_all(&mut self) -> Result<()> {
        info!("exporting {} pins", self.registry.len());
        for pin in self.registry.pins() {
            self.port.write_text(EXPORT_PATH, &pin.to_string())?;
        }
        Ok(())
    }

    fn validate_pin(&self, pin: u32) -> Result<()> {
        if self.registry.is_valid(pin) {
            Ok(())
        } else {
            Err(GpioError::InvalidPin(pin))
        }
    }

    /// Opens a session on `pin` configured for `state`.
    ///
    /// The pin and the state are validated before any sysfs write. Under
    /// [`Lifecycle::PerOperation`] the pin is then exported; if configuring the
    /// direction fails afterwards, the pin is unexported before the error is
    /// returned.
    ///
    /// Prefer [`OmegaGpio::pin_state`] unless the session has to outlive a
    /// single closure.
    pub fn open_session<S: IntoStateRequest>(
        &mut self,
        pin: u32,
        state: S,
    ) -> Result<PinSession<'_, P>> {
        self.validate_pin(pin)?;
        let direction = state.into_state_request()?.direction();

        let owes_unexport = match self.lifecycle {
            Lifecycle::PerOperation => {
                debug!("exporting pin {}", pin);
                self.port.write_text(EXPORT_PATH, &pin.to_string())?;
                true
            }
            Lifecycle::Eager => false,
        };

        let mut session = PinSession {
            port: &mut self.port,
            pin,
            direction,
            owes_unexport,
        };

        match session.configure() {
            Ok(()) => Ok(session),
            Err(err) => session.finish(Err(err)),
        }
    }

    /// Runs `body` inside a session on `pin` configured for `state`.
    ///
    /// The session is torn down after `body` returns, whatever it returned. An
    /// error from `body` is passed through unchanged.
    ///
    /// # Arguments
    ///
    /// * `pin` - A pin from the board registry.
    /// * `state` - `"r"`/`"read"` or `"w"`/`"write"` (any case), or a [`StateRequest`].
    /// * `body` - The work to do while the pin is configured.
    ///
    /// # Example
    ///
    /// ```rust
    /// use omega_gpio::{Level, Lifecycle, OmegaGpio};
    /// use omega_gpio::sysfs::MemorySysfs;
    ///
    /// let mut gpio = OmegaGpio::with_port(MemorySysfs::new(), Lifecycle::PerOperation).unwrap();
    /// gpio.pin_state(8, "w", |session| session.write_value(Level::High)).unwrap();
    /// ```
    pub fn pin_state<S, T, F>(&mut self, pin: u32, state: S, body: F) -> Result<T>
    where
        S: IntoStateRequest,
        F: FnOnce(&mut PinSession<'_, P>) -> Result<T>,
    {
        let mut session = self.open_session(pin, state)?;
        let outcome = body(&mut session);
        session.finish(outcome)
    }

    /// Drives `pin` high.
    pub fn pin_on(&mut self, pin: u32) -> Result<()> {
        self.set_value(pin, Level::High)
    }

    /// Drives `pin` low.
    pub fn pin_off(&mut self, pin: u32) -> Result<()> {
        self.set_value(pin, Level::Low)
    }

    /// Configures `pin` as an output and writes `value` to it.
    pub fn set_value(&mut self, pin: u32, value: Level) -> Result<()> {
        self.validate_pin(pin)?;
        self.pin_state(pin, StateRequest::Write, |session| {
            session.write_value(value)
        })
    }

    /// Configures `pin` as an input and returns its current value.
    pub fn get_value(&mut self, pin: u32) -> Result<Level> {
        self.validate_pin(pin)?;
        self.pin_state(pin, StateRequest::Read, |session| session.read_value())
    }

    /// Releases the controller.
    ///
    /// Under [`Lifecycle::Eager`] every registry pin is unexported in registry
    /// order. All pins are attempted; the first failure is returned. Under
    /// [`Lifecycle::PerOperation`] nothing is left exported and this is a no-op.
    pub fn cleanup(mut self) -> Result<()> {
        if self.lifecycle != Lifecycle::Eager {
            return Ok(());
        }

        info!("unexporting {} pins", self.registry.len());
        let mut first_err = None;
        for pin in self.registry.pins() {
            if let Err(err) = self.port.write_text(UNEXPORT_PATH, &pin.to_string()) {
                warn!("failed to unexport pin {}: {}", pin, err);
                first_err.get_or_insert(err);
            }
        }

        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sysfs::{MemorySysfs, SysfsOp};
    use std::panic::{self, AssertUnwindSafe};

    #[test]
    fn test_state_request_spellings() {
        for token in ["r", "R", "read", "Read", "READ"] {
            assert_eq!(token.parse::<StateRequest>().unwrap(), StateRequest::Read);
        }
        for token in ["w", "W", "write", "WriTe"] {
            assert_eq!(token.parse::<StateRequest>().unwrap(), StateRequest::Write);
        }
    }

    #[test]
    fn test_state_request_invalid_is_lowercased() {
        match "FOO".parse::<StateRequest>() {
            Err(GpioError::InvalidState(state)) => assert_eq!(state, "foo"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_state_request_none_is_type_mismatch() {
        let state: Option<&str> = None;
        assert!(matches!(
            state.into_state_request(),
            Err(GpioError::TypeMismatch)
        ));
        assert_eq!(Some('r').into_state_request().unwrap(), StateRequest::Read);
        assert_eq!(
            Direction::Output.into_state_request().unwrap(),
            StateRequest::Write
        );
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("1\n".parse::<Level>().unwrap(), Level::High);
        assert_eq!(" 0 ".parse::<Level>().unwrap(), Level::Low);
        assert!(matches!(
            "2".parse::<Level>(),
            Err(GpioError::InvalidValue(v)) if v == "2"
        ));
        assert!(Level::try_from(7u8).is_err());
    }

    #[test]
    fn test_lifecycle_from_str() {
        assert_eq!("eager".parse::<Lifecycle>().unwrap(), Lifecycle::Eager);
        assert_eq!(
            "Per-Operation".parse::<Lifecycle>().unwrap(),
            Lifecycle::PerOperation
        );
        assert!("sometimes".parse::<Lifecycle>().is_err());
        assert_eq!(Lifecycle::default(), Lifecycle::PerOperation);
    }

    #[test]
    fn test_dropped_session_unexports_once() {
        let mut port = MemorySysfs::new();
        {
            let mut gpio = OmegaGpio::with_port(&mut port, Lifecycle::PerOperation).unwrap();
            let session = gpio.open_session(8, "r").unwrap();
            drop(session);
        }
        assert_eq!(port.writes_to(UNEXPORT_PATH), vec!["8"]);
    }

    #[test]
    fn test_closed_session_unexports_once() {
        let mut port = MemorySysfs::new();
        let mut gpio = OmegaGpio::with_port(&mut port, Lifecycle::PerOperation).unwrap();
        let session = gpio.open_session(12, "w").unwrap();
        session.close().unwrap();
        drop(gpio);
        assert_eq!(port.writes_to(UNEXPORT_PATH), vec!["12"]);
    }

    #[test]
    fn test_panicking_body_still_unexports() {
        let mut port = MemorySysfs::new();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut gpio = OmegaGpio::with_port(&mut port, Lifecycle::PerOperation).unwrap();
            let _ = gpio.pin_state(8, "w", |_| -> Result<()> { panic!("body panicked") });
        }));
        assert!(result.is_err());
        assert_eq!(port.writes_to(UNEXPORT_PATH), vec!["8"]);
    }

    #[test]
    fn test_direction_failure_unexports() {
        let mut port = MemorySysfs::new();
        port.fail_on(&sysfs::direction_path(8));

        let mut gpio = OmegaGpio::with_port(&mut port, Lifecycle::PerOperation).unwrap();
        let err = gpio.set_value(8, Level::High).unwrap_err();
        assert!(matches!(err, GpioError::Io(_)));
        drop(gpio);

        assert_eq!(
            port.ops(),
            &[
                SysfsOp::write(EXPORT_PATH, "8"),
                SysfsOp::write(&sysfs::direction_path(8), "out"),
                SysfsOp::write(UNEXPORT_PATH, "8"),
            ]
        );
    }

    #[test]
    fn test_write_in_read_session_is_rejected() {
        let mut gpio = OmegaGpio::with_port(MemorySysfs::new(), Lifecycle::PerOperation).unwrap();
        let err = gpio
            .pin_state(8, "r", |session| session.write_value(Level::High))
            .unwrap_err();
        assert!(matches!(err, GpioError::DirectionMismatch { pin: 8 }));
        assert_eq!(gpio.port().contents(&sysfs::value_path(8)), None);
        assert_eq!(gpio.port().writes_to(UNEXPORT_PATH), vec!["8"]);
    }
}
