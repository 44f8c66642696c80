use std::fmt;
use std::os::fd::RawFd;
use std::sync::Arc;

use log::debug;

use crate::config::{Direction, Edge};
use crate::error::GpioError;
use crate::event_loop::Pollable;
use crate::gpio::{Attribute, GpioFs, PinNumber, ValueHandle};

const VALUE_LOW: &str = "0";
const VALUE_HIGH: &str = "1";

/// Receives the value of a watched pin after each transition.
///
/// Runs synchronously on the event loop thread and must not block.
pub trait ChangeHandler: Send + Sync {
    fn changed(&self, pin: &Pin, value: u8);
}

impl<F> ChangeHandler for F
where
    F: Fn(&Pin, u8) + Send + Sync,
{
    fn changed(&self, pin: &Pin, value: u8) {
        self(pin, value)
    }
}

pub type PinCallback = Arc<dyn ChangeHandler>;

#[derive(Clone, Default)]
pub struct PinOptions {
    pub callback: Option<PinCallback>,
    pub edge: Option<Edge>,
    pub active_low: u8,
}

impl PinOptions {
    pub fn watch(callback: PinCallback, edge: Edge) -> Self {
        Self {
            callback: Some(callback),
            edge: Some(edge),
            active_low: 0,
        }
    }

    pub fn with_active_low(mut self, active_low: u8) -> Self {
        self.active_low = active_low;
        self
    }
}

impl fmt::Debug for PinOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinOptions")
            .field("callback", &self.callback.is_some())
            .field("edge", &self.edge)
            .field("active_low", &self.active_low)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinState {
    Configured,
    Watched,
}

/// A callback needs an edge that actually wakes the event loop.
pub(crate) fn check_edge(options: &PinOptions) -> Result<(), GpioError> {
    if options.callback.is_some() && !options.edge.is_some_and(|e| e.is_triggering()) {
        let edge = options.edge.map(|e| e.as_str()).unwrap_or("none");
        return Err(GpioError::InvalidEdge(edge.to_string()));
    }
    Ok(())
}

pub(crate) fn check_active_low(active_low: u8) -> Result<bool, GpioError> {
    match active_low {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(GpioError::InvalidActiveLow(other)),
    }
}

/// One exported line, holding its value file open for its whole lifetime.
pub struct Pin {
    number: PinNumber,
    direction: Direction,
    edge: Option<Edge>,
    active_low: bool,
    value: Box<dyn ValueHandle>,
    callback: Option<PinCallback>,
    last_value: Option<u8>,
    state: PinState,
    resync: Option<u8>,
}

impl Pin {
    /// Opens the value handle and writes direction, edge and active_low.
    ///
    /// The line must already be exported.
    pub fn new<G: GpioFs + ?Sized>(
        fs: &G,
        number: PinNumber,
        direction: Direction,
        options: PinOptions,
    ) -> Result<Self, GpioError> {
        check_edge(&options)?;

        let value = fs.open_value(number)?;

        fs.write_attribute(number, Attribute::Direction, direction.as_str())?;

        if let Some(edge) = options.edge {
            fs.write_attribute(number, Attribute::Edge, edge.as_str())?;
        }

        let active_low = check_active_low(options.active_low)?;
        if active_low {
            fs.write_attribute(number, Attribute::ActiveLow, VALUE_HIGH)?;
        }

        debug!(
            "Pin {number} configured: direction={} edge={:?} active_low={active_low}",
            direction.as_str(),
            options.edge
        );

        Ok(Self {
            number,
            direction,
            edge: options.edge,
            active_low,
            value,
            callback: options.callback,
            last_value: None,
            state: PinState::Configured,
            resync: None,
        })
    }

    pub fn number(&self) -> PinNumber {
        self.number
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn edge(&self) -> Option<Edge> {
        self.edge
    }

    pub fn active_low(&self) -> bool {
        self.active_low
    }

    pub fn state(&self) -> PinState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: PinState) {
        self.state = state;
    }

    /// Remembers a level read outside the event loop; the next wake reporting
    /// the same level is not a transition.
    pub(crate) fn mark_resync(&mut self, value: u8) {
        self.resync = Some(value);
    }

    pub(crate) fn take_resync(&mut self) -> Option<u8> {
        self.resync.take()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn set_callback(&mut self, callback: Option<PinCallback>) {
        self.callback = callback;
    }

    pub fn last_value(&self) -> Option<u8> {
        self.last_value
    }

    /// Drives the line to logic HIGH.
    pub fn set(&mut self) -> Result<(), GpioError> {
        self.write(VALUE_HIGH)
    }

    /// Drives the line to logic LOW.
    pub fn reset(&mut self) -> Result<(), GpioError> {
        self.write(VALUE_LOW)
    }

    fn write(&mut self, value: &str) -> Result<(), GpioError> {
        self.value
            .write_value(value)
            .map_err(|e| GpioError::Sysfs(format!("write value of pin {}: {e}", self.number)))
    }

    /// Reads the current logic level, 0 when LOW and 1 when HIGH.
    pub fn read(&mut self) -> Result<u8, GpioError> {
        let raw = self
            .value
            .read_value()
            .map_err(|e| GpioError::Sysfs(format!("read value of pin {}: {e}", self.number)))?;

        let value = match raw.trim() {
            VALUE_LOW => 0,
            VALUE_HIGH => 1,
            other => {
                return Err(GpioError::Sysfs(format!(
                    "unexpected value {other:?} on pin {}",
                    self.number
                )));
            }
        };
        self.last_value = Some(value);
        Ok(value)
    }

    pub fn changed(&self, value: u8) {
        if let Some(callback) = &self.callback {
            callback.changed(self, value);
        }
    }
}

impl Pollable for Pin {
    fn poll_fd(&self) -> RawFd {
        self.value.raw_fd()
    }
}

impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pin")
            .field("number", &self.number)
            .field("direction", &self.direction)
            .field("edge", &self.edge)
            .field("active_low", &self.active_low)
            .field("state", &self.state)
            .field("last_value", &self.last_value)
            .finish()
    }
}
