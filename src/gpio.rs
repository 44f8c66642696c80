use std::collections::BTreeSet;
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::config::Direction;
use crate::error::GpioError;
use crate::event_loop::{PollQueue, Pollable};
use crate::pin::{Pin, PinOptions, PinState, check_active_low, check_edge};

pub type PinNumber = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Direction,
    Edge,
    ActiveLow,
}

impl Attribute {
    pub fn file_name(&self) -> &'static str {
        match self {
            Attribute::Direction => "direction",
            Attribute::Edge => "edge",
            Attribute::ActiveLow => "active_low",
        }
    }
}

/// Persistent handle on a line's value file.
///
/// Every operation leaves the handle positioned at the start of the file.
pub trait ValueHandle {
    fn write_value(&mut self, value: &str) -> io::Result<()>;
    fn read_value(&mut self) -> io::Result<String>;
    fn raw_fd(&self) -> RawFd;
}

/// Control surface of the kernel GPIO pseudo-filesystem.
pub trait GpioFs {
    fn is_exported(&self, number: PinNumber) -> bool;
    fn export(&self, number: PinNumber) -> Result<(), GpioError>;
    fn unexport(&self, number: PinNumber) -> Result<(), GpioError>;
    fn write_attribute(
        &self,
        number: PinNumber,
        attribute: Attribute,
        value: &str,
    ) -> Result<(), GpioError>;
    fn open_value(&self, number: PinNumber) -> Result<Box<dyn ValueHandle>, GpioError>;
}

#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    pub available_pins: BTreeSet<PinNumber>,
}

impl RegistryConfig {
    pub fn new<I: IntoIterator<Item = PinNumber>>(pins: I) -> Self {
        Self {
            available_pins: pins.into_iter().collect(),
        }
    }
}

/// Owns every allocated pin and keeps the event loop's watch list in step with it.
///
/// Confined to the event loop thread; nothing here locks.
pub struct PinRegistry<G: GpioFs, Q: PollQueue> {
    config: RegistryConfig,
    fs: Arc<G>,
    queue: Arc<Q>,
    allocated: FxHashMap<PinNumber, Pin>,
}

impl<G: GpioFs, Q: PollQueue> PinRegistry<G, Q> {
    pub fn new(config: RegistryConfig, fs: Arc<G>, queue: Arc<Q>) -> Self {
        debug!(
            "PinRegistry: {} available pins",
            config.available_pins.len()
        );
        Self {
            config,
            fs,
            queue,
            allocated: FxHashMap::default(),
        }
    }

    pub fn available_pins(&self) -> &BTreeSet<PinNumber> {
        &self.config.available_pins
    }

    /// Replaces the available set; pins already allocated are left alone.
    pub fn set_available_pins<I: IntoIterator<Item = PinNumber>>(&mut self, pins: I) {
        self.config = RegistryConfig::new(pins);
    }

    pub fn is_allocated(&self, number: PinNumber) -> bool {
        self.allocated.contains_key(&number)
    }

    pub fn allocated_pins(&self) -> Vec<PinNumber> {
        let mut numbers: Vec<PinNumber> = self.allocated.keys().copied().collect();
        numbers.sort_unstable();
        numbers
    }

    fn check_pin_validity(&self, number: PinNumber) -> Result<(), GpioError> {
        if !self.config.available_pins.contains(&number) {
            return Err(GpioError::InvalidPin(number));
        }
        if self.allocated.contains_key(&number) {
            return Err(GpioError::PinAlreadyAllocated(number));
        }
        Ok(())
    }

    fn allocated_pin(&self, number: PinNumber) -> Result<&Pin, GpioError> {
        self.allocated
            .get(&number)
            .ok_or(GpioError::PinNotAllocated(number))
    }

    fn allocated_pin_mut(&mut self, number: PinNumber) -> Result<&mut Pin, GpioError> {
        self.allocated
            .get_mut(&number)
            .ok_or(GpioError::PinNotAllocated(number))
    }

    pub fn alloc_pin(
        &mut self,
        number: PinNumber,
        direction: Direction,
        options: PinOptions,
    ) -> Result<&Pin, GpioError> {
        debug!(
            "PinRegistry: alloc_pin({number}, {}, {options:?})",
            direction.as_str()
        );

        self.check_pin_validity(number)?;

        check_edge(&options)?;
        check_active_low(options.active_low)?;

        if self.fs.is_exported(number) {
            debug!("PinRegistry: pin {number} already exported");
        } else {
            self.fs.export(number)?;
        }

        let mut pin = Pin::new(self.fs.as_ref(), number, direction, options)?;

        if direction == Direction::Input {
            self.queue.add_handler(number, pin.poll_fd())?;
            pin.set_state(PinState::Watched);
        }

        Ok(self.allocated.entry(number).or_insert(pin))
    }

    /// Unexports, stops watching and drops the pin, in that order.
    ///
    /// A failure after the unexport write leaves the entry in place.
    pub fn dealloc_pin(&mut self, number: PinNumber) -> Result<(), GpioError> {
        debug!("PinRegistry: dealloc_pin({number})");

        let watched = self.allocated_pin(number)?.state() == PinState::Watched;

        self.fs.unexport(number)?;

        if watched {
            self.queue.remove_handler(number)?;
        }

        self.allocated.remove(&number);
        Ok(())
    }

    /// Deallocates everything, carrying on past failures and returning the first one.
    pub fn dealloc_all(&mut self) -> Result<(), GpioError> {
        let mut first_err = None;
        for number in self.allocated_pins() {
            if let Err(e) = self.dealloc_pin(number) {
                warn!("PinRegistry: failed to release pin {number}: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn get_pin(&self, number: PinNumber) -> Result<&Pin, GpioError> {
        debug!("PinRegistry: get_pin({number})");
        self.allocated_pin(number)
    }

    pub fn set_pin(&mut self, number: PinNumber) -> Result<(), GpioError> {
        debug!("PinRegistry: set_pin({number})");
        self.allocated_pin_mut(number)?.set()
    }

    pub fn reset_pin(&mut self, number: PinNumber) -> Result<(), GpioError> {
        debug!("PinRegistry: reset_pin({number})");
        self.allocated_pin_mut(number)?.reset()
    }

    /// Reads the line synchronously.
    ///
    /// A watched input is taken off the event loop for the read and put back afterwards.
    /// Re-registering makes the value file report ready at once, so the wake that
    /// follows is dispatched only if the level moved away from what was read here.
    pub fn get_pin_state(&mut self, number: PinNumber) -> Result<bool, GpioError> {
        debug!("PinRegistry: get_pin_state({number})");

        let queue = Arc::clone(&self.queue);
        let pin = self
            .allocated
            .get_mut(&number)
            .ok_or(GpioError::PinNotAllocated(number))?;

        if pin.state() != PinState::Watched {
            return Ok(pin.read()? > 0);
        }

        queue.remove_handler(number)?;
        pin.set_state(PinState::Configured);

        let value = pin.read();

        queue.add_handler(number, pin.poll_fd())?;
        pin.set_state(PinState::Watched);

        let value = value?;
        pin.mark_resync(value);
        Ok(value > 0)
    }

    /// Read-and-dispatch step run by the event loop when a pin's value file wakes it.
    pub fn dispatch(&mut self, number: PinNumber) -> Result<Option<u8>, GpioError> {
        let pin = self.allocated_pin_mut(number)?;

        if pin.state() != PinState::Watched {
            debug!("PinRegistry: ignoring wake for unwatched pin {number}");
            return Ok(None);
        }

        let resync = pin.take_resync();
        let value = pin.read()?;
        if resync == Some(value) {
            debug!("PinRegistry: pin {number} still at {value} after re-registration");
            return Ok(None);
        }

        pin.changed(value);
        Ok(Some(value))
    }
}
