use thiserror::Error;

use crate::gpio::PinNumber;

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("Pin number ({0}) out of range")]
    InvalidPin(PinNumber),
    #[error("Pin ({0}) already allocated")]
    PinAlreadyAllocated(PinNumber),
    #[error("Pin {0} not allocated")]
    PinNotAllocated(PinNumber),
    #[error("Pin direction {0} not in (in, out)")]
    InvalidDirection(String),
    #[error("Pin edge {0} not in (rising, falling, both)")]
    InvalidEdge(String),
    #[error("active_low must be either 0 or 1, got {0}")]
    InvalidActiveLow(u8),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Sysfs error: {0}")]
    Sysfs(String),
    #[error("Event loop error: {0}")]
    EventLoop(String),
}

impl GpioError {
    /// True for the failures raised by argument validation, before any side effect.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GpioError::InvalidPin(_)
                | GpioError::PinAlreadyAllocated(_)
                | GpioError::PinNotAllocated(_)
                | GpioError::InvalidDirection(_)
                | GpioError::InvalidEdge(_)
                | GpioError::InvalidActiveLow(_)
        )
    }
}
