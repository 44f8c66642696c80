pub mod backend;
pub mod config;
pub mod error;
pub mod event_loop;
pub mod forward;
pub mod gpio;
pub mod pin;

pub use backend::{MockSysfs, SysfsGpio};
pub use config::{AppConfig, Direction, Edge, ForwardConfig};
pub use error::GpioError;
pub use event_loop::{AsyncFdQueue, ManualQueue, PollQueue, Pollable, dispatch_ready, run_until};
pub use forward::{HttpForwarder, Observation};
pub use gpio::{Attribute, GpioFs, PinNumber, PinRegistry, RegistryConfig, ValueHandle};
pub use pin::{ChangeHandler, Pin, PinCallback, PinOptions, PinState};
