pub mod mock;
pub mod sysfs;

pub use mock::MockSysfs;
pub use sysfs::SysfsGpio;
