use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_SYSFS_ROOT;
use crate::error::GpioError;
use crate::gpio::{Attribute, GpioFs, PinNumber, ValueHandle};

/// GPIO control through `/sys/class/gpio` (or any directory laid out the same way).
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new(DEFAULT_SYSFS_ROOT)
    }
}

impl SysfsGpio {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pin_dir(&self, number: PinNumber) -> PathBuf {
        self.root.join(format!("gpio{number}"))
    }

    fn write_control(&self, file: &str, number: PinNumber) -> Result<(), GpioError> {
        let path = self.root.join(file);
        fs::write(&path, number.to_string())
            .map_err(|e| GpioError::Sysfs(format!("write {}: {e}", path.display())))
    }
}

impl GpioFs for SysfsGpio {
    fn is_exported(&self, number: PinNumber) -> bool {
        self.pin_dir(number).is_dir()
    }

    fn export(&self, number: PinNumber) -> Result<(), GpioError> {
        self.write_control("export", number)
    }

    fn unexport(&self, number: PinNumber) -> Result<(), GpioError> {
        self.write_control("unexport", number)
    }

    fn write_attribute(
        &self,
        number: PinNumber,
        attribute: Attribute,
        value: &str,
    ) -> Result<(), GpioError> {
        let path = self.pin_dir(number).join(attribute.file_name());
        fs::write(&path, value)
            .map_err(|e| GpioError::Sysfs(format!("write {}: {e}", path.display())))
    }

    fn open_value(&self, number: PinNumber) -> Result<Box<dyn ValueHandle>, GpioError> {
        let path = self.pin_dir(number).join("value");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| GpioError::Sysfs(format!("open {}: {e}", path.display())))?;
        Ok(Box::new(ValueFile { file }))
    }
}

struct ValueFile {
    file: File,
}

impl ValueHandle for ValueFile {
    fn write_value(&mut self, value: &str) -> io::Result<()> {
        self.file.write_all(value.as_bytes())?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn read_value(&mut self) -> io::Result<String> {
        let mut buf = String::new();
        self.file.read_to_string(&mut buf)?;
        self.file.seek(SeekFrom::Start(0))?;
        Ok(buf)
    }

    fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
