use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::GpioError;
use crate::gpio::{Attribute, GpioFs, PinNumber, ValueHandle};

const MOCK_FD_BASE: RawFd = 1000;

/// In-memory stand-in for the sysfs tree, counting every control write.
#[derive(Default)]
pub struct MockSysfs {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    exported: FxHashSet<PinNumber>,
    export_writes: Vec<PinNumber>,
    unexport_writes: Vec<PinNumber>,
    attributes: FxHashMap<(PinNumber, Attribute), String>,
    values: FxHashMap<PinNumber, Arc<Mutex<String>>>,
    value_opens: FxHashMap<PinNumber, usize>,
    failing_unexports: FxHashSet<PinNumber>,
}

impl MockSysfs {
    /// Pretends the kernel already exported `number`, as after an earlier run.
    pub fn mark_exported(&self, number: PinNumber) {
        self.state.lock().exported.insert(number);
    }

    pub fn export_writes(&self) -> Vec<PinNumber> {
        self.state.lock().export_writes.clone()
    }

    pub fn unexport_writes(&self) -> Vec<PinNumber> {
        self.state.lock().unexport_writes.clone()
    }

    pub fn attribute(&self, number: PinNumber, attribute: Attribute) -> Option<String> {
        self.state.lock().attributes.get(&(number, attribute)).cloned()
    }

    pub fn value_opens(&self, number: PinNumber) -> usize {
        self.state.lock().value_opens.get(&number).copied().unwrap_or(0)
    }

    /// Content a subsequent read of the value file returns.
    pub fn set_value(&self, number: PinNumber, value: &str) {
        let cell = self.value_cell(number);
        *cell.lock() = value.to_string();
    }

    pub fn value(&self, number: PinNumber) -> String {
        self.value_cell(number).lock().clone()
    }

    /// Makes every later unexport write for `number` fail.
    pub fn fail_unexport(&self, number: PinNumber) {
        self.state.lock().failing_unexports.insert(number);
    }

    fn value_cell(&self, number: PinNumber) -> Arc<Mutex<String>> {
        self.state
            .lock()
            .values
            .entry(number)
            .or_insert_with(|| Arc::new(Mutex::new("0".to_string())))
            .clone()
    }
}

impl GpioFs for MockSysfs {
    fn is_exported(&self, number: PinNumber) -> bool {
        self.state.lock().exported.contains(&number)
    }

    fn export(&self, number: PinNumber) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        state.export_writes.push(number);
        state.exported.insert(number);
        Ok(())
    }

    fn unexport(&self, number: PinNumber) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        if state.failing_unexports.contains(&number) {
            return Err(GpioError::Sysfs(format!("write unexport: pin {number} busy")));
        }
        state.unexport_writes.push(number);
        state.exported.remove(&number);
        Ok(())
    }

    fn write_attribute(
        &self,
        number: PinNumber,
        attribute: Attribute,
        value: &str,
    ) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        if !state.exported.contains(&number) {
            return Err(GpioError::Sysfs(format!(
                "write gpio{number}/{}: not exported",
                attribute.file_name()
            )));
        }
        state.attributes.insert((number, attribute), value.to_string());
        Ok(())
    }

    fn open_value(&self, number: PinNumber) -> Result<Box<dyn ValueHandle>, GpioError> {
        if !self.is_exported(number) {
            return Err(GpioError::Sysfs(format!(
                "open gpio{number}/value: not exported"
            )));
        }
        let cell = self.value_cell(number);
        *self.state.lock().value_opens.entry(number).or_default() += 1;

        Ok(Box::new(MockValue {
            fd: MOCK_FD_BASE.wrapping_add(number as RawFd),
            cell,
        }))
    }
}

struct MockValue {
    fd: RawFd,
    cell: Arc<Mutex<String>>,
}

impl ValueHandle for MockValue {
    fn write_value(&mut self, value: &str) -> io::Result<()> {
        *self.cell.lock() = value.to_string();
        Ok(())
    }

    fn read_value(&mut self) -> io::Result<String> {
        Ok(self.cell.lock().clone())
    }

    fn raw_fd(&self) -> RawFd {
        self.fd
    }
}
