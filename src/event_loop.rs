use std::future::{Future, poll_fn};
use std::os::fd::{AsRawFd, RawFd};
use std::task::Poll;

use log::{debug, info, warn};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::io::Interest;
use tokio::io::unix::AsyncFd;

use crate::error::GpioError;
use crate::gpio::{GpioFs, PinNumber, PinRegistry};

/// Anything that can hand the event loop a descriptor to watch.
pub trait Pollable {
    fn poll_fd(&self) -> RawFd;
}

/// Registration side of the host event loop, as seen by the registry.
pub trait PollQueue {
    fn add_handler(&self, number: PinNumber, fd: RawFd) -> Result<(), GpioError>;
    fn remove_handler(&self, number: PinNumber) -> Result<(), GpioError>;
}

/// Borrowed descriptor; the pin keeps ownership and closes it.
struct WatchedFd(RawFd);

impl AsRawFd for WatchedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

/// Event loop backed by the tokio reactor, which registers descriptors edge-triggered.
///
/// Sysfs value files wake their pollers on every configured transition, so
/// read interest is enough to see each edge.
#[derive(Default)]
pub struct AsyncFdQueue {
    handlers: Mutex<FxHashMap<PinNumber, AsyncFd<WatchedFd>>>,
}

impl AsyncFdQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, number: PinNumber) -> bool {
        self.handlers.lock().contains_key(&number)
    }

    /// Resolves with the pins whose descriptors woke, in ascending order.
    ///
    /// Stays pending while nothing is registered.
    pub async fn next_ready(&self) -> Vec<PinNumber> {
        poll_fn(|cx| {
            let handlers = self.handlers.lock();
            let mut ready = Vec::new();

            for (number, fd) in handlers.iter() {
                match fd.poll_read_ready(cx) {
                    Poll::Ready(Ok(mut guard)) => {
                        guard.clear_ready();
                        ready.push(*number);
                    }
                    // skipped: it registers no waker, so a failing descriptor cannot spin the loop
                    Poll::Ready(Err(e)) => warn!("poll error for pin {number}: {e}"),
                    Poll::Pending => {}
                }
            }

            if ready.is_empty() {
                Poll::Pending
            } else {
                ready.sort_unstable();
                Poll::Ready(ready)
            }
        })
        .await
    }
}

impl PollQueue for AsyncFdQueue {
    fn add_handler(&self, number: PinNumber, fd: RawFd) -> Result<(), GpioError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(GpioError::EventLoop(format!(
                "register pin {number}: no runtime on this thread"
            )));
        }

        let mut handlers = self.handlers.lock();
        // the old registration must go first; dropping it deregisters the same descriptor
        handlers.remove(&number);

        let watched = AsyncFd::with_interest(WatchedFd(fd), Interest::READABLE)
            .map_err(|e| GpioError::EventLoop(format!("register pin {number}: {e}")))?;
        handlers.insert(number, watched);
        debug!("AsyncFdQueue: watching pin {number} on fd {fd}");
        Ok(())
    }

    fn remove_handler(&self, number: PinNumber) -> Result<(), GpioError> {
        self.handlers
            .lock()
            .remove(&number)
            .map(|_| debug!("AsyncFdQueue: stopped watching pin {number}"))
            .ok_or_else(|| GpioError::EventLoop(format!("pin {number} not registered")))
    }
}

/// Queue driven by hand, for running the dispatch path without a reactor.
#[derive(Default)]
pub struct ManualQueue {
    state: Mutex<ManualState>,
}

#[derive(Default)]
struct ManualState {
    registered: FxHashMap<PinNumber, RawFd>,
    ready: Vec<PinNumber>,
    registrations: usize,
}

impl ManualQueue {
    pub fn is_registered(&self, number: PinNumber) -> bool {
        self.state.lock().registered.contains_key(&number)
    }

    pub fn registered_fd(&self, number: PinNumber) -> Option<RawFd> {
        self.state.lock().registered.get(&number).copied()
    }

    /// Total number of successful `add_handler` calls.
    pub fn registrations(&self) -> usize {
        self.state.lock().registrations
    }

    /// Simulates a wake on `number`; returns false when the pin is not registered.
    pub fn notify(&self, number: PinNumber) -> bool {
        let mut state = self.state.lock();
        if !state.registered.contains_key(&number) {
            return false;
        }
        state.ready.push(number);
        true
    }

    pub fn take_ready(&self) -> Vec<PinNumber> {
        std::mem::take(&mut self.state.lock().ready)
    }
}

impl PollQueue for ManualQueue {
    fn add_handler(&self, number: PinNumber, fd: RawFd) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        state.registered.insert(number, fd);
        state.registrations += 1;
        Ok(())
    }

    fn remove_handler(&self, number: PinNumber) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        state.ready.retain(|n| *n != number);
        state
            .registered
            .remove(&number)
            .map(|_| ())
            .ok_or_else(|| GpioError::EventLoop(format!("pin {number} not registered")))
    }
}

/// Runs the read-and-dispatch step for each ready pin; returns how many dispatched.
///
/// Failures are logged and do not affect the other pins.
pub fn dispatch_ready<G, Q, I>(registry: &mut PinRegistry<G, Q>, ready: I) -> usize
where
    G: GpioFs,
    Q: PollQueue,
    I: IntoIterator<Item = PinNumber>,
{
    let mut dispatched = 0;
    for number in ready {
        match registry.dispatch(number) {
            Ok(Some(_)) => dispatched += 1,
            Ok(None) => {}
            Err(e) => warn!("dispatch failed for pin {number}: {e}"),
        }
    }
    dispatched
}

/// Waits for edges and dispatches them until `shutdown` resolves.
pub async fn run_until<G, F>(
    queue: &AsyncFdQueue,
    registry: &mut PinRegistry<G, AsyncFdQueue>,
    shutdown: F,
) where
    G: GpioFs,
    F: Future<Output = ()>,
{
    let mut shutdown = std::pin::pin!(shutdown);
    info!("Event loop running with {} pins", registry.allocated_pins().len());

    loop {
        tokio::select! {
            ready = queue.next_ready() => {
                dispatch_ready(registry, ready);
            }
            _ = &mut shutdown => {
                info!("Event loop stopping");
                break;
            }
        }
    }
}
