//! Application callbacks.
//!
//! A connection reports four things to the application: it connected, it
//! disconnected, a device wrote a value (event), and a device answered a
//! status request (status). Implement [`ConnectionHandler`] or build a
//! [`Handlers`] from closures.
//!
//! Every callback runs behind a panic boundary: a panicking handler is
//! logged at `warn` and the pipeline carries on.

use crate::addressing::KnxAddress;
use core::fmt;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Receiver of connection lifecycle and bus callbacks.
///
/// `on_event` and `on_status` receive the destination address and the value
/// bytes of the telegram (a 6-bit value arrives as one byte).
pub trait ConnectionHandler: Send + Sync + 'static {
    /// The connection reached the connected state
    fn on_connected(&self) {}

    /// The connection left the connected state
    fn on_disconnected(&self) {}

    /// A device wrote `data` to `address`
    fn on_event(&self, _address: &KnxAddress, _data: &[u8]) {}

    /// A device answered a status request for `address`
    fn on_status(&self, _address: &KnxAddress, _data: &[u8]) {}
}

/// Ignores everything
impl ConnectionHandler for () {}

type Lifecycle = Box<dyn Fn() + Send + Sync>;
type Telegram = Box<dyn Fn(&KnxAddress, &[u8]) + Send + Sync>;

/// Closure-based [`ConnectionHandler`].
///
/// ```
/// use knx_netip::Handlers;
///
/// let handlers = Handlers::new()
///     .connected(|| println!("connected"))
///     .event(|address, data| println!("{address} <- {data:02X?}"));
/// ```
#[derive(Default)]
pub struct Handlers {
    connected: Option<Lifecycle>,
    disconnected: Option<Lifecycle>,
    event: Option<Telegram>,
    status: Option<Telegram>,
}

impl Handlers {
    /// No callbacks registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connected callback
    #[must_use]
    pub fn connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connected = Some(Box::new(f));
        self
    }

    /// Set the disconnected callback
    #[must_use]
    pub fn disconnected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.disconnected = Some(Box::new(f));
        self
    }

    /// Set the event callback
    #[must_use]
    pub fn event(mut self, f: impl Fn(&KnxAddress, &[u8]) + Send + Sync + 'static) -> Self {
        self.event = Some(Box::new(f));
        self
    }

    /// Set the status callback
    #[must_use]
    pub fn status(mut self, f: impl Fn(&KnxAddress, &[u8]) + Send + Sync + 'static) -> Self {
        self.status = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("connected", &self.connected.is_some())
            .field("disconnected", &self.disconnected.is_some())
            .field("event", &self.event.is_some())
            .field("status", &self.status.is_some())
            .finish()
    }
}

impl ConnectionHandler for Handlers {
    fn on_connected(&self) {
        if let Some(f) = &self.connected {
            f();
        }
    }

    fn on_disconnected(&self) {
        if let Some(f) = &self.disconnected {
            f();
        }
    }

    fn on_event(&self, address: &KnxAddress, data: &[u8]) {
        if let Some(f) = &self.event {
            f(address, data);
        }
    }

    fn on_status(&self, address: &KnxAddress, data: &[u8]) {
        if let Some(f) = &self.status {
            f(address, data);
        }
    }
}

/// Run one callback, logging instead of propagating a panic.
pub(crate) fn guarded(callback: &str, f: impl FnOnce()) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(f)) {
        knx_log!(
            warn,
            "{} handler panicked: {}",
            callback,
            panic_message(panic.as_ref())
        );
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string payload>")
}
