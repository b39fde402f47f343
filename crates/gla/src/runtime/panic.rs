//! Capturing panics raised inside worker threads.

use serde::Serialize;
use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt::{self, Display, Formatter},
    panic::{self, Location, PanicHookInfo},
    sync::Once,
};

thread_local! {
    // Set on threads owned by a `Runtime`.  The panic hook only records
    // information for those.
    static IN_WORKER: Cell<bool> = const { Cell::new(false) };

    static LAST_PANIC: RefCell<Option<WorkerPanicInfo>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

// Rust source code location of a panic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanicLocation {
    file: String,
    line: u32,
    col: u32,
}

impl Display for PanicLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

impl PanicLocation {
    fn new(loc: &Location) -> Self {
        Self {
            file: loc.file().to_string(),
            line: loc.line(),
            col: loc.column(),
        }
    }
}

/// Information about a panic in a worker thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerPanicInfo {
    // Panic message, if any.
    message: Option<String>,
    // Panic location, if the panic hook saw it.
    location: Option<PanicLocation>,
}

impl Display for WorkerPanicInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "panic message: {message}")?,
            None => write!(f, "panic message (none)")?,
        }
        match &self.location {
            Some(location) => write!(f, ", panic location: {location}"),
            None => write!(f, ", panic location: unknown"),
        }
    }
}

impl WorkerPanicInfo {
    fn new(panic_info: &PanicHookInfo) -> Self {
        Self {
            message: payload_message(panic_info.payload()),
            location: panic_info.location().map(PanicLocation::new),
        }
    }

    /// Builds panic information from the payload returned by
    /// `catch_unwind`, for panics the hook did not record.
    pub(crate) fn from_payload(payload: &(dyn Any + Send)) -> Self {
        Self {
            message: payload_message(payload),
            location: None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn location(&self) -> Option<&PanicLocation> {
        self.location.as_ref()
    }

    /// One line per failed worker, used as the message of
    /// [`Error::WorkerPanic`](crate::Error::WorkerPanic).
    pub fn summarize(panic_info: &[(usize, WorkerPanicInfo)]) -> String {
        let mut summary = String::from("one or more worker threads terminated unexpectedly");
        for (worker, info) in panic_info {
            summary.push_str(&format!("\nworker {worker}: {info}"));
        }
        summary
    }
}

fn payload_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| payload.downcast_ref::<&str>().map(|v| v.to_string()))
}

/// Chains a hook that records panic information of worker threads in front
/// of whatever hook is installed.  Idempotent.
pub(crate) fn install_panic_hook() {
    INSTALL_HOOK.call_once(|| {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(move |panic_info| {
            if IN_WORKER.get() {
                let info = WorkerPanicInfo::new(panic_info);
                LAST_PANIC.with(|last| *last.borrow_mut() = Some(info));
            }
            default_hook(panic_info);
        }));
    });
}

/// Marks the current thread as a worker.
pub(crate) fn enter_worker() {
    IN_WORKER.set(true);
}

/// Takes the information recorded by the hook for the last panic on this
/// thread, falling back to the unwinding payload.
pub(crate) fn take_panic_info(payload: &(dyn Any + Send)) -> WorkerPanicInfo {
    LAST_PANIC
        .with(|last| last.borrow_mut().take())
        .unwrap_or_else(|| WorkerPanicInfo::from_payload(payload))
}
