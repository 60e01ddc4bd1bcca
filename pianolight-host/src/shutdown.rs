//! SIGINT/SIGTERM handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use signal_hook::consts::TERM_SIGNALS;

use crate::error::HostError;

/// Shared flag set by the first termination signal.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    /// Register for SIGINT, SIGTERM and SIGQUIT. A second signal while the
    /// first is being handled exits the process immediately.
    pub fn install() -> Result<Self, HostError> {
        let shutdown = Self::default();
        for signal in TERM_SIGNALS {
            signal_hook::flag::register_conditional_shutdown(*signal, 1, Arc::clone(&shutdown.flag))?;
            signal_hook::flag::register(*signal, Arc::clone(&shutdown.flag))?;
        }
        debug!("Signal handlers installed");
        Ok(shutdown)
    }

    #[must_use]
    pub fn requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Ask every loop to stop, as a signal would.
    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}
