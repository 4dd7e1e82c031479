//! Run-wide cancellation.
//!
//! Validators run in their own process groups, so a terminal Ctrl-C never
//! reaches them directly. Signals only set a flag here; runners poll it and
//! take their process group down themselves.

use anyhow::{Result, bail};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

static SIGNALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_sig: libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    watch_signals: bool,
}

impl Shutdown {
    /// A handle that only trips through [`Shutdown::request`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs SIGINT/SIGTERM/SIGHUP handlers and returns a handle that also
    /// trips when one of them is delivered.
    pub fn with_signal_handlers() -> Result<Self> {
        for sig in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
            let handler = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            // SAFETY: the handler only performs an atomic store.
            let prev = unsafe { libc::signal(sig, handler) };
            if prev == libc::SIG_ERR {
                bail!("failed to install handler for signal {sig}");
            }
        }
        Ok(Self {
            flag: Arc::new(AtomicBool::new(false)),
            watch_signals: true,
        })
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || (self.watch_signals && SIGNALLED.load(Ordering::SeqCst))
    }
}
