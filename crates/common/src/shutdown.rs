//! Process-wide cooperative shutdown flag.
//!
//! SIGINT/SIGTERM raise the flag; blocking loops poll it between timed
//! waits and unwind cleanly instead of being killed mid-cycle.

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

static QUIT: OnceLock<Arc<AtomicBool>> = OnceLock::new();

/// Handle to the process-wide quit flag.
pub fn quit_flag() -> Arc<AtomicBool> {
    Arc::clone(QUIT.get_or_init(|| Arc::new(AtomicBool::new(false))))
}

/// Register SIGINT and SIGTERM to raise the quit flag. Call once at startup.
pub fn install() -> io::Result<()> {
    let quit = quit_flag();
    flag::register(SIGTERM, Arc::clone(&quit))?;
    flag::register(SIGINT, quit)?;
    tracing::info!("Signal handlers registered (SIGTERM, SIGINT)");
    Ok(())
}

pub fn requested() -> bool {
    quit_flag().load(Ordering::Relaxed)
}

/// Raise the flag programmatically (internal shutdown paths).
pub fn request() {
    quit_flag().store(true, Ordering::Relaxed);
}
