use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

// Granularity of interruptible sleeps. Periodic threads wake at least this
// often to observe shutdown.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

// Process-wide run flag. Cloning shares the underlying flag, so every thread
// observes the same shutdown request.
#[derive(Clone)]
pub struct RunFlag {
    stop: Arc<AtomicBool>,
}

impl RunFlag {
    pub fn new() -> RunFlag {
        RunFlag {
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    // Wire SIGINT and SIGTERM to drop the flag. The handlers only set an
    // atomic, so everything else (waking threads, draining queues) happens
    // on the threads that poll it.
    pub fn install_signal_handlers(&self) -> io::Result<()> {
        flag::register(SIGINT, Arc::clone(&self.stop))?;
        flag::register(SIGTERM, Arc::clone(&self.stop))?;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    // Sleep for `interval`, waking early if shutdown is requested. Returns
    // true only when the full interval elapsed with the process still
    // running, so callers can skip their periodic work on the shutdown
    // iteration.
    pub fn sleep_while_running(&self, interval: Duration) -> bool {
        let deadline = Instant::now() + interval;
        while self.is_running() {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
        false
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}
