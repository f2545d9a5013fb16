use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tracing::{debug, info};

#[derive(Debug, Default)]
struct Flags {
    skip_source: AtomicBool,
    shutdown: AtomicBool,
}

/// Cooperative cancellation shared with signal handlers and watcher threads.
///
/// Checked by the driver once per frame, after the frame's publish or skip
/// step.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flags: Arc<Flags>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop processing the current source and continue with the next one.
    pub fn request_skip_source(&self) {
        self.flags.skip_source.store(true, Ordering::SeqCst);
    }

    /// Stop processing altogether.
    pub fn request_shutdown(&self) {
        self.flags.shutdown.store(true, Ordering::SeqCst);
    }

    /// Return whether a skip was requested, clearing the request.
    pub fn take_skip_source(&self) -> bool {
        self.flags.skip_source.swap(false, Ordering::SeqCst)
    }

    pub fn shutdown_requested(&self) -> bool {
        self.flags.shutdown.load(Ordering::SeqCst)
    }

    /// Request a skip of the current source for every line entered on stdin.
    pub fn spawn_keypress_watcher(&self) -> std::io::Result<std::thread::JoinHandle<()>> {
        let stop = self.clone();
        info!("press Enter to stop processing the current source");
        std::thread::Builder::new()
            .name("keypress-watcher".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                let mut line = String::new();
                loop {
                    line.clear();
                    match stdin.read_line(&mut line) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            info!("keypress: stopping current source");
                            stop.request_skip_source();
                        }
                    }
                }
                debug!("keypress watcher done");
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_is_consumed() {
        let stop = StopSignal::new();
        let other = stop.clone();
        assert!(!stop.take_skip_source());
        other.request_skip_source();
        assert!(stop.take_skip_source());
        assert!(!stop.take_skip_source());
        assert!(!stop.shutdown_requested());
        other.request_shutdown();
        assert!(stop.shutdown_requested());
        assert!(stop.shutdown_requested());
    }
}
