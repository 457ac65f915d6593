use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_termination(_signum: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

/// Ignore SIGPIPE (peers vanish mid-write all the time) and convert the
/// termination signals into a flag the event loop checks between polls.
pub fn install() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);

        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction =
            handle_termination as extern "C" fn(libc::c_int) as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        libc::sigaction(libc::SIGTERM, &action, std::ptr::null_mut());
        libc::sigaction(libc::SIGINT, &action, std::ptr::null_mut());
    }
}

pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}
