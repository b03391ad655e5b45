use std::{
    thread,
    time::{Duration, Instant},
};

// Poll `condition` until it holds or `timeout` elapses. Returns whether it held.
pub(crate) fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

pub(crate) const TIMEOUT: Duration = Duration::from_secs(5);
