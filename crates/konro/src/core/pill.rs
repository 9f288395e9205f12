use std::thread;

/// A poison pill that propagates worker-task panics to the owner.
///
/// Moved into a worker, it is dropped during unwinding if the worker
/// panics; the drop re-panics in whichever thread observes it, so a dead
/// generation worker surfaces as a panic instead of a silent hang.
pub(crate) struct Pill {}

impl Pill {
    pub fn new() -> Self {
        Self {}
    }
}

impl Drop for Pill {
    fn drop(&mut self) {
        if thread::panicking() {
            panic!("generation worker panicked - propagating to owner");
        }
    }
}
