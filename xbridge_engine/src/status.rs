//! Engine lifecycle status: a totally ordered enum where comparisons are
//! meaningful, not just equality — `status < Status::Run` is how the
//! audio bridge decides whether to publish decoded audio, and
//! `status <= Status::Stop` is how both threads decide to exit.

/// Engine lifecycle state, ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Status {
    /// A USB submit failure (or other unrecoverable fault) occurred.
    Error = 0,
    /// Caller requested shutdown; both threads are exiting or have exited.
    Stop = 1,
    /// Engine initialized, not yet activated.
    Ready = 2,
    /// A fresh cycle has begun: latency counters reset, DLL (re)initialized.
    Boot = 3,
    /// USB event loop is running; audio is primed but not yet published.
    Wait = 4,
    /// Audio is being published to/from the host rings.
    Run = 5,
}

impl Status {
    /// Whether the supervisor's outer cycle should keep running
    /// (`status >= Wait`).
    #[inline]
    pub fn is_cycling(self) -> bool {
        self >= Status::Wait
    }

    /// Whether a thread observing this status should terminate
    /// (`status <= Stop`).
    #[inline]
    pub fn should_terminate(self) -> bool {
        self <= Status::Stop
    }

    /// Whether the audio bridge should publish decoded audio rather than
    /// drop it during warm-up (`status == Run`).
    #[inline]
    pub fn is_running(self) -> bool {
        self == Status::Run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_error_stop_ready_boot_wait_run() {
        assert!(Status::Error < Status::Stop);
        assert!(Status::Stop < Status::Ready);
        assert!(Status::Ready < Status::Boot);
        assert!(Status::Boot < Status::Wait);
        assert!(Status::Wait < Status::Run);
    }

    #[test]
    fn is_cycling_true_from_wait_up() {
        assert!(!Status::Boot.is_cycling());
        assert!(Status::Wait.is_cycling());
        assert!(Status::Run.is_cycling());
    }

    #[test]
    fn should_terminate_true_at_or_below_stop() {
        assert!(Status::Error.should_terminate());
        assert!(Status::Stop.should_terminate());
        assert!(!Status::Ready.should_terminate());
    }

    #[test]
    fn is_running_only_at_run() {
        assert!(!Status::Wait.is_running());
        assert!(Status::Run.is_running());
    }
}
