//! The "marching periods" heartbeat: a cosmetic progress indicator
//! emitted once per new subdirectory (§3, §4.4). Design Notes §9 asks
//! that this be a configurable sink rather than hard-wired to stderr,
//! so tests can observe it instead of writing to the process's real
//! stderr.

use std::io::Write;

/// Receives one tick per subdirectory boundary crossed during a write.
pub trait HeartbeatSink: Send {
    /// Called once when `ChannelWriter` opens a file in a new
    /// subdirectory, if `marching_periods` is enabled.
    fn tick(&mut self);
}

/// The original behavior: write a bare `.` to stderr, unbuffered.
#[derive(Debug, Default)]
pub struct StderrHeartbeat;

impl HeartbeatSink for StderrHeartbeat {
    fn tick(&mut self) {
        let _ = write!(std::io::stderr(), ".");
        let _ = std::io::stderr().flush();
    }
}

/// A sink that does nothing, for channels with `marching_periods`
/// disabled or for tests that don't care about the heartbeat.
#[derive(Debug, Default)]
pub struct NullHeartbeat;

impl HeartbeatSink for NullHeartbeat {
    fn tick(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingHeartbeat(usize);

    impl HeartbeatSink for CountingHeartbeat {
        fn tick(&mut self) {
            self.0 += 1;
        }
    }

    #[test]
    fn counting_sink_counts_ticks() {
        let mut sink = CountingHeartbeat::default();
        sink.tick();
        sink.tick();
        assert_eq!(sink.0, 2);
    }
}
