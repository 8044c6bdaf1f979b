use std::time::Duration;

use tokio::time::Instant;

/// Counters and timestamps for one delivery run.
///
/// Only the engine mutates the state; callbacks observe it by reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryState {
    success_count: u64,
    failure_count: u64,
    exception_count: u32,
    consecutive_failure_count: u32,
    cursor: u64,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl DeliveryState {
    /// Messages written without an exception, less those the gateway later
    /// reported as rejected.
    pub const fn success_count(&self) -> u64 {
        self.success_count
    }

    pub const fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// Failed writes of the current message so far.
    pub const fn exception_count(&self) -> u32 {
        self.exception_count
    }

    /// Messages given up on since the last successful write.
    pub const fn consecutive_failure_count(&self) -> u32 {
        self.consecutive_failure_count
    }

    /// Messages the engine has moved past, delivered or not.
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    pub const fn total_count(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub const fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub const fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Zero before the run starts, the run's span once it has finished, and
    /// the time since it started otherwise.
    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (None, _) => Duration::ZERO,
            (Some(started), Some(finished)) => finished.saturating_duration_since(started),
            (Some(started), None) => started.elapsed(),
        }
    }

    pub(crate) fn start(&mut self) {
        self.started_at = Some(Instant::now());
        self.finished_at = None;
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Instant::now());
    }

    pub(crate) const fn record_write(&mut self) {
        self.success_count += 1;
        self.exception_count = 0;
        self.consecutive_failure_count = 0;
    }

    /// Returns the exception count for the current message, including this one.
    pub(crate) const fn record_exception(&mut self) -> u32 {
        self.exception_count += 1;
        self.exception_count
    }

    pub(crate) const fn record_give_up(&mut self) {
        self.failure_count += 1;
        self.consecutive_failure_count += 1;
        self.exception_count = 0;
    }

    /// Reclassifies an earlier successful write as a failure.
    pub(crate) const fn record_rejection(&mut self) {
        self.failure_count += 1;
        self.success_count = self.success_count.saturating_sub(1);
    }

    pub(crate) const fn advance(&mut self) {
        self.cursor += 1;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_write_resets_exception_counters() {
        let mut state = DeliveryState::default();
        state.record_exception();
        state.record_exception();
        state.record_give_up();
        state.record_exception();

        state.record_write();

        assert_eq!(state.success_count(), 1);
        assert_eq!(state.failure_count(), 1);
        assert_eq!(state.exception_count(), 0);
        assert_eq!(state.consecutive_failure_count(), 0);
        assert_eq!(state.total_count(), 2);
    }

    #[test]
    fn test_give_up_keeps_consecutive_count() {
        let mut state = DeliveryState::default();
        assert_eq!(state.record_exception(), 1);
        state.record_give_up();
        assert_eq!(state.record_exception(), 1);
        state.record_give_up();

        assert_eq!(state.consecutive_failure_count(), 2);
        assert_eq!(state.exception_count(), 0);
    }

    #[test]
    fn test_rejection_moves_success_to_failure() {
        let mut state = DeliveryState::default();
        state.record_write();
        state.record_write();
        state.record_rejection();

        assert_eq!(state.success_count(), 1);
        assert_eq!(state.failure_count(), 1);
        assert_eq!(state.total_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed() {
        let mut state = DeliveryState::default();
        assert_eq!(state.elapsed(), Duration::ZERO);

        state.start();
        tokio::time::advance(Duration::from_secs(2)).await;
        let running = state.elapsed();
        assert!(running >= Duration::from_secs(2));

        state.finish();
        let finished = state.elapsed();
        tokio::time::advance(Duration::from_secs(5)).await;

        assert!(finished >= running);
        assert_eq!(state.elapsed(), finished);
    }
}
