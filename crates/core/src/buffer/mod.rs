use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::slice::DataSlice;
use crate::{Result, WaveSceneError};

/// Default bound on the number of queued slices.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default lag past which queued slices are considered stale: a six-frame
/// budget at 60 Hz.
pub const DEFAULT_SKIP_THRESHOLD: Duration = Duration::from_millis(100);

/// How long [`FrameBuffer::poll`] may wait for the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTimeout {
    /// Probe and return immediately.
    NonBlocking,
    /// Wait up to the given duration.
    Wait(Duration),
    /// Block until data arrives or the buffer is closed.
    Forever,
}

impl From<Duration> for PollTimeout {
    fn from(limit: Duration) -> Self {
        Self::Wait(limit)
    }
}

#[derive(Debug, Default)]
struct BufferState {
    queue: VecDeque<Arc<DataSlice>>,
    current: Option<Arc<DataSlice>>,
    /// Manual-reset "data available" flag: set on push, cleared only when
    /// a poll drains the queue empty.
    available: bool,
    closed: bool,
}

/// Bounded handoff between the audio engine's callback thread and the
/// render loop.
///
/// The producer side ([`FrameBuffer::push`]) never blocks: when the queue
/// is full the incoming slice is dropped, preserving the backlog so the
/// consumer can catch up through it. The consumer side
/// ([`FrameBuffer::poll`]) blocks up to a timeout and, when it finds
/// itself behind, snaps forward to recent data instead of replaying
/// stale frames in order.
#[derive(Debug)]
pub struct FrameBuffer {
    state: Mutex<BufferState>,
    data_ready: Condvar,
    capacity: usize,
    skip_threshold: Duration,
    dropped: AtomicU64,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    /// Creates a buffer with the default capacity and skip threshold.
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_CAPACITY, DEFAULT_SKIP_THRESHOLD)
    }

    /// Creates a buffer with an explicit capacity and skip threshold. A
    /// zero capacity is raised to one so the buffer can always make
    /// progress.
    pub fn with_settings(capacity: usize, skip_threshold: Duration) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            data_ready: Condvar::new(),
            capacity: capacity.max(1),
            skip_threshold,
            dropped: AtomicU64::new(0),
        }
    }

    /// Producer-side, non-blocking append.
    ///
    /// Returns `true` if the slice was accepted. A full or closed buffer
    /// drops the incoming slice (the historical backlog is kept for
    /// catch-up) and only bumps the dropped-frame counter; overflow is
    /// policy here, not an error.
    pub fn push(&self, slice: DataSlice) -> bool {
        let accepted = match self.state.lock() {
            Ok(mut state) => {
                if state.closed || state.queue.len() >= self.capacity {
                    false
                } else {
                    state.queue.push_back(Arc::new(slice));
                    state.available = true;
                    true
                }
            }
            // A poisoned lock means the consumer died mid-poll; the
            // producer must still return without blocking or panicking.
            Err(_) => false,
        };

        if accepted {
            self.data_ready.notify_one();
        } else {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!(dropped, "frame buffer rejected slice");
        }

        accepted
    }

    /// Consumer-side wait-and-dequeue.
    ///
    /// Blocks according to `timeout` for the "data available" signal. On
    /// wake, pops the oldest slice; if that slice lags behind the wall
    /// clock by more than the skip threshold and more than one slice is
    /// still queued, keeps popping until exactly one remains. The final
    /// popped slice is installed as current.
    ///
    /// Returns `Ok(true)` iff a new current slice was installed. A closed
    /// buffer returns `Ok(false)` immediately, which is what wakes a
    /// consumer blocked on [`PollTimeout::Forever`] during teardown.
    pub fn poll(&self, timeout: PollTimeout) -> Result<bool> {
        let mut state = self.lock_state()?;

        match timeout {
            PollTimeout::NonBlocking => {}
            PollTimeout::Forever => {
                while !state.available && !state.closed {
                    state = self
                        .data_ready
                        .wait(state)
                        .map_err(|_| WaveSceneError::Poisoned("frame buffer"))?;
                }
            }
            PollTimeout::Wait(limit) => {
                let deadline = Instant::now() + limit;
                while !state.available && !state.closed {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    (state, _) = self
                        .data_ready
                        .wait_timeout(state, remaining)
                        .map_err(|_| WaveSceneError::Poisoned("frame buffer"))?;
                }
            }
        }

        if state.closed {
            return Ok(false);
        }

        let Some(mut slice) = state.queue.pop_front() else {
            return Ok(false);
        };

        let now = Instant::now();
        if slice.lag(now) > self.skip_threshold && state.queue.len() > 1 {
            let mut skipped = 0_usize;
            while state.queue.len() > 1 {
                match state.queue.pop_front() {
                    Some(next) => slice = next,
                    None => break,
                }
                skipped += 1;
            }
            tracing::debug!(skipped, "consumer behind, snapping to recent data");
        }

        state.current = Some(slice);
        if state.queue.is_empty() {
            state.available = false;
        }

        Ok(true)
    }

    /// The most recently installed slice, if any poll has succeeded yet.
    ///
    /// Slices are immutable snapshots, so the returned handle stays valid
    /// while the next poll replaces the slot.
    pub fn current(&self) -> Option<Arc<DataSlice>> {
        self.state.lock().ok().and_then(|state| state.current.clone())
    }

    /// Closes the buffer and wakes every blocked poll.
    ///
    /// Subsequent pushes are dropped silently, which makes a producer
    /// racing teardown benign. Idempotent.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        self.data_ready.notify_all();
        tracing::debug!("frame buffer closed");
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|state| state.closed).unwrap_or(true)
    }

    /// Number of slices rejected so far, for diagnosing sustained overload.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of slices currently queued (excluding the current slot).
    pub fn queue_len(&self) -> usize {
        self.state.lock().map(|state| state.queue.len()).unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, BufferState>> {
        self.state
            .lock()
            .map_err(|_| WaveSceneError::Poisoned("frame buffer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn slice_at(position: f64, captured_at: Instant) -> DataSlice {
        DataSlice::new(
            position,
            "track",
            vec![vec![0.0; 16]],
            vec![vec![0.0; 8]],
            captured_at,
        )
    }

    fn fresh_slice(position: f64) -> DataSlice {
        slice_at(position, Instant::now())
    }

    fn stale_slice(position: f64) -> DataSlice {
        let past = Instant::now()
            .checked_sub(Duration::from_secs(1))
            .expect("process uptime exceeds one second");
        slice_at(position, past)
    }

    #[test]
    fn queue_length_never_exceeds_capacity() {
        let buffer = FrameBuffer::new();

        for i in 0..25 {
            buffer.push(fresh_slice(i as f64));
        }

        assert_eq!(buffer.queue_len(), DEFAULT_CAPACITY);
        assert_eq!(buffer.dropped_frames(), 15);
    }

    #[test]
    fn push_reports_rejection_when_full() {
        let buffer = FrameBuffer::with_settings(2, DEFAULT_SKIP_THRESHOLD);

        assert!(buffer.push(fresh_slice(0.0)));
        assert!(buffer.push(fresh_slice(1.0)));
        assert!(!buffer.push(fresh_slice(2.0)));
    }

    #[test]
    fn poll_installs_oldest_fresh_slice() {
        let buffer = FrameBuffer::new();
        buffer.push(fresh_slice(1.0));
        buffer.push(fresh_slice(2.0));

        assert!(buffer.poll(PollTimeout::NonBlocking).unwrap());

        let current = buffer.current().expect("slice installed");
        assert_eq!(current.position(), 1.0);
        assert_eq!(buffer.queue_len(), 1);
    }

    #[test]
    fn stale_backlog_drains_to_one_queued_slice() {
        let buffer = FrameBuffer::new();
        for i in 0..8 {
            buffer.push(stale_slice(i as f64));
        }

        assert!(buffer.poll(PollTimeout::NonBlocking).unwrap());

        // The drain discards the intermediates and leaves only the newest
        // queued; the last discarded slice became current.
        assert_eq!(buffer.queue_len(), 1);
        let current = buffer.current().expect("slice installed");
        assert_eq!(current.position(), 6.0);
    }

    #[test]
    fn single_stale_slice_is_not_skipped() {
        let buffer = FrameBuffer::new();
        buffer.push(stale_slice(3.0));

        assert!(buffer.poll(PollTimeout::NonBlocking).unwrap());

        assert_eq!(buffer.queue_len(), 0);
        assert_eq!(buffer.current().unwrap().position(), 3.0);
    }

    #[test]
    fn available_flag_resets_when_queue_empties() {
        let buffer = FrameBuffer::new();
        buffer.push(fresh_slice(1.0));

        assert!(buffer.poll(PollTimeout::NonBlocking).unwrap());
        assert!(!buffer.poll(PollTimeout::NonBlocking).unwrap());
    }

    #[test]
    fn nonblocking_poll_on_empty_buffer_returns_false() {
        let buffer = FrameBuffer::new();

        assert!(!buffer.poll(PollTimeout::NonBlocking).unwrap());
        assert!(buffer.current().is_none());
    }

    #[test]
    fn bounded_wait_times_out_without_data() {
        let buffer = FrameBuffer::new();
        let started = Instant::now();

        let updated = buffer
            .poll(PollTimeout::Wait(Duration::from_millis(30)))
            .unwrap();

        assert!(!updated);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn bounded_wait_wakes_on_push() {
        let buffer = Arc::new(FrameBuffer::new());
        let producer = Arc::clone(&buffer);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.push(fresh_slice(4.0));
        });

        let updated = buffer
            .poll(PollTimeout::Wait(Duration::from_secs(5)))
            .unwrap();

        handle.join().unwrap();
        assert!(updated);
        assert_eq!(buffer.current().unwrap().position(), 4.0);
    }

    #[test]
    fn close_wakes_a_forever_poll() {
        let buffer = Arc::new(FrameBuffer::new());
        let closer = Arc::clone(&buffer);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });

        let updated = buffer.poll(PollTimeout::Forever).unwrap();

        handle.join().unwrap();
        assert!(!updated);
    }

    #[test]
    fn push_after_close_is_dropped() {
        let buffer = FrameBuffer::new();
        buffer.close();

        assert!(!buffer.push(fresh_slice(0.0)));
        assert_eq!(buffer.dropped_frames(), 1);
    }
}
