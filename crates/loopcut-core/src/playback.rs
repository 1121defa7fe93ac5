use std::{
    sync::Arc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::audio::AudioBuffer;

/// Shared cancellation signal for a preview loop.
///
/// Clones observe the same state. Waiting wakes as soon as `cancel` is called
/// instead of sleeping out the full interval.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        *self.inner.cancelled.lock() = true;
        self.inner.signal.notify_all();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    // Returns true if the token is cancelled.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self
                .inner
                .signal
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        *cancelled
    }
}

pub trait PlaybackSink {
    fn play(&mut self, audio: &AudioBuffer) -> Result<()>;
    fn is_active(&self) -> bool;
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub poll_interval: Duration,
    pub gap: Duration,
    // None loops until cancelled.
    pub max_repeats: Option<usize>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            gap: Duration::from_millis(200),
            max_repeats: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    pub passes: usize,
    pub cancelled: bool,
}

#[instrument(skip(sink, audio, token), fields(frames = audio.frames(), max_repeats = ?settings.max_repeats))]
pub fn run_loop<S: PlaybackSink + ?Sized>(
    sink: &mut S,
    audio: &AudioBuffer,
    token: &CancelToken,
    settings: LoopSettings,
) -> Result<LoopOutcome> {
    let mut passes = 0_usize;

    while !token.is_cancelled() {
        if settings.max_repeats.is_some_and(|max| passes >= max) {
            break;
        }

        sink.play(audio)?;
        passes += 1;
        debug!(passes, "preview pass started");

        while !token.wait_timeout(settings.poll_interval) {
            if !sink.is_active() {
                break;
            }
        }
        sink.stop();

        if token.wait_timeout(settings.gap) {
            break;
        }
    }

    let outcome = LoopOutcome {
        passes,
        cancelled: token.is_cancelled(),
    };
    info!(passes, cancelled = outcome.cancelled, "preview loop finished");
    Ok(outcome)
}

// Dropping it cancels and joins.
pub struct LoopHandle {
    token: CancelToken,
    thread: Option<JoinHandle<Result<LoopOutcome>>>,
}

impl LoopHandle {
    pub fn stop(mut self) -> Result<LoopOutcome> {
        self.token.cancel();
        self.join()
    }

    // Only returns on its own when max_repeats is set.
    pub fn wait(mut self) -> Result<LoopOutcome> {
        self.join()
    }

    fn join(&mut self) -> Result<LoopOutcome> {
        let Some(thread) = self.thread.take() else {
            return Err(anyhow::anyhow!("preview thread already joined"));
        };
        thread
            .join()
            .map_err(|_| anyhow::anyhow!("preview thread panicked"))?
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        if self.thread.is_none() {
            return;
        }
        self.token.cancel();
        if let Err(error) = self.join() {
            warn!(?error, "preview thread ended with an error");
        }
    }
}

// The sink is built on the loop thread; output streams are usually tied to the
// thread that opened them.
pub fn spawn_loop<S, F>(make_sink: F, audio: AudioBuffer, settings: LoopSettings) -> Result<LoopHandle>
where
    S: PlaybackSink,
    F: FnOnce() -> Result<S> + Send + 'static,
{
    let token = CancelToken::new();
    let thread_token = token.clone();
    let thread = std::thread::Builder::new()
        .name("loopcut-preview".to_string())
        .spawn(move || {
            let mut sink = make_sink()?;
            run_loop(&mut sink, &audio, &thread_token, settings)
        })
        .context("failed to spawn preview thread")?;

    Ok(LoopHandle {
        token,
        thread: Some(thread),
    })
}

#[cfg(feature = "playback")]
pub use device::RodioSink;

#[cfg(feature = "playback")]
mod device {
    use anyhow::{Context, Result};

    use super::PlaybackSink;
    use crate::audio::AudioBuffer;

    pub struct RodioSink {
        _stream: rodio::OutputStream,
        sink: rodio::Sink,
    }

    impl RodioSink {
        pub fn open_default() -> Result<Self> {
            let mut stream = rodio::OutputStreamBuilder::open_default_stream()
                .context("failed to open default audio output")?;
            stream.log_on_drop(false);
            let sink = rodio::Sink::connect_new(stream.mixer());
            Ok(Self {
                _stream: stream,
                sink,
            })
        }
    }

    impl PlaybackSink for RodioSink {
        fn play(&mut self, audio: &AudioBuffer) -> Result<()> {
            // clear() also pauses, so playback has to be resumed explicitly.
            self.sink.clear();
            self.sink.append(rodio::buffer::SamplesBuffer::new(
                audio.channels,
                audio.sample_rate,
                audio.samples.clone(),
            ));
            self.sink.play();
            Ok(())
        }

        fn is_active(&self) -> bool {
            !self.sink.empty() && !self.sink.is_paused()
        }

        fn stop(&mut self) {
            self.sink.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingSink {
        polls_per_pass: usize,
        remaining: std::cell::Cell<usize>,
        plays: Arc<AtomicUsize>,
        stops: usize,
    }

    impl CountingSink {
        fn new(polls_per_pass: usize) -> Self {
            Self {
                polls_per_pass,
                remaining: std::cell::Cell::new(0),
                plays: Arc::new(AtomicUsize::new(0)),
                stops: 0,
            }
        }
    }

    impl PlaybackSink for CountingSink {
        fn play(&mut self, _audio: &AudioBuffer) -> Result<()> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            self.remaining.set(self.polls_per_pass);
            Ok(())
        }

        fn is_active(&self) -> bool {
            let remaining = self.remaining.get();
            self.remaining.set(remaining.saturating_sub(1));
            remaining > 0
        }

        fn stop(&mut self) {
            self.stops += 1;
            self.remaining.set(0);
        }
    }

    fn fast_settings(max_repeats: Option<usize>) -> LoopSettings {
        LoopSettings {
            poll_interval: Duration::from_millis(1),
            gap: Duration::from_millis(1),
            max_repeats,
        }
    }

    fn silence() -> AudioBuffer {
        AudioBuffer::new(8_000, 1, 16, vec![0.0; 80])
    }

    #[test]
    fn token_wakes_waiters_on_cancel() {
        let token = CancelToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(1)));

        let waiter = token.clone();
        let handle = std::thread::spawn(move || waiter.wait_timeout(Duration::from_secs(30)));
        token.cancel();
        assert!(handle.join().expect("waiter should not panic"));
        assert!(token.is_cancelled());
    }

    #[test]
    fn bounded_loop_runs_requested_passes_and_stops_device() {
        let mut sink = CountingSink::new(3);
        let outcome = run_loop(&mut sink, &silence(), &CancelToken::new(), fast_settings(Some(3)))
            .expect("loop should run");
        assert_eq!(outcome, LoopOutcome { passes: 3, cancelled: false });
        assert_eq!(sink.plays.load(Ordering::SeqCst), 3);
        assert_eq!(sink.stops, 3);
    }

    #[test]
    fn cancelled_token_prevents_any_pass() {
        let token = CancelToken::new();
        token.cancel();
        let mut sink = CountingSink::new(1);
        let outcome =
            run_loop(&mut sink, &silence(), &token, fast_settings(None)).expect("loop should run");
        assert_eq!(outcome.passes, 0);
        assert!(outcome.cancelled);
    }

    #[test]
    fn spawned_loop_stops_on_request() {
        let sink = CountingSink::new(usize::MAX);
        let plays = Arc::clone(&sink.plays);
        let handle = spawn_loop(move || Ok(sink), silence(), fast_settings(None))
            .expect("spawn should succeed");

        while plays.load(Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
        let outcome = handle.stop().expect("loop should stop cleanly");
        assert!(outcome.cancelled);
        assert_eq!(outcome.passes, 1);
    }

    #[test]
    fn spawned_loop_surfaces_sink_errors() {
        let handle = spawn_loop(
            || -> Result<CountingSink> { Err(anyhow::anyhow!("no audio device")) },
            silence(),
            fast_settings(Some(1)),
        )
        .expect("spawn should succeed");
        let error = handle.wait().expect_err("device error should propagate");
        assert!(error.to_string().contains("no audio device"));
    }
}
