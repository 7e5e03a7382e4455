use crate::domain::models::Effect;
use crate::domain::timer::{CountdownTimer, TimerView};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::feedback::FeedbackSink;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const TICK_PERIOD: Duration = Duration::from_secs(1);

struct Ticker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives a `CountdownTimer` once per second while it is running. At most one
/// ticker exists; it is cancelled whenever the timer leaves Running.
pub struct TimerService {
    timer: Arc<Mutex<CountdownTimer>>,
    feedback: Arc<dyn FeedbackSink>,
    ticker: Mutex<Option<Ticker>>,
}

impl TimerService {
    pub fn new(initial_seconds: u32, feedback: Arc<dyn FeedbackSink>) -> Self {
        Self {
            timer: Arc::new(Mutex::new(CountdownTimer::new(initial_seconds))),
            feedback,
            ticker: Mutex::new(None),
        }
    }

    pub fn view(&self) -> Result<TimerView, InfraError> {
        Ok(lock_timer(&self.timer)?.view())
    }

    pub fn start(&self) -> Result<TimerView, InfraError> {
        self.transition(CountdownTimer::start)
    }

    pub fn pause(&self) -> Result<TimerView, InfraError> {
        self.transition(CountdownTimer::pause)
    }

    pub fn toggle(&self) -> Result<TimerView, InfraError> {
        self.transition(CountdownTimer::toggle)
    }

    /// Cancels the ticker without touching the timer state.
    pub async fn shutdown(&self) {
        let ticker = match self.ticker.lock() {
            Ok(mut ticker) => ticker.take(),
            Err(_) => None,
        };
        if let Some(ticker) = ticker {
            ticker.cancel.cancel();
            let _ = ticker.handle.await;
        }
    }

    fn transition(&self, apply: fn(&mut CountdownTimer) -> bool) -> Result<TimerView, InfraError> {
        let mut ticker = self
            .ticker
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("timer ticker lock poisoned: {error}")))?;
        let (moved, running, view) = {
            let mut timer = lock_timer(&self.timer)?;
            let moved = apply(&mut timer);
            (moved, timer.is_running(), timer.view())
        };
        self.feedback.perform_all(&Effect::click());

        if moved {
            if let Some(previous) = ticker.take() {
                previous.cancel.cancel();
            }
            if running {
                *ticker = Some(self.spawn_ticker());
            }
            debug!(running, seconds_left = view.minutes * 60 + view.seconds, "timer transition");
        }
        Ok(view)
    }

    fn spawn_ticker(&self) -> Ticker {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_ticker(
            Arc::clone(&self.timer),
            Arc::clone(&self.feedback),
            Instant::now() + TICK_PERIOD,
            cancel.clone(),
        ));
        Ticker { cancel, handle }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        if let Ok(mut ticker) = self.ticker.lock() {
            if let Some(ticker) = ticker.take() {
                ticker.cancel.cancel();
            }
        }
    }
}

fn lock_timer(timer: &Mutex<CountdownTimer>) -> Result<MutexGuard<'_, CountdownTimer>, InfraError> {
    timer
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("timer lock poisoned: {error}")))
}

async fn run_ticker(
    timer: Arc<Mutex<CountdownTimer>>,
    feedback: Arc<dyn FeedbackSink>,
    first_tick: Instant,
    cancel: CancellationToken,
) {
    let mut interval = interval_at(first_tick, TICK_PERIOD);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let (effects, running) = match timer.lock() {
            Ok(mut timer) => (timer.tick(), timer.is_running()),
            Err(_) => break,
        };
        if !effects.is_empty() {
            info!("focus timer expired");
            feedback.perform_all(&effects);
        }
        if !running {
            break;
        }
    }
}
