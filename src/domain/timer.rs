use crate::domain::models::Effect;
use serde::Serialize;

pub const DEFAULT_TIMER_SECONDS: u32 = 25 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Paused { seconds_left: u32 },
    Running { seconds_left: u32 },
    Expired,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerView {
    pub minutes: u32,
    pub seconds: u32,
    pub running: bool,
    pub expired: bool,
    pub label: String,
}

/// Focus countdown. Paused is also the idle state at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownTimer {
    state: TimerState,
}

impl Default for CountdownTimer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMER_SECONDS)
    }
}

impl CountdownTimer {
    pub fn new(initial_seconds: u32) -> Self {
        let state = if initial_seconds == 0 {
            TimerState::Expired
        } else {
            TimerState::Paused {
                seconds_left: initial_seconds,
            }
        };
        Self { state }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    pub fn seconds_left(&self) -> u32 {
        match self.state {
            TimerState::Paused { seconds_left } | TimerState::Running { seconds_left } => seconds_left,
            TimerState::Expired => 0,
        }
    }

    /// Returns true when the machine moved to Running.
    pub fn start(&mut self) -> bool {
        match self.state {
            TimerState::Paused { seconds_left } => {
                self.state = TimerState::Running { seconds_left };
                true
            }
            TimerState::Running { .. } | TimerState::Expired => false,
        }
    }

    /// Returns true when the machine moved to Paused.
    pub fn pause(&mut self) -> bool {
        match self.state {
            TimerState::Running { seconds_left } => {
                self.state = TimerState::Paused { seconds_left };
                true
            }
            TimerState::Paused { .. } | TimerState::Expired => false,
        }
    }

    pub fn toggle(&mut self) -> bool {
        if self.is_running() {
            self.pause()
        } else {
            self.start()
        }
    }

    /// One elapsed second. Completion effects are returned on the tick that expires.
    pub fn tick(&mut self) -> Vec<Effect> {
        let TimerState::Running { seconds_left } = self.state else {
            return Vec::new();
        };

        let remaining = seconds_left.saturating_sub(1);
        if remaining == 0 {
            self.state = TimerState::Expired;
            return Effect::completion();
        }
        self.state = TimerState::Running {
            seconds_left: remaining,
        };
        Vec::new()
    }

    pub fn view(&self) -> TimerView {
        let seconds_left = self.seconds_left();
        let minutes = seconds_left / 60;
        let seconds = seconds_left % 60;
        TimerView {
            minutes,
            seconds,
            running: self.is_running(),
            expired: self.state == TimerState::Expired,
            label: format!("{minutes:02}:{seconds:02}"),
        }
    }
}
