//! Scheduler states and the events flowing in and out of the monitor.

use std::fmt;

use crate::domain::BotId;

/// SchedulerState is the lifecycle state of the poll scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Registry not loaded yet; ticks are ignored and saves are refused.
    Idle,
    /// Ticking.
    Active,
    /// Suspended by a lifecycle signal; in-flight polls still complete.
    Paused,
    /// Shut down; all in-flight polls were cancelled.
    Stopped,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "idle"),
            SchedulerState::Active => write!(f, "active"),
            SchedulerState::Paused => write!(f, "paused"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// External lifecycle signal, e.g. the host application going to background.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Pause,
    Resume,
    Stop,
}

/// Change notification for presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    BotAdded(BotId),
    BotRemoved(BotId),
    StatsUpdated(BotId),
    PollFailed { id: BotId, error: String },
    StateChanged(SchedulerState),
}
