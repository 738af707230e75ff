//! Per-tick quality decision.
//!
//! Pure function from the current controller state, the sampler reading and
//! any pending pressure signal to the next state plus at most one event. No
//! locking, logging or publishing happens here.
//!
//! Rules are evaluated in strict precedence: emergency entry, emergency exit,
//! pressure downgrade, then the hysteresis-gated FPS steps.
use std::time::Duration;

use crate::config::ControllerConfig;
use crate::pressure::PressureSignal;
use crate::sampler::PerformanceSampler;

/// Which preset the controller is holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal { rank: usize },
    /// Minimal preset forced; `resume_rank` is where the controller left off.
    Emergency { resume_rank: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDirection {
    Down,
    Up,
}

/// State owned by exactly one controller.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerState {
    pub mode: Mode,
    pub last_adjustment: Option<Duration>,
    /// Consecutive stable ticks in the current run.
    pub stable_ticks: u32,
    pub run_started: Option<Duration>,
    pub run_direction: Option<RunDirection>,
    pub thermal_throttled: bool,
    /// Host hidden; FPS-driven rules are paused.
    pub suspended: bool,
    pub pending_pressure: Option<PressureSignal>,
}

impl ControllerState {
    pub fn baseline(rank: usize) -> Self {
        Self {
            mode: Mode::Normal { rank },
            last_adjustment: None,
            stable_ticks: 0,
            run_started: None,
            run_direction: None,
            thermal_throttled: false,
            suspended: false,
            pending_pressure: None,
        }
    }

    /// Rank of the preset currently applied; emergency always applies rank 0.
    pub fn rank(&self) -> usize {
        match self.mode {
            Mode::Normal { rank } => rank,
            Mode::Emergency { .. } => 0,
        }
    }

    pub fn is_emergency(&self) -> bool {
        matches!(self.mode, Mode::Emergency { .. })
    }

    pub(crate) fn reset_run(&mut self) {
        self.stable_ticks = 0;
        self.run_started = None;
        self.run_direction = None;
    }

    fn cooldown_elapsed(&self, now: Duration, cooldown: Duration) -> bool {
        self.last_adjustment
            .map_or(true, |at| now.saturating_sub(at) >= cooldown)
    }

    fn mark_adjusted(&mut self, now: Duration) {
        self.last_adjustment = Some(now);
        self.reset_run();
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControllerEvent {
    EnteredEmergency { from_rank: usize },
    ExitedEmergency { rank: usize },
    PressureDowngrade { from: usize, to: usize, signal: PressureSignal },
    /// Pressure arrived during emergency and lowered the resume point.
    PressureAbsorbed { resume_rank: usize, signal: PressureSignal },
    Downgraded { from: usize, to: usize },
    Upgraded { from: usize, to: usize },
}

impl ControllerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerEvent::EnteredEmergency { .. } => "entered_emergency",
            ControllerEvent::ExitedEmergency { .. } => "exited_emergency",
            ControllerEvent::PressureDowngrade { .. } => "pressure_downgrade",
            ControllerEvent::PressureAbsorbed { .. } => "pressure_absorbed",
            ControllerEvent::Downgraded { .. } => "downgraded",
            ControllerEvent::Upgraded { .. } => "upgraded",
        }
    }

    /// Whether the applied preset changed.
    pub fn changes_level(&self) -> bool {
        !matches!(self, ControllerEvent::PressureAbsorbed { .. })
    }
}

#[derive(Debug)]
pub struct Decision {
    pub state: ControllerState,
    pub event: Option<ControllerEvent>,
}

impl Decision {
    fn hold(state: ControllerState) -> Self {
        Self { state, event: None }
    }
}

pub fn decide_next_state(
    current: &ControllerState,
    sampler: &PerformanceSampler,
    now: Duration,
    max_rank: usize,
    config: &ControllerConfig,
) -> Decision {
    let mut next = current.clone();
    let pressure = next.pending_pressure.take().filter(PressureSignal::is_downgrade);
    let fps = sampler.current_fps();
    let fps_live = !current.suspended && sampler.has_reading();

    match current.mode {
        Mode::Normal { rank } => {
            let rank = rank.min(max_rank);

            if fps_live && fps < config.emergency_below_fps {
                let resume_rank = match pressure {
                    Some(_) => rank.saturating_sub(1),
                    None => rank,
                };
                next.mode = Mode::Emergency { resume_rank };
                next.mark_adjusted(now);
                return Decision {
                    state: next,
                    event: Some(ControllerEvent::EnteredEmergency { from_rank: rank }),
                };
            }

            if let Some(signal) = pressure {
                next.reset_run();
                if rank == 0 {
                    next.mode = Mode::Normal { rank };
                    return Decision::hold(next);
                }
                let to = rank - 1;
                next.mode = Mode::Normal { rank: to };
                next.mark_adjusted(now);
                return Decision {
                    state: next,
                    event: Some(ControllerEvent::PressureDowngrade {
                        from: rank,
                        to,
                        signal,
                    }),
                };
            }

            next.mode = Mode::Normal { rank };
            if !fps_live {
                next.reset_run();
                return Decision::hold(next);
            }
            step_on_fps(next, rank, sampler, now, max_rank, config)
        }
        Mode::Emergency { resume_rank } => {
            let resume_rank = match pressure {
                Some(_) => resume_rank.saturating_sub(1),
                None => resume_rank,
            };
            next.reset_run();

            if fps_live && fps > config.emergency_exit_fps() {
                let rank = resume_rank.saturating_sub(1).min(max_rank);
                next.mode = Mode::Normal { rank };
                next.mark_adjusted(now);
                return Decision {
                    state: next,
                    event: Some(ControllerEvent::ExitedEmergency { rank }),
                };
            }

            next.mode = Mode::Emergency { resume_rank };
            let event = pressure.map(|signal| ControllerEvent::PressureAbsorbed {
                resume_rank,
                signal,
            });
            Decision { state: next, event }
        }
    }
}

fn step_on_fps(
    mut next: ControllerState,
    rank: usize,
    sampler: &PerformanceSampler,
    now: Duration,
    max_rank: usize,
    config: &ControllerConfig,
) -> Decision {
    let cooldown_ok = next.cooldown_elapsed(now, config.cooldown());
    let direction = if sampler.should_reduce() && rank > 0 && cooldown_ok {
        Some(RunDirection::Down)
    } else if sampler.should_increase() && rank < max_rank && cooldown_ok && !next.thermal_throttled
    {
        Some(RunDirection::Up)
    } else {
        None
    };

    let Some(direction) = direction else {
        next.reset_run();
        return Decision::hold(next);
    };
    if !sampler.is_stable() {
        next.reset_run();
        return Decision::hold(next);
    }

    if next.run_direction != Some(direction) {
        next.run_direction = Some(direction);
        next.run_started = Some(now);
        next.stable_ticks = 0;
    }
    next.stable_ticks = next.stable_ticks.saturating_add(1);
    let run_elapsed = now.saturating_sub(next.run_started.unwrap_or(now));

    let (gate, to) = match direction {
        RunDirection::Down => (config.downgrade_gate, rank - 1),
        RunDirection::Up => (config.upgrade_gate, rank + 1),
    };
    if !gate.is_satisfied(next.stable_ticks, run_elapsed) {
        return Decision::hold(next);
    }

    next.mode = Mode::Normal { rank: to };
    next.mark_adjusted(now);
    let event = match direction {
        RunDirection::Down => ControllerEvent::Downgraded { from: rank, to },
        RunDirection::Up => ControllerEvent::Upgraded { from: rank, to },
    };
    Decision {
        state: next,
        event: Some(event),
    }
}
