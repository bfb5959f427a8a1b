//! Test doubles for the hardware contracts.
//!
//! A harness hands these to the instruments, AHRS and autopilot in place of
//! real drivers, then keeps a handle to feed samples or inspect servo traffic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{lock, Clock, HardwareSource, ServoHardware};
use crate::error::{EfisError, Result};

#[derive(Debug)]
struct Script<T> {
    queue: VecDeque<T>,
    repeat: Option<T>,
    fault: Option<String>,
}

/// Source that replays queued samples, then optionally repeats one forever.
pub struct ScriptedSource<T> {
    script: Arc<Mutex<Script<T>>>,
    time_base: f64,
}

/// Feeds a `ScriptedSource` after it has been boxed into a component.
#[derive(Clone)]
pub struct ScriptHandle<T> {
    script: Arc<Mutex<Script<T>>>,
}

impl<T: Clone> ScriptedSource<T> {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                queue: VecDeque::new(),
                repeat: None,
                fault: None,
            })),
            time_base: 0.0,
        }
    }

    pub fn with_samples(samples: impl IntoIterator<Item = T>) -> Self {
        let source = Self::new();
        lock(&source.script).queue.extend(samples);
        source
    }

    /// Returns `sample` on every poll once the queue is drained.
    pub fn repeating(sample: T) -> Self {
        let source = Self::new();
        lock(&source.script).repeat = Some(sample);
        source
    }

    pub fn with_time_base(mut self, hz: f64) -> Self {
        self.time_base = hz;
        self
    }

    pub fn handle(&self) -> ScriptHandle<T> {
        ScriptHandle {
            script: Arc::clone(&self.script),
        }
    }
}

impl<T: Clone> Default for ScriptedSource<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> ScriptHandle<T> {
    pub fn push(&self, sample: T) {
        lock(&self.script).queue.push_back(sample);
    }

    pub fn set_repeat(&self, sample: Option<T>) {
        lock(&self.script).repeat = sample;
    }

    /// Make the next poll fail as a broken driver would.
    pub fn fail_next(&self, reason: impl Into<String>) {
        lock(&self.script).fault = Some(reason.into());
    }
}

impl<T: Clone> HardwareSource for ScriptedSource<T> {
    type Sample = T;

    fn sample(&mut self) -> Result<Option<T>> {
        let mut script = lock(&self.script);
        if let Some(reason) = script.fault.take() {
            return Err(EfisError::BadIoDriver(reason));
        }
        Ok(script.queue.pop_front().or_else(|| script.repeat.clone()))
    }

    fn time_base(&self) -> f64 {
        self.time_base
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ServoCommand {
    StateChange {
        roll: Option<bool>,
        pitch: Option<bool>,
        rudder: Option<bool>,
    },
    Aileron(f64, f64),
    Elevator(f64, f64),
    Rudder(f64, f64),
}

#[derive(Debug, Default)]
pub struct ServoLog {
    pub commands: Vec<ServoCommand>,
    pub roll_on: bool,
    pub pitch_on: bool,
    pub rudder_on: bool,
}

impl ServoLog {
    pub fn last_aileron(&self) -> Option<f64> {
        self.commands.iter().rev().find_map(|c| match c {
            ServoCommand::Aileron(force, _) => Some(*force),
            _ => None,
        })
    }

    pub fn last_elevator(&self) -> Option<f64> {
        self.commands.iter().rev().find_map(|c| match c {
            ServoCommand::Elevator(force, _) => Some(*force),
            _ => None,
        })
    }

    pub fn last_rudder(&self) -> Option<f64> {
        self.commands.iter().rev().find_map(|c| match c {
            ServoCommand::Rudder(force, _) => Some(*force),
            _ => None,
        })
    }

    pub fn state_changes(&self) -> Vec<ServoCommand> {
        self.commands
            .iter()
            .filter(|c| matches!(c, ServoCommand::StateChange { .. }))
            .copied()
            .collect()
    }
}

/// Servo controller that records everything it is told.
#[derive(Clone, Default)]
pub struct MockServos {
    log: Arc<Mutex<ServoLog>>,
}

impl MockServos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> MutexGuard<'_, ServoLog> {
        lock(&self.log)
    }
}

impl ServoHardware for MockServos {
    fn servo_state_change(
        &mut self,
        roll: Option<bool>,
        pitch: Option<bool>,
        rudder: Option<bool>,
    ) -> Result<()> {
        let mut log = lock(&self.log);
        if let Some(on) = roll {
            log.roll_on = on;
        }
        if let Some(on) = pitch {
            log.pitch_on = on;
        }
        if let Some(on) = rudder {
            log.rudder_on = on;
        }
        log.commands.push(ServoCommand::StateChange { roll, pitch, rudder });
        Ok(())
    }

    fn update_aileron_servo(&mut self, force: f64, trim: f64) -> Result<()> {
        lock(&self.log).commands.push(ServoCommand::Aileron(force, trim));
        Ok(())
    }

    fn update_elevator_servo(&mut self, force: f64, trim: f64) -> Result<()> {
        lock(&self.log).commands.push(ServoCommand::Elevator(force, trim));
        Ok(())
    }

    fn update_rudder_servo(&mut self, force: f64, trim: f64) -> Result<()> {
        lock(&self.log).commands.push(ServoCommand::Rudder(force, trim));
        Ok(())
    }
}

/// Clock advanced by hand, shared between the harness and its consumers.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now_us: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now_us: Arc::new(AtomicU64::new(start_us)),
        }
    }

    pub fn advance_us(&self, delta_us: u64) {
        self.now_us.fetch_add(delta_us, Ordering::SeqCst);
    }

    pub fn set_us(&self, now_us: u64) {
        self.now_us.store(now_us, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }
}
