//! In-memory hardware for dry runs and tests. Clones share their log.

use crate::{HwError, Indicator, LockActuator};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCommand {
    Drive(f32),
    Idle,
    Release,
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedActuator {
    log: Arc<Mutex<Vec<ActuatorCommand>>>,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<ActuatorCommand> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Most recent angle driven to.
    pub fn position(&self) -> Option<f32> {
        self.commands().iter().rev().find_map(|c| match c {
            ActuatorCommand::Drive(angle) => Some(*angle),
            _ => None,
        })
    }

    fn push(&self, cmd: ActuatorCommand) {
        if let Ok(mut log) = self.log.lock() {
            log.push(cmd);
        }
    }
}

impl LockActuator for SimulatedActuator {
    fn drive(&mut self, angle: f32) -> Result<(), HwError> {
        tracing::info!(angle, "[sim] servo drive");
        self.push(ActuatorCommand::Drive(angle));
        Ok(())
    }

    fn idle(&mut self) -> Result<(), HwError> {
        self.push(ActuatorCommand::Idle);
        Ok(())
    }

    fn release(&mut self) -> Result<(), HwError> {
        self.push(ActuatorCommand::Release);
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct IndicatorState {
    on: bool,
    history: Vec<bool>,
    released: bool,
}

#[derive(Debug, Clone)]
pub struct SimulatedIndicator {
    name: &'static str,
    state: Arc<Mutex<IndicatorState>>,
}

impl SimulatedIndicator {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Arc::default(),
        }
    }

    pub fn is_on(&self) -> bool {
        self.state.lock().map(|s| s.on).unwrap_or(false)
    }

    /// Every value passed to `set`, in order.
    pub fn history(&self) -> Vec<bool> {
        self.state.lock().map(|s| s.history.clone()).unwrap_or_default()
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().map(|s| s.released).unwrap_or(false)
    }
}

impl Indicator for SimulatedIndicator {
    fn set(&mut self, on: bool) -> Result<(), HwError> {
        tracing::debug!(led = self.name, on, "[sim] indicator");
        if let Ok(mut s) = self.state.lock() {
            s.on = on;
            s.history.push(on);
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), HwError> {
        if let Ok(mut s) = self.state.lock() {
            s.on = false;
            s.released = true;
        }
        Ok(())
    }
}
