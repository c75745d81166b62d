//! gatewatch-hw — Hardware abstraction for the camera node and the lock.
//!
//! V4L2 capture with YUYV→RGB conversion, a sysfs-PWM servo that drives
//! the lock bolt, sysfs-GPIO indicator LEDs, embedded board pin maps and
//! in-memory stand-ins for dry runs and tests.

pub mod board;
pub mod camera;
pub mod frame;
pub mod led;
pub mod servo;
pub mod sim;

pub use board::{lookup_board, BoardProfile};
pub use camera::{Camera, CameraError, CaptureSession, DeviceInfo};
pub use frame::Frame;
pub use led::SysfsLed;
pub use servo::SysfsServo;
pub use sim::{ActuatorCommand, SimulatedActuator, SimulatedIndicator};

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("sysfs write to {path} failed: {source}")]
    Sysfs {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("servo angle {0} outside 0..=180")]
    InvalidAngle(f32),
    #[error("unknown board profile: {0}")]
    UnknownBoard(String),
}

/// Moves the lock bolt.
pub trait LockActuator: Send {
    /// Command the actuator to `angle` degrees. Returns once the command is
    /// issued; the caller waits for the mechanism to settle.
    fn drive(&mut self, angle: f32) -> Result<(), HwError>;

    /// Stop holding position (removes servo jitter between moves).
    fn idle(&mut self) -> Result<(), HwError>;

    /// Give the underlying handles back to the system.
    fn release(&mut self) -> Result<(), HwError>;
}

/// A two-state output (status LED).
pub trait Indicator: Send {
    fn set(&mut self, on: bool) -> Result<(), HwError>;
    fn release(&mut self) -> Result<(), HwError>;
}

impl<A: LockActuator + ?Sized> LockActuator for Box<A> {
    fn drive(&mut self, angle: f32) -> Result<(), HwError> {
        (**self).drive(angle)
    }

    fn idle(&mut self) -> Result<(), HwError> {
        (**self).idle()
    }

    fn release(&mut self) -> Result<(), HwError> {
        (**self).release()
    }
}

impl<I: Indicator + ?Sized> Indicator for Box<I> {
    fn set(&mut self, on: bool) -> Result<(), HwError> {
        (**self).set(on)
    }

    fn release(&mut self) -> Result<(), HwError> {
        (**self).release()
    }
}

/// Write a sysfs attribute, mapping failures to [`HwError::Sysfs`].
pub(crate) fn write_attr(path: &Path, value: &str) -> Result<(), HwError> {
    std::fs::write(path, value).map_err(|source| HwError::Sysfs {
        path: path.to_path_buf(),
        source,
    })
}
