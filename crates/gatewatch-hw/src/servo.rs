//! Servo lock actuator on a sysfs PWM channel.

use crate::{write_attr, HwError, LockActuator};
use std::path::{Path, PathBuf};

pub const DEFAULT_PWM_ROOT: &str = "/sys/class/pwm";

/// 50 Hz servo frame.
pub const DEFAULT_PERIOD_NS: u64 = 20_000_000;

const MAX_ANGLE: f32 = 180.0;

/// Duty cycle in nanoseconds for `angle` degrees: (angle/18 + 2.5)% of the
/// period, i.e. 0.5 ms at 0° through 2.5 ms at 180° for a 20 ms frame.
pub fn duty_ns(angle: f32, period_ns: u64) -> u64 {
    let percent = angle as f64 / 18.0 + 2.5;
    (period_ns as f64 * percent / 100.0).round() as u64
}

pub struct SysfsServo {
    chip_dir: PathBuf,
    channel: u32,
    channel_dir: PathBuf,
    period_ns: u64,
    exported_here: bool,
    enabled: bool,
}

impl SysfsServo {
    /// Export (if needed) and configure `pwmchip<chip>/pwm<channel>` under
    /// `root`.
    pub fn open(root: &Path, chip: u32, channel: u32, period_ns: u64) -> Result<Self, HwError> {
        let chip_dir = root.join(format!("pwmchip{chip}"));
        let channel_dir = chip_dir.join(format!("pwm{channel}"));

        let exported_here = !channel_dir.exists();
        if exported_here {
            write_attr(&chip_dir.join("export"), &channel.to_string())?;
        }

        write_attr(&channel_dir.join("period"), &period_ns.to_string())?;
        tracing::info!(chip, channel, period_ns, "servo PWM configured");

        Ok(Self {
            chip_dir,
            channel,
            channel_dir,
            period_ns,
            exported_here,
            enabled: false,
        })
    }

    fn set_duty(&mut self, duty: u64) -> Result<(), HwError> {
        write_attr(&self.channel_dir.join("duty_cycle"), &duty.to_string())?;
        if !self.enabled {
            write_attr(&self.channel_dir.join("enable"), "1")?;
            self.enabled = true;
        }
        Ok(())
    }
}

impl LockActuator for SysfsServo {
    fn drive(&mut self, angle: f32) -> Result<(), HwError> {
        if !(0.0..=MAX_ANGLE).contains(&angle) {
            return Err(HwError::InvalidAngle(angle));
        }
        let duty = duty_ns(angle, self.period_ns);
        tracing::debug!(angle, duty_ns = duty, "servo drive");
        self.set_duty(duty)
    }

    fn idle(&mut self) -> Result<(), HwError> {
        self.set_duty(0)
    }

    fn release(&mut self) -> Result<(), HwError> {
        if self.enabled {
            write_attr(&self.channel_dir.join("enable"), "0")?;
            self.enabled = false;
        }
        if self.exported_here {
            write_attr(&self.chip_dir.join("unexport"), &self.channel.to_string())?;
            self.exported_here = false;
        }
        Ok(())
    }
}
