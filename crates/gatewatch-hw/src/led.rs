//! Indicator LED on a sysfs GPIO line.

use crate::{write_attr, HwError, Indicator};
use std::path::{Path, PathBuf};

pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";

pub struct SysfsLed {
    root: PathBuf,
    gpio: u32,
    line_dir: PathBuf,
    exported_here: bool,
}

impl SysfsLed {
    /// Export (if needed) `gpio<gpio>` under `root` as an output, initially off.
    pub fn open(root: &Path, gpio: u32) -> Result<Self, HwError> {
        let line_dir = root.join(format!("gpio{gpio}"));
        let exported_here = !line_dir.exists();
        if exported_here {
            write_attr(&root.join("export"), &gpio.to_string())?;
        }
        write_attr(&line_dir.join("direction"), "out")?;
        write_attr(&line_dir.join("value"), "0")?;

        Ok(Self {
            root: root.to_path_buf(),
            gpio,
            line_dir,
            exported_here,
        })
    }

    pub fn gpio(&self) -> u32 {
        self.gpio
    }
}

impl Indicator for SysfsLed {
    fn set(&mut self, on: bool) -> Result<(), HwError> {
        write_attr(&self.line_dir.join("value"), if on { "1" } else { "0" })
    }

    fn release(&mut self) -> Result<(), HwError> {
        self.set(false)?;
        if self.exported_here {
            write_attr(&self.root.join("unexport"), &self.gpio.to_string())?;
            self.exported_here = false;
        }
        Ok(())
    }
}
