use std::path::Path;

use linux_embedded_hal::i2cdev::linux::LinuxI2CError;
use linux_embedded_hal::I2cdev;

use crate::protocol::VCT_I2C_ADDR;
use crate::{Options, Programmer};

impl Programmer<I2cdev, LinuxI2CError> {
    /// Create a new programmer on a linux I2C bus device (`/dev/i2c-N`)
    pub fn linux<P: AsRef<Path>>(bus: P, options: Options) -> Result<Self, LinuxI2CError> {
        // Open bus
        let mut i2c = I2cdev::new(bus)?;

        // Address the bootloader now so a missing adapter or busy address
        // is reported here rather than on the first transaction
        i2c.set_slave_address(VCT_I2C_ADDR as u16)?;

        Ok(Self::new(i2c, options))
    }
}
