//! Micronas VCT I2C Flash Bootloader.
//!
//! The bootloader answers at a fixed I2C address and supports four commands:
//! a version query, a whole-chip erase, and 16 byte block reads and writes.
//! Block transfers are a five byte [`protocol::CommandFrame`] followed by the
//! payload, issued as a single combined I2C transaction.

use core::fmt::{self, Debug};
use core::marker::PhantomData;

#[macro_use]
extern crate log;

extern crate embedded_hal;
use embedded_hal::blocking::i2c::{Operation, Read, Transactional, Write};

#[cfg(feature = "linux")]
extern crate linux_embedded_hal;

#[cfg(feature = "linux")]
pub mod linux;

pub mod image;
pub mod protocol;
pub mod sequence;

use protocol::{CommandFrame, Opcode, ADDRESS_LIMIT, VCT_I2C_ADDR};

pub use sequence::{Observer, Progress};

/// Errors returned by the bootloader interface, `E` is the underlying bus error
#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    #[error("invalid size {0} B: must be a non-zero multiple of 16 B no larger than 8 MiB")]
    InvalidSize(usize),

    #[error("invalid block length {0}: must fit in a single frame")]
    InvalidLength(usize),

    #[error("block at 0x{0:x} is outside the 24-bit address space")]
    InvalidAddress(u32),

    #[error("version query failed: {0:?}")]
    Version(E),

    #[error("erase failed: {0:?}")]
    EraseFailed(E),

    #[error("bus transaction failed: {0:?}")]
    Bus(E),

    #[error("write failed at offset 0x{offset:06x}: {err:?}")]
    WriteFailed { offset: usize, err: E },

    /// Block read failed, `data` holds everything read before `offset`
    #[error("read failed at offset 0x{offset:06x}: {err:?}")]
    ReadFailed { offset: usize, data: Vec<u8>, err: E },

    #[error("verify failed at offset 0x{offset:06x}")]
    VerifyFailed {
        offset: usize,
        expected: Vec<u8>,
        actual: Vec<u8>,
    },
}

/// Whether a failure must stop the operation in progress
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Severity {
    /// Diagnostic only, the operation carries on
    Advisory,
    /// The operation in progress was aborted
    Fatal,
}

impl<E> Error<E> {
    pub fn severity(&self) -> Severity {
        match self {
            Error::Version(_) => Severity::Advisory,
            _ => Severity::Fatal,
        }
    }

    /// Flash offset the failure occurred at, where there is one
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::WriteFailed { offset, .. }
            | Error::ReadFailed { offset, .. }
            | Error::VerifyFailed { offset, .. } => Some(*offset),
            _ => None,
        }
    }
}

/// Bootloader version as reported by the device
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum Version {
    Known(u8),
    /// The version query failed
    Unknown,
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Known(v) => write!(f, "0x{:02x}", v),
            Version::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
#[cfg_attr(feature = "structopt", derive(structopt::StructOpt))]
pub struct Options {
    /// Do not poll the bootloader version after erasing
    #[cfg_attr(feature = "structopt", structopt(long))]
    pub no_erase_poll: bool,
}

/// Payload of a single block transfer, the direction selects the opcode
#[derive(Debug)]
pub enum Block<'a> {
    /// Fill the buffer from flash
    Read(&'a mut [u8]),
    /// Program the buffer into flash
    Write(&'a [u8]),
}

impl<'a> Block<'a> {
    fn len(&self) -> usize {
        match self {
            Block::Read(b) => b.len(),
            Block::Write(b) => b.len(),
        }
    }

    fn opcode(&self) -> Opcode {
        match self {
            Block::Read(_) => Opcode::Read,
            Block::Write(_) => Opcode::Write,
        }
    }
}

/// Bootloader interface over an I2C bus.
///
/// Expects exclusive use of the bus, callers sharing an adapter must lock
/// around each top level operation.
pub struct Programmer<I, E> {
    options: Options,
    i2c: I,
    _err: PhantomData<E>,
}

impl<I, E> Programmer<I, E> {
    /// Create a new programmer instance
    pub fn new(i2c: I, options: Options) -> Self {
        Self {
            options,
            i2c,
            _err: PhantomData,
        }
    }

    /// Fetch the programmer options
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Release the underlying bus
    pub fn free(self) -> I {
        self.i2c
    }
}

impl<I, E> Programmer<I, E>
where
    I: Write<Error = E> + Read<Error = E>,
    E: Debug,
{
    /// Query the bootloader version byte
    pub fn get_version(&mut self) -> Result<u8, Error<E>> {
        self.i2c
            .write(VCT_I2C_ADDR, &[Opcode::Version as u8])
            .map_err(Error::Version)?;

        let mut v = [0u8; 1];
        self.i2c.read(VCT_I2C_ADDR, &mut v).map_err(Error::Version)?;

        debug!("Bootloader version: 0x{:02x}", v[0]);

        Ok(v[0])
    }

    /// Query the bootloader version, mapping failure to [`Version::Unknown`]
    pub fn version(&mut self) -> Version {
        match self.get_version() {
            Ok(v) => Version::Known(v),
            Err(e) => {
                debug!("Ignoring {}", e);
                Version::Unknown
            }
        }
    }

    /// Erase the whole flash
    pub fn erase(&mut self) -> Result<(), Error<E>> {
        debug!("Sending erase command");

        self.i2c
            .write(VCT_I2C_ADDR, &[Opcode::Erase as u8, 0x00])
            .map_err(Error::EraseFailed)
    }
}

impl<I, E> Programmer<I, E>
where
    I: Transactional<Error = E>,
    E: Debug,
{
    /// Transfer one block at `address` as a single combined transaction,
    /// a header write followed by the payload read or write.
    pub fn transfer_block(&mut self, address: u32, block: Block<'_>) -> Result<(), Error<E>> {
        let len = block.len();
        if len > u8::MAX as usize {
            return Err(Error::InvalidLength(len));
        }
        if address as u64 + len as u64 > ADDRESS_LIMIT as u64 {
            return Err(Error::InvalidAddress(address));
        }

        let header = CommandFrame::new(block.opcode(), address, len as u8).encode();

        trace!("Frame: {:02x?}", header);

        let payload = match block {
            Block::Read(b) => Operation::Read(b),
            Block::Write(b) => Operation::Write(b),
        };
        let mut ops = [Operation::Write(&header), payload];

        self.i2c.exec(VCT_I2C_ADDR, &mut ops).map_err(Error::Bus)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use embedded_hal_mock::eh0::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    #[test]
    fn version_query_is_unframed() {
        let expectations = [
            I2cTransaction::write(VCT_I2C_ADDR, vec![0x03]),
            I2cTransaction::read(VCT_I2C_ADDR, vec![0x42]),
        ];
        let mut i2c = I2cMock::new(&expectations);

        let mut p = Programmer::new(i2c.clone(), Options::default());
        assert_eq!(p.get_version().unwrap(), 0x42);

        i2c.done();
    }

    #[test]
    fn erase_command() {
        let expectations = [I2cTransaction::write(VCT_I2C_ADDR, vec![0x2a, 0x00])];
        let mut i2c = I2cMock::new(&expectations);

        let mut p = Programmer::new(i2c.clone(), Options::default());
        p.erase().unwrap();

        i2c.done();
    }

    #[test]
    fn severity() {
        assert_eq!(Error::Version(()).severity(), Severity::Advisory);
        assert_eq!(Error::EraseFailed(()).severity(), Severity::Fatal);
        assert_eq!(Error::<()>::InvalidSize(3).severity(), Severity::Fatal);

        let e = Error::WriteFailed { offset: 32, err: () };
        assert_eq!(e.offset(), Some(32));
        assert_eq!(Error::Bus(()).offset(), None);
    }

    #[test]
    fn version_display() {
        assert_eq!(Version::Known(0x0a).to_string(), "0x0a");
        assert_eq!(Version::Unknown.to_string(), "unknown");
    }
}
