//! Whole-image operations, driving the bootloader one block at a time.

use core::fmt::Debug;
use core::ops::Range;

use embedded_hal::blocking::i2c::{Read, Transactional, Write};

use crate::protocol::{valid_size, BLOCK_SIZE};
use crate::{Block, Error, Programmer, Version};

/// Progress is reported every this many bytes
pub const PROGRESS_INTERVAL: usize = 1024;

/// Progress information provided to an [`Observer`]
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Progress {
    /// Number of bytes that have been transferred
    pub bytes_complete: usize,
    /// Total number of bytes in the operation
    pub bytes_total: usize,
}

/// Receives notifications while a whole-image operation runs
pub trait Observer {
    /// Bootloader version queried at the start of each operation
    fn version(&mut self, _version: Version) {}

    /// Flash erase completed
    fn erased(&mut self) {}

    fn progress(&mut self, _progress: Progress) {}
}

impl Observer for () {}

/// Block cursor over a single read or write run
#[derive(Clone, PartialEq, Debug)]
struct Session {
    cursor: usize,
    total: usize,
}

impl Session {
    fn new<E>(total: usize) -> Result<Self, Error<E>> {
        if !valid_size(total) {
            return Err(Error::InvalidSize(total));
        }
        Ok(Self { cursor: 0, total })
    }

    /// Range of the next block, if any remain
    fn block(&self) -> Option<Range<usize>> {
        if self.cursor < self.total {
            Some(self.cursor..self.cursor + BLOCK_SIZE)
        } else {
            None
        }
    }

    /// Mark the current block done, returning progress when due
    fn advance(&mut self) -> Option<Progress> {
        self.cursor += BLOCK_SIZE;

        if self.cursor % PROGRESS_INTERVAL == 0 || self.cursor == self.total {
            Some(Progress {
                bytes_complete: self.cursor,
                bytes_total: self.total,
            })
        } else {
            None
        }
    }
}

impl<I, E> Programmer<I, E>
where
    I: Write<Error = E> + Read<Error = E> + Transactional<Error = E>,
    E: Debug,
{
    /// Erase the flash and program `image` into it.
    ///
    /// Stops at the first failed block, later blocks are never attempted.
    pub fn write_image<O: Observer>(
        &mut self,
        image: &[u8],
        observer: &mut O,
    ) -> Result<(), Error<E>> {
        let mut session = Session::new(image.len())?;

        let v = self.version();
        observer.version(v);

        self.erase()?;

        // The bootloader does not answer until the erase has completed
        if !self.options.no_erase_poll {
            let _ = self.version();
        }
        observer.erased();

        while let Some(r) = session.block() {
            let offset = r.start;

            trace!("Writing block at 0x{:06x}", offset);

            match self.transfer_block(offset as u32, Block::Write(&image[r])) {
                Ok(_) => (),
                Err(Error::Bus(err)) => return Err(Error::WriteFailed { offset, err }),
                Err(e) => return Err(e),
            }

            if let Some(p) = session.advance() {
                observer.progress(p);
            }
        }

        Ok(())
    }

    /// Read `size` bytes of flash.
    ///
    /// On a failed block the bytes read so far are returned in
    /// [`Error::ReadFailed`].
    pub fn read_image<O: Observer>(
        &mut self,
        size: usize,
        observer: &mut O,
    ) -> Result<Vec<u8>, Error<E>> {
        let mut session = Session::new(size)?;

        let v = self.version();
        observer.version(v);

        let mut data = vec![0u8; size];

        while let Some(r) = session.block() {
            let offset = r.start;

            trace!("Reading block at 0x{:06x}", offset);

            match self.transfer_block(offset as u32, Block::Read(&mut data[r])) {
                Ok(_) => (),
                Err(Error::Bus(err)) => {
                    data.truncate(offset);
                    return Err(Error::ReadFailed { offset, data, err });
                }
                Err(e) => return Err(e),
            }

            if let Some(p) = session.advance() {
                observer.progress(p);
            }
        }

        Ok(data)
    }

    /// Read flash back and compare it against `image`
    pub fn verify_image<O: Observer>(
        &mut self,
        image: &[u8],
        observer: &mut O,
    ) -> Result<(), Error<E>> {
        let mut session = Session::new(image.len())?;
        let mut actual = [0u8; BLOCK_SIZE];

        while let Some(r) = session.block() {
            let offset = r.start;

            match self.transfer_block(offset as u32, Block::Read(&mut actual)) {
                Ok(_) => (),
                Err(Error::Bus(err)) => {
                    return Err(Error::ReadFailed {
                        offset,
                        data: Vec::new(),
                        err,
                    })
                }
                Err(e) => return Err(e),
            }

            let expected = &image[r];
            if let Some(i) = expected.iter().zip(actual.iter()).position(|(a, b)| a != b) {
                return Err(Error::VerifyFailed {
                    offset: offset + i,
                    expected: expected.to_vec(),
                    actual: actual.to_vec(),
                });
            }

            if let Some(p) = session.advance() {
                observer.progress(p);
            }
        }

        Ok(())
    }
}
