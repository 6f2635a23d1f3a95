//! Wire format of the VCT I2C bootloader.
//!
//! Erase, read and write use a fixed five byte command header. The version
//! query is a bare command byte followed by a one byte read and does not use
//! the header at all.

/// Fixed I2C address of the bootloader
pub const VCT_I2C_ADDR: u8 = 0x68;

/// Payload size of every read / write transaction
pub const BLOCK_SIZE: usize = 16;

/// Largest image the bootloader can address
pub const MAX_SIZE: usize = 8 * 1024 * 1024;

/// Frame addresses are 24 bits wide
pub const ADDRESS_LIMIT: u32 = 1 << 24;

/// Length of an encoded [`CommandFrame`]
pub const FRAME_LEN: usize = 5;

#[derive(Copy, Clone, PartialEq, Debug)]
#[repr(u8)]
pub enum Opcode {
    /// Query the bootloader version (simple protocol, never framed)
    Version = 0x03,

    /// Write one block to flash
    Write = 0x22,

    /// Read one block from flash
    Read = 0x23,

    /// Erase the whole flash
    Erase = 0x2a,
}

/// Header preceding every block payload.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct CommandFrame {
    pub opcode: Opcode,
    pub address: u32,
    pub length: u8,
}

impl CommandFrame {
    pub fn new(opcode: Opcode, address: u32, length: u8) -> Self {
        Self { opcode, address, length }
    }

    /// Serialise to `[opcode, addr[23:16], addr[15:8], addr[7:0], length]`
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        encode_command(self.opcode, self.address, self.length)
    }
}

/// Build the five byte header for `opcode`, only the low 24 bits of
/// `address` are transmitted.
pub fn encode_command(opcode: Opcode, address: u32, length: u8) -> [u8; FRAME_LEN] {
    [
        opcode as u8,
        (address >> 16) as u8,
        (address >> 8) as u8,
        address as u8,
        length,
    ]
}

/// Check an image or read size is a non-zero whole number of blocks that
/// fits in flash.
pub fn valid_size(len: usize) -> bool {
    len != 0 && len % BLOCK_SIZE == 0 && len <= MAX_SIZE
}
