use embedded_hal::blocking::i2c::{Operation, Read, Transactional, Write};

use vct_flash::protocol::{FRAME_LEN, MAX_SIZE, VCT_I2C_ADDR};

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct SimError;

/// Bus transactions seen by the simulated device
#[derive(Clone, PartialEq, Debug)]
pub enum Event {
    Write(Vec<u8>),
    Read(usize),
    Frame { header: [u8; FRAME_LEN], len: usize },
}

/// Simulated VCT bootloader with failure injection
#[derive(Debug)]
pub struct SimBus {
    pub flash: Vec<u8>,
    pub version: u8,
    pub events: Vec<Event>,

    /// Fail the Nth (1-based) block transaction
    pub fail_block: Option<usize>,
    pub fail_erase: bool,
    pub fail_version: bool,

    blocks: usize,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            flash: vec![0xff; 4096],
            version: 0x12,
            events: vec![],
            fail_block: None,
            fail_erase: false,
            fail_version: false,
            blocks: 0,
        }
    }

    pub fn frames(&self) -> Vec<[u8; FRAME_LEN]> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Frame { header, .. } => Some(*header),
                _ => None,
            })
            .collect()
    }
}

impl Write for SimBus {
    type Error = SimError;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), SimError> {
        assert_eq!(address, VCT_I2C_ADDR);
        self.events.push(Event::Write(bytes.to_vec()));

        match bytes {
            [0x03] if self.fail_version => Err(SimError),
            [0x2a, 0x00] if self.fail_erase => Err(SimError),
            [0x2a, 0x00] => {
                self.flash.iter_mut().for_each(|b| *b = 0xff);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl Read for SimBus {
    type Error = SimError;

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<(), SimError> {
        assert_eq!(address, VCT_I2C_ADDR);
        self.events.push(Event::Read(buffer.len()));

        if self.fail_version {
            return Err(SimError);
        }
        buffer.iter_mut().for_each(|b| *b = self.version);

        Ok(())
    }
}

impl Transactional for SimBus {
    type Error = SimError;

    fn exec<'a>(&mut self, address: u8, ops: &mut [Operation<'a>]) -> Result<(), SimError> {
        assert_eq!(address, VCT_I2C_ADDR);
        assert_eq!(ops.len(), 2);

        let header = match &ops[0] {
            Operation::Write(h) if h.len() == FRAME_LEN => [h[0], h[1], h[2], h[3], h[4]],
            _ => panic!("expected a frame header"),
        };
        let addr = (header[1] as usize) << 16 | (header[2] as usize) << 8 | header[3] as usize;
        let len = header[4] as usize;

        self.blocks += 1;
        self.events.push(Event::Frame { header, len });

        if self.fail_block == Some(self.blocks) {
            return Err(SimError);
        }

        if self.flash.len() < addr + len {
            assert!(addr + len <= MAX_SIZE);
            self.flash.resize(addr + len, 0xff);
        }

        match &mut ops[1] {
            Operation::Read(b) => {
                assert_eq!((header[0], b.len()), (0x23, len));
                b.copy_from_slice(&self.flash[addr..addr + len]);
            }
            Operation::Write(b) => {
                assert_eq!((header[0], b.len()), (0x22, len));
                self.flash[addr..addr + len].copy_from_slice(b);
            }
        }

        Ok(())
    }
}

/// Records every notification from a whole-image operation
#[derive(Default, Debug)]
pub struct Recorder {
    pub versions: Vec<vct_flash::Version>,
    pub erased: usize,
    pub progress: Vec<vct_flash::Progress>,
}

impl vct_flash::Observer for Recorder {
    fn version(&mut self, v: vct_flash::Version) {
        self.versions.push(v);
    }

    fn erased(&mut self) {
        self.erased += 1;
    }

    fn progress(&mut self, p: vct_flash::Progress) {
        self.progress.push(p);
    }
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}
