#[macro_use]
extern crate log;

extern crate structopt;
use structopt::StructOpt;

extern crate simplelog;
use simplelog::{Config, LevelFilter, SimpleLogger};

use anyhow::anyhow;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use vct_flash::image::{self, ImageError};
use vct_flash::protocol::{valid_size, BLOCK_SIZE, MAX_SIZE};
use vct_flash::{Error, Observer, Options, Programmer, Progress, Version};

#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "vct-flash", about = "Micronas VCT I2C Flash Utility")]
pub struct Args {
    /// I2C bus device file (/dev/i2c-N)
    bus: PathBuf,

    #[structopt(subcommand)]
    command: Command,

    #[structopt(flatten)]
    options: Options,

    /// Log level for console output
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, Debug, StructOpt)]
pub enum Command {
    /// Read SIZE bytes from flash into FILE
    Read {
        file: PathBuf,

        /// Bytes to read, decimal or with a unit (eg. 512KiB)
        #[structopt(parse(try_from_str = parse_size))]
        size: usize,
    },

    /// Erase flash and write FILE to it (size = file size)
    Write {
        file: PathBuf,

        /// Read the flash back and compare after writing
        #[structopt(long)]
        verify: bool,
    },
}

/// Process exit codes
#[derive(Copy, Clone, PartialEq, Debug)]
enum Exit {
    Args = 1,
    Bus = 2,
    File = 5,
    Erase = 6,
    Transfer = 10,
    Verify = 11,
}

impl<E> From<&Error<E>> for Exit {
    fn from(e: &Error<E>) -> Self {
        match e {
            Error::InvalidSize(_) => Exit::Args,
            Error::EraseFailed(_) => Exit::Erase,
            Error::VerifyFailed { .. } => Exit::Verify,
            _ => Exit::Transfer,
        }
    }
}

impl From<&ImageError> for Exit {
    fn from(e: &ImageError) -> Self {
        match e {
            ImageError::InvalidSize(_) => Exit::Args,
            ImageError::Io { .. } => Exit::File,
        }
    }
}

fn parse_size(s: &str) -> anyhow::Result<usize> {
    if let Ok(n) = s.parse::<usize>() {
        return Ok(n);
    }

    let n = bytefmt::parse(s).map_err(|e| anyhow!("invalid size '{}': {}", s, e))?;

    Ok(n as usize)
}

/// Renders bootloader notifications to the console
struct Console {
    bar: ProgressBar,
}

impl Console {
    fn new(label: &str, total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg} [{bar:40}] {bytes}/{total_bytes} ({eta})")
                .progress_chars("=> "),
        );
        bar.set_message(label);

        Self { bar }
    }

    fn finish(self) {
        self.bar.finish_with_message("done");
    }

    fn abandon(self) {
        self.bar.abandon_with_message("failed");
    }
}

impl Observer for Console {
    fn version(&mut self, version: Version) {
        info!("Bootloader version: {}", version);
    }

    fn erased(&mut self) {
        info!("Flash erased");
    }

    fn progress(&mut self, p: Progress) {
        self.bar.set_position(p.bytes_complete as u64);
    }
}

fn main() {
    // Parse out arguments
    let o = Args::from_args();

    // Configure logger
    let _ = SimpleLogger::init(o.log_level, Config::default());

    if let Err(code) = run(o) {
        std::process::exit(code as i32);
    }
}

fn run(o: Args) -> Result<(), Exit> {
    if let Command::Read { size, .. } = &o.command {
        if !valid_size(*size) {
            error!(
                "Invalid size specified: must be a multiple of {} B and no larger than {} B",
                BLOCK_SIZE, MAX_SIZE
            );
            return Err(Exit::Args);
        }
    }

    info!("Opening I2C bus {}", o.bus.display());

    let mut p = Programmer::linux(&o.bus, o.options.clone()).map_err(|e| {
        error!("Unable to open I2C bus: {:?}", e);
        Exit::Bus
    })?;

    match o.command {
        Command::Write { file, verify } => {
            let data = image::load(&file).map_err(|e| {
                error!("{}", e);
                Exit::from(&e)
            })?;

            info!(
                "Writing {} from {}",
                bytefmt::format(data.len() as u64),
                file.display()
            );

            let mut c = Console::new("Writing flash", data.len());
            if let Err(e) = p.write_image(&data, &mut c) {
                c.abandon();
                error!("{}", e);
                return Err(Exit::from(&e));
            }
            c.finish();

            if verify {
                let mut c = Console::new("Verifying flash", data.len());
                if let Err(e) = p.verify_image(&data, &mut c) {
                    c.abandon();
                    error!("{}", e);
                    if let Error::VerifyFailed {
                        expected, actual, ..
                    } = &e
                    {
                        error!("Expected: {}", hex::encode(expected));
                        error!("Actual:   {}", hex::encode(actual));
                    }
                    return Err(Exit::from(&e));
                }
                c.finish();
            }
        }
        Command::Read { file, size } => {
            info!("Reading {} to {}", bytefmt::format(size as u64), file.display());

            let mut c = Console::new("Reading flash", size);
            let (data, res) = match p.read_image(size, &mut c) {
                Ok(d) => {
                    c.finish();
                    (d, Ok(()))
                }
                Err(Error::ReadFailed { offset, data, err }) => {
                    c.abandon();
                    error!("Read failed at offset 0x{:06x}: {:?}", offset, err);
                    warn!("Saving {} bytes read before the failure", data.len());
                    (data, Err(Exit::Transfer))
                }
                Err(e) => {
                    c.abandon();
                    error!("{}", e);
                    return Err(Exit::from(&e));
                }
            };

            image::store(&file, &data).map_err(|e| {
                error!("{}", e);
                Exit::File
            })?;

            res?;
        }
    }

    info!("Done");

    Ok(())
}
