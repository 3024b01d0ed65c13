use super::{MtOp, Operation, TapeDevice};
use anyhow::{bail, Result};
use log::debug;

// Command bits of the MTSETDRVBUFFER count word.
pub const MT_ST_OPTIONS: u32 = 0xf000_0000;
pub const MT_ST_BOOLEANS: u32 = 0x1000_0000;
pub const MT_ST_SETBOOLEANS: u32 = 0x3000_0000;
pub const MT_ST_CLEARBOOLEANS: u32 = 0x4000_0000;
pub const MT_ST_WRITE_THRESHOLD: u32 = 0x2000_0000;
pub const MT_ST_DEF_BLKSIZE: u32 = 0x5000_0000;
pub const MT_ST_DEF_OPTIONS: u32 = 0x6000_0000;
pub const MT_ST_TIMEOUTS: u32 = 0x7000_0000;
pub const MT_ST_SET_TIMEOUT: u32 = MT_ST_TIMEOUTS;
pub const MT_ST_SET_LONG_TIMEOUT: u32 = MT_ST_TIMEOUTS | 0x0010_0000;
pub const MT_ST_SET_CLN: u32 = 0x8000_0000;

// The mode parameters to be controlled, chosen with bits 20-28.
pub const MT_ST_CLEAR_DEFAULT: u32 = 0xfffff;
pub const MT_ST_DEF_DENSITY: u32 = MT_ST_DEF_OPTIONS | 0x0010_0000;
pub const MT_ST_DEF_COMPRESSION: u32 = MT_ST_DEF_OPTIONS | 0x0020_0000;
pub const MT_ST_DEF_DRVBUFFER: u32 = MT_ST_DEF_OPTIONS | 0x0030_0000;

/// Offset added to the slot number by the special HP changer load command.
pub const MT_ST_HPLOADER_OFFSET: u32 = 10000;

/// Argument bits below the command nibble.
const ARGUMENT_MASK: u32 = !MT_ST_OPTIONS;
/// Largest timeout in seconds. Bit 20 of the argument selects the long timeout.
const TIMEOUT_LIMIT: u32 = (MT_ST_SET_LONG_TIMEOUT & ARGUMENT_MASK) - 1;

bitflags::bitflags! {
    /// Boolean driver options, set or cleared with [`DriveBufferSetting`].
    pub struct DriveBufferOptions: u32 {
        const BUFFER_WRITES = 0x1;
        const ASYNC_WRITES = 0x2;
        const READ_AHEAD = 0x4;
        const DEBUGGING = 0x8;
        /// Write two filemarks when closing after a write
        const TWO_FM = 0x10;
        /// Send MTEOM directly to the drive
        const FAST_MTEOM = 0x20;
        const AUTO_LOCK = 0x40;
        /// Apply settings to the drive defaults
        const DEF_WRITES = 0x80;
        /// Correct readahead backspace position
        const CAN_BSR = 0x100;
        /// Don't use READ BLOCK LIMITS
        const NO_BLKLIMS = 0x200;
        const CAN_PARTITIONS = 0x400;
        /// Use logical block addresses
        const SCSI2LOGICAL = 0x800;
        const SYSV = 0x1000;
        const NOWAIT = 0x2000;
        const SILI = 0x4000;
    }
}

/// One `MTSETDRVBUFFER` request. The driver packs the command and its argument into the
/// count word of `mtop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveBufferSetting {
    /// Replace all boolean options
    Options(DriveBufferOptions),
    /// Turn the given options on, leave the others alone
    SetOptions(DriveBufferOptions),
    /// Turn the given options off, leave the others alone
    ClearOptions(DriveBufferOptions),
    /// Write threshold in kilobytes
    WriteThreshold(u32),
    /// Default block size, `None` clears the default
    DefaultBlockSize(Option<u32>),
    /// Default density code, `None` clears the default
    DefaultDensity(Option<u8>),
    /// Default compression, `None` clears the default
    DefaultCompression(Option<bool>),
    /// Default drive buffering mode (0..=7), `None` clears the default
    DefaultDriveBuffer(Option<u8>),
    /// Timeout of ordinary commands, in seconds
    Timeout(u32),
    /// Timeout of long commands such as erase, in seconds
    LongTimeout(u32),
    /// Cleaning request detection from sense data
    Cleaning {
        mode: u8,
        sense_mask: u8,
        sense_value: u8,
    },
}

fn argument(value: u32, limit: u32, what: &str) -> Result<u32> {
    if value > limit {
        bail!("{what} {value} is out of range, at most {limit} is accepted");
    }
    Ok(value)
}

impl DriveBufferSetting {
    /// The count word to pass along with `MTSETDRVBUFFER`.
    pub fn encode(&self) -> Result<i32> {
        use DriveBufferSetting::*;

        let word = match *self {
            Options(options) => MT_ST_BOOLEANS | options.bits(),
            SetOptions(options) => MT_ST_SETBOOLEANS | options.bits(),
            ClearOptions(options) => MT_ST_CLEARBOOLEANS | options.bits(),
            WriteThreshold(kb) => {
                MT_ST_WRITE_THRESHOLD | argument(kb, ARGUMENT_MASK, "write threshold")?
            }
            DefaultBlockSize(Some(size)) => {
                // An all-ones argument means "clear".
                MT_ST_DEF_BLKSIZE | argument(size, ARGUMENT_MASK - 1, "default block size")?
            }
            DefaultBlockSize(None) => MT_ST_DEF_BLKSIZE | ARGUMENT_MASK,
            DefaultDensity(Some(code)) => MT_ST_DEF_DENSITY | code as u32,
            DefaultDensity(None) => MT_ST_DEF_DENSITY | MT_ST_CLEAR_DEFAULT,
            DefaultCompression(Some(enable)) => MT_ST_DEF_COMPRESSION | enable as u32,
            DefaultCompression(None) => MT_ST_DEF_COMPRESSION | MT_ST_CLEAR_DEFAULT,
            DefaultDriveBuffer(Some(mode)) => {
                MT_ST_DEF_DRVBUFFER | argument(mode as u32, 7, "drive buffer mode")?
            }
            DefaultDriveBuffer(None) => MT_ST_DEF_DRVBUFFER | MT_ST_CLEAR_DEFAULT,
            Timeout(seconds) => MT_ST_SET_TIMEOUT | argument(seconds, TIMEOUT_LIMIT, "timeout")?,
            LongTimeout(seconds) => {
                MT_ST_SET_LONG_TIMEOUT | argument(seconds, TIMEOUT_LIMIT, "long timeout")?
            }
            Cleaning {
                mode,
                sense_mask,
                sense_value,
            } => MT_ST_SET_CLN | mode as u32 | (sense_mask as u32) << 8 | (sense_value as u32) << 16,
        };
        Ok(word as i32)
    }
}

impl TapeDevice {
    /// Change a driver option with `MTSETDRVBUFFER`. Most settings need root.
    pub fn set_drive_buffer(&self, setting: DriveBufferSetting) -> Result<()> {
        let count = setting.encode()?;

        debug!("fd {}: drive buffer {setting:?} as {:#010x}", self.fd, count);
        let op = MtOp::new()
            .with_operation(Operation::SetDriveBuffer)
            .with_count(count);
        self.do_op(&op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(setting: DriveBufferSetting) -> u32 {
        setting.encode().unwrap() as u32
    }

    #[test]
    fn boolean_options() {
        let options = DriveBufferOptions::BUFFER_WRITES | DriveBufferOptions::ASYNC_WRITES;
        assert_eq!(word(DriveBufferSetting::Options(options)), 0x1000_0003);
        assert_eq!(word(DriveBufferSetting::SetOptions(options)), 0x3000_0003);
        assert_eq!(
            word(DriveBufferSetting::ClearOptions(DriveBufferOptions::SILI)),
            0x4000_4000
        );
    }

    #[test]
    fn default_options() {
        assert_eq!(word(DriveBufferSetting::DefaultBlockSize(Some(65536))), 0x5001_0000);
        assert_eq!(word(DriveBufferSetting::DefaultBlockSize(None)), 0x5fff_ffff);
        assert_eq!(word(DriveBufferSetting::DefaultDensity(Some(0x44))), 0x6010_0044);
        assert_eq!(word(DriveBufferSetting::DefaultDensity(None)), 0x601f_ffff);
        assert_eq!(word(DriveBufferSetting::DefaultCompression(Some(true))), 0x6020_0001);
        assert_eq!(word(DriveBufferSetting::DefaultCompression(None)), 0x602f_ffff);
        assert_eq!(word(DriveBufferSetting::DefaultDriveBuffer(Some(1))), 0x6030_0001);
    }

    #[test]
    fn timeouts_and_cleaning() {
        assert_eq!(word(DriveBufferSetting::Timeout(900)), 0x7000_0384);
        assert_eq!(word(DriveBufferSetting::LongTimeout(14400)), 0x7010_3840);
        assert_eq!(word(DriveBufferSetting::WriteThreshold(32)), 0x2000_0020);

        let cleaning = DriveBufferSetting::Cleaning {
            mode: 0x12,
            sense_mask: 0x0f,
            sense_value: 0x0a,
        };
        assert_eq!(word(cleaning), 0x800a_0f12);
        assert!(cleaning.encode().unwrap() < 0);
    }

    #[test]
    fn timeout_stays_clear_of_the_long_timeout_bit() {
        assert_eq!(TIMEOUT_LIMIT, 0xf_ffff);
        assert_eq!(word(DriveBufferSetting::Timeout(0xf_ffff)), 0x700f_ffff);
        assert_eq!(word(DriveBufferSetting::LongTimeout(0xf_ffff)), 0x701f_ffff);

        for seconds in [0x10_0000, 0x1f_ffff, 0x0fef_ffff] {
            assert!(DriveBufferSetting::Timeout(seconds).encode().is_err());
            assert!(DriveBufferSetting::LongTimeout(seconds).encode().is_err());
        }
    }

    #[test]
    fn out_of_range_arguments() {
        assert!(DriveBufferSetting::Timeout(0x10_0000).encode().is_err());
        assert!(DriveBufferSetting::DefaultDriveBuffer(Some(8)).encode().is_err());
        assert!(DriveBufferSetting::DefaultBlockSize(Some(0x0fff_ffff))
            .encode()
            .is_err());
        assert!(DriveBufferSetting::WriteThreshold(0x1000_0000).encode().is_err());
    }

    #[test]
    fn negative_word_reaches_the_driver() {
        let device = TapeDevice::open("/dev/null").unwrap();
        let setting = DriveBufferSetting::Cleaning {
            mode: 0,
            sense_mask: 0,
            sense_value: 0,
        };
        let err = device.set_drive_buffer(setting).unwrap_err();
        assert_eq!(err.downcast_ref::<nix::Error>(), Some(&nix::Error::ENOTTY));
    }
}
