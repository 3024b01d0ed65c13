mod drvbuffer;
mod operate;
mod position;
mod status;

use anyhow::{Context, Result};
use log::{debug, warn};
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;

pub use drvbuffer::{
    DriveBufferOptions, DriveBufferSetting, MT_ST_BOOLEANS, MT_ST_CLEARBOOLEANS, MT_ST_CLEAR_DEFAULT,
    MT_ST_DEF_BLKSIZE, MT_ST_DEF_COMPRESSION, MT_ST_DEF_DENSITY, MT_ST_DEF_DRVBUFFER, MT_ST_DEF_OPTIONS,
    MT_ST_HPLOADER_OFFSET, MT_ST_OPTIONS, MT_ST_SETBOOLEANS, MT_ST_SET_CLN, MT_ST_SET_LONG_TIMEOUT,
    MT_ST_SET_TIMEOUT, MT_ST_TIMEOUTS, MT_ST_WRITE_THRESHOLD,
};
pub use operate::{MtOp, Operation, MTIOCTOP};
pub use position::{MtPos, MTIOCPOS};
pub use status::{
    drive_type_name, status_to_string, DriveType, GStat, MtGet, StatusReport, MTIOCGET,
    MT_ISFTAPE_FLAG, MT_ST_BLKSIZE_MASK, MT_ST_BLKSIZE_SHIFT, MT_ST_DENSITY_MASK, MT_ST_DENSITY_SHIFT,
    MT_ST_SOFTERR_MASK, MT_ST_SOFTERR_SHIFT,
};

/// An open handle on a tape device node, such as `/dev/nst0`.
///
/// Use the non-rewinding node (`nst*`) when positioning the tape, otherwise the
/// driver rewinds as soon as the handle is closed.
#[derive(Debug)]
pub struct TapeDevice {
    fd: RawFd,
}

impl TapeDevice {
    /// Open the device for reading and writing, as needed to issue operations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path.as_ref(), OFlag::O_RDWR)
    }

    /// Open the device without blocking on the medium.
    ///
    /// This is enough to query status and position, and works while no tape is loaded.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path.as_ref(), OFlag::O_RDONLY | OFlag::O_NONBLOCK)
    }

    fn open_with(path: &Path, flags: OFlag) -> Result<Self> {
        let fd = nix::fcntl::open(path, flags | OFlag::O_CLOEXEC, Mode::empty())
            .with_context(|| format!("unable to open tape device {}", path.display()))?;

        debug!("opened {} as fd {fd} ({flags:?})", path.display());
        Ok(Self { fd })
    }
}

impl AsRawFd for TapeDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for TapeDevice {
    fn drop(&mut self) {
        if let Err(e) = nix::unistd::close(self.fd) {
            warn!("unable to close tape device fd {}: {e}", self.fd);
        }
    }
}
