use super::TapeDevice;
use anyhow::Result;
use log::debug;

/// Structure for MTIOCPOS - mag tape get position command
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MtPos {
    /// Current block number
    mt_blkno: libc::c_long,
}

impl MtPos {
    pub fn block_number(&self) -> i64 {
        self.mt_blkno.into()
    }
}

/// Request code of `MTIOCPOS`.
pub const MTIOCPOS: nix::sys::ioctl::ioctl_num_type =
    nix::request_code_read!(b'm', 3, std::mem::size_of::<MtPos>());

mod ioctl_func {
    use super::MtPos;

    nix::ioctl_read!(mtiocpos, b'm', 3, MtPos);
}

impl TapeDevice {
    /// Read the current block position with `MTIOCPOS`.
    ///
    /// Many drives answer this with `EIO`; the block number in [`status`](Self::status)
    /// is the fallback.
    pub fn position(&self) -> Result<MtPos> {
        let mut pos = MtPos::default();

        debug!("fd {}: MTIOCPOS", self.fd);
        unsafe {
            ioctl_func::mtiocpos(self.fd, &mut pos)?;
        }
        Ok(pos)
    }

    /// Shorthand for the block number of [`position`](Self::position).
    pub fn tell(&self) -> Result<i64> {
        self.position().map(|pos| pos.block_number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mtpos_layout() {
        assert_eq!(
            std::mem::size_of::<MtPos>(),
            std::mem::size_of::<libc::c_long>()
        );
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn mtiocpos_request_code() {
        assert_eq!(MTIOCPOS as u64, 0x80086d03);
    }

    #[test]
    fn tell_on_non_tape_fails() {
        let device = TapeDevice::open_read_only("/dev/null").unwrap();
        assert!(device.tell().is_err());
    }
}
