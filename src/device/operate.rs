use super::TapeDevice;
use anyhow::{anyhow, bail, Result};
use log::{debug, trace};
use strum::{Display, EnumIter, EnumString, FromRepr};

/// Magnetic tape operations, as accepted in `mtop::mt_op`.
///
/// Not every driver implements every operation.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, FromRepr)]
#[strum(ascii_case_insensitive)]
pub enum Operation {
    /// Reset drive in case of problems
    #[strum(to_string = "MTRESET", serialize = "reset")]
    Reset = 0,
    /// Forward space over filemark, position at first record of next file
    #[strum(to_string = "MTFSF", serialize = "fsf")]
    ForwardSpaceFile = 1,
    /// Backward space filemark (position before FM)
    #[strum(to_string = "MTBSF", serialize = "bsf")]
    BackwardSpaceFile = 2,
    /// Forward space record
    #[strum(to_string = "MTFSR", serialize = "fsr")]
    ForwardSpaceRecord = 3,
    /// Backward space record
    #[strum(to_string = "MTBSR", serialize = "bsr")]
    BackwardSpaceRecord = 4,
    /// Write an end-of-file record (mark)
    #[strum(to_string = "MTWEOF", serialize = "weof", serialize = "eof")]
    WriteEof = 5,
    /// Rewind
    #[strum(to_string = "MTREW", serialize = "rewind")]
    Rewind = 6,
    /// Rewind and put the drive offline (eject?)
    #[strum(to_string = "MTOFFL", serialize = "offline", serialize = "rewoffl", serialize = "eject")]
    Offline = 7,
    /// No op, set status only (read with MTIOCGET)
    #[strum(to_string = "MTNOP", serialize = "nop")]
    Nop = 8,
    /// Retension tape
    #[strum(to_string = "MTRETEN", serialize = "retension")]
    Retension = 9,
    /// Backward space filemark, position at FM
    #[strum(to_string = "MTBSFM", serialize = "bsfm")]
    BackwardSpaceFilemark = 10,
    /// Forward space filemark, position at FM
    #[strum(to_string = "MTFSFM", serialize = "fsfm")]
    ForwardSpaceFilemark = 11,
    /// Go to end of recorded media, after the last FM, ready for appending another file
    #[strum(to_string = "MTEOM", serialize = "eom", serialize = "eod")]
    EndOfMedia = 12,
    /// Erase tape -- be careful!
    #[strum(to_string = "MTERASE", serialize = "erase")]
    Erase = 13,
    /// Run self test 1 (nondestructive)
    #[strum(to_string = "MTRAS1", serialize = "ras1")]
    SelfTest1 = 14,
    /// Run self test 2 (destructive)
    #[strum(to_string = "MTRAS2", serialize = "ras2")]
    SelfTest2 = 15,
    /// Reserved for self test 3
    #[strum(to_string = "MTRAS3", serialize = "ras3")]
    SelfTest3 = 16,
    /// Set block length (SCSI)
    #[strum(to_string = "MTSETBLK", serialize = "setblk")]
    SetBlockSize = 20,
    /// Set tape density (SCSI)
    #[strum(to_string = "MTSETDENSITY", serialize = "setdensity")]
    SetDensity = 21,
    /// Seek to block (Tandberg, etc.)
    #[strum(to_string = "MTSEEK", serialize = "seek")]
    Seek = 22,
    /// Tell block (Tandberg, etc.)
    #[strum(to_string = "MTTELL", serialize = "tell")]
    Tell = 23,
    /// Set the drive buffering according to SCSI-2, see [`DriveBufferSetting`](super::DriveBufferSetting)
    #[strum(to_string = "MTSETDRVBUFFER", serialize = "drvbuffer")]
    SetDriveBuffer = 24,
    /// Space forward over setmarks
    #[strum(to_string = "MTFSS", serialize = "fss")]
    ForwardSpaceSetmark = 25,
    /// Space backward over setmarks
    #[strum(to_string = "MTBSS", serialize = "bss")]
    BackwardSpaceSetmark = 26,
    /// Write setmarks
    #[strum(to_string = "MTWSM", serialize = "wset")]
    WriteSetmark = 27,
    /// Lock the drive door
    #[strum(to_string = "MTLOCK", serialize = "lock")]
    Lock = 28,
    /// Unlock the drive door
    #[strum(to_string = "MTUNLOCK", serialize = "unlock")]
    Unlock = 29,
    /// Execute the SCSI load command
    #[strum(to_string = "MTLOAD", serialize = "load")]
    Load = 30,
    /// Execute the SCSI unload command
    #[strum(to_string = "MTUNLOAD", serialize = "unload")]
    Unload = 31,
    /// Control compression with SCSI mode page 15
    #[strum(to_string = "MTCOMPRESSION", serialize = "compression")]
    Compression = 32,
    /// Change the active tape partition
    #[strum(to_string = "MTSETPART", serialize = "setpartition")]
    SetPartition = 33,
    /// Format the tape with one or two partitions
    #[strum(to_string = "MTMKPART", serialize = "mkpartition")]
    MakePartition = 34,
    /// Write an end-of-file record (mark) in immediate mode
    #[strum(to_string = "MTWEOFI", serialize = "weofi")]
    WriteEofImmediate = 35,
}

impl Operation {
    /// Parse an operation given either as its numeric code or by name.
    pub fn from_arg(arg: &str) -> Result<Self> {
        if let Ok(code) = arg.parse::<i16>() {
            return Self::try_from(code);
        }
        arg.parse().map_err(|_| anyhow!("unknown operation {arg:?}"))
    }

    /// Whether a negative count is meaningful for this operation.
    ///
    /// `MTMKPART` takes the size of the first partition, in megabytes when negative, and
    /// `MTSETDRVBUFFER` takes a bit-field word whose top bit selects `MT_ST_SET_CLN`.
    fn accepts_negative_count(self) -> bool {
        matches!(self, Operation::MakePartition | Operation::SetDriveBuffer)
    }
}

impl TryFrom<i16> for Operation {
    type Error = anyhow::Error;

    fn try_from(code: i16) -> Result<Self> {
        Self::from_repr(code).ok_or_else(|| anyhow!("unknown operation code {code}"))
    }
}

/// Structure for MTIOCTOP - magnetic tape operation command
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtOp {
    /// Operation to perform
    mt_op: Operation,
    /// How many of them, or the argument of the operation
    mt_count: libc::c_int,
}

impl Default for MtOp {
    fn default() -> Self {
        Self {
            mt_op: Operation::Reset,
            mt_count: 1,
        }
    }
}

impl MtOp {
    /// A `MTRESET` with a count of one, to be adjusted with the `with_*` methods.
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_operation(mut self, op: Operation) -> Self {
        self.mt_op = op;
        self
    }

    pub fn with_count(mut self, count: i32) -> Self {
        self.mt_count = count;
        self
    }

    pub fn operation(&self) -> Operation {
        self.mt_op
    }

    pub fn count(&self) -> i32 {
        self.mt_count
    }

    fn validate(&self) -> Result<()> {
        if self.mt_count < 0 && !self.mt_op.accepts_negative_count() {
            bail!("negative repeat count {} for {}", self.mt_count, self.mt_op);
        }
        Ok(())
    }
}

/// Requests behind the convenience methods of [`TapeDevice`].
impl MtOp {
    pub fn reset() -> Self {
        Self::new().with_operation(Operation::Reset).with_count(1)
    }

    pub fn forward_space_file(count: i32) -> Self {
        Self::new().with_operation(Operation::ForwardSpaceFile).with_count(count)
    }

    pub fn backward_space_file(count: i32) -> Self {
        Self::new().with_operation(Operation::BackwardSpaceFile).with_count(count)
    }

    pub fn forward_space_filemark(count: i32) -> Self {
        Self::new().with_operation(Operation::ForwardSpaceFilemark).with_count(count)
    }

    pub fn backward_space_filemark(count: i32) -> Self {
        Self::new().with_operation(Operation::BackwardSpaceFilemark).with_count(count)
    }

    pub fn forward_space_record(count: i32) -> Self {
        Self::new().with_operation(Operation::ForwardSpaceRecord).with_count(count)
    }

    pub fn backward_space_record(count: i32) -> Self {
        Self::new().with_operation(Operation::BackwardSpaceRecord).with_count(count)
    }

    pub fn write_eof(count: i32) -> Self {
        Self::new().with_operation(Operation::WriteEof).with_count(count)
    }

    /// Write filemarks without flushing the drive buffer first.
    pub fn write_eof_immediate(count: i32) -> Self {
        Self::new().with_operation(Operation::WriteEofImmediate).with_count(count)
    }

    pub fn rewind() -> Self {
        Self::new().with_operation(Operation::Rewind).with_count(1)
    }

    pub fn offline() -> Self {
        Self::new().with_operation(Operation::Offline).with_count(1)
    }

    pub fn nop() -> Self {
        Self::new().with_operation(Operation::Nop).with_count(1)
    }

    pub fn retension() -> Self {
        Self::new().with_operation(Operation::Retension).with_count(1)
    }

    /// Space to the end of recorded media, ready to append another file.
    pub fn seek_end_of_media() -> Self {
        Self::new().with_operation(Operation::EndOfMedia).with_count(1)
    }

    /// A count of zero requests a short erase where the drive supports it.
    pub fn erase(count: i32) -> Self {
        Self::new().with_operation(Operation::Erase).with_count(count)
    }

    /// Zero selects variable block mode.
    pub fn set_block_size(size: i32) -> Self {
        Self::new().with_operation(Operation::SetBlockSize).with_count(size)
    }

    pub fn set_density(code: i32) -> Self {
        Self::new().with_operation(Operation::SetDensity).with_count(code)
    }

    pub fn seek(block: i32) -> Self {
        Self::new().with_operation(Operation::Seek).with_count(block)
    }

    /// DDS drive only
    pub fn forward_space_setmark(count: i32) -> Self {
        Self::new().with_operation(Operation::ForwardSpaceSetmark).with_count(count)
    }

    /// DDS drive only
    pub fn backward_space_setmark(count: i32) -> Self {
        Self::new().with_operation(Operation::BackwardSpaceSetmark).with_count(count)
    }

    /// DDS drive only
    pub fn write_setmark(count: i32) -> Self {
        Self::new().with_operation(Operation::WriteSetmark).with_count(count)
    }

    pub fn lock() -> Self {
        Self::new().with_operation(Operation::Lock).with_count(1)
    }

    pub fn unlock() -> Self {
        Self::new().with_operation(Operation::Unlock).with_count(1)
    }

    pub fn load() -> Self {
        Self::new().with_operation(Operation::Load).with_count(1)
    }

    pub fn unload() -> Self {
        Self::new().with_operation(Operation::Unload).with_count(1)
    }

    pub fn set_compression(enable: bool) -> Self {
        Self::new().with_operation(Operation::Compression).with_count(enable as i32)
    }

    pub fn set_partition(partition: i32) -> Self {
        Self::new().with_operation(Operation::SetPartition).with_count(partition)
    }

    /// Format the tape. Zero leaves a single partition, otherwise `size` sets the
    /// size of the second partition (see `man 4 st` for the unit).
    pub fn make_partition(size: i32) -> Self {
        Self::new().with_operation(Operation::MakePartition).with_count(size)
    }
}

/// Request code of `MTIOCTOP`.
pub const MTIOCTOP: nix::sys::ioctl::ioctl_num_type =
    nix::request_code_write!(b'm', 1, std::mem::size_of::<MtOp>());

mod ioctl_func {
    use super::MtOp;

    nix::ioctl_write_ptr!(mtioctop, b'm', 1, MtOp);
}

impl TapeDevice {
    /// Execute `MTIOCTOP` with the given operation.
    ///
    /// A negative count is refused before reaching the driver, except for the
    /// operations where it carries meaning (`MTMKPART`, `MTSETDRVBUFFER`).
    pub fn do_op(&self, op: &MtOp) -> Result<()> {
        op.validate()?;

        debug!("fd {}: {} count {}", self.fd, op.mt_op, op.mt_count);
        let ret = unsafe { ioctl_func::mtioctop(self.fd, op)? };
        trace!("fd {}: {} returned {ret}", self.fd, op.mt_op);
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        self.do_op(&MtOp::reset())
    }

    pub fn forward_space_file(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::forward_space_file(count))
    }

    pub fn backward_space_file(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::backward_space_file(count))
    }

    pub fn forward_space_filemark(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::forward_space_filemark(count))
    }

    pub fn backward_space_filemark(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::backward_space_filemark(count))
    }

    pub fn forward_space_record(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::forward_space_record(count))
    }

    pub fn backward_space_record(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::backward_space_record(count))
    }

    pub fn write_eof(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::write_eof(count))
    }

    /// Write filemarks without flushing the drive buffer first.
    pub fn write_eof_immediate(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::write_eof_immediate(count))
    }

    pub fn rewind(&self) -> Result<()> {
        self.do_op(&MtOp::rewind())
    }

    pub fn offline(&self) -> Result<()> {
        self.do_op(&MtOp::offline())
    }

    pub fn nop(&self) -> Result<()> {
        self.do_op(&MtOp::nop())
    }

    pub fn retension(&self) -> Result<()> {
        self.do_op(&MtOp::retension())
    }

    /// Space to the end of recorded media, ready to append another file.
    pub fn seek_end_of_media(&self) -> Result<()> {
        self.do_op(&MtOp::seek_end_of_media())
    }

    /// A count of zero requests a short erase where the drive supports it.
    pub fn erase(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::erase(count))
    }

    /// Zero selects variable block mode.
    pub fn set_block_size(&self, size: i32) -> Result<()> {
        self.do_op(&MtOp::set_block_size(size))
    }

    pub fn set_density(&self, code: i32) -> Result<()> {
        self.do_op(&MtOp::set_density(code))
    }

    pub fn seek(&self, block: i32) -> Result<()> {
        self.do_op(&MtOp::seek(block))
    }

    /// DDS drive only
    pub fn forward_space_setmark(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::forward_space_setmark(count))
    }

    /// DDS drive only
    pub fn backward_space_setmark(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::backward_space_setmark(count))
    }

    /// DDS drive only
    pub fn write_setmark(&self, count: i32) -> Result<()> {
        self.do_op(&MtOp::write_setmark(count))
    }

    pub fn lock(&self) -> Result<()> {
        self.do_op(&MtOp::lock())
    }

    pub fn unlock(&self) -> Result<()> {
        self.do_op(&MtOp::unlock())
    }

    pub fn load(&self) -> Result<()> {
        self.do_op(&MtOp::load())
    }

    pub fn unload(&self) -> Result<()> {
        self.do_op(&MtOp::unload())
    }

    pub fn set_compression(&self, enable: bool) -> Result<()> {
        self.do_op(&MtOp::set_compression(enable))
    }

    pub fn set_partition(&self, partition: i32) -> Result<()> {
        self.do_op(&MtOp::set_partition(partition))
    }

    /// Format the tape. Zero leaves a single partition, otherwise `size` sets the
    /// size of the second partition (see `man 4 st` for the unit).
    pub fn make_partition(&self, size: i32) -> Result<()> {
        self.do_op(&MtOp::make_partition(size))
    }
}
