use super::TapeDevice;
use anyhow::Result;
use libc::c_long;
use log::{debug, trace};
use serde::Serialize;
use std::fmt;
use strum::FromRepr;

/// Structure for MTIOCGET - mag tape get status command
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MtGet {
    /// Type of magtape device
    mt_type: c_long,
    /// Residual count: number of bytes ignored, or number of files or records not skipped
    mt_resid: c_long,
    // The following registers are device dependent.
    /// Status register
    mt_dsreg: c_long,
    /// Generic (device independent) status
    mt_gstat: c_long,
    /// Error register
    mt_erreg: c_long,
    // The next two fields are not always used.
    /// Number of current file on tape
    mt_fileno: libc::c_int,
    /// Current block number
    mt_blkno: libc::c_int,
}

/// Request code of `MTIOCGET`.
pub const MTIOCGET: nix::sys::ioctl::ioctl_num_type =
    nix::request_code_read!(b'm', 2, std::mem::size_of::<MtGet>());

// SCSI-tape specific bitfields in the status registers.
pub const MT_ST_BLKSIZE_SHIFT: u32 = 0;
pub const MT_ST_BLKSIZE_MASK: u32 = 0x00ff_ffff;
pub const MT_ST_DENSITY_SHIFT: u32 = 24;
pub const MT_ST_DENSITY_MASK: u32 = 0xff00_0000;

pub const MT_ST_SOFTERR_SHIFT: u32 = 0;
pub const MT_ST_SOFTERR_MASK: u32 = 0xffff;

/// QIC-40/80/3010/3020 ftape supported drives report this flag plus their 20 bit vendor id.
pub const MT_ISFTAPE_FLAG: c_long = 0x80_0000;

/// Values of `mt_type`. Not all of these are supported, and these are not all of the ones
/// that are supported.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
pub enum DriveType {
    /// MT_ISUNKNOWN
    Unknown = 0x01,
    /// MT_ISQIC02, generic QIC-02 tape streamer
    Qic02 = 0x02,
    /// MT_ISWT5150, Wangtek 5150EQ, QIC-150, QIC-02
    Wangtek5150 = 0x03,
    /// MT_ISARCHIVE_5945L2, Archive 5945L-2, QIC-24, QIC-02?
    Archive5945L2 = 0x04,
    /// MT_ISCMSJ500, CMS Jumbo 500 (QIC-02?)
    CmsJ500 = 0x05,
    /// MT_ISTDC3610, Tandberg 6310, QIC-24
    Tdc3610 = 0x06,
    /// MT_ISARCHIVE_VP60I, Archive VP60i, QIC-02
    ArchiveVp60i = 0x07,
    /// MT_ISARCHIVE_2150L, Archive Viper 2150L
    Archive2150L = 0x08,
    /// MT_ISARCHIVE_2060L, Archive Viper 2060L
    Archive2060L = 0x09,
    /// MT_ISARCHIVESC499, Archive SC-499 QIC-36 controller
    ArchiveSc499 = 0x0a,
    /// MT_ISQIC02_ALL_FEATURES, generic QIC-02 with all features
    Qic02AllFeatures = 0x0f,
    /// MT_ISWT5099EEN24, Wangtek 5099-een24, 60MB, QIC-24
    Wangtek5099Een24 = 0x11,
    /// MT_ISTEAC_MT2ST, Teac MT-2ST 155mb drive, Teac DC-1 card (Wangtek type)
    TeacMt2st = 0x12,
    /// MT_ISEVEREX_FT40A, Everex FT40A (QIC-40)
    EverexFt40a = 0x32,
    /// MT_ISDDS1, DDS device without partitions
    Dds1 = 0x51,
    /// MT_ISDDS2, DDS device with partitions
    Dds2 = 0x52,
    /// MT_ISONSTREAM_SC, OnStream SCSI tape drives (SC-x0) and SCSI emulated (DI, DP, USB)
    OnStreamSc = 0x61,
    /// MT_ISSCSI1, generic ANSI SCSI-1 tape unit
    Scsi1 = 0x71,
    /// MT_ISSCSI2, generic ANSI SCSI-2 tape unit
    Scsi2 = 0x72,
}

impl DriveType {
    pub fn from_raw(mt_type: c_long) -> Option<Self> {
        u32::try_from(mt_type).ok().and_then(Self::from_repr)
    }

    /// Human readable name, as printed by `mt status`.
    pub fn description(self) -> Option<&'static str> {
        let name = match self {
            DriveType::Unknown => "Unknown type of tape device",
            DriveType::Qic02 => "Generic QIC-02 tape streamer",
            DriveType::Wangtek5150 => "Wangtek 5150, QIC-150",
            DriveType::Archive5945L2 => "Archive 5945L-2",
            DriveType::CmsJ500 => "CMS Jumbo 500",
            DriveType::Tdc3610 => "Tandberg TDC 3610, QIC-24",
            DriveType::ArchiveVp60i => "Archive VP60i, QIC-02",
            DriveType::Archive2150L => "Archive Viper 2150L",
            DriveType::Archive2060L => "Archive Viper 2060L",
            DriveType::ArchiveSc499 => "Archive SC-499 QIC-36 controller",
            DriveType::Qic02AllFeatures => "Generic QIC-02 tape, all features",
            DriveType::Wangtek5099Een24 => "Wangtek 5099-een24, 60MB",
            DriveType::TeacMt2st => "Teac MT-2ST 155mb data cassette drive",
            DriveType::EverexFt40a => "Everex FT40A, QIC-40",
            DriveType::Dds1 => "DDS device without partitions",
            DriveType::Dds2 => "DDS device with partitions",
            DriveType::Scsi1 => "Generic SCSI-1 tape",
            DriveType::Scsi2 => "Generic SCSI-2 tape",
            DriveType::OnStreamSc => return None,
        };
        Some(name)
    }
}

/// Name of a raw `mt_type`, or `"invalid type"` when it has none.
pub fn drive_type_name(mt_type: c_long) -> &'static str {
    DriveType::from_raw(mt_type)
        .and_then(DriveType::description)
        .unwrap_or("invalid type")
}

bitflags::bitflags! {
    /// Generic (device independent) status bits found in `mt_gstat`.
    pub struct GStat: u32 {
        const EOF = 0x8000_0000;
        const BOT = 0x4000_0000;
        const EOT = 0x2000_0000;
        /// DDS setmark
        const SM = 0x1000_0000;
        /// DDS EOD
        const EOD = 0x0800_0000;
        const WR_PROT = 0x0400_0000;
        const ONLINE = 0x0100_0000;
        const D_6250 = 0x0080_0000;
        const D_1600 = 0x0040_0000;
        const D_800 = 0x0020_0000;
        /// Door open (no tape)
        const DR_OPEN = 0x0004_0000;
        /// Immediate report mode
        const IM_REP_EN = 0x0001_0000;
        /// Cleaning requested
        const CLN = 0x0000_8000;
    }
}

/// Printing order of the status bits.
const GSTAT_NAMES: [(GStat, &str); 13] = [
    (GStat::EOF, "EOF"),
    (GStat::BOT, "BOT"),
    (GStat::EOT, "EOT"),
    (GStat::SM, "SM"),
    (GStat::EOD, "EOD"),
    (GStat::WR_PROT, "WR_PROT"),
    (GStat::ONLINE, "ONLINE"),
    (GStat::D_6250, "D_6250"),
    (GStat::D_1600, "D_1600"),
    (GStat::D_800, "D_800"),
    (GStat::DR_OPEN, "DR_OPEN"),
    (GStat::IM_REP_EN, "IM_REP_EN"),
    (GStat::CLN, "CLN"),
];

impl GStat {
    /// Interpret a raw `mt_gstat`. Only the low 32 bits carry status, unknown bits are dropped.
    pub fn from_raw(gstat: c_long) -> Self {
        Self::from_bits_truncate(gstat as u32)
    }

    /// Names of the set bits, in header order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        GSTAT_NAMES
            .iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
    }

    pub fn is_eof(&self) -> bool {
        self.contains(GStat::EOF)
    }

    pub fn is_bot(&self) -> bool {
        self.contains(GStat::BOT)
    }

    pub fn is_eot(&self) -> bool {
        self.contains(GStat::EOT)
    }

    pub fn is_setmark(&self) -> bool {
        self.contains(GStat::SM)
    }

    pub fn is_eod(&self) -> bool {
        self.contains(GStat::EOD)
    }

    pub fn is_write_protected(&self) -> bool {
        self.contains(GStat::WR_PROT)
    }

    pub fn is_online(&self) -> bool {
        self.contains(GStat::ONLINE)
    }

    pub fn is_d6250(&self) -> bool {
        self.contains(GStat::D_6250)
    }

    pub fn is_d1600(&self) -> bool {
        self.contains(GStat::D_1600)
    }

    pub fn is_d800(&self) -> bool {
        self.contains(GStat::D_800)
    }

    pub fn is_door_open(&self) -> bool {
        self.contains(GStat::DR_OPEN)
    }

    pub fn is_immediate_report(&self) -> bool {
        self.contains(GStat::IM_REP_EN)
    }

    pub fn is_cleaning_requested(&self) -> bool {
        self.contains(GStat::CLN)
    }
}

impl fmt::Display for GStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.names().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}

/// List the status bits set in a raw `mt_gstat`, separated by single spaces.
pub fn status_to_string(gstat: c_long) -> String {
    GStat::from_raw(gstat).to_string()
}

impl MtGet {
    pub fn drive_type(&self) -> c_long {
        self.mt_type
    }

    pub fn residual(&self) -> c_long {
        self.mt_resid
    }

    pub fn dsreg(&self) -> c_long {
        self.mt_dsreg
    }

    pub fn gstat(&self) -> GStat {
        GStat::from_raw(self.mt_gstat)
    }

    pub fn erreg(&self) -> c_long {
        self.mt_erreg
    }

    /// Current file number, -1 if unknown
    pub fn file_number(&self) -> i32 {
        self.mt_fileno
    }

    /// Current block number, -1 if unknown
    pub fn block_number(&self) -> i32 {
        self.mt_blkno
    }

    /// Block size in bytes, zero in variable block mode. SCSI tapes only.
    pub fn block_size(&self) -> u32 {
        (self.mt_dsreg as u32 & MT_ST_BLKSIZE_MASK) >> MT_ST_BLKSIZE_SHIFT
    }

    /// Density code of the medium. SCSI tapes only.
    pub fn density(&self) -> u8 {
        ((self.mt_dsreg as u32 & MT_ST_DENSITY_MASK) >> MT_ST_DENSITY_SHIFT) as u8
    }

    /// Recovered errors since the previous status request. SCSI tapes only.
    pub fn soft_errors(&self) -> u32 {
        (self.mt_erreg as u32 & MT_ST_SOFTERR_MASK) >> MT_ST_SOFTERR_SHIFT
    }

    pub fn is_ftape(&self) -> bool {
        self.mt_type & MT_ISFTAPE_FLAG != 0
    }

    pub fn report(&self) -> StatusReport {
        StatusReport::from(self)
    }
}

/// Decoded view of a [`MtGet`], suitable for printing or serializing.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub drive_type: i64,
    pub drive_type_name: &'static str,
    pub residual: i64,
    pub file_number: i32,
    pub block_number: i32,
    pub dsreg: i64,
    pub block_size: u32,
    pub density: u8,
    pub erreg: i64,
    pub soft_errors: u32,
    pub gstat: u32,
    pub flags: Vec<&'static str>,
}

impl From<&MtGet> for StatusReport {
    fn from(status: &MtGet) -> Self {
        let gstat = status.gstat();
        Self {
            drive_type: status.mt_type.into(),
            drive_type_name: drive_type_name(status.mt_type),
            residual: status.mt_resid.into(),
            file_number: status.mt_fileno,
            block_number: status.mt_blkno,
            dsreg: status.mt_dsreg.into(),
            block_size: status.block_size(),
            density: status.density(),
            erreg: status.mt_erreg.into(),
            soft_errors: status.soft_errors(),
            gstat: status.mt_gstat as u32,
            flags: gstat.names().collect(),
        }
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "drive type = {}", self.drive_type_name)?;
        writeln!(f, "drive status = {}", self.dsreg)?;
        writeln!(f, "sense key error = {}", self.erreg)?;
        writeln!(f, "residue count = {}", self.residual)?;
        writeln!(f, "file number = {}", self.file_number)?;
        writeln!(f, "block number = {}", self.block_number)?;
        writeln!(
            f,
            "Tape block size {} bytes. Density code {:#x}.",
            self.block_size, self.density
        )?;
        writeln!(f, "Soft error count since last status={}", self.soft_errors)?;
        writeln!(f, "General status bits on ({:x}):", self.gstat)?;
        write!(f, " {}", self.flags.join(" "))
    }
}

mod ioctl_func {
    use super::MtGet;

    nix::ioctl_read!(mtiocget, b'm', 2, MtGet);
}

impl TapeDevice {
    /// Read the drive status with `MTIOCGET`.
    pub fn status(&self) -> Result<MtGet> {
        let mut status = MtGet::default();

        debug!("fd {}: MTIOCGET", self.fd);
        unsafe {
            ioctl_func::mtiocget(self.fd, &mut status)?;
        }
        trace!("fd {}: {status:?}", self.fd);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    fn sample() -> MtGet {
        MtGet {
            mt_type: DriveType::Scsi2 as c_long,
            mt_resid: 0,
            mt_dsreg: 0x4400_8000,
            mt_gstat: 0x4101_0000,
            mt_erreg: 0x0003_0002,
            mt_fileno: 0,
            mt_blkno: 0,
        }
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn mtget_layout() {
        assert_eq!(size_of::<MtGet>(), 48);
        assert_eq!(align_of::<MtGet>(), 8);

        let status = MtGet::default();
        let base = &status as *const MtGet as usize;
        assert_eq!(&status.mt_gstat as *const c_long as usize - base, 24);
        assert_eq!(&status.mt_fileno as *const i32 as usize - base, 40);
        assert_eq!(&status.mt_blkno as *const i32 as usize - base, 44);
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn mtget_layout() {
        assert_eq!(size_of::<MtGet>(), 28);
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn mtiocget_request_code() {
        assert_eq!(MTIOCGET as u64, 0x80306d02);
    }

    #[test]
    fn status_string_lists_bits_in_order() {
        assert_eq!(status_to_string(0x4101_0000), "BOT ONLINE IM_REP_EN");
        assert_eq!(
            status_to_string(0xffff_ffff_u32 as c_long),
            "EOF BOT EOT SM EOD WR_PROT ONLINE D_6250 D_1600 D_800 DR_OPEN IM_REP_EN CLN"
        );
        assert_eq!(status_to_string(0x0000_8000), "CLN");
    }

    #[test]
    fn status_string_ignores_unknown_bits() {
        assert_eq!(status_to_string(0), "");
        assert_eq!(status_to_string(0x0202_7fff), "");
    }

    #[test]
    fn gstat_predicates() {
        let gstat = GStat::from_raw(0x8400_0000_u32 as c_long);
        assert!(gstat.is_eof());
        assert!(gstat.is_write_protected());
        assert!(!gstat.is_bot());
        assert!(!gstat.is_online());

        let gstat = GStat::from_raw(0x0805_8000);
        assert!(gstat.is_eod());
        assert!(gstat.is_door_open());
        assert!(gstat.is_immediate_report());
        assert!(gstat.is_cleaning_requested());
        assert!(!gstat.is_setmark());
        assert!(!gstat.is_d800());
    }

    #[test]
    fn each_bit_drives_exactly_its_predicate() {
        let predicates: [(&str, fn(&GStat) -> bool); 13] = [
            ("EOF", GStat::is_eof),
            ("BOT", GStat::is_bot),
            ("EOT", GStat::is_eot),
            ("SM", GStat::is_setmark),
            ("EOD", GStat::is_eod),
            ("WR_PROT", GStat::is_write_protected),
            ("ONLINE", GStat::is_online),
            ("D_6250", GStat::is_d6250),
            ("D_1600", GStat::is_d1600),
            ("D_800", GStat::is_d800),
            ("DR_OPEN", GStat::is_door_open),
            ("IM_REP_EN", GStat::is_immediate_report),
            ("CLN", GStat::is_cleaning_requested),
        ];

        for (flag, name) in GSTAT_NAMES {
            let gstat = GStat::from_raw(flag.bits() as c_long);
            for (predicate_name, predicate) in predicates {
                assert_eq!(predicate(&gstat), predicate_name == name, "{name} vs {predicate_name}");
            }
            assert_eq!(gstat.to_string(), name);
        }

        let all = GStat::from_raw(0xffff_ffff_u32 as c_long);
        assert!(predicates.iter().all(|(_, predicate)| predicate(&all)));
        let none = GStat::from_raw(0);
        assert!(predicates.iter().all(|(_, predicate)| !predicate(&none)));
    }

    #[test]
    fn drive_type_names() {
        assert_eq!(drive_type_name(0x72), "Generic SCSI-2 tape");
        assert_eq!(drive_type_name(0x71), "Generic SCSI-1 tape");
        assert_eq!(drive_type_name(0x01), "Unknown type of tape device");
        assert_eq!(drive_type_name(0x12), "Teac MT-2ST 155mb data cassette drive");
        assert_eq!(drive_type_name(0x61), "invalid type");
        assert_eq!(drive_type_name(0x00), "invalid type");
        assert_eq!(drive_type_name(-1), "invalid type");
        assert_eq!(drive_type_name(MT_ISFTAPE_FLAG | 0x1234), "invalid type");
    }

    #[test]
    fn decodes_scsi_registers() {
        let status = sample();
        assert_eq!(status.block_size(), 0x8000);
        assert_eq!(status.density(), 0x44);
        assert_eq!(status.soft_errors(), 2);
        assert!(!status.is_ftape());
        assert!(status.gstat().is_bot());
    }

    #[test]
    fn report_display() {
        let report = sample().report();
        assert_eq!(report.flags, vec!["BOT", "ONLINE", "IM_REP_EN"]);

        let text = report.to_string();
        assert!(text.starts_with("drive type = Generic SCSI-2 tape\n"));
        assert!(text.contains("Tape block size 32768 bytes. Density code 0x44.\n"));
        assert!(text.contains("Soft error count since last status=2\n"));
        assert!(text.ends_with("General status bits on (41010000):\n BOT ONLINE IM_REP_EN"));
    }

    #[test]
    fn report_serializes() {
        let json = serde_json::to_value(sample().report()).unwrap();
        assert_eq!(json["drive_type_name"], "Generic SCSI-2 tape");
        assert_eq!(json["block_size"], 32768);
        assert_eq!(json["flags"][1], "ONLINE");
    }

    #[test]
    fn status_on_non_tape_fails() {
        let device = TapeDevice::open_read_only("/dev/null").unwrap();
        let err = device.status().unwrap_err();
        assert_eq!(err.downcast_ref::<nix::Error>(), Some(&nix::Error::ENOTTY));
    }
}
