//! Bindings to the Linux magnetic tape driver (`st`).
//!
//! The driver is controlled through three ioctls declared in `<sys/mtio.h>`:
//! `MTIOCTOP` issues an operation, `MTIOCGET` reads the drive status and
//! `MTIOCPOS` reads the current block position. This crate mirrors the
//! argument structures of those requests and decodes the status words the
//! driver hands back.
//!
//! ```no_run
//! use mtio::TapeDevice;
//!
//! # fn main() -> anyhow::Result<()> {
//! let tape = TapeDevice::open("/dev/nst0")?;
//! tape.rewind()?;
//! let status = tape.status()?;
//! println!("{}", status.report());
//! # Ok(())
//! # }
//! ```

mod device;

pub use device::*;
