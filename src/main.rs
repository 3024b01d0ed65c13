use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use mtio::{MtOp, Operation, TapeDevice};
use std::path::PathBuf;

/// Control magnetic tape drives through the Linux st driver.
#[derive(Parser, Debug)]
#[command(name = "mtcmd", version)]
struct Cli {
    /// Tape device, such as `/dev/nst0`
    #[arg(short = 'f', long = "file", env = "TAPE")]
    device: PathBuf,

    /// Print what is sent to the driver
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue a tape operation, given by number (6) or name (rewind, MTREW)
    Op {
        #[arg(value_parser = parse_operation)]
        operation: Operation,
        /// Repeat count or argument of the operation
        #[arg(default_value_t = 1, allow_negative_numbers = true)]
        count: i32,
    },
    /// Print the drive status
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the current block position
    Tell,
}

fn parse_operation(arg: &str) -> Result<Operation, String> {
    Operation::from_arg(arg).map_err(|e| e.to_string())
}

fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn do_op(cli: &Cli, operation: Operation, count: i32) -> Result<()> {
    let device = TapeDevice::open(&cli.device)?;

    info!("doing operation {operation}, count {count}");
    let op = MtOp::new().with_operation(operation).with_count(count);
    device
        .do_op(&op)
        .with_context(|| format!("operation {operation} failed"))
}

fn do_status(cli: &Cli, json: bool) -> Result<()> {
    let device = TapeDevice::open_read_only(&cli.device)?;

    info!("getting status of {}", cli.device.display());
    let report = device.status()?.report();
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn do_tell(cli: &Cli) -> Result<()> {
    let device = TapeDevice::open_read_only(&cli.device)?;

    info!("getting position of {}", cli.device.display());
    let block = device.tell()?;
    println!("Position: {block}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match cli.command {
        Command::Op { operation, count } => do_op(&cli, operation, count),
        Command::Status { json } => do_status(&cli, json),
        Command::Tell => do_tell(&cli),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn op_count_defaults_to_one() {
        let cli = Cli::try_parse_from(["mtcmd", "-f", "/dev/nst0", "op", "rewind"]).unwrap();
        assert_eq!(cli.device, PathBuf::from("/dev/nst0"));
        match cli.command {
            Command::Op { operation, count } => {
                assert_eq!(operation, Operation::Rewind);
                assert_eq!(count, 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn op_by_number_with_count() {
        let cli = Cli::try_parse_from(["mtcmd", "-f", "/dev/nst0", "op", "1", "3"]).unwrap();
        match cli.command {
            Command::Op { operation, count } => {
                assert_eq!(operation, Operation::ForwardSpaceFile);
                assert_eq!(count, 3);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn op_accepts_negative_count() {
        let cli =
            Cli::try_parse_from(["mtcmd", "-f", "/dev/nst0", "op", "mkpartition", "-100"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Op {
                operation: Operation::MakePartition,
                count: -100
            }
        ));
    }

    #[test]
    fn unknown_operation_is_rejected() {
        assert!(Cli::try_parse_from(["mtcmd", "-f", "/dev/nst0", "op", "17"]).is_err());
        assert!(Cli::try_parse_from(["mtcmd", "-f", "/dev/nst0", "op", "spin"]).is_err());
    }

    #[test]
    fn status_flags() {
        let cli = Cli::try_parse_from(["mtcmd", "-v", "-f", "/dev/nst0", "status", "--json"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Status { json: true }));

        let cli = Cli::try_parse_from(["mtcmd", "--file", "/dev/nst1", "tell"]).unwrap();
        assert_eq!(cli.device, PathBuf::from("/dev/nst1"));
        assert!(matches!(cli.command, Command::Tell));
    }
}
