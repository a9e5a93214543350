use anyhow::Result;
use autodis::commands::{
    census_command, disassemble_command, dump_command, parse_number, sections_command,
    symbols_command, CensusArgs, TargetArgs,
};
use autodis::init_logging;
use clap::{Parser, Subcommand};

/// Instruction census map step.
///
/// Without a subcommand, disassembles every function symbol in the input's
/// code section and writes one `<mnemonic>\t1` record per instruction to
/// stdout, followed by a single counter line. This CLI is a thin wrapper
/// around `autodis-core`.
#[derive(Parser, Debug)]
#[command(
    name = "autodis",
    version,
    about = "Instruction census over executable files",
    long_about = None,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(flatten)]
    census: CensusArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the sections of an executable.
    Sections {
        /// Executable to inspect; `-` reads standard input.
        input: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the function symbols found in a section.
    Symbols {
        /// Executable to inspect; `-` reads standard input.
        input: String,

        /// Section name or contained address [default: .text].
        #[arg(long)]
        section: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Disassemble instructions at an address or function name.
    Disassemble {
        /// Executable to inspect; `-` reads standard input.
        input: String,

        /// Address (0x.., 0b.., 0.., decimal) or function symbol name.
        location: String,

        /// Maximum number of instructions; 0 disassembles the whole function.
        #[arg(long, default_value = "0", value_parser = parse_number)]
        count: u64,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Hex and ASCII dump of the section containing an address.
    Dump {
        /// Executable to inspect; `-` reads standard input.
        input: String,

        /// Start address (0x.., 0b.., 0.., decimal).
        #[arg(value_parser = parse_number)]
        address: u64,

        /// Number of 16-byte lines to print.
        #[arg(long, default_value = "10", value_parser = parse_number)]
        lines: u64,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        None => census_command(&cli.census)?,
        Some(Command::Sections { input, json }) => sections_command(&input, json)?,
        Some(Command::Symbols { input, section, json, target }) => {
            symbols_command(&input, section.as_deref(), &target, json)?
        }
        Some(Command::Disassemble { input, location, count, target }) => {
            disassemble_command(&input, &location, count, &target)?
        }
        Some(Command::Dump { input, address, lines }) => dump_command(&input, address, lines)?,
    }

    Ok(())
}
