use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use autodis_core::services::census::CensusDriver;
use autodis_core::InputSource;
use clap::Args;
use log::info;

use crate::commands::{resolve_options, TargetArgs};

/// Arguments of the default (census) mode.
#[derive(Args, Debug, Clone)]
pub struct CensusArgs {
    /// Executable to analyze; `-` reads standard input.
    #[arg(default_value = "-")]
    pub input: String,

    /// Section (name or contained address) to scan for functions [default: .text].
    #[arg(long)]
    pub section: Option<String>,

    #[command(flatten)]
    pub target: TargetArgs,
}

/// Emit one `<mnemonic>\t1` record per decoded instruction, then the counter line.
pub fn census_command(args: &CensusArgs) -> Result<()> {
    let stdout = io::stdout();
    census_to(args, BufWriter::new(stdout.lock()))
}

/// Census writing records to `out` instead of standard output.
pub fn census_to<W: Write>(args: &CensusArgs, out: W) -> Result<()> {
    let options = resolve_options(&args.target, args.section.as_deref())?;
    let source = InputSource::from_arg(&args.input);
    let summary = CensusDriver::new(&options, out)
        .run(&source)
        .with_context(|| format!("Census of {source} failed"))?;
    info!(
        "{source}: {} records from {} function symbols",
        summary.records_emitted, summary.symbols_scanned
    );
    Ok(())
}
