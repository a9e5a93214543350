use anyhow::{Context, Result};
use autodis_core::services::census::CensusSession;

use crate::commands::{open_binary, resolve_options, TargetArgs};

/// List the function symbols the census would disassemble.
pub fn symbols_command(
    input: &str,
    section: Option<&str>,
    target: &TargetArgs,
    json: bool,
) -> Result<()> {
    let options = resolve_options(target, section)?;
    let mut session = CensusSession::new();
    let binary = open_binary(&mut session, input, &options)?;
    let symbols = binary
        .scanner()
        .scan_functions(&options.section)
        .with_context(|| format!("Failed to scan {} for functions", options.section))?;

    if json {
        let serialized = serde_json::to_string_pretty(&symbols)
            .context("Failed to serialize symbols to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Function symbols in {} ({}):", options.section, symbols.len());
    if symbols.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for symbol in symbols {
        let size = symbol.size.map_or_else(|| "-".to_string(), |s| format!("{s:#x}"));
        println!("  0x{:016x} {:>8} {}", symbol.address, size, symbol.name);
    }
    Ok(())
}
