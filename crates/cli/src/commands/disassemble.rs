use anyhow::{anyhow, Context, Result};
use autodis_core::model::Instruction;
use autodis_core::services::census::CensusSession;
use autodis_core::services::scanner::parse_integer;
use log::warn;

use crate::commands::{open_binary, resolve_options, TargetArgs};

/// Disassemble up to `count` instructions (0 = whole function) at an address or symbol.
pub fn disassemble_command(
    input: &str,
    location: &str,
    count: u64,
    target: &TargetArgs,
) -> Result<()> {
    let options = resolve_options(target, None)?;
    let mut session = CensusSession::new();
    let binary = open_binary(&mut session, input, &options)?;

    let address = match parse_integer(location) {
        Some(address) => address,
        None => binary
            .scanner()
            .address_of(location)
            .with_context(|| format!("Failed to resolve address of '{location}'"))?,
    };
    if address == 0 {
        return Err(anyhow!("Invalid address or function name: {location}"));
    }

    let requested = usize::try_from(count).context("Instruction count is too large")?;
    let listing = binary
        .disassembler()
        .disassemble_range(address, requested)
        .with_context(|| format!("Failed to disassemble at 0x{address:x}"))?;

    println!("Address: {address}");
    println!("NumInstrs: {requested}");
    for insn in listing.graph.instructions() {
        println!("{}", format_instruction(insn));
    }
    if listing.is_short() {
        warn!("{} of {} printed", listing.produced, listing.requested);
    }
    Ok(())
}

pub fn format_instruction(insn: &Instruction) -> String {
    if insn.operands.is_empty() {
        format!("0x{:x}: {}", insn.address, insn.mnemonic)
    } else {
        format!("0x{:x}: {} {}", insn.address, insn.mnemonic, insn.operands)
    }
}
