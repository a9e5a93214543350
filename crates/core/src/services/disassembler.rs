use log::debug;
use thiserror::Error;

use crate::loader::ContainerHandle;
use crate::model::{FunctionGraph, InstructionBlock, Symbol};
use crate::services::backends::{DecoderEngine, InstructionDecoder};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DisasmError {
    #[error("no valid decoder is available for the loaded target")]
    DecoderUnavailable,
    #[error("address 0x{0:X} is not inside a code section")]
    UnmappedAddress(u64),
}

/// Result of a bounded disassembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeListing {
    pub graph: FunctionGraph,
    pub requested: usize,
    pub produced: usize,
}

impl RangeListing {
    /// Fewer instructions were decodable than were asked for.
    pub fn is_short(&self) -> bool {
        self.requested != 0 && self.produced < self.requested
    }
}

/// Materializes functions as instruction blocks by repeatedly driving the decoder.
pub struct FunctionDisassembler<'a> {
    container: &'a ContainerHandle,
    engine: &'a DecoderEngine,
}

impl<'a> FunctionDisassembler<'a> {
    pub fn new(container: &'a ContainerHandle, engine: &'a DecoderEngine) -> Self {
        Self { container, engine }
    }

    /// Decode the function starting at `address`.
    ///
    /// Blocks end at a jump, call or return (after its delay slot, where the
    /// architecture has one), or where decoding fails. The function ends after
    /// a block ending in a return, after a decode failure, or at the end of the
    /// containing section. A partially decoded function is still returned.
    pub fn disassemble(&self, address: u64) -> Result<FunctionGraph, DisasmError> {
        self.walk(address, None, None)
    }

    /// Like `disassemble`, but never reads past the end of a sized symbol.
    pub fn disassemble_symbol(&self, symbol: &Symbol) -> Result<FunctionGraph, DisasmError> {
        let end = symbol.size.map(|size| symbol.address.saturating_add(size));
        self.walk(symbol.address, None, end)
    }

    /// Like `disassemble`, stopping after `max_instructions` (0 means unbounded).
    pub fn disassemble_range(
        &self,
        address: u64,
        max_instructions: usize,
    ) -> Result<RangeListing, DisasmError> {
        let limit = if max_instructions == 0 { None } else { Some(max_instructions) };
        let graph = self.walk(address, limit, None)?;
        let produced = graph.instruction_count();
        Ok(RangeListing { graph, requested: max_instructions, produced })
    }

    fn walk(
        &self,
        address: u64,
        limit: Option<usize>,
        bound: Option<u64>,
    ) -> Result<FunctionGraph, DisasmError> {
        let decoder = self.engine.decoder().ok_or(DisasmError::DecoderUnavailable)?;
        let section = self
            .container
            .code_section_containing(address)
            .ok_or(DisasmError::UnmappedAddress(address))?;
        let code = self.container.section_data(section).unwrap_or(&[]);
        let end = bound.map_or(section.end(), |bound| bound.min(section.end()));

        let mut graph = FunctionGraph::new(address);
        let mut cursor = address;
        let mut produced = 0usize;

        while cursor < end {
            let offset = (cursor - section.address) as usize;
            let (block, failed) = decode_block(decoder, code, offset, cursor, end, limit, produced);
            let stop = block.is_empty() || failed || block.ends_in_return();
            produced += block.len();
            cursor = block
                .instructions
                .last()
                .map_or(cursor, |last| last.address.saturating_add(last.len as u64));
            if !block.is_empty() {
                graph.blocks.push(block);
            }
            if stop || limit.is_some_and(|max| produced >= max) {
                break;
            }
        }

        debug!(
            "0x{address:X}: {} blocks, {} instructions",
            graph.blocks.len(),
            graph.instruction_count()
        );
        Ok(graph)
    }
}

/// Decode one block starting at `offset` into `code` (mapped at `address`).
///
/// A block-ending instruction takes its delay slots with it. Returns the block
/// and whether it ended because decoding failed.
fn decode_block(
    decoder: &dyn InstructionDecoder,
    code: &[u8],
    mut offset: usize,
    mut address: u64,
    end: u64,
    limit: Option<usize>,
    already: usize,
) -> (InstructionBlock, bool) {
    let mut block = InstructionBlock::new(address);
    let mut slots: Option<usize> = None;
    while address < end && slots != Some(0) {
        if limit.is_some_and(|max| already + block.len() >= max) {
            return (block, false);
        }
        let Some(bytes) = code.get(offset..).filter(|b| !b.is_empty()) else {
            debug!("0x{address:X}: section data exhausted");
            return (block, true);
        };
        match decoder.decode(bytes, address) {
            Ok(insn) if insn.len > 0 => {
                offset += insn.len;
                address = address.saturating_add(insn.len as u64);
                slots = match slots {
                    Some(left) => Some(left - 1),
                    None if insn.flow.ends_block() => Some(decoder.delay_slots(&insn)),
                    None => None,
                };
                block.push(insn);
            }
            Ok(_) => return (block, true),
            Err(err) => {
                debug!("{err}");
                return (block, true);
            }
        }
    }
    (block, false)
}
