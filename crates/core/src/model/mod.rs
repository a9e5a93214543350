//! Core data model for loaded containers and decoded code.
//!
//! This module contains:
//! - `Section` / `SectionFlags`: address-ranged regions of a container
//! - `Symbol` / `SymbolKind`: named entities from the symbol table
//! - `Instruction` / `FlowKind`: one decoded machine instruction
//! - `InstructionBlock` / `FunctionGraph`: the per-function decode result

use std::ops::Range;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Address value used by symbol tables for "no address" (undefined/common symbols).
///
/// Symbols carrying this value are treated as absent, never as address zero.
pub const UNKNOWN_ADDRESS: u64 = u64::MAX;

bitflags! {
    /// Classification of a section's contents.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SectionFlags: u8 {
        /// Executable code.
        const CODE = 0b0001;
        /// Initialized, writable data.
        const DATA = 0b0010;
        /// Zero-initialized data (no bytes in the file).
        const BSS = 0b0100;
        /// The section occupies memory at run time, so its address is meaningful.
        const ALLOC = 0b1000;
    }
}

/// A named, address-ranged region of a container.
///
/// `file_range` is a view into the container's byte buffer; it is `None` for
/// zero-initialized sections and is clamped to the buffer length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub address: u64,
    pub size: u64,
    pub flags: SectionFlags,
    #[serde(skip)]
    pub file_range: Option<Range<usize>>,
}

impl Section {
    pub fn end(&self) -> u64 {
        self.address.saturating_add(self.size)
    }

    /// Half-open containment: `[address, address + size)`.
    pub fn contains(&self, address: u64) -> bool {
        address >= self.address && address < self.end()
    }

    pub fn is_code(&self) -> bool {
        self.flags.contains(SectionFlags::CODE)
    }

    pub fn is_data(&self) -> bool {
        self.flags.contains(SectionFlags::DATA)
    }

    pub fn is_bss(&self) -> bool {
        self.flags.contains(SectionFlags::BSS)
    }

    pub fn is_alloc(&self) -> bool {
        self.flags.contains(SectionFlags::ALLOC)
    }

    /// `TEXT DATA BSS` style label used in section listings.
    pub fn type_label(&self) -> String {
        let mut label = String::new();
        if self.is_code() {
            label.push_str("TEXT ");
        }
        if self.is_data() {
            label.push_str("DATA ");
        }
        if self.is_bss() {
            label.push_str("BSS");
        }
        label.trim_end().to_string()
    }
}

/// Symbol-table classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Object,
    Other,
}

/// A named entity at an address within a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    /// `UNKNOWN_ADDRESS` when the symbol table has no address for this entry.
    pub address: u64,
    pub size: Option<u64>,
    pub kind: SymbolKind,
}

impl Symbol {
    pub fn new(name: impl Into<String>, address: u64, size: Option<u64>, kind: SymbolKind) -> Self {
        Self { name: name.into(), address, size, kind }
    }

    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Function
    }

    /// Address if the symbol table recorded one.
    pub fn known_address(&self) -> Option<u64> {
        if self.address == UNKNOWN_ADDRESS {
            None
        } else {
            Some(self.address)
        }
    }
}

/// How a decoded instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowKind {
    Sequential,
    Jump,
    ConditionalJump,
    Call,
    Return,
}

impl FlowKind {
    /// Whether the instruction closes the current instruction block.
    pub fn ends_block(self) -> bool {
        !matches!(self, FlowKind::Sequential)
    }
}

/// One decoded machine instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub address: u64,
    /// Canonical instruction name reported by the decoder engine.
    pub mnemonic: String,
    pub operands: String,
    /// Number of bytes consumed.
    pub len: usize,
    pub flow: FlowKind,
}

/// Straight-line run of instructions ending at a control-flow boundary or a decode failure.
///
/// On delay-slot architectures the instruction after the boundary still
/// belongs to the block; `terminator` records the boundary's flow kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionBlock {
    pub start: u64,
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub terminator: Option<FlowKind>,
}

impl InstructionBlock {
    pub fn new(start: u64) -> Self {
        Self { start, instructions: Vec::new(), terminator: None }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn push(&mut self, instruction: Instruction) {
        if self.terminator.is_none() && instruction.flow.ends_block() {
            self.terminator = Some(instruction.flow);
        }
        self.instructions.push(instruction);
    }

    pub fn ends_in_return(&self) -> bool {
        self.terminator == Some(FlowKind::Return)
    }
}

/// Decoded instruction blocks of one function, in decode order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionGraph {
    pub entry: u64,
    pub blocks: Vec<InstructionBlock>,
}

impl FunctionGraph {
    pub fn new(entry: u64) -> Self {
        Self { entry, blocks: Vec::new() }
    }

    /// Nothing decodable at the entry point.
    pub fn is_empty(&self) -> bool {
        self.blocks.first().map_or(true, InstructionBlock::is_empty)
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(InstructionBlock::len).sum()
    }

    /// Instructions in block-then-instruction order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }
}
