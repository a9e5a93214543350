//! Decoder engine seam.
//!
//! The pipeline only needs one capability from an instruction-set decoder:
//! decode the instruction at the start of a byte slice and report its length.
//! `InstructionDecoder` models that; `DecoderEngine` is the validated handle
//! bound to a resolved target that the rest of the pipeline shares.

#[cfg(feature = "capstone-backend")]
pub mod capstone;

#[cfg(feature = "capstone-backend")]
pub use capstone::CapstoneDecoder;

use log::warn;
use thiserror::Error;

use crate::model::Instruction;
use crate::target::{TargetDescriptor, TargetError};

/// Per-instruction decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid instruction at 0x{address:X}")]
    Invalid { address: u64 },
    #[error("instruction stream truncated at 0x{address:X}")]
    Truncated { address: u64 },
}

/// Architecture-specific decoder.
pub trait InstructionDecoder {
    /// Decode one instruction from the start of `code`, which is mapped at `address`.
    ///
    /// The returned instruction's `len` is the number of bytes consumed and is never zero.
    fn decode(&self, code: &[u8], address: u64) -> Result<Instruction, DecodeError>;

    /// Instructions after `insn` that still execute as part of its control transfer.
    fn delay_slots(&self, _insn: &Instruction) -> usize {
        0
    }

    /// Human-readable engine name.
    fn name(&self) -> &'static str;
}

/// Decoder handle bound to a target; invalid when no decoder could be built.
pub struct DecoderEngine {
    target: TargetDescriptor,
    decoder: Option<Box<dyn InstructionDecoder>>,
}

impl std::fmt::Debug for DecoderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderEngine")
            .field("target", &self.target.to_string())
            .field("decoder", &self.decoder.as_ref().map(|d| d.name()))
            .finish()
    }
}

impl DecoderEngine {
    /// Build the default decoder for `target`.
    ///
    /// Failure is not an error: it is logged and produces an invalid handle.
    pub fn build(target: &TargetDescriptor) -> Self {
        match default_decoder(target) {
            Ok(decoder) => Self::with_decoder(target.clone(), decoder),
            Err(err) => {
                warn!("Unable to initialize decoder for {target}: {err}");
                Self::invalid(target.clone())
            }
        }
    }

    /// Handle backed by a caller-provided decoder.
    pub fn with_decoder(target: TargetDescriptor, decoder: Box<dyn InstructionDecoder>) -> Self {
        Self { target, decoder: Some(decoder) }
    }

    pub fn invalid(target: TargetDescriptor) -> Self {
        Self { target, decoder: None }
    }

    pub fn is_valid(&self) -> bool {
        self.decoder.is_some()
    }

    pub fn target(&self) -> &TargetDescriptor {
        &self.target
    }

    pub fn decoder(&self) -> Option<&dyn InstructionDecoder> {
        self.decoder.as_deref()
    }
}

#[cfg(feature = "capstone-backend")]
fn default_decoder(target: &TargetDescriptor) -> Result<Box<dyn InstructionDecoder>, TargetError> {
    Ok(Box::new(CapstoneDecoder::new(target)?))
}

#[cfg(not(feature = "capstone-backend"))]
fn default_decoder(target: &TargetDescriptor) -> Result<Box<dyn InstructionDecoder>, TargetError> {
    target.known_arch()?;
    Err(TargetError::EngineInit("no decoder backend compiled in".into()))
}
