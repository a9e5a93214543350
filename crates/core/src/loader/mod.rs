//! Container loading and format classification.
//!
//! `load` reads an input (file or stdin) and classifies it as one of the
//! supported container formats. Classification failures never fail the load:
//! the bytes are wrapped as an `Unknown` container instead, which exposes no
//! sections or symbols. Only an unreadable input is an error.

pub mod coff;
pub mod elf;

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::ops::Range;
use std::path::PathBuf;

use goblin::Object;
use log::{debug, warn};
use strum::Display;
use thiserror::Error;

use crate::model::{Section, Symbol};

/// Architecture name declared by containers that carry none.
pub const UNKNOWN_ARCH: &str = "unknown";

/// Where the input bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Stdin,
    Path(PathBuf),
}

impl InputSource {
    /// `-` designates standard input; anything else is a path.
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" {
            InputSource::Stdin
        } else {
            InputSource::Path(PathBuf::from(arg))
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Stdin => write!(f, "<stdin>"),
            InputSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Closed set of container formats the loader distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ContainerFormat {
    #[strum(to_string = "ELF32-LE")]
    Elf32Le,
    #[strum(to_string = "ELF32-BE")]
    Elf32Be,
    #[strum(to_string = "ELF64-LE")]
    Elf64Le,
    #[strum(to_string = "ELF64-BE")]
    Elf64Be,
    #[strum(to_string = "COFF")]
    Coff,
    #[strum(to_string = "unknown")]
    Unknown,
}

impl ContainerFormat {
    pub fn is_elf(self) -> bool {
        matches!(
            self,
            ContainerFormat::Elf32Le
                | ContainerFormat::Elf32Be
                | ContainerFormat::Elf64Le
                | ContainerFormat::Elf64Be
        )
    }
}

/// Options that affect what the loader extracts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Also read the dynamic symbol table (`.dynsym`) for ELF inputs.
    pub include_dynamic_symbols: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("No such file or directory: '{0}'")]
    NotFound(PathBuf),
    #[error("error reading {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Raised while classifying bytes; `load` converts it into the `Unknown` fallback.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Unknown file format: {0}")]
    UnrecognizedFormat(String),
}

/// Structural information extracted by a format parser.
#[derive(Debug)]
pub(crate) struct ParsedContainer {
    pub format: ContainerFormat,
    pub arch: String,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
}

/// A loaded input: the owned byte buffer plus the tables extracted from it.
///
/// Sections refer back into `bytes` by file range; nothing is copied out.
pub struct ContainerHandle {
    bytes: Vec<u8>,
    format: ContainerFormat,
    arch: String,
    sections: Vec<Section>,
    symbols: Vec<Symbol>,
}

impl fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("len", &self.bytes.len())
            .field("format", &self.format)
            .field("arch", &self.arch)
            .field("sections", &self.sections.len())
            .field("symbols", &self.symbols.len())
            .finish()
    }
}

impl ContainerHandle {
    /// Classify `bytes`, falling back to an `Unknown` container when the format is not recognized.
    pub fn from_bytes(bytes: Vec<u8>, options: &LoadOptions) -> Self {
        match classify(&bytes, options) {
            Ok(parsed) => {
                debug!(
                    "classified input as {} ({}), {} sections, {} symbols",
                    parsed.format,
                    parsed.arch,
                    parsed.sections.len(),
                    parsed.symbols.len()
                );
                Self {
                    bytes,
                    format: parsed.format,
                    arch: parsed.arch,
                    sections: parsed.sections,
                    symbols: parsed.symbols,
                }
            }
            Err(err) => {
                warn!("{err}; treating input as raw bytes");
                Self::unknown(bytes)
            }
        }
    }

    /// Wrap raw bytes without structural parsing.
    pub fn unknown(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            format: ContainerFormat::Unknown,
            arch: UNKNOWN_ARCH.to_string(),
            sections: Vec::new(),
            symbols: Vec::new(),
        }
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Architecture name as declared by the container (triple spelling).
    pub fn arch(&self) -> &str {
        &self.arch
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn section_by_name(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// First allocated section whose range contains `address`.
    pub fn section_by_address(&self, address: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.is_alloc() && s.contains(address))
    }

    /// First code section whose range contains `address`.
    pub fn code_section_containing(&self, address: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.is_code() && s.is_alloc() && s.contains(address))
    }

    /// File bytes backing `section`, if it has any.
    pub fn section_data(&self, section: &Section) -> Option<&[u8]> {
        section.file_range.clone().and_then(|range| self.bytes.get(range))
    }
}

/// Read `source` and classify its contents.
pub fn load(source: &InputSource, options: &LoadOptions) -> Result<ContainerHandle, LoadError> {
    let bytes = read_source(source)?;
    Ok(ContainerHandle::from_bytes(bytes, options))
}

fn read_source(source: &InputSource) -> Result<Vec<u8>, LoadError> {
    match source {
        InputSource::Stdin => {
            let mut buf = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut buf)
                .map_err(|source| LoadError::Io { name: "<stdin>".into(), source })?;
            Ok(buf)
        }
        InputSource::Path(path) => {
            if !path.exists() {
                return Err(LoadError::NotFound(path.clone()));
            }
            fs::read(path)
                .map_err(|source| LoadError::Io { name: path.display().to_string(), source })
        }
    }
}

fn classify(bytes: &[u8], options: &LoadOptions) -> Result<ParsedContainer, FormatError> {
    match Object::parse(bytes) {
        Ok(Object::Elf(elf)) => Ok(elf::parse(&elf, bytes.len(), options)),
        Ok(Object::PE(pe)) => Ok(coff::parse_image(&pe, bytes.len())),
        Ok(_) | Err(_) if coff::is_object(bytes) => coff::parse_object(bytes),
        Ok(_) => Err(FormatError::UnrecognizedFormat("not an ELF or COFF container".into())),
        Err(err) => Err(FormatError::UnrecognizedFormat(err.to_string())),
    }
}

/// Clamp a file range to the buffer; empty or out-of-bounds ranges yield `None`.
pub(crate) fn file_range(offset: u64, size: u64, bytes_len: usize) -> Option<Range<usize>> {
    let start = usize::try_from(offset).ok()?;
    if start >= bytes_len {
        return None;
    }
    let end = usize::try_from(offset.saturating_add(size)).unwrap_or(usize::MAX).min(bytes_len);
    if end <= start {
        None
    } else {
        Some(start..end)
    }
}
