use std::fmt;
use std::str::FromStr;

use log::warn;
use thiserror::Error;

use crate::loader::{ContainerFormat, ContainerHandle};
use crate::model::{Section, Symbol, UNKNOWN_ADDRESS};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("Could not find section '{0}'")]
    SectionNotFound(String),
    #[error("{0} is an unsupported container type for symbol scanning")]
    UnsupportedFormat(ContainerFormat),
    #[error("No symbol named '{0}' with a known address")]
    SymbolNotFound(String),
}

/// How a caller names a section: by a contained address or by its name.
///
/// An address keeps the text it was parsed from, which is also tried as a
/// section name when no section contains the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionSelector {
    Address { address: u64, text: String },
    Name(String),
}

impl SectionSelector {
    pub fn address(address: u64) -> Self {
        SectionSelector::Address { address, text: format!("0x{address:x}") }
    }

    pub fn name(name: impl Into<String>) -> Self {
        SectionSelector::Name(name.into())
    }

    /// The selector as the caller spelled it.
    pub fn as_text(&self) -> &str {
        match self {
            SectionSelector::Address { text, .. } => text,
            SectionSelector::Name(name) => name,
        }
    }
}

impl FromStr for SectionSelector {
    type Err = std::convert::Infallible;

    /// Non-zero integers select by address; anything else is a name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match parse_integer(s) {
            Some(address) if address != 0 => {
                SectionSelector::Address { address, text: s.to_string() }
            }
            _ => SectionSelector::Name(s.to_string()),
        })
    }
}

impl fmt::Display for SectionSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

/// Parse an integer with automatic radix: `0x` hex, `0b` binary, leading `0` octal, else decimal.
pub fn parse_integer(text: &str) -> Option<u64> {
    let text = text.trim();
    let (digits, radix) = if let Some(hex) =
        text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
    {
        (hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        (bin, 2)
    } else if text.len() > 1 && text.starts_with('0') {
        (&text[1..], 8)
    } else {
        (text, 10)
    };
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

/// Function-symbol queries over one container.
pub struct SymbolScanner<'a> {
    container: &'a ContainerHandle,
}

impl<'a> SymbolScanner<'a> {
    pub fn new(container: &'a ContainerHandle) -> Self {
        Self { container }
    }

    /// Resolve a section by address containment first, then by exact name.
    pub fn resolve_section(&self, selector: &SectionSelector) -> Result<&'a Section, ScanError> {
        let by_address = match selector {
            SectionSelector::Address { address, .. } => self.container.section_by_address(*address),
            SectionSelector::Name(_) => None,
        };
        by_address
            .or_else(|| self.container.section_by_name(selector.as_text()))
            .ok_or_else(|| ScanError::SectionNotFound(selector.as_text().to_string()))
    }

    /// Function symbols located in the selected section, in symbol-table order.
    ///
    /// The upper bound is inclusive: a symbol at `base + size` is retained.
    pub fn scan_functions(&self, selector: &SectionSelector) -> Result<Vec<Symbol>, ScanError> {
        match self.container.format() {
            ContainerFormat::Coff => {
                return Err(ScanError::UnsupportedFormat(ContainerFormat::Coff));
            }
            ContainerFormat::Elf32Le
            | ContainerFormat::Elf32Be
            | ContainerFormat::Elf64Le
            | ContainerFormat::Elf64Be
            | ContainerFormat::Unknown => {}
        }

        let section = self.resolve_section(selector)?;
        let start = section.address;
        let end = section.end();
        Ok(self
            .container
            .symbols()
            .iter()
            .filter(|sym| {
                sym.is_function()
                    && sym.address != 0
                    && sym.address != UNKNOWN_ADDRESS
                    && sym.address >= start
                    && sym.address <= end
            })
            .cloned()
            .collect())
    }

    /// Like `scan_functions`, but reports failures and yields an empty set.
    pub fn scan_functions_or_empty(&self, selector: &SectionSelector) -> Vec<Symbol> {
        self.scan_functions(selector).unwrap_or_else(|err| {
            warn!("{err}");
            Vec::new()
        })
    }

    /// Address of the first symbol named `name` that has a known address.
    ///
    /// Linear scan over the whole symbol table.
    pub fn address_of(&self, name: &str) -> Result<u64, ScanError> {
        if self.container.format() == ContainerFormat::Coff {
            return Err(ScanError::UnsupportedFormat(ContainerFormat::Coff));
        }
        self.container
            .symbols()
            .iter()
            .filter(|sym| sym.name == name)
            .find_map(Symbol::known_address)
            .ok_or_else(|| ScanError::SymbolNotFound(name.to_string()))
    }
}
