use goblin::pe::header::{
    CoffHeader, COFF_MACHINE_ARM, COFF_MACHINE_ARM64, COFF_MACHINE_X86, COFF_MACHINE_X86_64,
};
use goblin::pe::section_table::{
    SectionTable, IMAGE_SCN_CNT_CODE, IMAGE_SCN_CNT_INITIALIZED_DATA,
    IMAGE_SCN_CNT_UNINITIALIZED_DATA,
};
use goblin::pe::PE;

use crate::loader::{file_range, ContainerFormat, FormatError, ParsedContainer, UNKNOWN_ARCH};
use crate::model::{Section, SectionFlags};

const COFF_HEADER_SIZE: usize = 20;

/// Map a COFF machine field to the architecture component of a target triple.
pub fn arch_name(machine: u16) -> &'static str {
    match machine {
        COFF_MACHINE_X86 => "i386",
        COFF_MACHINE_X86_64 => "x86_64",
        COFF_MACHINE_ARM => "arm",
        COFF_MACHINE_ARM64 => "aarch64",
        _ => UNKNOWN_ARCH,
    }
}

/// Bare COFF objects have no magic; recognize them by a known machine field.
pub(crate) fn is_object(bytes: &[u8]) -> bool {
    if bytes.len() < COFF_HEADER_SIZE {
        return false;
    }
    let machine = u16::from_le_bytes([bytes[0], bytes[1]]);
    matches!(
        machine,
        COFF_MACHINE_X86 | COFF_MACHINE_X86_64 | COFF_MACHINE_ARM | COFF_MACHINE_ARM64
    )
}

pub(crate) fn parse_image(pe: &PE, bytes_len: usize) -> ParsedContainer {
    ParsedContainer {
        format: ContainerFormat::Coff,
        arch: arch_name(pe.header.coff_header.machine).to_string(),
        sections: pe.sections.iter().map(|sec| convert_section(sec, bytes_len)).collect(),
        // Symbol extraction for COFF is not supported; scanning reports that explicitly.
        symbols: Vec::new(),
    }
}

pub(crate) fn parse_object(bytes: &[u8]) -> Result<ParsedContainer, FormatError> {
    let mut offset = 0;
    let header = CoffHeader::parse(bytes, &mut offset)
        .map_err(|e| FormatError::UnrecognizedFormat(format!("malformed COFF header: {e}")))?;
    let mut table_offset = offset + header.size_of_optional_header as usize;
    let tables = header
        .sections(bytes, &mut table_offset)
        .map_err(|e| FormatError::UnrecognizedFormat(format!("malformed COFF sections: {e}")))?;
    Ok(ParsedContainer {
        format: ContainerFormat::Coff,
        arch: arch_name(header.machine).to_string(),
        sections: tables.iter().map(|sec| convert_section(sec, bytes.len())).collect(),
        symbols: Vec::new(),
    })
}

/// Classify a section from its characteristics bits.
pub fn section_flags(characteristics: u32) -> SectionFlags {
    let mut flags = SectionFlags::ALLOC;
    if characteristics & IMAGE_SCN_CNT_CODE != 0 {
        flags |= SectionFlags::CODE;
    }
    if characteristics & IMAGE_SCN_CNT_INITIALIZED_DATA != 0 {
        flags |= SectionFlags::DATA;
    }
    if characteristics & IMAGE_SCN_CNT_UNINITIALIZED_DATA != 0 {
        flags |= SectionFlags::BSS;
    }
    flags
}

fn convert_section(sec: &SectionTable, bytes_len: usize) -> Section {
    let name = sec.real_name.clone().unwrap_or_else(|| sec.name().unwrap_or_default().to_string());
    let size = if sec.virtual_size == 0 { sec.size_of_raw_data } else { sec.virtual_size };
    let flags = section_flags(sec.characteristics);
    let file_range = if flags.contains(SectionFlags::BSS) {
        None
    } else {
        file_range(
            u64::from(sec.pointer_to_raw_data),
            u64::from(sec.size_of_raw_data),
            bytes_len,
        )
    };
    Section { name, address: u64::from(sec.virtual_address), size: u64::from(size), flags, file_range }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_sniffing_requires_known_machine_and_full_header() {
        let mut header = vec![0u8; COFF_HEADER_SIZE];
        header[..2].copy_from_slice(&COFF_MACHINE_X86_64.to_le_bytes());
        assert!(is_object(&header));
        assert!(!is_object(&header[..10]));
        header[..2].copy_from_slice(&[0x7f, b'E']);
        assert!(!is_object(&header));
    }

    #[test]
    fn characteristics_map_to_section_flags() {
        assert!(section_flags(IMAGE_SCN_CNT_CODE).contains(SectionFlags::CODE));
        assert!(section_flags(IMAGE_SCN_CNT_INITIALIZED_DATA).contains(SectionFlags::DATA));
        assert!(section_flags(IMAGE_SCN_CNT_UNINITIALIZED_DATA).contains(SectionFlags::BSS));
    }

    #[test]
    fn machine_names() {
        assert_eq!(arch_name(COFF_MACHINE_X86), "i386");
        assert_eq!(arch_name(COFF_MACHINE_ARM64), "aarch64");
        assert_eq!(arch_name(0), UNKNOWN_ARCH);
    }
}
