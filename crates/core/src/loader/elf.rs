use goblin::elf::header::{
    EM_386, EM_AARCH64, EM_ARM, EM_MIPS, EM_PPC, EM_PPC64, EM_RISCV, EM_S390, EM_SPARC,
    EM_SPARCV9, EM_X86_64, ET_REL,
};
use goblin::elf::section_header::{
    SectionHeader, SHF_ALLOC, SHF_EXECINSTR, SHF_WRITE, SHN_ABS, SHN_COMMON, SHN_UNDEF,
    SHT_NOBITS, SHT_PROGBITS,
};
use goblin::elf::sym::{Sym, STT_COMMON, STT_FUNC, STT_OBJECT, STT_TLS};
use goblin::elf::Elf;
use goblin::strtab::Strtab;

use crate::loader::{file_range, ContainerFormat, LoadOptions, ParsedContainer, UNKNOWN_ARCH};
use crate::model::{Section, SectionFlags, Symbol, SymbolKind, UNKNOWN_ADDRESS};

pub(crate) fn parse(elf: &Elf, bytes_len: usize, options: &LoadOptions) -> ParsedContainer {
    ParsedContainer {
        format: format_of(elf),
        arch: arch_name(elf.header.e_machine, elf.is_64, elf.little_endian).to_string(),
        sections: sections(elf, bytes_len),
        symbols: symbols(elf, options),
    }
}

fn format_of(elf: &Elf) -> ContainerFormat {
    match (elf.is_64, elf.little_endian) {
        (false, true) => ContainerFormat::Elf32Le,
        (false, false) => ContainerFormat::Elf32Be,
        (true, true) => ContainerFormat::Elf64Le,
        (true, false) => ContainerFormat::Elf64Be,
    }
}

/// Map `e_machine` to the architecture component of a target triple.
pub fn arch_name(machine: u16, is_64: bool, little_endian: bool) -> &'static str {
    match machine {
        EM_X86_64 => "x86_64",
        EM_386 => "i386",
        EM_ARM if little_endian => "arm",
        EM_ARM => "armeb",
        EM_AARCH64 if little_endian => "aarch64",
        EM_AARCH64 => "aarch64_be",
        EM_MIPS => match (is_64, little_endian) {
            (false, false) => "mips",
            (false, true) => "mipsel",
            (true, false) => "mips64",
            (true, true) => "mips64el",
        },
        EM_PPC => "powerpc",
        EM_PPC64 if little_endian => "powerpc64le",
        EM_PPC64 => "powerpc64",
        EM_RISCV if is_64 => "riscv64",
        EM_RISCV => "riscv32",
        EM_SPARC => "sparc",
        EM_SPARCV9 => "sparcv9",
        EM_S390 => "systemz",
        _ => UNKNOWN_ARCH,
    }
}

/// Classify a section header the way object-file readers do:
/// executable bit means code, writable+allocated PROGBITS means data,
/// writable+allocated NOBITS means zero-initialized.
pub fn section_flags(sh_type: u32, sh_flags: u64) -> SectionFlags {
    let alloc = sh_flags & u64::from(SHF_ALLOC) != 0;
    let write = sh_flags & u64::from(SHF_WRITE) != 0;
    let mut flags = SectionFlags::empty();
    if sh_flags & u64::from(SHF_EXECINSTR) != 0 {
        flags |= SectionFlags::CODE;
    }
    if alloc && write && sh_type == SHT_PROGBITS {
        flags |= SectionFlags::DATA;
    }
    if alloc && write && sh_type == SHT_NOBITS {
        flags |= SectionFlags::BSS;
    }
    if alloc {
        flags |= SectionFlags::ALLOC;
    }
    flags
}

fn sections(elf: &Elf, bytes_len: usize) -> Vec<Section> {
    elf.section_headers
        .iter()
        .map(|sh| Section {
            name: elf.shdr_strtab.get_at(sh.sh_name).unwrap_or("").to_string(),
            address: sh.sh_addr,
            size: sh.sh_size,
            flags: section_flags(sh.sh_type, sh.sh_flags),
            file_range: if sh.sh_type == SHT_NOBITS {
                None
            } else {
                file_range(sh.sh_offset, sh.sh_size, bytes_len)
            },
        })
        .collect()
}

fn symbols(elf: &Elf, options: &LoadOptions) -> Vec<Symbol> {
    let relocatable = elf.header.e_type == ET_REL;
    let mut symbols: Vec<Symbol> = elf
        .syms
        .iter()
        .map(|sym| convert_symbol(&sym, &elf.strtab, &elf.section_headers, relocatable))
        .collect();
    if options.include_dynamic_symbols {
        symbols.extend(
            elf.dynsyms
                .iter()
                .map(|sym| convert_symbol(&sym, &elf.dynstrtab, &elf.section_headers, false)),
        );
    }
    symbols
}

fn convert_symbol(
    sym: &Sym,
    strtab: &Strtab,
    section_headers: &[SectionHeader],
    relocatable: bool,
) -> Symbol {
    let name = strtab.get_at(sym.st_name).unwrap_or("").to_string();
    let shndx = sym.st_shndx;
    let address = if shndx == SHN_UNDEF as usize || shndx == SHN_COMMON as usize {
        UNKNOWN_ADDRESS
    } else if relocatable && shndx != SHN_ABS as usize {
        // Relocatable objects store section-relative values.
        section_headers
            .get(shndx)
            .map_or(sym.st_value, |sh| sym.st_value.wrapping_add(sh.sh_addr))
    } else {
        sym.st_value
    };
    let size = if address == UNKNOWN_ADDRESS || sym.st_size == 0 {
        None
    } else {
        Some(sym.st_size)
    };
    let kind = match sym.st_type() {
        STT_FUNC => SymbolKind::Function,
        STT_OBJECT | STT_COMMON | STT_TLS => SymbolKind::Object,
        _ => SymbolKind::Other,
    };
    Symbol { name, address, size, kind }
}
