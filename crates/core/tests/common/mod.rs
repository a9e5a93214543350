#![allow(dead_code)]

use std::path::{Path, PathBuf};

use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

/// A function placed in `.text` of a relocatable fixture.
pub struct FixtureFn<'a> {
    pub name: &'a str,
    pub offset: u64,
    pub code: &'a [u8],
}

/// Build a relocatable object with `.text` holding `functions` (zero padded
/// between them) plus an undefined function symbol `ext`.
pub fn build_object(
    format: BinaryFormat,
    arch: Architecture,
    endian: Endianness,
    functions: &[FixtureFn<'_>],
) -> Vec<u8> {
    let mut obj = Object::new(format, arch, endian);
    let text_id = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);

    let mut data = Vec::new();
    for func in functions {
        let start = func.offset as usize;
        if data.len() < start {
            data.resize(start, 0);
        }
        data.truncate(start);
        data.extend_from_slice(func.code);
    }
    obj.section_mut(text_id).set_data(data, 16);

    for func in functions {
        obj.add_symbol(Symbol {
            name: func.name.as_bytes().to_vec(),
            value: func.offset,
            size: func.code.len() as u64,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text_id),
            flags: SymbolFlags::None,
        });
    }
    obj.add_symbol(Symbol {
        name: b"ext".to_vec(),
        value: 0,
        size: 0,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Undefined,
        flags: SymbolFlags::None,
    });

    obj.write().expect("write fixture object")
}

/// `foo` at 0x1000: `push rbp; ret`.
pub fn x86_64_push_ret() -> Vec<u8> {
    build_object(
        BinaryFormat::Elf,
        Architecture::X86_64,
        Endianness::Little,
        &[FixtureFn { name: "foo", offset: 0x1000, code: &[0x55, 0xC3] }],
    )
}

pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path
}
