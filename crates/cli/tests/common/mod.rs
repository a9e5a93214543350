#![allow(dead_code)]

use std::path::{Path, PathBuf};

use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};

pub const TELEMETRY: &str = "reporter:counter:SkippingTaskCounters,MapProcessedRecords,1";

/// Relocatable x86-64 ELF: `foo` at 0x1000 (`push rbp; ret`), `bar` at 0x1010
/// (eight `nop`s then `ret`), and a zero-filled `.bss`.
pub fn write_x86_64_fixture(dir: &Path) -> PathBuf {
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text_id = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    let mut data = vec![0u8; 0x1000];
    data.extend_from_slice(&[0x55, 0xC3]);
    data.resize(0x1010, 0xCC);
    data.extend_from_slice(&[0x90; 8]);
    data.push(0xC3);
    obj.section_mut(text_id).set_data(data, 16);

    let data_id = obj.add_section(Vec::new(), b".data".to_vec(), SectionKind::Data);
    obj.section_mut(data_id).set_data(b"census data".to_vec(), 8);
    let bss_id = obj.add_section(Vec::new(), b".bss".to_vec(), SectionKind::UninitializedData);
    obj.section_mut(bss_id).append_bss(0x40, 8);

    for (name, value, size) in [("foo", 0x1000u64, 2u64), ("bar", 0x1010, 9)] {
        obj.add_symbol(Symbol {
            name: name.as_bytes().to_vec(),
            value,
            size,
            kind: SymbolKind::Text,
            scope: SymbolScope::Linkage,
            weak: false,
            section: SymbolSection::Section(text_id),
            flags: SymbolFlags::None,
        });
    }

    let path = dir.join("fixture.o");
    std::fs::write(&path, obj.write().expect("write fixture")).expect("write fixture file");
    path
}
