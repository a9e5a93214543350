#![cfg(feature = "capstone-backend")]

mod common;

use autodis_core::model::UNKNOWN_ADDRESS;
use autodis_core::services::census::{CensusDriver, CensusOptions, CensusSession};
use autodis_core::services::disassembler::DisasmError;
use autodis_core::services::scanner::{ScanError, SectionSelector};
use autodis_core::{ContainerFormat, InputSource, TELEMETRY_RECORD};
use common::{build_object, write_fixture, x86_64_push_ret, FixtureFn};
use object::write::{Object, Symbol, SymbolSection};
use object::{
    Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope,
};
use tempfile::tempdir;

fn text() -> SectionSelector {
    SectionSelector::Name(".text".into())
}

#[test]
fn scan_keeps_defined_functions_in_text_only() {
    let temp = tempdir().unwrap();
    let path = write_fixture(temp.path(), "min.o", &x86_64_push_ret());
    let mut session = CensusSession::new();
    let binary = session.load(&InputSource::Path(path), &CensusOptions::default()).unwrap();

    // `ext` is undefined in the fixture and must never be scanned.
    assert!(binary.container.symbols().iter().any(|s| s.name == "ext"));

    let symbols = binary.scanner().scan_functions(&text()).unwrap();
    let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["foo"]);
    assert!(symbols.iter().all(|s| s.address != 0 && s.address != UNKNOWN_ADDRESS));
    assert_eq!(symbols[0].address, 0x1000);
    assert_eq!(symbols[0].size, Some(2));
}

#[test]
fn scan_by_contained_address_matches_scan_by_name() {
    let temp = tempdir().unwrap();
    let path = write_fixture(temp.path(), "min.o", &x86_64_push_ret());
    let mut session = CensusSession::new();
    let binary = session.load(&InputSource::Path(path), &CensusOptions::default()).unwrap();
    let scanner = binary.scanner();

    assert_eq!(
        scanner.scan_functions(&SectionSelector::address(0x1001)).unwrap(),
        scanner.scan_functions(&text()).unwrap()
    );
    assert_eq!(
        scanner.scan_functions(&SectionSelector::Name(".nope".into())),
        Err(ScanError::SectionNotFound(".nope".into()))
    );
    assert!(scanner.scan_functions_or_empty(&SectionSelector::Name(".nope".into())).is_empty());
}

#[test]
fn symbol_at_section_end_is_scanned_then_skipped() {
    let temp = tempdir().unwrap();
    let bytes = build_object(
        BinaryFormat::Elf,
        Architecture::X86_64,
        Endianness::Little,
        &[
            FixtureFn { name: "foo", offset: 0x1000, code: &[0x55, 0xC3] },
            FixtureFn { name: "edge", offset: 0x1002, code: &[] },
        ],
    );
    let path = write_fixture(temp.path(), "edge.o", &bytes);
    let options = CensusOptions::default();
    let mut session = CensusSession::new();
    let binary = session.load(&InputSource::Path(path), &options).unwrap();

    let section = binary.container.section_by_name(".text").unwrap();
    assert_eq!(section.end(), 0x1002);

    let symbols = binary.scanner().scan_functions(&text()).unwrap();
    let edge = symbols.iter().find(|s| s.name == "edge").expect("end-of-section symbol kept");
    assert_eq!(edge.address, 0x1002);

    let disassembler = binary.disassembler();
    assert_eq!(disassembler.disassemble(0x1002), Err(DisasmError::UnmappedAddress(0x1002)));
    assert_eq!(disassembler.disassemble_symbol(edge), Err(DisasmError::UnmappedAddress(0x1002)));

    let mut driver = CensusDriver::new(&options, Vec::new());
    let summary = driver.run_loaded(binary).unwrap();
    assert_eq!(summary.symbols_scanned, 2);
    assert_eq!(summary.symbols_skipped, 1);
    assert_eq!(summary.records_emitted, 2);
    assert_eq!(
        String::from_utf8(driver.into_inner()).unwrap(),
        format!("push\t1\nret\t1\n{TELEMETRY_RECORD}\n")
    );
}

#[test]
fn unmatched_address_selector_falls_back_to_its_own_spelling() {
    let temp = tempdir().unwrap();
    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
    obj.section_mut(text).set_data(vec![0x55, 0xC3], 16);
    let odd = obj.add_section(Vec::new(), b"0xbeef0".to_vec(), SectionKind::Text);
    let mut code = vec![0u8; 0x10];
    code.push(0xC3);
    obj.section_mut(odd).set_data(code, 16);
    obj.add_symbol(Symbol {
        name: b"odd".to_vec(),
        value: 0x10,
        size: 1,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(odd),
        flags: SymbolFlags::None,
    });
    let path = write_fixture(temp.path(), "odd.o", &obj.write().unwrap());

    let mut session = CensusSession::new();
    let binary = session.load(&InputSource::Path(path), &CensusOptions::default()).unwrap();
    let scanner = binary.scanner();

    // No section contains 0xBEEF0, so the selector is looked up by name as written.
    let selector = "0xbeef0".parse::<SectionSelector>().unwrap();
    assert!(matches!(selector, SectionSelector::Address { address: 0xBEEF0, .. }));
    let names: Vec<String> =
        scanner.scan_functions(&selector).unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["odd"]);

    let upper = "0xBEEF0".parse::<SectionSelector>().unwrap();
    assert_eq!(scanner.scan_functions(&upper), Err(ScanError::SectionNotFound("0xBEEF0".into())));
}

#[test]
fn coff_scan_is_unsupported() {
    let temp = tempdir().unwrap();
    let bytes = build_object(
        BinaryFormat::Coff,
        Architecture::X86_64,
        Endianness::Little,
        &[FixtureFn { name: "foo", offset: 0x10, code: &[0x55, 0xC3] }],
    );
    let path = write_fixture(temp.path(), "foo.obj", &bytes);
    let mut session = CensusSession::new();
    let binary = session.load(&InputSource::Path(path), &CensusOptions::default()).unwrap();

    assert_eq!(
        binary.scanner().scan_functions(&text()),
        Err(ScanError::UnsupportedFormat(ContainerFormat::Coff))
    );
    assert!(matches!(binary.scanner().address_of("foo"), Err(ScanError::UnsupportedFormat(_))));
}

#[test]
fn address_of_resolves_known_names() {
    let temp = tempdir().unwrap();
    let path = write_fixture(temp.path(), "min.o", &x86_64_push_ret());
    let mut session = CensusSession::new();
    let binary = session.load(&InputSource::Path(path), &CensusOptions::default()).unwrap();
    let scanner = binary.scanner();

    assert_eq!(scanner.address_of("foo"), Ok(0x1000));
    assert_eq!(scanner.address_of("ext"), Err(ScanError::SymbolNotFound("ext".into())));
    assert_eq!(scanner.address_of("missing"), Err(ScanError::SymbolNotFound("missing".into())));
}

#[test]
fn range_disassembly_is_bounded() {
    let temp = tempdir().unwrap();
    // Eight `nop`s followed by `ret`.
    let mut code = vec![0x90u8; 8];
    code.push(0xC3);
    let bytes = build_object(
        BinaryFormat::Elf,
        Architecture::X86_64,
        Endianness::Little,
        &[FixtureFn { name: "sled", offset: 0x20, code: &code }],
    );
    let path = write_fixture(temp.path(), "sled.o", &bytes);
    let mut session = CensusSession::new();
    let binary = session.load(&InputSource::Path(path), &CensusOptions::default()).unwrap();
    let disassembler = binary.disassembler();

    let listing = disassembler.disassemble_range(0x20, 5).unwrap();
    assert_eq!(listing.produced, 5);
    assert!(listing.graph.instruction_count() <= 5);
    assert!(!listing.is_short());

    let whole = disassembler.disassemble_range(0x20, 0).unwrap();
    assert_eq!(whole.produced, 9);
    assert_eq!(whole.graph.instructions().last().map(|i| i.mnemonic.as_str()), Some("ret"));

    let tail = disassembler.disassemble_range(0x26, 5).unwrap();
    assert_eq!(tail.produced, 3);
    assert!(tail.is_short());
}

#[test]
fn loading_replaces_active_binary() {
    let temp = tempdir().unwrap();
    let x86 = write_fixture(temp.path(), "min.o", &x86_64_push_ret());
    let mips = write_fixture(
        temp.path(),
        "mips.o",
        &build_object(
            BinaryFormat::Elf,
            Architecture::Mips,
            Endianness::Big,
            &[FixtureFn { name: "entry", offset: 0x40, code: &[0x03, 0xE0, 0x00, 0x08] }],
        ),
    );
    let options = CensusOptions::default();
    let mut session = CensusSession::new();
    assert!(session.active().is_none());

    let first = session.load(&InputSource::Path(x86), &options).unwrap();
    assert_eq!(first.target.arch, "x86_64");
    assert!(first.engine.is_valid());

    let second = session.load(&InputSource::Path(mips), &options).unwrap();
    assert_eq!(second.target.arch, "mips");
    assert_eq!(second.container.format(), ContainerFormat::Elf32Be);

    let active = session.active().unwrap();
    assert_eq!(active.engine.target().arch, "mips");

    assert!(session.load(&InputSource::Path(temp.path().join("gone")), &options).is_err());
    assert!(session.active().is_none());
}

#[test]
fn explicit_triple_and_features_reach_the_target() {
    let temp = tempdir().unwrap();
    let path = write_fixture(temp.path(), "min.o", &x86_64_push_ret());
    let mut options = CensusOptions::default();
    options.target.triple = Some("i386-pc-linux-gnu".into());
    options.target.attrs = vec!["SSE2".into(), "-avx".into()];

    let mut session = CensusSession::new();
    let binary = session.load(&InputSource::Path(path), &options).unwrap();
    assert_eq!(binary.target.to_string(), "i386-pc-linux-gnu");
    assert_eq!(binary.target.features, vec!["+sse2", "-avx"]);
    assert!(binary.engine.is_valid());
}
