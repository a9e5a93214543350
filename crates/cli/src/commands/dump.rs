use anyhow::{anyhow, Context, Result};
use autodis_core::loader::{self, LoadOptions};
use autodis_core::model::Section;
use autodis_core::InputSource;

const BYTES_PER_LINE: u64 = 16;

/// Hex and ASCII dump of the section containing `address`, starting at `address`.
pub fn dump_command(input: &str, address: u64, lines: u64) -> Result<()> {
    let source = InputSource::from_arg(input);
    let container = loader::load(&source, &LoadOptions::default())
        .with_context(|| format!("Failed to load {source}"))?;
    let section = container
        .section_by_address(address)
        .ok_or_else(|| anyhow!("No section found containing address 0x{address:x}"))?;
    let data = container.section_data(section).unwrap_or(&[]);

    println!("Contents of section {}:", section.name);
    for line in dump_lines(section, data, address, lines) {
        println!("{line}");
    }
    Ok(())
}

/// Render up to `max_lines` dump lines; zero-initialized sections yield a skip notice.
pub fn dump_lines(section: &Section, data: &[u8], address: u64, max_lines: u64) -> Vec<String> {
    if section.is_bss() {
        return vec![format!(
            "<skipping contents of bss section at [{:04x}, {:04x})>",
            section.address,
            section.end()
        )];
    }

    // The mapped size may exceed the bytes present in the file.
    let end = section.address.saturating_add(data.len() as u64).min(section.end());
    let mut out = Vec::new();
    if !section.contains(address) {
        return out;
    }
    let mut line_start = address;
    while line_start < end && (out.len() as u64) < max_lines {
        let offset = (line_start - section.address) as usize;
        let count = (end - line_start).min(BYTES_PER_LINE) as usize;
        let bytes = &data[offset..offset + count];

        let mut line = format!(" {line_start:04x} ");
        for i in 0..BYTES_PER_LINE as usize {
            if i != 0 && i % 4 == 0 {
                line.push(' ');
            }
            match bytes.get(i) {
                Some(b) => line.push_str(&format!("{b:02x}")),
                None => line.push_str("  "),
            }
        }
        line.push_str("  ");
        line.extend(bytes.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
        out.push(line);
        line_start += BYTES_PER_LINE;
    }
    out
}
