use anyhow::{Context, Result};
use autodis_core::loader::{self, LoadOptions};
use autodis_core::model::Section;
use autodis_core::InputSource;

/// List the sections of `input`.
pub fn sections_command(input: &str, json: bool) -> Result<()> {
    let source = InputSource::from_arg(input);
    let container = loader::load(&source, &LoadOptions::default())
        .with_context(|| format!("Failed to load {source}"))?;
    let sections = container.sections();

    if json {
        let serialized = serde_json::to_string_pretty(sections)
            .context("Failed to serialize sections to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("Sections ({}, {}):", container.format(), container.arch());
    println!("Idx Name          Size      Address          Type");
    for (idx, section) in sections.iter().enumerate() {
        println!("{}", format_section_row(idx + 1, section));
    }
    Ok(())
}

pub fn format_section_row(idx: usize, section: &Section) -> String {
    format!(
        "{:3} {:<13} {:08x} {:016x} {}",
        idx,
        section.name,
        section.size,
        section.address,
        section.type_label()
    )
}
