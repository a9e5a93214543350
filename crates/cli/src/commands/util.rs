use std::path::PathBuf;

use anyhow::{Context, Result};
use autodis_core::config::CensusConfig;
use autodis_core::services::census::{ActiveBinary, CensusOptions, CensusSession};
use autodis_core::services::scanner::parse_integer;
use autodis_core::InputSource;
use clap::Args;

/// Target and symbol options shared by the census and the subcommands.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target triple to disassemble for (defaults to the container's architecture).
    #[arg(long)]
    pub triple: Option<String>,

    /// Architecture override (e.g. x86_64, i386, mips, aarch64).
    #[arg(long)]
    pub arch: Option<String>,

    /// Target attributes: `--mattr a1,+a2,-a3`. May be repeated.
    #[arg(long, value_delimiter = ',')]
    pub mattr: Vec<String>,

    /// Also consider the ELF dynamic symbol table.
    #[arg(long, default_value_t = false)]
    pub dynamic_symbols: bool,

    /// YAML or JSON file with defaults for the options above.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// clap value parser for auto-radix integers (`0x`, `0b`, leading `0`, decimal).
pub fn parse_number(text: &str) -> Result<u64, String> {
    parse_integer(text).ok_or_else(|| format!("Invalid number '{text}'"))
}

/// Merge the config file (if any) with command-line values; the command line wins.
pub fn resolve_options(target: &TargetArgs, section: Option<&str>) -> Result<CensusOptions> {
    let mut config = match &target.config {
        Some(path) => CensusConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => CensusConfig::default(),
    };

    if let Some(triple) = &target.triple {
        config.triple = Some(triple.clone());
    }
    if let Some(arch) = &target.arch {
        config.arch = Some(arch.clone());
    }
    config.mattr.extend(target.mattr.iter().cloned());
    if let Some(section) = section {
        config.section = section.to_string();
    }
    config.dynamic_symbols |= target.dynamic_symbols;

    Ok(config.to_options())
}

/// Load `input` into `session` with the given options.
pub fn open_binary<'s>(
    session: &'s mut CensusSession,
    input: &str,
    options: &CensusOptions,
) -> Result<&'s ActiveBinary> {
    let source = InputSource::from_arg(input);
    session.load(&source, options).with_context(|| format!("Failed to load {source}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use autodis_core::services::scanner::SectionSelector;

    #[test]
    fn parse_number_accepts_all_radixes() {
        assert_eq!(parse_number("0x10"), Ok(16));
        assert_eq!(parse_number("0b101"), Ok(5));
        assert_eq!(parse_number("010"), Ok(8));
        assert_eq!(parse_number("42"), Ok(42));
        assert!(parse_number("forty").is_err());
    }

    #[test]
    fn command_line_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autodis.yml");
        std::fs::write(&path, "triple: mips-unknown-linux-gnu\nmattr: [\"+a\"]\nsection: .init\n")
            .unwrap();

        let args = TargetArgs {
            arch: Some("mipsel".into()),
            mattr: vec!["-b".into()],
            config: Some(path),
            ..TargetArgs::default()
        };
        let options = resolve_options(&args, None).unwrap();
        assert_eq!(options.target.triple.as_deref(), Some("mips-unknown-linux-gnu"));
        assert_eq!(options.target.arch.as_deref(), Some("mipsel"));
        assert_eq!(options.target.attrs, vec!["+a", "-b"]);
        assert_eq!(options.section, SectionSelector::Name(".init".into()));

        let options = resolve_options(&args, Some(".text")).unwrap();
        assert_eq!(options.section, SectionSelector::Name(".text".into()));
    }

    #[test]
    fn missing_config_is_an_error() {
        let args = TargetArgs {
            config: Some(PathBuf::from("/nonexistent/autodis.json")),
            ..TargetArgs::default()
        };
        assert!(resolve_options(&args, None).is_err());
    }
}
