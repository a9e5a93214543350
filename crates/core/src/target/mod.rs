//! Target resolution: turn a container's declared architecture (or explicit
//! overrides) into an `arch-vendor-os[-env]` descriptor plus feature string.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::loader::{ContainerHandle, UNKNOWN_ARCH};

const UNKNOWN: &str = "unknown";

/// OS names recognized when a triple omits the vendor component.
const KNOWN_OS: &[&str] = &[
    "linux", "windows", "win32", "darwin", "macos", "macosx", "ios", "freebsd", "netbsd",
    "openbsd", "dragonfly", "solaris", "none", "android", "fuchsia", "haiku", "wasi",
];

/// Explicit target overrides, injected from invocation arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOptions {
    pub triple: Option<String>,
    pub arch: Option<String>,
    #[serde(default)]
    pub attrs: Vec<String>,
}

/// Resolved `arch-vendor-os[-env]` target plus subtarget features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDescriptor {
    pub arch: String,
    pub vendor: String,
    pub os: String,
    pub environment: Option<String>,
    pub features: Vec<String>,
}

impl Default for TargetDescriptor {
    fn default() -> Self {
        Self {
            arch: UNKNOWN.into(),
            vendor: UNKNOWN.into(),
            os: UNKNOWN.into(),
            environment: None,
            features: Vec::new(),
        }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.arch, self.vendor, self.os)?;
        if let Some(env) = &self.environment {
            write!(f, "-{env}")?;
        }
        Ok(())
    }
}

impl TargetDescriptor {
    /// Parse and normalize a triple string.
    pub fn from_triple(triple: &str) -> Self {
        let mut parts = triple.split('-').filter(|p| !p.is_empty());
        let arch = parts.next().unwrap_or(UNKNOWN).to_string();
        let mut rest: Vec<String> = parts.map(str::to_string).collect();
        // `x86_64-linux-gnu` style: no vendor, OS in the vendor slot.
        if rest.first().is_some_and(|p| is_known_os(p)) {
            rest.insert(0, UNKNOWN.to_string());
        }
        let mut rest = rest.into_iter();
        Self {
            arch,
            vendor: rest.next().unwrap_or_else(|| UNKNOWN.into()),
            os: rest.next().unwrap_or_else(|| UNKNOWN.into()),
            environment: rest.next(),
            features: Vec::new(),
        }
    }

    /// Comma-joined feature string handed to the decoder engine.
    pub fn feature_string(&self) -> String {
        self.features.join(",")
    }

    pub fn has_feature(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    /// The closed architecture this descriptor names, if it is one the decoder knows.
    pub fn known_arch(&self) -> Result<Arch, TargetError> {
        self.arch.parse::<Arch>().map_err(|_| TargetError::UnsupportedArch(self.arch.clone()))
    }
}

fn is_known_os(component: &str) -> bool {
    KNOWN_OS.iter().any(|os| component.starts_with(os))
}

/// Normalize one attribute: lowercase, `+` prefix unless a sign is already present.
pub fn normalize_feature(attr: &str) -> String {
    let attr = attr.trim().to_lowercase();
    if attr.starts_with('+') || attr.starts_with('-') {
        attr
    } else {
        format!("+{attr}")
    }
}

/// Resolve the target for `container`.
///
/// Without an explicit triple only the architecture is taken from the
/// container; an explicit arch then overrides the architecture alone.
pub fn resolve(container: &ContainerHandle, options: &TargetOptions) -> TargetDescriptor {
    let mut target = match options.triple.as_deref().filter(|t| !t.is_empty()) {
        Some(triple) => TargetDescriptor::from_triple(triple),
        None => TargetDescriptor { arch: container.arch().to_string(), ..Default::default() },
    };
    if let Some(arch) = options.arch.as_deref().filter(|a| !a.is_empty()) {
        target.arch = arch.to_string();
    }
    target.features = options
        .attrs
        .iter()
        .filter(|a| !a.trim().is_empty())
        .map(|a| normalize_feature(a))
        .collect();
    if target.arch.is_empty() {
        target.arch = UNKNOWN_ARCH.into();
    }
    target
}

/// Architectures the decoder engine can be configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Arch {
    #[strum(to_string = "x86_64", serialize = "amd64", serialize = "x86-64")]
    X86_64,
    #[strum(
        to_string = "i386",
        serialize = "x86",
        serialize = "i486",
        serialize = "i586",
        serialize = "i686"
    )]
    X86,
    #[strum(to_string = "arm", serialize = "armv7", serialize = "armv6", serialize = "armv7a")]
    Arm,
    #[strum(to_string = "armeb")]
    ArmBe,
    #[strum(to_string = "thumb", serialize = "thumbv7", serialize = "thumbv7m")]
    Thumb,
    #[strum(to_string = "aarch64", serialize = "arm64")]
    Aarch64,
    #[strum(to_string = "aarch64_be")]
    Aarch64Be,
    #[strum(to_string = "mips")]
    Mips,
    #[strum(to_string = "mipsel")]
    Mipsel,
    #[strum(to_string = "mips64")]
    Mips64,
    #[strum(to_string = "mips64el")]
    Mips64el,
    #[strum(to_string = "powerpc", serialize = "ppc", serialize = "ppc32")]
    PowerPc,
    #[strum(to_string = "powerpc64", serialize = "ppc64")]
    PowerPc64,
    #[strum(to_string = "powerpc64le", serialize = "ppc64le")]
    PowerPc64le,
    #[strum(to_string = "riscv32")]
    RiscV32,
    #[strum(to_string = "riscv64", serialize = "riscv")]
    RiscV64,
    #[strum(to_string = "sparc")]
    Sparc,
    #[strum(to_string = "sparcv9", serialize = "sparc64")]
    SparcV9,
    #[strum(to_string = "systemz", serialize = "s390x")]
    SystemZ,
}

impl Arch {
    /// Control transfers are followed by one architecturally executed slot.
    pub fn has_delay_slots(self) -> bool {
        matches!(
            self,
            Arch::Mips | Arch::Mipsel | Arch::Mips64 | Arch::Mips64el | Arch::Sparc | Arch::SparcV9
        )
    }
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("unsupported target architecture '{0}'")]
    UnsupportedArch(String),
    #[error("unable to initialize decoder engine: {0}")]
    EngineInit(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadOptions;

    fn unknown_container() -> ContainerHandle {
        ContainerHandle::from_bytes(b"plain text".to_vec(), &LoadOptions::default())
    }

    #[test]
    fn container_arch_used_without_triple() {
        let target = resolve(&unknown_container(), &TargetOptions::default());
        assert_eq!(target.to_string(), "unknown-unknown-unknown");
        assert!(target.known_arch().is_err());
    }

    #[test]
    fn explicit_triple_is_normalized() {
        let target = TargetDescriptor::from_triple("x86_64-linux-gnu");
        assert_eq!(target.arch, "x86_64");
        assert_eq!(target.vendor, "unknown");
        assert_eq!(target.os, "linux");
        assert_eq!(target.environment.as_deref(), Some("gnu"));

        let target = TargetDescriptor::from_triple("armv7-apple-ios");
        assert_eq!(target.to_string(), "armv7-apple-ios");

        let target = TargetDescriptor::from_triple("mips");
        assert_eq!(target.to_string(), "mips-unknown-unknown");
    }

    #[test]
    fn explicit_arch_overrides_only_arch() {
        let options = TargetOptions {
            triple: Some("x86_64-pc-linux-gnu".into()),
            arch: Some("i686".into()),
            attrs: vec![],
        };
        let target = resolve(&unknown_container(), &options);
        assert_eq!(target.to_string(), "i686-pc-linux-gnu");
        assert_eq!(target.known_arch().unwrap(), Arch::X86);
    }

    #[test]
    fn attributes_become_signed_lowercase_features() {
        let options = TargetOptions {
            triple: None,
            arch: Some("arm".into()),
            attrs: vec!["Thumb-Mode".into(), "-neon".into(), "+v7".into(), " ".into()],
        };
        let target = resolve(&unknown_container(), &options);
        assert_eq!(target.feature_string(), "+thumb-mode,-neon,+v7");
        assert!(target.has_feature("+thumb-mode"));
    }

    #[test]
    fn arch_aliases_parse() {
        assert_eq!("amd64".parse::<Arch>().unwrap(), Arch::X86_64);
        assert_eq!("ARM64".parse::<Arch>().unwrap(), Arch::Aarch64);
        assert_eq!("ppc64".parse::<Arch>().unwrap(), Arch::PowerPc64);
        assert_eq!(Arch::Mips64el.to_string(), "mips64el");
        assert!("vax".parse::<Arch>().is_err());
    }

    #[test]
    fn every_arch_round_trips_through_its_name() {
        use strum::IntoEnumIterator;

        for arch in Arch::iter() {
            assert_eq!(arch.to_string().parse::<Arch>().unwrap(), arch);
        }
        assert!(Arch::Mipsel.has_delay_slots());
        assert!(Arch::SparcV9.has_delay_slots());
        assert!(!Arch::PowerPc64.has_delay_slots());
    }
}
