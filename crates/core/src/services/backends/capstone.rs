use capstone::{arch, prelude::*, Capstone, Endian, InsnGroupId};

use crate::model::{FlowKind, Instruction};
use crate::services::backends::{DecodeError, InstructionDecoder};
use crate::target::{Arch, TargetDescriptor, TargetError};

/// Capstone-backed decoder configured from a resolved target.
pub struct CapstoneDecoder {
    cs: Capstone,
    arch: Arch,
}

fn capstone_version() -> String {
    let (major, minor) = Capstone::lib_version();
    format!("{major}.{minor}")
}

fn init_error(e: capstone::Error) -> TargetError {
    TargetError::EngineInit(format!("capstone {} init failed: {e}", capstone_version()))
}

fn make_cs(target_arch: Arch, target: &TargetDescriptor) -> Result<Capstone, TargetError> {
    match target_arch {
        Arch::X86_64 => Capstone::new().x86().mode(arch::x86::ArchMode::Mode64).detail(true).build(),
        Arch::X86 => Capstone::new().x86().mode(arch::x86::ArchMode::Mode32).detail(true).build(),
        Arch::Arm | Arch::ArmBe | Arch::Thumb => {
            let mode = if target_arch == Arch::Thumb || target.has_feature("+thumb-mode") {
                arch::arm::ArchMode::Thumb
            } else {
                arch::arm::ArchMode::Arm
            };
            let endian = if target_arch == Arch::ArmBe { Endian::Big } else { Endian::Little };
            let mut extra = Vec::new();
            if target.has_feature("+mclass") {
                extra.push(arch::arm::ArchExtraMode::MClass);
            }
            Capstone::new()
                .arm()
                .mode(mode)
                .endian(endian)
                .extra_mode(extra.into_iter())
                .detail(true)
                .build()
        }
        Arch::Aarch64 | Arch::Aarch64Be => {
            let endian = if target_arch == Arch::Aarch64Be { Endian::Big } else { Endian::Little };
            Capstone::new()
                .arm64()
                .mode(arch::arm64::ArchMode::Arm)
                .endian(endian)
                .detail(true)
                .build()
        }
        Arch::Mips | Arch::Mipsel | Arch::Mips64 | Arch::Mips64el => {
            let mode = if matches!(target_arch, Arch::Mips64 | Arch::Mips64el) {
                arch::mips::ArchMode::Mips64
            } else {
                arch::mips::ArchMode::Mips32
            };
            let endian = if matches!(target_arch, Arch::Mips | Arch::Mips64) {
                Endian::Big
            } else {
                Endian::Little
            };
            Capstone::new().mips().mode(mode).endian(endian).detail(true).build()
        }
        Arch::PowerPc | Arch::PowerPc64 | Arch::PowerPc64le => {
            let mode = if target_arch == Arch::PowerPc {
                arch::ppc::ArchMode::Mode32
            } else {
                arch::ppc::ArchMode::Mode64
            };
            let endian = if target_arch == Arch::PowerPc64le { Endian::Little } else { Endian::Big };
            Capstone::new().ppc().mode(mode).endian(endian).detail(true).build()
        }
        Arch::RiscV32 | Arch::RiscV64 => {
            let mode = if target_arch == Arch::RiscV32 {
                arch::riscv::ArchMode::RiscV32
            } else {
                arch::riscv::ArchMode::RiscV64
            };
            // Compressed encodings are ubiquitous in real binaries.
            Capstone::new()
                .riscv()
                .mode(mode)
                .extra_mode([arch::riscv::ArchExtraMode::RiscVC].into_iter())
                .detail(true)
                .build()
        }
        Arch::Sparc => {
            Capstone::new().sparc().mode(arch::sparc::ArchMode::Default).detail(true).build()
        }
        Arch::SparcV9 => {
            Capstone::new().sparc().mode(arch::sparc::ArchMode::V9).detail(true).build()
        }
        Arch::SystemZ => {
            Capstone::new().sysz().mode(arch::sysz::ArchMode::Default).detail(true).build()
        }
    }
    .map_err(init_error)
}

fn in_group(groups: &[InsnGroupId], group: u8) -> bool {
    groups.iter().any(|g| *g == InsnGroupId(group))
}

/// Mnemonic as printed, lowercased and without x86-style prefixes.
fn base_mnemonic(mnemonic: &str) -> String {
    mnemonic.split_whitespace().last().unwrap_or("").to_lowercase()
}

fn compact(operands: &str) -> String {
    operands.chars().filter(|c| !c.is_whitespace()).collect()
}

fn first_operand(operands: &str) -> &str {
    operands.split(',').next().unwrap_or("").trim()
}

/// Registers named inside a `{...}` list.
fn register_list(operands: &str) -> Vec<&str> {
    let Some(open) = operands.find('{') else {
        return Vec::new();
    };
    let close = operands[open..].find('}').map_or(operands.len(), |i| open + i);
    operands[open + 1..close].split(',').map(str::trim).collect()
}

const ARM_CONDITIONS: &[&str] = &[
    "eq", "ne", "cs", "hs", "cc", "lo", "mi", "pl", "vs", "vc", "hi", "ls", "ge", "lt", "gt", "le",
];
const ARM_LDM_MODES: &[&str] = &["", "ia", "fd", "ib", "ed", "da", "fa", "db", "ea"];

fn arm_condition(suffix: Option<&str>) -> bool {
    suffix.is_some_and(|s| ARM_CONDITIONS.contains(&s))
}

fn arm_flow(mnemonic: &str, operands: &str) -> Option<FlowKind> {
    // Thumb-2 width qualifiers.
    let base =
        mnemonic.strip_suffix(".w").or_else(|| mnemonic.strip_suffix(".n")).unwrap_or(mnemonic);
    let loads_pc = register_list(operands).contains(&"pc");
    let flow = match base {
        "bx" if operands == "lr" => FlowKind::Return,
        "pop" if loads_pc => FlowKind::Return,
        "mov" if compact(operands) == "pc,lr" => FlowKind::Return,
        "ldr" if compact(operands).starts_with("pc,[sp]") => FlowKind::Return,
        "bl" | "blx" => FlowKind::Call,
        "b" | "bx" => FlowKind::Jump,
        "cbz" | "cbnz" => FlowKind::ConditionalJump,
        _ if loads_pc && base.strip_prefix("ldm").is_some_and(|m| ARM_LDM_MODES.contains(&m)) => {
            FlowKind::Return
        }
        // `b<cond>` and `bx<cond>` are tested before `bl<cond>` so that `blt` stays a branch.
        _ if arm_condition(base.strip_prefix('b')) || arm_condition(base.strip_prefix("bx")) => {
            FlowKind::ConditionalJump
        }
        _ if arm_condition(base.strip_prefix("blx")) || arm_condition(base.strip_prefix("bl")) => {
            FlowKind::Call
        }
        _ => return None,
    };
    Some(flow)
}

fn aarch64_flow(base: &str) -> Option<FlowKind> {
    let flow = match base {
        "ret" | "retaa" | "retab" => FlowKind::Return,
        "bl" | "blr" => FlowKind::Call,
        "b" | "br" => FlowKind::Jump,
        "cbz" | "cbnz" | "tbz" | "tbnz" => FlowKind::ConditionalJump,
        _ if base.starts_with("b.") => FlowKind::ConditionalJump,
        _ => return None,
    };
    Some(flow)
}

const MIPS_CONDITIONS: &[&str] = &["eq", "ne", "gt", "ge", "lt", "le", "c1", "c2", "ov", "nv"];

fn mips_flow(base: &str, operands: &str) -> Option<FlowKind> {
    let target = first_operand(operands).trim_start_matches('$');
    let flow = match base {
        "jr" | "jr.hb" | "jrc" if target == "ra" || target == "31" => FlowKind::Return,
        "jal" | "jalr" | "jalr.hb" | "jalx" | "jalrc" | "jialc" | "bal" | "balc" | "bgezal"
        | "bltzal" | "bgezall" | "bltzall" | "bgezalc" | "bltzalc" | "beqzalc" | "bnezalc"
        | "blezalc" | "bgtzalc" => FlowKind::Call,
        "j" | "jr" | "jr.hb" | "jrc" | "jic" | "b" | "bc" => FlowKind::Jump,
        _ if base
            .strip_prefix('b')
            .is_some_and(|rest| MIPS_CONDITIONS.iter().any(|c| rest.starts_with(c))) =>
        {
            FlowKind::ConditionalJump
        }
        _ => return None,
    };
    Some(flow)
}

const PPC_CONDITIONS: &[&str] =
    &["dnz", "dz", "eq", "ne", "lt", "gt", "le", "ge", "so", "ns", "un", "nu", "c"];

fn ppc_flow(mnemonic: &str) -> Option<FlowKind> {
    // Static prediction hints.
    let base = mnemonic.trim_end_matches(['+', '-']);
    let flow = match base {
        "blr" => FlowKind::Return,
        "bl" | "bla" | "bctrl" | "blrl" => FlowKind::Call,
        "b" | "ba" | "bctr" => FlowKind::Jump,
        _ => {
            let rest = base.strip_prefix('b')?;
            let tail = PPC_CONDITIONS.iter().find_map(|c| rest.strip_prefix(c))?;
            match tail {
                "" | "a" | "lr" | "ctr" => FlowKind::ConditionalJump,
                "l" | "la" | "lrl" | "ctrl" => FlowKind::Call,
                _ => return None,
            }
        }
    };
    Some(flow)
}

const RISCV_RETURN_FORMS: &[&str] = &["zero,0(ra)", "x0,0(x1)", "zero,ra,0", "x0,x1,0"];
const RISCV_BRANCHES: &[&str] = &[
    "beq", "bne", "blt", "bge", "bltu", "bgeu", "beqz", "bnez", "blez", "bgez", "bltz", "bgtz",
    "bgt", "ble", "bgtu", "bleu", "c.beqz", "c.bnez",
];

fn riscv_flow(base: &str, operands: &str) -> Option<FlowKind> {
    let operands = compact(operands);
    let first = first_operand(&operands);
    let links_zero = first == "zero" || first == "x0";
    let uses_ra = first == "ra" || first == "x1";
    let flow = match base {
        "ret" => FlowKind::Return,
        "jr" | "c.jr" if uses_ra => FlowKind::Return,
        "jalr" if RISCV_RETURN_FORMS.contains(&operands.as_str()) => FlowKind::Return,
        "jr" | "c.jr" | "j" | "c.j" | "tail" => FlowKind::Jump,
        "jal" | "jalr" if links_zero => FlowKind::Jump,
        "jal" | "jalr" | "c.jal" | "c.jalr" | "call" => FlowKind::Call,
        _ if RISCV_BRANCHES.contains(&base) => FlowKind::ConditionalJump,
        _ => return None,
    };
    Some(flow)
}

/// Synthetic bit operations that share the branch prefix.
const SPARC_NON_BRANCHES: &[&str] = &["bset", "bclr", "btst", "btog"];

fn sparc_flow(mnemonic: &str, operands: &str) -> Option<FlowKind> {
    // Annul and prediction suffixes: `bne,a`, `bne,pt`.
    let base = mnemonic.split(',').next().unwrap_or(mnemonic);
    let flow = match base {
        "ret" | "retl" => FlowKind::Return,
        "jmp" if matches!(compact(operands).as_str(), "%i7+8" | "%o7+8") => FlowKind::Return,
        "call" => FlowKind::Call,
        "b" | "ba" | "jmp" => FlowKind::Jump,
        _ if SPARC_NON_BRANCHES.contains(&base) => return None,
        _ if base.starts_with('b') || base.starts_with("fb") || base.starts_with("cb") => {
            FlowKind::ConditionalJump
        }
        _ => return None,
    };
    Some(flow)
}

fn systemz_flow(base: &str, operands: &str) -> Option<FlowKind> {
    let flow = match base {
        "br" if operands == "%r14" => FlowKind::Return,
        "bras" | "brasl" | "bas" | "basr" => FlowKind::Call,
        "j" | "jg" | "br" | "b" => FlowKind::Jump,
        "brc" | "brcl" | "bc" | "bcr" | "brct" | "brctg" => FlowKind::ConditionalJump,
        _ if base.starts_with('j') => FlowKind::ConditionalJump,
        _ => return None,
    };
    Some(flow)
}

fn x86_conditional(base: &str) -> bool {
    (base.starts_with('j') && base != "jmp") || base.starts_with("loop")
}

/// Control-flow kind of one decoded instruction.
///
/// Outside x86 a return is usually an ordinary branch or a load of the program
/// counter, so the printed form is matched first and capstone's groups are the
/// fallback.
fn classify_flow(
    target_arch: Arch,
    groups: &[InsnGroupId],
    mnemonic: &str,
    operands: &str,
) -> FlowKind {
    let base = base_mnemonic(mnemonic);
    let operands = operands.trim().to_lowercase();
    let printed = match target_arch {
        Arch::X86 | Arch::X86_64 => None,
        Arch::Arm | Arch::ArmBe | Arch::Thumb => arm_flow(&base, &operands),
        Arch::Aarch64 | Arch::Aarch64Be => aarch64_flow(&base),
        Arch::Mips | Arch::Mipsel | Arch::Mips64 | Arch::Mips64el => mips_flow(&base, &operands),
        Arch::PowerPc | Arch::PowerPc64 | Arch::PowerPc64le => ppc_flow(&base),
        Arch::RiscV32 | Arch::RiscV64 => riscv_flow(&base, &operands),
        Arch::Sparc | Arch::SparcV9 => sparc_flow(&base, &operands),
        Arch::SystemZ => systemz_flow(&base, &operands),
    };
    if let Some(flow) = printed {
        return flow;
    }

    if in_group(groups, capstone::InsnGroupType::CS_GRP_RET as u8)
        || in_group(groups, capstone::InsnGroupType::CS_GRP_IRET as u8)
    {
        FlowKind::Return
    } else if in_group(groups, capstone::InsnGroupType::CS_GRP_CALL as u8) {
        FlowKind::Call
    } else if in_group(groups, capstone::InsnGroupType::CS_GRP_JUMP as u8) {
        let x86 = matches!(target_arch, Arch::X86 | Arch::X86_64);
        if x86 && x86_conditional(&base) {
            FlowKind::ConditionalJump
        } else {
            FlowKind::Jump
        }
    } else {
        FlowKind::Sequential
    }
}

impl CapstoneDecoder {
    pub fn new(target: &TargetDescriptor) -> Result<Self, TargetError> {
        let arch = target.known_arch()?;
        let cs = make_cs(arch, target)?;
        Ok(Self { cs, arch })
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }
}

impl InstructionDecoder for CapstoneDecoder {
    fn decode(&self, code: &[u8], address: u64) -> Result<Instruction, DecodeError> {
        if code.is_empty() {
            return Err(DecodeError::Truncated { address });
        }
        let insns =
            self.cs.disasm_count(code, address, 1).map_err(|_| DecodeError::Invalid { address })?;
        let insn = insns.iter().next().ok_or(DecodeError::Invalid { address })?;
        let len = insn.bytes().len();
        if len == 0 {
            return Err(DecodeError::Invalid { address });
        }

        let raw_mnemonic = insn.mnemonic().unwrap_or("");
        let operands = insn.op_str().unwrap_or("");
        let mnemonic = self
            .cs
            .insn_name(insn.id())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| raw_mnemonic.to_string());
        let flow = match self.cs.insn_detail(insn) {
            Ok(detail) => classify_flow(self.arch, detail.groups(), raw_mnemonic, operands),
            Err(_) => classify_flow(self.arch, &[], raw_mnemonic, operands),
        };

        Ok(Instruction { address, mnemonic, operands: operands.to_string(), len, flow })
    }

    fn delay_slots(&self, insn: &Instruction) -> usize {
        if !self.arch.has_delay_slots() || !insn.flow.ends_block() {
            return 0;
        }
        // MIPS compact branches (`bc`, `jrc`, `beqzc`, ...) have no slot.
        let compact_branch = matches!(
            self.arch,
            Arch::Mips | Arch::Mipsel | Arch::Mips64 | Arch::Mips64el
        ) && insn.mnemonic.ends_with('c');
        usize::from(!compact_branch)
    }

    fn name(&self) -> &'static str {
        "capstone"
    }
}
