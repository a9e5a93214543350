use std::io::{self, Write};

use log::{debug, info, warn};
use thiserror::Error;

use crate::loader::{self, ContainerHandle, InputSource, LoadError, LoadOptions};
use crate::services::backends::DecoderEngine;
use crate::services::disassembler::FunctionDisassembler;
use crate::services::scanner::{SectionSelector, SymbolScanner};
use crate::target::{self, TargetDescriptor, TargetOptions};

/// Counter line consumed by the reduce stage: one binary processed.
pub const TELEMETRY_RECORD: &str = "reporter:counter:SkippingTaskCounters,MapProcessedRecords,1";

/// Section the census scans unless told otherwise.
pub const DEFAULT_SECTION: &str = ".text";

#[derive(Debug, Error)]
pub enum CensusError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to write census output: {0}")]
    Output(#[from] io::Error),
}

/// Everything a census run needs besides the input itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CensusOptions {
    pub target: TargetOptions,
    pub section: SectionSelector,
    pub include_dynamic_symbols: bool,
}

impl Default for CensusOptions {
    fn default() -> Self {
        Self {
            target: TargetOptions::default(),
            section: SectionSelector::Name(DEFAULT_SECTION.to_string()),
            include_dynamic_symbols: false,
        }
    }
}

impl CensusOptions {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions { include_dynamic_symbols: self.include_dynamic_symbols }
    }
}

/// The binary a session is working on: container, resolved target and decoder.
#[derive(Debug)]
pub struct ActiveBinary {
    pub container: ContainerHandle,
    pub target: TargetDescriptor,
    pub engine: DecoderEngine,
}

impl ActiveBinary {
    /// Resolve the target for `container` and build its decoder engine.
    pub fn new(container: ContainerHandle, options: &TargetOptions) -> Self {
        let target = target::resolve(&container, options);
        let engine = DecoderEngine::build(&target);
        Self { container, target, engine }
    }

    pub fn with_engine(container: ContainerHandle, engine: DecoderEngine) -> Self {
        Self { container, target: engine.target().clone(), engine }
    }

    pub fn scanner(&self) -> SymbolScanner<'_> {
        SymbolScanner::new(&self.container)
    }

    pub fn disassembler(&self) -> FunctionDisassembler<'_> {
        FunctionDisassembler::new(&self.container, &self.engine)
    }
}

/// Explicit context holding at most one active binary.
#[derive(Debug, Default)]
pub struct CensusSession {
    active: Option<ActiveBinary>,
}

impl CensusSession {
    pub fn new() -> Self {
        Self { active: None }
    }

    /// Load `source`, replacing any previously active binary and its decoder.
    pub fn load(
        &mut self,
        source: &InputSource,
        options: &CensusOptions,
    ) -> Result<&ActiveBinary, LoadError> {
        self.active = None;
        let container = loader::load(source, &options.load_options())?;
        Ok(self.activate(ActiveBinary::new(container, &options.target)))
    }

    /// Install an already-built binary as the active one.
    pub fn activate(&mut self, binary: ActiveBinary) -> &ActiveBinary {
        self.active.insert(binary)
    }

    pub fn active(&self) -> Option<&ActiveBinary> {
        self.active.as_ref()
    }
}

/// Where a census run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CensusState {
    Idle,
    Loaded,
    Scanning,
    Disassembling,
    Emitting,
    Done,
}

/// Counters reported at the end of a census run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CensusSummary {
    pub symbols_scanned: usize,
    pub symbols_skipped: usize,
    pub records_emitted: usize,
}

/// Drives load, scan, disassemble and emit for one input.
pub struct CensusDriver<'o, W: Write> {
    options: &'o CensusOptions,
    out: W,
    state: CensusState,
    summary: CensusSummary,
}

impl<'o, W: Write> CensusDriver<'o, W> {
    pub fn new(options: &'o CensusOptions, out: W) -> Self {
        Self { options, out, state: CensusState::Idle, summary: CensusSummary::default() }
    }

    pub fn state(&self) -> CensusState {
        self.state
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn advance(&mut self, next: CensusState) {
        debug!("census: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Full run: only an unreadable input (or a broken output stream) is an error.
    pub fn run(&mut self, source: &InputSource) -> Result<CensusSummary, CensusError> {
        let mut session = CensusSession::new();
        let binary = session.load(source, self.options)?;
        self.run_loaded(binary)
    }

    /// Census over an already loaded binary.
    pub fn run_loaded(&mut self, binary: &ActiveBinary) -> Result<CensusSummary, CensusError> {
        self.advance(CensusState::Loaded);
        info!(
            "loaded {} container, target {} (decoder {})",
            binary.container.format(),
            binary.target,
            if binary.engine.is_valid() { "ready" } else { "unavailable" }
        );

        self.advance(CensusState::Scanning);
        let symbols = binary.scanner().scan_functions_or_empty(&self.options.section);
        self.summary.symbols_scanned = symbols.len();

        let disassembler = binary.disassembler();
        for symbol in &symbols {
            let Some(address) = symbol.known_address().filter(|a| *a != 0) else {
                self.summary.symbols_skipped += 1;
                continue;
            };

            self.advance(CensusState::Disassembling);
            let graph = match disassembler.disassemble_symbol(symbol) {
                Ok(graph) if !graph.is_empty() => graph,
                Ok(_) => {
                    debug!("{}: nothing decodable at 0x{address:X}", symbol.name);
                    self.summary.symbols_skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!("{}: {err}", symbol.name);
                    self.summary.symbols_skipped += 1;
                    continue;
                }
            };

            self.advance(CensusState::Emitting);
            for insn in graph.instructions() {
                writeln!(self.out, "{}\t1", insn.mnemonic)?;
                self.summary.records_emitted += 1;
            }
        }

        writeln!(self.out, "{TELEMETRY_RECORD}")?;
        self.out.flush()?;
        self.advance(CensusState::Done);
        info!(
            "census done: {} symbols, {} skipped, {} records",
            self.summary.symbols_scanned, self.summary.symbols_skipped, self.summary.records_emitted
        );
        Ok(self.summary)
    }
}

/// Run a census of `source`, writing records to `out`.
pub fn run_census<W: Write>(
    source: &InputSource,
    options: &CensusOptions,
    out: W,
) -> Result<CensusSummary, CensusError> {
    CensusDriver::new(options, out).run(source)
}
