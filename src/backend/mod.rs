use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::builder::{BuildError, ModuleBuilder};

pub mod disassembler;
pub mod errors;

pub use disassembler::RspirvDisassembler;
pub use errors::{CollaboratorError, SourcePosition};

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// An assembled module as a stream of 32-bit words.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SpirvBinary(Vec<u32>);

impl SpirvBinary {
    pub fn new(words: Vec<u32>) -> Self {
        Self(words)
    }

    /// Reads a little-endian byte stream.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CollaboratorError> {
        if bytes.len() % 4 != 0 {
            return Err(CollaboratorError::InvalidBinary(format!(
                "length {} is not a multiple of 4",
                bytes.len()
            )));
        }

        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        match words.first() {
            Some(&SPIRV_MAGIC) => Ok(Self(words)),
            Some(other) => Err(CollaboratorError::InvalidBinary(format!(
                "bad magic number {other:#010x}"
            ))),
            None => Err(CollaboratorError::InvalidBinary("empty binary".to_string())),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|word| word.to_le_bytes()).collect()
    }

    pub fn words(&self) -> &[u32] {
        &self.0
    }

    pub fn into_words(self) -> Vec<u32> {
        self.0
    }
}

/// Passes the optimizer runs. Each flag toggles one independent pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerOptions {
    pub freeze_spec_constants: bool,
    pub unify_constants: bool,
    pub strip_debug_info: bool,
    pub eliminate_dead_functions: bool,
    pub eliminate_dead_members: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetLanguage {
    Glsl,
    Hlsl,
    Msl,
}

/// Turns assembly text into a binary.
pub trait Assembler {
    fn assemble(&self, source: &str) -> Result<SpirvBinary, CollaboratorError>;

    fn validate(&self, _binary: &SpirvBinary) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

pub trait Optimizer {
    fn optimize(
        &self,
        binary: &SpirvBinary,
        options: &OptimizerOptions,
    ) -> Result<SpirvBinary, CollaboratorError>;
}

pub trait Decompiler {
    fn disassemble(&self, binary: &SpirvBinary) -> Result<String, CollaboratorError>;

    fn decompile(
        &self,
        binary: &SpirvBinary,
        language: TargetLanguage,
    ) -> Result<String, CollaboratorError>;
}

impl ModuleBuilder {
    /// Renders, assembles and validates the module, then optimizes it if an
    /// optimizer is given.
    #[instrument(level = "debug", skip_all)]
    pub fn compile(
        &self,
        assembler: &dyn Assembler,
        optimizer: Option<&dyn Optimizer>,
    ) -> Result<SpirvBinary, BuildError> {
        let source = self.render();

        let start = Instant::now();
        let binary = assembler.assemble(&source).inspect_err(|e| error!("{}", e))?;
        debug!("assembled in {:?}", start.elapsed());

        let start = Instant::now();
        assembler.validate(&binary).inspect_err(|e| error!("{}", e))?;
        debug!("validated in {:?}", start.elapsed());

        let Some(optimizer) = optimizer else {
            return Ok(binary);
        };

        let start = Instant::now();
        let optimized = optimizer
            .optimize(&binary, &self.config().optimizer)
            .inspect_err(|e| error!("{}", e))?;
        debug!(
            "optimized in {:?}, {} -> {} words",
            start.elapsed(),
            binary.words().len(),
            optimized.words().len()
        );

        Ok(optimized)
    }
}
