use shaderbuilder::{
    Assembler, Optimizer, OptimizerOptions, SpirvBinary,
    backend::{CollaboratorError, SPIRV_MAGIC, SourcePosition},
};
use tracing_subscriber::EnvFilter;

/// Installs a subscriber honouring `RUST_LOG`, once per test binary.
#[allow(unused)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Byte position of the first line containing `needle`.
#[allow(unused)]
pub fn position(text: &str, needle: &str) -> usize {
    text.find(needle)
        .unwrap_or_else(|| panic!("{:?} not found in:\n{}", needle, text))
}

#[allow(unused)]
pub fn count_lines(text: &str, needle: &str) -> usize {
    text.lines().filter(|line| line.contains(needle)).count()
}

/// Emits a header-only binary whose bound matches the rendered module.
#[allow(unused)]
#[derive(Debug, Default)]
pub struct HeaderAssembler;

impl Assembler for HeaderAssembler {
    fn assemble(&self, source: &str) -> Result<SpirvBinary, CollaboratorError> {
        let bound = source
            .lines()
            .find_map(|line| line.strip_prefix("; Bound: "))
            .and_then(|bound| bound.trim().parse().ok())
            .ok_or_else(|| CollaboratorError::Assembler {
                message: "missing bound".to_string(),
                position: None,
            })?;
        Ok(SpirvBinary::new(vec![SPIRV_MAGIC, 0x0001_0000, 0, bound, 0]))
    }
}

/// Rejects every module at the first instruction.
#[allow(unused)]
#[derive(Debug, Default)]
pub struct RejectingAssembler;

impl Assembler for RejectingAssembler {
    fn assemble(&self, _source: &str) -> Result<SpirvBinary, CollaboratorError> {
        Err(CollaboratorError::Assembler {
            message: "unexpected token".to_string(),
            position: Some(SourcePosition { line: 6, column: 1 }),
        })
    }
}

/// Assembles fine but never validates.
#[allow(unused)]
#[derive(Debug, Default)]
pub struct StrictAssembler;

impl Assembler for StrictAssembler {
    fn assemble(&self, source: &str) -> Result<SpirvBinary, CollaboratorError> {
        HeaderAssembler.assemble(source)
    }

    fn validate(&self, _binary: &SpirvBinary) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::Validator {
            message: "entry point has no body".to_string(),
            position: None,
        })
    }
}

/// Appends one word per enabled pass, so tests can see which options arrived.
#[allow(unused)]
#[derive(Debug, Default)]
pub struct CountingOptimizer;

impl Optimizer for CountingOptimizer {
    fn optimize(
        &self,
        binary: &SpirvBinary,
        options: &OptimizerOptions,
    ) -> Result<SpirvBinary, CollaboratorError> {
        let passes = [
            options.freeze_spec_constants,
            options.unify_constants,
            options.strip_debug_info,
            options.eliminate_dead_functions,
            options.eliminate_dead_members,
        ];
        let mut words = binary.words().to_vec();
        words.extend(passes.iter().filter(|enabled| **enabled).map(|_| 0));
        Ok(SpirvBinary::new(words))
    }
}

/// Targets of `OpName` lines that nothing in the module defines.
#[allow(unused)]
pub fn undefined_names(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("OpName "))
        .filter_map(|rest| rest.split(' ').next())
        .filter(|target| {
            let definition = format!("{} = ", target);
            !text.lines().any(|line| line.starts_with(&definition))
        })
        .map(str::to_string)
        .collect()
}
