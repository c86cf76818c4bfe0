use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument};
use typed_generational_arena::StandardSlab;

use crate::{
    config::{AddressingModel, BuilderConfig, MemoryModel},
    ir::{
        Capability, Id, IdGenerator, InstructionSection, SectionKind, SectionStore,
        TypeRegistry, sections::Preamble,
    },
};

pub mod attributes;
pub mod entry_points;
pub mod errors;
pub mod functions;
pub mod uniforms;
pub mod values;

pub use attributes::{Input, Interface, Output, PerVertex};
pub use entry_points::{EntryPointRecord, ExecutionMode, ShaderStage};
pub use errors::BuildError;
pub use functions::{
    Callable, FunctionBlock, FunctionBuilder, FunctionState, Parameters, ReturnValue,
};
pub use uniforms::{LayoutRule, Uniform, UniformLayout, UniformMember};
pub use values::{
    Component, Initializer, ShaderType, ShaderValue, Vec2, Vec3, Vec4, Vector, VectorSource,
};

use functions::{FnIndex, FunctionRecord, validate_debug_name};

static NEXT_MODULE: AtomicU64 = AtomicU64::new(0);

/// Tells the builders of a process apart, so handles can't cross modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ModuleToken(u64);

impl ModuleToken {
    fn next() -> Self {
        Self(NEXT_MODULE.fetch_add(1, Ordering::Relaxed))
    }
}

/// Builds one SPIR-V module in its textual form.
///
/// Owns everything the module is made of. Independent builders share
/// nothing, so several modules can be built side by side.
#[derive(Debug)]
pub struct ModuleBuilder {
    config: BuilderConfig,
    pub(crate) token: ModuleToken,
    pub(crate) ids: IdGenerator,
    pub(crate) sections: SectionStore,
    pub(crate) types: TypeRegistry,
    pub(crate) functions: StandardSlab<FunctionRecord>,
    /// Blocks being recorded, innermost last.
    pub(crate) open_blocks: Vec<FunctionBlock>,
    /// Function-local variables and the function declaring them.
    pub(crate) locals: FxHashMap<Id, FnIndex>,
    entry_points: Vec<EntryPointRecord>,
    ext_imports: FxHashMap<String, Id>,
    per_vertex: Option<PerVertex>,
    /// Functions with an explicit origin execution mode.
    origin_modes: FxHashSet<Id>,
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new(BuilderConfig::default())
    }
}

impl ModuleBuilder {
    pub fn new(config: BuilderConfig) -> Self {
        let mut sections = SectionStore::new();
        for capability in &config.capabilities {
            sections.append(SectionKind::Capabilities, format!("OpCapability {capability}"));
        }
        sections.replace(
            SectionKind::MemoryModel,
            format!(
                "OpMemoryModel {} {}",
                config.addressing_model, config.memory_model
            ),
        );

        Self {
            config,
            token: ModuleToken::next(),
            ids: IdGenerator::new(),
            sections,
            types: TypeRegistry::new(),
            functions: StandardSlab::new(),
            open_blocks: Vec::new(),
            locals: FxHashMap::default(),
            entry_points: Vec::new(),
            ext_imports: FxHashMap::default(),
            per_vertex: None,
            origin_modes: FxHashSet::default(),
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn section(&self, kind: SectionKind) -> &InstructionSection {
        self.sections.section(kind)
    }

    pub(crate) fn current_block_mut(&mut self) -> Result<&mut FunctionBlock, BuildError> {
        self.open_blocks
            .last_mut()
            .ok_or(BuildError::NoActiveFunction)
    }

    pub fn add_capability(&mut self, capability: Capability) {
        self.sections
            .append(SectionKind::Capabilities, format!("OpCapability {capability}"));
    }

    pub fn add_extension(&mut self, name: &str) -> Result<(), BuildError> {
        validate_debug_name(name)?;
        self.sections
            .append(SectionKind::Extensions, format!("OpExtension \"{}\"", name));
        Ok(())
    }

    /// Imports an extended instruction set such as `GLSL.std.450`.
    ///
    /// Importing the same set twice returns the first id.
    pub fn import_extended_instructions(&mut self, name: &str) -> Result<Id, BuildError> {
        validate_debug_name(name)?;
        if let Some(id) = self.ext_imports.get(name) {
            return Ok(*id);
        }

        let id = self.ids.next_id();
        self.sections.append(
            SectionKind::ExtInstImports,
            format!("{} = OpExtInstImport \"{}\"", id, name),
        );
        self.ext_imports.insert(name.to_string(), id);
        debug!("imported {} as {}", name, id);
        Ok(id)
    }

    /// Records the source language, e.g. `("GLSL", 450)`.
    pub fn set_source(&mut self, language: &str, version: u32) -> Result<(), BuildError> {
        validate_debug_name(language)?;
        self.sections.append(
            SectionKind::DebugSources,
            format!("OpSource {} {}", language, version),
        );
        Ok(())
    }

    pub fn set_memory_model(&mut self, addressing: AddressingModel, memory: MemoryModel) {
        self.config.addressing_model = addressing;
        self.config.memory_model = memory;
        self.sections.replace(
            SectionKind::MemoryModel,
            format!("OpMemoryModel {} {}", addressing, memory),
        );
    }

    pub fn set_debug_name(&mut self, id: Id, name: &str) -> Result<(), BuildError> {
        validate_debug_name(name)?;
        self.sections
            .append(SectionKind::DebugNames, format!("OpName {} \"{}\"", id, name));
        Ok(())
    }

    /// The module as SPIR-V assembly text.
    ///
    /// Rendering doesn't change the module, so it gives the same text until
    /// something else is declared.
    #[instrument(level = "debug", skip_all)]
    pub fn render(&self) -> String {
        let text = self.sections.render(&Preamble {
            version: (1, 0),
            generator: self.config.generator.clone(),
            bound: self.ids.bound(),
        });
        if !self.open_blocks.is_empty() {
            debug!(
                "rendering with {} function(s) still being recorded",
                self.open_blocks.len()
            );
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_module_declares_shader_and_memory_model() {
        let module = ModuleBuilder::default();
        let text = module.render();

        assert!(text.starts_with("; SPIR-V\n; Version: 1.0\n"));
        assert!(text.contains("; Bound: 1\n"));
        assert!(text.contains("OpCapability Shader\nOpMemoryModel Logical GLSL450\n"));
    }

    #[test]
    fn ext_imports_are_interned() {
        let mut module = ModuleBuilder::default();
        let first = module.import_extended_instructions("GLSL.std.450").unwrap();
        let second = module.import_extended_instructions("GLSL.std.450").unwrap();

        assert_eq!(first, second);
        assert_eq!(module.section(SectionKind::ExtInstImports).len(), 1);
    }

    #[test]
    fn memory_model_is_replaced() {
        let mut module = ModuleBuilder::default();
        module.set_memory_model(AddressingModel::Logical, MemoryModel::Vulkan);

        assert_eq!(
            module.section(SectionKind::MemoryModel).lines().to_vec(),
            vec!["OpMemoryModel Logical Vulkan".to_string()]
        );
        assert_eq!(module.config().memory_model, MemoryModel::Vulkan);
    }

    #[test]
    fn capabilities_are_not_repeated() {
        let mut module = ModuleBuilder::default();
        module.add_capability(Capability::Shader);
        module.add_capability(Capability::Geometry);
        module.add_capability(Capability::Geometry);

        assert_eq!(
            module.section(SectionKind::Capabilities).lines().to_vec(),
            vec![
                "OpCapability Shader".to_string(),
                "OpCapability Geometry".to_string()
            ]
        );
    }
}
