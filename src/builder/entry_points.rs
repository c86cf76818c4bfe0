use std::fmt;

use itertools::Itertools;
use tracing::{debug, instrument};

use crate::ir::{Capability, Id, SectionKind};

use super::{
    BuildError, ModuleBuilder,
    attributes::Interface,
    functions::{Callable, FunctionState, ReturnValue},
};

/// The pipeline stage an entry point runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessellationControl,
    TessellationEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// The SPIR-V execution model name.
    pub fn execution_model(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "Vertex",
            ShaderStage::TessellationControl => "TessellationControl",
            ShaderStage::TessellationEvaluation => "TessellationEvaluation",
            ShaderStage::Geometry => "Geometry",
            ShaderStage::Fragment => "Fragment",
            ShaderStage::Compute => "GLCompute",
        }
    }

    fn required_capability(self) -> Option<Capability> {
        match self {
            ShaderStage::TessellationControl | ShaderStage::TessellationEvaluation => {
                Some(Capability::Tessellation)
            }
            ShaderStage::Geometry => Some(Capability::Geometry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    OriginUpperLeft,
    OriginLowerLeft,
    DepthReplacing,
    LocalSize(u32, u32, u32),
}

impl ExecutionMode {
    fn is_origin(self) -> bool {
        matches!(
            self,
            ExecutionMode::OriginUpperLeft | ExecutionMode::OriginLowerLeft
        )
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::OriginUpperLeft => write!(f, "OriginUpperLeft"),
            ExecutionMode::OriginLowerLeft => write!(f, "OriginLowerLeft"),
            ExecutionMode::DepthReplacing => write!(f, "DepthReplacing"),
            ExecutionMode::LocalSize(x, y, z) => write!(f, "LocalSize {} {} {}", x, y, z),
        }
    }
}

/// A registered entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPointRecord {
    pub stage: ShaderStage,
    pub function: Id,
    pub name: String,
    pub interface: Vec<Id>,
}

impl ModuleBuilder {
    /// Registers a finished function as an entry point of the given stage.
    #[instrument(level = "debug", skip_all, fields(function = %function.name(), stage = ?stage))]
    pub fn add_entry_point<R: ReturnValue>(
        &mut self,
        stage: ShaderStage,
        function: &Callable<'_, R>,
        interface: &[&dyn Interface],
    ) -> Result<(), BuildError> {
        let record = self.callable_record(function)?;
        if record.state != FunctionState::Finished {
            return Err(BuildError::EntryPointNotFinished {
                name: record.name.clone(),
            });
        }
        if self
            .entry_points
            .iter()
            .any(|entry| entry.function == record.id)
        {
            return Err(BuildError::DuplicateEntryPoint {
                name: record.name.clone(),
            });
        }

        let entry = EntryPointRecord {
            stage,
            function: record.id,
            name: record.name.clone(),
            interface: interface.iter().map(|item| item.interface_id()).collect(),
        };

        if let Some(capability) = stage.required_capability() {
            self.add_capability(capability);
        }

        let mut line = format!(
            "OpEntryPoint {} {} \"{}\"",
            stage.execution_model(),
            entry.function,
            entry.name
        );
        if !entry.interface.is_empty() {
            line.push(' ');
            line.push_str(&entry.interface.iter().join(" "));
        }
        self.sections.append(SectionKind::EntryPoints, line);

        if stage == ShaderStage::Fragment && !self.origin_modes.contains(&entry.function) {
            self.push_execution_mode(entry.function, ExecutionMode::OriginUpperLeft);
        }

        debug!(
            "added {} entry point {} with {} interface variables",
            stage.execution_model(),
            entry.name,
            entry.interface.len()
        );
        self.entry_points.push(entry);
        Ok(())
    }

    /// Adds an execution mode to a declared function.
    pub fn add_execution_mode<R: ReturnValue>(
        &mut self,
        function: &Callable<'_, R>,
        mode: ExecutionMode,
    ) -> Result<(), BuildError> {
        let id = self.callable_record(function)?.id;
        self.push_execution_mode(id, mode);
        Ok(())
    }

    pub fn entry_points(&self) -> &[EntryPointRecord] {
        &self.entry_points
    }

    fn push_execution_mode(&mut self, function: Id, mode: ExecutionMode) {
        if mode.is_origin() {
            self.origin_modes.insert(function);
        }
        self.sections.append(
            SectionKind::ExecutionModes,
            format!("OpExecutionMode {} {}", function, mode),
        );
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(ExecutionMode::OriginUpperLeft, "OriginUpperLeft"; "upper left")]
    #[test_case(ExecutionMode::DepthReplacing, "DepthReplacing"; "depth replacing")]
    #[test_case(ExecutionMode::LocalSize(8, 8, 1), "LocalSize 8 8 1"; "local size")]
    fn execution_mode_text(mode: ExecutionMode, expected: &str) {
        assert_eq!(mode.to_string(), expected);
    }

    #[test]
    fn compute_uses_gl_compute_model() {
        assert_eq!(ShaderStage::Compute.execution_model(), "GLCompute");
        assert_eq!(ShaderStage::Vertex.required_capability(), None);
        assert_eq!(
            ShaderStage::TessellationEvaluation.required_capability(),
            Some(Capability::Tessellation)
        );
    }
}
