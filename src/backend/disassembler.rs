use rspirv::binary::Disassemble;

use super::{CollaboratorError, Decompiler, SpirvBinary, TargetLanguage};

/// Disassembles binaries with the `rspirv` parser.
///
/// It has no shading language backends, so `decompile` always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RspirvDisassembler;

impl Decompiler for RspirvDisassembler {
    fn disassemble(&self, binary: &SpirvBinary) -> Result<String, CollaboratorError> {
        let module = rspirv::dr::load_words(binary.words()).map_err(|e| {
            CollaboratorError::Decompiler {
                message: format!("{:?}", e),
                position: None,
            }
        })?;
        Ok(module.disassemble())
    }

    fn decompile(
        &self,
        _binary: &SpirvBinary,
        language: TargetLanguage,
    ) -> Result<String, CollaboratorError> {
        Err(CollaboratorError::Decompiler {
            message: format!("decompiling to {:?} is not supported", language),
            position: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use rspirv::{
        binary::Assemble,
        dr::Builder,
        spirv::{AddressingModel, Capability, MemoryModel},
    };

    use super::*;

    fn minimal_module() -> SpirvBinary {
        let mut builder = Builder::new();
        builder.capability(Capability::Shader);
        builder.memory_model(AddressingModel::Logical, MemoryModel::GLSL450);
        builder.type_float(32);
        SpirvBinary::new(builder.module().assemble())
    }

    #[test]
    fn disassembles_real_binary() {
        let text = RspirvDisassembler.disassemble(&minimal_module()).unwrap();

        assert!(text.contains("OpCapability Shader"), "{}", text);
        assert!(text.contains("OpMemoryModel Logical GLSL450"), "{}", text);
        assert!(text.contains("OpTypeFloat 32"), "{}", text);
    }

    #[test]
    fn garbage_is_a_decompiler_error() {
        let binary = SpirvBinary::new(vec![0xdead_beef, 1, 2]);
        let error = RspirvDisassembler.disassemble(&binary).unwrap_err();
        assert!(matches!(&error, CollaboratorError::Decompiler { .. }), "{:#?}", error);
    }

    #[test]
    fn decompile_is_unsupported() {
        let error = RspirvDisassembler
            .decompile(&minimal_module(), TargetLanguage::Glsl)
            .unwrap_err();
        assert!(error.to_string().contains("Glsl"), "{}", error);
    }
}
