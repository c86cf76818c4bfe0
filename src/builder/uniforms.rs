use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::ir::{Id, SectionKind, StorageClass, StructTy, Type};

use super::{
    BuildError, FunctionBuilder, ModuleBuilder,
    values::{Component, ShaderType, ShaderValue, Vector},
};

/// How member offsets inside a uniform block are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LayoutRule {
    /// Each member starts right after the previous one.
    #[default]
    Packed,
    /// Each member is aligned to its std140 base alignment.
    Std140,
}

impl LayoutRule {
    /// Byte offset of each member, in declaration order.
    pub fn offsets(self, members: &[Type]) -> Vec<u64> {
        let mut offsets = Vec::with_capacity(members.len());
        let mut next: u64 = 0;
        for member in members {
            let offset = match self {
                LayoutRule::Packed => next,
                LayoutRule::Std140 => next.next_multiple_of(member.std140_alignment()),
            };
            offsets.push(offset);
            next = offset + member.size();
        }
        offsets
    }
}

/// One member of a uniform block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformMember {
    pub name: String,
    pub ty: Type,
}

impl UniformMember {
    pub fn new<V: ShaderType>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ty: V::ty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformLayout {
    pub set: u32,
    pub binding: u32,
    /// Member types with their byte offsets.
    pub members: Vec<(Type, u64)>,
}

/// A declared uniform block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uniform {
    id: Id,
    name: String,
    layout: UniformLayout,
}

impl Uniform {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }

    pub fn offsets(&self) -> Vec<u64> {
        self.layout.members.iter().map(|(_, offset)| *offset).collect()
    }
}

/// Uniform names become part of type identifiers.
fn validate_identifier(name: &str) -> Result<(), BuildError> {
    if name.starts_with("gl_") {
        return Err(BuildError::InvalidName {
            name: name.to_string(),
            reason: "names starting with gl_ are reserved for built-in blocks",
        });
    }
    let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BuildError::InvalidName {
            name: name.to_string(),
            reason: "uniform names must be ascii identifiers",
        })
    }
}

impl ModuleBuilder {
    /// Declares a uniform block at the given descriptor set and binding.
    #[instrument(level = "debug", skip_all, fields(name = %name, set = set, binding = binding))]
    pub fn create_uniform(
        &mut self,
        set: u32,
        binding: u32,
        name: &str,
        members: &[UniformMember],
    ) -> Result<Uniform, BuildError> {
        validate_identifier(name)?;
        if members.is_empty() {
            return Err(BuildError::EmptyUniform {
                name: name.to_string(),
            });
        }
        for member in members {
            validate_identifier(&member.name)?;
            if member.ty.contains_bool() {
                return Err(BuildError::TypeMismatch {
                    expected: "a numeric uniform member".to_string(),
                    found: member.ty.to_string(),
                });
            }
        }
        let member_types: Vec<Type> = members.iter().map(|member| member.ty.clone()).collect();
        let offsets = self.config.uniform_layout.offsets(&member_types);
        let ty = Type::Struct(StructTy {
            name: name.to_string(),
            members: member_types.clone(),
        });
        if self.types.by_identifier(&ty.raw_identifier()).is_some() {
            return Err(BuildError::DuplicateUniform {
                name: name.to_string(),
            });
        }
        let descriptor = self.types.register(&mut self.sections, &ty);
        let id = self.global_variable(&ty, StorageClass::Uniform);

        self.sections.append(
            SectionKind::DebugNames,
            format!("OpName {} \"{}\"", descriptor.identifier, name),
        );
        for (index, member) in members.iter().enumerate() {
            self.sections.append(
                SectionKind::DebugNames,
                format!(
                    "OpMemberName {} {} \"{}\"",
                    descriptor.identifier, index, member.name
                ),
            );
        }
        self.sections
            .append(SectionKind::DebugNames, format!("OpName {} \"{}\"", id, name));

        self.sections.append(
            SectionKind::Annotations,
            format!("OpDecorate {} Block", descriptor.identifier),
        );
        for (index, offset) in offsets.iter().enumerate() {
            self.sections.append(
                SectionKind::Annotations,
                format!(
                    "OpMemberDecorate {} {} Offset {}",
                    descriptor.identifier, index, offset
                ),
            );
        }
        self.sections.append(
            SectionKind::Annotations,
            format!("OpDecorate {} DescriptorSet {}", id, set),
        );
        self.sections.append(
            SectionKind::Annotations,
            format!("OpDecorate {} Binding {}", id, binding),
        );
        debug!("declared uniform {} as {} with offsets {:?}", name, id, offsets);

        Ok(Uniform {
            id,
            name: name.to_string(),
            layout: UniformLayout {
                set,
                binding,
                members: member_types.into_iter().zip(offsets).collect(),
            },
        })
    }
}

impl FunctionBuilder<'_> {
    /// Copies one member of a uniform block into a new local vector.
    pub fn load_uniform_member<T: Component, const N: usize>(
        &mut self,
        uniform: &Uniform,
        index: usize,
    ) -> Result<Vector<T, N>, BuildError> {
        let ty = <Vector<T, N> as ShaderType>::ty();
        let (member, _) =
            uniform
                .layout
                .members
                .get(index)
                .ok_or_else(|| BuildError::MemberOutOfRange {
                    uniform: uniform.name.clone(),
                    index,
                })?;
        if *member != ty {
            return Err(BuildError::TypeMismatch {
                expected: member.to_string(),
                found: ty.to_string(),
            });
        }

        let pointer = self.module.types.register(
            &mut self.module.sections,
            &Type::pointer(StorageClass::Uniform, ty.clone()),
        );
        let constant = self.module.member_index(index);
        let storage = self.local_variable(&ty)?;
        let chain = self.module.ids.next_id();

        let block = self.module.current_block_mut()?;
        block.push(format!(
            "{} = OpAccessChain {} {} {}",
            chain, pointer.identifier, uniform.id, constant
        ))?;
        block.push(format!("OpCopyMemory {} {}", storage, chain))?;

        Ok(Vector::from_storage(storage))
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::ir::FloatTy;

    fn float_vector(count: u32) -> Type {
        Type::vector(Type::Float(FloatTy::F32), count)
    }

    #[test_case(LayoutRule::Packed, vec![float_vector(4), float_vector(2), Type::Float(FloatTy::F32)], vec![0, 16, 24]; "packed sums sizes")]
    #[test_case(LayoutRule::Packed, vec![Type::Float(FloatTy::F32), float_vector(3), float_vector(2)], vec![0, 4, 16]; "packed ignores alignment")]
    #[test_case(LayoutRule::Std140, vec![Type::Float(FloatTy::F32), float_vector(3), float_vector(2)], vec![0, 16, 32]; "std140 aligns vectors")]
    #[test_case(LayoutRule::Std140, vec![float_vector(3), Type::Float(FloatTy::F32)], vec![0, 12]; "std140 packs scalar after vec3")]
    fn member_offsets(rule: LayoutRule, members: Vec<Type>, expected: Vec<u64>) {
        assert_eq!(rule.offsets(&members), expected);
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(validate_identifier("camera_2").is_ok());
        assert!(validate_identifier("2camera").is_err());
        assert!(validate_identifier("my camera").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("gl_PerVertex").is_err());
    }
}
