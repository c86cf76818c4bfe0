use tracing::{debug, instrument};

use crate::ir::{FloatTy, Id, IntTy, SectionKind, StorageClass, StructTy, Type, types::Literal};

use super::{
    BuildError, FunctionBuilder, ModuleBuilder,
    functions::validate_debug_name,
    values::{ShaderType, ShaderValue, Vec4},
};

/// A module-level variable that can be listed in an entry point's interface.
pub trait Interface {
    fn interface_id(&self) -> Id;
}

/// A stage input. Read only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Input<V> {
    value: V,
    location: u32,
}

impl<V: ShaderValue> Input<V> {
    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn location(&self) -> u32 {
        self.location
    }
}

/// A stage output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Output<V> {
    value: V,
    location: u32,
}

impl<V: ShaderValue> Output<V> {
    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn location(&self) -> u32 {
        self.location
    }
}

impl<V: ShaderValue> Interface for Input<V> {
    fn interface_id(&self) -> Id {
        self.value.id()
    }
}

impl<V: ShaderValue> Interface for Output<V> {
    fn interface_id(&self) -> Id {
        self.value.id()
    }
}

/// The built-in `gl_PerVertex` output block of vertex-like stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerVertex {
    id: Id,
}

impl PerVertex {
    pub fn id(&self) -> Id {
        self.id
    }

    fn members() -> [(&'static str, &'static str, Type); 2] {
        let float = Type::Float(FloatTy::F32);
        [
            ("gl_Position", "Position", Type::vector(float.clone(), 4)),
            ("gl_PointSize", "PointSize", float),
        ]
    }

    fn struct_type() -> Type {
        Type::Struct(StructTy {
            name: "gl_PerVertex".to_string(),
            members: Self::members().into_iter().map(|(_, _, ty)| ty).collect(),
        })
    }
}

impl Interface for PerVertex {
    fn interface_id(&self) -> Id {
        self.id
    }
}

impl ModuleBuilder {
    /// Declares a stage input at the given location.
    #[instrument(level = "debug", skip_all, fields(name = %name, location = location))]
    pub fn create_input<V: ShaderValue>(&mut self, location: u32, name: &str) -> Result<Input<V>, BuildError> {
        let id = self.declare_attribute(&V::ty(), StorageClass::Input, location, name)?;
        Ok(Input {
            value: V::from_storage(id),
            location,
        })
    }

    /// Declares a stage output at the given location.
    #[instrument(level = "debug", skip_all, fields(name = %name, location = location))]
    pub fn create_output<V: ShaderValue>(&mut self, location: u32, name: &str) -> Result<Output<V>, BuildError> {
        let id = self.declare_attribute(&V::ty(), StorageClass::Output, location, name)?;
        Ok(Output {
            value: V::from_storage(id),
            location,
        })
    }

    fn declare_attribute(
        &mut self,
        ty: &Type,
        storage: StorageClass,
        location: u32,
        name: &str,
    ) -> Result<Id, BuildError> {
        validate_debug_name(name)?;
        if ty.contains_bool() {
            return Err(BuildError::TypeMismatch {
                expected: "a numeric interface type".to_string(),
                found: ty.to_string(),
            });
        }

        let id = self.global_variable(ty, storage);
        self.sections
            .append(SectionKind::DebugNames, format!("OpName {} \"{}\"", id, name));
        self.sections.append(
            SectionKind::Annotations,
            format!("OpDecorate {} Location {}", id, location),
        );
        debug!("declared {} {} {} at location {}", storage, ty, id, location);
        Ok(id)
    }

    /// Declares the `gl_PerVertex` block. Later calls return the same block.
    #[instrument(level = "debug", skip_all)]
    pub fn create_per_vertex(&mut self) -> PerVertex {
        if let Some(per_vertex) = self.per_vertex {
            return per_vertex;
        }

        let ty = PerVertex::struct_type();
        let descriptor = self.types.register(&mut self.sections, &ty);
        let id = self.global_variable(&ty, StorageClass::Output);

        self.sections.append(
            SectionKind::DebugNames,
            format!("OpName {} \"gl_PerVertex\"", descriptor.identifier),
        );
        for (index, (name, builtin, _)) in PerVertex::members().into_iter().enumerate() {
            self.sections.append(
                SectionKind::DebugNames,
                format!("OpMemberName {} {} \"{}\"", descriptor.identifier, index, name),
            );
            self.sections.append(
                SectionKind::Annotations,
                format!(
                    "OpMemberDecorate {} {} BuiltIn {}",
                    descriptor.identifier, index, builtin
                ),
            );
        }
        self.sections.append(
            SectionKind::Annotations,
            format!("OpDecorate {} Block", descriptor.identifier),
        );

        let per_vertex = PerVertex { id };
        self.per_vertex = Some(per_vertex);
        debug!("declared gl_PerVertex as {}", id);
        per_vertex
    }

    /// Interns the `int32` constant used to index struct members.
    pub(crate) fn member_index(&mut self, index: usize) -> String {
        self.types.constant(
            &mut self.sections,
            &Type::Int(IntTy::I32),
            Literal::Int(index as i64),
        )
    }
}

impl FunctionBuilder<'_> {
    /// Writes `gl_Position`.
    pub fn set_position(&mut self, per_vertex: &PerVertex, value: &Vec4<f32>) -> Result<(), BuildError> {
        self.check_local(value.id())?;
        let pointer = self.module.types.register(
            &mut self.module.sections,
            &Type::pointer(StorageClass::Output, <Vec4<f32> as ShaderType>::ty()),
        );
        let index = self.module.member_index(0);
        let member = self.module.ids.next_id();

        let block = self.module.current_block_mut()?;
        block.push(format!(
            "{} = OpAccessChain {} {} {}",
            member, pointer.identifier, per_vertex.id, index
        ))?;
        block.push(format!("OpCopyMemory {} {}", member, value.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder::Vec3, config::BuilderConfig};

    #[test]
    fn input_is_decorated_with_location() {
        let mut module = ModuleBuilder::new(BuilderConfig::default());
        let input = module.create_input::<Vec3<f32>>(5, "normal").unwrap();
        let id = input.interface_id();

        assert_eq!(input.location(), 5);
        assert!(
            module
                .section(SectionKind::Annotations)
                .contains(&format!("OpDecorate {} Location 5", id))
        );
        assert!(
            module
                .section(SectionKind::TypeDeclarations)
                .contains(&format!("{} = OpVariable %ptr_input_vec3_float Input", id))
        );
        assert!(
            module
                .section(SectionKind::DebugNames)
                .contains(&format!("OpName {} \"normal\"", id))
        );
    }

    #[test]
    fn per_vertex_is_declared_once() {
        let mut module = ModuleBuilder::new(BuilderConfig::default());
        let first = module.create_per_vertex();
        let second = module.create_per_vertex();

        assert_eq!(first, second);
        let types = module.section(SectionKind::TypeDeclarations);
        assert!(types.contains("%type_gl_PerVertex = OpTypeStruct %vec4_float %float"));
        assert!(
            module
                .section(SectionKind::Annotations)
                .contains("OpMemberDecorate %type_gl_PerVertex 0 BuiltIn Position")
        );
    }

    #[test]
    fn boolean_attributes_are_rejected() {
        let mut module = ModuleBuilder::new(BuilderConfig::default());
        let error = module.create_input::<Vec3<bool>>(0, "flags").unwrap_err();

        assert!(
            matches!(&error, BuildError::TypeMismatch { found, .. } if found == "vec3_bool"),
            "{:#?}",
            error
        );
        assert!(!module.render().contains("OpVariable"));
    }

    #[test]
    fn attribute_names_are_checked() {
        let mut module = ModuleBuilder::new(BuilderConfig::default());
        let error = module.create_output::<Vec3<f32>>(0, "bad\"name").unwrap_err();
        assert!(matches!(&error, BuildError::InvalidName { .. }), "{:#?}", error);
    }
}
