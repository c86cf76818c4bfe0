use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::{
    Type,
    sections::{SectionKind, SectionStore, content_hash},
};

/// Everything the module knows about a registered type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub ty: Type,
    /// Symbolic identifier, e.g. `%vec2_float`.
    pub identifier: String,
    /// The full declaring instruction, e.g. `%vec2_float = OpTypeVector %float 2`.
    pub declaration: String,
    /// Byte size, without padding.
    pub size: u64,
    /// The component type of vectors.
    pub component: Option<Box<TypeDescriptor>>,
}

/// A scalar literal, stored by bit pattern so it can be hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Uint(u64),
    F32(u32),
    F64(u64),
}

impl Literal {
    pub fn is_finite(&self) -> bool {
        match self {
            Literal::F32(bits) => f32::from_bits(*bits).is_finite(),
            Literal::F64(bits) => f64::from_bits(*bits).is_finite(),
            _ => true,
        }
    }

    fn identifier_suffix(&self) -> String {
        match self {
            Literal::Bool(value) => value.to_string(),
            Literal::Int(value) if *value < 0 => format!("n{}", value.unsigned_abs()),
            Literal::Int(value) => value.to_string(),
            Literal::Uint(value) => value.to_string(),
            Literal::F32(bits) => format!("{bits:08x}"),
            Literal::F64(bits) => format!("{bits:016x}"),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::Int(value) => write!(f, "{value}"),
            Literal::Uint(value) => write!(f, "{value}"),
            Literal::F32(bits) => write!(f, "{:?}", f32::from_bits(*bits)),
            Literal::F64(bits) => write!(f, "{:?}", f64::from_bits(*bits)),
        }
    }
}

/// Maps types to their declarations and interns constants.
///
/// Everything registered here ends up in the type declarations section, in
/// first-registration order with dependencies first.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: FxHashMap<Type, TypeDescriptor>,
    /// Symbolic identifier to the type that owns it.
    identifiers: FxHashMap<String, Type>,
    /// Right hand side of a composite constant to its identifier.
    composites: FxHashMap<String, String>,
    composite_names: FxHashSet<String>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct types registered so far.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, ty: &Type) -> Option<&TypeDescriptor> {
        self.types.get(ty)
    }

    /// The type registered under a symbolic identifier, given without the `%`.
    ///
    /// Struct identifiers come from the struct name alone, so this is how two
    /// different structs asking for the same one are caught.
    pub fn by_identifier(&self, raw_identifier: &str) -> Option<&Type> {
        self.identifiers.get(raw_identifier)
    }

    /// Registers a type, declaring it and everything it references the first
    /// time it is seen.
    pub fn register(&mut self, sections: &mut SectionStore, ty: &Type) -> TypeDescriptor {
        if let Some(descriptor) = self.types.get(ty) {
            return descriptor.clone();
        }

        for dependency in ty.dependencies() {
            self.register(sections, dependency);
        }

        if let Some(capability) = ty.required_capability() {
            sections.append(SectionKind::Capabilities, format!("OpCapability {capability}"));
        }

        let identifier = ty.identifier();
        let declaration = format!("{} = {}", identifier, ty.declaration());
        let component = match ty {
            Type::Vector(component, _) => self.types.get(component.as_ref()).cloned().map(Box::new),
            _ => None,
        };

        if sections.append(SectionKind::TypeDeclarations, declaration.clone()) {
            debug!("declared type {}", declaration);
        }

        let descriptor = TypeDescriptor {
            ty: ty.clone(),
            identifier,
            declaration,
            size: ty.size(),
            component,
        };
        self.identifiers
            .entry(ty.raw_identifier())
            .or_insert_with(|| ty.clone());
        self.types.insert(ty.clone(), descriptor.clone());
        descriptor
    }

    /// Interns a scalar constant of the given type and returns its identifier.
    pub fn constant(&mut self, sections: &mut SectionStore, ty: &Type, value: Literal) -> String {
        let ty = self.register(sections, ty);
        let identifier = format!("%const_{}_{}", ty.ty.raw_identifier(), value.identifier_suffix());

        let declaration = match value {
            Literal::Bool(true) => format!("{} = OpConstantTrue {}", identifier, ty.identifier),
            Literal::Bool(false) => format!("{} = OpConstantFalse {}", identifier, ty.identifier),
            _ => format!("{} = OpConstant {} {}", identifier, ty.identifier, value),
        };

        if sections.append(SectionKind::TypeDeclarations, declaration) {
            debug!("interned constant {} = {}", identifier, value);
        }

        identifier
    }

    /// Interns a composite constant built from already declared constants.
    ///
    /// The identifier is derived from a content hash; two different
    /// composites whose hashes collide get distinct identifiers.
    pub fn composite_constant(
        &mut self,
        sections: &mut SectionStore,
        ty: &Type,
        constituents: &[String],
    ) -> String {
        let ty = self.register(sections, ty);
        let body = format!("OpConstantComposite {} {}", ty.identifier, constituents.join(" "));

        if let Some(identifier) = self.composites.get(&body) {
            return identifier.clone();
        }

        let hash = content_hash(body.as_str());
        let mut identifier = format!("%composite_{hash:016x}");
        let mut suffix = 1;
        while self.composite_names.contains(&identifier) {
            identifier = format!("%composite_{hash:016x}_{suffix}");
            suffix += 1;
        }

        sections.append(
            SectionKind::TypeDeclarations,
            format!("{} = {}", identifier, body),
        );
        debug!("interned composite {} = {}", identifier, body);

        self.composite_names.insert(identifier.clone());
        self.composites.insert(body, identifier.clone());
        identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FloatTy, IntTy, StorageClass, StructTy, UintTy};

    #[test]
    fn registering_twice_declares_once() {
        let mut sections = SectionStore::new();
        let mut registry = TypeRegistry::new();
        let ty = Type::vector(Type::Float(FloatTy::F32), 2);

        let first = registry.register(&mut sections, &ty);
        let second = registry.register(&mut sections, &ty);

        assert_eq!(first, second);
        let declarations = sections.section(SectionKind::TypeDeclarations).lines();
        assert_eq!(
            declarations
                .iter()
                .filter(|line| line.contains("OpTypeVector"))
                .count(),
            1
        );
    }

    #[test]
    fn components_are_declared_first() {
        let mut sections = SectionStore::new();
        let mut registry = TypeRegistry::new();
        let ty = Type::pointer(
            StorageClass::Input,
            Type::vector(Type::Float(FloatTy::F32), 3),
        );

        let descriptor = registry.register(&mut sections, &ty);

        assert_eq!(descriptor.identifier, "%ptr_input_vec3_float");
        assert_eq!(
            sections.section(SectionKind::TypeDeclarations).lines().to_vec(),
            vec![
                "%float = OpTypeFloat 32".to_string(),
                "%vec3_float = OpTypeVector %float 3".to_string(),
                "%ptr_input_vec3_float = OpTypePointer Input %vec3_float".to_string(),
            ]
        );
    }

    #[test]
    fn vector_descriptor_carries_component() {
        let mut sections = SectionStore::new();
        let mut registry = TypeRegistry::new();

        let descriptor = registry.register(&mut sections, &Type::vector(Type::Uint(UintTy::U16), 4));

        let component = descriptor.component.expect("vectors have a component");
        assert_eq!(component.identifier, "%uint16");
        assert_eq!(descriptor.size, 8);
    }

    #[test]
    fn wide_types_add_capabilities_once() {
        let mut sections = SectionStore::new();
        let mut registry = TypeRegistry::new();

        registry.register(&mut sections, &Type::Int(IntTy::I64));
        registry.register(&mut sections, &Type::Uint(UintTy::U64));
        registry.register(&mut sections, &Type::Float(FloatTy::F64));

        assert_eq!(
            sections.section(SectionKind::Capabilities).lines().to_vec(),
            vec!["OpCapability Int64".to_string(), "OpCapability Float64".to_string()]
        );
    }

    #[test]
    fn constants_are_interned() {
        let mut sections = SectionStore::new();
        let mut registry = TypeRegistry::new();
        let float = Type::Float(FloatTy::F32);

        let one = registry.constant(&mut sections, &float, Literal::F32(1.0f32.to_bits()));
        let again = registry.constant(&mut sections, &float, Literal::F32(1.0f32.to_bits()));
        let negative = registry.constant(&mut sections, &Type::Int(IntTy::I32), Literal::Int(-3));

        assert_eq!(one, again);
        assert_eq!(one, "%const_float_3f800000");
        assert_eq!(negative, "%const_int32_n3");
        assert!(
            sections
                .section(SectionKind::TypeDeclarations)
                .contains("%const_float_3f800000 = OpConstant %float 1.0")
        );
    }

    #[test]
    fn identical_composites_share_an_identifier() {
        let mut sections = SectionStore::new();
        let mut registry = TypeRegistry::new();
        let ty = Type::vector(Type::Float(FloatTy::F32), 2);
        let parts = vec!["%const_float_3f800000".to_string(); 2];

        let first = registry.composite_constant(&mut sections, &ty, &parts);
        let second = registry.composite_constant(&mut sections, &ty, &parts);

        assert_eq!(first, second);
        assert!(first.starts_with("%composite_"));
    }

    #[test]
    fn colliding_composite_names_get_a_suffix() {
        let mut sections = SectionStore::new();
        let mut registry = TypeRegistry::new();
        let ty = Type::vector(Type::Float(FloatTy::F32), 2);
        let parts = vec!["%const_float_3f800000".to_string(); 2];

        let hash = content_hash("OpConstantComposite %vec2_float %const_float_3f800000 %const_float_3f800000");
        let taken = format!("%composite_{hash:016x}");
        registry.composite_names.insert(taken.clone());
        registry.composite_names.insert(format!("{taken}_1"));

        let identifier = registry.composite_constant(&mut sections, &ty, &parts);

        assert_eq!(identifier, format!("{taken}_2"));
        assert!(sections.section(SectionKind::TypeDeclarations).contains(&format!(
            "{identifier} = OpConstantComposite %vec2_float %const_float_3f800000 %const_float_3f800000"
        )));
        assert_eq!(registry.composite_constant(&mut sections, &ty, &parts), identifier);
    }

    #[test]
    fn structs_sharing_a_name_conflict() {
        let mut sections = SectionStore::new();
        let mut registry = TypeRegistry::new();
        let float = Type::Float(FloatTy::F32);
        let first = Type::Struct(StructTy {
            name: "light".to_string(),
            members: vec![float.clone()],
        });
        let second = Type::Struct(StructTy {
            name: "light".to_string(),
            members: vec![float.clone(), float],
        });

        assert_eq!(registry.by_identifier("type_light"), None);
        registry.register(&mut sections, &first);

        assert_eq!(second.raw_identifier(), "type_light");
        assert_eq!(registry.by_identifier(&second.raw_identifier()), Some(&first));
    }
}
