use std::fmt;

use educe::Educe;
use tracing::{debug, instrument};

use crate::ir::{
    FloatTy, Id, IntTy, SectionKind, StorageClass, Type, UintTy, types::Literal,
};

use super::{BuildError, FunctionBuilder, ModuleBuilder};

/// A type with a fixed declaration in the module.
pub trait ShaderType {
    fn ty() -> Type;
}

/// A scalar that can be a vector component or a literal.
pub trait Component: Copy + Default + PartialEq + fmt::Debug + 'static {
    fn ty() -> Type;
    fn literal(self) -> Literal;
}

macro_rules! component {
    ($host:ty, $ty:expr, $value:ident => $literal:expr) => {
        impl Component for $host {
            fn ty() -> Type {
                $ty
            }

            fn literal(self) -> Literal {
                let $value = self;
                $literal
            }
        }

        impl ShaderType for $host {
            fn ty() -> Type {
                $ty
            }
        }
    };
}

component!(bool, Type::Bool, v => Literal::Bool(v));
component!(i8, Type::Int(IntTy::I8), v => Literal::Int(i64::from(v)));
component!(i16, Type::Int(IntTy::I16), v => Literal::Int(i64::from(v)));
component!(i32, Type::Int(IntTy::I32), v => Literal::Int(i64::from(v)));
component!(i64, Type::Int(IntTy::I64), v => Literal::Int(v));
component!(u8, Type::Uint(UintTy::U8), v => Literal::Uint(u64::from(v)));
component!(u16, Type::Uint(UintTy::U16), v => Literal::Uint(u64::from(v)));
component!(u32, Type::Uint(UintTy::U32), v => Literal::Uint(u64::from(v)));
component!(u64, Type::Uint(UintTy::U64), v => Literal::Uint(v));
component!(f32, Type::Float(FloatTy::F32), v => Literal::F32(v.to_bits()));
component!(f64, Type::Float(FloatTy::F64), v => Literal::F64(v.to_bits()));

impl ShaderType for () {
    fn ty() -> Type {
        Type::Void
    }
}

/// A value backed by addressable storage.
///
/// Every value-producing operation goes through a load or store on the
/// storage, which is how mutable variables are expressed in SSA form.
pub trait ShaderValue: ShaderType + Clone {
    /// The id of the backing `OpVariable`.
    fn id(&self) -> Id;

    /// A handle to existing storage, with default host-side components.
    fn from_storage(id: Id) -> Self;

    /// Copies the host-side components of another value.
    fn mirror(&mut self, other: &Self);
}

/// A 2, 3 or 4 component vector variable.
///
/// The components are mirrored on the host for convenience; the emitted
/// instructions are what the module actually computes.
#[derive(Debug, Clone, Copy, Educe)]
#[educe(PartialEq, Hash)]
pub struct Vector<T, const N: usize> {
    id: Id,
    #[educe(PartialEq(ignore), Hash(ignore))]
    components: [T; N],
}

pub type Vec2<T = f32> = Vector<T, 2>;
pub type Vec3<T = f32> = Vector<T, 3>;
pub type Vec4<T = f32> = Vector<T, 4>;

impl<T: Component, const N: usize> Vector<T, N> {
    pub fn id(&self) -> Id {
        self.id
    }

    pub fn components(&self) -> &[T; N] {
        &self.components
    }

    pub fn x(&self) -> T {
        self.components[0]
    }

    pub fn y(&self) -> T {
        self.components[1]
    }
}

impl<T: Component> Vector<T, 3> {
    pub fn z(&self) -> T {
        self.components[2]
    }
}

impl<T: Component> Vector<T, 4> {
    pub fn z(&self) -> T {
        self.components[2]
    }

    pub fn w(&self) -> T {
        self.components[3]
    }
}

impl<T: Component, const N: usize> ShaderType for Vector<T, N> {
    fn ty() -> Type {
        const { assert!(N >= 2 && N <= 4, "vectors have 2 to 4 components") };
        Type::vector(T::ty(), N as u32)
    }
}

impl<T: Component, const N: usize> ShaderValue for Vector<T, N> {
    fn id(&self) -> Id {
        self.id
    }

    fn from_storage(id: Id) -> Self {
        Self {
            id,
            components: [T::default(); N],
        }
    }

    fn mirror(&mut self, other: &Self) {
        self.components = other.components;
    }
}

/// Any vector with components of type `T`, whatever its length.
pub trait VectorSource<T: Component> {
    fn storage(&self) -> Id;
    fn source_type(&self) -> Type;
    fn source_components(&self) -> &[T];
}

impl<T: Component, const N: usize> VectorSource<T> for Vector<T, N> {
    fn storage(&self) -> Id {
        self.id
    }

    fn source_type(&self) -> Type {
        <Self as ShaderType>::ty()
    }

    fn source_components(&self) -> &[T] {
        &self.components
    }
}

/// How a new local vector gets its first value.
pub enum Initializer<'a, T: Component, const N: usize> {
    /// Left without a store.
    Undefined,
    /// One literal per component.
    Value([T; N]),
    /// The same literal in every component.
    Splat(T),
    /// The components of another vector followed by literals, e.g. a vec3
    /// from a vec2 and a scalar.
    Extend(&'a dyn VectorSource<T>, Vec<T>),
}

impl ModuleBuilder {
    /// Interns a scalar literal, rejecting NaN and infinities.
    pub(crate) fn scalar_constant<T: Component>(&mut self, value: T) -> Result<String, BuildError> {
        let literal = value.literal();
        if !literal.is_finite() {
            return Err(BuildError::NonFiniteLiteral {
                literal: format!("{:?}", value),
                ty: T::ty().to_string(),
            });
        }
        Ok(self.types.constant(&mut self.sections, &T::ty(), literal))
    }

    /// Interns the composite constant for a literal vector.
    pub(crate) fn vector_constant<T: Component, const N: usize>(
        &mut self,
        components: &[T; N],
    ) -> Result<String, BuildError> {
        let mut constituents = Vec::with_capacity(N);
        for component in components {
            constituents.push(self.scalar_constant(*component)?);
        }
        Ok(self.types.composite_constant(
            &mut self.sections,
            &<Vector<T, N> as ShaderType>::ty(),
            &constituents,
        ))
    }

    /// Declares a module-level variable of the given storage class.
    pub(crate) fn global_variable(&mut self, ty: &Type, storage: StorageClass) -> Id {
        let pointer = self
            .types
            .register(&mut self.sections, &Type::pointer(storage, ty.clone()));
        let id = self.ids.next_id();
        self.sections.append(
            SectionKind::TypeDeclarations,
            format!("{} = OpVariable {} {}", id, pointer.identifier, storage),
        );
        id
    }
}

impl FunctionBuilder<'_> {
    /// Declares a function-local variable, hoisted to the start of the body.
    pub(crate) fn local_variable(&mut self, ty: &Type) -> Result<Id, BuildError> {
        let pointer = self.module.types.register(
            &mut self.module.sections,
            &Type::pointer(StorageClass::Function, ty.clone()),
        );
        let id = self.module.ids.next_id();
        let block = self.module.current_block_mut()?;
        let owner = block.index();
        block.push_variable(format!("{} = OpVariable {} Function", id, pointer.identifier))?;
        self.module.locals.insert(id, owner);
        Ok(id)
    }

    /// Creates a local vector variable and initializes it.
    #[instrument(level = "debug", skip_all, fields(components = N))]
    pub fn create_local_variable<T: Component, const N: usize>(
        &mut self,
        initializer: Initializer<'_, T, N>,
    ) -> Result<Vector<T, N>, BuildError> {
        let ty = <Vector<T, N> as ShaderType>::ty();
        let id = self.local_variable(&ty)?;
        let mut value = Vector::<T, N>::from_storage(id);

        match initializer {
            Initializer::Undefined => {}
            Initializer::Value(components) => self.store_literal(&mut value, components)?,
            Initializer::Splat(component) => self.store_literal(&mut value, [component; N])?,
            Initializer::Extend(source, extra) => {
                let found = source.source_components().len() + extra.len();
                if found != N {
                    return Err(BuildError::ComponentCountMismatch { found, needs: N });
                }
                self.store_extended(&mut value, source, &extra)?;
            }
        }

        Ok(value)
    }

    /// Stores a literal into an existing vector.
    pub fn assign_literal<T: Component, const N: usize>(
        &mut self,
        target: &mut Vector<T, N>,
        components: [T; N],
    ) -> Result<(), BuildError> {
        self.store_literal(target, components)
    }

    /// `target = source`, as a memory copy between the two variables.
    pub fn assign<V: ShaderValue>(&mut self, target: &mut V, source: &V) -> Result<(), BuildError> {
        self.check_local(target.id())?;
        self.check_local(source.id())?;
        self.module
            .current_block_mut()?
            .push(format!("OpCopyMemory {} {}", target.id(), source.id()))?;
        target.mirror(source);
        Ok(())
    }

    fn store_literal<T: Component, const N: usize>(
        &mut self,
        target: &mut Vector<T, N>,
        components: [T; N],
    ) -> Result<(), BuildError> {
        self.check_local(target.id)?;
        let composite = self.module.vector_constant(&components)?;
        self.module
            .current_block_mut()?
            .push(format!("OpStore {} {}", target.id, composite))?;
        target.components = components;
        debug!("stored {} into {}", composite, target.id);
        Ok(())
    }

    /// Loads `source`, extracts its components and builds the target from
    /// them plus the extra literals.
    fn store_extended<T: Component, const N: usize>(
        &mut self,
        target: &mut Vector<T, N>,
        source: &dyn VectorSource<T>,
        extra: &[T],
    ) -> Result<(), BuildError> {
        self.check_local(target.id)?;
        self.check_local(source.storage())?;
        let source_ty = self
            .module
            .types
            .register(&mut self.module.sections, &source.source_type());
        let component_ty = self.module.types.register(&mut self.module.sections, &T::ty());
        let target_ty = self
            .module
            .types
            .register(&mut self.module.sections, &<Vector<T, N> as ShaderType>::ty());

        let mut constituents = Vec::with_capacity(N);
        for literal in extra {
            constituents.push(self.module.scalar_constant(*literal)?);
        }

        let loaded = self.module.ids.next_id();
        let mut lines = vec![format!(
            "{} = OpLoad {} {}",
            loaded,
            source_ty.identifier,
            source.storage()
        )];

        let mut extracted = Vec::new();
        for index in 0..source.source_components().len() {
            let id = self.module.ids.next_id();
            lines.push(format!(
                "{} = OpCompositeExtract {} {} {}",
                id, component_ty.identifier, loaded, index
            ));
            extracted.push(id.to_string());
        }
        extracted.extend(constituents);

        let constructed = self.module.ids.next_id();
        lines.push(format!(
            "{} = OpCompositeConstruct {} {}",
            constructed,
            target_ty.identifier,
            extracted.join(" ")
        ));
        lines.push(format!("OpStore {} {}", target.id, constructed));

        let block = self.module.current_block_mut()?;
        for line in lines {
            block.push(line)?;
        }

        for (slot, value) in target
            .components
            .iter_mut()
            .zip(source.source_components().iter().chain(extra))
        {
            *slot = *value;
        }
        Ok(())
    }
}
