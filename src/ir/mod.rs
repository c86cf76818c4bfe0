use std::fmt;

use serde::{Deserialize, Serialize};

pub mod sections;
pub mod types;

pub use sections::{InstructionSection, SectionKind, SectionStore};
pub use types::{TypeDescriptor, TypeRegistry};

/// A result id in the module, rendered as `%<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl Id {
    #[cfg(test)]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Hands out module-unique result ids.
///
/// Ids start at 1 since 0 is not a valid SPIR-V id, and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdGenerator {
    current_id: u32,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    pub const fn new() -> Self {
        Self { current_id: 0 }
    }

    pub fn next_id(&mut self) -> Id {
        self.current_id += 1;
        Id(self.current_id)
    }

    /// One past the highest id handed out so far, as written in the module header.
    pub const fn bound(&self) -> u32 {
        self.current_id + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IntTy {
    I8,
    I16,
    I32,
    I64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UintTy {
    U8,
    U16,
    U32,
    U64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FloatTy {
    F32,
    F64,
}

/// Where a pointer points to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorageClass {
    Input,
    Output,
    Uniform,
    Private,
    Function,
}

impl StorageClass {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageClass::Input => "Input",
            StorageClass::Output => "Output",
            StorageClass::Uniform => "Uniform",
            StorageClass::Private => "Private",
            StorageClass::Function => "Function",
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            StorageClass::Input => "input",
            StorageClass::Output => "output",
            StorageClass::Uniform => "uniform",
            StorageClass::Private => "private",
            StorageClass::Function => "function",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A struct type, identified by its name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StructTy {
    pub name: String,
    pub members: Vec<Type>,
}

/// A value type known to the module, cheaply comparable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Void,
    Bool,
    Int(IntTy),
    Uint(UintTy),
    Float(FloatTy),
    /// A vector of 2 to 4 scalar components.
    Vector(Box<Type>, u32),
    Pointer(StorageClass, Box<Type>),
    /// A function type: the return type, then the parameter types.
    Function(Box<Type>, Vec<Type>),
    Struct(StructTy),
}

impl Type {
    pub fn vector(component: Type, count: u32) -> Self {
        Type::Vector(Box::new(component), count)
    }

    pub fn pointer(storage: StorageClass, pointee: Type) -> Self {
        Type::Pointer(storage, Box::new(pointee))
    }

    pub fn function(ret: Type, parameters: Vec<Type>) -> Self {
        Type::Function(Box::new(ret), parameters)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::Int(_) | Type::Uint(_) | Type::Float(_)
        )
    }

    /// The bare name used for the type's symbolic identifier, without the `%`.
    pub fn raw_identifier(&self) -> String {
        match self {
            Type::Void => "void".to_string(),
            Type::Bool => "bool".to_string(),
            Type::Int(ty) => match ty {
                IntTy::I8 => "int8",
                IntTy::I16 => "int16",
                IntTy::I32 => "int32",
                IntTy::I64 => "int64",
            }
            .to_string(),
            Type::Uint(ty) => match ty {
                UintTy::U8 => "uint8",
                UintTy::U16 => "uint16",
                UintTy::U32 => "uint32",
                UintTy::U64 => "uint64",
            }
            .to_string(),
            Type::Float(ty) => match ty {
                FloatTy::F32 => "float",
                FloatTy::F64 => "double",
            }
            .to_string(),
            Type::Vector(component, count) => {
                format!("vec{}_{}", count, component.raw_identifier())
            }
            Type::Pointer(storage, pointee) => {
                format!("ptr_{}_{}", storage.prefix(), pointee.raw_identifier())
            }
            Type::Function(ret, parameters) => {
                let mut name = format!("fn_{}", ret.raw_identifier());
                for parameter in parameters {
                    name.push('_');
                    name.push_str(&parameter.raw_identifier());
                }
                name
            }
            Type::Struct(body) => format!("type_{}", body.name),
        }
    }

    /// The symbolic identifier other instructions use to reference this type.
    pub fn identifier(&self) -> String {
        format!("%{}", self.raw_identifier())
    }

    /// The right hand side of the declaring instruction.
    pub fn declaration(&self) -> String {
        match self {
            Type::Void => "OpTypeVoid".to_string(),
            Type::Bool => "OpTypeBool".to_string(),
            Type::Int(_) => format!("OpTypeInt {} 1", self.bit_width()),
            Type::Uint(_) => format!("OpTypeInt {} 0", self.bit_width()),
            Type::Float(_) => format!("OpTypeFloat {}", self.bit_width()),
            Type::Vector(component, count) => {
                format!("OpTypeVector {} {}", component.identifier(), count)
            }
            Type::Pointer(storage, pointee) => {
                format!("OpTypePointer {} {}", storage, pointee.identifier())
            }
            Type::Function(ret, parameters) => {
                let mut decl = format!("OpTypeFunction {}", ret.identifier());
                for parameter in parameters {
                    decl.push(' ');
                    decl.push_str(&parameter.identifier());
                }
                decl
            }
            Type::Struct(body) => {
                let mut decl = "OpTypeStruct".to_string();
                for member in &body.members {
                    decl.push(' ');
                    decl.push_str(&member.identifier());
                }
                decl
            }
        }
    }

    /// Types this one references, which have to be declared before it.
    pub fn dependencies(&self) -> Vec<&Type> {
        match self {
            Type::Vector(component, _) => vec![component],
            Type::Pointer(_, pointee) => vec![pointee],
            Type::Function(ret, parameters) => {
                std::iter::once(ret.as_ref()).chain(parameters).collect()
            }
            Type::Struct(body) => body.members.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Bit width of scalar types, 0 for everything else.
    pub fn bit_width(&self) -> u32 {
        match self {
            Type::Bool => 8,
            Type::Int(ty) => match ty {
                IntTy::I8 => 8,
                IntTy::I16 => 16,
                IntTy::I32 => 32,
                IntTy::I64 => 64,
            },
            Type::Uint(ty) => match ty {
                UintTy::U8 => 8,
                UintTy::U16 => 16,
                UintTy::U32 => 32,
                UintTy::U64 => 64,
            },
            Type::Float(ty) => match ty {
                FloatTy::F32 => 32,
                FloatTy::F64 => 64,
            },
            _ => 0,
        }
    }

    /// Size in bytes as laid out in host memory, without any padding.
    pub fn size(&self) -> u64 {
        match self {
            Type::Void | Type::Pointer(_, _) | Type::Function(_, _) => 0,
            Type::Bool | Type::Int(_) | Type::Uint(_) | Type::Float(_) => {
                u64::from(self.bit_width() / 8)
            }
            Type::Vector(component, count) => component.size() * u64::from(*count),
            Type::Struct(body) => body.members.iter().map(Type::size).sum(),
        }
    }

    /// Base alignment in bytes under std140 rules.
    pub fn std140_alignment(&self) -> u64 {
        match self {
            Type::Vector(component, 2) => component.size() * 2,
            Type::Vector(component, _) => component.size() * 4,
            Type::Struct(body) => body
                .members
                .iter()
                .map(Type::std140_alignment)
                .max()
                .unwrap_or(16)
                .next_multiple_of(16),
            other => other.size().max(1),
        }
    }

    /// Whether a boolean appears anywhere in the type.
    pub fn contains_bool(&self) -> bool {
        match self {
            Type::Bool => true,
            Type::Vector(component, _) => component.contains_bool(),
            Type::Struct(body) => body.members.iter().any(Type::contains_bool),
            _ => false,
        }
    }

    /// The capability a module needs to declare this type, if any.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Type::Int(IntTy::I8) | Type::Uint(UintTy::U8) => Some(Capability::Int8),
            Type::Int(IntTy::I16) | Type::Uint(UintTy::U16) => Some(Capability::Int16),
            Type::Int(IntTy::I64) | Type::Uint(UintTy::U64) => Some(Capability::Int64),
            Type::Float(FloatTy::F64) => Some(Capability::Float64),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw_identifier())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    Matrix,
    Shader,
    Geometry,
    Tessellation,
    Float64,
    Int64,
    Int16,
    Int8,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
