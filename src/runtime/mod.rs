//! The runtime query service consumed by the IR builder.
//!
//! The builder never inspects class hierarchies, method tables or literal
//! pools itself. Everything it needs to know about the entities a bytecode
//! instruction references is asked through [`RuntimeInterface`]. Answers are
//! side-effect free from the builder's point of view and may be "unknown":
//! a method, field or class that cannot be resolved ahead of time is not an
//! error, the builder emits a runtime resolution slot for it instead.
//!
//! [`InMemoryRuntime`] is a table-driven implementation used by tests and
//! benchmarks, and by embedders that pre-compute the answers.

mod intrinsics;
mod memory;

use std::fmt;

pub use intrinsics::IntrinsicId;
pub use memory::InMemoryRuntime;

use crate::ir::DataType;

/// A raw entity index taken from a bytecode operand (method, field, class,
/// string or literal-array id).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntityId(pub u32);

impl EntityId {
    /// Returns the raw id value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({:#x})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(value: u32) -> Self {
        EntityId(value)
    }
}

/// Declared shape of a method, known from the bytecode file even when the
/// method itself cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    /// Declared parameter types, excluding the implicit receiver.
    pub params: Vec<DataType>,
    /// Declared return type ([`DataType::Void`] for no value).
    pub return_type: DataType,
    /// Static methods take no receiver.
    pub is_static: bool,
    /// Class declaring the method; the class `initobj` instantiates.
    pub class: EntityId,
}

impl MethodSignature {
    /// Creates a signature for a static method.
    #[must_use]
    pub fn new_static(params: &[DataType], return_type: DataType) -> Self {
        Self {
            params: params.to_vec(),
            return_type,
            is_static: true,
            class: EntityId::default(),
        }
    }

    /// Creates a signature for an instance method.
    #[must_use]
    pub fn new_instance(params: &[DataType], return_type: DataType) -> Self {
        Self {
            params: params.to_vec(),
            return_type,
            is_static: false,
            class: EntityId::default(),
        }
    }

    /// Sets the declaring class.
    #[must_use]
    pub fn with_class(mut self, class: EntityId) -> Self {
        self.class = class;
        self
    }

    /// Number of argument values a call passes, receiver included.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.params.len() + usize::from(!self.is_static)
    }
}

/// What the runtime knows about a method it could resolve ahead of time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMethod {
    /// Address of the method structure, baked into direct calls.
    pub ptr: u64,
    /// Declared on an interface; never devirtualized.
    pub is_interface: bool,
    /// Cannot be overridden (final method or final class).
    pub is_final: bool,
    /// Recognized standard-library intrinsic.
    pub intrinsic: Option<IntrinsicId>,
    /// Implemented natively.
    pub is_native: bool,
    /// For native methods: may raise an exception.
    pub native_can_throw: bool,
    /// Lives outside the current AOT compilation unit.
    pub is_external: bool,
}

/// Declared shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldInfo {
    /// Type of the stored value.
    pub ty: DataType,
    /// Class declaring the field.
    pub class: EntityId,
    /// Static fields live in the class, not in instances.
    pub is_static: bool,
    /// Volatile accesses are kept ordered.
    pub is_volatile: bool,
}

/// Element tag of a literal array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[repr(u8)]
pub enum LiteralTag {
    /// `u1` elements
    Bool = 1,
    /// `i32` elements
    Int32 = 2,
    /// `i64` elements
    Int64 = 3,
    /// `f32` elements
    Float32 = 4,
    /// `f64` elements
    Float64 = 5,
    /// String ids
    String = 6,
}

impl LiteralTag {
    /// Element type of the array this tag describes.
    #[must_use]
    pub const fn element_type(self) -> DataType {
        match self {
            LiteralTag::Bool => DataType::Bool,
            LiteralTag::Int32 => DataType::Int32,
            LiteralTag::Int64 => DataType::Int64,
            LiteralTag::Float32 => DataType::Float32,
            LiteralTag::Float64 => DataType::Float64,
            LiteralTag::String => DataType::Reference,
        }
    }
}

impl TryFrom<u8> for LiteralTag {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Ok(match raw {
            1 => LiteralTag::Bool,
            2 => LiteralTag::Int32,
            3 => LiteralTag::Int64,
            4 => LiteralTag::Float32,
            5 => LiteralTag::Float64,
            6 => LiteralTag::String,
            other => return Err(other),
        })
    }
}

/// One element of a literal array.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralValue {
    /// Integer element (bool, i32, i64)
    Int(i64),
    /// Floating-point element
    Float(f64),
    /// String element, by string id
    String(EntityId),
}

/// Contents of a constant array as stored in the bytecode file.
///
/// The tag is kept raw because a corrupt file can carry any byte there.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralArray {
    /// Raw element tag, see [`LiteralTag`].
    pub tag: u8,
    /// Array class the literal instantiates.
    pub class: EntityId,
    /// The elements in order.
    pub values: Vec<LiteralValue>,
}

/// Black-box queries the builder issues while translating a method.
///
/// Implementations must be shareable between threads: independent methods
/// may be built in parallel against the same runtime.
pub trait RuntimeInterface: Send + Sync {
    /// Returns the declared signature of `method`, or `None` if the id is not a
    /// method reference at all.
    fn method_signature(&self, method: EntityId) -> Option<MethodSignature>;

    /// Resolves `method` ahead of time. `None` means "resolve at runtime".
    fn resolve_method(&self, method: EntityId) -> Option<ResolvedMethod>;

    /// Returns the declared shape of `field`, or `None` for a bad id.
    fn field_info(&self, field: EntityId) -> Option<FieldInfo>;

    /// Resolves `field` to its offset or address. `None` means "resolve at runtime".
    fn resolve_field(&self, field: EntityId) -> Option<u64>;

    /// Resolves `class` to its class pointer. `None` means "resolve at runtime".
    fn resolve_class(&self, class: EntityId) -> Option<u64>;

    /// Returns the literal array stored under `id`.
    fn literal_array(&self, id: EntityId) -> Option<LiteralArray>;
}
