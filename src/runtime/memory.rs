use std::collections::HashMap;

use crate::runtime::{
    EntityId, FieldInfo, LiteralArray, MethodSignature, ResolvedMethod, RuntimeInterface,
};

/// A [`RuntimeInterface`] answering from pre-populated tables.
///
/// Entities that were registered without a resolution answer (or not at all)
/// are reported as unresolved, which is exactly how the builder should treat
/// a runtime that has not loaded them yet.
///
/// # Examples
///
/// ```rust
/// use arkir::ir::DataType;
/// use arkir::runtime::{EntityId, InMemoryRuntime, MethodSignature, ResolvedMethod, RuntimeInterface};
///
/// let runtime = InMemoryRuntime::new()
///     .with_method(EntityId(1), MethodSignature::new_static(&[DataType::Int32], DataType::Int32))
///     .with_resolved_method(
///         EntityId(2),
///         MethodSignature::new_static(&[], DataType::Void),
///         ResolvedMethod { ptr: 0x1000, ..Default::default() },
///     );
///
/// assert!(runtime.resolve_method(EntityId(1)).is_none());
/// assert_eq!(runtime.resolve_method(EntityId(2)).map(|m| m.ptr), Some(0x1000));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryRuntime {
    methods: HashMap<EntityId, (MethodSignature, Option<ResolvedMethod>)>,
    fields: HashMap<EntityId, (FieldInfo, Option<u64>)>,
    classes: HashMap<EntityId, u64>,
    literals: HashMap<EntityId, LiteralArray>,
}

impl InMemoryRuntime {
    /// Creates an empty runtime that resolves nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a method that must be resolved at runtime.
    #[must_use]
    pub fn with_method(mut self, id: EntityId, signature: MethodSignature) -> Self {
        self.methods.insert(id, (signature, None));
        self
    }

    /// Registers a method resolvable ahead of time.
    #[must_use]
    pub fn with_resolved_method(
        mut self,
        id: EntityId,
        signature: MethodSignature,
        resolved: ResolvedMethod,
    ) -> Self {
        self.methods.insert(id, (signature, Some(resolved)));
        self
    }

    /// Registers a field; `offset` of `None` leaves it unresolved.
    #[must_use]
    pub fn with_field(mut self, id: EntityId, info: FieldInfo, offset: Option<u64>) -> Self {
        self.fields.insert(id, (info, offset));
        self
    }

    /// Registers a class resolvable ahead of time.
    #[must_use]
    pub fn with_class(mut self, id: EntityId, ptr: u64) -> Self {
        self.classes.insert(id, ptr);
        self
    }

    /// Registers a literal array.
    #[must_use]
    pub fn with_literal_array(mut self, id: EntityId, array: LiteralArray) -> Self {
        self.literals.insert(id, array);
        self
    }
}

impl RuntimeInterface for InMemoryRuntime {
    fn method_signature(&self, method: EntityId) -> Option<MethodSignature> {
        self.methods.get(&method).map(|(sig, _)| sig.clone())
    }

    fn resolve_method(&self, method: EntityId) -> Option<ResolvedMethod> {
        self.methods
            .get(&method)
            .and_then(|(_, resolved)| resolved.clone())
    }

    fn field_info(&self, field: EntityId) -> Option<FieldInfo> {
        self.fields.get(&field).map(|(info, _)| *info)
    }

    fn resolve_field(&self, field: EntityId) -> Option<u64> {
        self.fields.get(&field).and_then(|(_, offset)| *offset)
    }

    fn resolve_class(&self, class: EntityId) -> Option<u64> {
        self.classes.get(&class).copied()
    }

    fn literal_array(&self, id: EntityId) -> Option<LiteralArray> {
        self.literals.get(&id).cloned()
    }
}
