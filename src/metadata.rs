//! The constant-pool / metadata lookup service the decoder consults to turn raw
//! token indices into resolved references.
//!
//! Full class-file parsing (the constant pool itself, attribute parsing, the
//! verifier) is out of scope for this crate; [`MetadataScope`] is the seam a
//! host application implements against its own class-file reader.

use thiserror::Error;

use crate::jvm::references::{ClassRef, FieldRef, MethodRef};
use crate::types::method_descriptor::MethodDescriptor;

/// A resolved `invokedynamic` call site: the name and descriptor the bootstrap
/// method binds the call to. Bootstrap-method arguments are not modeled.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
#[display("{name}{descriptor}")]
pub struct DynamicCallSiteRef {
    /// The invoked name.
    pub name: String,
    /// The descriptor of the invoked call.
    pub descriptor: MethodDescriptor,
}

/// A resolved constant-pool entry, as produced by [`MetadataScope::resolve_constant`].
#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum ConstantValue {
    /// An `int` literal.
    Integer(i32),
    /// A `float` literal.
    Float(f32),
    /// A `long` literal.
    Long(i64),
    /// A `double` literal.
    Double(f64),
    /// A `String` literal.
    String(String),
    /// A `Class` literal (`Foo.class`).
    Class(ClassRef),
    /// A `MethodType` constant.
    MethodType(MethodDescriptor),
    /// A resolved method handle. The referent is left opaque; downstream
    /// passes only need its identity, not its kind.
    #[display("<method handle>")]
    MethodHandle,
    /// A dynamically computed constant (`CONSTANT_Dynamic`).
    Dynamic(DynamicCallSiteRef),
}

/// A failure to resolve a metadata token.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// No entry exists at the given constant-pool index.
    #[error("no constant pool entry at index {0}")]
    MissingEntry(u16),
    /// The entry at the given index is not of the expected kind.
    #[error("constant pool entry at index {index} is not a {expected}")]
    WrongKind {
        /// The index that was looked up.
        index: u16,
        /// A human-readable description of what was expected.
        expected: &'static str,
    },
}

/// Resolves bytecode operand tokens (constant-pool indices) into concrete
/// references. Implementations must be safe to share across the parallel
/// method jobs described by the concurrency model.
pub trait MetadataScope: Sync {
    /// Resolves a `CONSTANT_Class` index into a [`ClassRef`].
    ///
    /// # Errors
    /// Returns [`MetadataError`] if the index does not name a class entry.
    fn resolve_class(&self, index: u16) -> Result<ClassRef, MetadataError>;

    /// Resolves a `CONSTANT_Fieldref` index into a [`FieldRef`].
    ///
    /// # Errors
    /// Returns [`MetadataError`] if the index does not name a field entry.
    fn resolve_field(&self, index: u16) -> Result<FieldRef, MetadataError>;

    /// Resolves a `CONSTANT_Methodref` or `CONSTANT_InterfaceMethodref` index
    /// into a [`MethodRef`].
    ///
    /// # Errors
    /// Returns [`MetadataError`] if the index does not name a method entry.
    fn resolve_method(&self, index: u16) -> Result<MethodRef, MetadataError>;

    /// Resolves a `CONSTANT_InvokeDynamic` index into a [`DynamicCallSiteRef`].
    ///
    /// # Errors
    /// Returns [`MetadataError`] if the index does not name a dynamic call site.
    fn resolve_dynamic_call_site(&self, index: u16) -> Result<DynamicCallSiteRef, MetadataError>;

    /// Resolves a loadable constant-pool index (for `ldc`/`ldc_w`/`ldc2_w`).
    ///
    /// # Errors
    /// Returns [`MetadataError`] if the index does not name a loadable constant.
    fn resolve_constant(&self, index: u16) -> Result<ConstantValue, MetadataError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// An in-memory [`MetadataScope`] backed by plain maps, used throughout
    /// the test suite in place of a real class-file constant pool.
    #[derive(Debug, Default)]
    pub(crate) struct FakeMetadataScope {
        pub(crate) classes: HashMap<u16, ClassRef>,
        pub(crate) fields: HashMap<u16, FieldRef>,
        pub(crate) methods: HashMap<u16, MethodRef>,
        pub(crate) call_sites: HashMap<u16, DynamicCallSiteRef>,
        pub(crate) constants: HashMap<u16, ConstantValue>,
    }

    impl MetadataScope for FakeMetadataScope {
        fn resolve_class(&self, index: u16) -> Result<ClassRef, MetadataError> {
            self.classes
                .get(&index)
                .cloned()
                .ok_or(MetadataError::MissingEntry(index))
        }

        fn resolve_field(&self, index: u16) -> Result<FieldRef, MetadataError> {
            self.fields
                .get(&index)
                .cloned()
                .ok_or(MetadataError::MissingEntry(index))
        }

        fn resolve_method(&self, index: u16) -> Result<MethodRef, MetadataError> {
            self.methods
                .get(&index)
                .cloned()
                .ok_or(MetadataError::MissingEntry(index))
        }

        fn resolve_dynamic_call_site(
            &self,
            index: u16,
        ) -> Result<DynamicCallSiteRef, MetadataError> {
            self.call_sites
                .get(&index)
                .cloned()
                .ok_or(MetadataError::MissingEntry(index))
        }

        fn resolve_constant(&self, index: u16) -> Result<ConstantValue, MetadataError> {
            self.constants
                .get(&index)
                .cloned()
                .ok_or(MetadataError::MissingEntry(index))
        }
    }
}
