//! Access flag bitsets for methods, as carried by [`MethodRef`](crate::jvm::references::MethodRef)
//! metadata and consulted by the stack analyzer's entry-state construction.

use bitflags::bitflags;

bitflags! {
    /// The access flags of a method, as declared in its owning class file.
    #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
    pub struct MethodAccessFlags: u16 {
        /// Declared `public`.
        const PUBLIC = 0x0001;
        /// Declared `private`.
        const PRIVATE = 0x0002;
        /// Declared `protected`.
        const PROTECTED = 0x0004;
        /// Declared `static`. A static method has no `this` slot.
        const STATIC = 0x0008;
        /// Declared `final`.
        const FINAL = 0x0010;
        /// Declared `synchronized`.
        const SYNCHRONIZED = 0x0020;
        /// A bridge method, generated by the compiler.
        const BRIDGE = 0x0040;
        /// Declared with variable arity.
        const VARARGS = 0x0080;
        /// Declared `native`.
        const NATIVE = 0x0100;
        /// Declared `abstract`.
        const ABSTRACT = 0x0400;
        /// Declared `strictfp`.
        const STRICT = 0x0800;
        /// Declared synthetic; not present in the source code.
        const SYNTHETIC = 0x1000;
    }
}

impl MethodAccessFlags {
    /// Whether the method has an implicit `this` receiver.
    #[must_use]
    pub const fn has_receiver(self) -> bool {
        !self.contains(Self::STATIC)
    }
}
