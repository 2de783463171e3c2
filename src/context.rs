//! Per-analysis context threaded explicitly through every pass. There is no
//! global or thread-local state anywhere in this crate.

use crate::access_flags::MethodAccessFlags;
use crate::jvm::references::{ClassRef, MethodRef};

/// Tunables that change how the rewriter and AST assembler shape their output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompilerSettings {
    /// Whether the local variable splitter runs in optimized mode (one
    /// variable per definition, merged only where reaching-definition sets
    /// force it) rather than unoptimized mode (one variable per declared
    /// slot).
    pub optimize: bool,
    /// Whether every `catch` block gets an explicit exception variable, even
    /// when its body never reads the caught value.
    pub always_generate_exception_variable_for_catch_blocks: bool,
}

impl Default for DecompilerSettings {
    fn default() -> Self {
        Self {
            optimize: true,
            always_generate_exception_variable_for_catch_blocks: false,
        }
    }
}

/// The declaring type and method of the body currently being analyzed, plus
/// the active [`DecompilerSettings`].
#[derive(Debug, Clone)]
pub struct DecompilerContext {
    /// The class declaring the method being analyzed.
    pub declaring_class: ClassRef,
    /// The method being analyzed.
    pub method: MethodRef,
    /// The method's access flags.
    pub method_flags: MethodAccessFlags,
    /// The active settings.
    pub settings: DecompilerSettings,
}

impl DecompilerContext {
    /// Creates a context for analyzing `method`, declared on `declaring_class`.
    #[must_use]
    pub fn new(
        declaring_class: ClassRef,
        method: MethodRef,
        method_flags: MethodAccessFlags,
        settings: DecompilerSettings,
    ) -> Self {
        Self {
            declaring_class,
            method,
            method_flags,
            settings,
        }
    }

    /// Whether the method being analyzed is an instance constructor.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.method.is_constructor()
    }

    /// Whether the method has an implicit `this` receiver in local slot 0.
    #[must_use]
    pub fn has_receiver(&self) -> bool {
        self.method_flags.has_receiver()
    }
}
