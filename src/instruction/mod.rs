//! The decoded instruction stream: [`Instruction`] nodes with fully resolved
//! branch targets, plus the decoder and fixup machinery that produces them.

pub mod decoder;
pub mod fixup;

use std::fmt::Display;

use crate::jvm::code::ProgramCounter;
use crate::jvm::references::{FieldRef, MethodRef};
use crate::metadata::{ConstantValue, DynamicCallSiteRef};
use crate::types::field_type::PrimitiveType;

/// A `tableswitch` or `lookupswitch` jump table, resolved to concrete offsets.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchInfo {
    /// The offset to jump to when no match applies.
    pub default: ProgramCounter,
    /// `(match key, target)` pairs. For `tableswitch` the keys are the
    /// contiguous range `low..=high`; for `lookupswitch` they are the
    /// explicit sparse keys, kept sorted as the class file stores them.
    pub branches: Vec<(i32, ProgramCounter)>,
}

/// A single JVM bytecode instruction with all operands resolved.
///
/// Variants are grouped by operand shape to mirror the decoder's dispatch on
/// declared operand kind; identity (which one's the "same instruction" for
/// data-flow purposes) is the owning [`ProgramCounter`] key in the
/// instruction list, not the variant itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Does nothing.
    Nop,

    // -- constants --
    /// Pushes the `null` reference.
    AConstNull,
    /// Pushes an `int` constant in `-1..=5`.
    IConst(i32),
    /// Pushes a `long` constant, `0` or `1`.
    LConst(i64),
    /// Pushes a `float` constant, `0.0`, `1.0`, or `2.0`.
    FConst(f32),
    /// Pushes a `double` constant, `0.0` or `1.0`.
    DConst(f64),
    /// Pushes a sign-extended byte immediate (`bipush`).
    BiPush(i8),
    /// Pushes a sign-extended short immediate (`sipush`).
    SiPush(i16),
    /// Pushes a resolved constant-pool entry (`ldc`/`ldc_w`/`ldc2_w`).
    Ldc(ConstantValue),

    // -- loads / stores --
    /// Loads an `int`/`float`/reference/`boolean`/`byte`/`char`/`short` local.
    Load(VarLoadType, u16),
    /// Stores into an `int`/`float`/reference/`boolean`/`byte`/`char`/`short` local.
    Store(VarLoadType, u16),
    /// Increments a local `int` variable in place by a signed immediate.
    IInc(u16, i16),

    // -- array loads / stores --
    /// Loads a value out of an array.
    ArrayLoad(ArrayElementType),
    /// Stores a value into an array.
    ArrayStore(ArrayElementType),
    /// Pushes the length of an array reference.
    ArrayLength,
    /// Creates a new array of a primitive element type.
    NewArray(PrimitiveType),
    /// Creates a new array of a reference element type.
    ANewArray(crate::jvm::references::ClassRef),
    /// Creates a new multi-dimensional array.
    MultiANewArray(crate::jvm::references::ClassRef, u8),

    // -- stack --
    /// Discards the top operand-stack slot.
    Pop,
    /// Discards the top two operand-stack slots (or one wide slot).
    Pop2,
    /// Duplicates the top operand-stack slot.
    Dup,
    /// Duplicates the top slot and inserts it two slots down.
    DupX1,
    /// Duplicates the top slot and inserts it three slots down.
    DupX2,
    /// Duplicates the top two slots.
    Dup2,
    /// Duplicates the top two slots and inserts them three slots down.
    Dup2X1,
    /// Duplicates the top two slots and inserts them four slots down.
    Dup2X2,
    /// Swaps the top two operand-stack slots.
    Swap,

    // -- arithmetic / logic / conversion --
    /// A binary or unary arithmetic/logic/conversion operation.
    Arithmetic(ArithmeticOp),
    /// Three-way `long`/`float`/`double` comparison.
    Compare(CompareOp),

    // -- control transfer --
    /// Unconditional jump.
    Goto(ProgramCounter),
    /// Conditional jump testing `int` or reference values.
    If(Condition, IfOperands, ProgramCounter),
    /// Enters a subroutine (deprecated JVM feature, rarely emitted post-Java 6).
    Jsr(ProgramCounter),
    /// Returns from a subroutine entered via [`Instruction::Jsr`].
    Ret(u16),
    /// A `tableswitch` or `lookupswitch`.
    Switch(SwitchInfo),

    // -- returns --
    /// Returns a value of the given type from the method.
    Return(Option<ReturnValueType>),

    // -- objects --
    /// Allocates an uninitialized instance of a class.
    New(crate::jvm::references::ClassRef),
    /// Throws the top-of-stack reference.
    AThrow,
    /// Checks and narrows a reference's type, throwing `ClassCastException` on mismatch.
    CheckCast(crate::jvm::references::ClassRef),
    /// Tests whether a reference is an instance of a type.
    InstanceOf(crate::jvm::references::ClassRef),
    /// Acquires an object's monitor.
    MonitorEnter,
    /// Releases an object's monitor.
    MonitorExit,

    // -- fields --
    /// Reads a static field.
    GetStatic(FieldRef),
    /// Writes a static field.
    PutStatic(FieldRef),
    /// Reads an instance field.
    GetField(FieldRef),
    /// Writes an instance field.
    PutField(FieldRef),

    // -- invocations --
    /// `invokevirtual`.
    InvokeVirtual(MethodRef),
    /// `invokespecial`.
    InvokeSpecial(MethodRef),
    /// `invokestatic`.
    InvokeStatic(MethodRef),
    /// `invokeinterface`.
    InvokeInterface(MethodRef, u8),
    /// `invokedynamic`.
    InvokeDynamic(DynamicCallSiteRef),

    /// A forward branch target past the end of the code array, or an
    /// explicit no-op inserted to anchor a synthesized handler end. See
    /// the decoder's dangling-branch recovery and the exception table
    /// normalizer's trailing-handler synthesis.
    SyntheticNop,
}

/// The operand type for a `load`/`store` local-variable access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarLoadType {
    /// `int`, `boolean`, `byte`, `char`, or `short`.
    Int,
    /// `long`.
    Long,
    /// `float`.
    Float,
    /// `double`.
    Double,
    /// A reference type.
    Reference,
}

/// The element type for an array load/store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayElementType {
    /// `int[]`.
    Int,
    /// `long[]`.
    Long,
    /// `float[]`.
    Float,
    /// `double[]`.
    Double,
    /// A reference array.
    Reference,
    /// `boolean[]` or `byte[]`.
    Byte,
    /// `char[]`.
    Char,
    /// `short[]`.
    Short,
}

/// The type of value a `return` instruction carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnValueType {
    /// `int`, `boolean`, `byte`, `char`, or `short`.
    Int,
    /// `long`.
    Long,
    /// `float`.
    Float,
    /// `double`.
    Double,
    /// A reference type.
    Reference,
}

/// A binary or unary arithmetic/logic/conversion operator, tagged with its operand type(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    /// `iadd`/`ladd`/`fadd`/`dadd`.
    Add(NumericType),
    /// `isub`/`lsub`/`fsub`/`dsub`.
    Sub(NumericType),
    /// `imul`/`lmul`/`fmul`/`dmul`.
    Mul(NumericType),
    /// `idiv`/`ldiv`/`fdiv`/`ddiv`.
    Div(NumericType),
    /// `irem`/`lrem`/`frem`/`drem`.
    Rem(NumericType),
    /// `ineg`/`lneg`/`fneg`/`dneg`.
    Neg(NumericType),
    /// `ishl`/`lshl`.
    Shl(IntegralType),
    /// `ishr`/`lshr`.
    Shr(IntegralType),
    /// `iushr`/`lushr`.
    UShr(IntegralType),
    /// `iand`/`land`.
    And(IntegralType),
    /// `ior`/`lor`.
    Or(IntegralType),
    /// `ixor`/`lxor`.
    Xor(IntegralType),
    /// Numeric conversion between two primitive types.
    Convert(NumericType, NumericType),
}

/// `int` or `long`, for shift/bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegralType {
    /// `int`.
    Int,
    /// `long`.
    Long,
}

/// Any of the four JVM numeric primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericType {
    /// `int`.
    Int,
    /// `long`.
    Long,
    /// `float`.
    Float,
    /// `double`.
    Double,
}

/// The operator of a three-way numeric comparison (`lcmp`/`fcmpl`/`fcmpg`/`dcmpl`/`dcmpg`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `lcmp`.
    Long,
    /// `fcmpl` (NaN compares as less).
    FloatL,
    /// `fcmpg` (NaN compares as greater).
    FloatG,
    /// `dcmpl` (NaN compares as less).
    DoubleL,
    /// `dcmpg` (NaN compares as greater).
    DoubleG,
}

/// How many operands, and of what kind, a conditional jump compares. The
/// JVM's `if*` family collapses the same relational operator over three
/// different operand shapes; this preserves which one so the stack analyzer
/// knows the true pop count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfOperands {
    /// `ifeq`/`ifne`/etc.: compares a single `int` to zero.
    IntVsZero,
    /// `if_icmp*`: compares two `int`s.
    IntVsInt,
    /// `if_acmpeq`/`if_acmpne`: compares two references.
    RefVsRef,
    /// `ifnull`/`ifnonnull`: compares a single reference to `null`.
    RefVsNull,
}

/// A conditional-jump predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Condition {
    /// `ifeq`/`if_icmpeq`/`if_acmpeq`.
    #[display("==")]
    Eq,
    /// `ifne`/`if_icmpne`/`if_acmpne`.
    #[display("!=")]
    Ne,
    /// `iflt`/`if_icmplt`.
    #[display("<")]
    Lt,
    /// `ifge`/`if_icmpge`.
    #[display(">=")]
    Ge,
    /// `ifgt`/`if_icmpgt`.
    #[display(">")]
    Gt,
    /// `ifle`/`if_icmple`.
    #[display("<=")]
    Le,
    /// `ifnull`.
    #[display("== null")]
    IsNull,
    /// `ifnonnull`.
    #[display("!= null")]
    IsNotNull,
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
