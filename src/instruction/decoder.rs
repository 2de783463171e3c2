//! Decodes a raw bytecode buffer into an [`InstructionList`](crate::jvm::code::InstructionList).

use thiserror::Error;

use super::fixup::{FixupTable, Labels};
use super::{
    ArithmeticOp, ArrayElementType, CompareOp, Condition, IfOperands, IntegralType, Instruction,
    NumericType, ReturnValueType, SwitchInfo, VarLoadType,
};
use crate::jvm::code::{InstructionList, InvalidOffset, MethodBody, ProgramCounter};
use crate::metadata::{MetadataError, MetadataScope};
use crate::types::field_type::PrimitiveType;

/// A fatal failure to decode an instruction stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The buffer ended in the middle of an instruction.
    #[error("unexpected end of code at offset {0}")]
    UnexpectedEnd(ProgramCounter),
    /// A byte did not correspond to any known opcode.
    #[error("unrecognized opcode {0:#04x} at offset {1}")]
    UnrecognizedOpcode(u8, ProgramCounter),
    /// A branch offset under/overflowed [`ProgramCounter`]'s range.
    #[error(transparent)]
    InvalidOffset(#[from] InvalidOffset),
    /// A metadata (constant pool) lookup failed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// The decoded instruction stream plus the label assignment for its branch targets.
#[derive(Debug, Clone)]
pub struct DecodedBody {
    /// The instructions, keyed by offset.
    pub instructions: InstructionList<Instruction>,
    /// The branch targets that were labeled during decoding.
    pub labels: Labels,
}

/// Decodes `body.code` into a labeled instruction list, resolving constant,
/// type, field, method, and dynamic-call-site operands through `metadata`.
///
/// # Errors
/// Returns [`DecodeError`] on an unrecognized opcode, a malformed branch
/// offset, or a metadata resolution failure.
pub fn decode(
    body: &MethodBody,
    metadata: &dyn MetadataScope,
) -> Result<DecodedBody, DecodeError> {
    let mut cursor = Cursor::new(&body.code);
    let mut fixups = FixupTable::new();
    let mut instructions = InstructionList::default();
    let code_len = body.code.len();

    while !cursor.is_at_end() {
        let start = cursor.pc();
        let opcode = cursor.read_u8()?;
        let instruction = decode_one(opcode, &mut cursor, start, metadata, &mut fixups, code_len)?;
        fixups.emit(start);
        instructions.insert(start, instruction);
    }

    for dangling in fixups.dangling().collect::<Vec<_>>() {
        instructions.insert(dangling, Instruction::SyntheticNop);
        fixups.emit(dangling);
    }

    Ok(DecodedBody {
        instructions,
        labels: fixups.into_labels(),
    })
}

#[allow(clippy::too_many_lines)]
fn decode_one(
    opcode: u8,
    cursor: &mut Cursor<'_>,
    start: ProgramCounter,
    metadata: &dyn MetadataScope,
    fixups: &mut FixupTable,
    code_len: usize,
) -> Result<Instruction, DecodeError> {
    use Instruction as I;
    let branch16 = |cursor: &mut Cursor<'_>, fixups: &mut FixupTable| -> Result<ProgramCounter, DecodeError> {
        let delta = cursor.read_i16()?;
        resolve_branch(start, i32::from(delta), code_len, fixups)
    };
    let branch32 = |cursor: &mut Cursor<'_>, fixups: &mut FixupTable| -> Result<ProgramCounter, DecodeError> {
        let delta = cursor.read_i32()?;
        resolve_branch(start, delta, code_len, fixups)
    };

    Ok(match opcode {
        0x00 => I::Nop,
        0x01 => I::AConstNull,
        0x02..=0x08 => I::IConst(i32::from(opcode) - 3),
        0x09..=0x0a => I::LConst(i64::from(opcode - 0x09)),
        0x0b..=0x0d => I::FConst((opcode - 0x0b) as f32),
        0x0e..=0x0f => I::DConst(f64::from(opcode - 0x0e)),
        0x10 => I::BiPush(cursor.read_i8()?),
        0x11 => I::SiPush(cursor.read_i16()?),
        0x12 => I::Ldc(metadata.resolve_constant(u16::from(cursor.read_u8()?))?),
        0x13 | 0x14 => I::Ldc(metadata.resolve_constant(cursor.read_u16()?)?),

        0x15 => I::Load(VarLoadType::Int, u16::from(cursor.read_u8()?)),
        0x16 => I::Load(VarLoadType::Long, u16::from(cursor.read_u8()?)),
        0x17 => I::Load(VarLoadType::Float, u16::from(cursor.read_u8()?)),
        0x18 => I::Load(VarLoadType::Double, u16::from(cursor.read_u8()?)),
        0x19 => I::Load(VarLoadType::Reference, u16::from(cursor.read_u8()?)),
        0x1a..=0x1d => I::Load(VarLoadType::Int, u16::from(opcode - 0x1a)),
        0x1e..=0x21 => I::Load(VarLoadType::Long, u16::from(opcode - 0x1e)),
        0x22..=0x25 => I::Load(VarLoadType::Float, u16::from(opcode - 0x22)),
        0x26..=0x29 => I::Load(VarLoadType::Double, u16::from(opcode - 0x26)),
        0x2a..=0x2d => I::Load(VarLoadType::Reference, u16::from(opcode - 0x2a)),

        0x2e => I::ArrayLoad(ArrayElementType::Int),
        0x2f => I::ArrayLoad(ArrayElementType::Long),
        0x30 => I::ArrayLoad(ArrayElementType::Float),
        0x31 => I::ArrayLoad(ArrayElementType::Double),
        0x32 => I::ArrayLoad(ArrayElementType::Reference),
        0x33 => I::ArrayLoad(ArrayElementType::Byte),
        0x34 => I::ArrayLoad(ArrayElementType::Char),
        0x35 => I::ArrayLoad(ArrayElementType::Short),

        0x36 => I::Store(VarLoadType::Int, u16::from(cursor.read_u8()?)),
        0x37 => I::Store(VarLoadType::Long, u16::from(cursor.read_u8()?)),
        0x38 => I::Store(VarLoadType::Float, u16::from(cursor.read_u8()?)),
        0x39 => I::Store(VarLoadType::Double, u16::from(cursor.read_u8()?)),
        0x3a => I::Store(VarLoadType::Reference, u16::from(cursor.read_u8()?)),
        0x3b..=0x3e => I::Store(VarLoadType::Int, u16::from(opcode - 0x3b)),
        0x3f..=0x42 => I::Store(VarLoadType::Long, u16::from(opcode - 0x3f)),
        0x43..=0x46 => I::Store(VarLoadType::Float, u16::from(opcode - 0x43)),
        0x47..=0x4a => I::Store(VarLoadType::Double, u16::from(opcode - 0x47)),
        0x4b..=0x4e => I::Store(VarLoadType::Reference, u16::from(opcode - 0x4b)),

        0x4f => I::ArrayStore(ArrayElementType::Int),
        0x50 => I::ArrayStore(ArrayElementType::Long),
        0x51 => I::ArrayStore(ArrayElementType::Float),
        0x52 => I::ArrayStore(ArrayElementType::Double),
        0x53 => I::ArrayStore(ArrayElementType::Reference),
        0x54 => I::ArrayStore(ArrayElementType::Byte),
        0x55 => I::ArrayStore(ArrayElementType::Char),
        0x56 => I::ArrayStore(ArrayElementType::Short),

        0x57 => I::Pop,
        0x58 => I::Pop2,
        0x59 => I::Dup,
        0x5a => I::DupX1,
        0x5b => I::DupX2,
        0x5c => I::Dup2,
        0x5d => I::Dup2X1,
        0x5e => I::Dup2X2,
        0x5f => I::Swap,

        0x60 => I::Arithmetic(ArithmeticOp::Add(NumericType::Int)),
        0x61 => I::Arithmetic(ArithmeticOp::Add(NumericType::Long)),
        0x62 => I::Arithmetic(ArithmeticOp::Add(NumericType::Float)),
        0x63 => I::Arithmetic(ArithmeticOp::Add(NumericType::Double)),
        0x64 => I::Arithmetic(ArithmeticOp::Sub(NumericType::Int)),
        0x65 => I::Arithmetic(ArithmeticOp::Sub(NumericType::Long)),
        0x66 => I::Arithmetic(ArithmeticOp::Sub(NumericType::Float)),
        0x67 => I::Arithmetic(ArithmeticOp::Sub(NumericType::Double)),
        0x68 => I::Arithmetic(ArithmeticOp::Mul(NumericType::Int)),
        0x69 => I::Arithmetic(ArithmeticOp::Mul(NumericType::Long)),
        0x6a => I::Arithmetic(ArithmeticOp::Mul(NumericType::Float)),
        0x6b => I::Arithmetic(ArithmeticOp::Mul(NumericType::Double)),
        0x6c => I::Arithmetic(ArithmeticOp::Div(NumericType::Int)),
        0x6d => I::Arithmetic(ArithmeticOp::Div(NumericType::Long)),
        0x6e => I::Arithmetic(ArithmeticOp::Div(NumericType::Float)),
        0x6f => I::Arithmetic(ArithmeticOp::Div(NumericType::Double)),
        0x70 => I::Arithmetic(ArithmeticOp::Rem(NumericType::Int)),
        0x71 => I::Arithmetic(ArithmeticOp::Rem(NumericType::Long)),
        0x72 => I::Arithmetic(ArithmeticOp::Rem(NumericType::Float)),
        0x73 => I::Arithmetic(ArithmeticOp::Rem(NumericType::Double)),
        0x74 => I::Arithmetic(ArithmeticOp::Neg(NumericType::Int)),
        0x75 => I::Arithmetic(ArithmeticOp::Neg(NumericType::Long)),
        0x76 => I::Arithmetic(ArithmeticOp::Neg(NumericType::Float)),
        0x77 => I::Arithmetic(ArithmeticOp::Neg(NumericType::Double)),
        0x78 => I::Arithmetic(ArithmeticOp::Shl(IntegralType::Int)),
        0x79 => I::Arithmetic(ArithmeticOp::Shl(IntegralType::Long)),
        0x7a => I::Arithmetic(ArithmeticOp::Shr(IntegralType::Int)),
        0x7b => I::Arithmetic(ArithmeticOp::Shr(IntegralType::Long)),
        0x7c => I::Arithmetic(ArithmeticOp::UShr(IntegralType::Int)),
        0x7d => I::Arithmetic(ArithmeticOp::UShr(IntegralType::Long)),
        0x7e => I::Arithmetic(ArithmeticOp::And(IntegralType::Int)),
        0x7f => I::Arithmetic(ArithmeticOp::And(IntegralType::Long)),
        0x80 => I::Arithmetic(ArithmeticOp::Or(IntegralType::Int)),
        0x81 => I::Arithmetic(ArithmeticOp::Or(IntegralType::Long)),
        0x82 => I::Arithmetic(ArithmeticOp::Xor(IntegralType::Int)),
        0x83 => I::Arithmetic(ArithmeticOp::Xor(IntegralType::Long)),

        0x84 => {
            let index = u16::from(cursor.read_u8()?);
            let delta = i16::from(cursor.read_i8()?);
            I::IInc(index, delta)
        }

        0x85 => I::Arithmetic(ArithmeticOp::Convert(NumericType::Int, NumericType::Long)),
        0x86 => I::Arithmetic(ArithmeticOp::Convert(NumericType::Int, NumericType::Float)),
        0x87 => I::Arithmetic(ArithmeticOp::Convert(NumericType::Int, NumericType::Double)),
        0x88 => I::Arithmetic(ArithmeticOp::Convert(NumericType::Long, NumericType::Int)),
        0x89 => I::Arithmetic(ArithmeticOp::Convert(NumericType::Long, NumericType::Float)),
        0x8a => I::Arithmetic(ArithmeticOp::Convert(NumericType::Long, NumericType::Double)),
        0x8b => I::Arithmetic(ArithmeticOp::Convert(NumericType::Float, NumericType::Int)),
        0x8c => I::Arithmetic(ArithmeticOp::Convert(NumericType::Float, NumericType::Long)),
        0x8d => I::Arithmetic(ArithmeticOp::Convert(NumericType::Float, NumericType::Double)),
        0x8e => I::Arithmetic(ArithmeticOp::Convert(NumericType::Double, NumericType::Int)),
        0x8f => I::Arithmetic(ArithmeticOp::Convert(NumericType::Double, NumericType::Long)),
        0x90 => I::Arithmetic(ArithmeticOp::Convert(NumericType::Double, NumericType::Float)),
        // i2b/i2c/i2s narrow within `int`; modeled as int->int conversions distinguished by opcode identity.
        0x91 => I::Arithmetic(ArithmeticOp::Convert(NumericType::Int, NumericType::Int)),
        0x92 => I::Arithmetic(ArithmeticOp::Convert(NumericType::Int, NumericType::Int)),
        0x93 => I::Arithmetic(ArithmeticOp::Convert(NumericType::Int, NumericType::Int)),

        0x94 => I::Compare(CompareOp::Long),
        0x95 => I::Compare(CompareOp::FloatL),
        0x96 => I::Compare(CompareOp::FloatG),
        0x97 => I::Compare(CompareOp::DoubleL),
        0x98 => I::Compare(CompareOp::DoubleG),

        0x99 => I::If(Condition::Eq, IfOperands::IntVsZero, branch16(cursor, fixups)?),
        0x9a => I::If(Condition::Ne, IfOperands::IntVsZero, branch16(cursor, fixups)?),
        0x9b => I::If(Condition::Lt, IfOperands::IntVsZero, branch16(cursor, fixups)?),
        0x9c => I::If(Condition::Ge, IfOperands::IntVsZero, branch16(cursor, fixups)?),
        0x9d => I::If(Condition::Gt, IfOperands::IntVsZero, branch16(cursor, fixups)?),
        0x9e => I::If(Condition::Le, IfOperands::IntVsZero, branch16(cursor, fixups)?),
        0x9f => I::If(Condition::Eq, IfOperands::IntVsInt, branch16(cursor, fixups)?),
        0xa0 => I::If(Condition::Ne, IfOperands::IntVsInt, branch16(cursor, fixups)?),
        0xa1 => I::If(Condition::Lt, IfOperands::IntVsInt, branch16(cursor, fixups)?),
        0xa2 => I::If(Condition::Ge, IfOperands::IntVsInt, branch16(cursor, fixups)?),
        0xa3 => I::If(Condition::Gt, IfOperands::IntVsInt, branch16(cursor, fixups)?),
        0xa4 => I::If(Condition::Le, IfOperands::IntVsInt, branch16(cursor, fixups)?),
        0xa5 => I::If(Condition::Eq, IfOperands::RefVsRef, branch16(cursor, fixups)?),
        0xa6 => I::If(Condition::Ne, IfOperands::RefVsRef, branch16(cursor, fixups)?),
        0xa7 => I::Goto(branch16(cursor, fixups)?),
        0xa8 => I::Jsr(branch16(cursor, fixups)?),
        0xa9 => I::Ret(u16::from(cursor.read_u8()?)),

        0xaa => decode_tableswitch(cursor, start, code_len, fixups)?,
        0xab => decode_lookupswitch(cursor, start, code_len, fixups)?,

        0xac => I::Return(Some(ReturnValueType::Int)),
        0xad => I::Return(Some(ReturnValueType::Long)),
        0xae => I::Return(Some(ReturnValueType::Float)),
        0xaf => I::Return(Some(ReturnValueType::Double)),
        0xb0 => I::Return(Some(ReturnValueType::Reference)),
        0xb1 => I::Return(None),

        0xb2 => I::GetStatic(metadata.resolve_field(cursor.read_u16()?)?),
        0xb3 => I::PutStatic(metadata.resolve_field(cursor.read_u16()?)?),
        0xb4 => I::GetField(metadata.resolve_field(cursor.read_u16()?)?),
        0xb5 => I::PutField(metadata.resolve_field(cursor.read_u16()?)?),

        0xb6 => I::InvokeVirtual(metadata.resolve_method(cursor.read_u16()?)?),
        0xb7 => I::InvokeSpecial(metadata.resolve_method(cursor.read_u16()?)?),
        0xb8 => I::InvokeStatic(metadata.resolve_method(cursor.read_u16()?)?),
        0xb9 => {
            let index = cursor.read_u16()?;
            let count = cursor.read_u8()?;
            let _zero = cursor.read_u8()?;
            I::InvokeInterface(metadata.resolve_method(index)?, count)
        }
        0xba => {
            let index = cursor.read_u16()?;
            let _zero1 = cursor.read_u8()?;
            let _zero2 = cursor.read_u8()?;
            I::InvokeDynamic(metadata.resolve_dynamic_call_site(index)?)
        }

        0xbb => I::New(metadata.resolve_class(cursor.read_u16()?)?),
        0xbc => I::NewArray(decode_array_type(cursor.read_u8()?, start)?),
        0xbd => I::ANewArray(metadata.resolve_class(cursor.read_u16()?)?),
        0xbe => I::ArrayLength,
        0xbf => I::AThrow,
        0xc0 => I::CheckCast(metadata.resolve_class(cursor.read_u16()?)?),
        0xc1 => I::InstanceOf(metadata.resolve_class(cursor.read_u16()?)?),
        0xc2 => I::MonitorEnter,
        0xc3 => I::MonitorExit,

        0xc4 => decode_wide(cursor)?,

        0xc5 => {
            let class = metadata.resolve_class(cursor.read_u16()?)?;
            let dims = cursor.read_u8()?;
            I::MultiANewArray(class, dims)
        }
        0xc6 => I::If(Condition::IsNull, IfOperands::RefVsNull, branch16(cursor, fixups)?),
        0xc7 => I::If(Condition::IsNotNull, IfOperands::RefVsNull, branch16(cursor, fixups)?),
        0xc8 => I::Goto(branch32(cursor, fixups)?),
        0xc9 => I::Jsr(branch32(cursor, fixups)?),

        other => return Err(DecodeError::UnrecognizedOpcode(other, start)),
    })
}

fn decode_wide(cursor: &mut Cursor<'_>) -> Result<Instruction, DecodeError> {
    use Instruction as I;
    let opcode = cursor.read_u8()?;
    Ok(match opcode {
        0x15 => I::Load(VarLoadType::Int, cursor.read_u16()?),
        0x16 => I::Load(VarLoadType::Long, cursor.read_u16()?),
        0x17 => I::Load(VarLoadType::Float, cursor.read_u16()?),
        0x18 => I::Load(VarLoadType::Double, cursor.read_u16()?),
        0x19 => I::Load(VarLoadType::Reference, cursor.read_u16()?),
        0x36 => I::Store(VarLoadType::Int, cursor.read_u16()?),
        0x37 => I::Store(VarLoadType::Long, cursor.read_u16()?),
        0x38 => I::Store(VarLoadType::Float, cursor.read_u16()?),
        0x39 => I::Store(VarLoadType::Double, cursor.read_u16()?),
        0x3a => I::Store(VarLoadType::Reference, cursor.read_u16()?),
        0xa9 => I::Ret(cursor.read_u16()?),
        0x84 => {
            let index = cursor.read_u16()?;
            let delta = cursor.read_i16()?;
            I::IInc(index, delta)
        }
        other => return Err(DecodeError::UnrecognizedOpcode(other, cursor.pc())),
    })
}

fn decode_array_type(tag: u8, at: ProgramCounter) -> Result<PrimitiveType, DecodeError> {
    Ok(match tag {
        4 => PrimitiveType::Boolean,
        5 => PrimitiveType::Char,
        6 => PrimitiveType::Float,
        7 => PrimitiveType::Double,
        8 => PrimitiveType::Byte,
        9 => PrimitiveType::Short,
        10 => PrimitiveType::Int,
        11 => PrimitiveType::Long,
        _ => return Err(DecodeError::UnrecognizedOpcode(tag, at)),
    })
}

fn resolve_branch(
    source: ProgramCounter,
    delta: i32,
    code_len: usize,
    fixups: &mut FixupTable,
) -> Result<ProgramCounter, DecodeError> {
    let target = source.offset(delta)?;
    if usize::from(u16::from(target)) > code_len {
        // Dangling forward branch past the end of the code array: still
        // register it so a synthetic `nop` gets inserted there after decoding.
        fixups.request(target);
        return Ok(target);
    }
    fixups.request(target);
    Ok(target)
}

fn decode_tableswitch(
    cursor: &mut Cursor<'_>,
    start: ProgramCounter,
    code_len: usize,
    fixups: &mut FixupTable,
) -> Result<Instruction, DecodeError> {
    cursor.align_to_4(start)?;
    let default_delta = cursor.read_i32()?;
    let default = resolve_branch(start, default_delta, code_len, fixups)?;
    let low = cursor.read_i32()?;
    let high = cursor.read_i32()?;
    let count = (high - low + 1).max(0);
    let mut branches = Vec::with_capacity(count as usize);
    for i in 0..count {
        let delta = cursor.read_i32()?;
        let target = resolve_branch(start, delta, code_len, fixups)?;
        branches.push((low + i, target));
    }
    Ok(Instruction::Switch(SwitchInfo { default, branches }))
}

fn decode_lookupswitch(
    cursor: &mut Cursor<'_>,
    start: ProgramCounter,
    code_len: usize,
    fixups: &mut FixupTable,
) -> Result<Instruction, DecodeError> {
    cursor.align_to_4(start)?;
    let default_delta = cursor.read_i32()?;
    let default = resolve_branch(start, default_delta, code_len, fixups)?;
    let pair_count = cursor.read_i32()?;
    let mut branches = Vec::with_capacity(pair_count.max(0) as usize);
    for _ in 0..pair_count.max(0) {
        let key = cursor.read_i32()?;
        let delta = cursor.read_i32()?;
        let target = resolve_branch(start, delta, code_len, fixups)?;
        branches.push((key, target));
    }
    Ok(Instruction::Switch(SwitchInfo { default, branches }))
}

/// A forward-only byte cursor over a method body's raw code array.
struct Cursor<'c> {
    bytes: &'c [u8],
    pos: usize,
}

impl<'c> Cursor<'c> {
    fn new(bytes: &'c [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn pc(&self) -> ProgramCounter {
        #[allow(clippy::cast_possible_truncation)]
        ProgramCounter::from(self.pos as u16)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| DecodeError::UnexpectedEnd(self.pc()))?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.read_u8()? as i8)
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let hi = self.read_u8()?;
        let lo = self.read_u8()?;
        Ok(u16::from(hi) << 8 | u16::from(lo))
    }

    fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(self.read_u16()? as i16)
    }

    fn read_i32(&mut self) -> Result<i32, DecodeError> {
        let mut value: u32 = 0;
        for _ in 0..4 {
            value = (value << 8) | u32::from(self.read_u8()?);
        }
        Ok(value as i32)
    }

    /// Consumes the padding bytes so that the next read starts on a 4-byte
    /// boundary relative to the start of the code array, as `tableswitch`
    /// and `lookupswitch` require.
    fn align_to_4(&mut self, instruction_start: ProgramCounter) -> Result<(), DecodeError> {
        let base = usize::from(u16::from(instruction_start)) + 1;
        let padding = (4 - base % 4) % 4;
        for _ in 0..padding {
            self.read_u8()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::ReturnValueType;
    use crate::metadata::tests::FakeMetadataScope;

    fn body(code: Vec<u8>) -> MethodBody {
        MethodBody {
            max_stack: 2,
            max_locals: 1,
            code,
            exception_table: vec![],
            local_variable_table: None,
        }
    }

    #[test]
    fn straight_line_add() {
        // iconst_1, iconst_2, iadd, ireturn
        let code = vec![0x04, 0x05, 0x60, 0xac];
        let metadata = FakeMetadataScope::default();
        let decoded = decode(&body(code), &metadata).expect("decode succeeds");
        assert_eq!(decoded.instructions.len(), 4);
        assert_eq!(decoded.instructions.get(&0.into()), Some(&Instruction::IConst(1)));
        assert_eq!(decoded.instructions.get(&1.into()), Some(&Instruction::IConst(2)));
        assert_eq!(
            decoded.instructions.get(&2.into()),
            Some(&Instruction::Arithmetic(ArithmeticOp::Add(NumericType::Int)))
        );
        assert_eq!(
            decoded.instructions.get(&3.into()),
            Some(&Instruction::Return(Some(ReturnValueType::Int)))
        );
        assert_eq!(decoded.labels.iter().count(), 0);
    }

    #[test]
    fn forward_branch_labels_target() {
        // iload_0, ifeq +5, iconst_1, ireturn, iconst_0, ireturn
        let code = vec![0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac];
        let metadata = FakeMetadataScope::default();
        let decoded = decode(&body(code), &metadata).expect("decode succeeds");
        assert!(decoded.labels.get(6.into()).is_some());
        assert_eq!(
            decoded.instructions.get(&1.into()),
            Some(&Instruction::If(Condition::Eq, IfOperands::IntVsZero, 6.into()))
        );
    }

    #[test]
    fn dangling_forward_branch_gets_synthetic_nop() {
        // goto +100 from offset 0, past the end of a 3-byte body
        let code = vec![0xa7, 0x00, 0x64];
        let metadata = FakeMetadataScope::default();
        let decoded = decode(&body(code), &metadata).expect("decode succeeds");
        assert_eq!(decoded.instructions.get(&100.into()), Some(&Instruction::SyntheticNop));
    }

    #[test]
    fn unrecognized_opcode_is_fatal() {
        let code = vec![0xff];
        let metadata = FakeMetadataScope::default();
        assert!(matches!(
            decode(&body(code), &metadata),
            Err(DecodeError::UnrecognizedOpcode(0xff, _))
        ));
    }
}
