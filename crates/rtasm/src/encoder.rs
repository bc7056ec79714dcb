//! x86 instruction encoder.
//!
//! Builds one complete instruction into a stack-allocated [`InstrBytes`]
//! before anything touches the output buffer, so a failing encode never
//! leaves a partial instruction behind. Opcode tables live in `x86`.

use alloc::string::String;

use crate::error::AsmError;
use crate::ir::*;
use crate::x86::{Encoding, MoveOp, SimdOp, X87Arith};

/// REX.W prefix selecting 64-bit operand size.
pub(crate) const REX_W: u8 = 0x48;

/// SIB byte for a bare base of ordinal 4: scale 1, no index, base ESP.
const SIB_ESP_BASE: u8 = 0x24;

// ─── InstrBytes: stack-allocated instruction buffer ────────────────────

/// Stack-allocated instruction byte buffer.
///
/// x86 instructions are at most 15 bytes long.
#[derive(Clone)]
pub struct InstrBytes {
    data: [u8; 15],
    len: u8,
}

impl InstrBytes {
    /// Create an empty buffer.
    #[inline]
    pub const fn new() -> Self {
        Self {
            data: [0; 15],
            len: 0,
        }
    }

    /// Create a buffer pre-filled from a byte slice (max 15 bytes).
    #[inline]
    pub fn from_slice(src: &[u8]) -> Self {
        let mut buf = Self::new();
        buf.extend_from_slice(src);
        buf
    }

    /// Append a single byte.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is already full (15 bytes).
    #[inline]
    pub fn push(&mut self, byte: u8) {
        assert!(
            (self.len as usize) < 15,
            "InstrBytes overflow: cannot push beyond 15 bytes"
        );
        self.data[self.len as usize] = byte;
        self.len += 1;
    }

    /// Append a slice of bytes.
    ///
    /// # Panics
    ///
    /// Panics if appending would exceed the 15-byte capacity.
    #[inline]
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        let start = self.len as usize;
        let end = start + bytes.len();
        assert!(
            end <= 15,
            "InstrBytes overflow: {} + {} exceeds 15-byte capacity",
            start,
            bytes.len()
        );
        self.data[start..end].copy_from_slice(bytes);
        self.len = end as u8;
    }

    /// Number of bytes in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for InstrBytes {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl core::ops::Deref for InstrBytes {
    type Target = [u8];
    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

impl AsRef<[u8]> for InstrBytes {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl core::fmt::Debug for InstrBytes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl PartialEq for InstrBytes {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for InstrBytes {}

impl PartialEq<[u8]> for InstrBytes {
    fn eq(&self, other: &[u8]) -> bool {
        **self == *other
    }
}

// ─── ModR/M / SIB helpers ──────────────────────────────

/// Build ModR/M byte.
#[inline]
pub(crate) fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
    (mod_ << 6) | ((reg & 7) << 3) | (rm & 7)
}

/// Emit ModR/M, optional SIB, and displacement with a raw 3-bit reg field.
///
/// The reg field is either a register number or an opcode extension
/// (`/digit`).
pub(crate) fn emit_addressing(buf: &mut InstrBytes, reg_field: u8, rm: &Operand) {
    match rm {
        Operand::Register(reg) => buf.push(modrm(0b11, reg_field, reg.base_code())),
        Operand::Memory(mem) => {
            buf.push(modrm(mem.mode().mod_bits(), reg_field, mem.base().base_code()));
            if mem.needs_sib() {
                buf.push(SIB_ESP_BASE);
            }
            match mem.mode() {
                DispMode::None => {}
                DispMode::Disp8 => buf.push(mem.disp() as i8 as u8),
                DispMode::Disp32 => buf.extend_from_slice(&mem.disp().to_le_bytes()),
            }
        }
    }
}

/// Emit the addressing byte for `reg_field` and `rm`, plus SIB and
/// displacement when `rm` is a memory operand.
///
/// # Errors
///
/// Returns [`AsmError::ContractViolation`] if `reg_field` is a memory
/// operand; the register field can only name a register.
pub fn encode_addressing_byte(
    buf: &mut InstrBytes,
    reg_field: &Operand,
    rm: &Operand,
) -> Result<(), AsmError> {
    let Operand::Register(reg) = reg_field else {
        return Err(AsmError::contract(alloc::format!(
            "register field cannot hold memory operand {}",
            reg_field
        )));
    };
    emit_addressing(buf, reg.base_code(), rm);
    Ok(())
}

/// Encode a two-operand instruction that has a register-destination and a
/// memory-destination opcode.
///
/// With a register `dst` this emits `reg_form` and uses `dst` as the
/// register field; with a memory `dst` it emits `mem_form` and the roles
/// swap, so `src` becomes the register field.
///
/// # Errors
///
/// Returns [`AsmError::ContractViolation`] when both operands are memory.
pub fn encode_dual_opcode(
    buf: &mut InstrBytes,
    reg_form: &[u8],
    mem_form: &[u8],
    dst: &Operand,
    src: &Operand,
) -> Result<(), AsmError> {
    match dst {
        Operand::Register(_) => {
            buf.extend_from_slice(reg_form);
            encode_addressing_byte(buf, dst, src)
        }
        Operand::Memory(_) => {
            if src.is_memory() {
                return Err(AsmError::contract(alloc::format!(
                    "memory-to-memory operands {}, {}",
                    dst,
                    src
                )));
            }
            buf.extend_from_slice(mem_form);
            encode_addressing_byte(buf, src, dst)
        }
    }
}

// ─── Operand class checks ──────────────────────────────

fn class_error(mnemonic: &str, role: &str, expected: &str, got: &Operand) -> AsmError {
    AsmError::contract(alloc::format!(
        "{}: {} must be {}, got {}",
        mnemonic,
        role,
        expected,
        got
    ))
}

/// Require a register of `class`.
pub(crate) fn expect_reg(
    mnemonic: &str,
    role: &str,
    op: &Operand,
    class: RegClass,
) -> Result<Register, AsmError> {
    match op {
        Operand::Register(reg) if reg.class() == class => Ok(*reg),
        _ => Err(class_error(
            mnemonic,
            role,
            &alloc::format!("a {} register", class),
            op,
        )),
    }
}

/// Require a register of `class` or a memory operand.
pub(crate) fn expect_rm(
    mnemonic: &str,
    role: &str,
    op: &Operand,
    class: RegClass,
) -> Result<(), AsmError> {
    match op {
        Operand::Register(reg) if reg.class() != class => Err(class_error(
            mnemonic,
            role,
            &alloc::format!("a {} register or memory", class),
            op,
        )),
        _ => Ok(()),
    }
}

/// Require a memory operand.
pub(crate) fn expect_mem(
    mnemonic: &str,
    role: &str,
    op: &Operand,
) -> Result<MemoryOperand, AsmError> {
    op.as_memory()
        .ok_or_else(|| class_error(mnemonic, role, "memory", op))
}

fn emit_encoding_prefix(buf: &mut InstrBytes, enc: &Encoding) {
    if let Some(prefix) = enc.prefix {
        buf.push(prefix);
    }
}

// ─── General-purpose encoders ──────────────────────────────

/// Two-operand integer ALU / move: `dst, src` with `reg_form`/`mem_form`.
pub(crate) fn encode_gp_dual(
    mnemonic: &str,
    reg_form: u8,
    mem_form: u8,
    dst: &Operand,
    src: &Operand,
    rex_w: bool,
) -> Result<InstrBytes, AsmError> {
    expect_rm(mnemonic, "destination", dst, RegClass::Gp32)?;
    expect_rm(mnemonic, "source", src, RegClass::Gp32)?;
    let mut buf = InstrBytes::new();
    if rex_w {
        buf.push(REX_W);
    }
    encode_dual_opcode(&mut buf, &[reg_form], &[mem_form], dst, src)?;
    Ok(buf)
}

/// `opcode /digit` applied to a register or memory operand.
pub(crate) fn encode_gp_digit(
    mnemonic: &str,
    opcode: u8,
    digit: u8,
    rm: &Operand,
) -> Result<InstrBytes, AsmError> {
    expect_rm(mnemonic, "operand", rm, RegClass::Gp32)?;
    let mut buf = InstrBytes::new();
    buf.push(opcode);
    emit_addressing(&mut buf, digit, rm);
    Ok(buf)
}

/// Group-1 ALU with an immediate: `83 /digit ib` when the value fits a
/// signed byte, `81 /digit id` otherwise.
pub(crate) fn encode_alu_imm(
    mnemonic: &str,
    digit: u8,
    dst: &Operand,
    imm: i32,
) -> Result<InstrBytes, AsmError> {
    expect_rm(mnemonic, "destination", dst, RegClass::Gp32)?;
    let mut buf = InstrBytes::new();
    if let Ok(imm8) = i8::try_from(imm) {
        buf.push(0x83);
        emit_addressing(&mut buf, digit, dst);
        buf.push(imm8 as u8);
    } else {
        buf.push(0x81);
        emit_addressing(&mut buf, digit, dst);
        buf.extend_from_slice(&imm.to_le_bytes());
    }
    Ok(buf)
}

/// `mov dst, imm32`: `B8+r id` for a register, `C7 /0 id` for memory.
pub(crate) fn encode_mov_imm(dst: &Operand, imm: i32) -> Result<InstrBytes, AsmError> {
    let mut buf = InstrBytes::new();
    match dst {
        Operand::Register(Register::Gp(reg)) => buf.push(0xB8 + reg.base_code()),
        Operand::Memory(_) => {
            buf.push(0xC7);
            emit_addressing(&mut buf, 0, dst);
        }
        Operand::Register(_) => {
            return Err(class_error(
                "mov",
                "destination",
                "a general-purpose register or memory",
                dst,
            ))
        }
    }
    buf.extend_from_slice(&imm.to_le_bytes());
    Ok(buf)
}

/// `lea dst, [mem]`.
pub(crate) fn encode_lea(dst: &Operand, src: &Operand, rex_w: bool) -> Result<InstrBytes, AsmError> {
    let reg = expect_reg("lea", "destination", dst, RegClass::Gp32)?;
    expect_mem("lea", "source", src)?;
    let mut buf = InstrBytes::new();
    if rex_w {
        buf.push(REX_W);
    }
    buf.push(0x8D);
    emit_addressing(&mut buf, reg.base_code(), src);
    Ok(buf)
}

// ─── SIMD encoders ──────────────────────────────

/// Encoding of `op` for the register class of `dst`.
fn simd_encoding<'a>(op: &'a SimdOp, dst: &Operand) -> Result<(&'a Encoding, RegClass), AsmError> {
    let class = dst.as_register().map(Register::class);
    match (class, &op.xmm, &op.mmx) {
        (Some(RegClass::Xmm), Some(enc), _) => Ok((enc, RegClass::Xmm)),
        (Some(RegClass::Mmx), _, Some(enc)) => Ok((enc, RegClass::Mmx)),
        _ => Err(class_error(
            op.mnemonic,
            "destination",
            op.expected_register(),
            dst,
        )),
    }
}

/// SIMD `reg, reg/mem` arithmetic or conversion.
///
/// The destination class selects the table entry; the source must be of
/// the same class or memory.
pub(crate) fn encode_simd(op: &SimdOp, dst: &Operand, src: &Operand) -> Result<InstrBytes, AsmError> {
    let (enc, class) = simd_encoding(op, dst)?;
    expect_rm(op.mnemonic, "source", src, class)?;
    let mut buf = InstrBytes::new();
    emit_encoding_prefix(&mut buf, enc);
    buf.extend_from_slice(&enc.opcode);
    encode_addressing_byte(&mut buf, dst, src)?;
    Ok(buf)
}

/// SIMD `reg, reg/mem, imm8` (shuffles and compares).
pub(crate) fn encode_simd_imm(
    op: &SimdOp,
    dst: &Operand,
    src: &Operand,
    imm: u8,
) -> Result<InstrBytes, AsmError> {
    let mut buf = encode_simd(op, dst, src)?;
    buf.push(imm);
    Ok(buf)
}

/// SIMD `reg, reg` where both operands must be registers.
pub(crate) fn encode_simd_rr(op: &SimdOp, dst: &Operand, src: &Operand) -> Result<InstrBytes, AsmError> {
    let (_, class) = simd_encoding(op, dst)?;
    expect_reg(op.mnemonic, "source", src, class)?;
    encode_simd(op, dst, src)
}

/// SIMD load/store pair: a register destination uses the load encoding, a
/// memory destination the store encoding.
pub(crate) fn encode_simd_move(op: &MoveOp, dst: &Operand, src: &Operand) -> Result<InstrBytes, AsmError> {
    let (reg, other) = match (dst, src) {
        (Operand::Register(reg), _) => (*reg, src),
        (Operand::Memory(_), Operand::Register(reg)) => (*reg, dst),
        _ => {
            return Err(AsmError::contract(alloc::format!(
                "{}: memory-to-memory operands {}, {}",
                op.mnemonic,
                dst,
                src
            )))
        }
    };
    let pair = match reg.class() {
        RegClass::Xmm => op.xmm.as_ref(),
        RegClass::Mmx => op.mmx.as_ref(),
        RegClass::Gp32 | RegClass::X87 => None,
    };
    let Some((load, store)) = pair else {
        return Err(class_error(
            op.mnemonic,
            "register operand",
            op.expected_register(),
            &Operand::Register(reg),
        ));
    };
    match other {
        Operand::Register(r) if r.class() != reg.class() => {
            return Err(class_error(
                op.mnemonic,
                "second operand",
                &alloc::format!("a {} register or memory", reg.class()),
                other,
            ))
        }
        Operand::Register(_) if op.memory_only => {
            return Err(class_error(op.mnemonic, "second operand", "memory", other))
        }
        _ => {}
    }
    let enc = if dst.is_memory() { store } else { load };
    let mut buf = InstrBytes::new();
    emit_encoding_prefix(&mut buf, enc);
    encode_dual_opcode(&mut buf, &enc.opcode, &enc.opcode, dst, src)?;
    Ok(buf)
}

/// `movd` between a SIMD register and a general-purpose register or
/// memory. The SIMD register always occupies the register field.
pub(crate) fn encode_movd(dst: &Operand, src: &Operand) -> Result<InstrBytes, AsmError> {
    let simd_class = |op: &Operand| match op {
        Operand::Register(r) if matches!(r.class(), RegClass::Mmx | RegClass::Xmm) => Some(*r),
        _ => None,
    };
    let (simd, other, opcode) = match (simd_class(dst), simd_class(src)) {
        (Some(reg), None) => (reg, src, 0x6E),
        (None, Some(reg)) => (reg, dst, 0x7E),
        _ => {
            return Err(AsmError::contract(alloc::format!(
                "movd: exactly one operand must be an mmx or xmm register, got {}, {}",
                dst,
                src
            )))
        }
    };
    expect_rm("movd", "general-purpose operand", other, RegClass::Gp32)?;
    let mut buf = InstrBytes::new();
    if simd.class() == RegClass::Xmm {
        buf.push(0x66);
    }
    buf.extend_from_slice(&[0x0F, opcode]);
    emit_addressing(&mut buf, simd.base_code(), other);
    Ok(buf)
}

/// Mask extraction: general-purpose destination, SIMD register source.
pub(crate) fn encode_movmsk(op: &SimdOp, dst: &Operand, src: &Operand) -> Result<InstrBytes, AsmError> {
    let reg = expect_reg(op.mnemonic, "destination", dst, RegClass::Gp32)?;
    let (enc, _) = simd_encoding(op, src).map_err(|_| {
        class_error(op.mnemonic, "source", op.expected_register(), src)
    })?;
    let mut buf = InstrBytes::new();
    emit_encoding_prefix(&mut buf, enc);
    buf.extend_from_slice(&enc.opcode);
    emit_addressing(&mut buf, reg.base_code(), src);
    Ok(buf)
}

// ─── x87 encoders ──────────────────────────────

/// Require an x87 stack register.
pub(crate) fn expect_st(mnemonic: &str, role: &str, op: &Operand) -> Result<St, AsmError> {
    op.as_register()
        .and_then(Register::as_st)
        .ok_or_else(|| class_error(mnemonic, role, "an x87 stack register", op))
}

/// Two-byte `opcode, base+i` form addressing `st(i)`.
pub(crate) fn encode_x87_st(opcode: u8, base: u8, st: St) -> InstrBytes {
    InstrBytes::from_slice(&[opcode, base + st.base_code()])
}

/// `opcode /digit` with a memory operand.
pub(crate) fn encode_x87_mem(
    mnemonic: &str,
    opcode: u8,
    digit: u8,
    mem: &Operand,
) -> Result<InstrBytes, AsmError> {
    expect_mem(mnemonic, "operand", mem)?;
    let mut buf = InstrBytes::new();
    buf.push(opcode);
    emit_addressing(&mut buf, digit, mem);
    Ok(buf)
}

/// x87 arithmetic with an explicit destination.
///
/// `st(0), st(i)` and `st(i), st(0)` use the two register forms; `st(0),
/// m32fp` uses the memory form. Any other pairing has no encoding.
pub(crate) fn encode_x87_arith(
    op: &X87Arith,
    dst: &Operand,
    src: &Operand,
) -> Result<InstrBytes, AsmError> {
    let top = Operand::from(St::St0);
    match (dst.as_register().and_then(Register::as_st), src) {
        (Some(St::St0), Operand::Register(Register::St(i))) => {
            Ok(encode_x87_st(op.to_top.0, op.to_top.1, *i))
        }
        (Some(i), _) if *src == top => Ok(encode_x87_st(op.from_top.0, op.from_top.1, i)),
        (Some(St::St0), Operand::Memory(_)) => {
            encode_x87_mem(op.mnemonic, op.mem.0, op.mem.1, src)
        }
        _ => Err(AsmError::contract(alloc::format!(
            "{}: one operand must be st(0) and the other an x87 register or, as source, memory; got {}, {}",
            op.mnemonic,
            dst,
            src
        ))),
    }
}

/// Render `mnemonic op, op, ...` for listings.
pub(crate) fn format_instruction(mnemonic: &str, ops: &[Operand]) -> String {
    use core::fmt::Write;
    let mut text = String::from(mnemonic);
    for (i, op) in ops.iter().enumerate() {
        let sep = if i == 0 { " " } else { ", " };
        let _ = write!(text, "{}{}", sep, op);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x86;

    fn addressing(reg: impl Into<Operand>, rm: impl Into<Operand>) -> alloc::vec::Vec<u8> {
        let mut buf = InstrBytes::new();
        encode_addressing_byte(&mut buf, &reg.into(), &rm.into()).unwrap();
        buf.to_vec()
    }

    #[test]
    fn addressing_register_direct() {
        assert_eq!(addressing(Gpr::Eax, Gpr::Ecx), [0xC1]);
        assert_eq!(addressing(Xmm::Xmm7, Xmm::Xmm0), [0xF8]);
    }

    #[test]
    fn addressing_memory_modes() {
        assert_eq!(addressing(Gpr::Eax, Gpr::Ecx.deref()), [0x01]);
        assert_eq!(addressing(Gpr::Eax, Gpr::Ecx.disp(8)), [0x41, 0x08]);
        assert_eq!(addressing(Gpr::Eax, Gpr::Ecx.disp(-128)), [0x41, 0x80]);
        assert_eq!(
            addressing(Gpr::Eax, Gpr::Ecx.disp(128)),
            [0x81, 0x80, 0x00, 0x00, 0x00]
        );
        assert_eq!(
            addressing(Gpr::Edx, Gpr::Esi.disp(-129)),
            [0x96, 0x7F, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn addressing_esp_base_adds_sib() {
        assert_eq!(addressing(Gpr::Eax, Gpr::Esp.deref()), [0x04, 0x24]);
        assert_eq!(addressing(Gpr::Eax, Gpr::Esp.disp(4)), [0x44, 0x24, 0x04]);
        assert_eq!(
            addressing(Gpr::Eax, Gpr::Esp.disp(0x100)),
            [0x84, 0x24, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn addressing_ebp_base_zero_disp() {
        assert_eq!(addressing(Gpr::Eax, Gpr::Ebp.deref()), [0x45, 0x00]);
    }

    #[test]
    fn addressing_rejects_memory_register_field() {
        let mut buf = InstrBytes::new();
        let err = encode_addressing_byte(
            &mut buf,
            &Gpr::Eax.deref().into(),
            &Gpr::Ecx.into(),
        )
        .unwrap_err();
        assert!(err.is_contract_violation());
        assert!(buf.is_empty());
    }

    #[test]
    fn dual_opcode_swaps_roles() {
        let mut buf = InstrBytes::new();
        encode_dual_opcode(
            &mut buf,
            &[0x8B],
            &[0x89],
            &Gpr::Eax.into(),
            &Gpr::Ecx.disp(4).into(),
        )
        .unwrap();
        assert_eq!(&*buf, &[0x8B, 0x41, 0x04]);

        let mut buf = InstrBytes::new();
        encode_dual_opcode(
            &mut buf,
            &[0x8B],
            &[0x89],
            &Gpr::Ecx.disp(4).into(),
            &Gpr::Eax.into(),
        )
        .unwrap();
        assert_eq!(&*buf, &[0x89, 0x41, 0x04]);
    }

    #[test]
    fn dual_opcode_rejects_memory_pair() {
        let mut buf = InstrBytes::new();
        let err = encode_dual_opcode(
            &mut buf,
            &[0x8B],
            &[0x89],
            &Gpr::Ecx.deref().into(),
            &Gpr::Edx.deref().into(),
        )
        .unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn simd_dispatches_on_destination_class() {
        let xmm = encode_simd(&x86::PACKSSDW, &Xmm::Xmm1.into(), &Xmm::Xmm2.into()).unwrap();
        assert_eq!(&*xmm, &[0x66, 0x0F, 0x6B, 0xCA]);
        let mmx = encode_simd(&x86::PACKSSDW, &Mmx::Mm1.into(), &Mmx::Mm2.into()).unwrap();
        assert_eq!(&*mmx, &[0x0F, 0x6B, 0xCA]);
    }

    #[test]
    fn simd_rejects_mixed_classes() {
        let err = encode_simd(&x86::ADDPS, &Xmm::Xmm0.into(), &Gpr::Eax.into()).unwrap_err();
        assert!(err.is_contract_violation());
        let err = encode_simd(&x86::ADDPS, &Gpr::Eax.into(), &Xmm::Xmm0.into()).unwrap_err();
        assert!(err.is_contract_violation());
        let err = encode_simd(&x86::ADDPS, &Mmx::Mm0.into(), &Mmx::Mm1.into()).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn simd_move_memory_only() {
        let err =
            encode_simd_move(&x86::MOVLPS, &Xmm::Xmm0.into(), &Xmm::Xmm1.into()).unwrap_err();
        assert!(err.is_contract_violation());
        let ok = encode_simd_move(&x86::MOVLPS, &Gpr::Eax.deref().into(), &Xmm::Xmm1.into())
            .unwrap();
        assert_eq!(&*ok, &[0x0F, 0x13, 0x08]);
    }

    #[test]
    fn movd_directions() {
        let load = encode_movd(&Xmm::Xmm0.into(), &Gpr::Eax.into()).unwrap();
        assert_eq!(&*load, &[0x66, 0x0F, 0x6E, 0xC0]);
        let store = encode_movd(&Gpr::Ecx.disp(4).into(), &Mmx::Mm2.into()).unwrap();
        assert_eq!(&*store, &[0x0F, 0x7E, 0x51, 0x04]);
        assert!(encode_movd(&Xmm::Xmm0.into(), &Xmm::Xmm1.into()).is_err());
        assert!(encode_movd(&Gpr::Eax.into(), &Gpr::Ecx.into()).is_err());
    }

    #[test]
    fn alu_imm_sizes() {
        let short = encode_alu_imm("add", 0, &Gpr::Eax.into(), 1).unwrap();
        assert_eq!(&*short, &[0x83, 0xC0, 0x01]);
        let long = encode_alu_imm("sub", 5, &Gpr::Esp.into(), 0x200).unwrap();
        assert_eq!(&*long, &[0x81, 0xEC, 0x00, 0x02, 0x00, 0x00]);
    }

    #[test]
    fn x87_arith_forms() {
        let to_top = encode_x87_arith(&x86::FSUB, &St::St0.into(), &St::St2.into()).unwrap();
        assert_eq!(&*to_top, &[0xD8, 0xE2]);
        let from_top = encode_x87_arith(&x86::FSUB, &St::St1.into(), &St::St0.into()).unwrap();
        assert_eq!(&*from_top, &[0xDC, 0xE9]);
        let mem = encode_x87_arith(&x86::FSUB, &St::St0.into(), &Gpr::Edx.disp(8).into()).unwrap();
        assert_eq!(&*mem, &[0xD8, 0x62, 0x08]);
        let both = encode_x87_arith(&x86::FADD, &St::St0.into(), &St::St0.into()).unwrap();
        assert_eq!(&*both, &[0xD8, 0xC0]);
    }

    #[test]
    fn x87_arith_needs_top_of_stack() {
        let err = encode_x87_arith(&x86::FADD, &St::St1.into(), &St::St2.into()).unwrap_err();
        assert!(err.is_contract_violation());
        let err =
            encode_x87_arith(&x86::FADD, &Gpr::Eax.deref().into(), &St::St0.into()).unwrap_err();
        assert!(err.is_contract_violation());
        let err = encode_x87_arith(&x86::FADD, &St::St0.into(), &Xmm::Xmm0.into()).unwrap_err();
        assert!(err.is_contract_violation());
    }

    #[test]
    fn movd_rejects_x87_register() {
        assert!(encode_movd(&St::St0.into(), &Gpr::Eax.into()).is_err());
    }

    #[test]
    fn format_listing_text() {
        let text = format_instruction("addps", &[Xmm::Xmm0.into(), Gpr::Ecx.disp(16).into()]);
        assert_eq!(text, "addps xmm0, [ecx+0x10]");
        assert_eq!(format_instruction("ret", &[]), "ret");
    }
}
