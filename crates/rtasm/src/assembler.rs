//! Public assembler API: an owned builder that emits one instruction per
//! call into a fixed-capacity buffer.
//!
//! Every emission method encodes the complete instruction first, then
//! checks capacity, then appends. On error nothing is written and the
//! builder stays usable.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::encoder::{self, InstrBytes};
use crate::error::AsmError;
use crate::ir::*;
use crate::linker::{self, AppliedFixup, BranchKind, Fixup, Label, Linker};
use crate::x86;

/// Buffer capacity used by [`Assembler::new`].
pub const DEFAULT_CAPACITY: usize = 4096;

/// The result of a successful [`Assembler::finish`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct AssemblyResult {
    /// The emitted machine code.
    bytes: Vec<u8>,
    /// Mode the code was emitted for.
    mode: X86Mode,
    /// Forward branches and where they were patched to.
    fixups: Vec<AppliedFixup>,
    /// `(offset, instruction text)` per instruction, when listing is enabled.
    annotations: Vec<(usize, String)>,
}

impl AssemblyResult {
    /// Get the emitted bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use rtasm::{Assembler, X86Mode};
    ///
    /// let mut asm = Assembler::new(X86Mode::Mode32);
    /// asm.ret()?;
    /// let result = asm.finish()?;
    /// assert_eq!(result.bytes(), &[0xC3]);
    /// # Ok::<(), rtasm::AsmError>(())
    /// ```
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume and return the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Get the byte count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the result is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Mode the code was emitted for.
    #[must_use]
    pub fn mode(&self) -> X86Mode {
        self.mode
    }

    /// Forward branches that were patched, in resolution order.
    #[must_use]
    pub fn fixups(&self) -> &[AppliedFixup] {
        &self.fixups
    }

    /// Produce a human-readable listing of offset, hex bytes, and
    /// instruction text.
    ///
    /// Empty unless [`Assembler::enable_listing`] was called before
    /// emission. Rows whose offsets fall outside the bytes are skipped.
    ///
    /// # Example output
    ///
    /// ```text
    /// 00000000  8B4C2404          mov ecx, [esp+0x4]
    /// 00000004  C3                ret
    /// ```
    #[must_use]
    pub fn listing(&self) -> String {
        use core::fmt::Write;

        let mut out = String::new();
        for (i, (offset, text)) in self.annotations.iter().enumerate() {
            let end = self
                .annotations
                .get(i + 1)
                .map_or(self.bytes.len(), |(next, _)| (*next).min(self.bytes.len()));
            let Some(bytes) = self.bytes.get(*offset..end) else {
                continue;
            };
            let hex: String = bytes
                .iter()
                .fold(String::new(), |mut acc, b| {
                    let _ = write!(acc, "{:02X}", b);
                    acc
                });
            let _ = writeln!(out, "{:08X}  {:<16}  {}", offset, hex, text);
        }
        out
    }
}

/// Builder-pattern runtime assembler.
///
/// Owns the output buffer for one generation pass. Registers are assigned
/// by the caller; the assembler only encodes.
///
/// # Examples
///
/// ```rust
/// use rtasm::{Assembler, Gpr, X86Mode};
///
/// let mut asm = Assembler::new(X86Mode::Mode32);
/// asm.mov(Gpr::Eax, asm.argument(1)?)?;
/// asm.add_imm(Gpr::Eax, 1)?;
/// asm.ret()?;
/// let result = asm.finish()?;
/// assert_eq!(result.bytes(), &[0x8B, 0x44, 0x24, 0x04, 0x83, 0xC0, 0x01, 0xC3]);
/// # Ok::<(), rtasm::AsmError>(())
/// ```
#[derive(Debug)]
pub struct Assembler {
    mode: X86Mode,
    /// Hard upper bound on emitted bytes.
    capacity: usize,
    code: Vec<u8>,
    /// Stack words pushed since function entry.
    pushed_words: usize,
    /// An MMX instruction ran and no `emms` followed yet.
    mmx_pending: bool,
    /// The last instruction transfers control out (ret or jmp).
    terminated: bool,
    linker: Linker,
    listing_enabled: bool,
    annotations: Vec<(usize, String)>,
}

macro_rules! simd_ops {
    ($($(#[$doc:meta])* $name:ident => $op:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(
                &mut self,
                dst: impl Into<Operand>,
                src: impl Into<Operand>,
            ) -> Result<&mut Self, AsmError> {
                let (dst, src) = (dst.into(), src.into());
                let bytes = encoder::encode_simd(&$op, &dst, &src)?;
                self.commit_simd(&bytes, $op.mnemonic, &[dst, src])
            }
        )*
    };
}

macro_rules! alu_ops {
    ($($(#[$doc:meta])* $name:ident, $imm_name:ident => $op:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(
                &mut self,
                dst: impl Into<Operand>,
                src: impl Into<Operand>,
            ) -> Result<&mut Self, AsmError> {
                let (dst, src) = (dst.into(), src.into());
                let bytes =
                    encoder::encode_gp_dual($op.mnemonic, $op.reg_form, $op.mem_form, &dst, &src, false)?;
                self.commit(&bytes, $op.mnemonic, &[dst, src])
            }

            #[doc = concat!("`", stringify!($name), " dst, imm`, using the sign-extended 8-bit immediate form when it fits.")]
            pub fn $imm_name(&mut self, dst: impl Into<Operand>, imm: i32) -> Result<&mut Self, AsmError> {
                let dst = dst.into();
                let bytes = encoder::encode_alu_imm($op.mnemonic, $op.digit, &dst, imm)?;
                self.commit_text(&bytes, || format!("{} {}, {:#x}", $op.mnemonic, dst, imm))
            }
        )*
    };
}

macro_rules! x87_arith {
    ($($(#[$doc:meta])* $name:ident, $pop_name:ident => $op:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(
                &mut self,
                dst: impl Into<Operand>,
                src: impl Into<Operand>,
            ) -> Result<&mut Self, AsmError> {
                let (dst, src) = (dst.into(), src.into());
                let bytes = encoder::encode_x87_arith(&$op, &dst, &src)?;
                self.commit_x87(&bytes, $op.mnemonic, &[dst, src])
            }

            #[doc = concat!("`", stringify!($pop_name), " st(i)`: `", stringify!($name), " st(i), st(0)`, then pop.")]
            pub fn $pop_name(&mut self, st: impl Into<Operand>) -> Result<&mut Self, AsmError> {
                self.x87_st($op.pop_mnemonic, $op.pop.0, $op.pop.1, st.into())
            }
        )*
    };
}

macro_rules! x87_fcmov {
    ($($(#[$doc:meta])* $name:ident => $op:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self, st: impl Into<Operand>) -> Result<&mut Self, AsmError> {
                let (mnemonic, opcode, base) = $op;
                self.x87_st(mnemonic, opcode, base, st.into())
            }
        )*
    };
}

macro_rules! x87_fixed {
    ($($(#[$doc:meta])* $name:ident => $op:expr;)*) => {
        $(
            $(#[$doc])*
            pub fn $name(&mut self) -> Result<&mut Self, AsmError> {
                self.commit_x87(&InstrBytes::from_slice(&$op), stringify!($name), &[])
            }
        )*
    };
}

impl Assembler {
    /// Create an assembler with [`DEFAULT_CAPACITY`] bytes of room.
    pub fn new(mode: X86Mode) -> Self {
        Self::with_capacity(mode, DEFAULT_CAPACITY)
    }

    /// Create an assembler that refuses to emit more than `capacity` bytes.
    pub fn with_capacity(mode: X86Mode, capacity: usize) -> Self {
        Self {
            mode,
            capacity,
            code: Vec::with_capacity(capacity),
            pushed_words: 0,
            mmx_pending: false,
            terminated: false,
            linker: Linker::new(),
            listing_enabled: false,
            annotations: Vec::new(),
        }
    }

    /// Record instruction text for [`AssemblyResult::listing`].
    ///
    /// Off by default to avoid a per-instruction `String` allocation.
    pub fn enable_listing(&mut self) -> &mut Self {
        self.listing_enabled = true;
        self
    }

    /// Discard everything emitted so far. Mode, capacity, and listing are
    /// configuration and survive the reset.
    pub fn reset(&mut self) -> &mut Self {
        self.code.clear();
        self.pushed_words = 0;
        self.mmx_pending = false;
        self.terminated = false;
        self.linker = Linker::new();
        self.annotations.clear();
        self
    }

    /// Encoding mode.
    #[must_use]
    pub fn mode(&self) -> X86Mode {
        self.mode
    }

    /// Maximum number of bytes this assembler will emit.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current write position (bytes emitted so far).
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Whether nothing has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Bytes still free.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.capacity - self.code.len()
    }

    /// The bytes emitted so far. Forward branches read as zero until
    /// resolved.
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Stack words pushed since entry.
    #[must_use]
    pub fn pushed_words(&self) -> usize {
        self.pushed_words
    }

    /// Whether MMX state is open and needs [`Assembler::emms`].
    #[must_use]
    pub fn mmx_pending(&self) -> bool {
        self.mmx_pending
    }

    fn commit_text(
        &mut self,
        bytes: &InstrBytes,
        text: impl FnOnce() -> String,
    ) -> Result<&mut Self, AsmError> {
        let available = self.remaining();
        if bytes.len() > available {
            return Err(AsmError::CapacityExceeded {
                needed: bytes.len(),
                available,
            });
        }
        if self.listing_enabled {
            self.annotations.push((self.code.len(), text()));
        }
        self.code.extend_from_slice(bytes);
        self.terminated = false;
        Ok(self)
    }

    fn commit(
        &mut self,
        bytes: &InstrBytes,
        mnemonic: &str,
        ops: &[Operand],
    ) -> Result<&mut Self, AsmError> {
        self.commit_text(bytes, || encoder::format_instruction(mnemonic, ops))
    }

    fn commit_simd(
        &mut self,
        bytes: &InstrBytes,
        mnemonic: &str,
        ops: &[Operand],
    ) -> Result<&mut Self, AsmError> {
        self.commit(bytes, mnemonic, ops)?;
        let touches_mmx = ops
            .iter()
            .any(|op| op.as_register().map(Register::class) == Some(RegClass::Mmx));
        if touches_mmx {
            self.mmx_pending = true;
        }
        Ok(self)
    }

    fn commit_x87(
        &mut self,
        bytes: &InstrBytes,
        mnemonic: &str,
        ops: &[Operand],
    ) -> Result<&mut Self, AsmError> {
        if self.mmx_pending {
            return Err(AsmError::contract(format!(
                "{}: MMX state is open and aliases the x87 stack; emit emms first",
                mnemonic
            )));
        }
        self.commit(bytes, mnemonic, ops)
    }

    fn gp_register(mnemonic: &str, op: &Operand) -> Result<Gpr, AsmError> {
        op.as_register().and_then(Register::as_gp).ok_or_else(|| {
            AsmError::contract(format!(
                "{}: operand must be a general-purpose register, got {}",
                mnemonic, op
            ))
        })
    }

    // ─── Stack and arguments ──────────────────────────────

    /// `push reg` (`50+r`). Counts one stack word.
    ///
    /// # Errors
    ///
    /// [`AsmError::ContractViolation`] unless `reg` is a general-purpose
    /// register.
    pub fn push(&mut self, reg: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        let op = reg.into();
        let reg = Self::gp_register("push", &op)?;
        self.commit(&InstrBytes::from_slice(&[x86::PUSH + reg.base_code()]), "push", &[op])?;
        self.pushed_words += 1;
        Ok(self)
    }

    /// `pop reg` (`58+r`). Releases one stack word.
    ///
    /// # Errors
    ///
    /// [`AsmError::ContractViolation`] unless `reg` is a general-purpose
    /// register, or if nothing was pushed.
    pub fn pop(&mut self, reg: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        let op = reg.into();
        let reg = Self::gp_register("pop", &op)?;
        if self.pushed_words == 0 {
            return Err(AsmError::contract("pop without a matching push"));
        }
        self.commit(&InstrBytes::from_slice(&[x86::POP + reg.base_code()]), "pop", &[op])?;
        self.pushed_words -= 1;
        Ok(self)
    }

    /// `push imm32` (`68 id`). Counts one stack word.
    pub fn push_imm32(&mut self, imm: i32) -> Result<&mut Self, AsmError> {
        let mut bytes = InstrBytes::from_slice(&[x86::PUSH_IMM32]);
        bytes.extend_from_slice(&imm.to_le_bytes());
        self.commit_text(&bytes, || format!("push {:#x}", imm))?;
        self.pushed_words += 1;
        Ok(self)
    }

    /// Push the cdecl caller-saved registers EAX, ECX, EDX.
    pub fn save_caller_saved(&mut self) -> Result<&mut Self, AsmError> {
        self.push(Gpr::Eax)?.push(Gpr::Ecx)?.push(Gpr::Edx)
    }

    /// Pop the registers pushed by [`Assembler::save_caller_saved`].
    pub fn restore_caller_saved(&mut self) -> Result<&mut Self, AsmError> {
        self.pop(Gpr::Edx)?.pop(Gpr::Ecx)?.pop(Gpr::Eax)
    }

    /// Stack slot `index` as seen from the current instruction:
    /// `[esp + (pushed_words + index) * word]`.
    ///
    /// Index 0 is the return address, index 1 the first stack argument.
    /// The operand reflects the pushes and pops emitted so far, so call
    /// this again after changing the stack.
    ///
    /// # Errors
    ///
    /// [`AsmError::ContractViolation`] if the offset overflows 32 bits.
    pub fn argument(&self, index: u32) -> Result<MemoryOperand, AsmError> {
        let word = i64::from(self.mode.word_size());
        let slot = self.pushed_words as i64 + i64::from(index);
        let disp = i32::try_from(slot * word).map_err(|_| {
            AsmError::contract(format!("argument {} is beyond the 32-bit stack window", index))
        })?;
        Ok(Gpr::Esp.disp(disp))
    }

    // ─── General-purpose ──────────────────────────────

    /// `mov dst, src` (`8B /r` or `89 /r`).
    pub fn mov(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes =
            encoder::encode_gp_dual("mov", x86::MOV_LOAD, x86::MOV_STORE, &dst, &src, false)?;
        self.commit(&bytes, "mov", &[dst, src])
    }

    /// Pointer-sized `mov`. Identical to [`Assembler::mov`] in 32-bit
    /// mode; carries `REX.W` in 64-bit mode.
    pub fn mov_ptr(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let wide = self.mode == X86Mode::Mode64;
        let bytes =
            encoder::encode_gp_dual("mov", x86::MOV_LOAD, x86::MOV_STORE, &dst, &src, wide)?;
        self.commit(&bytes, "mov", &[dst, src])
    }

    /// `mov dst, imm32`.
    pub fn mov_imm(&mut self, dst: impl Into<Operand>, imm: i32) -> Result<&mut Self, AsmError> {
        let dst = dst.into();
        let bytes = encoder::encode_mov_imm(&dst, imm)?;
        self.commit_text(&bytes, || format!("mov {}, {:#x}", dst, imm))
    }

    /// `lea dst, [mem]`. Address-sized: carries `REX.W` in 64-bit mode.
    pub fn lea(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_lea(&dst, &src, self.mode == X86Mode::Mode64)?;
        self.commit(&bytes, "lea", &[dst, src])
    }

    alu_ops! {
        /// `add dst, src`.
        add, add_imm => x86::ADD;
        /// `or dst, src`.
        or, or_imm => x86::OR;
        /// `and dst, src`.
        and, and_imm => x86::AND;
        /// `sub dst, src`.
        sub, sub_imm => x86::SUB;
        /// `xor dst, src`.
        xor, xor_imm => x86::XOR;
        /// `cmp dst, src`.
        cmp, cmp_imm => x86::CMP;
    }

    /// `test dst, src` (`85 /r`).
    pub fn test(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_gp_dual("test", x86::TEST, x86::TEST, &dst, &src, false)?;
        self.commit(&bytes, "test", &[dst, src])
    }

    /// `mul src`: EDX:EAX = EAX * src, unsigned.
    pub fn mul(&mut self, src: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        let src = src.into();
        let bytes = encoder::encode_gp_digit("mul", x86::GROUP3, x86::GROUP3_MUL, &src)?;
        self.commit(&bytes, "mul", &[src])
    }

    /// `inc reg`: one byte (`40+r`) in 32-bit mode, `FF /0` in 64-bit mode.
    pub fn inc(&mut self, reg: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.inc_dec("inc", x86::INC, x86::GROUP5_INC, reg.into())
    }

    /// `dec reg`: one byte (`48+r`) in 32-bit mode, `FF /1` in 64-bit mode.
    pub fn dec(&mut self, reg: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.inc_dec("dec", x86::DEC, x86::GROUP5_DEC, reg.into())
    }

    fn inc_dec(
        &mut self,
        mnemonic: &str,
        short: u8,
        digit: u8,
        op: Operand,
    ) -> Result<&mut Self, AsmError> {
        let reg = Self::gp_register(mnemonic, &op)?;
        let bytes = match self.mode {
            X86Mode::Mode32 => InstrBytes::from_slice(&[short + reg.base_code()]),
            X86Mode::Mode64 => encoder::encode_gp_digit(mnemonic, x86::GROUP5, digit, &op)?,
        };
        self.commit(&bytes, mnemonic, &[op])
    }

    /// `call target` through a register or memory operand (`FF /2`).
    pub fn call(&mut self, target: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        let target = target.into();
        let bytes = encoder::encode_gp_digit("call", x86::GROUP5, x86::GROUP5_CALL, &target)?;
        self.commit(&bytes, "call", &[target])
    }

    /// `ret` (`C3`).
    pub fn ret(&mut self) -> Result<&mut Self, AsmError> {
        self.commit(&InstrBytes::from_slice(&[x86::RET]), "ret", &[])?;
        self.terminated = true;
        Ok(self)
    }

    /// `ret imm16` (`C2 iw`): return and release `imm` bytes of stack
    /// arguments (callee-cleanup conventions).
    pub fn ret_imm16(&mut self, imm: u16) -> Result<&mut Self, AsmError> {
        let mut bytes = InstrBytes::from_slice(&[x86::RET_IMM16]);
        bytes.extend_from_slice(&imm.to_le_bytes());
        self.commit_text(&bytes, || format!("ret {:#x}", imm))?;
        self.terminated = true;
        Ok(self)
    }

    // ─── Labels and branches ──────────────────────────────

    /// The current position as a branch target.
    #[must_use]
    pub fn label(&self) -> Label {
        Label::new(self.code.len())
    }

    fn branch_back(
        &mut self,
        kind: BranchKind,
        mnemonic: &str,
        target: Label,
    ) -> Result<&mut Self, AsmError> {
        let bytes = linker::encode_backward(kind, self.code.len(), target)?;
        self.commit_text(&bytes, || format!("{} {:#x}", mnemonic, target.offset()))?;
        self.linker.note_target(target.offset());
        Ok(self)
    }

    fn branch_forward(&mut self, kind: BranchKind, mnemonic: &str) -> Result<Fixup, AsmError> {
        let bytes = linker::encode_forward(kind);
        self.commit_text(&bytes, || format!("{} <forward>", mnemonic))?;
        Ok(self.linker.open(self.code.len()))
    }

    /// Conditional branch to an already-emitted `target`: 2 bytes when
    /// the displacement fits a signed byte, 6 bytes otherwise.
    pub fn jcc(&mut self, cond: Cond, target: Label) -> Result<&mut Self, AsmError> {
        self.branch_back(BranchKind::Jcc(cond), jcc_mnemonic(cond), target)
    }

    /// Conditional branch to a position not yet emitted. Always 6 bytes;
    /// resolve the returned token with [`Assembler::fixup_forward`].
    pub fn jcc_forward(&mut self, cond: Cond) -> Result<Fixup, AsmError> {
        self.branch_forward(BranchKind::Jcc(cond), jcc_mnemonic(cond))
    }

    /// Unconditional jump to an already-emitted `target` (2 or 5 bytes).
    pub fn jmp(&mut self, target: Label) -> Result<&mut Self, AsmError> {
        self.branch_back(BranchKind::Jmp, "jmp", target)?;
        self.terminated = true;
        Ok(self)
    }

    /// Unconditional jump to a position not yet emitted (5 bytes).
    pub fn jmp_forward(&mut self) -> Result<Fixup, AsmError> {
        let fixup = self.branch_forward(BranchKind::Jmp, "jmp")?;
        self.terminated = true;
        Ok(fixup)
    }

    /// Land the forward branch `fixup` at the current position.
    ///
    /// # Errors
    ///
    /// [`AsmError::ContractViolation`] if `fixup` is not an outstanding
    /// branch of this assembler.
    pub fn fixup_forward(&mut self, fixup: Fixup) -> Result<&mut Self, AsmError> {
        let target = self.code.len();
        self.linker.resolve(&mut self.code, fixup, target)?;
        Ok(self)
    }

    // ─── SIMD moves ──────────────────────────────

    fn simd_move(
        &mut self,
        op: &x86::MoveOp,
        dst: Operand,
        src: Operand,
    ) -> Result<&mut Self, AsmError> {
        let bytes = encoder::encode_simd_move(op, &dst, &src)?;
        self.commit_simd(&bytes, op.mnemonic, &[dst, src])
    }

    /// `movaps`: aligned 128-bit load, store, or register copy.
    pub fn movaps(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        self.simd_move(&x86::MOVAPS, dst.into(), src.into())
    }

    /// `movups`: unaligned 128-bit load, store, or register copy.
    pub fn movups(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        self.simd_move(&x86::MOVUPS, dst.into(), src.into())
    }

    /// `movss`: low-lane single-precision move.
    pub fn movss(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        self.simd_move(&x86::MOVSS, dst.into(), src.into())
    }

    /// `movlps`: low 64 bits to or from memory.
    pub fn movlps(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        self.simd_move(&x86::MOVLPS, dst.into(), src.into())
    }

    /// `movhps`: high 64 bits to or from memory.
    pub fn movhps(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        self.simd_move(&x86::MOVHPS, dst.into(), src.into())
    }

    /// `movq`: 64-bit move on MMX or the low half of an XMM register.
    pub fn movq(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        self.simd_move(&x86::MOVQ, dst.into(), src.into())
    }

    /// `movd`: 32-bit move between a SIMD register and a general-purpose
    /// register or memory.
    pub fn movd(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_movd(&dst, &src)?;
        self.commit_simd(&bytes, "movd", &[dst, src])
    }

    /// `movhlps`: high half of `src` into the low half of `dst`.
    pub fn movhlps(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_simd_rr(&x86::MOVHLPS, &dst, &src)?;
        self.commit(&bytes, "movhlps", &[dst, src])
    }

    /// `movlhps`: low half of `src` into the high half of `dst`.
    pub fn movlhps(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_simd_rr(&x86::MOVLHPS, &dst, &src)?;
        self.commit(&bytes, "movlhps", &[dst, src])
    }

    /// `movmskps`: lane sign bits of an XMM register into a
    /// general-purpose register.
    pub fn movmskps(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_movmsk(&x86::MOVMSKPS, &dst, &src)?;
        self.commit(&bytes, "movmskps", &[dst, src])
    }

    /// `pmovmskb`: byte sign bits of an MMX or XMM register.
    pub fn pmovmskb(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_movmsk(&x86::PMOVMSKB, &dst, &src)?;
        self.commit_simd(&bytes, "pmovmskb", &[dst, src])
    }

    // ─── SIMD arithmetic ──────────────────────────────

    simd_ops! {
        /// Packed single-precision add.
        addps => x86::ADDPS;
        /// Scalar single-precision add.
        addss => x86::ADDSS;
        /// Packed single-precision subtract.
        subps => x86::SUBPS;
        /// Scalar single-precision subtract.
        subss => x86::SUBSS;
        /// Packed single-precision multiply.
        mulps => x86::MULPS;
        /// Scalar single-precision multiply.
        mulss => x86::MULSS;
        /// Packed single-precision divide.
        divps => x86::DIVPS;
        /// Scalar single-precision divide.
        divss => x86::DIVSS;
        /// Packed single-precision minimum.
        minps => x86::MINPS;
        /// Scalar single-precision minimum.
        minss => x86::MINSS;
        /// Packed single-precision maximum.
        maxps => x86::MAXPS;
        /// Scalar single-precision maximum.
        maxss => x86::MAXSS;
        /// Packed square root.
        sqrtps => x86::SQRTPS;
        /// Scalar square root.
        sqrtss => x86::SQRTSS;
        /// Packed reciprocal estimate.
        rcpps => x86::RCPPS;
        /// Scalar reciprocal estimate.
        rcpss => x86::RCPSS;
        /// Packed reciprocal square-root estimate.
        rsqrtps => x86::RSQRTPS;
        /// Scalar reciprocal square-root estimate.
        rsqrtss => x86::RSQRTSS;
        /// Packed bitwise and.
        andps => x86::ANDPS;
        /// Packed bitwise and-not (`!dst & src`).
        andnps => x86::ANDNPS;
        /// Packed bitwise or.
        orps => x86::ORPS;
        /// Packed bitwise xor.
        xorps => x86::XORPS;
        /// Interleave the low halves of `dst` and `src`.
        unpcklps => x86::UNPCKLPS;
        /// Interleave the high halves of `dst` and `src`.
        unpckhps => x86::UNPCKHPS;
        /// Float to 32-bit integer, current rounding mode.
        cvtps2dq => x86::CVTPS2DQ;
        /// Float to 32-bit integer, truncating.
        cvttps2dq => x86::CVTTPS2DQ;
        /// 32-bit integer to float.
        cvtdq2ps => x86::CVTDQ2PS;
        /// Pack dwords to words with signed saturation (MMX or XMM).
        packssdw => x86::PACKSSDW;
        /// Pack words to bytes with signed saturation (MMX or XMM).
        packsswb => x86::PACKSSWB;
        /// Pack words to bytes with unsigned saturation (MMX or XMM).
        packuswb => x86::PACKUSWB;
        /// Interleave low bytes (MMX or XMM).
        punpcklbw => x86::PUNPCKLBW;
        /// Interleave high bytes (MMX or XMM).
        punpckhbw => x86::PUNPCKHBW;
    }

    /// `shufps dst, src, control`: lanes 0–1 from `dst`, lanes 2–3 from
    /// `src`, chosen by the 2-bit fields of `control` (see
    /// [`crate::shuffle`]).
    pub fn shufps(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
        control: u8,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_simd_imm(&x86::SHUFPS, &dst, &src, control)?;
        self.commit_text(&bytes, || format!("shufps {}, {}, {:#04x}", dst, src, control))
    }

    /// `pshufd dst, src, control`: dword shuffle of `src`.
    pub fn pshufd(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
        control: u8,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_simd_imm(&x86::PSHUFD, &dst, &src, control)?;
        self.commit_text(&bytes, || format!("pshufd {}, {}, {:#04x}", dst, src, control))
    }

    /// `cmpps dst, src, predicate`: per-lane compare producing all-ones or
    /// all-zeros masks.
    pub fn cmpps(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
        predicate: CmpPredicate,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_simd_imm(&x86::CMPPS, &dst, &src, predicate as u8)?;
        self.commit_text(&bytes, || format!("cmpps {}, {}, {:?}", dst, src, predicate))
    }

    /// `cmpss dst, src, predicate`: low-lane compare.
    pub fn cmpss(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
        predicate: CmpPredicate,
    ) -> Result<&mut Self, AsmError> {
        let (dst, src) = (dst.into(), src.into());
        let bytes = encoder::encode_simd_imm(&x86::CMPSS, &dst, &src, predicate as u8)?;
        self.commit_text(&bytes, || format!("cmpss {}, {}, {:?}", dst, src, predicate))
    }

    /// `prefetch{hint} [mem]`.
    pub fn prefetch(
        &mut self,
        hint: PrefetchHint,
        mem: impl Into<Operand>,
    ) -> Result<&mut Self, AsmError> {
        let mem = mem.into();
        encoder::expect_mem("prefetch", "operand", &mem)?;
        let mut bytes = InstrBytes::from_slice(&x86::PREFETCH);
        encoder::emit_addressing(&mut bytes, hint as u8, &mem);
        self.commit_text(&bytes, || format!("prefetch{:?} {}", hint, mem).to_lowercase())
    }

    /// `emms`: leave MMX state so x87 code can run again.
    pub fn emms(&mut self) -> Result<&mut Self, AsmError> {
        self.commit(&InstrBytes::from_slice(&x86::EMMS), "emms", &[])?;
        self.mmx_pending = false;
        Ok(self)
    }

    // ─── x87 ──────────────────────────────

    /// `st(i)` through `st_form`, or memory through `mem_form`.
    fn x87_st_or_mem(
        &mut self,
        mnemonic: &str,
        op: Operand,
        st_form: (u8, u8),
        mem_form: (u8, u8),
    ) -> Result<&mut Self, AsmError> {
        let bytes = match op {
            Operand::Register(Register::St(st)) => {
                encoder::encode_x87_st(st_form.0, st_form.1, st)
            }
            Operand::Memory(_) => {
                encoder::encode_x87_mem(mnemonic, mem_form.0, mem_form.1, &op)?
            }
            Operand::Register(_) => {
                return Err(AsmError::contract(format!(
                    "{}: operand must be an x87 stack register or memory, got {}",
                    mnemonic, op
                )))
            }
        };
        self.commit_x87(&bytes, mnemonic, &[op])
    }

    fn x87_mem(
        &mut self,
        mnemonic: &str,
        opcode: u8,
        digit: u8,
        mem: Operand,
    ) -> Result<&mut Self, AsmError> {
        let bytes = encoder::encode_x87_mem(mnemonic, opcode, digit, &mem)?;
        self.commit_x87(&bytes, mnemonic, &[mem])
    }

    fn x87_st(
        &mut self,
        mnemonic: &str,
        opcode: u8,
        base: u8,
        st: Operand,
    ) -> Result<&mut Self, AsmError> {
        let reg = encoder::expect_st(mnemonic, "operand", &st)?;
        self.commit_x87(&encoder::encode_x87_st(opcode, base, reg), mnemonic, &[st])
    }

    /// `fld src`: push `st(i)` (`D9 C0+i`) or an m32fp value (`D9 /0`).
    pub fn fld(&mut self, src: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_st_or_mem(
            "fld",
            src.into(),
            (x86::FPU_D9, x86::FLD_ST),
            (x86::FPU_D9, x86::FLD_M32),
        )
    }

    /// `fst dst`: copy `st(0)` to `st(i)` (`DD D0+i`) or to m32fp (`D9 /2`).
    pub fn fst(&mut self, dst: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_st_or_mem(
            "fst",
            dst.into(),
            (x86::FPU_DD, x86::FST_ST),
            (x86::FPU_D9, x86::FST_M32),
        )
    }

    /// `fstp dst`: like [`Assembler::fst`], then pop.
    pub fn fstp(&mut self, dst: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_st_or_mem(
            "fstp",
            dst.into(),
            (x86::FPU_DD, x86::FSTP_ST),
            (x86::FPU_D9, x86::FSTP_M32),
        )
    }

    /// Discard `st(0)`: `fstp st(0)`.
    pub fn fpop(&mut self) -> Result<&mut Self, AsmError> {
        self.fstp(St::St0)
    }

    /// `fild m32int`: push a 32-bit integer.
    pub fn fild(&mut self, src: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_mem("fild", x86::FPU_DB, x86::FILD_M32, src.into())
    }

    /// `fist m32int`: store `st(0)` rounded by the control word.
    pub fn fist(&mut self, dst: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_mem("fist", x86::FPU_DB, x86::FIST_M32, dst.into())
    }

    /// `fistp m32int`: like [`Assembler::fist`], then pop.
    pub fn fistp(&mut self, dst: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_mem("fistp", x86::FPU_DB, x86::FISTP_M32, dst.into())
    }

    /// `fldcw m16`: load the control word.
    pub fn fldcw(&mut self, src: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_mem("fldcw", x86::FPU_D9, x86::FLDCW, src.into())
    }

    /// `fnstcw m16`: store the control word without checking exceptions.
    pub fn fnstcw(&mut self, dst: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_mem("fnstcw", x86::FPU_D9, x86::FNSTCW, dst.into())
    }

    /// `fxch st(i)`: swap with the top of the stack.
    pub fn fxch(&mut self, st: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_st("fxch", x86::FPU_D9, x86::FXCH_ST, st.into())
    }

    /// `fcomi st(0), st(i)`: ordered compare into ZF, PF, CF.
    pub fn fcomi(&mut self, st: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_st("fcomi", x86::FPU_DB, x86::FCOMI_ST, st.into())
    }

    /// `fucomi st(0), st(i)`: unordered compare into ZF, PF, CF.
    pub fn fucomi(&mut self, st: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_st("fucomi", x86::FPU_DB, x86::FUCOMI_ST, st.into())
    }

    /// `fcomip st(0), st(i)`: [`Assembler::fcomi`], then pop.
    pub fn fcomip(&mut self, st: impl Into<Operand>) -> Result<&mut Self, AsmError> {
        self.x87_st("fcomip", x86::FCOMIP[0], x86::FCOMIP[1], st.into())
    }

    x87_arith! {
        /// `fadd`: `st(0) += st(i)`, `st(i) += st(0)`, or `st(0) += m32fp`.
        fadd, faddp => x86::FADD;
        /// `fmul`: as [`Assembler::fadd`], multiplying.
        fmul, fmulp => x86::FMUL;
        /// `fsub`: `dst -= src`.
        fsub, fsubp => x86::FSUB;
        /// `fsubr`: `dst = src - dst`.
        fsubr, fsubrp => x86::FSUBR;
        /// `fdiv`: `dst /= src`.
        fdiv, fdivp => x86::FDIV;
        /// `fdivr`: `dst = src / dst`.
        fdivr, fdivrp => x86::FDIVR;
    }

    x87_fcmov! {
        /// Move `st(i)` to `st(0)` if below (CF=1).
        fcmovb => x86::FCMOVB;
        /// Move if equal (ZF=1).
        fcmove => x86::FCMOVE;
        /// Move if below or equal (CF=1 or ZF=1).
        fcmovbe => x86::FCMOVBE;
        /// Move if unordered (PF=1).
        fcmovu => x86::FCMOVU;
        /// Move if not below (CF=0).
        fcmovnb => x86::FCMOVNB;
        /// Move if not equal (ZF=0).
        fcmovne => x86::FCMOVNE;
        /// Move if not below or equal (CF=0 and ZF=0).
        fcmovnbe => x86::FCMOVNBE;
        /// Move if not unordered (PF=0).
        fcmovnu => x86::FCMOVNU;
    }

    x87_fixed! {
        /// Negate `st(0)`.
        fchs => x86::FCHS;
        /// Absolute value of `st(0)`.
        fabs => x86::FABS;
        /// Push +1.0.
        fld1 => x86::FLD1;
        /// Push +0.0.
        fldz => x86::FLDZ;
        /// `st(0) = 2^st(0) - 1`, for `st(0)` in `-1..=1`.
        f2xm1 => x86::F2XM1;
        /// `st(1) = st(1) * log2(st(0))`, then pop.
        fyl2x => x86::FYL2X;
        /// Split `st(0)` into exponent (left in `st(1)`) and significand.
        fxtract => x86::FXTRACT;
        /// Round `st(0)` to an integer using the control word.
        fprndint => x86::FPRNDINT;
        /// `st(0) = st(0) * 2^trunc(st(1))`.
        fscale => x86::FSCALE;
        /// Sine of `st(0)`.
        fsin => x86::FSIN;
        /// Cosine of `st(0)`.
        fcos => x86::FCOS;
        /// Clear floating-point exception flags without checking them.
        fnclex => x86::FNCLEX;
    }

    // ─── Finalization ──────────────────────────────

    /// Check that the emitted sequence can be handed out as a function.
    fn validate(&self) -> Result<(), AsmError> {
        let outstanding = self.linker.outstanding();
        let err = if outstanding > 0 {
            Some(AsmError::contract(format!(
                "{} forward branch(es) never resolved",
                outstanding
            )))
        } else if self.mmx_pending {
            Some(AsmError::contract("MMX state still open; emit emms first"))
        } else if !self.code.is_empty() && !self.terminated {
            Some(AsmError::contract(
                "code does not end with ret or an unconditional jump",
            ))
        } else if let Some(target) = self.linker.max_target().filter(|&t| t >= self.code.len()) {
            Some(AsmError::contract(format!(
                "branch target {} is past the end of the code ({} bytes)",
                target,
                self.code.len()
            )))
        } else {
            None
        };
        match err {
            Some(err) => {
                tracing::warn!(error = %err, "rejecting emitted code");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Finish emission and return the bytes.
    ///
    /// # Errors
    ///
    /// [`AsmError::ContractViolation`] if forward branches are unresolved,
    /// MMX state is open, the code does not end in `ret`/`jmp`, or a branch
    /// lands past the end.
    pub fn finish(self) -> Result<AssemblyResult, AsmError> {
        self.validate()?;
        tracing::debug!(bytes = self.code.len(), mode = %self.mode, "finished emission");
        Ok(AssemblyResult {
            bytes: self.code,
            mode: self.mode,
            fixups: self.linker.into_applied(),
            annotations: self.annotations,
        })
    }

    /// Finish emission and map the code as an executable [`crate::Function`].
    ///
    /// The pages are written while read-write and then switched to
    /// read-execute; they are never writable and executable at once.
    ///
    /// # Errors
    ///
    /// Everything [`Assembler::finish`] reports, a
    /// [`AsmError::ContractViolation`] for an empty buffer, and
    /// [`AsmError::ExecutableMemory`] if the platform refuses the mapping.
    #[cfg(feature = "std")]
    pub fn finalize(self) -> Result<crate::exec::Function, AsmError> {
        let result = self.finish()?;
        if result.is_empty() {
            return Err(AsmError::contract("cannot finalize an empty function"));
        }
        crate::exec::Function::new(result.bytes())
    }
}

fn jcc_mnemonic(cond: Cond) -> &'static str {
    match cond {
        Cond::O => "jo",
        Cond::No => "jno",
        Cond::B => "jb",
        Cond::Ae => "jae",
        Cond::E => "je",
        Cond::Ne => "jne",
        Cond::Be => "jbe",
        Cond::A => "ja",
        Cond::S => "js",
        Cond::Ns => "jns",
        Cond::P => "jp",
        Cond::Np => "jnp",
        Cond::L => "jl",
        Cond::Ge => "jge",
        Cond::Le => "jle",
        Cond::G => "jg",
    }
}
