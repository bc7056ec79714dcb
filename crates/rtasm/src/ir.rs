//! Operand model: registers, memory operands, and condition/predicate codes.
//!
//! Operand legality is carried by the types. A memory base is a [`Gpr`], so
//! a SIMD register can never address memory; the remaining role checks
//! (which operand may sit in the register field) are made by the encoder.

use core::fmt;

use crate::error::AsmError;

/// x86 encoding mode of the emitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum X86Mode {
    /// 32-bit protected mode, cdecl stack arguments, 4-byte stack words.
    #[default]
    Mode32,
    /// 64-bit long mode restricted to the eight legacy registers.
    ///
    /// Memory bases name the full-width register, stack words are 8 bytes,
    /// and `inc`/`dec` use their ModR/M forms.
    Mode64,
}

impl X86Mode {
    /// Size in bytes of one pushed stack word.
    #[must_use]
    pub const fn word_size(self) -> i32 {
        match self {
            X86Mode::Mode32 => 4,
            X86Mode::Mode64 => 8,
        }
    }
}

impl fmt::Display for X86Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            X86Mode::Mode32 => write!(f, "x86"),
            X86Mode::Mode64 => write!(f, "x86_64"),
        }
    }
}

/// Register file a register belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegClass {
    /// 32-bit general-purpose registers (EAX–EDI).
    Gp32,
    /// 64-bit MMX registers holding packed integers (MM0–MM7).
    Mmx,
    /// 128-bit SSE registers holding four single-precision floats (XMM0–XMM7).
    Xmm,
    /// x87 floating-point stack slots, relative to the current top (ST0–ST7).
    X87,
}

impl fmt::Display for RegClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegClass::Gp32 => write!(f, "general-purpose"),
            RegClass::Mmx => write!(f, "mmx"),
            RegClass::Xmm => write!(f, "xmm"),
            RegClass::X87 => write!(f, "x87"),
        }
    }
}

/// 32-bit general-purpose register, in hardware encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Gpr {
    /// Accumulator; holds integer return values.
    Eax = 0,
    /// Counter.
    Ecx = 1,
    /// Data.
    Edx = 2,
    /// Base.
    Ebx = 3,
    /// Stack pointer. As a memory base it requires a SIB byte.
    Esp = 4,
    /// Frame pointer. As a memory base it always carries a displacement.
    Ebp = 5,
    /// Source index.
    Esi = 6,
    /// Destination index.
    Edi = 7,
}

impl Gpr {
    /// All general-purpose registers, indexed by encoding.
    pub const ALL: [Gpr; 8] = [
        Gpr::Eax,
        Gpr::Ecx,
        Gpr::Edx,
        Gpr::Ebx,
        Gpr::Esp,
        Gpr::Ebp,
        Gpr::Esi,
        Gpr::Edi,
    ];

    /// 3-bit register number used in ModR/M, SIB, and `+r` opcodes.
    #[inline]
    #[must_use]
    pub const fn base_code(self) -> u8 {
        self as u8
    }

    /// Register with the given 3-bit number.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Memory operand `[self + delta]`.
    #[must_use]
    pub fn disp(self, delta: i32) -> MemoryOperand {
        MemoryOperand::new(self, delta)
    }

    /// Memory operand `[self]`.
    #[must_use]
    pub fn deref(self) -> MemoryOperand {
        MemoryOperand::new(self, 0)
    }

    fn name(self) -> &'static str {
        match self {
            Gpr::Eax => "eax",
            Gpr::Ecx => "ecx",
            Gpr::Edx => "edx",
            Gpr::Ebx => "ebx",
            Gpr::Esp => "esp",
            Gpr::Ebp => "ebp",
            Gpr::Esi => "esi",
            Gpr::Edi => "edi",
        }
    }
}

/// MMX register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Mmx {
    Mm0 = 0,
    Mm1 = 1,
    Mm2 = 2,
    Mm3 = 3,
    Mm4 = 4,
    Mm5 = 5,
    Mm6 = 6,
    Mm7 = 7,
}

impl Mmx {
    /// All MMX registers, indexed by encoding.
    pub const ALL: [Mmx; 8] = [
        Mmx::Mm0,
        Mmx::Mm1,
        Mmx::Mm2,
        Mmx::Mm3,
        Mmx::Mm4,
        Mmx::Mm5,
        Mmx::Mm6,
        Mmx::Mm7,
    ];

    /// 3-bit register number.
    #[inline]
    #[must_use]
    pub const fn base_code(self) -> u8 {
        self as u8
    }

    /// Register with the given 3-bit number.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// SSE register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Xmm {
    Xmm0 = 0,
    Xmm1 = 1,
    Xmm2 = 2,
    Xmm3 = 3,
    Xmm4 = 4,
    Xmm5 = 5,
    Xmm6 = 6,
    Xmm7 = 7,
}

impl Xmm {
    /// All SSE registers, indexed by encoding.
    pub const ALL: [Xmm; 8] = [
        Xmm::Xmm0,
        Xmm::Xmm1,
        Xmm::Xmm2,
        Xmm::Xmm3,
        Xmm::Xmm4,
        Xmm::Xmm5,
        Xmm::Xmm6,
        Xmm::Xmm7,
    ];

    /// 3-bit register number.
    #[inline]
    #[must_use]
    pub const fn base_code(self) -> u8 {
        self as u8
    }

    /// Register with the given 3-bit number.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// x87 stack register, numbered from the top of the stack.
///
/// `St0` is the top. Every push or pop renumbers the slots, so the same
/// value is reached through a different `St` after `fld` or `fstp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum St {
    St0 = 0,
    St1 = 1,
    St2 = 2,
    St3 = 3,
    St4 = 4,
    St5 = 5,
    St6 = 6,
    St7 = 7,
}

impl St {
    /// All stack slots, top first.
    pub const ALL: [St; 8] = [
        St::St0,
        St::St1,
        St::St2,
        St::St3,
        St::St4,
        St::St5,
        St::St6,
        St::St7,
    ];

    /// Slot index added to `+i` opcodes.
    #[inline]
    #[must_use]
    pub const fn base_code(self) -> u8 {
        self as u8
    }

    /// Slot with the given index.
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

/// A directly named register of any class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Register {
    /// General-purpose register.
    Gp(Gpr),
    /// MMX register.
    Mmx(Mmx),
    /// SSE register.
    Xmm(Xmm),
    /// x87 stack slot.
    St(St),
}

impl Register {
    /// Register of `class` with the 3-bit number `code`.
    ///
    /// Returns `None` only when `code` is 8 or above.
    #[must_use]
    pub fn from_code(class: RegClass, code: u8) -> Option<Self> {
        match class {
            RegClass::Gp32 => Gpr::from_code(code).map(Register::Gp),
            RegClass::Mmx => Mmx::from_code(code).map(Register::Mmx),
            RegClass::Xmm => Xmm::from_code(code).map(Register::Xmm),
            RegClass::X87 => St::from_code(code).map(Register::St),
        }
    }

    /// Register file of this register.
    #[must_use]
    pub fn class(self) -> RegClass {
        match self {
            Register::Gp(_) => RegClass::Gp32,
            Register::Mmx(_) => RegClass::Mmx,
            Register::Xmm(_) => RegClass::Xmm,
            Register::St(_) => RegClass::X87,
        }
    }

    /// 3-bit register number.
    #[inline]
    #[must_use]
    pub fn base_code(self) -> u8 {
        match self {
            Register::Gp(r) => r.base_code(),
            Register::Mmx(r) => r.base_code(),
            Register::Xmm(r) => r.base_code(),
            Register::St(r) => r.base_code(),
        }
    }

    /// The general-purpose register, if this is one.
    #[must_use]
    pub fn as_gp(self) -> Option<Gpr> {
        match self {
            Register::Gp(r) => Some(r),
            _ => None,
        }
    }

    /// The x87 stack slot, if this is one.
    #[must_use]
    pub fn as_st(self) -> Option<St> {
        match self {
            Register::St(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Gpr> for Register {
    fn from(r: Gpr) -> Self {
        Register::Gp(r)
    }
}

impl From<Mmx> for Register {
    fn from(r: Mmx) -> Self {
        Register::Mmx(r)
    }
}

impl From<Xmm> for Register {
    fn from(r: Xmm) -> Self {
        Register::Xmm(r)
    }
}

impl From<St> for Register {
    fn from(r: St) -> Self {
        Register::St(r)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Gp(r) => f.write_str(r.name()),
            Register::Mmx(r) => write!(f, "mm{}", r.base_code()),
            Register::Xmm(r) => write!(f, "xmm{}", r.base_code()),
            Register::St(r) => write!(f, "st({})", r.base_code()),
        }
    }
}

/// Displacement size selected for a memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DispMode {
    /// `[base]`, no displacement bytes.
    None,
    /// `[base + disp8]`, one signed byte.
    Disp8,
    /// `[base + disp32]`, four little-endian bytes.
    Disp32,
}

impl DispMode {
    /// Smallest mode that encodes `[base + disp]` exactly.
    ///
    /// EBP with a zero displacement still needs `Disp8`: `mod=00, rm=101`
    /// is the absolute (or RIP-relative) form.
    #[must_use]
    pub fn select(base: Gpr, disp: i32) -> Self {
        if disp == 0 && base != Gpr::Ebp {
            DispMode::None
        } else if (-128..=127).contains(&disp) {
            DispMode::Disp8
        } else {
            DispMode::Disp32
        }
    }

    /// Value of the ModR/M `mod` field.
    #[inline]
    #[must_use]
    pub const fn mod_bits(self) -> u8 {
        match self {
            DispMode::None => 0b00,
            DispMode::Disp8 => 0b01,
            DispMode::Disp32 => 0b10,
        }
    }

    /// Number of displacement bytes this mode appends.
    #[inline]
    #[must_use]
    pub const fn disp_len(self) -> usize {
        match self {
            DispMode::None => 0,
            DispMode::Disp8 => 1,
            DispMode::Disp32 => 4,
        }
    }
}

/// Register-relative memory location `[base + disp]`.
///
/// The displacement mode is derived on construction and is always the
/// smallest one that preserves the address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(from = "MemoryParts", into = "MemoryParts")
)]
pub struct MemoryOperand {
    base: Gpr,
    disp: i32,
    mode: DispMode,
}

impl MemoryOperand {
    /// `[base + disp]` with the displacement mode chosen by size.
    #[must_use]
    pub fn new(base: Gpr, disp: i32) -> Self {
        Self {
            base,
            disp,
            mode: DispMode::select(base, disp),
        }
    }

    /// Base register.
    #[must_use]
    pub fn base(&self) -> Gpr {
        self.base
    }

    /// Signed displacement.
    #[must_use]
    pub fn disp(&self) -> i32 {
        self.disp
    }

    /// Selected displacement mode.
    #[must_use]
    pub fn mode(&self) -> DispMode {
        self.mode
    }

    /// Whether the base forces a SIB byte (ESP, ordinal 4).
    #[must_use]
    pub fn needs_sib(&self) -> bool {
        self.base.base_code() == 4
    }

    /// Bytes taken by ModR/M, optional SIB, and displacement.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        1 + usize::from(self.needs_sib()) + self.mode.disp_len()
    }

    /// Same base, displacement moved by `delta`.
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::ContractViolation`] if the displacement would
    /// leave the signed 32-bit range.
    pub fn offset(self, delta: i32) -> Result<Self, AsmError> {
        let disp = self.disp.checked_add(delta).ok_or_else(|| {
            AsmError::contract(alloc::format!(
                "displacement {} + {} overflows 32 bits",
                self.disp,
                delta
            ))
        })?;
        Ok(Self::new(self.base, disp))
    }
}

impl fmt::Display for MemoryOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = Register::Gp(self.base);
        match self.mode {
            DispMode::None => write!(f, "[{}]", base),
            _ if self.disp < 0 => write!(f, "[{}-{:#x}]", base, self.disp.unsigned_abs()),
            _ => write!(f, "[{}+{:#x}]", base, self.disp),
        }
    }
}

#[cfg(feature = "serde")]
#[derive(serde::Serialize, serde::Deserialize)]
struct MemoryParts {
    base: Gpr,
    disp: i32,
}

#[cfg(feature = "serde")]
impl From<MemoryParts> for MemoryOperand {
    fn from(p: MemoryParts) -> Self {
        MemoryOperand::new(p.base, p.disp)
    }
}

#[cfg(feature = "serde")]
impl From<MemoryOperand> for MemoryParts {
    fn from(m: MemoryOperand) -> Self {
        MemoryParts {
            base: m.base,
            disp: m.disp,
        }
    }
}

/// Instruction operand: a register or a register-relative memory location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// Direct register.
    Register(Register),
    /// Memory addressed through a general-purpose register.
    Memory(MemoryOperand),
}

impl Operand {
    /// Memory operand `delta` bytes past `self`.
    ///
    /// A general-purpose register becomes `[reg + delta]`; a memory operand
    /// accumulates `delta` onto its displacement, so re-basing can be
    /// repeated.
    ///
    /// # Errors
    ///
    /// Returns [`AsmError::ContractViolation`] for an MMX, XMM or x87 base, or
    /// when the accumulated displacement overflows 32 bits.
    pub fn with_displacement(self, delta: i32) -> Result<Operand, AsmError> {
        match self {
            Operand::Register(Register::Gp(base)) => Ok(Operand::Memory(base.disp(delta))),
            Operand::Memory(mem) => mem.offset(delta).map(Operand::Memory),
            Operand::Register(reg) => Err(AsmError::contract(alloc::format!(
                "{} register {} cannot address memory",
                reg.class(),
                reg
            ))),
        }
    }

    /// `[self]`; same as `with_displacement(0)`.
    ///
    /// # Errors
    ///
    /// See [`Operand::with_displacement`].
    pub fn deref(self) -> Result<Operand, AsmError> {
        self.with_displacement(0)
    }

    /// The register naming the same physical register, dropping any memory
    /// semantics.
    #[must_use]
    pub fn base_identity(self) -> Register {
        match self {
            Operand::Register(reg) => reg,
            Operand::Memory(mem) => Register::Gp(mem.base),
        }
    }

    /// The register, if this operand is one.
    #[must_use]
    pub fn as_register(&self) -> Option<Register> {
        match self {
            Operand::Register(reg) => Some(*reg),
            Operand::Memory(_) => None,
        }
    }

    /// The memory operand, if this operand is one.
    #[must_use]
    pub fn as_memory(&self) -> Option<MemoryOperand> {
        match self {
            Operand::Memory(mem) => Some(*mem),
            Operand::Register(_) => None,
        }
    }

    /// Whether this operand addresses memory.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        matches!(self, Operand::Memory(_))
    }
}

impl From<Register> for Operand {
    fn from(r: Register) -> Self {
        Operand::Register(r)
    }
}

impl From<Gpr> for Operand {
    fn from(r: Gpr) -> Self {
        Operand::Register(Register::Gp(r))
    }
}

impl From<Mmx> for Operand {
    fn from(r: Mmx) -> Self {
        Operand::Register(Register::Mmx(r))
    }
}

impl From<Xmm> for Operand {
    fn from(r: Xmm) -> Self {
        Operand::Register(Register::Xmm(r))
    }
}

impl From<St> for Operand {
    fn from(r: St) -> Self {
        Operand::Register(Register::St(r))
    }
}

impl From<MemoryOperand> for Operand {
    fn from(m: MemoryOperand) -> Self {
        Operand::Memory(m)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(r) => write!(f, "{}", r),
            Operand::Memory(m) => write!(f, "{}", m),
        }
    }
}

/// Branch condition, in `tttn` encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Cond {
    /// Overflow.
    O = 0x0,
    /// No overflow.
    No = 0x1,
    /// Below (unsigned <), carry set.
    B = 0x2,
    /// Above or equal (unsigned >=), carry clear.
    Ae = 0x3,
    /// Equal / zero.
    E = 0x4,
    /// Not equal / not zero.
    Ne = 0x5,
    /// Below or equal (unsigned <=).
    Be = 0x6,
    /// Above (unsigned >).
    A = 0x7,
    /// Sign.
    S = 0x8,
    /// No sign.
    Ns = 0x9,
    /// Parity even.
    P = 0xA,
    /// Parity odd.
    Np = 0xB,
    /// Less (signed <).
    L = 0xC,
    /// Greater or equal (signed >=).
    Ge = 0xD,
    /// Less or equal (signed <=).
    Le = 0xE,
    /// Greater (signed >).
    G = 0xF,
}

impl Cond {
    /// All conditions, indexed by encoding.
    pub const ALL: [Cond; 16] = [
        Cond::O,
        Cond::No,
        Cond::B,
        Cond::Ae,
        Cond::E,
        Cond::Ne,
        Cond::Be,
        Cond::A,
        Cond::S,
        Cond::Ns,
        Cond::P,
        Cond::Np,
        Cond::L,
        Cond::Ge,
        Cond::Le,
        Cond::G,
    ];

    /// 4-bit condition code added to the `Jcc` opcode base.
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// The opposite condition.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::ALL[(self.code() ^ 1) as usize]
    }
}

/// Predicate immediate for `cmpps`/`cmpss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CmpPredicate {
    /// Equal.
    Eq = 0,
    /// Less than.
    Lt = 1,
    /// Less than or equal.
    Le = 2,
    /// Either operand is NaN.
    Unord = 3,
    /// Not equal.
    Neq = 4,
    /// Not less than.
    Nlt = 5,
    /// Not less than or equal.
    Nle = 6,
    /// Neither operand is NaN.
    Ord = 7,
}

/// Cache-level hint for `prefetch`, stored in the ModR/M reg field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PrefetchHint {
    /// Non-temporal.
    Nta = 0,
    /// All cache levels.
    T0 = 1,
    /// Level 2 and up.
    T1 = 2,
    /// Level 3 and up.
    T2 = 3,
}

/// Build a `shufps`/`pshufd` control byte selecting source lanes for
/// destination lanes 0..3.
#[must_use]
pub const fn shuffle(x: u8, y: u8, z: u8, w: u8) -> u8 {
    (x & 3) | ((y & 3) << 2) | ((z & 3) << 4) | ((w & 3) << 6)
}
