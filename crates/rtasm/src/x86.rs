//! Opcode tables for the supported instruction subset.
//!
//! Each SIMD entry pairs a mandatory prefix with a two-byte `0F xx`
//! opcode, per register class. Entries with both an `xmm` and an `mmx`
//! encoding pick the form from the destination register.

/// Mandatory prefix plus opcode bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Encoding {
    pub prefix: Option<u8>,
    pub opcode: [u8; 2],
}

/// Arithmetic/conversion with a `reg, reg/mem` operand shape.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimdOp {
    pub mnemonic: &'static str,
    pub xmm: Option<Encoding>,
    pub mmx: Option<Encoding>,
}

impl SimdOp {
    pub fn expected_register(&self) -> &'static str {
        expected(self.xmm.is_some(), self.mmx.is_some())
    }
}

/// Load/store pair: `(load, store)` per register class.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MoveOp {
    pub mnemonic: &'static str,
    pub xmm: Option<(Encoding, Encoding)>,
    pub mmx: Option<(Encoding, Encoding)>,
    /// The register/register form of this opcode is a different
    /// instruction, so one side must be memory.
    pub memory_only: bool,
}

impl MoveOp {
    pub fn expected_register(&self) -> &'static str {
        expected(self.xmm.is_some(), self.mmx.is_some())
    }
}

fn expected(xmm: bool, mmx: bool) -> &'static str {
    match (xmm, mmx) {
        (true, true) => "an xmm or mmx register",
        (true, false) => "an xmm register",
        _ => "an mmx register",
    }
}

const fn enc(prefix: Option<u8>, op: u8) -> Encoding {
    Encoding {
        prefix,
        opcode: [0x0F, op],
    }
}

const fn ps(mnemonic: &'static str, op: u8) -> SimdOp {
    SimdOp {
        mnemonic,
        xmm: Some(enc(None, op)),
        mmx: None,
    }
}

const fn ss(mnemonic: &'static str, op: u8) -> SimdOp {
    SimdOp {
        mnemonic,
        xmm: Some(enc(Some(0xF3), op)),
        mmx: None,
    }
}

/// Integer op available on XMM (`66` prefix) and MMX (no prefix).
const fn int(mnemonic: &'static str, op: u8) -> SimdOp {
    SimdOp {
        mnemonic,
        xmm: Some(enc(Some(0x66), op)),
        mmx: Some(enc(None, op)),
    }
}

const fn int_xmm(mnemonic: &'static str, op: u8) -> SimdOp {
    SimdOp {
        mnemonic,
        xmm: Some(enc(Some(0x66), op)),
        mmx: None,
    }
}

// ─── Packed / scalar single precision ───────────────────────

pub(crate) const ADDPS: SimdOp = ps("addps", 0x58);
pub(crate) const ADDSS: SimdOp = ss("addss", 0x58);
pub(crate) const SUBPS: SimdOp = ps("subps", 0x5C);
pub(crate) const SUBSS: SimdOp = ss("subss", 0x5C);
pub(crate) const MULPS: SimdOp = ps("mulps", 0x59);
pub(crate) const MULSS: SimdOp = ss("mulss", 0x59);
pub(crate) const DIVPS: SimdOp = ps("divps", 0x5E);
pub(crate) const DIVSS: SimdOp = ss("divss", 0x5E);
pub(crate) const MINPS: SimdOp = ps("minps", 0x5D);
pub(crate) const MINSS: SimdOp = ss("minss", 0x5D);
pub(crate) const MAXPS: SimdOp = ps("maxps", 0x5F);
pub(crate) const MAXSS: SimdOp = ss("maxss", 0x5F);
pub(crate) const SQRTPS: SimdOp = ps("sqrtps", 0x51);
pub(crate) const SQRTSS: SimdOp = ss("sqrtss", 0x51);
pub(crate) const RCPPS: SimdOp = ps("rcpps", 0x53);
pub(crate) const RCPSS: SimdOp = ss("rcpss", 0x53);
pub(crate) const RSQRTPS: SimdOp = ps("rsqrtps", 0x52);
pub(crate) const RSQRTSS: SimdOp = ss("rsqrtss", 0x52);

pub(crate) const ANDPS: SimdOp = ps("andps", 0x54);
pub(crate) const ANDNPS: SimdOp = ps("andnps", 0x55);
pub(crate) const ORPS: SimdOp = ps("orps", 0x56);
pub(crate) const XORPS: SimdOp = ps("xorps", 0x57);

pub(crate) const UNPCKLPS: SimdOp = ps("unpcklps", 0x14);
pub(crate) const UNPCKHPS: SimdOp = ps("unpckhps", 0x15);
pub(crate) const MOVHLPS: SimdOp = ps("movhlps", 0x12);
pub(crate) const MOVLHPS: SimdOp = ps("movlhps", 0x16);

pub(crate) const SHUFPS: SimdOp = ps("shufps", 0xC6);
pub(crate) const CMPPS: SimdOp = ps("cmpps", 0xC2);
pub(crate) const CMPSS: SimdOp = ss("cmpss", 0xC2);

pub(crate) const MOVMSKPS: SimdOp = ps("movmskps", 0x50);

// ─── Conversions and packed integer ───────────────────────

pub(crate) const CVTPS2DQ: SimdOp = int_xmm("cvtps2dq", 0x5B);
pub(crate) const CVTTPS2DQ: SimdOp = SimdOp {
    mnemonic: "cvttps2dq",
    xmm: Some(enc(Some(0xF3), 0x5B)),
    mmx: None,
};
pub(crate) const CVTDQ2PS: SimdOp = ps("cvtdq2ps", 0x5B);

pub(crate) const PACKSSDW: SimdOp = int("packssdw", 0x6B);
pub(crate) const PACKSSWB: SimdOp = int("packsswb", 0x63);
pub(crate) const PACKUSWB: SimdOp = int("packuswb", 0x67);
pub(crate) const PUNPCKLBW: SimdOp = int("punpcklbw", 0x60);
pub(crate) const PUNPCKHBW: SimdOp = int("punpckhbw", 0x68);
pub(crate) const PSHUFD: SimdOp = int_xmm("pshufd", 0x70);
pub(crate) const PMOVMSKB: SimdOp = int("pmovmskb", 0xD7);

// ─── Moves ───────────────────────

pub(crate) const MOVAPS: MoveOp = MoveOp {
    mnemonic: "movaps",
    xmm: Some((enc(None, 0x28), enc(None, 0x29))),
    mmx: None,
    memory_only: false,
};

pub(crate) const MOVUPS: MoveOp = MoveOp {
    mnemonic: "movups",
    xmm: Some((enc(None, 0x10), enc(None, 0x11))),
    mmx: None,
    memory_only: false,
};

pub(crate) const MOVSS: MoveOp = MoveOp {
    mnemonic: "movss",
    xmm: Some((enc(Some(0xF3), 0x10), enc(Some(0xF3), 0x11))),
    mmx: None,
    memory_only: false,
};

pub(crate) const MOVLPS: MoveOp = MoveOp {
    mnemonic: "movlps",
    xmm: Some((enc(None, 0x12), enc(None, 0x13))),
    mmx: None,
    memory_only: true,
};

pub(crate) const MOVHPS: MoveOp = MoveOp {
    mnemonic: "movhps",
    xmm: Some((enc(None, 0x16), enc(None, 0x17))),
    mmx: None,
    memory_only: true,
};

pub(crate) const MOVQ: MoveOp = MoveOp {
    mnemonic: "movq",
    xmm: Some((enc(Some(0xF3), 0x7E), enc(Some(0x66), 0xD6))),
    mmx: Some((enc(None, 0x6F), enc(None, 0x7F))),
    memory_only: false,
};

// ─── General-purpose ───────────────────────

/// Two-operand integer ALU: `(mnemonic, reg-destination opcode,
/// memory-destination opcode, group-1 /digit)`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AluOp {
    pub mnemonic: &'static str,
    pub reg_form: u8,
    pub mem_form: u8,
    pub digit: u8,
}

const fn alu(mnemonic: &'static str, base: u8, digit: u8) -> AluOp {
    AluOp {
        mnemonic,
        reg_form: base + 3,
        mem_form: base + 1,
        digit,
    }
}

pub(crate) const ADD: AluOp = alu("add", 0x00, 0);
pub(crate) const OR: AluOp = alu("or", 0x08, 1);
pub(crate) const AND: AluOp = alu("and", 0x20, 4);
pub(crate) const SUB: AluOp = alu("sub", 0x28, 5);
pub(crate) const XOR: AluOp = alu("xor", 0x30, 6);
pub(crate) const CMP: AluOp = alu("cmp", 0x38, 7);

pub(crate) const MOV_LOAD: u8 = 0x8B;
pub(crate) const MOV_STORE: u8 = 0x89;
pub(crate) const TEST: u8 = 0x85;
pub(crate) const PUSH: u8 = 0x50;
pub(crate) const POP: u8 = 0x58;
pub(crate) const INC: u8 = 0x40;
pub(crate) const DEC: u8 = 0x48;
pub(crate) const PUSH_IMM32: u8 = 0x68;
pub(crate) const RET: u8 = 0xC3;
pub(crate) const EMMS: [u8; 2] = [0x0F, 0x77];
pub(crate) const PREFETCH: [u8; 2] = [0x0F, 0x18];

/// `FF /digit` group: inc, dec, call.
pub(crate) const GROUP5: u8 = 0xFF;
pub(crate) const GROUP5_INC: u8 = 0;
pub(crate) const GROUP5_DEC: u8 = 1;
pub(crate) const GROUP5_CALL: u8 = 2;

/// `F7 /4`: unsigned multiply into EDX:EAX.
pub(crate) const GROUP3: u8 = 0xF7;
pub(crate) const GROUP3_MUL: u8 = 4;

pub(crate) const RET_IMM16: u8 = 0xC2;

// ─── x87 ───────────────────────

/// x87 arithmetic family. Each pair is `(opcode, ModR/M base or /digit)`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct X87Arith {
    pub mnemonic: &'static str,
    /// `st(0) = st(0) op st(i)`: `D8 base+i`.
    pub to_top: (u8, u8),
    /// `st(i) = st(i) op st(0)`: `DC base+i`.
    pub from_top: (u8, u8),
    /// `st(0) = st(0) op m32fp`: `D8 /digit`.
    pub mem: (u8, u8),
    /// `st(i) = st(i) op st(0)`, then pop: `DE base+i`.
    pub pop: (u8, u8),
    pub pop_mnemonic: &'static str,
}

const fn x87(
    mnemonic: &'static str,
    pop_mnemonic: &'static str,
    to_top: u8,
    from_top: u8,
    digit: u8,
) -> X87Arith {
    X87Arith {
        mnemonic,
        to_top: (0xD8, to_top),
        from_top: (0xDC, from_top),
        mem: (0xD8, digit),
        pop: (0xDE, from_top),
        pop_mnemonic,
    }
}

// The reversed-operand forms swap sub/subr and div/divr when st(0) is the
// source.
pub(crate) const FADD: X87Arith = x87("fadd", "faddp", 0xC0, 0xC0, 0);
pub(crate) const FMUL: X87Arith = x87("fmul", "fmulp", 0xC8, 0xC8, 1);
pub(crate) const FSUB: X87Arith = x87("fsub", "fsubp", 0xE0, 0xE8, 4);
pub(crate) const FSUBR: X87Arith = x87("fsubr", "fsubrp", 0xE8, 0xE0, 5);
pub(crate) const FDIV: X87Arith = x87("fdiv", "fdivp", 0xF0, 0xF8, 6);
pub(crate) const FDIVR: X87Arith = x87("fdivr", "fdivrp", 0xF8, 0xF0, 7);

/// `D9` group: loads, stores and control word access on m32.
pub(crate) const FPU_D9: u8 = 0xD9;
pub(crate) const FLD_M32: u8 = 0;
pub(crate) const FST_M32: u8 = 2;
pub(crate) const FSTP_M32: u8 = 3;
pub(crate) const FLDCW: u8 = 5;
pub(crate) const FNSTCW: u8 = 7;
/// `D9 C0+i`: push a copy of `st(i)`.
pub(crate) const FLD_ST: u8 = 0xC0;
/// `D9 C8+i`: exchange `st(0)` and `st(i)`.
pub(crate) const FXCH_ST: u8 = 0xC8;

/// `DB` group: 32-bit integer loads/stores, fcomi, fnclex.
pub(crate) const FPU_DB: u8 = 0xDB;
pub(crate) const FILD_M32: u8 = 0;
pub(crate) const FIST_M32: u8 = 2;
pub(crate) const FISTP_M32: u8 = 3;
pub(crate) const FCOMI_ST: u8 = 0xF0;
pub(crate) const FUCOMI_ST: u8 = 0xE8;

/// `DD` group: register stores.
pub(crate) const FPU_DD: u8 = 0xDD;
pub(crate) const FST_ST: u8 = 0xD0;
pub(crate) const FSTP_ST: u8 = 0xD8;

/// `DF F0+i`: compare and pop.
pub(crate) const FCOMIP: [u8; 2] = [0xDF, 0xF0];

/// Register-only `D9 xx` operations on the top of the stack.
pub(crate) const FCHS: [u8; 2] = [0xD9, 0xE0];
pub(crate) const FABS: [u8; 2] = [0xD9, 0xE1];
pub(crate) const FLD1: [u8; 2] = [0xD9, 0xE8];
pub(crate) const FLDZ: [u8; 2] = [0xD9, 0xEE];
pub(crate) const F2XM1: [u8; 2] = [0xD9, 0xF0];
pub(crate) const FYL2X: [u8; 2] = [0xD9, 0xF1];
pub(crate) const FXTRACT: [u8; 2] = [0xD9, 0xF4];
pub(crate) const FPRNDINT: [u8; 2] = [0xD9, 0xFC];
pub(crate) const FSCALE: [u8; 2] = [0xD9, 0xFD];
pub(crate) const FSIN: [u8; 2] = [0xD9, 0xFE];
pub(crate) const FCOS: [u8; 2] = [0xD9, 0xFF];
pub(crate) const FNCLEX: [u8; 2] = [0xDB, 0xE2];

/// Conditional moves into `st(0)`: `(mnemonic, opcode, base)`.
pub(crate) const FCMOVB: (&str, u8, u8) = ("fcmovb", 0xDA, 0xC0);
pub(crate) const FCMOVE: (&str, u8, u8) = ("fcmove", 0xDA, 0xC8);
pub(crate) const FCMOVBE: (&str, u8, u8) = ("fcmovbe", 0xDA, 0xD0);
pub(crate) const FCMOVU: (&str, u8, u8) = ("fcmovu", 0xDA, 0xD8);
pub(crate) const FCMOVNB: (&str, u8, u8) = ("fcmovnb", 0xDB, 0xC0);
pub(crate) const FCMOVNE: (&str, u8, u8) = ("fcmovne", 0xDB, 0xC8);
pub(crate) const FCMOVNBE: (&str, u8, u8) = ("fcmovnbe", 0xDB, 0xD0);
pub(crate) const FCMOVNU: (&str, u8, u8) = ("fcmovnu", 0xDB, 0xD8);

// ─── Branches ───────────────────────

pub(crate) const JCC_SHORT: u8 = 0x70;
pub(crate) const JCC_NEAR: [u8; 2] = [0x0F, 0x80];
pub(crate) const JMP_SHORT: u8 = 0xEB;
pub(crate) const JMP_NEAR: u8 = 0xE9;
