#![cfg(all(
    feature = "std",
    any(unix, windows),
    any(target_arch = "x86", target_arch = "x86_64")
))]
//! End-to-end tests: emit, finalize, and call the code on the host.
//!
//! On x86 the code reads cdecl stack arguments through `argument`; on
//! x86-64 it is emitted in 64-bit mode and reads the first two integer
//! argument registers of the host ABI.

use rtasm::{shuffle, AsmError, Assembler, Cond, Function, Gpr, Mmx, Operand, X86Mode, Xmm};

// ─── Helpers ──────────────────────────────────────────────────────────────────

#[cfg(target_arch = "x86")]
const MODE: X86Mode = X86Mode::Mode32;
#[cfg(target_arch = "x86_64")]
const MODE: X86Mode = X86Mode::Mode64;

/// Host register holding integer argument `n` (1-based) on entry.
#[cfg(all(target_arch = "x86_64", unix))]
fn arg_register(n: u32) -> Gpr {
    [Gpr::Edi, Gpr::Esi][n as usize - 1]
}

#[cfg(all(target_arch = "x86_64", windows))]
fn arg_register(n: u32) -> Gpr {
    [Gpr::Ecx, Gpr::Edx][n as usize - 1]
}

/// Copy pointer argument `n` (1-based) into `dst`.
#[cfg(target_arch = "x86_64")]
fn load_arg(asm: &mut Assembler, dst: Gpr, n: u32) -> Result<(), AsmError> {
    asm.mov_ptr(dst, arg_register(n)).map(drop)
}

#[cfg(target_arch = "x86")]
fn load_arg(asm: &mut Assembler, dst: Gpr, n: u32) -> Result<(), AsmError> {
    let slot = asm.argument(n)?;
    asm.mov(dst, slot).map(drop)
}

fn build(f: impl FnOnce(&mut Assembler) -> Result<(), AsmError>) -> Function {
    let mut asm = Assembler::new(MODE);
    f(&mut asm).unwrap_or_else(|e| panic!("emission failed: {e}"));
    asm.finalize().unwrap_or_else(|e| panic!("finalize failed: {e}"))
}

type UnaryPtr<T> = extern "C" fn(*const T) -> i32;
type CopyFn<S, D> = extern "C" fn(*const S, *mut D);

// ─── General-purpose ─────────────────────────────────────────────────────────

#[test]
fn returns_constant() {
    let f = build(|a| {
        a.mov_imm(Gpr::Eax, 42)?.ret()?;
        Ok(())
    });
    let entry = unsafe { f.entry::<extern "C" fn() -> i32>() }.unwrap();
    assert_eq!(entry.call(), 42);
    f.release().unwrap();
}

#[test]
fn reads_through_pointer_argument() {
    let f = build(|a| {
        load_arg(a, Gpr::Edx, 1)?;
        a.mov(Gpr::Eax, Gpr::Edx.disp(8))?;
        a.add_imm(Gpr::Eax, 1)?;
        a.ret()?;
        Ok(())
    });
    let data = [4i32, 7, 10, 40];
    let entry = unsafe { f.entry::<UnaryPtr<i32>>() }.unwrap();
    assert_eq!(entry.call(data.as_ptr()), 11);
}

#[test]
fn forward_branch_selects_result() {
    let f = build(|a| {
        load_arg(a, Gpr::Edx, 1)?;
        a.mov(Gpr::Ecx, Gpr::Edx.deref())?;
        a.xor(Gpr::Eax, Gpr::Eax)?;
        a.test(Gpr::Ecx, Gpr::Ecx)?;
        let zero = a.jcc_forward(Cond::E)?;
        a.mov_imm(Gpr::Eax, 1)?;
        a.fixup_forward(zero)?;
        a.ret()?;
        Ok(())
    });
    let entry = unsafe { f.entry::<UnaryPtr<i32>>() }.unwrap();
    assert_eq!(entry.call(&0), 0);
    assert_eq!(entry.call(&5), 1);
    assert_eq!(entry.call(&-5), 1);
}

#[test]
fn equal_compare_skips_increment() {
    let f = build(|a| {
        a.xor(Gpr::Ecx, Gpr::Ecx)?;
        a.cmp(Gpr::Eax, Gpr::Eax)?;
        let done = a.jcc_forward(Cond::E)?;
        a.inc(Gpr::Ecx)?;
        a.fixup_forward(done)?;
        a.mov(Gpr::Eax, Gpr::Ecx)?;
        a.ret()?;
        Ok(())
    });
    let entry = unsafe { f.entry::<extern "C" fn() -> i32>() }.unwrap();
    assert_eq!(entry.call(), 0);
}

#[test]
fn forward_jmp_skips_block() {
    let f = build(|a| {
        a.mov_imm(Gpr::Eax, 3)?;
        let over = a.jmp_forward()?;
        a.mov_imm(Gpr::Eax, 99)?;
        a.fixup_forward(over)?;
        a.ret()?;
        Ok(())
    });
    let entry = unsafe { f.entry::<extern "C" fn() -> i32>() }.unwrap();
    assert_eq!(entry.call(), 3);
}

fn sum_loop(padding: usize) -> Function {
    build(|a| {
        load_arg(a, Gpr::Edx, 1)?;
        a.mov(Gpr::Ecx, Gpr::Edx.deref())?;
        a.xor(Gpr::Eax, Gpr::Eax)?;
        let top = a.label();
        a.add(Gpr::Eax, Gpr::Ecx)?;
        for _ in 0..padding {
            a.add_imm(Gpr::Eax, 0)?;
        }
        a.dec(Gpr::Ecx)?;
        a.jcc(Cond::Ne, top)?;
        a.ret()?;
        Ok(())
    })
}

#[test]
fn backward_loop_short_form() {
    let f = sum_loop(0);
    let entry = unsafe { f.entry::<UnaryPtr<i32>>() }.unwrap();
    assert_eq!(entry.call(&10), 55);
}

#[test]
fn backward_loop_long_form() {
    let f = sum_loop(50);
    // The loop body no longer fits a rel8 branch.
    assert_eq!(&f.code()[f.len() - 7..f.len() - 5], &[0x0F, 0x85]);
    let entry = unsafe { f.entry::<UnaryPtr<i32>>() }.unwrap();
    assert_eq!(entry.call(&100), 5050);
}

#[test]
fn push_pop_preserve_callee_saved() {
    let f = build(|a| {
        a.push(Gpr::Ebx)?;
        a.mov_imm(Gpr::Ebx, 7)?;
        a.mov(Gpr::Eax, Gpr::Ebx)?;
        a.pop(Gpr::Ebx)?;
        a.ret()?;
        Ok(())
    });
    let entry = unsafe { f.entry::<extern "C" fn() -> i32>() }.unwrap();
    assert_eq!(entry.call(), 7);
}

#[test]
fn multiply_widens_into_edx() {
    let f = build(|a| {
        load_arg(a, Gpr::Ecx, 1)?;
        a.mov(Gpr::Eax, Gpr::Ecx.deref())?;
        a.mul(Gpr::Ecx.disp(4))?;
        a.mov(Gpr::Eax, Gpr::Edx)?;
        a.ret()?;
        Ok(())
    });
    let data = [0x8000_0000u32, 4];
    let entry = unsafe { f.entry::<UnaryPtr<u32>>() }.unwrap();
    assert_eq!(entry.call(data.as_ptr()), 2);
}

// ─── SIMD ─────────────────────────────────────────────────────────────────────

fn simd_copy(body: impl FnOnce(&mut Assembler) -> Result<(), AsmError>) -> Function {
    build(|a| {
        load_arg(a, Gpr::Eax, 1)?;
        load_arg(a, Gpr::Ecx, 2)?;
        a.movups(Xmm::Xmm0, Gpr::Eax.deref())?;
        body(a)?;
        a.movups(Gpr::Ecx.deref(), Xmm::Xmm0)?;
        a.ret()?;
        Ok(())
    })
}

#[test]
fn packed_add_and_shuffle() {
    let f = simd_copy(|a| {
        a.movups(Xmm::Xmm1, Gpr::Eax.deref())?;
        a.addps(Xmm::Xmm0, Xmm::Xmm1)?;
        a.shufps(Xmm::Xmm0, Xmm::Xmm0, shuffle(3, 2, 1, 0))?;
        Ok(())
    });
    let src = [1.0f32, 2.0, 3.0, 4.0];
    let mut dst = [0.0f32; 4];
    let entry = unsafe { f.entry::<CopyFn<f32, f32>>() }.unwrap();
    entry.call(src.as_ptr(), dst.as_mut_ptr());
    assert_eq!(dst, [8.0, 6.0, 4.0, 2.0]);
}

#[test]
fn scalar_ops_touch_low_lane_only() {
    let f = simd_copy(|a| {
        a.movaps(Xmm::Xmm1, Xmm::Xmm0)?;
        a.mulss(Xmm::Xmm0, Xmm::Xmm1)?;
        a.sqrtss(Xmm::Xmm0, Xmm::Xmm0)?;
        a.addss(Xmm::Xmm0, Xmm::Xmm1)?;
        Ok(())
    });
    let src = [3.0f32, -1.0, 5.0, 7.0];
    let mut dst = [0.0f32; 4];
    let entry = unsafe { f.entry::<CopyFn<f32, f32>>() }.unwrap();
    entry.call(src.as_ptr(), dst.as_mut_ptr());
    assert_eq!(dst, [6.0, -1.0, 5.0, 7.0]);
}

#[test]
fn min_max_clamp() {
    let f = build(|a| {
        load_arg(a, Gpr::Eax, 1)?;
        load_arg(a, Gpr::Ecx, 2)?;
        a.movups(Xmm::Xmm0, Gpr::Eax.deref())?;
        a.xorps(Xmm::Xmm1, Xmm::Xmm1)?;
        a.maxps(Xmm::Xmm0, Xmm::Xmm1)?;
        // Packed memory operands must be 16-byte aligned; go through movups.
        a.movups(Xmm::Xmm2, Gpr::Eax.disp(16))?;
        a.minps(Xmm::Xmm0, Xmm::Xmm2)?;
        a.movups(Gpr::Ecx.deref(), Xmm::Xmm0)?;
        a.ret()?;
        Ok(())
    });
    let src = [-2.0f32, 0.5, 3.0, 1.5, 1.0, 1.0, 1.0, 1.0];
    let mut dst = [0.0f32; 4];
    let entry = unsafe { f.entry::<CopyFn<f32, f32>>() }.unwrap();
    entry.call(src.as_ptr(), dst.as_mut_ptr());
    assert_eq!(dst, [0.0, 0.5, 1.0, 1.0]);
}

#[test]
fn truncating_conversion() {
    let f = simd_copy(|a| a.cvttps2dq(Xmm::Xmm0, Xmm::Xmm0).map(drop));
    let src = [1.9f32, -1.9, 42.5, -0.1];
    let mut dst = [0i32; 4];
    let entry = unsafe { f.entry::<CopyFn<f32, i32>>() }.unwrap();
    entry.call(src.as_ptr(), dst.as_mut_ptr());
    assert_eq!(dst, [1, -1, 42, 0]);
}

#[test]
fn compare_mask_and_movmskps() {
    let f = build(|a| {
        load_arg(a, Gpr::Edx, 1)?;
        a.movups(Xmm::Xmm0, Gpr::Edx.deref())?;
        a.xorps(Xmm::Xmm1, Xmm::Xmm1)?;
        a.cmpps(Xmm::Xmm0, Xmm::Xmm1, rtasm::CmpPredicate::Lt)?;
        a.movmskps(Gpr::Eax, Xmm::Xmm0)?;
        a.ret()?;
        Ok(())
    });
    let entry = unsafe { f.entry::<UnaryPtr<f32>>() }.unwrap();
    assert_eq!(entry.call([-1.0f32, 2.0, -3.0, 4.0].as_ptr()), 0b0101);
    assert_eq!(entry.call([1.0f32, 2.0, 3.0, 4.0].as_ptr()), 0);
}

#[test]
fn mmx_round_trip_with_emms() {
    let f = build(|a| {
        load_arg(a, Gpr::Edx, 1)?;
        a.movd(Mmx::Mm0, Gpr::Edx.deref())?;
        a.movd(Mmx::Mm1, Gpr::Edx.disp(4))?;
        a.movq(Mmx::Mm2, Mmx::Mm0)?;
        a.movd(Gpr::Eax, Mmx::Mm1)?;
        a.emms()?;
        a.ret()?;
        Ok(())
    });
    let data = [11i32, 22];
    let entry = unsafe { f.entry::<UnaryPtr<i32>>() }.unwrap();
    assert_eq!(entry.call(data.as_ptr()), 22);
}

// ─── x87 ──────────────────────────────────────────────────────────────────────

fn x87_copy(body: impl FnOnce(&mut Assembler) -> Result<(), AsmError>) -> Function {
    build(|a| {
        load_arg(a, Gpr::Edx, 1)?;
        load_arg(a, Gpr::Ecx, 2)?;
        body(a)?;
        a.ret()?;
        Ok(())
    })
}

#[test]
fn x87_stack_arithmetic() {
    let f = x87_copy(|a| {
        a.fld(Gpr::Edx.deref())?;
        a.fld1()?;
        a.faddp(rtasm::St::St1)?;
        a.fstp(Gpr::Ecx.deref())?;
        a.fld(Gpr::Edx.disp(4))?;
        a.fsub(rtasm::St::St0, Gpr::Edx.deref())?;
        a.fld(rtasm::St::St0)?;
        a.fmulp(rtasm::St::St1)?;
        a.fchs()?;
        a.fstp(Gpr::Ecx.disp(4))?;
        Ok(())
    });
    let src = [2.5f32, 10.0];
    let mut dst = [0.0f32; 2];
    let entry = unsafe { f.entry::<CopyFn<f32, f32>>() }.unwrap();
    entry.call(src.as_ptr(), dst.as_mut_ptr());
    assert_eq!(dst, [3.5, -56.25]);
}

#[test]
fn x87_compare_and_conditional_move_select_minimum() {
    let f = x87_copy(|a| {
        a.fld(Gpr::Edx.disp(4))?;
        a.fld(Gpr::Edx.deref())?;
        a.fcomi(rtasm::St::St1)?;
        a.fcmovnb(rtasm::St::St1)?;
        a.fstp(Gpr::Ecx.deref())?;
        a.fpop()?;
        Ok(())
    });
    let entry = unsafe { f.entry::<CopyFn<f32, f32>>() }.unwrap();
    for (src, min) in [([3.0f32, 1.0], 1.0f32), ([1.0, 3.0], 1.0), ([-2.0, -2.0], -2.0)] {
        let mut dst = [0.0f32];
        entry.call(src.as_ptr(), dst.as_mut_ptr());
        assert_eq!(dst[0], min);
    }
}

#[test]
fn x87_integer_store_rounds_to_nearest_even() {
    let f = x87_copy(|a| {
        a.fld(Gpr::Edx.deref())?;
        a.fistp(Gpr::Ecx.deref())?;
        a.fld(Gpr::Edx.disp(4))?;
        a.fprndint()?;
        a.fistp(Gpr::Ecx.disp(4))?;
        Ok(())
    });
    let src = [2.5f32, 3.7];
    let mut dst = [0i32; 2];
    let entry = unsafe { f.entry::<CopyFn<f32, i32>>() }.unwrap();
    entry.call(src.as_ptr(), dst.as_mut_ptr());
    assert_eq!(dst, [2, 4]);
}

// ─── Lifecycle ────────────────────────────────────────────────────────────────

#[test]
fn function_is_shareable_across_threads() {
    let f = std::sync::Arc::new(build(|a| {
        a.mov_imm(Gpr::Eax, 5)?.ret()?;
        Ok(())
    }));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let f = std::sync::Arc::clone(&f);
            std::thread::spawn(move || {
                let entry = unsafe { f.entry::<extern "C" fn() -> i32>() }.unwrap();
                entry.call()
            })
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 5);
    }
}

#[test]
fn finalize_rejects_unfinished_code() {
    let mut asm = Assembler::new(MODE);
    asm.mov_imm(Gpr::Eax, 1).unwrap();
    assert!(asm.finalize().unwrap_err().is_contract_violation());

    let asm = Assembler::new(MODE);
    assert!(asm.finalize().unwrap_err().is_contract_violation());

    let mut asm = Assembler::new(MODE);
    let _open = asm.jcc_forward(Cond::E).unwrap();
    asm.ret().unwrap();
    assert!(asm.finalize().unwrap_err().is_contract_violation());
}

#[test]
fn finalized_code_matches_emitted_bytes() {
    let mut asm = Assembler::new(MODE);
    asm.xor(Gpr::Eax, Gpr::Eax).unwrap().ret().unwrap();
    let f = asm.finalize().unwrap();
    assert_eq!(f.code(), &[0x33, 0xC0, 0xC3]);
    assert!(!f.as_ptr().is_null());
}

#[test]
fn operand_rebasing_walks_a_struct() {
    let f = build(|a| {
        load_arg(a, Gpr::Edx, 1)?;
        let base = Operand::from(Gpr::Edx);
        a.mov(Gpr::Eax, base.with_displacement(4)?)?;
        a.add(Gpr::Eax, base.with_displacement(4)?.with_displacement(4)?)?;
        a.ret()?;
        Ok(())
    });
    let data = [1i32, 2, 3];
    let entry = unsafe { f.entry::<UnaryPtr<i32>>() }.unwrap();
    assert_eq!(entry.call(data.as_ptr()), 5);
}
