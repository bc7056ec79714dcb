#![no_main]
use libfuzzer_sys::fuzz_target;
use rtasm::{Assembler, CmpPredicate, Cond, Fixup, Gpr, Label, Mmx, Operand, St, X86Mode, Xmm};

/// Decode one operand from two fuzz bytes.
fn operand(sel: u8, disp: u8) -> Operand {
    let code = sel & 7;
    match (sel >> 3) & 3 {
        0 => Gpr::ALL[code as usize].into(),
        1 => Xmm::ALL[code as usize].into(),
        2 => Mmx::ALL[code as usize].into(),
        _ => {
            let disp = i32::from(disp as i8) * i32::from(1 + (sel >> 5));
            Gpr::ALL[code as usize].disp(disp).into()
        }
    }
}

fuzz_target!(|data: &[u8]| {
    // Drive the builder with arbitrary calls; it must only ever return
    // Ok/Err, never panic, and never exceed its capacity.
    let Some((&first, rest)) = data.split_first() else {
        return;
    };
    let mode = if first & 1 == 0 {
        X86Mode::Mode32
    } else {
        X86Mode::Mode64
    };
    let capacity = usize::from(first >> 1) * 4;
    let mut asm = Assembler::with_capacity(mode, capacity);
    let mut labels: Vec<Label> = Vec::new();
    let mut fixups: Vec<Fixup> = Vec::new();

    for chunk in rest.chunks_exact(5) {
        let dst = operand(chunk[1], chunk[3]);
        let src = operand(chunk[2], chunk[4]);
        let cond = Cond::ALL[usize::from(chunk[3] & 15)];
        let st = St::ALL[usize::from(chunk[2] & 7)];
        let _ = match chunk[0] % 28 {
            0 => asm.mov(dst, src).map(drop),
            1 => asm.add(dst, src).map(drop),
            2 => asm.xor(dst, src).map(drop),
            3 => asm.cmp_imm(dst, i32::from(chunk[4] as i8) << (chunk[2] & 15)).map(drop),
            4 => asm.push(dst).map(drop),
            5 => asm.pop(dst).map(drop),
            6 => asm.lea(dst, src).map(drop),
            7 => asm.inc(dst).map(drop),
            8 => asm.movups(dst, src).map(drop),
            9 => asm.addps(dst, src).map(drop),
            10 => asm.shufps(dst, src, chunk[4]).map(drop),
            11 => asm.cmpps(dst, src, CmpPredicate::Le).map(drop),
            12 => asm.movq(dst, src).map(drop),
            13 => asm.movd(dst, src).map(drop),
            14 => asm.packuswb(dst, src).map(drop),
            15 => asm.movmskps(dst, src).map(drop),
            16 => asm.emms().map(drop),
            17 => {
                labels.push(asm.label());
                Ok(())
            }
            18 => match labels.get(usize::from(chunk[4]) % labels.len().max(1)) {
                Some(&label) => asm.jcc(cond, label).map(drop),
                None => Ok(()),
            },
            19 => asm.jcc_forward(cond).map(|f| fixups.push(f)),
            20 => match fixups.pop() {
                Some(f) => asm.fixup_forward(f).map(drop),
                None => Ok(()),
            },
            21 => asm.argument(u32::from(chunk[4])).map(drop),
            22 => asm.ret().map(drop),
            23 => asm.fadd(dst, st).map(drop),
            24 => asm.fstp(dst).map(drop),
            25 => asm.fcmovb(st).map(drop),
            26 => asm.ret_imm16(u16::from_le_bytes([chunk[3], chunk[4]])).map(drop),
            _ => {
                asm.reset();
                Ok(())
            }
        };
        assert!(asm.len() <= capacity);
    }

    let _ = asm.finish();
});
