use davinci_asm::bitfield::total_width;
use davinci_asm::program::Assembly;
use davinci_asm::{DavinciAsm, ExportOptions, Register, S};

fn bare() -> ExportOptions {
    ExportOptions { comment: false, source: false, separator: String::new() }
}

#[test]
fn clear_then_write_exports_in_emission_order() {
    let mut asm = DavinciAsm::new();
    asm.mv_clear_reg(0).unwrap();
    asm.mv_write(5, 10).unwrap();
    asm.assemble().unwrap();

    let text = asm.export_verilog_bin(&bare()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    // clear: select_all + one write per bit-row, then the user write
    assert_eq!(lines.len(), 1 + 16 + 1);
    assert!(lines.iter().all(|l| l.len() == 32 && l.chars().all(|c| c == '0' || c == '1')));
    // select_all
    assert_eq!(lines[0], format!("00{:04b}{:010b}{:016b}", 6, 3 << 6, 0));
    // first bit-row of register 0
    assert_eq!(lines[1], format!("00{:04b}{:010b}{:016b}", 1, 0, 0));
    // the user write comes last
    assert_eq!(lines[17], format!("00{:04b}{:010b}{:016b}", 1, 5, 10));
}

#[test]
fn every_word_is_32_bits() {
    let mut asm = DavinciAsm::new();
    asm.mv_mult(4, 1, 2).unwrap();
    asm.mv_all_accum(3, 4).unwrap();
    asm.mv_load_vec_row(1, &[1, -1, 3]).unwrap();
    asm.mv_select_block(255, 255).unwrap();
    asm.vv_load_vec(9, &[7, 0, -7]).unwrap();
    asm.vv_mult(Register::Ordinary(255), S).unwrap();
    asm.vv_activation(2).unwrap();
    asm.vv_write(1023, -32768).unwrap();
    asm.mv_sync().unwrap();
    asm.vv_sync().unwrap();
    asm.assemble().unwrap();

    for instr in asm.instructions() {
        let assembly = instr.assembly().unwrap();
        assert_ne!(*assembly, Assembly::Pseudo);
        for segs in assembly.segments() {
            assert_eq!(total_width(&segs[1..]), 30, "{}", instr.src());
            assert_eq!(total_width(&segs), 32, "{}", instr.src());
        }
    }
    let text = asm.export_verilog_bin(&ExportOptions { separator: "_".into(), ..bare() }).unwrap();
    for line in text.lines() {
        assert_eq!(line.replace('_', "").len(), 32);
    }
}

#[test]
fn sync_pads_each_stream() {
    let mut asm = DavinciAsm::new();
    asm.mv_sync().unwrap();
    asm.vv_sync().unwrap();
    // two GEMV nops then one VV nop
    assert_eq!(asm.words().unwrap(), vec![0, 0, 1 << 30]);
}
