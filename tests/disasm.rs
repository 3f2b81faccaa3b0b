use davinci_asm::decoder::{parse_verilog_bin, Decoded, Decoder, DavinciDecoder};
use davinci_asm::disasm::fmt_decoded;
use davinci_asm::isa::vvengine::VvOp;
use davinci_asm::{AsmError, DavinciAsm, ExportOptions, Register, ACT, O, S};

#[test]
fn exported_program_disassembles_back() {
    let mut asm = DavinciAsm::new();
    asm.note("seed").mv_write(5, 10).unwrap();
    asm.mv_add(1, 2, 3).unwrap();
    asm.mv_mov_offset(4, 6, 8).unwrap();
    asm.vv_mov(S, Register::Ordinary(3)).unwrap();
    asm.vv_mov(ACT, O).unwrap();
    asm.vv_activation(0).unwrap();
    asm.vv_activation(1).unwrap();
    asm.as_comment("end");

    let text = asm.export_verilog_bin(&ExportOptions::default()).unwrap();
    let words = parse_verilog_bin(&text).unwrap();
    let listing: Vec<String> = words.iter().map(|&w| fmt_decoded(&DavinciDecoder.decode(w).unwrap())).collect();
    let srcs: Vec<&str> = asm.instructions().iter().take(7).map(|i| i.src()).collect();
    assert_eq!(listing, srcs);
    assert_eq!(
        listing,
        vec![
            "MV_WRITE addr=5, data=0xA",
            "MV_ADD rd=1, rs1=2, rs2=3",
            "MV_MOV_OFFSET offset=4, dest=6, src=8",
            "VV_MOV_Y2SREG ry=3",
            "VV_MOV_OREG2ACT",
            "VV_RELU",
            "VV_ACTLOOKUP actCode=1",
        ]
    );
}

#[test]
fn vv_write_address_msb_rides_in_the_opcode() {
    let mut asm = DavinciAsm::new();
    asm.vv_write(0x1FF, 1).unwrap();
    asm.vv_write(0x200, 1).unwrap();
    let words = asm.words().unwrap();
    // opcode 30 for the low half of the address space, 31 for the high half
    assert_eq!(words[0] >> 25, 1 << 5 | 30);
    assert_eq!(words[1] >> 25, 1 << 5 | 31);
    assert_eq!(words[1] >> 16 & 0x1FF, 0);
    assert_eq!(DavinciDecoder.decode(words[1]).unwrap(), Decoded::Vv(VvOp::Write { addr: 0x200, data: 1 }));
}

#[test]
fn invalid_register_combinations_fail() {
    let mut asm = DavinciAsm::new();
    assert!(matches!(asm.vv_mov(O, S), Err(AsmError::RegisterCombination(_))));
    assert!(matches!(asm.vv_mov(Register::Ordinary(1), Register::Ordinary(2)), Err(AsmError::RegisterCombination(_))));
    assert!(matches!(asm.vv_add(S, Register::Ordinary(1)), Err(AsmError::RegisterCombination(_))));
    assert!(matches!(asm.vv_mult(Register::Ordinary(1), O), Err(AsmError::RegisterCombination(_))));
    assert!(asm.vv_activation(4).is_err());
    assert!(asm.instructions().is_empty());
}

#[test]
fn validator_boundaries() {
    let mut asm = DavinciAsm::new();
    assert!(asm.mv_add(15, 15, 15).is_ok());
    assert!(asm.mv_add(16, 0, 0).is_err());
    assert!(asm.mv_write(1023, 0xFFFF).is_ok());
    assert!(asm.mv_write(1024, 0).is_err());
    assert!(asm.mv_write(0, 0x1_0000).is_err());
    assert!(asm.mv_select_block(255, 0).is_ok());
    assert!(asm.mv_select_block(256, 0).is_err());
    assert!(asm.mv_block_fold(4, 0, 1).is_ok());
    assert!(asm.mv_block_fold(5, 0, 1).is_err());
    assert!(asm.mv_accum_row(3, 0).is_ok());
    assert!(asm.mv_accum_row(4, 0).is_err());
    assert!(asm.mv_mov_offset(15, 0, 1).is_ok());
    assert!(asm.mv_mov_offset(16, 0, 1).is_err());
    assert!(asm.vv_write(1023, 32767).is_ok());
    assert!(asm.vv_write(0, 32768).is_err());
    assert!(asm.vv_write(0, -32769).is_err());
    assert!(asm.vv_select_blk(255).is_ok());
    assert!(asm.vv_select_blk(256).is_err());
}
