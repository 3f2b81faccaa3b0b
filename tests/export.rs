use davinci_asm::{AsmParams, DavinciAsm, ExportOptions, Register, Script, C_HEADER, S};

const PROGRAM: &str = r#"{
    "params": { "fracWidth": 8, "mvBlockDim": [2, 2], "maxLevel": 0 },
    "program": [
        { "op": "as_comment", "text": "layer 0" },
        { "op": "mv_write", "addr": 5, "data": 10, "note": "seed" },
        { "op": "vv_sync" },
        { "op": "vv_add", "opl": 1, "opr": "S" }
    ]
}"#;

#[test]
fn script_replay_matches_direct_calls() {
    let mut scripted = Script::from_json_str(PROGRAM).unwrap().build().unwrap();

    let params = AsmParams { frac_width: 8, mv_block_dim: Some((2, 2)), max_level: 0, ..Default::default() };
    let mut direct = DavinciAsm::with_params(&params).unwrap();
    direct.as_comment("layer 0");
    direct.note("seed").mv_write(5, 10).unwrap();
    direct.vv_sync().unwrap();
    direct.vv_add(Register::Ordinary(1), S).unwrap();

    let opts = ExportOptions::default();
    assert_eq!(scripted.export_verilog_bin(&opts).unwrap(), direct.export_verilog_bin(&opts).unwrap());
    assert_eq!(scripted.words().unwrap(), direct.words().unwrap());
}

#[test]
fn verilog_text_with_annotations() {
    let mut asm = Script::from_json_str(PROGRAM).unwrap().build().unwrap();
    let text = asm.export_verilog_bin(&ExportOptions::default()).unwrap();
    let expected = "\
// layer 0
00_0001_0000000101_0000000000001010  // MV_WRITE addr=5, data=0xA; seed
// ---- MACRO: VV_SYNC
01_00000_000000000_0000000000000000
// ---- End of MACRO
01_00100_000000000_0000000100000000  // VV_ADD_XSREG rx=1
";
    assert_eq!(text, expected);
}

#[test]
fn c_program_carries_the_configuration() {
    let mut asm = Script::from_json_str(PROGRAM).unwrap().build().unwrap();
    let opts = ExportOptions { comment: false, ..Default::default() };
    let text = asm.export_c_prog_hex("layer0", &opts).unwrap();
    assert!(text.starts_with("#include \"davinci_prog.h\"\n\n\nstatic const uint32_t word_arr[] = {\n"));
    assert!(text.contains("    0x0405000A,   // MV_WRITE addr=5, data=0xA\n"), "{text}");
    assert!(text.contains("    0x40000000, \n"));
    assert!(text.contains("    0x48000100,   // VV_ADD_XSREG rx=1\n"));
    assert!(!text.contains("layer 0"));
    assert!(!text.contains("MACRO"));
    assert!(text.contains("Davinci_Prog layer0 = {\n    word_arr,\n    sizeof(word_arr)/sizeof(word_arr[0]),   // size\n"));
    assert!(text.contains("    8,    // fracWidth\n    2,   // mvMaxRow\n    32,   // mvMaxCol\n"));
}

#[test]
fn c_header_declares_the_program_struct() {
    assert!(C_HEADER.starts_with("#ifndef DAVINCI_PROG_H\n#define DAVINCI_PROG_H\n"));
    assert!(C_HEADER.contains("    const uint32_t * const instruction;\n"));
    assert!(C_HEADER.contains("} Davinci_Prog;\n"));
}
