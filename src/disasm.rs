use crate::decoder::Decoded;
use crate::expand::{GemvMacro, VvMacro};
use crate::isa::picaso::{AluFn, PicasoOp, SelectFn};
use crate::isa::vvengine::VvOp;

/// PiCaSO mnemonic with its operands, without the `MV_` prefix.
pub fn fmt_picaso(op: &PicasoOp) -> String {
    match *op {
        PicasoOp::Nop => "NOP".to_string(),
        PicasoOp::Write { addr, data } => format!("WRITE addr={addr}, data=0x{data:X}"),
        PicasoOp::Alu { func, rd, rs1, rs2 } => {
            let name = match func {
                AluFn::Add => "ADD",
                AluFn::Cpx => "CPX",
                AluFn::Cpy => "CPY",
                AluFn::Sub => "SUB",
            };
            format!("{name} rd={rd}, rs1={rs1}, rs2={rs2}")
        }
        PicasoOp::UpdatePp { offset, pp_reg, multiplicand, multiplier } => format!(
            "UPDATEPP ppreg={{{pp_reg}, {}}}, multiplicand={multiplicand}, multiplier={multiplier}, bitNo={offset}",
            u32::from(pp_reg) + 1
        ),
        PicasoOp::AccumBlk { fold, rd, rs } => format!("BLOCK_FOLD fold={fold}, dest={rd}, src={rs}"),
        PicasoOp::AccumRow { level, reg } => format!("ACCUM_ROW level={level}, reg={reg}"),
        PicasoOp::Select { func: SelectFn::Block, row_id, col_id } => format!("SELECT_BLOCK rowID={row_id}, colID={col_id}"),
        PicasoOp::Select { func: SelectFn::Row, row_id, .. } => format!("SELECT_ROW rowID={row_id}"),
        PicasoOp::Select { func: SelectFn::Col, col_id, .. } => format!("SELECT_COL colID={col_id}"),
        PicasoOp::Select { func: SelectFn::All, .. } => "SELECT_ALL".to_string(),
        PicasoOp::MovOffset { offset: 0, rd, rs } => format!("MOV dest={rd}, src={rs}"),
        PicasoOp::MovOffset { offset, rd, rs } => format!("MOV_OFFSET offset={offset}, dest={rd}, src={rs}"),
        PicasoOp::ClrMbit => "CLRMBIT".to_string(),
    }
}

/// VV-Engine mnemonic with its operands, without the `VV_` prefix.
pub fn fmt_vv(op: &VvOp) -> String {
    match *op {
        VvOp::Nop => "NOP".to_string(),
        VvOp::Xy { func, rx, ry } => format!("{}_XY rx={rx}, ry={ry}", func.name()),
        VvOp::Xsreg { func, rx } => format!("{}_XSREG rx={rx}", func.name()),
        VvOp::Relu => "RELU".to_string(),
        VvOp::ActLookup { code } => format!("ACTLOOKUP actCode={code}"),
        VvOp::ShiftOff => "SHIFTOFF".to_string(),
        VvOp::SerialEn => "SERIAL_EN".to_string(),
        VvOp::ParallelEn => "PARALLEL_EN".to_string(),
        VvOp::SelectBlk { id } => format!("SELECT_BLOCK blkID={id}"),
        VvOp::SelectAll => "SELECT_ALL".to_string(),
        VvOp::MovO2Sreg => "MOV_O2SREG".to_string(),
        VvOp::MovY2Sreg { ry } => format!("MOV_Y2SREG ry={ry}"),
        VvOp::MovSreg2R { rd } => format!("MOV_SREG2R rd={rd}"),
        VvOp::MovOreg2R { rd } => format!("MOV_OREG2R rd={rd}"),
        VvOp::MovY2Oreg { ry } => format!("MOV_Y2OREG ry={ry}"),
        VvOp::MovOreg2Act => "MOV_OREG2ACT".to_string(),
        VvOp::MovX2Act { rx } => format!("MOV_X2ACT rx={rx}"),
        VvOp::Write { addr, data } => format!("WRITE addr={addr}, data={data}"),
    }
}

/// Mnemonic of a decoded word, prefixed with its submodule.
pub fn fmt_decoded(d: &Decoded) -> String {
    match d {
        Decoded::Gemv(op) => format!("MV_{}", fmt_picaso(op)),
        Decoded::Vv(op) => format!("VV_{}", fmt_vv(op)),
    }
}

/// Source text of a GEMV macro call, as stored on its program record.
pub fn fmt_gemv_macro(m: &GemvMacro) -> String {
    match m {
        GemvMacro::Mult { pp_reg, multiplicand, multiplier } => {
            format!("MV_MULT rd={pp_reg}, multiplicand={multiplicand}, multiplier={multiplier}")
        }
        GemvMacro::BlockAccum { rd, rs } => format!("MV_BLOCK_ACCUM rd={rd}, rs={rs}"),
        GemvMacro::Sync => "MV_SYNC".to_string(),
        GemvMacro::ClearReg { reg } => format!("MV_CLRREG reg={reg}"),
        GemvMacro::LoadMat { matrix, .. } => {
            let cols = matrix.iter().map(Vec::len).max().unwrap_or(0);
            format!("MV_LOADMAT Mat({}, {cols})", matrix.len())
        }
        GemvMacro::LoadVecRow { vector, .. } => format!("MV_LOADVEC_ROW Vec({})", vector.len()),
        GemvMacro::LoadVecCol { vector, .. } => format!("MV_LOADVEC_COL Vec({})", vector.len()),
    }
}

/// Source text of a VV-Engine macro call.
pub fn fmt_vv_macro(m: &VvMacro) -> String {
    match m {
        VvMacro::Sync => "VV_SYNC".to_string(),
        VvMacro::ClearReg { reg } => format!("VV_CLRREG reg={reg}"),
        VvMacro::LoadVec { vector, .. } => format!("VV_LOADVEC Vec({})", vector.len()),
    }
}
