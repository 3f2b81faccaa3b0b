use crate::error::Result;
use crate::isa::picaso::{PicasoOp, SelectFn, ADDR_WIDTH, ID_FIELD_WIDTH, REG_FIELD_WIDTH};
use crate::params::PicasoParams;
use crate::transpose::{BramImage, Transposer};

use super::narrow;

/// NOPs the GEMV pipeline needs to line up with the VV-Engine at a barrier.
/// Tied to the current hardware revision.
pub const GEMV_SYNC_NOPS: usize = 2;

/// GEMV macros with their validated arguments. Load macros carry the
/// fixed-point image of the input, converted when the macro was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GemvMacro {
    /// `pp_reg:pp_reg+1 = multiplicand * multiplier`
    Mult { pp_reg: u32, multiplicand: u32, multiplier: u32 },
    BlockAccum { rd: u32, rs: u32 },
    Sync,
    ClearReg { reg: u32 },
    LoadMat { reg: u32, matrix: Vec<Vec<i32>> },
    LoadVecRow { reg: u32, vector: Vec<i32> },
    LoadVecCol { reg: u32, vector: Vec<i32> },
}

impl GemvMacro {
    pub fn expand(&self, p: &PicasoParams) -> Result<Vec<PicasoOp>> {
        let reg = |r: u32| narrow::<u8>(r, REG_FIELD_WIDTH);
        let t = Transposer::new(p.pe_count, p.reg_width);
        let mut ops = Vec::new();
        match *self {
            GemvMacro::Mult { pp_reg, multiplicand, multiplier } => {
                let (pp_reg, multiplicand, multiplier) = (reg(pp_reg)?, reg(multiplicand)?, reg(multiplier)?);
                ops.push(PicasoOp::ClrMbit);
                // Booth steps must run LSB first
                for offset in 0..p.reg_width {
                    ops.push(PicasoOp::UpdatePp { offset: offset as u8, pp_reg, multiplicand, multiplier });
                }
            }
            GemvMacro::BlockAccum { rd, rs } => {
                let (rd, rs) = (reg(rd)?, reg(rs)?);
                ops.push(PicasoOp::AccumBlk { fold: 1, rd, rs });
                for fold in 2..=p.max_fold {
                    ops.push(PicasoOp::AccumBlk { fold: fold as u8, rd, rs: rd });
                }
            }
            GemvMacro::Sync => ops.resize(GEMV_SYNC_NOPS, PicasoOp::Nop),
            GemvMacro::ClearReg { reg: r } => {
                ops.push(PicasoOp::Select { func: SelectFn::All, row_id: 0, col_id: 0 });
                for bit in 0..p.reg_width {
                    ops.push(PicasoOp::Write { addr: narrow(p.reg_addr(r, bit), ADDR_WIDTH)?, data: 0 });
                }
            }
            GemvMacro::LoadMat { reg: r, ref matrix } => {
                for (row, images) in t.matrix(matrix)?.iter().enumerate() {
                    for (col, image) in images.iter().enumerate() {
                        let select = PicasoOp::Select { func: SelectFn::Block, row_id: id(p, "rowID", row)?, col_id: id(p, "colID", col)? };
                        write_nonzero(p, r, select, image, &mut ops)?;
                    }
                }
            }
            GemvMacro::LoadVecRow { reg: r, ref vector } => {
                for (col, image) in t.row_vec(vector)?.iter().enumerate() {
                    let select = PicasoOp::Select { func: SelectFn::Col, row_id: 0, col_id: id(p, "colID", col)? };
                    write_nonzero(p, r, select, image, &mut ops)?;
                }
            }
            GemvMacro::LoadVecCol { reg: r, ref vector } => {
                for (row, image) in t.col_vec(vector)?.iter().enumerate() {
                    let select = PicasoOp::Select { func: SelectFn::Row, row_id: id(p, "rowID", row)?, col_id: 0 };
                    write_nonzero(p, r, select, image, &mut ops)?;
                }
            }
        }
        Ok(ops)
    }
}

fn id(p: &PicasoParams, what: &'static str, index: usize) -> Result<u8> {
    let index = u32::try_from(index).unwrap_or(u32::MAX);
    p.validate_id(what, index)?;
    narrow(index, ID_FIELD_WIDTH)
}

/// Emits writes for the non-zero bit-rows of `image`, preceded by `select`
/// only if at least one row is written. Zero rows rely on a prior clear.
fn write_nonzero(p: &PicasoParams, reg: u32, select: PicasoOp, image: &BramImage, ops: &mut Vec<PicasoOp>) -> Result<()> {
    let mut selected = false;
    for (bit, &data) in (0u32..).zip(image) {
        if data == 0 {
            continue;
        }
        if !selected {
            ops.push(select);
            selected = true;
        }
        ops.push(PicasoOp::Write { addr: narrow(p.reg_addr(reg, bit), ADDR_WIDTH)?, data });
    }
    Ok(())
}
