//! JSON program scripts.
//!
//! A script is an optional parameter block plus an ordered list of calls,
//! one per mnemonic or macro, replayed against a [`DavinciAsm`]:
//!
//! ```json
//! { "params": { "fracWidth": 8 },
//!   "program": [
//!     { "op": "mv_clear_reg", "reg": 0 },
//!     { "op": "mv_write", "addr": 5, "data": 10, "note": "seed" },
//!     { "op": "vv_mov", "rd": "S", "rs": 3 }
//!   ] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AsmError, Result};
use crate::isa::vvengine::Register;
use crate::params::AsmParams;
use crate::program::DavinciAsm;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Call {
    MvNop,
    MvWrite { addr: u32, data: u32 },
    MvAdd { rd: u32, rs1: u32, rs2: u32 },
    MvSub { rd: u32, rs1: u32, rs2: u32 },
    MvUpdatepp { pp_reg: u32, multiplicand: u32, multiplier: u32, bit_no: u32 },
    MvBlockFold { fold: u32, rd: u32, rs: u32 },
    MvAccumRow { level: u32, reg: u32 },
    MvSelectBlock { row_id: u32, col_id: u32 },
    MvSelectRow { row_id: u32 },
    MvSelectCol { col_id: u32 },
    MvSelectAll,
    MvMov { rd: u32, rs: u32 },
    MvMovOffset { offset: u32, rd: u32, rs: u32 },

    VvNop,
    VvWrite { addr: u32, data: i32 },
    VvMov { rd: Register, rs: Register },
    VvAdd { opl: Register, opr: Register },
    VvSub { opl: Register, opr: Register },
    VvMult { opl: Register, opr: Register },
    VvActivation { code: u32 },
    VvShiftOff,
    VvSerialEn,
    VvParallelEn,
    VvSelectBlk { id: u32 },
    VvSelectAll,

    MvMult { rd: u32, multiplicand: u32, multiplier: u32 },
    MvMultFxp { rd: u32, multiplicand: u32, multiplier: u32 },
    MvBlockAccum { rd: u32, rs: u32 },
    MvRangeAccum { col_cnt: u32, rd: u32, rs: u32 },
    MvAllAccum { rd: u32, rs: u32 },
    MvSync,
    MvClearReg { reg: u32 },
    MvLoadMat { reg: u32, matrix: Vec<Vec<f64>> },
    MvLoadVecRow { reg: u32, vector: Vec<f64> },
    MvLoadVecCol { reg: u32, vector: Vec<f64> },
    VvSync,
    VvClearReg { reg: u32 },
    VvLoadVec { reg: u32, vector: Vec<f64> },

    AsComment { text: String },
}

impl Call {
    /// Issues the call; returns the number of records appended.
    pub fn apply(&self, asm: &mut DavinciAsm) -> Result<usize> {
        match self {
            Call::MvNop => asm.mv_nop().map(one),
            Call::MvWrite { addr, data } => asm.mv_write(*addr, *data).map(one),
            Call::MvAdd { rd, rs1, rs2 } => asm.mv_add(*rd, *rs1, *rs2).map(one),
            Call::MvSub { rd, rs1, rs2 } => asm.mv_sub(*rd, *rs1, *rs2).map(one),
            Call::MvUpdatepp { pp_reg, multiplicand, multiplier, bit_no } => {
                asm.mv_updatepp(*pp_reg, *multiplicand, *multiplier, *bit_no).map(one)
            }
            Call::MvBlockFold { fold, rd, rs } => asm.mv_block_fold(*fold, *rd, *rs).map(one),
            Call::MvAccumRow { level, reg } => asm.mv_accum_row(*level, *reg).map(one),
            Call::MvSelectBlock { row_id, col_id } => asm.mv_select_block(*row_id, *col_id).map(one),
            Call::MvSelectRow { row_id } => asm.mv_select_row(*row_id).map(one),
            Call::MvSelectCol { col_id } => asm.mv_select_col(*col_id).map(one),
            Call::MvSelectAll => asm.mv_select_all().map(one),
            Call::MvMov { rd, rs } => asm.mv_mov(*rd, *rs).map(one),
            Call::MvMovOffset { offset, rd, rs } => asm.mv_mov_offset(*offset, *rd, *rs).map(one),

            Call::VvNop => asm.vv_nop().map(one),
            Call::VvWrite { addr, data } => asm.vv_write(*addr, *data).map(one),
            Call::VvMov { rd, rs } => asm.vv_mov(*rd, *rs).map(one),
            Call::VvAdd { opl, opr } => asm.vv_add(*opl, *opr).map(one),
            Call::VvSub { opl, opr } => asm.vv_sub(*opl, *opr).map(one),
            Call::VvMult { opl, opr } => asm.vv_mult(*opl, *opr).map(one),
            Call::VvActivation { code } => asm.vv_activation(*code).map(one),
            Call::VvShiftOff => asm.vv_shift_off().map(one),
            Call::VvSerialEn => asm.vv_serial_en().map(one),
            Call::VvParallelEn => asm.vv_parallel_en().map(one),
            Call::VvSelectBlk { id } => asm.vv_select_blk(*id).map(one),
            Call::VvSelectAll => asm.vv_select_all().map(one),

            Call::MvMult { rd, multiplicand, multiplier } => asm.mv_mult(*rd, *multiplicand, *multiplier).map(one),
            Call::MvMultFxp { rd, multiplicand, multiplier } => {
                asm.mv_mult_fxp(*rd, *multiplicand, *multiplier).map(<[_]>::len)
            }
            Call::MvBlockAccum { rd, rs } => asm.mv_block_accum(*rd, *rs).map(one),
            Call::MvRangeAccum { col_cnt, rd, rs } => asm.mv_range_accum(*col_cnt, *rd, *rs).map(<[_]>::len),
            Call::MvAllAccum { rd, rs } => asm.mv_all_accum(*rd, *rs).map(<[_]>::len),
            Call::MvSync => asm.mv_sync().map(one),
            Call::MvClearReg { reg } => asm.mv_clear_reg(*reg).map(one),
            Call::MvLoadMat { reg, matrix } => asm.mv_load_mat::<f64, _>(*reg, matrix).map(<[_]>::len),
            Call::MvLoadVecRow { reg, vector } => asm.mv_load_vec_row(*reg, vector).map(<[_]>::len),
            Call::MvLoadVecCol { reg, vector } => asm.mv_load_vec_col(*reg, vector).map(<[_]>::len),
            Call::VvSync => asm.vv_sync().map(one),
            Call::VvClearReg { reg } => asm.vv_clear_reg(*reg).map(one),
            Call::VvLoadVec { reg, vector } => asm.vv_load_vec(*reg, vector).map(<[_]>::len),

            Call::AsComment { text } => {
                asm.as_comment(text.as_str());
                Ok(1)
            }
        }
    }
}

fn one<T>(_: T) -> usize {
    1
}

/// One program step: a call and the user comment attached to its records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub call: Call,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl From<Call> for Step {
    fn from(call: Call) -> Self {
        Self { call, note: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    pub params: Option<AsmParams>,
    pub program: Vec<Step>,
}

impl Script {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| AsmError::Parse { line: e.line(), reason: e.to_string() })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json_str(&AsmError::read_file(path)?)
    }

    /// Replays every step in order, stopping at the first failing one.
    pub fn apply(&self, asm: &mut DavinciAsm) -> Result<usize> {
        let mut appended = 0;
        for (n, step) in self.program.iter().enumerate() {
            if let (Some(note), false) = (&step.note, matches!(step.call, Call::AsComment { .. })) {
                asm.note(note.as_str());
            }
            let count = step.call.apply(asm)?;
            debug!(step = n, count, "applied");
            appended += count;
        }
        Ok(appended)
    }

    /// A fresh assembler set up with the script parameters, holding the program.
    pub fn build(&self) -> Result<DavinciAsm> {
        let mut asm = DavinciAsm::with_params(&self.params.clone().unwrap_or_default())?;
        self.apply(&mut asm)?;
        Ok(asm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::vvengine::S;
    use pretty_assertions::assert_eq;

    #[test]
    fn calls_parse_by_op_tag() {
        let step: Step = serde_json::from_str(r#"{"op": "vv_mov", "rd": "S", "rs": 3, "note": "shift in"}"#).unwrap();
        assert_eq!(step.call, Call::VvMov { rd: S, rs: Register::Ordinary(3) });
        assert_eq!(step.note.as_deref(), Some("shift in"));

        let step: Step = serde_json::from_str(r#"{"op": "mv_sync"}"#).unwrap();
        assert_eq!(step, Step::from(Call::MvSync));
    }

    #[test]
    fn unknown_op_is_a_parse_error() {
        let err = Script::from_json_str(r#"{"program": [{"op": "mv_frobnicate"}]}"#).unwrap_err();
        assert!(matches!(err, AsmError::Parse { .. }), "{err}");
    }

    #[test]
    fn missing_program_file_is_an_io_error() {
        let err = Script::from_json_file(Path::new("no/such/program.json")).unwrap_err();
        assert!(matches!(&err, AsmError::Io { path, .. } if path.ends_with("program.json")), "{err}");
        assert!(matches!(AsmParams::from_json_file(Path::new("no/such/params.json")), Err(AsmError::Io { .. })));
    }

    #[test]
    fn build_applies_params_and_notes() {
        let text = r#"{
            "params": { "fracWidth": 4 },
            "program": [
                { "op": "vv_load_vec", "reg": 2, "vector": [1.5], "note": "bias" },
                { "op": "as_comment", "text": "done" }
            ]
        }"#;
        let asm = Script::from_json_str(text).unwrap().build().unwrap();
        assert_eq!(asm.config().frac_width, 4);
        let recs = asm.instructions();
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[1].comment(), Some("bias"));
        assert_eq!(recs[2].comment(), Some("done"));
    }

    #[test]
    fn failing_step_stops_the_replay() {
        let script = Script {
            params: None,
            program: vec![Call::MvNop.into(), Call::MvAdd { rd: 99, rs1: 0, rs2: 0 }.into(), Call::VvNop.into()],
        };
        let mut asm = DavinciAsm::new();
        assert!(script.apply(&mut asm).is_err());
        assert_eq!(asm.instructions().len(), 1);
    }
}
