use crate::error::Result;
use crate::isa::vvengine::{VvOp, ADDR_WIDTH, ID_FIELD_WIDTH};
use crate::params::VvParams;

use super::narrow;

/// NOPs the VV-Engine pipeline needs at a synchronization barrier.
pub const VV_SYNC_NOPS: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VvMacro {
    Sync,
    ClearReg { reg: u32 },
    /// Element `i` of the fixed-point `vector` goes to register `reg` of block `i`.
    LoadVec { reg: u32, vector: Vec<i32> },
}

impl VvMacro {
    pub fn expand(&self, p: &VvParams) -> Result<Vec<VvOp>> {
        let mut ops = Vec::new();
        match *self {
            VvMacro::Sync => ops.resize(VV_SYNC_NOPS, VvOp::Nop),
            VvMacro::ClearReg { reg } => {
                ops.push(VvOp::SelectAll);
                ops.push(VvOp::Write { addr: narrow(p.reg_addr(reg), ADDR_WIDTH)?, data: 0 });
            }
            VvMacro::LoadVec { reg, ref vector } => {
                let addr = narrow(p.reg_addr(reg), ADDR_WIDTH)?;
                for (id, &val) in (0u32..).zip(vector) {
                    if val == 0 {
                        continue;
                    }
                    p.validate_id(id)?;
                    p.validate_data(val)?;
                    ops.push(VvOp::SelectBlk { id: narrow(id, ID_FIELD_WIDTH)? });
                    ops.push(VvOp::Write { addr, data: val as i16 });
                }
            }
        }
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Config;

    #[test]
    fn sync_is_a_single_nop() {
        assert_eq!(VvMacro::Sync.expand(&Config::default().vv).unwrap(), vec![VvOp::Nop]);
    }

    #[test]
    fn clear_reg_is_select_all_and_one_write() {
        let ops = VvMacro::ClearReg { reg: 200 }.expand(&Config::default().vv).unwrap();
        assert_eq!(ops, vec![VvOp::SelectAll, VvOp::Write { addr: 200, data: 0 }]);
    }

    #[test]
    fn load_vec_writes_nonzero_elements_per_block() {
        let ops = VvMacro::LoadVec { reg: 5, vector: vec![0, -7, 0, 9] }.expand(&Config::default().vv).unwrap();
        assert_eq!(
            ops,
            vec![
                VvOp::SelectBlk { id: 1 },
                VvOp::Write { addr: 5, data: -7 },
                VvOp::SelectBlk { id: 3 },
                VvOp::Write { addr: 5, data: 9 },
            ]
        );
    }
}
