//! VV-Engine (vector-vector block) controller instruction set.
//!
//! Word layout: `[opcode:5] [mid:9] [low:16]`. The write instruction owns two
//! opcodes (30 and 31); the opcode LSB carries the address MSB, which is why
//! the mid segment is one bit narrower than an address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bitfield::{fit, Segment, SubWord};
use crate::error::{AsmError, Result};
use crate::params::VvParams;

pub const OPCODE_WIDTH: u8 = 5;
pub const ADDR_WIDTH: u8 = 10;
pub const DATA_WIDTH: u8 = 16;
pub const REG_FIELD_WIDTH: u8 = 8;
pub const ID_FIELD_WIDTH: u8 = 8;
pub const ACTCODE_WIDTH: u8 = 2;
pub const MID_WIDTH: u8 = ADDR_WIDTH - 1;

/// Segment widths, MSB first.
pub const SEGMENT_WIDTHS: [u8; 3] = [OPCODE_WIDTH, MID_WIDTH, DATA_WIDTH];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0,
    AddXy = 1,
    SubXy = 2,
    MultXy = 3,
    AddXsreg = 4,
    SubXsreg = 5,
    MultXsreg = 6,
    Relu = 7,
    ActLookup = 8,
    ShiftOff = 9,
    SerialEn = 10,
    ParallelEn = 11,
    SelectBlk = 12,
    MovO2Sreg = 13,
    MovY2Sreg = 14,
    MovSreg2R = 15,
    MovOreg2R = 16,
    MovY2Oreg = 17,
    MovOreg2Act = 18,
    MovX2Act = 19,
    SelectAll = 20,
    Write0 = 30,
    Write1 = 31,
}

impl Opcode {
    pub fn from_u32(v: u32) -> Option<Self> {
        use Opcode::*;
        Some(match v {
            0 => Nop,
            1 => AddXy,
            2 => SubXy,
            3 => MultXy,
            4 => AddXsreg,
            5 => SubXsreg,
            6 => MultXsreg,
            7 => Relu,
            8 => ActLookup,
            9 => ShiftOff,
            10 => SerialEn,
            11 => ParallelEn,
            12 => SelectBlk,
            13 => MovO2Sreg,
            14 => MovY2Sreg,
            15 => MovSreg2R,
            16 => MovOreg2R,
            17 => MovY2Oreg,
            18 => MovOreg2Act,
            19 => MovX2Act,
            20 => SelectAll,
            30 => Write0,
            31 => Write1,
            _ => return None,
        })
    }
}

/// Activation table selection codes. RELU is computed directly, without a table.
pub mod actcode {
    pub const RELU: u32 = 0;
    pub const SIGM: u32 = 1;
    pub const TANH: u32 = 2;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithFn {
    Add,
    Sub,
    Mult,
}

impl ArithFn {
    pub fn name(self) -> &'static str {
        match self {
            ArithFn::Add => "ADD",
            ArithFn::Sub => "SUB",
            ArithFn::Mult => "MULT",
        }
    }
}

/// Operand of the multiplexed VV-Engine mnemonics: an ordinary register or
/// one of the special shift (S), output (O) and activation-input (ACT) registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RegArg", into = "RegArg")]
pub enum Register {
    Ordinary(u8),
    Shift,
    Output,
    ActivationInput,
}

pub use Register::{ActivationInput as ACT, Output as O, Shift as S};

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Ordinary(r) => write!(f, "{r}"),
            Register::Shift => f.write_str("S"),
            Register::Output => f.write_str("O"),
            Register::ActivationInput => f.write_str("ACT"),
        }
    }
}

impl FromStr for Register {
    type Err = AsmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "S" | "s" => Ok(Register::Shift),
            "O" | "o" => Ok(Register::Output),
            "ACT" | "act" => Ok(Register::ActivationInput),
            t => t
                .parse::<u8>()
                .map(Register::Ordinary)
                .map_err(|_| AsmError::RegisterCombination(format!("unknown register '{t}'"))),
        }
    }
}

impl From<u8> for Register {
    fn from(r: u8) -> Self {
        Register::Ordinary(r)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RegArg {
    Index(u8),
    Name(String),
}

impl TryFrom<RegArg> for Register {
    type Error = AsmError;

    fn try_from(arg: RegArg) -> Result<Self> {
        match arg {
            RegArg::Index(r) => Ok(Register::Ordinary(r)),
            RegArg::Name(s) => s.parse(),
        }
    }
}

impl From<Register> for RegArg {
    fn from(r: Register) -> Self {
        match r {
            Register::Ordinary(i) => RegArg::Index(i),
            other => RegArg::Name(other.to_string()),
        }
    }
}

/// A builtin VV-Engine instruction with its conceptual operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VvOp {
    Nop,
    /// `oreg = rx (fn) ry`
    Xy { func: ArithFn, rx: u8, ry: u8 },
    /// `oreg = rx (fn) sreg`
    Xsreg { func: ArithFn, rx: u8 },
    /// `oreg = relu(act)`
    Relu,
    /// `oreg = table[code](act)`
    ActLookup { code: u8 },
    ShiftOff,
    SerialEn,
    ParallelEn,
    SelectBlk { id: u8 },
    SelectAll,
    /// `sreg = oreg`
    MovO2Sreg,
    /// `sreg = ry`
    MovY2Sreg { ry: u8 },
    /// `rd = sreg`
    MovSreg2R { rd: u8 },
    /// `rd = oreg`
    MovOreg2R { rd: u8 },
    /// `oreg = ry`
    MovY2Oreg { ry: u8 },
    /// `act = oreg`
    MovOreg2Act,
    /// `act = rx`
    MovX2Act { rx: u8 },
    Write { addr: u16, data: i16 },
}

impl VvOp {
    pub fn opcode(&self) -> Opcode {
        match *self {
            VvOp::Nop => Opcode::Nop,
            VvOp::Xy { func: ArithFn::Add, .. } => Opcode::AddXy,
            VvOp::Xy { func: ArithFn::Sub, .. } => Opcode::SubXy,
            VvOp::Xy { func: ArithFn::Mult, .. } => Opcode::MultXy,
            VvOp::Xsreg { func: ArithFn::Add, .. } => Opcode::AddXsreg,
            VvOp::Xsreg { func: ArithFn::Sub, .. } => Opcode::SubXsreg,
            VvOp::Xsreg { func: ArithFn::Mult, .. } => Opcode::MultXsreg,
            VvOp::Relu => Opcode::Relu,
            VvOp::ActLookup { .. } => Opcode::ActLookup,
            VvOp::ShiftOff => Opcode::ShiftOff,
            VvOp::SerialEn => Opcode::SerialEn,
            VvOp::ParallelEn => Opcode::ParallelEn,
            VvOp::SelectBlk { .. } => Opcode::SelectBlk,
            VvOp::SelectAll => Opcode::SelectAll,
            VvOp::MovO2Sreg => Opcode::MovO2Sreg,
            VvOp::MovY2Sreg { .. } => Opcode::MovY2Sreg,
            VvOp::MovSreg2R { .. } => Opcode::MovSreg2R,
            VvOp::MovOreg2R { .. } => Opcode::MovOreg2R,
            VvOp::MovY2Oreg { .. } => Opcode::MovY2Oreg,
            VvOp::MovOreg2Act => Opcode::MovOreg2Act,
            VvOp::MovX2Act { .. } => Opcode::MovX2Act,
            VvOp::Write { addr, .. } if addr >> MID_WIDTH == 0 => Opcode::Write0,
            VvOp::Write { .. } => Opcode::Write1,
        }
    }

    pub fn encode(&self) -> Result<SubWord> {
        let r = REG_FIELD_WIDTH;
        let (mid, low) = match *self {
            VvOp::Nop
            | VvOp::Relu
            | VvOp::ShiftOff
            | VvOp::SerialEn
            | VvOp::ParallelEn
            | VvOp::SelectAll
            | VvOp::MovO2Sreg
            | VvOp::MovOreg2Act => (0, 0),
            VvOp::Xy { rx, ry, .. } => (0, u32::from(rx) << r | u32::from(ry)),
            VvOp::Xsreg { rx, .. } | VvOp::MovX2Act { rx } => (0, u32::from(rx) << r),
            VvOp::ActLookup { code } => (0, fit(u32::from(code), ACTCODE_WIDTH)?),
            VvOp::SelectBlk { id } => (0, u32::from(id) << r),
            VvOp::MovY2Sreg { ry: x } | VvOp::MovSreg2R { rd: x } | VvOp::MovOreg2R { rd: x } | VvOp::MovY2Oreg { ry: x } => {
                (0, u32::from(x))
            }
            VvOp::Write { addr, data } => {
                fit(u32::from(addr), ADDR_WIDTH)?;
                (u32::from(addr) & ((1 << MID_WIDTH) - 1), u32::from(data as u16))
            }
        };
        Ok([
            Segment::new(self.opcode() as u32, OPCODE_WIDTH)?,
            Segment::new(mid, MID_WIDTH)?,
            Segment::new(low, DATA_WIDTH)?,
        ])
    }
}

/// Mnemonic constructors for VV-Engine builtins and the multiplexed entry
/// points (`mov`, `add`, `sub`, `mult`, `activation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VvAsm {
    pub params: VvParams,
}

impl VvAsm {
    pub fn new(params: VvParams) -> Self {
        Self { params }
    }

    fn reg(&self, r: u32) -> Result<u8> {
        self.params.validate_reg(r)?;
        u8::try_from(r).map_err(|_| AsmError::Register { kind: "VV-Engine", reg: r.into(), count: self.params.reg_cnt })
    }

    pub fn nop(&self) -> VvOp {
        VvOp::Nop
    }

    pub fn xy(&self, func: ArithFn, rx: u32, ry: u32) -> Result<VvOp> {
        Ok(VvOp::Xy { func, rx: self.reg(rx)?, ry: self.reg(ry)? })
    }

    pub fn xsreg(&self, func: ArithFn, rx: u32) -> Result<VvOp> {
        Ok(VvOp::Xsreg { func, rx: self.reg(rx)? })
    }

    pub fn relu(&self) -> VvOp {
        VvOp::Relu
    }

    pub fn act_lookup(&self, code: u32) -> Result<VvOp> {
        self.params.validate_act_code(code)?;
        Ok(VvOp::ActLookup { code: code as u8 })
    }

    pub fn shift_off(&self) -> VvOp {
        VvOp::ShiftOff
    }

    pub fn serial_en(&self) -> VvOp {
        VvOp::SerialEn
    }

    pub fn parallel_en(&self) -> VvOp {
        VvOp::ParallelEn
    }

    pub fn select_blk(&self, id: u32) -> Result<VvOp> {
        self.params.validate_id(id)?;
        Ok(VvOp::SelectBlk { id: id as u8 })
    }

    pub fn select_all(&self) -> VvOp {
        VvOp::SelectAll
    }

    pub fn mov_o2sreg(&self) -> VvOp {
        VvOp::MovO2Sreg
    }

    pub fn mov_y2sreg(&self, ry: u32) -> Result<VvOp> {
        Ok(VvOp::MovY2Sreg { ry: self.reg(ry)? })
    }

    pub fn mov_sreg2r(&self, rd: u32) -> Result<VvOp> {
        Ok(VvOp::MovSreg2R { rd: self.reg(rd)? })
    }

    pub fn mov_oreg2r(&self, rd: u32) -> Result<VvOp> {
        Ok(VvOp::MovOreg2R { rd: self.reg(rd)? })
    }

    pub fn mov_y2oreg(&self, ry: u32) -> Result<VvOp> {
        Ok(VvOp::MovY2Oreg { ry: self.reg(ry)? })
    }

    pub fn mov_oreg2act(&self) -> VvOp {
        VvOp::MovOreg2Act
    }

    pub fn mov_x2act(&self, rx: u32) -> Result<VvOp> {
        Ok(VvOp::MovX2Act { rx: self.reg(rx)? })
    }

    pub fn write(&self, addr: u32, data: i32) -> Result<VvOp> {
        self.params.validate_addr(addr)?;
        self.params.validate_data(data)?;
        Ok(VvOp::Write { addr: addr as u16, data: data as i16 })
    }

    /// Picks the move variant matching the operand kinds.
    pub fn mov(&self, rd: Register, rs: Register) -> Result<VvOp> {
        use Register::*;
        match (rd, rs) {
            (Shift, Output) => Ok(self.mov_o2sreg()),
            (Shift, Ordinary(r)) => self.mov_y2sreg(r.into()),
            (Ordinary(r), Shift) => self.mov_sreg2r(r.into()),
            (Ordinary(r), Output) => self.mov_oreg2r(r.into()),
            (Output, Ordinary(r)) => self.mov_y2oreg(r.into()),
            (ActivationInput, Output) => Ok(self.mov_oreg2act()),
            (ActivationInput, Ordinary(r)) => self.mov_x2act(r.into()),
            _ => Err(AsmError::RegisterCombination(format!("rd={rd}, rs={rs}"))),
        }
    }

    /// `oreg = opl (fn) opr`, where `opr` is an ordinary register or S.
    pub fn arith(&self, func: ArithFn, opl: Register, opr: Register) -> Result<VvOp> {
        match (opl, opr) {
            (Register::Ordinary(x), Register::Ordinary(y)) => self.xy(func, x.into(), y.into()),
            (Register::Ordinary(x), Register::Shift) => self.xsreg(func, x.into()),
            _ => Err(AsmError::RegisterCombination(format!("{} opl={opl}, opr={opr}", func.name()))),
        }
    }

    pub fn add(&self, opl: Register, opr: Register) -> Result<VvOp> {
        self.arith(ArithFn::Add, opl, opr)
    }

    pub fn sub(&self, opl: Register, opr: Register) -> Result<VvOp> {
        self.arith(ArithFn::Sub, opl, opr)
    }

    pub fn mult(&self, opl: Register, opr: Register) -> Result<VvOp> {
        self.arith(ArithFn::Mult, opl, opr)
    }

    pub fn activation(&self, code: u32) -> Result<VvOp> {
        if code == actcode::RELU { Ok(self.relu()) } else { self.act_lookup(code) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitfield::{pack, total_width};
    use crate::params::Config;

    fn asm() -> VvAsm {
        VvAsm::new(Config::default().vv)
    }

    fn fields(op: VvOp) -> [u32; 3] {
        let w = op.encode().unwrap();
        [w[0].value, w[1].value, w[2].value]
    }

    #[test]
    fn write_address_msb_moves_into_opcode() {
        let a = asm();
        assert_eq!(fields(a.write(0x1FF, -1).unwrap()), [30, 0x1FF, 0xFFFF]);
        assert_eq!(fields(a.write(0x200, 5).unwrap()), [31, 0, 5]);
        assert_eq!(fields(a.write(0x3FF, -32768).unwrap()), [31, 0x1FF, 0x8000]);
    }

    #[test]
    fn every_word_is_30_bits() {
        let a = asm();
        let ops = [
            a.nop(),
            a.add(Register::Ordinary(3), Register::Ordinary(4)).unwrap(),
            a.xy(ArithFn::Mult, 255, 255).unwrap(),
            a.act_lookup(3).unwrap(),
            a.select_blk(255).unwrap(),
            a.write(1023, 32767).unwrap(),
        ];
        for op in ops {
            let w = op.encode().unwrap();
            assert_eq!(total_width(&w), 30);
            assert!(pack(&w) < 1 << 30);
        }
    }

    #[test]
    fn operand_layouts() {
        let a = asm();
        assert_eq!(fields(a.xy(ArithFn::Sub, 1, 2).unwrap()), [2, 0, 1 << 8 | 2]);
        assert_eq!(fields(a.xsreg(ArithFn::Mult, 7).unwrap()), [6, 0, 7 << 8]);
        assert_eq!(fields(a.mov_x2act(7).unwrap()), [19, 0, 7 << 8]);
        assert_eq!(fields(a.act_lookup(2).unwrap()), [8, 0, 2]);
        assert_eq!(fields(a.select_blk(9).unwrap()), [12, 0, 9 << 8]);
        assert_eq!(fields(a.mov_y2sreg(4).unwrap()), [14, 0, 4]);
        assert_eq!(fields(a.mov_sreg2r(4).unwrap()), [15, 0, 4]);
        assert_eq!(fields(a.mov_oreg2r(4).unwrap()), [16, 0, 4]);
        assert_eq!(fields(a.mov_y2oreg(4).unwrap()), [17, 0, 4]);
        assert_eq!(fields(a.select_all()), [20, 0, 0]);
    }

    #[test]
    fn mov_dispatches_on_operand_kinds() {
        let a = asm();
        let r = Register::Ordinary;
        assert_eq!(a.mov(S, O).unwrap(), VvOp::MovO2Sreg);
        assert_eq!(a.mov(S, r(3)).unwrap(), VvOp::MovY2Sreg { ry: 3 });
        assert_eq!(a.mov(r(3), S).unwrap(), VvOp::MovSreg2R { rd: 3 });
        assert_eq!(a.mov(r(3), O).unwrap(), VvOp::MovOreg2R { rd: 3 });
        assert_eq!(a.mov(O, r(3)).unwrap(), VvOp::MovY2Oreg { ry: 3 });
        assert_eq!(a.mov(ACT, O).unwrap(), VvOp::MovOreg2Act);
        assert_eq!(a.mov(ACT, r(3)).unwrap(), VvOp::MovX2Act { rx: 3 });
        for (rd, rs) in [(r(1), r(2)), (O, S), (S, ACT), (O, O), (r(1), ACT)] {
            assert!(matches!(a.mov(rd, rs), Err(AsmError::RegisterCombination(_))), "{rd} <- {rs}");
        }
    }

    #[test]
    fn arithmetic_accepts_register_zero() {
        let a = asm();
        let r = Register::Ordinary;
        assert_eq!(a.sub(r(0), r(0)).unwrap(), VvOp::Xy { func: ArithFn::Sub, rx: 0, ry: 0 });
        assert_eq!(a.mult(r(0), S).unwrap(), VvOp::Xsreg { func: ArithFn::Mult, rx: 0 });
        assert!(a.add(S, r(1)).is_err());
        assert!(a.add(r(1), O).is_err());
    }

    #[test]
    fn activation_picks_relu_or_table() {
        let a = asm();
        assert_eq!(a.activation(actcode::RELU).unwrap(), VvOp::Relu);
        assert_eq!(a.activation(actcode::TANH).unwrap(), VvOp::ActLookup { code: 2 });
        assert!(a.activation(4).is_err());
    }

    #[test]
    fn register_names_parse_and_serialize() {
        assert_eq!("ACT".parse::<Register>().unwrap(), ACT);
        assert_eq!("12".parse::<Register>().unwrap(), Register::Ordinary(12));
        assert!("Q".parse::<Register>().is_err());
        let regs: Vec<Register> = serde_json::from_str(r#"[1, "S", "O", "ACT"]"#).unwrap();
        assert_eq!(regs, vec![Register::Ordinary(1), S, O, ACT]);
        assert_eq!(serde_json::to_string(&regs).unwrap(), r#"[1,"S","O","ACT"]"#);
    }

    #[test]
    fn write_data_is_signed() {
        let a = asm();
        assert!(a.write(0, 32768).is_err());
        assert!(a.write(0, -32769).is_err());
        assert!(a.write(1024, 0).is_err());
    }
}
