use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AsmError, Result};

/// Processing elements per PiCaSO block.
pub const PE_COUNT: u32 = 16;
/// Rows of the BRAM backing one PiCaSO block.
pub const PIM_DEPTH: u32 = 1024;
/// User registers supported by the current GEMV hardware revision.
pub const MV_MAX_USER_REGS: u32 = 60;
pub const VV_MAX_REGS: u32 = 256;
pub const MAX_ACT_TABLES: u32 = 3;
pub const REG_WIDTH: u32 = 16;
/// Width of the register/param fields of a PiCaSO word; bounds fold and level values.
pub const PICASO_PARAM_LIMIT: u32 = (1 << 6) - 1;
/// Deepest accumulation level whose column count `PE_COUNT << (level + 1)` fits a `u32`.
pub const MAX_LEVEL_LIMIT: u32 = u32::BITS - 2 - PE_COUNT.trailing_zeros();

/// User-facing assembler parameters, as written in a parameter file.
///
/// Key names follow the parameter files of the hardware project (`mvRegCnt`,
/// `mvBlockDim`, ...). Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct AsmParams {
    pub mv_reg_cnt: u32,
    pub vv_reg_cnt: u32,
    pub reg_width: u32,
    pub max_level: u32,
    pub max_fold: u32,
    pub id_width: u32,
    pub frac_width: u32,
    /// (block rows, block columns) of the GEMV array; `None` disables shape checks.
    pub mv_block_dim: Option<(u32, u32)>,
    pub mv_resv_reg_cnt: u32,
    pub act_count: u32,
}

impl Default for AsmParams {
    fn default() -> Self {
        Self {
            mv_reg_cnt: 16,
            vv_reg_cnt: 256,
            reg_width: REG_WIDTH,
            max_level: 3,
            max_fold: 4,
            id_width: 8,
            frac_width: 0,
            mv_block_dim: None,
            mv_resv_reg_cnt: 0,
            act_count: 3,
        }
    }
}

/// Limits of the PiCaSO (GEMV) submodule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PicasoParams {
    pub reg_cnt: u32,
    pub reg_width: u32,
    pub max_level: u32,
    pub max_fold: u32,
    pub id_width: u32,
    pub pe_count: u32,
    pub pim_depth: u32,
}

/// Limits of the VV-Engine submodule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VvParams {
    pub reg_cnt: u32,
    pub reg_width: u32,
    pub id_width: u32,
    pub act_count: u32,
}

/// Registers `base..base + count` of the GEMV array, usable only by macros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReservedRegs {
    pub base: u32,
    pub count: u32,
}

/// Validated configuration of one program-build session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    pub picaso: PicasoParams,
    pub vv: VvParams,
    pub frac_width: u32,
    pub mv_max_row: Option<u32>,
    pub mv_max_col: Option<u32>,
    pub reserved: Option<ReservedRegs>,
}

impl Default for Config {
    fn default() -> Self {
        let p = AsmParams::default();
        Self {
            picaso: PicasoParams {
                reg_cnt: p.mv_reg_cnt,
                reg_width: p.reg_width,
                max_level: p.max_level,
                max_fold: p.max_fold,
                id_width: p.id_width,
                pe_count: PE_COUNT,
                pim_depth: PIM_DEPTH,
            },
            vv: VvParams {
                reg_cnt: p.vv_reg_cnt,
                reg_width: p.reg_width,
                id_width: p.id_width,
                act_count: p.act_count,
            },
            frac_width: p.frac_width,
            mv_max_row: None,
            mv_max_col: None,
            reserved: None,
        }
    }
}

fn ensure(cond: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if cond { Ok(()) } else { Err(AsmError::Config(msg())) }
}

/// `ceil(log2(n))` for `n >= 1`.
pub(crate) fn ceil_log2(n: u32) -> u32 {
    if n <= 1 { 0 } else { u32::BITS - (n - 1).leading_zeros() }
}

impl AsmParams {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| AsmError::Config(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json_str(&AsmError::read_file(path)?)
    }

    /// Checks parameter consistency and derives the session configuration.
    pub fn validate(&self) -> Result<Config> {
        ensure(self.mv_reg_cnt >= 1 && self.mv_reg_cnt <= MV_MAX_USER_REGS, || {
            format!("this version only supports 1 to {MV_MAX_USER_REGS} 16-bit user registers, got {}", self.mv_reg_cnt)
        })?;
        ensure(self.reg_width == REG_WIDTH, || {
            format!("this version only supports {REG_WIDTH}-bit registers, got {}", self.reg_width)
        })?;
        ensure(self.id_width >= 1 && self.id_width <= 8, || format!("idWidth must be within 1..=8, got {}", self.id_width))?;
        ensure(self.max_fold >= 1 && self.max_fold <= PICASO_PARAM_LIMIT, || {
            format!("maxFold must be within 1..={PICASO_PARAM_LIMIT}, got {}", self.max_fold)
        })?;
        ensure(self.max_level <= MAX_LEVEL_LIMIT, || {
            format!("maxLevel must be <= {MAX_LEVEL_LIMIT}, got {}", self.max_level)
        })?;
        let mut mv_max_col = None;
        if let Some((rows, cols)) = self.mv_block_dim {
            ensure(rows >= 1 && cols >= 1, || format!("mvBlockDim must be non-zero, got ({rows}, {cols})"))?;
            mv_max_col = Some(cols.checked_mul(PE_COUNT).ok_or_else(|| {
                AsmError::Config(format!("mvBlockDim column count {cols} exceeds {} PE columns", u32::MAX))
            })?);
            let rec_max_level = i64::from(ceil_log2(cols)) - 1;
            if rec_max_level < i64::from(self.max_level) {
                warn!(max_level = self.max_level, rec_max_level, "specified maxLevel is not optimal");
            }
            ensure(rec_max_level <= i64::from(self.max_level), || {
                format!("specified maxLevel ({}) is incorrect; recommended maxLevel = {rec_max_level}", self.max_level)
            })?;
        }
        let avl_reg = PIM_DEPTH / self.reg_width;
        ensure(self.mv_reg_cnt <= avl_reg, || {
            format!("register count ({}) is not consistent with regWidth ({}) and pimDepth ({PIM_DEPTH})", self.mv_reg_cnt, self.reg_width)
        })?;
        ensure(self.vv_reg_cnt >= 1 && self.vv_reg_cnt <= VV_MAX_REGS, || {
            format!("VV-Engine only supports up to {VV_MAX_REGS} registers, got {}", self.vv_reg_cnt)
        })?;
        ensure(self.act_count <= MAX_ACT_TABLES, || {
            format!("VV-Engine only supports up to {MAX_ACT_TABLES} activation tables, got {}", self.act_count)
        })?;
        ensure(self.frac_width <= self.reg_width, || {
            format!("fixed-point fracWidth must be >= 0 and <= regWidth ({}), got {}", self.reg_width, self.frac_width)
        })?;
        let reserved = if self.mv_resv_reg_cnt > 0 {
            let tot_reg = self.mv_reg_cnt + self.mv_resv_reg_cnt;
            ensure(tot_reg <= avl_reg, || {
                format!("too many ({}+{}>{avl_reg}) MV-Engine registers specified", self.mv_reg_cnt, self.mv_resv_reg_cnt)
            })?;
            Some(ReservedRegs { base: self.mv_reg_cnt, count: self.mv_resv_reg_cnt })
        } else {
            None
        };

        let cfg = Config {
            picaso: PicasoParams {
                reg_cnt: self.mv_reg_cnt,
                reg_width: self.reg_width,
                max_level: self.max_level,
                max_fold: self.max_fold,
                id_width: self.id_width,
                pe_count: PE_COUNT,
                pim_depth: PIM_DEPTH,
            },
            vv: VvParams {
                reg_cnt: self.vv_reg_cnt,
                reg_width: self.reg_width,
                id_width: self.id_width,
                act_count: self.act_count,
            },
            frac_width: self.frac_width,
            mv_max_row: self.mv_block_dim.map(|(rows, _)| rows),
            mv_max_col,
            reserved,
        };
        info!(frac_width = cfg.frac_width, mv_reg_cnt = self.mv_reg_cnt, vv_reg_cnt = self.vv_reg_cnt, "assembler parameters set up");
        Ok(cfg)
    }
}

impl Config {
    /// Human-readable parameter listing.
    pub fn summary(&self) -> String {
        let opt = |v: Option<u32>| v.map_or_else(|| "None".to_string(), |v| v.to_string());
        let mut s = String::new();
        let _ = writeln!(s, "fracWidth    : {}", self.frac_width);
        let _ = writeln!(s, "mvMaxRow     : {}", opt(self.mv_max_row));
        let _ = writeln!(s, "mvMaxCol     : {}", opt(self.mv_max_col));
        let _ = writeln!(s, "mvResvRegCnt : {}", self.reserved.map_or(0, |r| r.count));
        let _ = writeln!(s, "mvResvRegBase: {}", opt(self.reserved.map(|r| r.base)));
        let p = &self.picaso;
        let _ = writeln!(s, "PiCaSOAsm Params:");
        let _ = writeln!(s, "  regCnt  : {}", p.reg_cnt);
        let _ = writeln!(s, "  regWidth: {}", p.reg_width);
        let _ = writeln!(s, "  maxLevel: {}", p.max_level);
        let _ = writeln!(s, "  maxFold : {}", p.max_fold);
        let _ = writeln!(s, "  idWidth : {}", p.id_width);
        let _ = writeln!(s, "  peCount : {}", p.pe_count);
        let v = &self.vv;
        let _ = writeln!(s, "VVBlockAsm Params:");
        let _ = writeln!(s, "  regCnt  : {}", v.reg_cnt);
        let _ = writeln!(s, "  regWidth: {}", v.reg_width);
        let _ = writeln!(s, "  idWidth : {}", v.id_width);
        let _ = writeln!(s, "  actCount: {}", v.act_count);
        s
    }
}

impl PicasoParams {
    pub fn validate_reg(&self, reg: u32) -> Result<()> {
        if reg < self.reg_cnt { Ok(()) } else { Err(AsmError::Register { kind: "GEMV", reg: reg.into(), count: self.reg_cnt }) }
    }

    pub fn validate_level(&self, level: u32) -> Result<()> {
        if level <= self.max_level { Ok(()) } else { Err(AsmError::range("network level", level, 0, self.max_level)) }
    }

    pub fn validate_fold(&self, fold: u32) -> Result<()> {
        if (1..=self.max_fold).contains(&fold) { Ok(()) } else { Err(AsmError::range("fold", fold, 1, self.max_fold)) }
    }

    pub fn validate_offset(&self, offset: u32) -> Result<()> {
        if offset < self.reg_width { Ok(()) } else { Err(AsmError::range("offset", offset, 0, self.reg_width - 1)) }
    }

    pub fn validate_id(&self, what: &'static str, id: u32) -> Result<()> {
        let max_id = (1u32 << self.id_width) - 1;
        if id <= max_id { Ok(()) } else { Err(AsmError::range(what, id, 0, max_id)) }
    }

    pub fn validate_addr(&self, addr: u32) -> Result<()> {
        let max_addr = (1u32 << crate::isa::picaso::ADDR_WIDTH) - 1;
        if addr <= max_addr { Ok(()) } else { Err(AsmError::range("address", addr, 0, max_addr)) }
    }

    /// GEMV data are unsigned BRAM rows, not PE-register values.
    pub fn validate_data(&self, data: u32) -> Result<()> {
        let max_data = (1u32 << crate::isa::picaso::DATA_WIDTH) - 1;
        if data <= max_data { Ok(()) } else { Err(AsmError::range("data", data, 0, max_data)) }
    }

    /// BRAM address of bit `bit` of register `reg`.
    pub fn reg_addr(&self, reg: u32, bit: u32) -> u32 {
        reg * self.reg_width + bit
    }
}

impl VvParams {
    pub fn validate_reg(&self, reg: u32) -> Result<()> {
        if reg < self.reg_cnt { Ok(()) } else { Err(AsmError::Register { kind: "VV-Engine", reg: reg.into(), count: self.reg_cnt }) }
    }

    pub fn validate_id(&self, id: u32) -> Result<()> {
        let max_id = (1u32 << self.id_width) - 1;
        if id <= max_id { Ok(()) } else { Err(AsmError::range("block ID", id, 0, max_id)) }
    }

    pub fn validate_addr(&self, addr: u32) -> Result<()> {
        let max_addr = (1u32 << crate::isa::vvengine::ADDR_WIDTH) - 1;
        if addr <= max_addr { Ok(()) } else { Err(AsmError::range("address", addr, 0, max_addr)) }
    }

    /// VV-Engine data are signed register values.
    pub fn validate_data(&self, data: i32) -> Result<()> {
        let min = -(1i32 << (crate::isa::vvengine::DATA_WIDTH - 1));
        let max = -min - 1;
        if (min..=max).contains(&data) { Ok(()) } else { Err(AsmError::range("data", data, min, max)) }
    }

    /// Table-based activation codes; code 0 (RELU) needs no table.
    pub fn validate_act_code(&self, code: u32) -> Result<()> {
        let max = self.act_count.min((1 << crate::isa::vvengine::ACTCODE_WIDTH) - 1);
        if code >= 1 && code <= max { Ok(()) } else { Err(AsmError::range("activation code", code, 1, max)) }
    }

    /// VV-Engine registers map one-to-one onto BRAM addresses.
    pub fn reg_addr(&self, reg: u32) -> u32 {
        reg
    }
}
