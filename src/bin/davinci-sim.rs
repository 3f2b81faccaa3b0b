use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use davinci_asm::decoder::parse_verilog_bin;
use davinci_asm::fixed::from_fixed;
use davinci_asm::sim::BlockSim;
use davinci_asm::AsmParams;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run a DA-VinCi verilog memory image on a single PiCaSO block model"
)]
struct Opts {
    /// Assembler parameter file (JSON)
    #[arg(short, long)]
    params: Option<std::path::PathBuf>,
    /// Block row ID of the modelled block
    #[arg(long, default_value_t = 0)]
    row: u8,
    /// Block column ID of the modelled block
    #[arg(long, default_value_t = 0)]
    col: u8,
    /// Registers to dump after the run
    #[arg(short, long = "dump", value_name = "REG")]
    dump: Vec<u32>,
    #[arg(value_name = "MEMFILE")]
    input: std::path::PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    let params = match &opts.params {
        Some(path) => AsmParams::from_json_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => AsmParams::default(),
    };
    let cfg = params.validate()?;

    let text = std::fs::read_to_string(&opts.input)
        .with_context(|| format!("reading {}", opts.input.display()))?;
    let words = parse_verilog_bin(&text)?;

    let mut sim = BlockSim::new(cfg.picaso, opts.row, opts.col);
    sim.run_words(&words)?;

    for reg in opts.dump {
        let values = sim.reg_signed(reg)?;
        if cfg.frac_width == 0 {
            println!("r{reg:<2} {values:?}");
        } else {
            let real: Vec<f64> = values.iter().map(|&v| from_fixed(v.into(), cfg.frac_width)).collect();
            println!("r{reg:<2} {real:?}");
        }
    }
    Ok(())
}
