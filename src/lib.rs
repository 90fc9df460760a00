use config::SimConfig;
use cpu::{Cpu, ExecResult};
use error::SimError;
use program::Program;

pub mod config;
pub mod cpu;
pub mod emulated;
pub mod error;
pub mod execution_unit;
pub mod hazard;
pub mod inst;
pub mod issue_queue;
pub mod lsq;
pub mod mem;
pub mod out_of_order;
pub mod pipelined;
pub mod program;
pub mod queue;
pub mod rat;
pub mod regs;
pub mod rob;
pub mod trace;

pub fn parse_and_exec<C: Cpu>(name: &str, config: &SimConfig) -> Result<ExecResult, SimError> {
    let contents = std::fs::read_to_string(format!("asm/{}.asm", name))?;
    let prog = contents.parse::<Program>()?;
    C::new(prog, config)?.exec_all()
}
