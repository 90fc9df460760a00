use hashbrown::HashMap;

use crate::{
    config::SimConfig,
    error::SimError,
    inst::Opcode,
    mem::DataMemory,
    program::Program,
    regs::{PrfEntry, RegSet},
    trace::StageTrace,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CpuState {
    Running,
    Stopped,
}

/// Fetch never runs ahead of an unresolved branch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FetchState {
    Running,
    /// A branch or jump was fetched; nothing more until it resolves.
    AwaitingBranch,
    Halted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub cycles: u64,
    pub insts_retired: u64,
    pub branches_taken: u64,
    pub rob_full_stalls: u64,
    pub queue_full_stalls: u64,
    pub phys_reg_stalls: u64,
    pub hazard_stalls: u64,
    pub retired_by_opcode: HashMap<Opcode, u64>,
}

/// Final (or current) machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub regs: RegSet,
    /// Empty for models without register renaming.
    pub phys_regs: Vec<PrfEntry>,
    pub mem: DataMemory,
    pub zero_flag: bool,
    pub stats: Stats,
}

impl Stats {
    pub fn record_retire(&mut self, opcode: Opcode) {
        self.insts_retired += 1;
        *self.retired_by_opcode.entry(opcode).or_default() += 1;
    }

    pub fn ipc(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.insts_retired as f64 / self.cycles as f64
        }
    }
}

pub trait Cpu: Sized {
    fn new(prog: Program, config: &SimConfig) -> Result<Self, SimError>;

    /// Simulates one clock cycle. Once stopped, further calls do nothing.
    fn step(&mut self) -> Result<CpuState, SimError>;

    fn snapshot(&self) -> ExecResult;

    fn stage_trace(&self) -> Vec<StageTrace>;

    /// Runs until `cycle_limit` cycles have elapsed or the program has drained.
    fn run(&mut self, cycle_limit: u64) -> Result<CpuState, SimError> {
        let mut state = CpuState::Running;
        for _ in 0..cycle_limit {
            state = self.step()?;
            if state == CpuState::Stopped {
                break;
            }
        }

        Ok(state)
    }

    fn run_until_complete(&mut self) -> Result<ExecResult, SimError> {
        while self.step()? == CpuState::Running {}
        Ok(self.snapshot())
    }

    fn exec_all(mut self) -> Result<ExecResult, SimError> {
        self.run_until_complete()
    }
}
