use log::debug;

use crate::{
    config::SimConfig,
    cpu::{Cpu, CpuState, ExecResult, Stats},
    error::SimError,
    execution_unit::{alu, effective_address, memory_access, resolve_branch},
    inst::{Instruction, Opcode, Word, MAX_SOURCES},
    mem::DataMemory,
    program::{code_address, Program, CODE_BASE, INST_SIZE},
    regs::RegSet,
    trace::{Stage, StageTrace},
};

/// Functional model: one instruction per step, no pipeline. Used as the
/// reference the pipelined models are checked against.
#[derive(Debug, Clone)]
pub struct Emulated {
    regs: RegSet,
    mem: DataMemory,
    prog: Program,
    arch_reg_count: u16,
    pc: u32,
    zero_flag: bool,
    last: Option<(u32, Instruction)>,
    state: CpuState,
    stats: Stats,
}

impl Cpu for Emulated {
    fn new(prog: Program, config: &SimConfig) -> Result<Self, SimError> {
        config.validate()?;

        Ok(Self {
            regs: RegSet::new(config.arch_reg_count),
            mem: DataMemory::new(config.memory_size),
            arch_reg_count: config.arch_reg_count,
            pc: CODE_BASE,
            zero_flag: true,
            last: None,
            state: CpuState::Running,
            stats: Stats::default(),
            prog,
        })
    }

    fn step(&mut self) -> Result<CpuState, SimError> {
        if self.state == CpuState::Running {
            self.state = self.exec_one()?;
        }

        Ok(self.state)
    }

    fn snapshot(&self) -> ExecResult {
        ExecResult {
            regs: self.regs.clone(),
            phys_regs: Vec::new(),
            mem: self.mem.clone(),
            zero_flag: self.zero_flag,
            stats: self.stats.clone(),
        }
    }

    fn stage_trace(&self) -> Vec<StageTrace> {
        let last = self.last.map(|(pc, inst)| format!("pc({pc}) {inst}"));
        vec![StageTrace::new(Stage::Execute, last)]
    }
}

impl Emulated {
    fn exec_one(&mut self) -> Result<CpuState, SimError> {
        let pc = self.pc;
        let inst = self.prog.fetch(pc)?.copied().unwrap_or_else(Instruction::halt);
        inst.check_regs(pc, self.arch_reg_count)?;

        let mut ops: [Word; MAX_SOURCES] = [0; MAX_SOURCES];
        for (op, src) in ops.iter_mut().zip(inst.sources()) {
            *op = src.map(|r| self.regs.get(r)).unwrap_or(0);
        }

        let mut next_pc = pc + INST_SIZE;
        let result = if let Some(addr) = effective_address(&inst, &ops) {
            memory_access(&inst, pc, addr, &ops, &mut self.mem)?
        } else if let Some(outcome) = resolve_branch(&inst, pc, self.zero_flag) {
            if outcome.taken {
                self.stats.branches_taken += 1;
            }
            next_pc = code_address(outcome.next_pc)?;
            None
        } else {
            alu(&inst, &ops)
        };

        if let (Some(rd), Some(val)) = (inst.dest(), result) {
            self.regs.set(rd, val);
            if inst.opcode.sets_flag() {
                self.zero_flag = val == 0;
            }
        }

        debug!("emulated: pc({pc}) {inst}");
        self.last = Some((pc, inst));
        self.pc = next_pc;
        self.stats.record_retire(inst.opcode);
        self.stats.cycles += inst.opcode.unit().depth() as u64;

        if inst.opcode == Opcode::Halt {
            Ok(CpuState::Stopped)
        } else {
            Ok(CpuState::Running)
        }
    }
}
