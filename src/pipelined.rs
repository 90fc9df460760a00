use log::{debug, trace};

use crate::{
    config::SimConfig,
    cpu::{Cpu, CpuState, ExecResult, FetchState, Stats},
    error::SimError,
    execution_unit::Latch,
    hazard::{read_after_write, reads_flag_of},
    inst::{Instruction, Opcode, Tag, MAX_SOURCES},
    mem::DataMemory,
    program::{code_address, Program, CODE_BASE, INST_SIZE},
    regs::RegSet,
    trace::{Stage, StageTrace},
};

/// Each latch is named after the stage that filled it this cycle.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    fetch: Option<Latch>,
    decode: Option<Latch>,
    ex1: Option<Latch>,
    ex2: Option<Latch>,
    mem1: Option<Latch>,
    mem2: Option<Latch>,
    writeback: Option<Latch>,
}

/// In-order seven stage pipeline (F, DRF, EX1, EX2, MEM1, MEM2, WB) with full
/// forwarding. Only a load whose data is not back yet stalls decode.
#[derive(Debug, Clone)]
pub struct Pipelined {
    regs: RegSet,
    mem: DataMemory,
    prog: Program,
    arch_reg_count: u16,
    pipe: Pipeline,
    pc: u32,
    fetch_state: FetchState,
    redirect: Option<u32>,
    zero_flag: bool,
    next_tag: u64,
    state: CpuState,
    stats: Stats,
}

impl Cpu for Pipelined {
    fn new(prog: Program, config: &SimConfig) -> Result<Self, SimError> {
        config.validate()?;

        Ok(Self {
            regs: RegSet::new(config.arch_reg_count),
            mem: DataMemory::new(config.memory_size),
            prog,
            arch_reg_count: config.arch_reg_count,
            pipe: Pipeline::default(),
            pc: CODE_BASE,
            fetch_state: FetchState::Running,
            redirect: None,
            zero_flag: true,
            next_tag: 0,
            state: CpuState::Running,
            stats: Stats::default(),
        })
    }

    fn step(&mut self) -> Result<CpuState, SimError> {
        if self.state == CpuState::Stopped {
            return Ok(self.state);
        }

        trace!("cycle {}", self.stats.cycles);
        let pipe = std::mem::take(&mut self.pipe);

        let writeback = self.stage_writeback(&pipe);
        let mem2 = pipe.mem1.clone();
        let mem1 = self.stage_mem1(&pipe)?;
        let ex2 = pipe.ex1.clone();
        let ex1 = self.stage_ex1(&pipe)?;
        let (decode, should_stall) = self.stage_decode(&pipe, [&ex1, &ex2, &mem1, &mem2])?;
        let fetch = if should_stall {
            pipe.fetch.clone()
        } else {
            self.stage_fetch(&pipe)?
        };

        self.stats.cycles += 1;
        if matches!(&writeback, Some(l) if l.inst.opcode == Opcode::Halt) {
            debug!("halted after {} cycles", self.stats.cycles);
            self.state = CpuState::Stopped;
        }

        self.pipe = Pipeline {
            fetch,
            decode,
            ex1,
            ex2,
            mem1,
            mem2,
            writeback,
        };

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
        let p = &self.pipe;
        vec![
            StageTrace::new(Stage::Fetch, p.fetch.iter()),
            StageTrace::new(Stage::Decode, p.decode.iter()),
            StageTrace::new(Stage::Ex1, p.ex1.iter()),
            StageTrace::new(Stage::Ex2, p.ex2.iter()),
            StageTrace::new(Stage::Mem1, p.mem1.iter()),
            StageTrace::new(Stage::Mem2, p.mem2.iter()),
            StageTrace::new(Stage::Writeback, p.writeback.iter()),
        ]
    }
}

impl Pipelined {
    fn stage_writeback(&mut self, pipe: &Pipeline) -> Option<Latch> {
        let latch = pipe.mem2.clone()?;

        if let (Some(rd), Some(val)) = (latch.inst.dest(), latch.result) {
            self.regs.set(rd, val);
            if latch.inst.opcode.sets_flag() {
                self.zero_flag = val == 0;
            }
        }

        debug!("cycle {}: writeback {}", self.stats.cycles, latch);
        self.stats.record_retire(latch.inst.opcode);
        Some(latch)
    }

    fn stage_mem1(&mut self, pipe: &Pipeline) -> Result<Option<Latch>, SimError> {
        let mut latch = match &pipe.ex2 {
            Some(latch) => latch.clone(),
            None => return Ok(None),
        };

        if latch.inst.opcode.is_mem_access() {
            latch.execute_memory(&mut self.mem)?;
        }

        Ok(Some(latch))
    }

    fn stage_ex1(&mut self, pipe: &Pipeline) -> Result<Option<Latch>, SimError> {
        let mut latch = match &pipe.decode {
            Some(latch) => latch.clone(),
            None => return Ok(None),
        };

        if latch.inst.opcode.is_mem_access() {
            latch.compute_address();
        } else if latch.inst.opcode.is_control() {
            latch.execute_branch();
            if let Some(outcome) = latch.branch {
                if outcome.taken {
                    self.stats.branches_taken += 1;
                }
                let target = code_address(outcome.next_pc)?;
                debug!(
                    "cycle {}: {} resolved, fetch from {target}",
                    self.stats.cycles, latch
                );
                self.redirect = Some(target);
            }
        } else {
            latch.execute_alu();
        }

        Ok(Some(latch))
    }

    /// Reads operands, forwarding from the youngest older instruction still in
    /// the pipeline. `older` is ordered youngest first.
    fn stage_decode(
        &mut self,
        pipe: &Pipeline,
        older: [&Option<Latch>; 4],
    ) -> Result<(Option<Latch>, bool), SimError> {
        let mut latch = match &pipe.fetch {
            Some(latch) => latch.clone(),
            None => return Ok((None, false)),
        };

        latch.inst.check_regs(latch.pc, self.arch_reg_count)?;

        let producers = older
            .iter()
            .filter_map(|l| l.as_ref())
            .filter(|o| read_after_write(&latch.inst, &o.inst))
            .collect::<Vec<_>>();

        let mut operands = [0; MAX_SOURCES];
        for (op, src) in operands.iter_mut().zip(latch.inst.sources()) {
            let reg = match src {
                Some(reg) => reg,
                None => continue,
            };

            let value = match producers.iter().find(|p| p.inst.dest() == Some(reg)) {
                // None while a load has not read memory yet.
                Some(producer) => producer.result,
                None => Some(self.regs.get(reg)),
            };

            match value {
                Some(v) => *op = v,
                None => {
                    trace!("cycle {}: decode stall on {reg}", self.stats.cycles);
                    self.stats.hazard_stalls += 1;
                    return Ok((None, true));
                }
            }
        }
        latch.operands = operands;

        if latch.inst.opcode.reads_flag() {
            latch.zero_flag = match older
                .iter()
                .filter_map(|l| l.as_ref())
                .find(|o| reads_flag_of(&latch.inst, &o.inst))
            {
                Some(producer) => producer.result == Some(0),
                None => self.zero_flag,
            };
        }

        Ok((Some(latch), false))
    }

    fn stage_fetch(&mut self, _pipe: &Pipeline) -> Result<Option<Latch>, SimError> {
        if let Some(target) = self.redirect.take() {
            self.pc = target;
            self.fetch_state = FetchState::Running;
        }

        if self.fetch_state != FetchState::Running {
            return Ok(None);
        }

        let pc = self.pc;
        let inst = self
            .prog
            .fetch(pc)?
            .copied()
            .unwrap_or_else(Instruction::halt);

        if inst.opcode.is_control() {
            self.fetch_state = FetchState::AwaitingBranch;
        } else if inst.opcode == Opcode::Halt {
            self.fetch_state = FetchState::Halted;
        } else {
            self.pc = pc + INST_SIZE;
        }

        let tag = Tag::from(self.next_tag);
        self.next_tag += 1;
        Ok(Some(Latch::new(tag, pc, inst, [0; MAX_SOURCES])))
    }
}
