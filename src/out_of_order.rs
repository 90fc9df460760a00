use log::{debug, trace};

use crate::{
    config::SimConfig,
    cpu::{Cpu, CpuState, ExecResult, FetchState, Stats},
    error::SimError,
    execution_unit::{FunctionalUnit, Latch},
    inst::{Instruction, Opcode, RenamedInst, Tag, Tagged, UnitKind},
    issue_queue::IssueQueue,
    lsq::LoadStoreQueue,
    mem::DataMemory,
    program::{code_address, Program, CODE_BASE, INST_SIZE},
    regs::RegFile,
    rob::{ReorderBuffer, RobEntry},
    trace::{Stage, StageTrace},
};

mod stages {
    use super::*;

    #[derive(Debug, Copy, Clone)]
    pub struct Fetched {
        pub pc: u32,
        pub inst: Instruction,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Fetch {
        pub inst: Option<Fetched>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Decode {
        pub inst: Option<Tagged<RenamedInst>>,
        pub should_stall: bool,
    }

    #[derive(Debug, Clone, Default)]
    pub struct Retire {
        pub entry: Option<RobEntry>,
        pub should_halt: bool,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    fetch: stages::Fetch,
    decode: stages::Decode,
    retire: stages::Retire,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Retirement {
    pub tag: Tag,
    pub pc: u32,
    pub opcode: Opcode,
}

#[derive(Debug, Clone)]
pub struct OutOfOrder {
    prog: Program,
    arch_reg_count: u16,
    mem: DataMemory,
    reg_file: RegFile,
    issue_queue: IssueQueue,
    lsq: LoadStoreQueue,
    rob: ReorderBuffer,
    // Advanced in this order each cycle.
    execution_units: Vec<FunctionalUnit>,
    pipe: Pipeline,
    pc: u32,
    fetch_state: FetchState,
    redirect: Option<u32>,
    zero_flag: bool,
    next_tag: u64,
    retirements: Vec<Retirement>,
    state: CpuState,
    stats: Stats,
}

impl Cpu for OutOfOrder {
    fn new(prog: Program, config: &SimConfig) -> Result<Self, SimError> {
        config.validate()?;

        Ok(Self {
            prog,
            arch_reg_count: config.arch_reg_count,
            mem: DataMemory::new(config.memory_size),
            reg_file: RegFile::new(config.arch_reg_count, config.phys_reg_count),
            issue_queue: IssueQueue::new(config.issue_queue_capacity),
            lsq: LoadStoreQueue::new(config.lsq_capacity),
            rob: ReorderBuffer::new(config.rob_capacity),
            execution_units: vec![
                FunctionalUnit::new(UnitKind::Memory),
                FunctionalUnit::new(UnitKind::Branch),
                FunctionalUnit::new(UnitKind::Multiplier),
                FunctionalUnit::new(UnitKind::Integer),
            ],
            pipe: Pipeline::default(),
            pc: CODE_BASE,
            fetch_state: FetchState::Running,
            redirect: None,
            zero_flag: true,
            next_tag: 0,
            retirements: Vec::new(),
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

        // Tail to head, so every stage sees last cycle's latches.
        let retire = self.stage_retire(&pipe);
        self.stage_execute()?;
        self.stage_lsq();
        self.stage_issue();
        let decode = self.stage_decode(&pipe)?;
        let fetch = if decode.should_stall {
            pipe.fetch
        } else {
            self.stage_fetch(&pipe)?
        };

        self.stats.cycles += 1;
        if retire.should_halt {
            debug!("halted after {} cycles", self.stats.cycles);
            for eu in &self.execution_units {
                debug!("{} unit busy for {} cycles", eu.kind, eu.utilisation);
            }
            self.state = CpuState::Stopped;
        }

        self.pipe = Pipeline {
            fetch,
            decode,
            retire,
        };

        Ok(self.state)
    }

    fn snapshot(&self) -> ExecResult {
        ExecResult {
            regs: self.reg_file.arch().clone(),
            phys_regs: self.reg_file.prf().entries().to_vec(),
            mem: self.mem.clone(),
            zero_flag: self.zero_flag,
            stats: self.stats.clone(),
        }
    }

    fn stage_trace(&self) -> Vec<StageTrace> {
        let fetched = self
            .pipe
            .fetch
            .inst
            .map(|f| format!("pc({}) {}", f.pc, f.inst));

        let mut trace = vec![
            StageTrace::new(Stage::Fetch, fetched),
            StageTrace::new(Stage::Decode, self.pipe.decode.inst.iter()),
            StageTrace::new(Stage::IssueQueue, self.issue_queue.iter()),
            StageTrace::new(Stage::LoadStoreQueue, self.lsq.iter().map(|e| &e.tagged)),
        ];

        for eu in self.execution_units.iter().rev() {
            for (i, slot) in eu.stages().iter().enumerate() {
                trace.push(StageTrace::new(Stage::of_unit(eu.kind, i), slot.iter()));
            }
        }

        trace.push(StageTrace::new(Stage::ReorderBuffer, self.rob.iter()));
        trace.push(StageTrace::new(Stage::Retire, self.pipe.retire.entry.iter()));
        trace
    }
}

impl OutOfOrder {
    /// Retired instructions in the order they left the reorder buffer.
    pub fn retirements(&self) -> &[Retirement] {
        &self.retirements
    }

    pub fn reg_file(&self) -> &RegFile {
        &self.reg_file
    }

    pub fn rob(&self) -> &ReorderBuffer {
        &self.rob
    }

    // Commit the head of the ROB to architectural state.
    fn stage_retire(&mut self, _pipe: &Pipeline) -> stages::Retire {
        let entry = match self.rob.try_pop() {
            Some(entry) => entry,
            None => return Default::default(),
        };

        if let (Some(arch), Some(phys), Some(value)) = (entry.inst.dest(), entry.dest, entry.result)
        {
            self.reg_file.retire(arch, phys, value);
            if entry.inst.opcode.sets_flag() {
                self.zero_flag = value == 0;
            }
        }

        debug!("cycle {}: retire {}", self.stats.cycles, entry);
        self.stats.record_retire(entry.inst.opcode);
        self.retirements.push(Retirement {
            tag: entry.tag,
            pc: entry.pc,
            opcode: entry.inst.opcode,
        });

        stages::Retire {
            should_halt: entry.inst.opcode == Opcode::Halt,
            entry: Some(entry),
        }
    }

    // Advance every functional unit and record what finished in the ROB.
    fn stage_execute(&mut self) -> Result<(), SimError> {
        for eu in &mut self.execution_units {
            let latch = match eu.advance(&mut self.mem)? {
                Some(latch) => latch,
                None => continue,
            };

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

            let found = self.rob.mark_complete(latch.tag, latch.result);
            debug_assert!(found, "completed {} not in ROB", latch.tag);
        }

        Ok(())
    }

    fn stage_lsq(&mut self) {
        self.lsq.compute_addresses(&self.reg_file);

        let eu = match self
            .execution_units
            .iter_mut()
            .find(|eu| eu.kind == UnitKind::Memory && eu.is_accepting())
        {
            Some(eu) => eu,
            None => return,
        };

        if let Some(latch) = self.lsq.try_issue(&mut self.reg_file) {
            debug!("cycle {}: lsq issue {}", self.stats.cycles, latch);
            eu.begin_execute(latch);
        }
    }

    // At most one dispatch per unit, oldest ready entry first.
    fn stage_issue(&mut self) {
        for kind in [UnitKind::Integer, UnitKind::Multiplier, UnitKind::Branch] {
            let eu = match self
                .execution_units
                .iter_mut()
                .find(|eu| eu.kind == kind && eu.is_accepting())
            {
                Some(eu) => eu,
                None => continue,
            };

            let (regs, rob) = (&self.reg_file, &self.rob);
            let idx = self.issue_queue.select(kind, |e| {
                regs.all_ready(&e.inst.srcs)
                    && !(e.inst.inst.opcode.reads_flag() && rob.has_older_flag_writer(e.tag))
            });
            let idx = match idx {
                Some(idx) => idx,
                None => continue,
            };

            let operands = match self
                .reg_file
                .read_operands(&self.issue_queue.get(idx).inst.srcs)
            {
                Some(operands) => operands,
                None => continue,
            };

            let entry = self.issue_queue.remove(idx);
            let mut latch = Latch::new(entry.tag, entry.pc, entry.inst.inst, operands);
            latch.dest = entry.inst.dest;
            // Older flag writers have all retired, so the flag is final.
            latch.zero_flag = self.zero_flag;

            debug!("cycle {}: issue {} to {kind}", self.stats.cycles, latch);
            eu.begin_execute(latch);
        }
    }

    fn stage_decode(&mut self, pipe: &Pipeline) -> Result<stages::Decode, SimError> {
        let stages::Fetched { pc, inst } = match pipe.fetch.inst {
            Some(fetched) => fetched,
            None => return Ok(Default::default()),
        };

        inst.check_regs(pc, self.arch_reg_count)?;

        match self.rename_and_allocate(pc, inst) {
            Ok(renamed) => Ok(stages::Decode {
                inst: Some(renamed),
                should_stall: false,
            }),
            Err(e) if e.is_recoverable() => {
                match e {
                    SimError::ReorderBufferFull => self.stats.rob_full_stalls += 1,
                    SimError::PhysicalRegisterExhausted => self.stats.phys_reg_stalls += 1,
                    _ => self.stats.queue_full_stalls += 1,
                }
                trace!("cycle {}: decode stall, {e}", self.stats.cycles);

                Ok(stages::Decode {
                    inst: None,
                    should_stall: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Capacity is checked up front so a stall leaves no partial state behind.
    fn rename_and_allocate(
        &mut self,
        pc: u32,
        inst: Instruction,
    ) -> Result<Tagged<RenamedInst>, SimError> {
        if self.rob.is_full() {
            return Err(SimError::ReorderBufferFull);
        }
        if inst.opcode.is_mem_access() {
            if self.lsq.is_full() {
                return Err(SimError::LoadStoreQueueFull);
            }
        } else if self.issue_queue.is_full() {
            return Err(SimError::IssueQueueFull);
        }

        let renamed = self.reg_file.perform_rename(inst)?;
        let tag = Tag::from(self.next_tag);
        self.next_tag += 1;

        self.rob.try_push(tag, pc, inst, renamed.dest)?;

        let tagged = Tagged {
            tag,
            pc,
            inst: renamed,
        };
        if inst.opcode.is_mem_access() {
            self.lsq.insert(tagged.clone())?;
        } else {
            self.issue_queue.insert(tagged.clone())?;
        }

        debug!("cycle {}: decode {}", self.stats.cycles, tagged);
        Ok(tagged)
    }

    fn stage_fetch(&mut self, _pipe: &Pipeline) -> Result<stages::Fetch, SimError> {
        if let Some(target) = self.redirect.take() {
            self.pc = target;
            self.fetch_state = FetchState::Running;
        }

        if self.fetch_state != FetchState::Running {
            return Ok(Default::default());
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

        Ok(stages::Fetch {
            inst: Some(stages::Fetched { pc, inst }),
        })
    }
}
