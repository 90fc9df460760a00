use std::fmt;

use log::trace;

use crate::{
    error::SimError,
    inst::{Instruction, Opcode, PhysReg, Tag, UnitKind, Word, MAX_SOURCES},
    mem::DataMemory,
    program::INST_SIZE,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BranchOutcome {
    pub taken: bool,
    pub next_pc: i64,
}

/// Contents of one functional-unit stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Latch {
    pub tag: Tag,
    pub pc: u32,
    pub inst: Instruction,
    pub dest: Option<PhysReg>,
    pub operands: [Word; MAX_SOURCES],
    pub address: Option<Word>,
    pub result: Option<Word>,
    /// Zero flag as seen by a conditional branch when it was dispatched.
    pub zero_flag: bool,
    pub branch: Option<BranchOutcome>,
}

/// A fixed-depth pipeline. Slot `i` holds the latch that stage `i + 1` works on
/// this cycle; the first stage does all the work and later stages only delay.
#[derive(Debug, Clone)]
pub struct FunctionalUnit {
    pub kind: UnitKind,
    pub utilisation: u64,
    stages: Vec<Option<Latch>>,
}

impl Latch {
    pub fn new(tag: Tag, pc: u32, inst: Instruction, operands: [Word; MAX_SOURCES]) -> Self {
        Self {
            tag,
            pc,
            inst,
            dest: None,
            operands,
            address: None,
            result: None,
            zero_flag: false,
            branch: None,
        }
    }

    pub fn execute_alu(&mut self) {
        self.result = alu(&self.inst, &self.operands);
    }

    pub fn execute_branch(&mut self) {
        self.branch = resolve_branch(&self.inst, self.pc, self.zero_flag);
    }

    pub fn compute_address(&mut self) {
        self.address = self
            .address
            .or_else(|| effective_address(&self.inst, &self.operands));
    }

    pub fn execute_memory(&mut self, mem: &mut DataMemory) -> Result<(), SimError> {
        self.compute_address();
        if let Some(addr) = self.address {
            self.result = memory_access(&self.inst, self.pc, addr, &self.operands, mem)?;
        }
        Ok(())
    }
}

impl fmt::Display for Latch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pc({}) {}", self.tag, self.pc, self.inst)?;
        if let Some(addr) = self.address {
            write!(f, " @{addr}")?;
        }
        if let Some(result) = self.result {
            write!(f, " = {result}")?;
        }
        Ok(())
    }
}

impl FunctionalUnit {
    pub fn new(kind: UnitKind) -> Self {
        Self {
            kind,
            utilisation: 0,
            stages: vec![None; kind.depth()],
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.stages[0].is_none()
    }

    pub fn can_execute(&self, inst: &Instruction) -> bool {
        inst.opcode.unit() == self.kind && self.is_accepting()
    }

    pub fn begin_execute(&mut self, latch: Latch) {
        debug_assert!(self.can_execute(&latch.inst));
        self.stages[0] = Some(latch);
    }

    pub fn stages(&self) -> &[Option<Latch>] {
        &self.stages
    }

    pub fn is_idle(&self) -> bool {
        self.stages.iter().all(Option::is_none)
    }

    /// Moves every latch one stage forward, last stage first, and returns the
    /// latch that left the final stage.
    pub fn advance(&mut self, mem: &mut DataMemory) -> Result<Option<Latch>, SimError> {
        let last = self.stages.len() - 1;
        let mut done = None;

        if self.stages[0].is_some() {
            self.utilisation += 1;
        }

        for i in (0..=last).rev() {
            let mut latch = match self.stages[i].take() {
                Some(latch) => latch,
                None => continue,
            };

            if i == 0 {
                self.compute(&mut latch, mem)?;
            }

            if i == last {
                done = Some(latch);
            } else {
                self.stages[i + 1] = Some(latch);
            }
        }

        Ok(done)
    }

    fn compute(&self, latch: &mut Latch, mem: &mut DataMemory) -> Result<(), SimError> {
        match self.kind {
            UnitKind::Integer | UnitKind::Multiplier => latch.execute_alu(),
            UnitKind::Branch => latch.execute_branch(),
            UnitKind::Memory => latch.execute_memory(mem)?,
        }

        trace!("{:?} computed {}", self.kind, latch);
        Ok(())
    }
}

/// Integer and multiplier results. `None` for instructions with no register result.
pub fn alu(inst: &Instruction, ops: &[Word; MAX_SOURCES]) -> Option<Word> {
    let (a, b) = (ops[0], ops[1]);

    let val = match inst.opcode {
        Opcode::Movc => inst.imm,
        Opcode::Add => a.wrapping_add(b),
        Opcode::Addl => a.wrapping_add(inst.imm),
        Opcode::Sub => a.wrapping_sub(b),
        Opcode::Subl => a.wrapping_sub(inst.imm),
        Opcode::Mul => a.wrapping_mul(b),
        Opcode::And => a & b,
        Opcode::Or => a | b,
        Opcode::Xor => a ^ b,
        _ => return None,
    };

    Some(val)
}

pub fn effective_address(inst: &Instruction, ops: &[Word; MAX_SOURCES]) -> Option<Word> {
    match inst.opcode {
        Opcode::Load | Opcode::Store => Some(ops[0].wrapping_add(inst.imm)),
        Opcode::Ldr | Opcode::Str => Some(ops[0].wrapping_add(ops[1])),
        _ => None,
    }
}

/// Performs the access at `addr`, returning the loaded value for loads.
pub fn memory_access(
    inst: &Instruction,
    pc: u32,
    addr: Word,
    ops: &[Word; MAX_SOURCES],
    mem: &mut DataMemory,
) -> Result<Option<Word>, SimError> {
    let out_of_range = SimError::MemoryAddressOutOfRange { pc, addr };

    if inst.opcode.is_load() {
        mem.read(addr).map(Some).ok_or(out_of_range)
    } else if inst.opcode.is_store() {
        mem.write(addr, ops[2]).ok_or(out_of_range)?;
        Ok(None)
    } else {
        Ok(None)
    }
}

/// Every control transfer is pc-relative; only BZ/BNZ look at the flag.
pub fn resolve_branch(inst: &Instruction, pc: u32, zero_flag: bool) -> Option<BranchOutcome> {
    let pc = i64::from(pc);
    let relative = pc + i64::from(inst.imm);

    let (taken, target) = match inst.opcode {
        Opcode::Bz => (zero_flag, relative),
        Opcode::Bnz => (!zero_flag, relative),
        Opcode::Jump => (true, relative),
        _ => return None,
    };

    Some(BranchOutcome {
        taken,
        next_pc: if taken { target } else { pc + i64::from(INST_SIZE) },
    })
}
