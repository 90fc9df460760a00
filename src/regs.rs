use std::collections::VecDeque;

use log::trace;

use crate::{
    error::SimError,
    inst::{ArchReg, Instruction, Operand, PhysReg, RenamedInst, Word, MAX_SOURCES},
    rat::RegisterAliasTable,
};

/// Architectural register values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegSet {
    regs: Vec<Word>,
}

// https://ece.uwaterloo.ca/~maagaard/ece720-t4/lec-05.pdf
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PrfEntry {
    Free,
    /// Claimed by an unretired producer; not readable.
    Pending,
    Ready(Word),
}

#[derive(Debug, Clone)]
pub struct PhysRegFile {
    entries: Vec<PrfEntry>,
    // Queued consumers that still name the register.
    readers: Vec<u32>,
    retired: Vec<bool>,
    free_list: VecDeque<PhysReg>,
}

/// Rename state of the out-of-order core: alias table, physical registers and
/// the committed architectural values that unmapped sources read.
#[derive(Debug, Clone)]
pub struct RegFile {
    rat: RegisterAliasTable,
    prf: PhysRegFile,
    arch: RegSet,
}

impl RegSet {
    pub fn new(count: u16) -> Self {
        Self {
            regs: vec![0; usize::from(count)],
        }
    }

    pub fn get(&self, reg: ArchReg) -> Word {
        self.regs.get(usize::from(reg)).copied().unwrap_or(0)
    }

    pub fn set(&mut self, reg: ArchReg, value: Word) {
        if let Some(slot) = self.regs.get_mut(usize::from(reg)) {
            *slot = value;
        }
    }

    pub fn len(&self) -> usize {
        self.regs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArchReg, Word)> + '_ {
        (0u16..).zip(self.regs.iter()).map(|(i, &v)| (ArchReg(i), v))
    }
}

impl PhysRegFile {
    pub fn new(count: u16) -> Self {
        let n = usize::from(count);
        Self {
            entries: vec![PrfEntry::Free; n],
            readers: vec![0; n],
            retired: vec![false; n],
            free_list: (0..count).map(PhysReg).collect(),
        }
    }

    pub fn has_free(&self) -> bool {
        !self.free_list.is_empty()
    }

    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    pub fn allocate(&mut self) -> Result<PhysReg, SimError> {
        let reg = self
            .free_list
            .pop_front()
            .ok_or(SimError::PhysicalRegisterExhausted)?;
        let i = usize::from(reg);

        debug_assert_eq!(self.entries[i], PrfEntry::Free, "{reg} allocated twice");
        self.entries[i] = PrfEntry::Pending;
        self.readers[i] = 0;
        self.retired[i] = false;

        Ok(reg)
    }

    pub fn get(&self, reg: PhysReg) -> PrfEntry {
        self.entries
            .get(usize::from(reg))
            .copied()
            .unwrap_or(PrfEntry::Free)
    }

    pub fn value(&self, reg: PhysReg) -> Option<Word> {
        match self.get(reg) {
            PrfEntry::Ready(v) => Some(v),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[PrfEntry] {
        &self.entries
    }

    fn add_reader(&mut self, reg: PhysReg) {
        self.readers[usize::from(reg)] += 1;
    }

    fn release_reader(&mut self, reg: PhysReg) {
        let i = usize::from(reg);
        self.readers[i] = self.readers[i].saturating_sub(1);
        self.try_free(reg);
    }

    /// Producer retired: the value becomes visible to waiting consumers.
    fn retire(&mut self, reg: PhysReg, value: Word) {
        let i = usize::from(reg);
        self.entries[i] = PrfEntry::Ready(value);
        self.retired[i] = true;
        self.try_free(reg);
    }

    fn try_free(&mut self, reg: PhysReg) {
        let i = usize::from(reg);
        if self.retired[i] && self.readers[i] == 0 && self.entries[i] != PrfEntry::Free {
            trace!("free {reg}");
            self.entries[i] = PrfEntry::Free;
            self.free_list.push_back(reg);
        }
    }
}

impl RegFile {
    pub fn new(arch_reg_count: u16, phys_reg_count: u16) -> Self {
        Self {
            rat: RegisterAliasTable::new(arch_reg_count),
            prf: PhysRegFile::new(phys_reg_count),
            arch: RegSet::new(arch_reg_count),
        }
    }

    pub fn arch(&self) -> &RegSet {
        &self.arch
    }

    pub fn prf(&self) -> &PhysRegFile {
        &self.prf
    }

    pub fn mapping(&self, reg: ArchReg) -> Option<PhysReg> {
        self.rat.get(reg)
    }

    /// Renames sources through the alias table and allocates a fresh physical
    /// register for the destination. Nothing is modified when no register is free.
    pub fn perform_rename(&mut self, inst: Instruction) -> Result<RenamedInst, SimError> {
        if inst.dest().is_some() && !self.prf.has_free() {
            return Err(SimError::PhysicalRegisterExhausted);
        }

        let mut srcs = [None; MAX_SOURCES];
        for (slot, src) in srcs.iter_mut().zip(inst.sources()) {
            *slot = src.map(|arch| match self.rat.get(arch) {
                Some(phys) => {
                    self.prf.add_reader(phys);
                    Operand::Phys(phys)
                }
                None => Operand::Value(self.arch.get(arch)),
            });
        }

        let dest = match inst.dest() {
            Some(arch) => {
                let phys = self.prf.allocate()?;
                self.rat.rename(arch, phys);
                Some(phys)
            }
            None => None,
        };

        Ok(RenamedInst { inst, srcs, dest })
    }

    /// Current value of an operand without consuming it.
    pub fn peek(&self, op: &Operand) -> Option<Word> {
        match op {
            Operand::Value(v) => Some(*v),
            Operand::Phys(p) => self.prf.value(*p),
        }
    }

    pub fn all_ready(&self, srcs: &[Option<Operand>; MAX_SOURCES]) -> bool {
        srcs.iter().flatten().all(|op| self.peek(op).is_some())
    }

    /// Reads operand values at dispatch, dropping this consumer's hold on each
    /// physical source. Returns `None` if any source is still pending.
    pub fn read_operands(
        &mut self,
        srcs: &[Option<Operand>; MAX_SOURCES],
    ) -> Option<[Word; MAX_SOURCES]> {
        if !self.all_ready(srcs) {
            return None;
        }

        let mut vals = [0; MAX_SOURCES];
        for (val, src) in vals.iter_mut().zip(srcs) {
            *val = match *src {
                Some(Operand::Value(v)) => v,
                Some(Operand::Phys(p)) => {
                    let v = self.prf.value(p)?;
                    self.prf.release_reader(p);
                    v
                }
                None => 0,
            };
        }

        Some(vals)
    }

    /// Commits a retiring producer's result.
    pub fn retire(&mut self, arch: ArchReg, phys: PhysReg, value: Word) {
        self.arch.set(arch, value);
        self.rat.unmap_if(arch, phys);
        self.prf.retire(phys, value);
    }
}
