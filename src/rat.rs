use crate::inst::{ArchReg, PhysReg};

/// Maps each architectural register to the physical register of its youngest
/// unretired producer. Unmapped registers are read from committed state.
#[derive(Debug, Clone)]
pub struct RegisterAliasTable {
    map: Vec<Option<PhysReg>>,
}

impl RegisterAliasTable {
    pub fn new(arch_reg_count: u16) -> Self {
        Self {
            map: vec![None; usize::from(arch_reg_count)],
        }
    }

    pub fn get(&self, reg: ArchReg) -> Option<PhysReg> {
        self.map.get(usize::from(reg)).copied().flatten()
    }

    pub fn rename(&mut self, reg: ArchReg, phys: PhysReg) {
        if let Some(slot) = self.map.get_mut(usize::from(reg)) {
            *slot = Some(phys);
        }
    }

    /// Drops the mapping only if it still points at `phys`; a younger rename
    /// of the same register keeps its own mapping.
    pub fn unmap_if(&mut self, reg: ArchReg, phys: PhysReg) -> bool {
        match self.map.get_mut(usize::from(reg)) {
            Some(slot) if *slot == Some(phys) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArchReg, PhysReg)> + '_ {
        self.map.iter().enumerate().filter_map(|(i, p)| {
            let arch = ArchReg(u16::try_from(i).ok()?);
            p.map(|p| (arch, p))
        })
    }
}
