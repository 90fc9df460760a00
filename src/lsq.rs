use crate::{
    error::SimError,
    execution_unit::{effective_address, Latch},
    inst::{RenamedInst, Tagged, Word, MAX_SOURCES},
    queue::Queue,
    regs::RegFile,
};

#[derive(Debug, Clone)]
pub struct LsqEntry {
    pub tagged: Tagged<RenamedInst>,
    pub address: Option<Word>,
}

/// Memory instructions in program order. Only the head ever leaves, so loads
/// and stores never pass each other and no address disambiguation is done.
#[derive(Debug, Clone)]
pub struct LoadStoreQueue {
    queue: Queue<LsqEntry>,
}

impl LoadStoreQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Queue::new(capacity),
        }
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn insert(&mut self, tagged: Tagged<RenamedInst>) -> Result<(), SimError> {
        debug_assert!(tagged.inst.inst.opcode.is_mem_access());

        match self.queue.try_push(LsqEntry {
            tagged,
            address: None,
        }) {
            None => Ok(()),
            Some(_) => Err(SimError::LoadStoreQueueFull),
        }
    }

    /// Records the effective address of every entry whose base and index
    /// operands have become available.
    pub fn compute_addresses(&mut self, regs: &RegFile) {
        for entry in self.queue.iter_mut().filter(|e| e.address.is_none()) {
            let srcs = &entry.tagged.inst.srcs;
            let mut ops = [0; MAX_SOURCES];

            // Slots 0 and 1 hold the base and index registers.
            let known = srcs[..2].iter().zip(ops.iter_mut()).all(|(src, op)| match src {
                Some(src) => regs.peek(src).map(|v| *op = v).is_some(),
                None => true,
            });

            if known {
                entry.address = effective_address(&entry.tagged.inst.inst, &ops);
            }
        }
    }

    /// Releases the head to the memory unit once its address and data are known.
    pub fn try_issue(&mut self, regs: &mut RegFile) -> Option<Latch> {
        let head = self.queue.front()?;
        let address = head.address?;
        if !regs.all_ready(&head.tagged.inst.srcs) {
            return None;
        }

        let LsqEntry { tagged, .. } = self.queue.try_pop()?;
        let operands = regs.read_operands(&tagged.inst.srcs)?;

        let mut latch = Latch::new(tagged.tag, tagged.pc, tagged.inst.inst, operands);
        latch.dest = tagged.inst.dest;
        latch.address = Some(address);
        Some(latch)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LsqEntry> {
        self.queue.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::{ArchReg, Instruction, Tag};

    fn rename(regs: &mut RegFile, tag: u64, text: &str) -> Tagged<RenamedInst> {
        let inst: Instruction = text.parse().expect("valid instruction");
        Tagged {
            tag: Tag::from(tag),
            pc: 4000 + 4 * tag as u32,
            inst: regs.perform_rename(inst).expect("free reg"),
        }
    }

    #[test]
    fn test_head_blocks_younger() {
        let mut regs = RegFile::new(8, 8);
        let producer = rename(&mut regs, 0, "MOVC,R1,#100");
        let mut lsq = LoadStoreQueue::new(4);

        lsq.insert(rename(&mut regs, 1, "LOAD,R2,R1,#0")).expect("space");
        lsq.insert(rename(&mut regs, 2, "LOAD,R3,R0,#4")).expect("space");

        lsq.compute_addresses(&regs);
        let addrs = lsq.iter().map(|e| e.address).collect::<Vec<_>>();
        assert_eq!(addrs, vec![None, Some(4)]);

        // The second load is ready but must wait behind the head.
        assert!(lsq.try_issue(&mut regs).is_none());

        let phys = producer.inst.dest.expect("has dest");
        regs.retire(ArchReg(1), phys, 100);
        lsq.compute_addresses(&regs);

        let first = lsq.try_issue(&mut regs).expect("head ready");
        assert_eq!((first.tag, first.address), (Tag::from(1), Some(100)));
        let second = lsq.try_issue(&mut regs).expect("next ready");
        assert_eq!(second.tag, Tag::from(2));
        assert!(lsq.is_empty());
    }

    #[test]
    fn test_store_waits_for_data() {
        let mut regs = RegFile::new(8, 8);
        let data = rename(&mut regs, 0, "MOVC,R2,#7");
        let mut lsq = LoadStoreQueue::new(4);
        lsq.insert(rename(&mut regs, 1, "STORE,R2,R0,#10")).expect("space");

        lsq.compute_addresses(&regs);
        assert_eq!(lsq.iter().next().and_then(|e| e.address), Some(10));
        assert!(lsq.try_issue(&mut regs).is_none());

        regs.retire(ArchReg(2), data.inst.dest.expect("has dest"), 7);
        let store = lsq.try_issue(&mut regs).expect("data ready");
        assert_eq!(store.operands[2], 7);
    }
}
