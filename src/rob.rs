use std::fmt;

use crate::{
    error::SimError,
    inst::{Instruction, PhysReg, Tag, Word},
    queue::Queue,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RobStatus {
    Executing,
    Executed,
}

#[derive(Debug, Clone)]
pub struct RobEntry {
    pub tag: Tag,
    pub pc: u32,
    pub inst: Instruction,
    pub dest: Option<PhysReg>,
    pub status: RobStatus,
    pub result: Option<Word>,
}

#[derive(Debug, Clone)]
pub struct ReorderBuffer {
    rob: Queue<RobEntry>,
}

impl ReorderBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            rob: Queue::new(capacity),
        }
    }

    pub fn is_full(&self) -> bool {
        self.rob.is_full()
    }

    pub fn is_empty(&self) -> bool {
        self.rob.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rob.len()
    }

    pub fn try_push(
        &mut self,
        tag: Tag,
        pc: u32,
        inst: Instruction,
        dest: Option<PhysReg>,
    ) -> Result<(), SimError> {
        let entry = RobEntry {
            tag,
            pc,
            inst,
            dest,
            status: RobStatus::Executing,
            result: None,
        };

        match self.rob.try_push(entry) {
            None => Ok(()),
            Some(_) => Err(SimError::ReorderBufferFull),
        }
    }

    /// Removes the head, but only once it has executed.
    pub fn try_pop(&mut self) -> Option<RobEntry> {
        if self
            .rob
            .front()
            .map(|ent| ent.status == RobStatus::Executed)
            .unwrap_or(false)
        {
            self.rob.try_pop()
        } else {
            None
        }
    }

    pub fn mark_complete(&mut self, tag: Tag, result: Option<Word>) -> bool {
        match self.rob.iter_mut().find(|ent| ent.tag == tag) {
            Some(ent) => {
                ent.status = RobStatus::Executed;
                ent.result = result;
                true
            }
            None => false,
        }
    }

    /// True while an older instruction that updates the zero flag has not retired.
    pub fn has_older_flag_writer(&self, tag: Tag) -> bool {
        self.rob
            .iter()
            .take_while(|ent| ent.tag < tag)
            .any(|ent| ent.inst.opcode.sets_flag())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RobEntry> {
        self.rob.iter()
    }
}

impl fmt::Display for RobEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            RobStatus::Executing => "executing",
            RobStatus::Executed => "executed",
        };
        write!(f, "{} pc({}) {} {status}", self.tag, self.pc, self.inst)?;
        if let Some(result) = self.result {
            write!(f, " = {result}")?;
        }
        Ok(())
    }
}
