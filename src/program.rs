use std::str::FromStr;

use crate::{
    error::SimError,
    inst::{Instruction, ParseInstError},
};

pub const CODE_BASE: u32 = 4000;
pub const INST_SIZE: u32 = 4;

/// Immutable instruction store. Instruction `i` lives at `CODE_BASE + 4 * i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    insts: Vec<Instruction>,
}

impl Program {
    pub fn new(insts: Vec<Instruction>) -> Result<Self, SimError> {
        if insts.is_empty() {
            return Err(SimError::InvalidProgram("no instructions".into()));
        }

        Ok(Self { insts })
    }

    /// `Ok(None)` past the last instruction; an error for addresses that can
    /// never hold code.
    pub fn fetch(&self, pc: u32) -> Result<Option<&Instruction>, SimError> {
        let offset = pc
            .checked_sub(CODE_BASE)
            .filter(|off| off % INST_SIZE == 0)
            .ok_or(SimError::ProgramCounterOutOfRange { pc: pc.into() })?;

        let index = usize::try_from(offset / INST_SIZE)
            .map_err(|_| SimError::ProgramCounterOutOfRange { pc: pc.into() })?;

        Ok(self.insts.get(index))
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn insts(&self) -> &[Instruction] {
        &self.insts
    }
}

/// Checks a computed branch target before it is handed to fetch.
pub fn code_address(target: i64) -> Result<u32, SimError> {
    u32::try_from(target)
        .ok()
        .filter(|&pc| pc >= CODE_BASE && (pc - CODE_BASE) % INST_SIZE == 0)
        .ok_or(SimError::ProgramCounterOutOfRange { pc: target })
}

impl FromStr for Program {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut insts = Vec::default();

        for (i, line) in s.lines().enumerate() {
            // Strip comments and empty lines
            let line = line.trim();
            let line = line[..line.find(';').unwrap_or(line.len())].trim();
            if line.is_empty() {
                continue;
            }

            // Line numbers start at 1
            let line_no = i + 1;

            match line.parse::<Instruction>() {
                Ok(inst) => insts.push(inst),
                Err(ParseInstError::UnknownOpcode(mnemonic)) => {
                    return Err(SimError::UnknownOpcode {
                        line: line_no,
                        mnemonic,
                    })
                }
                Err(e) => {
                    return Err(SimError::Parse {
                        line: line_no,
                        msg: format!("'{line}': {e}"),
                    })
                }
            }
        }

        Program::new(insts)
    }
}
