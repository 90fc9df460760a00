use std::fmt;

use strum::Display;

use crate::inst::UnitKind;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display)]
pub enum Stage {
    Fetch,
    Decode,
    #[strum(serialize = "IQ")]
    IssueQueue,
    #[strum(serialize = "LSQ")]
    LoadStoreQueue,
    #[strum(serialize = "INT1")]
    Int1,
    #[strum(serialize = "INT2")]
    Int2,
    #[strum(serialize = "MUL1")]
    Mul1,
    #[strum(serialize = "MUL2")]
    Mul2,
    #[strum(serialize = "MUL3")]
    Mul3,
    #[strum(serialize = "BR")]
    Branch,
    #[strum(serialize = "MEM")]
    Memory,
    #[strum(serialize = "ROB")]
    ReorderBuffer,
    #[strum(serialize = "RETIRE")]
    Retire,
    #[strum(serialize = "EX1")]
    Ex1,
    #[strum(serialize = "EX2")]
    Ex2,
    #[strum(serialize = "MEM1")]
    Mem1,
    #[strum(serialize = "MEM2")]
    Mem2,
    #[strum(serialize = "WB")]
    Writeback,
    Execute,
}

/// What one stage or structure held at the end of a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTrace {
    pub stage: Stage,
    pub contents: Vec<String>,
}

impl Stage {
    /// Stage `index` (zero based) of a functional unit.
    pub fn of_unit(kind: UnitKind, index: usize) -> Stage {
        match (kind, index) {
            (UnitKind::Integer, 0) => Stage::Int1,
            (UnitKind::Integer, _) => Stage::Int2,
            (UnitKind::Multiplier, 0) => Stage::Mul1,
            (UnitKind::Multiplier, 1) => Stage::Mul2,
            (UnitKind::Multiplier, _) => Stage::Mul3,
            (UnitKind::Branch, _) => Stage::Branch,
            (UnitKind::Memory, _) => Stage::Memory,
        }
    }
}

impl StageTrace {
    pub fn new<I, T>(stage: Stage, items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        Self {
            stage,
            contents: items.into_iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }
}

impl fmt::Display for StageTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.stage.to_string();
        match self.contents.as_slice() {
            [] => write!(f, "{name:<8}: EMPTY"),
            [only] => write!(f, "{name:<8}: {only}"),
            many => {
                write!(f, "{name:<8}:")?;
                for line in many {
                    write!(f, "\n          {line}")?;
                }
                Ok(())
            }
        }
    }
}
