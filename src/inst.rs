use std::{fmt, str::FromStr};

use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::error::SimError;

pub type Word = i32;

pub const MAX_SOURCES: usize = 3;

/// Program-order sequence number, assigned at decode.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(u64);

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchReg(pub u16);

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysReg(pub u16);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum Opcode {
    Movc,
    Add,
    Addl,
    Sub,
    Subl,
    Mul,
    And,
    Or,
    #[strum(to_string = "XOR", serialize = "EX-OR")]
    Xor,
    Load,
    Ldr,
    Store,
    Str,
    Bz,
    Bnz,
    Jump,
    Halt,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Display)]
pub enum UnitKind {
    Integer,
    Multiplier,
    Branch,
    Memory,
}

/// Assembly operand layout of an opcode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Format {
    /// `rd,#imm`
    RegImm,
    /// `rd,rs1,rs2`
    ThreeReg,
    /// `rd,rs1,#imm`
    TwoRegImm,
    /// `rs1,rs2,#imm` where rs1 is the stored value
    StoreImm,
    /// `#imm`
    Imm,
    /// `rs1,#imm`
    RegOffset,
    Bare,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub rd: ArchReg,
    pub rs1: ArchReg,
    pub rs2: ArchReg,
    pub imm: Word,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseInstError {
    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),
    #[error("{opcode} takes {expected} operands, found {found}")]
    OperandCount {
        opcode: Opcode,
        expected: usize,
        found: usize,
    },
    #[error("invalid register '{0}'")]
    BadRegister(String),
    #[error("invalid immediate '{0}'")]
    BadImmediate(String),
}

impl From<u64> for Tag {
    fn from(seq: u64) -> Self {
        Tag(seq)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for ArchReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl From<ArchReg> for usize {
    fn from(reg: ArchReg) -> Self {
        usize::from(reg.0)
    }
}

impl From<PhysReg> for usize {
    fn from(reg: PhysReg) -> Self {
        usize::from(reg.0)
    }
}

impl UnitKind {
    /// Number of pipeline stages in the functional unit.
    pub fn depth(self) -> usize {
        match self {
            UnitKind::Integer => 2,
            UnitKind::Multiplier => 3,
            UnitKind::Branch | UnitKind::Memory => 1,
        }
    }
}

impl Opcode {
    pub fn unit(self) -> UnitKind {
        match self {
            Opcode::Mul => UnitKind::Multiplier,
            Opcode::Bz | Opcode::Bnz | Opcode::Jump => UnitKind::Branch,
            Opcode::Load | Opcode::Ldr | Opcode::Store | Opcode::Str => UnitKind::Memory,
            _ => UnitKind::Integer,
        }
    }

    /// Register-register arithmetic updates the zero flag when it retires.
    /// The literal forms ADDL and SUBL leave it alone.
    pub fn sets_flag(self) -> bool {
        matches!(self, Opcode::Add | Opcode::Sub | Opcode::Mul)
    }

    pub fn is_load(self) -> bool {
        matches!(self, Opcode::Load | Opcode::Ldr)
    }

    pub fn is_store(self) -> bool {
        matches!(self, Opcode::Store | Opcode::Str)
    }

    pub fn is_mem_access(self) -> bool {
        self.is_load() || self.is_store()
    }

    pub fn is_control(self) -> bool {
        self.unit() == UnitKind::Branch
    }

    pub fn reads_flag(self) -> bool {
        matches!(self, Opcode::Bz | Opcode::Bnz)
    }

    fn format(self) -> Format {
        match self {
            Opcode::Movc => Format::RegImm,
            Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Ldr
            | Opcode::Str => Format::ThreeReg,
            Opcode::Addl | Opcode::Subl | Opcode::Load => Format::TwoRegImm,
            Opcode::Store => Format::StoreImm,
            Opcode::Bz | Opcode::Bnz => Format::Imm,
            Opcode::Jump => Format::RegOffset,
            Opcode::Halt => Format::Bare,
        }
    }
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            rd: ArchReg(0),
            rs1: ArchReg(0),
            rs2: ArchReg(0),
            imm: 0,
        }
    }

    pub fn halt() -> Self {
        Self::new(Opcode::Halt)
    }

    pub fn with_rd(self, rd: u16) -> Self {
        Self {
            rd: ArchReg(rd),
            ..self
        }
    }

    pub fn with_rs1(self, rs1: u16) -> Self {
        Self {
            rs1: ArchReg(rs1),
            ..self
        }
    }

    pub fn with_rs2(self, rs2: u16) -> Self {
        Self {
            rs2: ArchReg(rs2),
            ..self
        }
    }

    pub fn with_imm(self, imm: Word) -> Self {
        Self { imm, ..self }
    }

    /// The register written at retirement, if any. STR names its data register
    /// in `rd` but only reads it.
    pub fn dest(&self) -> Option<ArchReg> {
        match self.opcode {
            Opcode::Movc
            | Opcode::Add
            | Opcode::Addl
            | Opcode::Sub
            | Opcode::Subl
            | Opcode::Mul
            | Opcode::And
            | Opcode::Or
            | Opcode::Xor
            | Opcode::Load
            | Opcode::Ldr => Some(self.rd),
            _ => None,
        }
    }

    /// Source registers by operand slot. Memory accesses use slot 0 for the base,
    /// slot 1 for the index and slot 2 for the stored value.
    pub fn sources(&self) -> [Option<ArchReg>; MAX_SOURCES] {
        match self.opcode {
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::And | Opcode::Or | Opcode::Xor => {
                [Some(self.rs1), Some(self.rs2), None]
            }
            Opcode::Addl | Opcode::Subl | Opcode::Load => [Some(self.rs1), None, None],
            Opcode::Ldr => [Some(self.rs1), Some(self.rs2), None],
            Opcode::Store => [Some(self.rs2), None, Some(self.rs1)],
            Opcode::Str => [Some(self.rs1), Some(self.rs2), Some(self.rd)],
            // JUMP names rs1 in its syntax but targets pc + imm.
            Opcode::Movc | Opcode::Bz | Opcode::Bnz | Opcode::Jump | Opcode::Halt => {
                [None; MAX_SOURCES]
            }
        }
    }

    pub fn check_regs(&self, pc: u32, arch_reg_count: u16) -> Result<(), SimError> {
        let bad = self
            .dest()
            .into_iter()
            .chain(self.sources().into_iter().flatten())
            .find(|reg| reg.0 >= arch_reg_count);

        match bad {
            Some(reg) => Err(SimError::RegisterIndexOutOfRange {
                pc,
                reg: reg.0,
                limit: arch_reg_count,
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = self.opcode;
        match op.format() {
            Format::RegImm => write!(f, "{op},{},#{}", self.rd, self.imm),
            Format::ThreeReg => write!(f, "{op},{},{},{}", self.rd, self.rs1, self.rs2),
            Format::TwoRegImm => write!(f, "{op},{},{},#{}", self.rd, self.rs1, self.imm),
            Format::StoreImm => write!(f, "{op},{},{},#{}", self.rs1, self.rs2, self.imm),
            Format::Imm => write!(f, "{op},#{}", self.imm),
            Format::RegOffset => write!(f, "{op},{},#{}", self.rs1, self.imm),
            Format::Bare => write!(f, "{op}"),
        }
    }
}

impl FromStr for ArchReg {
    type Err = ParseInstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix(['R', 'r'])
            .and_then(|n| n.parse::<u16>().ok())
            .map(ArchReg)
            .ok_or_else(|| ParseInstError::BadRegister(s.to_owned()))
    }
}

fn parse_imm(s: &str) -> Result<Word, ParseInstError> {
    s.strip_prefix('#')
        .and_then(|n| n.parse::<Word>().ok())
        .ok_or_else(|| ParseInstError::BadImmediate(s.to_owned()))
}

impl FromStr for Instruction {
    type Err = ParseInstError;

    /// Accepts `MOVC,R1,#5` as well as `MOVC R1, #5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (op, rest) = s
            .split_once(|c: char| c == ',' || c.is_whitespace())
            .unwrap_or((s, ""));
        let opcode =
            Opcode::from_str(op).map_err(|_| ParseInstError::UnknownOpcode(op.to_owned()))?;

        let args = rest
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|a| !a.is_empty())
            .collect::<Vec<_>>();

        let expected = match opcode.format() {
            Format::ThreeReg | Format::TwoRegImm | Format::StoreImm => 3,
            Format::RegImm | Format::RegOffset => 2,
            Format::Imm => 1,
            Format::Bare => 0,
        };
        if args.len() != expected {
            return Err(ParseInstError::OperandCount {
                opcode,
                expected,
                found: args.len(),
            });
        }

        let reg = |n: usize| ArchReg::from_str(args[n]);
        let inst = Instruction::new(opcode);

        Ok(match opcode.format() {
            Format::RegImm => Instruction {
                rd: reg(0)?,
                imm: parse_imm(args[1])?,
                ..inst
            },
            Format::ThreeReg => Instruction {
                rd: reg(0)?,
                rs1: reg(1)?,
                rs2: reg(2)?,
                ..inst
            },
            Format::TwoRegImm => Instruction {
                rd: reg(0)?,
                rs1: reg(1)?,
                imm: parse_imm(args[2])?,
                ..inst
            },
            Format::StoreImm => Instruction {
                rs1: reg(0)?,
                rs2: reg(1)?,
                imm: parse_imm(args[2])?,
                ..inst
            },
            Format::Imm => Instruction {
                imm: parse_imm(args[0])?,
                ..inst
            },
            Format::RegOffset => Instruction {
                rs1: reg(0)?,
                imm: parse_imm(args[1])?,
                ..inst
            },
            Format::Bare => inst,
        })
    }
}

/// A source operand after renaming: either captured from committed state or
/// waiting on an in-flight producer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operand {
    Value(Word),
    Phys(PhysReg),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenamedInst {
    pub inst: Instruction,
    pub srcs: [Option<Operand>; MAX_SOURCES],
    pub dest: Option<PhysReg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged<T> {
    pub tag: Tag,
    pub pc: u32,
    pub inst: T,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Value(v) => write!(f, "{v}"),
            Operand::Phys(p) => write!(f, "{p}"),
        }
    }
}

impl fmt::Display for RenamedInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inst)?;

        let srcs = self.srcs.iter().flatten().collect::<Vec<_>>();
        if self.dest.is_some() || !srcs.is_empty() {
            write!(f, " [")?;
            if let Some(dest) = self.dest {
                write!(f, "{dest} <-")?;
            }
            for src in srcs {
                write!(f, " {src}")?;
            }
            write!(f, "]")?;
        }

        Ok(())
    }
}

impl<T: fmt::Display> fmt::Display for Tagged<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pc({}) {}", self.tag, self.pc, self.inst)
    }
}
