use crate::inst::Instruction;

/// `reader` consumes a register that `writer` produces.
pub fn read_after_write(reader: &Instruction, writer: &Instruction) -> bool {
    match writer.dest() {
        Some(dst) => reader.sources().iter().flatten().any(|&src| src == dst),
        None => false,
    }
}

/// `reader` is a conditional branch that depends on the flag `writer` sets.
pub fn reads_flag_of(reader: &Instruction, writer: &Instruction) -> bool {
    reader.opcode.reads_flag() && writer.opcode.sets_flag()
}
