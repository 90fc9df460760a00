use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid program: {0}")]
    InvalidProgram(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("register R{reg} out of range (limit {limit}) in instruction at pc {pc}")]
    RegisterIndexOutOfRange { pc: u32, reg: u16, limit: u16 },

    #[error("no free physical register")]
    PhysicalRegisterExhausted,

    #[error("reorder buffer full")]
    ReorderBufferFull,

    #[error("issue queue full")]
    IssueQueueFull,

    #[error("load-store queue full")]
    LoadStoreQueueFull,

    #[error("unknown opcode '{mnemonic}' on line {line}")]
    UnknownOpcode { line: usize, mnemonic: String },

    #[error("parse error on line {line}: {msg}")]
    Parse { line: usize, msg: String },

    #[error("memory address {addr} out of range (instruction at pc {pc})")]
    MemoryAddressOutOfRange { pc: u32, addr: i32 },

    #[error("program counter {pc} is not a valid code address")]
    ProgramCounterOutOfRange { pc: i64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed configuration file: {0}")]
    ConfigFormat(#[from] serde_yaml::Error),
}

impl SimError {
    /// Structural hazards: the stage that hit one stalls and retries next cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SimError::PhysicalRegisterExhausted
                | SimError::ReorderBufferFull
                | SimError::IssueQueueFull
                | SimError::LoadStoreQueueFull
        )
    }
}
