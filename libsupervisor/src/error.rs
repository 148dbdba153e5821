use thiserror::Error;

/// Fatal problems with the spec table. Only ever raised at load time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("syntax error at line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("duplicate program name: {0}")]
    DuplicateProgram(String),

    #[error("program {0} has an empty command")]
    EmptyCommand(String),

    #[error("group {group} references undefined program {member}")]
    UnknownGroupMember { group: String, member: String },

    #[error("program {program} appears in more than one group")]
    DuplicateGroupMember { program: String },

    #[error("invalid value for {key} in [{section}]: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        reason: String,
    },

    #[error("unknown expansion %({0})s")]
    UnknownExpansion(String),
}

/// Errors returned to control clients. Never fatal to the daemon.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("no such process: {0}")]
    UnknownProcess(String),
}
