//! Error kinds for the compiler and VM.
//!
//! One [`ErrorKind`] variant per named fatal condition, carrying the
//! structured context the CLI needs to print without re-parsing a message
//! string (JSON pointer, opcode, offending operands, capability, quota
//! name): a fluent builder plus named constructors over a single struct,
//! rather than one struct per kind.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SchemaViolation,
    LowerError,
    UnknownOpcode,
    UnknownTool,
    MissingInput,
    PermissionDenied,
    QuotaExceeded,
    GuardFailed,
    ToolFailure,
    ReplayMiss,
    ChecksumMismatch,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SchemaViolation => "SchemaViolation",
            ErrorKind::LowerError => "LowerError",
            ErrorKind::UnknownOpcode => "UnknownOpcode",
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::MissingInput => "MissingInput",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::QuotaExceeded => "QuotaExceeded",
            ErrorKind::GuardFailed => "GuardFailed",
            ErrorKind::ToolFailure => "ToolFailure",
            ErrorKind::ReplayMiss => "ReplayMiss",
            ErrorKind::ChecksumMismatch => "ChecksumMismatch",
            ErrorKind::Io => "Io",
        }
    }

    /// Whether this kind halts compilation (vs. a VM run).
    pub fn is_compile_time(&self) -> bool {
        matches!(self, ErrorKind::SchemaViolation | ErrorKind::LowerError)
    }
}

#[derive(Debug, Error)]
#[error("{kind_str}: {message}{path_suffix}{opcode_suffix}")]
pub struct AplError {
    pub kind: ErrorKind,
    pub message: String,
    pub pointer: Option<String>,
    pub path: Option<PathBuf>,
    pub opcode: Option<String>,
    pub tool: Option<String>,
    pub capability: Option<String>,
    pub quota: Option<String>,
    kind_str: &'static str,
    path_suffix: String,
    opcode_suffix: String,
}

impl AplError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        AplError {
            kind_str: kind.as_str(),
            kind,
            message: message.into(),
            pointer: None,
            path: None,
            opcode: None,
            tool: None,
            capability: None,
            quota: None,
            path_suffix: String::new(),
            opcode_suffix: String::new(),
        }
    }

    fn refresh_suffixes(mut self) -> Self {
        self.path_suffix = self
            .path
            .as_ref()
            .map(|p| format!(" (path={})", p.display()))
            .unwrap_or_default();
        self.opcode_suffix = self
            .opcode
            .as_ref()
            .map(|o| format!(" (opcode={o})"))
            .unwrap_or_default();
        self
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self.refresh_suffixes()
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self.refresh_suffixes()
    }

    pub fn with_opcode(mut self, opcode: impl Into<String>) -> Self {
        self.opcode = Some(opcode.into());
        self.refresh_suffixes()
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }

    pub fn with_quota(mut self, quota: impl Into<String>) -> Self {
        self.quota = Some(quota.into());
        self
    }

    pub fn schema_violation(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaViolation, message).with_pointer(pointer)
    }

    pub fn lower_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LowerError, message)
    }

    pub fn unknown_opcode(opcode: impl Into<String>) -> Self {
        let opcode = opcode.into();
        Self::new(ErrorKind::UnknownOpcode, format!("unknown opcode: {opcode}")).with_opcode(opcode)
    }

    pub fn unknown_tool(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(ErrorKind::UnknownTool, format!("unknown tool: {tool}")).with_tool(tool)
    }

    pub fn missing_input(slot: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::MissingInput, format!("slot {slot} has not been written"))
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(
            ErrorKind::PermissionDenied,
            format!("path escapes sandbox root: {}", path.display()),
        )
        .with_path(path)
    }

    pub fn quota_exceeded(quota: impl Into<String>, total: u64, limit: u64) -> Self {
        let quota = quota.into();
        Self::new(
            ErrorKind::QuotaExceeded,
            format!("quota '{quota}' exceeded: {total} > {limit}"),
        )
        .with_quota(quota)
    }

    pub fn guard_failed(opcode: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::GuardFailed, message).with_opcode(opcode)
    }

    pub fn tool_failure(tool: impl Into<String>, message: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(ErrorKind::ToolFailure, message).with_tool(tool)
    }

    pub fn replay_miss(cache_key_prefix: impl Into<String>) -> Self {
        let prefix = cache_key_prefix.into();
        Self::new(
            ErrorKind::ReplayMiss,
            format!("cache miss during replay (key prefix {prefix})"),
        )
    }

    pub fn checksum_mismatch(count: usize) -> Self {
        Self::new(ErrorKind::ChecksumMismatch, format!("{count} checksum diffs"))
    }
}

impl From<std::io::Error> for AplError {
    fn from(e: std::io::Error) -> Self {
        AplError::new(ErrorKind::Io, e.to_string())
    }
}

impl From<serde_json::Error> for AplError {
    fn from(e: serde_json::Error) -> Self {
        AplError::new(ErrorKind::Io, format!("json error: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, AplError>;
