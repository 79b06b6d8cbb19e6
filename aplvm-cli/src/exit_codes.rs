//! A small, closed exit-code vocabulary shared by every subcommand: coarse
//! codes for CI compatibility, with the originating
//! [`aplvm_core::errors::ErrorKind`] behind each one recoverable from the
//! error itself rather than a second reason-code enum.

use aplvm_core::errors::{AplError, ErrorKind};

pub const SUCCESS: i32 = 0;
pub const RUNTIME_FAILURE: i32 = 1;
pub const COMPILE_FAILURE: i32 = 2;
pub const INFRA_FAILURE: i32 = 3;

/// Map an [`AplError`] to the exit code its originating kind belongs to.
pub fn for_error(err: &AplError) -> i32 {
    match err.kind {
        ErrorKind::SchemaViolation | ErrorKind::LowerError => COMPILE_FAILURE,
        ErrorKind::ChecksumMismatch => COMPILE_FAILURE,
        ErrorKind::Io => INFRA_FAILURE,
        ErrorKind::UnknownOpcode
        | ErrorKind::UnknownTool
        | ErrorKind::MissingInput
        | ErrorKind::PermissionDenied
        | ErrorKind::QuotaExceeded
        | ErrorKind::GuardFailed
        | ErrorKind::ToolFailure
        | ErrorKind::ReplayMiss => RUNTIME_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_time_kinds_map_to_two() {
        assert_eq!(for_error(&AplError::lower_error("x")), COMPILE_FAILURE);
        assert_eq!(for_error(&AplError::schema_violation("/steps/0", "x")), COMPILE_FAILURE);
    }

    #[test]
    fn runtime_kinds_map_to_one() {
        assert_eq!(for_error(&AplError::guard_failed("ASSERT_GE", "x")), RUNTIME_FAILURE);
        assert_eq!(for_error(&AplError::quota_exceeded("cpu_ms", 1, 0)), RUNTIME_FAILURE);
    }

    #[test]
    fn io_maps_to_three() {
        let err: AplError = std::io::Error::new(std::io::ErrorKind::Other, "x").into();
        assert_eq!(for_error(&err), INFRA_FAILURE);
    }
}
