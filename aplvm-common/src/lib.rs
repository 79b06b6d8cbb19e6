//! Canonical JSON, content hashing, and the numeric rounding rule shared by
//! the compiler, the VM, and the packager.

pub mod canonical;
pub mod hashing;
pub mod rounding;

pub use canonical::to_canonical_string;
pub use hashing::{sha256_hex, sha256_prefix};
pub use rounding::round12;
