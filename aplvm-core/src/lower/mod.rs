pub mod guard;
pub mod lowerer;
pub mod symtab;

pub use guard::{parse_guard, ParsedGuard};
pub use lowerer::lower;
pub use symtab::Symtab;
