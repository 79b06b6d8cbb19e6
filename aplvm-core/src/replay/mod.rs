pub mod engine;

pub use engine::{extract_to_tmp, replay, ReplayDiff, ReplayReport};
