pub mod packager;

pub use packager::{pack, PackManifest};
