pub mod filesystem;

pub use filesystem::{ensure_directory, write_atomic, OutputWriter, WriteOutcome};
