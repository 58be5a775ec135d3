mod export;

pub use export::{Exporter, Snapshot};
