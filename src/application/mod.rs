// Application layer - use cases and orchestration.
// Registration owns every write path; queries are read-only projections.

pub mod error;
pub mod queries;
pub mod service;

pub use error::*;
pub use queries::*;
pub use service::*;
