pub mod client;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod store;

pub use client::{BackendId, Client, ControlLayer, EntryHandle, FieldDiff};
pub use error::{CfgError, Result};

// Export logic types
pub use logic::{
    FillDepth, Lookup, Resolver, ValidationIssue, ValidationProblem, ValidationReport, Validator,
};

// Export all model types
pub use model::*;

// Export store types
pub use store::{ConfigBackend, EntityCache, FilestoreBackend, Persistence};
