pub mod cache;
pub mod filestore;
pub mod persist;
pub mod traits;

pub use cache::*;
pub use filestore::*;
pub use persist::*;
pub use traits::*;
