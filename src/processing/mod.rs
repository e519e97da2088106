//! Post-processing: running result extraction programs over stage output

pub mod executor;
pub mod pool;

#[cfg(all(test, unix))]
pub(crate) mod test_support;

pub use executor::*;
pub use pool::*;
