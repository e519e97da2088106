// Core data models for jobline
// These structs represent the domain entities

pub mod status;
pub mod catalog;
pub mod stage;
pub mod pair;
pub mod comparison;

pub use status::*;
pub use catalog::*;
pub use stage::*;
pub use pair::*;
pub use comparison::*;
