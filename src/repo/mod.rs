pub mod attribute;
pub mod catalog;
pub mod input;
pub mod pair;
pub mod stage;

pub use attribute::*;
pub use catalog::*;
pub use input::*;
pub use pair::*;
pub use stage::*;
