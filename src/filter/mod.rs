pub mod evaluator;
pub mod parser;

pub use evaluator::*;
pub use parser::*;
