pub mod connection;
pub mod migrations;
pub mod unit_of_work;

pub use connection::*;
pub use migrations::*;
pub use unit_of_work::*;
