pub mod core;
pub mod exchange;
pub mod records;
pub mod session;
