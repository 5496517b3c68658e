pub mod base;
pub mod mpmc;
