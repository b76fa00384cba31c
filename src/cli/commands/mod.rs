pub mod migrate;
pub mod operator;
pub mod plans;
pub mod sweep;
