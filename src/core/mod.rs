pub mod ids;
pub mod records;
