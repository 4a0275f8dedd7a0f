pub mod boost;
pub mod map;
