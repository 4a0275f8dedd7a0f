pub mod point;
pub mod vehicle;
