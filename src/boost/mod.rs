pub mod machine;
pub mod zones;
