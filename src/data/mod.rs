pub mod collection;
pub mod decoder;
pub mod types;
