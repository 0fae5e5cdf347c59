pub mod datetime;
pub mod human_size;
