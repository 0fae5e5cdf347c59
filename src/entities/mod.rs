//! SeaORM entities for the shifter schema

pub mod file_records;
pub mod prelude;
pub mod site_settings;
