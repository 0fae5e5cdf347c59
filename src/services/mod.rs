//! Service layer: business rules over the repositories and file storage

pub mod files;

pub use files::{FileService, FileStorage, StagedUpload};
