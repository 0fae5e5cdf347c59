//! Repository layer over the SeaORM connection
//!
//! Each repository owns an `Arc<DatabaseConnection>` and exposes the handful
//! of queries its domain needs; business rules stay in the service layer.

pub mod file_record;
pub mod site_setting;

pub use file_record::FileRecordRepository;
pub use site_setting::SiteSettingRepository;
