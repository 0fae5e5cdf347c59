pub use super::file_records::Entity as FileRecords;
pub use super::site_settings::Entity as SiteSettings;
