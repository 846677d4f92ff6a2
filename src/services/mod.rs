pub mod archive;
pub mod backup_job;
pub mod backup_name;
pub mod backup_scheduler;
pub mod dump;
pub mod progress;
pub mod retention;
