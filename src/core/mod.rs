pub mod attachment_service;
pub mod health_service;
pub(crate) mod record_locks;
