pub mod auth_service;
pub mod listing_service;
pub mod signing_service;
pub mod storage_service;
