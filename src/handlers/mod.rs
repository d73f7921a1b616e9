//! HTTP handlers, grouped by the part of the site they serve.

pub mod album_handlers;
pub mod file_handlers;
pub mod health_handlers;
pub mod object_handlers;
