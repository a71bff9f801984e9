// Library exports for Usapan
// This allows integration tests and external code to use Usapan modules

pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod identity;
pub mod notifications;
pub mod preferences;
pub mod push;
pub mod routes;
pub mod social;
pub mod state;
