pub mod auth;
pub mod core;
pub mod device;
pub mod directory;
pub mod main_module;
pub mod notifications;
pub mod routes;
pub mod security;
pub mod session;
pub mod tickets;
