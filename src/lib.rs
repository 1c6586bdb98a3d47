pub mod config;
pub mod dom;
pub mod engine;
pub mod hub;
pub mod init;
pub mod page;
pub mod protocol;
pub mod store;
