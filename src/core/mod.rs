pub mod blob;
pub mod broker;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod policy;
pub mod schemas;
pub mod store;
pub mod time;
