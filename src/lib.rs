pub mod acquisition;
pub mod config;
pub mod coordinator;
pub mod gantry;
pub mod link;
pub mod messages;
pub mod runtime;
pub mod vision;
