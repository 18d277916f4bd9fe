pub mod client;
pub mod config;
pub mod coordinator;
pub mod definitions;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod server;
pub mod shutdown;
pub mod time;
pub mod worker;
