pub mod adapter;
pub mod attachment;
pub mod backend;
pub mod config;
pub mod decoder;
pub mod envelope;
pub mod events;
pub mod message;
pub mod session;
pub mod side_channel;
