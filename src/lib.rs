pub mod broker;
pub mod channels;
pub mod chip;
pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod matcher;
pub mod models;
pub mod protocol;
pub mod screenshot;
pub mod server;

pub use channels::ChannelSet;
pub use error::{Error, Result};
pub use screenshot::Screenshot;
