//! replyloop — thread-token correlated outreach with automated replies.

pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod llm;
pub mod mailbox;
pub mod pipeline;
pub mod store;
pub mod token;
pub mod transport;
