pub mod chat;
pub mod config;
pub mod email;
pub mod gmail;
pub mod history;
pub mod oauth;
pub mod openai;
pub mod prompt;
pub mod public;
pub mod server;
pub mod tools;
