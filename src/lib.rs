pub mod bridge;
pub mod catalog;
pub mod completion;
pub mod conversation;
pub mod error;
pub mod prompt;
pub mod relay;
pub mod selection;
pub mod session;
pub mod settings;
pub mod storage;
pub mod terminal;
