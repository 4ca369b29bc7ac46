pub mod auth;
pub mod chats;
pub mod composer;
pub mod feed;
pub mod logging;
pub mod realtime;
pub mod rest;
pub mod session;
pub mod store;
pub mod theme;
pub mod thread;
