pub mod command;
pub mod error;
pub mod fetch;
pub mod http;
pub mod library;
pub mod markup;
pub mod mpv;
pub mod playback;
pub mod poller;
pub mod session;
pub mod status;
