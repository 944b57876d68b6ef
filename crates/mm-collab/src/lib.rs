pub mod auth;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod persistence;
pub mod relay;
pub mod session;
pub mod tcp;

pub use auth::Credential;
pub use channel::{Inbound, LocalChannel, LocalHub, RealtimeChannel};
pub use codec::{Frame, WireCodec};
pub use config::SessionConfig;
pub use error::{CollabError, Result};
pub use persistence::{JsonFileStore, MemoryStore, TreeStore};
pub use relay::RelayServer;
pub use session::{Notice, Session};
pub use tcp::TcpChannel;
