//! MM relay: forwards mind-map events between clients in the same room.
//!
//! Usage: `mm-relay [ADDR]`. The address falls back to `MM_RELAY_ADDR`, then
//! to `127.0.0.1:7878`. `MM_RELAY_CODEC` selects `json` (default) or
//! `msgpack`; `MM_RELAY_TOKEN`, when set, is required from every client.

use mm_collab::{Credential, RelayServer, SessionConfig, WireCodec};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let addr = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MM_RELAY_ADDR").ok())
        .unwrap_or_else(|| SessionConfig::default().relay_addr);
    let codec = match std::env::var("MM_RELAY_CODEC") {
        Ok(name) => name.parse()?,
        Err(_) => WireCodec::default(),
    };
    let token = std::env::var("MM_RELAY_TOKEN").ok().map(Credential::new);

    let server = RelayServer::bind(&addr, codec, token).await?;
    log::info!("mm-relay listening on {} ({codec:?})", server.local_addr()?);
    server.serve().await?;
    Ok(())
}
