//! Framed-family driver: handshake, then either the status surface or
//! the encrypted login sequence and the shared play loop.
//!
//! Login runs the full encryption round trip on every attempt: fresh
//! RSA keypair, random verify token, PKCS#1 v1.5 unwrap of the client's
//! response, CFB8 ciphers installed before another packet moves. A
//! token that does not echo back byte for byte ends the connection with
//! no reply and no player.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

use strata_crypto::{verify_token, ServerKeyPair};
use strata_proto::packets::{
    EncryptionRequest, JoinGame, LoginDisconnect, LoginSuccess, StatusPong, StatusResponse,
};
use strata_proto::version::is_supported;
use strata_proto::{wire_entity_id, ConnectionState, Packet, ProtocolVersion};

use super::framer::FramedChannel;
use super::{play_loop, ConnectionError, PacketChannel, SEND_QUEUE_DEPTH};
use crate::mapping::EraBlockMapper;
use crate::players::PlayerHandle;
use crate::session::{self, Session};
use crate::state::ServerState;
use crate::translator::Translator;

/// Drive one framed connection from its sniffed bytes to disconnect.
pub async fn run<S>(
    stream: S,
    seed: BytesMut,
    state: Arc<ServerState>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut channel = FramedChannel::new(stream, seed, Arc::clone(&state.registry));
    let window = Duration::from_secs(state.config.server.login_timeout_secs);

    let handshake = match timeout(window, channel.read_packet()).await {
        Ok(read) => match read? {
            Some(Packet::Handshake(handshake)) => handshake,
            Some(other) => {
                debug!(kind = ?other.kind(), "expected a handshake");
                return Ok(());
            }
            None => return Ok(()),
        },
        Err(_) => return Err(ConnectionError::LoginTimeout),
    };
    channel.set_state(handshake.next);
    match handshake.next {
        ConnectionState::Status => {
            match timeout(window, status(&mut channel, &state, handshake.protocol)).await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::LoginTimeout),
            }
        }
        ConnectionState::Login => login(&mut channel, state, handshake.protocol, window).await,
        // `from_next_state` admits nothing else.
        _ => Ok(()),
    }
}

async fn status<S>(
    channel: &mut FramedChannel<S>,
    state: &ServerState,
    protocol: i32,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let Some(packet) = channel.read_packet().await? else {
            return Ok(());
        };
        match packet {
            Packet::StatusRequest(_) => {
                let response = StatusResponse {
                    json: status_json(state, protocol),
                };
                channel.write_packet(&response.into()).await?;
            }
            Packet::StatusPing(ping) => {
                let pong = StatusPong {
                    payload: ping.payload,
                };
                channel.write_packet(&pong.into()).await?;
                return Ok(());
            }
            other => {
                debug!(kind = ?other.kind(), "unexpected status packet");
            }
        }
    }
}

/// A supported requester sees its own dialect echoed back (its ping
/// then reads as compatible); anything else sees the native one.
fn status_json(state: &ServerState, protocol: i32) -> String {
    let requested = ProtocolVersion::framed(protocol);
    let version = if is_supported(requested) {
        requested
    } else {
        ProtocolVersion::NATIVE
    };
    serde_json::json!({
        "version": { "name": version.display_name(), "protocol": version.number },
        "players": { "max": state.config.server.max_players, "online": state.players.count() },
        "description": { "text": state.config.server.motd },
    })
    .to_string()
}

async fn login<S>(
    channel: &mut FramedChannel<S>,
    state: Arc<ServerState>,
    protocol: i32,
    window: Duration,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // The timer covers only the part the client controls; once the
    // encryption response verifies, the rest is our own writes.
    let username = match timeout(window, authenticate(channel, protocol)).await {
        Ok(outcome) => outcome?,
        Err(_) => {
            let _ = kick(channel, "Login timed out".into()).await;
            return Err(ConnectionError::LoginTimeout);
        }
    };
    let Some(username) = username else {
        return Ok(());
    };

    let version = ProtocolVersion::framed(protocol);
    let (pos, look) = session::resolve_spawn(&state, &username);
    let (tx, mut direct) = mpsc::channel(SEND_QUEUE_DEPTH);
    let handle = match state.players.register(&username, version, tx, pos, look) {
        Ok(handle) => handle,
        Err(e) => {
            kick(channel, e.to_string()).await?;
            return Ok(());
        }
    };
    // Registered but not yet announced; a dead socket here only needs
    // the slot freed again.
    if let Err(e) = introduce(channel, &state, &handle).await {
        state.players.remove(handle.id);
        return Err(e);
    }
    info!(player = %handle.username, id = handle.id, %version, "login accepted");

    // Subscribe before announcing the join so this connection's own
    // source-less broadcasts (tab entry, join line) come back to it.
    let mut bus = state.bus.subscribe();
    let translator = Translator::new(version, Arc::new(EraBlockMapper::for_version(version)));
    let mut session = Session::new(Arc::clone(&state), handle);
    let result = match session.run_join() {
        Ok(()) => play_loop(channel, &mut session, &translator, &mut direct, &mut bus).await,
        Err(e) => Err(e.into()),
    };
    session.teardown();
    result
}

/// Client-driven half of the login: version check, start packet, the
/// encryption round trip. Ends with the ciphers installed. `None`
/// means the client was already turned away.
async fn authenticate<S>(
    channel: &mut FramedChannel<S>,
    protocol: i32,
) -> Result<Option<String>, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = ProtocolVersion::framed(protocol);
    if !is_supported(version) {
        kick(channel, format!("Unsupported protocol version {protocol}")).await?;
        return Ok(None);
    }
    channel.set_version(version);

    let Some(packet) = channel.read_packet().await? else {
        return Ok(None);
    };
    let Packet::LoginStart(start) = packet else {
        debug!(kind = ?packet.kind(), "expected login start");
        return Ok(None);
    };
    if !session::validate_username(&start.username) {
        kick(channel, "Invalid username".into()).await?;
        return Ok(None);
    }

    let keys = ServerKeyPair::generate()?;
    let token = verify_token();
    let request = EncryptionRequest {
        server_id: String::new(),
        public_key: keys.public_key_der().to_vec(),
        verify_token: token.to_vec(),
    };
    channel.write_packet(&request.into()).await?;

    let Some(packet) = channel.read_packet().await? else {
        return Ok(None);
    };
    let Packet::EncryptionResponse(response) = packet else {
        debug!(kind = ?packet.kind(), "expected encryption response");
        return Ok(None);
    };
    let secret = keys.decrypt(&response.shared_secret)?;
    let echoed = keys.decrypt(&response.verify_token)?;
    if echoed != token {
        // Fatal by contract: no reply, no retry, no player.
        return Err(ConnectionError::TokenMismatch);
    }
    channel.enable_encryption(&secret)?;
    Ok(Some(start.username))
}

/// Login acceptance: success packet, flip to Play, the join header.
async fn introduce<S>(
    channel: &mut FramedChannel<S>,
    state: &ServerState,
    handle: &Arc<PlayerHandle>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let success = LoginSuccess {
        uuid: handle.uuid,
        username: handle.username.clone(),
    };
    channel.write_packet(&success.into()).await?;
    channel.set_state(ConnectionState::Play);
    let join = JoinGame {
        entity_id: wire_entity_id(handle.id),
        gamemode: 1,
        dimension: 0,
        difficulty: 1,
        max_players: state.config.server.max_players.min(255) as u8,
        level_type: "default".into(),
    };
    channel.write_packet(&join.into()).await?;
    Ok(())
}

async fn kick<S>(channel: &mut FramedChannel<S>, reason: String) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!(%reason, "rejecting framed login");
    channel.write_packet(&LoginDisconnect { reason }.into()).await
}
