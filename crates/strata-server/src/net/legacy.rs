//! Legacy-family connection driver: Classic identification and the
//! beta/release handshake→login sequence, then the shared play loop.
//!
//! The channel starts on a provisional dialect chosen from the sniffed
//! first byte (Classic's identification and the beta keep-alive share
//! id `0x00`) and is re-keyed the moment a login packet names the real
//! one. The login packets themselves self-describe, so decoding with
//! the provisional dialect is safe.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info};

use strata_proto::packets::{
    ClassicIdentReply, ClassicIdentRequest, Disconnect, LegacyHandshakeReply, LegacyLoginReply,
    LegacyLoginRequest,
};
use strata_proto::version::is_supported;
use strata_proto::{wire_entity_id, Packet, ProtocolVersion};

use super::framer::LegacyChannel;
use super::{play_loop, ConnectionError, PacketChannel, SEND_QUEUE_DEPTH};
use crate::mapping::EraBlockMapper;
use crate::session::{self, Session};
use crate::state::ServerState;
use crate::translator::Translator;

/// Protocol byte Classic clients carry in their identification.
const CLASSIC_PROTOCOL: u8 = 7;

/// A login sequence that passed every client-driven check. The player
/// is allocated afterwards, outside the login timer.
enum Pending {
    Classic(String),
    Beta(String, ProtocolVersion),
}

/// Drive one legacy connection from its sniffed bytes to disconnect.
pub async fn run<S>(
    stream: S,
    seed: BytesMut,
    state: Arc<ServerState>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let provisional = if seed.first() == Some(&0x00) {
        ProtocolVersion::CLASSIC
    } else {
        ProtocolVersion::LEGACY_7
    };
    let mut channel = LegacyChannel::new(stream, seed, Arc::clone(&state.registry), provisional);

    // The timer covers only the part the client controls; once the
    // terminal login packet is in, the rest is our own writes.
    let window = Duration::from_secs(state.config.server.login_timeout_secs);
    let pending = match timeout(window, negotiate(&mut channel, &state)).await {
        Ok(pending) => pending?,
        Err(_) => {
            let _ = kick(&mut channel, "Login timed out").await;
            return Err(ConnectionError::LoginTimeout);
        }
    };
    let Some(pending) = pending else {
        return Ok(());
    };

    let (username, version) = match &pending {
        Pending::Classic(name) => (name.as_str(), ProtocolVersion::CLASSIC),
        Pending::Beta(name, version) => (name.as_str(), *version),
    };
    let (pos, look) = session::resolve_spawn(&state, username);
    let (tx, mut direct) = mpsc::channel(SEND_QUEUE_DEPTH);
    let handle = match state.players.register(username, version, tx, pos, look) {
        Ok(handle) => handle,
        Err(e) => {
            kick(&mut channel, &e.to_string()).await?;
            return Ok(());
        }
    };
    let reply: Packet = match pending {
        Pending::Classic(_) => ClassicIdentReply {
            protocol: CLASSIC_PROTOCOL,
            server_name: state.config.server.motd.clone(),
            motd: "Welcome!".into(),
            user_type: 0,
        }
        .into(),
        Pending::Beta(..) => LegacyLoginReply {
            entity_id: wire_entity_id(handle.id),
            seed: state.world.seed(),
            level_type: "default".into(),
            gamemode: 1,
            dimension: 0,
            difficulty: 1,
            world_height: 128,
            max_players: state.config.server.max_players.min(255) as u8,
        }
        .into(),
    };
    // Registered but not yet announced; a dead socket here only needs
    // the slot freed again.
    if let Err(e) = channel.write_packet(&reply).await {
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
        Ok(()) => play_loop(&mut channel, &mut session, &translator, &mut direct, &mut bus).await,
        Err(e) => Err(e.into()),
    };
    session.teardown();
    result
}

/// Read login packets until the sequence completes or fails. `None`
/// means the client was already turned away with a kick (or just left).
async fn negotiate<S>(
    channel: &mut LegacyChannel<S>,
    state: &Arc<ServerState>,
) -> Result<Option<Pending>, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let Some(packet) = channel.read_packet().await? else {
            return Ok(None);
        };
        match packet {
            Packet::ClassicIdentRequest(ident) => {
                if ident.protocol != CLASSIC_PROTOCOL {
                    kick(channel, "Unsupported Classic protocol").await?;
                    return Ok(None);
                }
                if !session::validate_username(&ident.username) {
                    kick(channel, "Invalid username").await?;
                    return Ok(None);
                }
                return Ok(Some(Pending::Classic(ident.username)));
            }
            Packet::LegacyHandshakeRequest(hs) => {
                debug!(username = %hs.username, protocol = hs.protocol, "legacy handshake");
                // Connection hash; `-` declines name authentication.
                let reply = LegacyHandshakeReply { hash: "-".into() };
                channel.write_packet(&reply.into()).await?;
            }
            Packet::LegacyLoginRequest(request) => {
                let version = ProtocolVersion::legacy(request.version);
                if version.is_classic() || !is_supported(version) {
                    kick(
                        channel,
                        &format!("Unsupported protocol version {}", request.version),
                    )
                    .await?;
                    return Ok(None);
                }
                channel.set_version(version);
                if !session::validate_username(&request.username) {
                    kick(channel, "Invalid username").await?;
                    return Ok(None);
                }
                return Ok(Some(Pending::Beta(request.username, version)));
            }
            other => {
                debug!(kind = ?other.kind(), "ignoring pre-login packet");
            }
        }
    }
}

async fn kick<S>(channel: &mut LegacyChannel<S>, reason: &str) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!(reason, "rejecting legacy login");
    let packet = Disconnect {
        reason: reason.into(),
    };
    channel.write_packet(&packet.into()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::{Buf, BufMut, Bytes};
    use strata_proto::packets::{Chat, LegacyHandshakeRequest};
    use strata_proto::{Direction, PacketKind, PacketRegistry, ProtoError};
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    use crate::config::ServerConfig;
    use crate::state::testing::{self, TestState};

    fn small_state() -> TestState {
        let mut config = ServerConfig::default();
        config.server.view_radius = 1;
        testing::state_with_config(config)
    }

    /// Client half: raw stream plus a clientbound decode loop.
    struct TestClient {
        stream: DuplexStream,
        buf: BytesMut,
        registry: Arc<PacketRegistry>,
        version: ProtocolVersion,
    }

    impl TestClient {
        fn new(stream: DuplexStream, version: ProtocolVersion) -> Self {
            Self {
                stream,
                buf: BytesMut::new(),
                registry: Arc::new(PacketRegistry::build()),
                version,
            }
        }

        async fn send(&mut self, bytes: &[u8]) {
            self.stream.write_all(bytes).await.unwrap();
        }

        async fn recv(&mut self) -> Packet {
            loop {
                if !self.buf.is_empty() {
                    let id = self.buf[0];
                    let decode = self
                        .registry
                        .decode_legacy(self.version, Direction::Clientbound, id)
                        .unwrap_or_else(|| panic!("no clientbound decoder for {id:#04x}"));
                    let mut body = Bytes::copy_from_slice(&self.buf[1..]);
                    let before = body.remaining();
                    match decode(&mut body, self.version) {
                        Ok(decoded) => {
                            let consumed = before - body.remaining();
                            self.buf.advance(1 + consumed);
                            match decoded {
                                Some(packet) => return packet,
                                None => continue,
                            }
                        }
                        Err(ProtoError::BufferTooShort { .. }) => {}
                        Err(e) => panic!("client decode: {e}"),
                    }
                }
                if self.stream.read_buf(&mut self.buf).await.unwrap() == 0 {
                    panic!("server closed while a packet was expected");
                }
            }
        }

        /// Skip forward to the next packet of `kind`, counting how many
        /// of `counted` went by.
        async fn recv_until(&mut self, kind: PacketKind, counted: PacketKind) -> (Packet, usize) {
            let mut seen = 0;
            loop {
                let packet = self.recv().await;
                if packet.kind() == kind {
                    return (packet, seen);
                }
                if packet.kind() == counted {
                    seen += 1;
                }
            }
        }
    }

    fn spawn_run(
        server: DuplexStream,
        seed: &[u8],
        state: &TestState,
    ) -> JoinHandle<Result<(), ConnectionError>> {
        let state = Arc::clone(&state.state);
        let seed = BytesMut::from(seed);
        tokio::spawn(run(server, seed, state))
    }

    fn classic_ident_bytes(username: &str) -> BytesMut {
        let mut out = BytesMut::new();
        out.put_u8(0x00);
        ClassicIdentRequest {
            protocol: CLASSIC_PROTOCOL,
            username: username.into(),
            verify_key: String::new(),
        }
        .write(&mut out, ProtocolVersion::CLASSIC)
        .unwrap();
        out
    }

    fn handshake_bytes(username: &str) -> BytesMut {
        let mut out = BytesMut::new();
        out.put_u8(0x02);
        LegacyHandshakeRequest {
            protocol: -1,
            username: username.into(),
            host: String::new(),
            port: 0,
        }
        .write(&mut out, ProtocolVersion::LEGACY_7)
        .unwrap();
        out
    }

    fn login_bytes(version: i32, username: &str) -> BytesMut {
        let mut out = BytesMut::new();
        out.put_u8(0x01);
        LegacyLoginRequest {
            version,
            username: username.into(),
        }
        .write(&mut out, ProtocolVersion::LEGACY_7)
        .unwrap();
        out
    }

    #[tokio::test]
    async fn classic_login_reaches_play() {
        let test = small_state();
        let (server, client) = duplex(1 << 20);
        let task = spawn_run(server, &classic_ident_bytes("alice"), &test);
        let mut client = TestClient::new(client, ProtocolVersion::CLASSIC);

        match client.recv().await {
            Packet::ClassicIdentReply(reply) => {
                assert_eq!(reply.protocol, CLASSIC_PROTOCOL);
                assert_eq!(reply.user_type, 0);
            }
            other => panic!("expected ident reply, got {other:?}"),
        }
        assert_eq!(client.recv().await.kind(), PacketKind::ClassicLevelInit);
        let (_, pieces) = client
            .recv_until(PacketKind::ClassicLevelFinalize, PacketKind::ClassicLevelChunk)
            .await;
        assert!(pieces > 0, "level transfer sent no data pieces");
        // Classic's clientbound 0x08 decodes as the teleport shape.
        client
            .recv_until(PacketKind::EntityTeleport, PacketKind::ClassicLevelChunk)
            .await;
        match client.recv().await {
            Packet::Chat(Chat { message }) => {
                assert_eq!(message, "alice joined the game");
            }
            other => panic!("expected join chat, got {other:?}"),
        }
        assert_eq!(test.state.players.count(), 1);

        // Client walks away; the driver tears the player down.
        drop(client);
        task.await.unwrap().unwrap();
        assert_eq!(test.state.players.count(), 0);
    }

    #[tokio::test]
    async fn beta_handshake_then_login_reaches_play() {
        let test = small_state();
        let (server, client) = duplex(1 << 20);
        let task = spawn_run(server, &handshake_bytes("bob"), &test);
        let mut client = TestClient::new(client, ProtocolVersion::legacy(14));

        match client.recv().await {
            Packet::LegacyHandshakeReply(reply) => assert_eq!(reply.hash, "-"),
            other => panic!("expected handshake reply, got {other:?}"),
        }
        client.send(&login_bytes(14, "bob")).await;
        match client.recv().await {
            Packet::LegacyLoginReply(reply) => {
                assert_eq!(reply.entity_id, wire_entity_id(0));
            }
            other => panic!("expected login reply, got {other:?}"),
        }
        assert_eq!(client.recv().await.kind(), PacketKind::SpawnPosition);
        // radius 1 box: 9 columns, each announced then sent.
        let (_, columns) = client
            .recv_until(PacketKind::PositionLook, PacketKind::ChunkData)
            .await;
        assert_eq!(columns, 9);
        let (chat, _) = client.recv_until(PacketKind::Chat, PacketKind::ChunkData).await;
        match chat {
            Packet::Chat(Chat { message }) => assert_eq!(message, "bob joined the game"),
            other => panic!("expected join chat, got {other:?}"),
        }
        assert_eq!(test.state.players.count(), 1);

        drop(client);
        task.await.unwrap().unwrap();
        assert_eq!(test.state.players.count(), 0);
    }

    #[tokio::test]
    async fn unsupported_version_is_kicked() {
        let test = small_state();
        let (server, client) = duplex(1 << 16);
        let mut bytes = handshake_bytes("carol");
        bytes.extend_from_slice(&login_bytes(99, "carol"));
        let task = spawn_run(server, &bytes, &test);
        let mut client = TestClient::new(client, ProtocolVersion::legacy(14));

        assert_eq!(client.recv().await.kind(), PacketKind::LegacyHandshakeReply);
        match client.recv().await {
            Packet::Disconnect(kick) => {
                assert!(kick.reason.contains("99"), "reason: {}", kick.reason);
            }
            other => panic!("expected kick, got {other:?}"),
        }
        task.await.unwrap().unwrap();
        assert_eq!(test.state.players.count(), 0);
    }

    #[tokio::test]
    async fn duplicate_name_is_kicked() {
        let test = small_state();
        let (tx, _rx) = mpsc::channel(8);
        test.state
            .players
            .register(
                "alice",
                ProtocolVersion::NATIVE,
                tx,
                strata_proto::Position::new(8.5, 65.0, 8.5),
                strata_proto::Look::default(),
            )
            .unwrap();

        let (server, client) = duplex(1 << 16);
        let task = spawn_run(server, &classic_ident_bytes("ALICE"), &test);
        let mut client = TestClient::new(client, ProtocolVersion::CLASSIC);
        match client.recv().await {
            Packet::Disconnect(kick) => {
                assert!(
                    kick.reason.contains("already online"),
                    "reason: {}",
                    kick.reason
                );
            }
            other => panic!("expected kick, got {other:?}"),
        }
        task.await.unwrap().unwrap();
        assert_eq!(test.state.players.count(), 1);
    }

    #[tokio::test]
    async fn invalid_username_is_kicked() {
        let test = small_state();
        let (server, client) = duplex(1 << 16);
        let task = spawn_run(server, &classic_ident_bytes("no spaces here"), &test);
        let mut client = TestClient::new(client, ProtocolVersion::CLASSIC);
        match client.recv().await {
            Packet::Disconnect(kick) => assert!(kick.reason.contains("username")),
            other => panic!("expected kick, got {other:?}"),
        }
        task.await.unwrap().unwrap();
        assert_eq!(test.state.players.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_login_times_out_with_a_kick() {
        let test = small_state();
        let (server, client) = duplex(1 << 16);
        // Handshake arrives, the login request never does.
        let task = spawn_run(server, &handshake_bytes("dave"), &test);
        let mut client = TestClient::new(client, ProtocolVersion::legacy(14));

        assert_eq!(client.recv().await.kind(), PacketKind::LegacyHandshakeReply);
        match client.recv().await {
            Packet::Disconnect(kick) => assert!(kick.reason.contains("timed out")),
            other => panic!("expected kick, got {other:?}"),
        }
        assert!(matches!(
            task.await.unwrap(),
            Err(ConnectionError::LoginTimeout)
        ));
        assert_eq!(test.state.players.count(), 0);
    }
}
