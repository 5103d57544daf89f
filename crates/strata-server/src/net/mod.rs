//! Connection plumbing.
//!
//! Every accepted socket runs the same gauntlet: [`detector`] sniffs the
//! first bytes and picks a wire family, [`legacy`] or [`framed`] drives
//! that family's login sequence, and both end up in [`play_loop`], which
//! pumps packets between the socket, the player's direct send queue and
//! the server-wide broadcast bus until the connection dies.

pub mod detector;
pub mod framed;
pub mod framer;
pub mod legacy;
pub mod listener;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use strata_crypto::CryptoError;
use strata_proto::{Packet, ProtoError, RegistryError};

use crate::events::Broadcast;
use crate::session::{Flow, Session, SessionError};
use crate::translator::Translator;

/// Depth of each connection's direct send queue. Only scheduled tasks
/// (replenishment top-ups) write here, so it stays near-empty.
pub const SEND_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("protocol: {0}")]
    Proto(#[from] ProtoError),
    #[error("no wire id: {0}")]
    Registry(#[from] RegistryError),
    #[error("crypto: {0}")]
    Crypto(#[from] CryptoError),
    #[error("session: {0}")]
    Session(#[from] SessionError),
    #[error("encryption verify token mismatch")]
    TokenMismatch,
    #[error("login timed out")]
    LoginTimeout,
}

/// One end of a connection, moving canonical packets in both directions.
///
/// Implemented per wire family by the channels in [`framer`]; the login
/// flows and the play loop only ever talk through this.
pub trait PacketChannel {
    /// Read the next packet. `Ok(None)` is a clean close; an EOF in the
    /// middle of a packet is an error.
    async fn read_packet(&mut self) -> Result<Option<Packet>, ConnectionError>;

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), ConnectionError>;
}

/// Run one connection's Play phase to completion.
///
/// Three sources feed the socket: the client's own packets (handled by
/// the session), direct sends queued on the player's channel, and the
/// broadcast bus filtered by source. Packets the session queued while
/// handling input are flushed before the next await so replies always
/// land ahead of later traffic.
pub async fn play_loop<C: PacketChannel>(
    channel: &mut C,
    session: &mut Session,
    translator: &Translator,
    direct: &mut mpsc::Receiver<Packet>,
    bus: &mut broadcast::Receiver<Broadcast>,
) -> Result<(), ConnectionError> {
    loop {
        for packet in session.take_outbox() {
            write_translated(channel, translator, &packet).await?;
        }
        tokio::select! {
            read = channel.read_packet() => {
                let Some(packet) = read? else { return Ok(()) };
                if let Flow::Closed = session.handle_packet(&packet) {
                    for packet in session.take_outbox() {
                        write_translated(channel, translator, &packet).await?;
                    }
                    return Ok(());
                }
            }
            queued = direct.recv() => {
                let Some(packet) = queued else { return Ok(()) };
                write_translated(channel, translator, &packet).await?;
            }
            event = bus.recv() => {
                match event {
                    Ok(b) => {
                        if b.source == Some(session.handle.id) {
                            continue;
                        }
                        write_translated(channel, translator, &b.packet).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            player = %session.handle.username,
                            skipped,
                            "connection fell behind the broadcast bus"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

async fn write_translated<C: PacketChannel>(
    channel: &mut C,
    translator: &Translator,
    packet: &Packet,
) -> Result<(), ConnectionError> {
    for wire in translator.translate(packet) {
        channel.write_packet(&wire).await?;
    }
    Ok(())
}
