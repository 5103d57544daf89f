//! Wire channels, one per protocol family.
//!
//! [`LegacyChannel`] moves unframed packets: a one-byte id, then a body
//! whose length only the per-version codec knows, so decoding works on a
//! copy and commits bytes only once a whole packet parsed.
//! [`FramedChannel`] moves VarInt-length-prefixed frames and carries the
//! CFB8 cipher pair once login encryption lands. Both accumulate reads
//! in a persistent buffer, which keeps `read_packet` safe to drop from a
//! `select!` arm mid-read.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use strata_crypto::{CryptoError, StreamCipherPair};
use strata_proto::codec::{get_varint, put_varint};
use strata_proto::{
    ConnectionState, Direction, Packet, PacketRegistry, ProtoError, ProtocolVersion,
};

use super::{ConnectionError, PacketChannel};

/// Upper bound on one framed packet. The reference client never exceeds
/// this; anything larger is an attack or a desync.
pub const MAX_FRAME: usize = 2 * 1024 * 1024;

fn eof_mid_packet() -> ConnectionError {
    std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed mid-packet",
    )
    .into()
}

/// Channel for the Classic and beta/release dialects.
pub struct LegacyChannel<S> {
    stream: S,
    buf: BytesMut,
    registry: Arc<PacketRegistry>,
    version: ProtocolVersion,
}

impl<S: AsyncRead + AsyncWrite + Unpin> LegacyChannel<S> {
    /// `seed` holds whatever the detector already read off the socket.
    pub fn new(
        stream: S,
        seed: BytesMut,
        registry: Arc<PacketRegistry>,
        version: ProtocolVersion,
    ) -> Self {
        Self {
            stream,
            buf: seed,
            registry,
            version,
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Switch dialects once the login packets reveal the real one.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PacketChannel for LegacyChannel<S> {
    async fn read_packet(&mut self) -> Result<Option<Packet>, ConnectionError> {
        loop {
            if !self.buf.is_empty() {
                let id = self.buf[0];
                let Some(decode) =
                    self.registry
                        .decode_legacy(self.version, Direction::Serverbound, id)
                else {
                    return Err(ProtoError::UnknownPacketId {
                        id: id as i32,
                        version: self.version,
                    }
                    .into());
                };
                // Decode from a copy; an incomplete body must leave the
                // real buffer untouched for the retry.
                let mut body = Bytes::copy_from_slice(&self.buf[1..]);
                let before = body.remaining();
                match decode(&mut body, self.version) {
                    Ok(decoded) => {
                        let consumed = before - body.remaining();
                        self.buf.advance(1 + consumed);
                        match decoded {
                            Some(packet) => return Ok(Some(packet)),
                            // Consumed-and-dropped entry; keep reading.
                            None => continue,
                        }
                    }
                    Err(ProtoError::BufferTooShort { .. }) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(eof_mid_packet())
                };
            }
        }
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), ConnectionError> {
        let id = self
            .registry
            .legacy_id(self.version, Direction::Clientbound, packet.kind())?;
        let mut frame = BytesMut::with_capacity(64);
        frame.put_u8(id);
        packet.write(&mut frame, self.version)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }
}

/// Channel for the framed (VarInt length prefix) family.
pub struct FramedChannel<S> {
    stream: S,
    buf: BytesMut,
    registry: Arc<PacketRegistry>,
    version: ProtocolVersion,
    state: ConnectionState,
    cipher: Option<StreamCipherPair>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedChannel<S> {
    pub fn new(stream: S, seed: BytesMut, registry: Arc<PacketRegistry>) -> Self {
        Self {
            stream,
            buf: seed,
            registry,
            version: ProtocolVersion::NATIVE,
            state: ConnectionState::Handshaking,
            cipher: None,
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
    }

    /// Install the stream ciphers. Everything the client sent after its
    /// encryption response is already ciphertext, including bytes we
    /// have buffered but not yet parsed, so decrypt those now.
    pub fn enable_encryption(&mut self, secret: &[u8]) -> Result<(), CryptoError> {
        let mut cipher = StreamCipherPair::from_secret(secret)?;
        cipher.decrypt_in_place(&mut self.buf[..]);
        self.cipher = Some(cipher);
        Ok(())
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> PacketChannel for FramedChannel<S> {
    async fn read_packet(&mut self) -> Result<Option<Packet>, ConnectionError> {
        loop {
            // Parse the length prefix off a peek slice so a partial
            // header stays in the buffer.
            let mut peek: &[u8] = &self.buf;
            match get_varint(&mut peek) {
                Ok(length) => {
                    if length < 0 || length as usize > MAX_FRAME {
                        return Err(
                            ProtoError::FrameTooLarge(length.unsigned_abs() as usize).into()
                        );
                    }
                    let length = length as usize;
                    let header = self.buf.len() - peek.len();
                    if self.buf.len() - header >= length {
                        self.buf.advance(header);
                        let mut frame = self.buf.split_to(length).freeze();
                        let id = get_varint(&mut frame)?;
                        let Some(decode) =
                            self.registry
                                .decode_framed(self.state, Direction::Serverbound, id)
                        else {
                            // Clients send plenty of play traffic we do
                            // not model; drop the frame and move on.
                            debug!(state = ?self.state, id, "skipping unmodeled frame");
                            continue;
                        };
                        match decode(&mut frame, self.version)? {
                            Some(packet) => return Ok(Some(packet)),
                            None => continue,
                        }
                    }
                }
                Err(ProtoError::BufferTooShort { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            let start = self.buf.len();
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(eof_mid_packet())
                };
            }
            if let Some(cipher) = &mut self.cipher {
                cipher.decrypt_in_place(&mut self.buf[start..]);
            }
        }
    }

    async fn write_packet(&mut self, packet: &Packet) -> Result<(), ConnectionError> {
        let id = self
            .registry
            .framed_id(self.state, Direction::Clientbound, packet.kind())?;
        let mut body = BytesMut::with_capacity(64);
        put_varint(&mut body, id);
        packet.write(&mut body, self.version)?;
        let mut frame = BytesMut::with_capacity(body.len() + 5);
        put_varint(&mut frame, body.len() as i32);
        frame.extend_from_slice(&body);
        if let Some(cipher) = &mut self.cipher {
            cipher.encrypt_in_place(&mut frame[..]);
        }
        self.stream.write_all(&frame).await?;
        Ok(())
    }
}
