//! First-contact protocol detection.
//!
//! Nothing identifies a fresh connection until its first byte arrives:
//! `0x00` opens a Classic identification, `0x01`/`0x02` a beta or
//! release login, `0xFE` is the out-of-band server-list ping, and
//! anything else is the length prefix of a framed handshake (which is
//! never that small for a real handshake frame). Runs once per socket;
//! bytes consumed while deciding are handed onward as the chosen
//! channel's initial buffer, so none are lost or replayed.

use std::time::Duration;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::debug;

use strata_proto::codec::put_string16;
use strata_proto::ProtocolVersion;

use super::ConnectionError;
use crate::state::ServerState;

/// Wait this long for the payload byte newer pings append to `0xFE`
/// before treating it as the bare older form.
const PING_PAYLOAD_WINDOW: Duration = Duration::from_millis(200);

pub enum Verdict {
    /// Unframed family; the buffer holds the bytes read while deciding.
    Legacy(BytesMut),
    /// Framed family; same hand-off rule.
    Framed(BytesMut),
    /// Server-list ping answered in place, or the peer never sent a
    /// byte. The socket is spent either way.
    Handled,
}

pub async fn detect<S>(stream: &mut S, state: &ServerState) -> Result<Verdict, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(256);
    if stream.read_buf(&mut buf).await? == 0 {
        return Ok(Verdict::Handled);
    }
    match buf[0] {
        0xFE => {
            let newer = newer_ping(stream, &mut buf).await?;
            let reply = ping_reply(state, newer);
            // Composed raw as one legacy kick: 0xFF + string16. No
            // codec ever gets installed for a ping.
            let mut out = BytesMut::with_capacity(reply.len() * 2 + 3);
            out.put_u8(0xFF);
            put_string16(&mut out, &reply);
            stream.write_all(&out).await?;
            debug!(newer, "answered server-list ping");
            Ok(Verdict::Handled)
        }
        0x00 | 0x01 | 0x02 => Ok(Verdict::Legacy(buf)),
        _ => Ok(Verdict::Framed(buf)),
    }
}

/// Pings from release 1.4 on append `0x01`; older clients send the bare
/// `0xFE` and wait, so absence of a second byte is decided by timeout.
async fn newer_ping<S: AsyncRead + Unpin>(
    stream: &mut S,
    buf: &mut BytesMut,
) -> std::io::Result<bool> {
    if buf.len() < 2 {
        match timeout(PING_PAYLOAD_WINDOW, stream.read_buf(buf)).await {
            Ok(read) => {
                read?;
            }
            Err(_) => return Ok(false),
        }
    }
    Ok(buf.len() >= 2 && buf[1] == 0x01)
}

fn ping_reply(state: &ServerState, newer: bool) -> String {
    let online = state.players.count();
    let max = state.config.server.max_players;
    let motd = &state.config.server.motd;
    if newer {
        let native = ProtocolVersion::NATIVE;
        format!(
            "§1\0{}\0{}\0{}\0{}\0{}",
            native.number,
            native.display_name(),
            motd,
            online,
            max
        )
    } else {
        format!("{motd}§{online}§{max}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_proto::codec::get_string16;
    use tokio::io::duplex;

    use crate::state::testing;

    async fn reply_string(mut stream: tokio::io::DuplexStream) -> String {
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        assert_eq!(raw[0], 0xFF);
        let mut body = &raw[1..];
        let s = get_string16(&mut body).unwrap();
        assert!(body.is_empty());
        s
    }

    #[tokio::test]
    async fn classic_ident_byte_selects_legacy() {
        let test = testing::state();
        let (mut near, mut far) = duplex(256);
        far.write_all(&[0x00, 0x07, 0x00]).await.unwrap();
        match detect(&mut near, &test.state).await.unwrap() {
            Verdict::Legacy(seed) => assert_eq!(&seed[..], &[0x00, 0x07, 0x00]),
            _ => panic!("expected legacy verdict"),
        }
    }

    #[tokio::test]
    async fn handshake_length_prefix_selects_framed() {
        let test = testing::state();
        let (mut near, mut far) = duplex(256);
        far.write_all(&[0x10, 0x00, 0x2F]).await.unwrap();
        match detect(&mut near, &test.state).await.unwrap() {
            Verdict::Framed(seed) => assert_eq!(&seed[..], &[0x10, 0x00, 0x2F]),
            _ => panic!("expected framed verdict"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn bare_ping_gets_the_older_reply() {
        let test = testing::state();
        let (mut near, mut far) = duplex(256);
        far.write_all(&[0xFE]).await.unwrap();
        match detect(&mut near, &test.state).await.unwrap() {
            Verdict::Handled => {}
            _ => panic!("expected handled verdict"),
        }
        drop(near);
        let reply = reply_string(far).await;
        let fields: Vec<&str> = reply.split('§').collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], "A strata server");
        assert_eq!(fields[1], "0");
        assert_eq!(fields[2], "20");
    }

    #[tokio::test]
    async fn tagged_ping_gets_the_field_reply() {
        let test = testing::state();
        let (mut near, mut far) = duplex(256);
        far.write_all(&[0xFE, 0x01]).await.unwrap();
        match detect(&mut near, &test.state).await.unwrap() {
            Verdict::Handled => {}
            _ => panic!("expected handled verdict"),
        }
        drop(near);
        let reply = reply_string(far).await;
        let fields: Vec<&str> = reply.split('\0').collect();
        assert_eq!(fields[0], "§1");
        assert_eq!(fields[1], "47");
        assert_eq!(fields[2], "1.8.8");
        assert_eq!(fields[3], "A strata server");
        assert_eq!(fields[4], "0");
        assert_eq!(fields[5], "20");
    }

    #[tokio::test]
    async fn silent_connection_is_handled() {
        let test = testing::state();
        let (mut near, far) = duplex(256);
        drop(far);
        assert!(matches!(
            detect(&mut near, &test.state).await.unwrap(),
            Verdict::Handled
        ));
    }
}
