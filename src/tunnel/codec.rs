//! Length-prefixed framing for the tunnel stream
//!
//! ```text
//! +------------+-----------------+
//! | LEN (u32)  |     PAYLOAD     |
//! +------------+-----------------+
//! | big-endian | 1 to 65535 bytes|
//! +------------+-----------------+
//! ```
//!
//! A bad length cannot be skipped over without losing sync, so it ends the
//! stream.

use crate::error::FrameError;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Size of the length prefix
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest payload a frame may carry
pub const MAX_FRAME_LEN: usize = 65535;

fn check_payload_len(len: usize) -> Result<(), FrameError> {
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(FrameError::PayloadSize(len));
    }
    Ok(())
}

/// Encode one frame
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, FrameError> {
    check_payload_len(payload.len())?;

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

/// Write one frame and flush it
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame
///
/// Returns `Ok(None)` when the stream ends cleanly between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Bytes>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(FrameError::Truncated {
                expected: FRAME_HEADER_LEN,
                source: io::ErrorKind::UnexpectedEof.into(),
            });
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header);
    if len == 0 || len as usize > MAX_FRAME_LEN {
        return Err(FrameError::InvalidLength(len));
    }

    let len = len as usize;
    let mut payload = BytesMut::new();
    payload.resize(len, 0);
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FrameError::Truncated {
                expected: len,
                source: e,
            }
        } else {
            FrameError::Io(e)
        }
    })?;

    trace!("Read frame of {} bytes", len);
    Ok(Some(payload.freeze()))
}
