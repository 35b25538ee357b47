//! UDP-over-stream framing
//!
//! Each datagram travels on the tunnel stream as
//!
//! ```text
//! +----------+-----------------+
//! |   LEN    |     PAYLOAD     |
//! +----------+-----------------+
//! | 2 (u16be)|   LEN bytes     |
//! +----------+-----------------+
//! ```

use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Length prefix size in bytes
pub const FRAME_HEADER_LEN: usize = 2;

/// Largest payload a frame can declare
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Read one frame into `buf`, returning the payload length.
///
/// `buf` must hold at least [`MAX_FRAME_LEN`] bytes to accept any frame.
/// End of stream anywhere inside a frame surfaces as
/// [`io::ErrorKind::UnexpectedEof`].
pub async fn read_frame<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u16().await? as usize;
    if len > buf.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame of {} bytes exceeds buffer of {}", len, buf.len()),
        ));
    }
    reader.read_exact(&mut buf[..len]).await?;
    Ok(len)
}

/// Write the length prefix for a payload of `len` bytes into `header`.
pub fn put_header(header: &mut [u8], len: usize) -> io::Result<()> {
    if header.len() < FRAME_HEADER_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame header needs {} bytes", FRAME_HEADER_LEN),
        ));
    }
    let len = u16::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("datagram of {} bytes does not fit a frame", len),
        )
    })?;
    header[..FRAME_HEADER_LEN].copy_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Encode a complete frame
pub fn encode_frame(payload: &[u8]) -> io::Result<BytesMut> {
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.put_bytes(0, FRAME_HEADER_LEN);
    put_header(&mut frame, payload.len())?;
    frame.put_slice(payload);
    Ok(frame)
}
