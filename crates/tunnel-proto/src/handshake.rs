//! Fixed-length, non-length-prefixed byte exchange that precedes forwarding
//! on every tunnel stream (component C2).

use snafu::ResultExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{HandshakeError, IoSnafu};

pub const TOKEN_LEN: usize = 512;
pub const ACK_LEN: usize = 1;

pub const HANDSHAKE_SUCCESS: u8 = 0x01;
pub const PARSE_TOKEN_ERROR: u8 = 0x02;
pub const CANNOT_CONN_SERVER: u8 = 0x03;

/// Exclusively owned by one tunnel for the duration of its handshake; never
/// reused, never reallocated after construction.
pub struct Handshake {
    send_len: usize,
    send_buf: Vec<u8>,
    recv_buf: Vec<u8>,
}

impl Handshake {
    /// `send_len` / `recv_len` are the role constants: a client endpoint
    /// sends `TOKEN_LEN` bytes and receives `ACK_LEN`; a server endpoint
    /// receives `TOKEN_LEN` and sends `ACK_LEN`.
    pub fn new(send_len: usize, recv_len: usize) -> Self {
        Self {
            send_len,
            send_buf: vec![0u8; send_len],
            recv_buf: vec![0u8; recv_len],
        }
    }

    /// Copies up to `send_len` bytes of `data` into the fixed send buffer.
    /// The buffer is re-zeroed first, so any bytes beyond `data`'s length
    /// stay NUL; bytes beyond `send_len` are silently truncated. The buffer
    /// itself never grows or shrinks.
    pub fn set_send(&mut self, data: &[u8]) {
        self.send_buf.fill(0);
        let n = data.len().min(self.send_len);
        self.send_buf[..n].copy_from_slice(&data[..n]);
    }

    /// Writes the fixed send buffer exactly once.
    pub async fn write_frame<W: AsyncWrite + Unpin>(&self, w: &mut W) -> Result<(), HandshakeError> {
        w.write_all(&self.send_buf).await.context(IoSnafu)
    }

    /// Reads exactly the fixed receive-buffer length.
    pub async fn read_frame<R: AsyncRead + Unpin>(&mut self, r: &mut R) -> Result<(), HandshakeError> {
        r.read_exact(&mut self.recv_buf).await.context(IoSnafu)?;
        Ok(())
    }

    /// The received frame as a logical string: NUL bytes (right-padding)
    /// stripped from anywhere in the buffer, not just the tail.
    pub fn received_str(&self) -> String {
        let stripped: Vec<u8> = self.recv_buf.iter().copied().filter(|&b| b != 0).collect();
        String::from_utf8_lossy(&stripped).into_owned()
    }

    /// The received frame's first byte, for the 1-byte ack case.
    pub fn received_byte(&self) -> u8 {
        self.recv_buf[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_token_longer_than_buffer() {
        let mut hs = Handshake::new(TOKEN_LEN, ACK_LEN);
        let long = vec![b'x'; TOKEN_LEN + 1];
        hs.set_send(&long);
        assert_eq!(hs.send_buf.len(), TOKEN_LEN);
        assert!(hs.send_buf.iter().all(|&b| b == b'x'));
    }

    #[test]
    fn pads_short_token_with_nul() {
        let mut hs = Handshake::new(TOKEN_LEN, ACK_LEN);
        hs.set_send(b"tcp:127.0.0.1:9000");
        assert_eq!(hs.send_buf.len(), TOKEN_LEN);
        assert_eq!(&hs.send_buf[..18], b"tcp:127.0.0.1:9000");
        assert!(hs.send_buf[18..].iter().all(|&b| b == 0));
    }

    #[test]
    fn received_str_strips_nul() {
        let mut hs = Handshake::new(ACK_LEN, TOKEN_LEN);
        hs.recv_buf[..4].copy_from_slice(b"tcp:");
        hs.recv_buf[4] = 0;
        hs.recv_buf[5] = b'a';
        assert_eq!(hs.received_str(), "tcp:a");
    }

    #[tokio::test]
    async fn round_trips_over_a_duplex_pipe() {
        let (mut a, mut b) = tokio::io::duplex(TOKEN_LEN + ACK_LEN);
        let mut sender = Handshake::new(TOKEN_LEN, ACK_LEN);
        sender.set_send(b"tcp:127.0.0.1:9000");

        let send_fut = sender.write_frame(&mut a);
        let mut receiver = Handshake::new(ACK_LEN, TOKEN_LEN);
        let recv_fut = receiver.read_frame(&mut b);
        let (send_res, recv_res) = tokio::join!(send_fut, recv_fut);
        send_res.unwrap();
        recv_res.unwrap();

        assert_eq!(receiver.received_str(), "tcp:127.0.0.1:9000");
    }
}
