#[cfg(feature = "quic")]
pub mod quinn {
    use std::{
        io,
        pin::Pin,
        task::{Context, Poll},
    };

    use quinn::{RecvStream, SendStream};
    use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

    /// Glues a QUIC bidirectional stream's independent send/recv halves
    /// into a single [`AsyncRead`] + [`AsyncWrite`] value, so the forwarding
    /// engine can treat it like any other byte stream.
    pub struct QuicDuplexStream {
        send: SendStream,
        recv: RecvStream,
    }

    impl QuicDuplexStream {
        pub fn new(send: SendStream, recv: RecvStream) -> Self {
            Self { send, recv }
        }

        pub fn into_inner(self) -> (SendStream, RecvStream) {
            (self.send, self.recv)
        }

        /// Closes both halves. Idempotent: calling this more than once, or
        /// after the peer has already reset the stream, is not an error.
        pub fn close(&mut self) {
            let _ = self.send.finish();
            self.recv.stop(0u32.into());
        }
    }

    impl AsyncWrite for QuicDuplexStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<Result<usize, io::Error>> {
            Pin::new(&mut self.send).poll_write(cx, buf).map_err(io::Error::other)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Pin::new(&mut self.send).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), io::Error>> {
            Pin::new(&mut self.send).poll_shutdown(cx)
        }
    }

    impl AsyncRead for QuicDuplexStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.recv).poll_read(cx, buf)
        }
    }
}
