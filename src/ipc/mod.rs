// ===============================
// src/ipc/mod.rs
// ===============================
//
// Primitive channel:
// - pipe duplex (server/client), satu frame per message
// - mailbox datagram (banyak writer, satu reader)
//
// Nama kanonik selalu gaya Windows (\\.\pipe\...). Di Unix dipetakan ke
// socket file di bawah root namespace.
//
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::consts::NAMED_PIPE_BUFFER_SIZE;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{connect, send_datagram, MailboxReceiver, PipeServer};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::{connect, send_datagram, MailboxReceiver, PipeServer};

/// Where channels live on this host.
#[derive(Clone, Debug)]
pub struct Namespace {
    #[cfg_attr(windows, allow(dead_code))]
    root: PathBuf,
}

impl Namespace {
    /// `root` is only meaningful on Unix; Windows uses the global pipe namespace.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Enumerates live pipe names (canonical form) that contain `tag`.
pub trait PipeLister: Send + Sync {
    fn list_pipes(&self, tag: &str) -> io::Result<Vec<String>>;
}

trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

/// Connected pipe, either role.
pub struct PipeStream {
    inner: Box<dyn Duplex>,
}

impl PipeStream {
    fn new(inner: impl AsyncRead + AsyncWrite + Send + Unpin + 'static) -> Self {
        Self { inner: Box::new(inner) }
    }

    /// `None` when the peer closed the pipe.
    pub async fn read_message(&mut self) -> io::Result<Option<Vec<u8>>> {
        read_frame(&mut self.inner).await
    }

    pub async fn write_message(&mut self, msg: &[u8]) -> io::Result<()> {
        write_frame(&mut self.inner, msg).await
    }

    pub fn split(self) -> (PipeReader, PipeWriter) {
        let (r, w) = tokio::io::split(self.inner);
        (PipeReader { inner: r }, PipeWriter { inner: w })
    }
}

pub struct PipeReader {
    inner: ReadHalf<Box<dyn Duplex>>,
}

impl PipeReader {
    pub async fn read_message(&mut self) -> io::Result<Option<Vec<u8>>> {
        read_frame(&mut self.inner).await
    }
}

pub struct PipeWriter {
    inner: WriteHalf<Box<dyn Duplex>>,
}

impl PipeWriter {
    pub async fn write_message(&mut self, msg: &[u8]) -> io::Result<()> {
        write_frame(&mut self.inner, msg).await
    }
}

// Frame: u32 LE panjang + payload.
async fn read_frame<R: AsyncRead + Unpin>(r: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut len = [0u8; 4];
    match r.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if is_peer_gone(&e) => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len) as usize;
    if len > NAMED_PIPE_BUFFER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds {NAMED_PIPE_BUFFER_SIZE}"),
        ));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

async fn write_frame<W: AsyncWrite + Unpin>(w: &mut W, msg: &[u8]) -> io::Result<()> {
    if msg.len() > NAMED_PIPE_BUFFER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message of {} bytes exceeds {NAMED_PIPE_BUFFER_SIZE}", msg.len()),
        ));
    }
    let len = msg.len() as u32;
    w.write_all(&len.to_le_bytes()).await?;
    w.write_all(msg).await?;
    w.flush().await
}

fn is_peer_gone(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_survive_a_byte_stream() {
        let (a, b) = tokio::io::duplex(64);
        let mut tx = PipeStream::new(a);
        let mut rx = PipeStream::new(b);

        let big = vec![7u8; 1000];
        let writer = tokio::spawn(async move {
            tx.write_message(b"hello").await.unwrap();
            tx.write_message(b"").await.unwrap();
            tx.write_message(&big).await.unwrap();
        });

        assert_eq!(rx.read_message().await.unwrap().as_deref(), Some(&b"hello"[..]));
        assert_eq!(rx.read_message().await.unwrap().as_deref(), Some(&b""[..]));
        assert_eq!(rx.read_message().await.unwrap().map(|m| m.len()), Some(1000));
        writer.await.unwrap();
        // writer dropped: peer closed
        assert_eq!(rx.read_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_frames_rejected() {
        let (a, _b) = tokio::io::duplex(64);
        let mut tx = PipeStream::new(a);
        let err = tx.write_message(&vec![0u8; NAMED_PIPE_BUFFER_SIZE + 1]).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let (c, d) = tokio::io::duplex(64);
        let mut raw = c;
        raw.write_all(&(u32::MAX).to_le_bytes()).await.unwrap();
        let mut rx = PipeStream::new(d);
        assert_eq!(rx.read_message().await.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn split_halves() {
        let (a, b) = tokio::io::duplex(64);
        let (mut reader, mut writer) = PipeStream::new(a).split();
        let mut peer = PipeStream::new(b);

        writer.write_message(b"ping").await.unwrap();
        assert_eq!(peer.read_message().await.unwrap().as_deref(), Some(&b"ping"[..]));
        peer.write_message(b"pong").await.unwrap();
        assert_eq!(reader.read_message().await.unwrap().as_deref(), Some(&b"pong"[..]));
        drop(peer);
        assert_eq!(reader.read_message().await.unwrap(), None);
    }
}
