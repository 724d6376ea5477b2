// ===============================
// src/ipc/unix.rs
// ===============================
//
// Unix: pipe = SOCK_STREAM socket file, mailbox = SOCK_DGRAM socket file.
//   \\.\pipe\fxcolt\ib\555\tick\0  ->  <root>/pipe/fxcolt/ib/555/tick/0
//
use std::fs::{self, TryLockError};
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};
use tokio::net::{UnixDatagram, UnixListener, UnixStream};
use tracing::debug;

use super::{Namespace, PipeLister, PipeStream};
use crate::consts::{MAX_MAILSLOT_MSG_LEN, PIPE_PREFIX};

const CANONICAL_PREFIX: &str = "\\\\.\\";

impl Namespace {
    fn local_path(&self, canonical: &str) -> io::Result<PathBuf> {
        let invalid = || {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid channel path {canonical}"))
        };
        let rest = canonical.strip_prefix(CANONICAL_PREFIX).ok_or_else(invalid)?;
        let mut path = self.root.clone();
        for component in rest.split('\\') {
            if component.is_empty() || component == "." || component == ".." || component.contains('/') {
                return Err(invalid());
            }
            path.push(component);
        }
        Ok(path)
    }
}

fn prepare_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) => fs::create_dir_all(parent),
        None => Ok(()),
    }
}

/// Owner of a socket name: an exclusive lock on `<socket>.lock`, held while
/// the name is served. A socket file without a locked sibling is a leftover.
struct NameLock {
    file: fs::File,
    path: PathBuf,
}

impl NameLock {
    fn acquire(socket: &Path) -> io::Result<Self> {
        let mut path = socket.as_os_str().to_owned();
        path.push(".lock");
        let path = PathBuf::from(path);
        let in_use = || {
            io::Error::new(io::ErrorKind::AddrInUse, format!("{} is already served", socket.display()))
        };

        let file = fs::OpenOptions::new().create(true).truncate(false).write(true).open(&path)?;
        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(in_use()),
            Err(TryLockError::Error(e)) => return Err(e),
        }
        // pemilik sebelumnya bisa saja menghapus file lock di antara open dan lock
        let held = file.metadata()?.ino();
        match fs::metadata(&path) {
            Ok(meta) if meta.ino() == held => {}
            _ => return Err(in_use()),
        }

        if fs::symlink_metadata(socket).is_ok() {
            debug!(path = %socket.display(), "removing stale socket");
            match fs::remove_file(socket) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
                _ => {}
            }
        }
        Ok(Self { file, path })
    }
}

impl Drop for NameLock {
    fn drop(&mut self) {
        // hapus dulu selagi masih terkunci, lalu lepas
        let _ = fs::remove_file(&self.path);
        let _ = self.file.unlock();
    }
}

/// Server side of one pipe instance. The name disappears once a client is accepted.
pub struct PipeServer {
    listener: UnixListener,
    path: PathBuf,
    lock: Option<NameLock>,
}

impl PipeServer {
    pub fn bind(ns: &Namespace, canonical: &str) -> io::Result<Self> {
        let path = ns.local_path(canonical)?;
        prepare_parent(&path)?;
        let lock = NameLock::acquire(&path)?;
        let listener = UnixListener::bind(&path)?;
        Ok(Self { listener, path, lock: Some(lock) })
    }

    pub async fn accept(&mut self) -> io::Result<PipeStream> {
        let (stream, _) = self.listener.accept().await?;
        self.unlink();
        Ok(PipeStream::new(stream))
    }

    fn unlink(&mut self) {
        if let Some(lock) = self.lock.take() {
            let _ = fs::remove_file(&self.path);
            drop(lock);
        }
    }
}

impl Drop for PipeServer {
    fn drop(&mut self) {
        self.unlink();
    }
}

pub async fn connect(ns: &Namespace, canonical: &str) -> io::Result<PipeStream> {
    let path = ns.local_path(canonical)?;
    let stream = UnixStream::connect(&path).await?;
    Ok(PipeStream::new(stream))
}

pub struct MailboxReceiver {
    socket: UnixDatagram,
    path: PathBuf,
    _lock: NameLock,
}

impl MailboxReceiver {
    pub fn bind(ns: &Namespace, canonical: &str) -> io::Result<Self> {
        let path = ns.local_path(canonical)?;
        prepare_parent(&path)?;
        let lock = NameLock::acquire(&path)?;
        let socket = UnixDatagram::bind(&path)?;
        Ok(Self { socket, path, _lock: lock })
    }

    /// Next whole datagram; longer ones are cut at the mailbox limit.
    pub async fn recv(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; MAX_MAILSLOT_MSG_LEN];
        let n = self.socket.recv(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }
}

impl Drop for MailboxReceiver {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Fire-and-forget write into a mailbox. No reader is an error.
pub async fn send_datagram(ns: &Namespace, canonical: &str, msg: &[u8]) -> io::Result<()> {
    if msg.len() > MAX_MAILSLOT_MSG_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("datagram of {} bytes exceeds {MAX_MAILSLOT_MSG_LEN}", msg.len()),
        ));
    }
    let path = ns.local_path(canonical)?;
    let socket = UnixDatagram::unbound()?;
    socket.send_to(msg, &path).await?;
    Ok(())
}

impl PipeLister for Namespace {
    fn list_pipes(&self, tag: &str) -> io::Result<Vec<String>> {
        let mut found = Vec::new();
        let mut components = vec![PIPE_PREFIX.to_string()];
        walk(&self.root.join(PIPE_PREFIX), &mut components, &mut found)?;
        found.retain(|p| p.contains(tag));
        Ok(found)
    }
}

// Direktori bisa hilang di tengah scan (adapter lain sedang rotasi); abaikan.
fn walk(dir: &Path, components: &mut Vec<String>, found: &mut Vec<String>) -> io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else { continue };
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_type.is_dir() {
            components.push(name);
            walk(&entry.path(), components, found)?;
            components.pop();
        } else if file_type.is_socket() {
            let mut canonical = CANONICAL_PREFIX.to_string();
            for c in components.iter() {
                canonical.push_str(c);
                canonical.push('\\');
            }
            canonical.push_str(&name);
            found.push(canonical);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::APP_TAG;
    use std::time::Duration;

    const PIPE: &str = r"\\.\pipe\fxcolt\ib\555\tick\0";
    const SLOT: &str = r"\\.\mailslot\fxcolt\note";

    #[test]
    fn canonical_names_map_under_root() {
        let ns = Namespace::new("/tmp/x");
        assert_eq!(
            ns.local_path(PIPE).unwrap(),
            PathBuf::from("/tmp/x/pipe/fxcolt/ib/555/tick/0")
        );
        assert!(ns.local_path(r"\\.\pipe\..\etc").is_err());
        assert!(ns.local_path("pipe/fxcolt").is_err());
    }

    #[tokio::test]
    async fn pipe_accept_unlinks_name() {
        let dir = tempfile::tempdir().unwrap();
        let ns = Namespace::new(dir.path());

        let mut server = PipeServer::bind(&ns, PIPE).unwrap();
        assert_eq!(ns.list_pipes(APP_TAG).unwrap(), vec![PIPE.to_string()]);

        let (client, accepted) = tokio::join!(connect(&ns, PIPE), server.accept());
        let mut client = client.unwrap();
        let mut accepted = accepted.unwrap();
        assert!(ns.list_pipes(APP_TAG).unwrap().is_empty());
        assert!(!ns.local_path(PIPE).unwrap().exists());

        accepted.write_message(b"x").await.unwrap();
        assert_eq!(client.read_message().await.unwrap().as_deref(), Some(&b"x"[..]));

        // name is free again after the accept
        drop(server);
        let _next = PipeServer::bind(&ns, PIPE).unwrap();
    }

    #[tokio::test]
    async fn second_bind_leaves_live_server_alone() {
        let dir = tempfile::tempdir().unwrap();
        let ns = Namespace::new(dir.path());

        let mut server = PipeServer::bind(&ns, PIPE).unwrap();
        for _ in 0..3 {
            let err = PipeServer::bind(&ns, PIPE).err().unwrap();
            assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
        }
        // nobody knocked on the live server
        let idle = tokio::time::timeout(Duration::from_millis(100), server.accept()).await;
        assert!(idle.is_err());
        assert_eq!(ns.list_pipes(APP_TAG).unwrap(), vec![PIPE.to_string()]);

        let (client, accepted) = tokio::join!(connect(&ns, PIPE), server.accept());
        let mut client = client.unwrap();
        accepted.unwrap().write_message(b"first").await.unwrap();
        assert_eq!(client.read_message().await.unwrap().as_deref(), Some(&b"first"[..]));
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let ns = Namespace::new(dir.path());
        let path = ns.local_path(PIPE).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        // socket file tanpa pemilik (proses lama mati)
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let _server = PipeServer::bind(&ns, PIPE).unwrap();
        assert!(connect(&ns, PIPE).await.is_ok());
    }

    #[test]
    fn dropped_server_frees_the_name() {
        let dir = tempfile::tempdir().unwrap();
        let ns = Namespace::new(dir.path());
        let path = ns.local_path(PIPE).unwrap();
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let _guard = rt.enter();

        let server = PipeServer::bind(&ns, PIPE).unwrap();
        drop(server);
        assert!(!path.exists());
        assert!(fs::read_dir(path.parent().unwrap()).unwrap().next().is_none());

        let mailbox = MailboxReceiver::bind(&ns, SLOT).unwrap();
        assert_eq!(MailboxReceiver::bind(&ns, SLOT).err().unwrap().kind(), io::ErrorKind::AddrInUse);
        drop(mailbox);
        assert!(MailboxReceiver::bind(&ns, SLOT).is_ok());
    }

    #[tokio::test]
    async fn mailbox_delivers_whole_datagrams() {
        let dir = tempfile::tempdir().unwrap();
        let ns = Namespace::new(dir.path());

        assert!(send_datagram(&ns, SLOT, b"nobody").await.is_err());

        let mut rx = MailboxReceiver::bind(&ns, SLOT).unwrap();
        send_datagram(&ns, SLOT, b"one").await.unwrap();
        send_datagram(&ns, SLOT, b"two").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"one");
        assert_eq!(rx.recv().await.unwrap(), b"two");

        let big = vec![1u8; MAX_MAILSLOT_MSG_LEN + 1];
        assert!(send_datagram(&ns, SLOT, &big).await.is_err());
        // mailbox files are not pipes
        assert!(ns.list_pipes(APP_TAG).unwrap().is_empty());
    }

    #[test]
    fn listing_an_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let ns = Namespace::new(dir.path().join("missing"));
        assert!(ns.list_pipes(APP_TAG).unwrap().is_empty());
    }
}
