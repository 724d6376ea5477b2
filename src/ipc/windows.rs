// ===============================
// src/ipc/windows.rs
// ===============================
//
// Windows: named pipe asli. Mailbox diemulasikan dengan pipe server
// di \\.\pipe\mailslot\..., satu koneksi per datagram.
//
use std::io;
use tokio::net::windows::named_pipe::{ClientOptions, NamedPipeServer, PipeMode, ServerOptions};

use super::{read_frame, write_frame, Namespace, PipeLister, PipeStream};
use crate::consts::{MAILSLOT_PREFIX, MAX_MAILSLOT_MSG_LEN, NAMED_PIPE_BUFFER_SIZE, PIPE_PREFIX};

const PIPE_ROOT: &str = r"\\.\pipe\";

fn server_options(first: bool) -> ServerOptions {
    let mut options = ServerOptions::new();
    options
        .first_pipe_instance(first)
        .pipe_mode(PipeMode::Byte)
        .in_buffer_size(NAMED_PIPE_BUFFER_SIZE as u32)
        .out_buffer_size(NAMED_PIPE_BUFFER_SIZE as u32);
    options
}

/// `\\.\mailslot\x` -> `\\.\pipe\mailslot\x`
fn mailbox_pipe_name(canonical: &str) -> io::Result<String> {
    let mailslot_root = format!(r"\\.\{MAILSLOT_PREFIX}\");
    canonical
        .strip_prefix(&mailslot_root)
        .map(|rest| format!(r"{PIPE_ROOT}{MAILSLOT_PREFIX}\{rest}"))
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, format!("invalid mailbox path {canonical}"))
        })
}

pub struct PipeServer {
    server: Option<NamedPipeServer>,
}

impl PipeServer {
    pub fn bind(_ns: &Namespace, canonical: &str) -> io::Result<Self> {
        let server = server_options(true).create(canonical)?;
        Ok(Self { server: Some(server) })
    }

    pub async fn accept(&mut self) -> io::Result<PipeStream> {
        let server = self
            .server
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "pipe instance already accepted"))?;
        server.connect().await?;
        Ok(PipeStream::new(server))
    }
}

pub async fn connect(_ns: &Namespace, canonical: &str) -> io::Result<PipeStream> {
    let client = ClientOptions::new().open(canonical)?;
    Ok(PipeStream::new(client))
}

pub struct MailboxReceiver {
    name: String,
    next: Option<NamedPipeServer>,
}

impl MailboxReceiver {
    pub fn bind(_ns: &Namespace, canonical: &str) -> io::Result<Self> {
        let name = mailbox_pipe_name(canonical)?;
        let first = server_options(true).create(&name)?;
        Ok(Self { name, next: Some(first) })
    }

    pub async fn recv(&mut self) -> io::Result<Vec<u8>> {
        loop {
            let mut server = match self.next.take() {
                Some(server) => server,
                None => server_options(false).create(&self.name)?,
            };
            server.connect().await?;
            // instance berikutnya harus siap sebelum writer lain datang
            self.next = Some(server_options(false).create(&self.name)?);
            if let Some(mut msg) = read_frame(&mut server).await? {
                msg.truncate(MAX_MAILSLOT_MSG_LEN);
                return Ok(msg);
            }
        }
    }
}

pub async fn send_datagram(_ns: &Namespace, canonical: &str, msg: &[u8]) -> io::Result<()> {
    if msg.len() > MAX_MAILSLOT_MSG_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("datagram of {} bytes exceeds {MAX_MAILSLOT_MSG_LEN}", msg.len()),
        ));
    }
    let mut client = ClientOptions::new().open(mailbox_pipe_name(canonical)?)?;
    write_frame(&mut client, msg).await
}

impl PipeLister for Namespace {
    fn list_pipes(&self, tag: &str) -> io::Result<Vec<String>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(PIPE_ROOT)?.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains(tag) && !name.starts_with(MAILSLOT_PREFIX) {
                found.push(format!(r"\\.\{PIPE_PREFIX}\{name}"));
            }
        }
        Ok(found)
    }
}
