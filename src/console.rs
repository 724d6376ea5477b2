// ===============================
// src/console.rs
// ===============================
//
// Output REPL. Di binary: stdout; di test: buffer yang bisa dibaca ulang.
//
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone)]
pub struct Console {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    captured: Option<Arc<Mutex<Vec<u8>>>>,
}

struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Console {
    pub fn stdout() -> Self {
        Self { out: Arc::new(Mutex::new(Box::new(io::stdout()))), captured: None }
    }

    /// In-memory console; read it back with [`Console::contents`].
    pub fn capture() -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        Self {
            out: Arc::new(Mutex::new(Box::new(Capture(buf.clone())))),
            captured: Some(buf),
        }
    }

    /// Whole line at once, so lines from concurrent loops never interleave.
    pub fn print_line(&self, line: impl AsRef<str>) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{}", line.as_ref());
        let _ = out.flush();
    }

    /// Captured text so far; empty for stdout.
    pub fn contents(&self) -> String {
        match &self.captured {
            Some(buf) => String::from_utf8_lossy(&buf.lock().unwrap_or_else(PoisonError::into_inner)).into_owned(),
            None => String::new(),
        }
    }

    /// Drains the captured text.
    pub fn take(&self) -> String {
        match &self.captured {
            Some(buf) => {
                let bytes = std::mem::take(&mut *buf.lock().unwrap_or_else(PoisonError::into_inner));
                String::from_utf8_lossy(&bytes).into_owned()
            }
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_keeps_lines() {
        let console = Console::capture();
        console.print_line("a");
        console.clone().print_line(String::from("b"));
        assert_eq!(console.contents(), "a\nb\n");
        assert_eq!(console.take(), "a\nb\n");
        assert_eq!(console.contents(), "");
    }
}
