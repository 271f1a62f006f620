#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Serial writer double that records everything the relay sends to the payload.
#[derive(Clone, Default)]
pub struct SharedSink(Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Return what was written so far and start over.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.lock().unwrap());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Serial writer whose port has gone away.
pub struct FailingSink;

impl Write for FailingSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "serial port unplugged"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Log writer that fails its first `failures` writes, then records normally.
#[derive(Clone, Default)]
pub struct FlakyWriter {
    failures_left: Arc<Mutex<usize>>,
    written: SharedSink,
}

impl FlakyWriter {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures_left: Arc::new(Mutex::new(failures)),
            written: SharedSink::default(),
        }
    }

    pub fn contents(&self) -> String {
        self.written.contents()
    }
}

impl Write for FlakyWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut left = self.failures_left.lock().unwrap();
        if *left > 0 {
            *left -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        drop(left);
        self.written.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
