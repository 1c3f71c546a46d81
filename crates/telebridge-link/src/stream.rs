use std::io::{Read, Write};
use std::time::Duration;

use serialport::SerialPort;

/// A connected device stream: a serial port or, on Unix, a socket to a
/// device emulator.
pub struct LinkStream {
    inner: LinkStreamInner,
}

enum LinkStreamInner {
    Serial(Box<dyn SerialPort>),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl LinkStream {
    pub fn from_serial(port: Box<dyn SerialPort>) -> Self {
        Self {
            inner: LinkStreamInner::Serial(port),
        }
    }

    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: LinkStreamInner::Unix(stream),
        }
    }

    /// Open a second handle to the same device, used as the read half.
    pub fn try_clone(&self) -> std::io::Result<Self> {
        match &self.inner {
            LinkStreamInner::Serial(port) => Ok(Self::from_serial(port.try_clone()?)),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Bound blocking reads so the reader can observe shutdown.
    ///
    /// Serial ports share one timeout for reads and writes.
    pub fn set_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => Ok(port.set_timeout(timeout)?),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_read_timeout(Some(timeout)),
        }
    }

    pub fn set_write_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => Ok(port.set_timeout(timeout)?),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.set_write_timeout(Some(timeout)),
        }
    }

    /// Wake any blocked reader on the other handle.
    ///
    /// Serial ports have no shutdown; their reader notices on its next
    /// read timeout.
    pub fn shutdown(&self) -> std::io::Result<()> {
        match &self.inner {
            LinkStreamInner::Serial(_) => Ok(()),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => match stream.shutdown(std::net::Shutdown::Both) {
                Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
                other => other,
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.inner {
            LinkStreamInner::Serial(_) => "serial",
            #[cfg(unix)]
            LinkStreamInner::Unix(_) => "unix",
        }
    }
}

impl Read for LinkStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => port.read(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for LinkStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => port.write(buf),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            LinkStreamInner::Serial(port) => port.flush(),
            #[cfg(unix)]
            LinkStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl std::fmt::Debug for LinkStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkStream")
            .field("type", &self.kind())
            .finish()
    }
}
