//! I/O wrappers that advance a bar.
//!
//! [`ProxyReader`] and [`ProxyWriter`] wrap any [`std::io::Read`] or [`std::io::Write`] and
//! report every successfully transferred byte to a [`Bar`]. Obtain them from
//! [`Bar::proxy_reader`] and [`Bar::proxy_writer`].
//!
//! # Mechanics
//!
//! Each call opens a measurement block before touching the inner stream and closes it with the
//! byte count afterwards, so the bar's time estimate reflects transfer time only. That is two
//! mailbox messages per call; wrap the inner stream in a buffer if calls are tiny.

use std::io::{self, Read, Write};

use crate::bar::Bar;

/// A [`Read`] adapter that advances a [`Bar`] by the bytes read.
pub struct ProxyReader<R> {
    inner: R,
    bar: Bar,
}

impl<R> ProxyReader<R> {
    pub(crate) const fn new(inner: R, bar: Bar) -> Self {
        Self { inner, bar }
    }

    /// Consumes the wrapper, returning the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for ProxyReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.bar.start_block();
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.bar.incr_by(n as u64);
        }
        Ok(n)
    }
}

/// A [`Write`] adapter that advances a [`Bar`] by the bytes written.
pub struct ProxyWriter<W> {
    inner: W,
    bar: Bar,
}

impl<W> ProxyWriter<W> {
    pub(crate) const fn new(inner: W, bar: Bar) -> Self {
        Self { inner, bar }
    }

    /// Consumes the wrapper, returning the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ProxyWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bar.start_block();
        let n = self.inner.write(buf)?;
        if n > 0 {
            self.bar.incr_by(n as u64);
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
