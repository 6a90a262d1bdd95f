//! Terminal output.
//!
//! The container hands each render pass to a [`FrameWriter`] as a sequence of bar frames
//! followed by one [`flush`](FrameWriter::flush) carrying the total line count. The writer is
//! responsible for overwriting the previous pass in place. [`CursorWriter`] does that with two
//! ANSI sequences; anything smarter (terminal size detection, styling) belongs in a custom
//! implementation.

use std::{
    fmt,
    io::{self, Write},
    sync::Arc,
};

use parking_lot::Mutex;

/// Receives rendered frames from the container.
pub trait FrameWriter: Send {
    /// Buffers one bar's frame. Frames arrive in render order and end with a newline.
    fn write(&mut self, frame: &str) -> io::Result<()>;

    /// Replaces the previous pass on screen with everything buffered since the last flush.
    ///
    /// `lines` is the number of terminal lines the buffered frames span.
    fn flush(&mut self, lines: usize) -> io::Result<()>;

    /// Width of the terminal in columns, if known. `None` falls back to the container width.
    fn width(&self) -> Option<usize> {
        None
    }
}

const ESC: char = '\x1b';

/// Overwrites the previous pass by moving the cursor up and clearing to the end of screen.
pub struct CursorWriter<W> {
    out: W,
    buf: String,
    lines: usize,
}

impl<W: Write> CursorWriter<W> {
    /// Wraps an output sink.
    pub const fn new(out: W) -> Self {
        Self {
            out,
            buf: String::new(),
            lines: 0,
        }
    }

    /// Consumes the writer, returning the sink.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> FrameWriter for CursorWriter<W> {
    fn write(&mut self, frame: &str) -> io::Result<()> {
        self.buf.push_str(frame);
        Ok(())
    }

    fn flush(&mut self, lines: usize) -> io::Result<()> {
        if self.lines > 0 {
            write!(self.out, "{ESC}[{}A{ESC}[J", self.lines)?;
        }
        let result = self
            .out
            .write_all(self.buf.as_bytes())
            .and_then(|()| self.out.flush());
        self.buf.clear();
        self.lines = lines;
        result
    }
}

/// Shared destination for fault reports, cheap to clone into every bar.
#[derive(Clone, Default)]
pub(crate) struct DebugSink(Option<Arc<Mutex<Box<dyn Write + Send>>>>);

impl fmt::Debug for DebugSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DebugSink").field(&self.0.is_some()).finish()
    }
}

impl DebugSink {
    pub(crate) fn new(out: Box<dyn Write + Send>) -> Self {
        Self(Some(Arc::new(Mutex::new(out))))
    }

    /// Writes one `[multibar]`-prefixed line. Failures are dropped.
    pub(crate) fn line(&self, args: fmt::Arguments<'_>) {
        if let Some(out) = &self.0 {
            let mut out = out.lock();
            let _ = writeln!(out, "[multibar] {args}");
            let _ = out.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{self, Write},
        sync::Arc,
    };

    use parking_lot::Mutex;

    use super::{CursorWriter, DebugSink, FrameWriter};

    /// Cursor Movement
    /// The first flush writes plainly; later flushes move up over the previous line count.
    #[test]
    fn test_cursor_writer_overwrites_previous_pass() {
        let mut w = CursorWriter::new(Vec::new());
        w.write("a\n").unwrap();
        w.write("b\n").unwrap();
        w.flush(2).unwrap();
        w.write("c\n").unwrap();
        w.flush(1).unwrap();

        let out = String::from_utf8(w.into_inner()).unwrap();
        assert_eq!(out, "a\nb\n\x1b[2A\x1b[Jc\n");
    }

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Debug Sink
    /// Lines are prefixed; a disabled sink swallows them.
    #[test]
    fn test_debug_sink_lines() {
        let shared = Shared::default();
        let sink = DebugSink::new(Box::new(shared.clone()));
        sink.line(format_args!("bar id {:02} {}", 3, "boom"));
        DebugSink::default().line(format_args!("ignored"));

        let text = String::from_utf8(shared.0.lock().clone()).unwrap();
        assert_eq!(text, "[multibar] bar id 03 boom\n");
    }
}
