//! Fluent interfaces for configuring containers and bars.
//!
//! [`Progress::new`] starts a container with defaults (80 columns, 120 ms refresh, stdout).
//! [`ProgressBuilder`] covers everything else, and [`BarBuilder`] carries per-bar options into
//! [`Progress::add`].
//!
//! # Key Features
//!
//! * **Manual Refresh:** Replace the internal ticker with your own channel of instants, e.g. to
//!   drive renders from an event loop or deterministically from tests.
//! * **Cancellation:** A cancel channel completes every bar at once when it fires or closes.
//! * **Chaining:** [`BarBuilder::after`] queues a bar for display only once another bar retires.

use std::{
    io::Write,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};

use crate::{
    bar::Bar,
    decor::Decorator,
    error::ProgressError,
    filler::BarRunes,
    progress::Progress,
    sync::WaitGroup,
    writer::{CursorWriter, FrameWriter},
};

/// Default terminal width in columns.
pub const DEFAULT_WIDTH: usize = 80;

/// Default interval between render passes.
pub const DEFAULT_REFRESH_RATE: Duration = Duration::from_millis(120);

/// Refresh rates below this are ignored.
pub const MIN_REFRESH_RATE: Duration = Duration::from_millis(10);

/// Builder for a [`Progress`] container.
pub struct ProgressBuilder {
    pub(crate) width: usize,
    pub(crate) refresh_rate: Duration,
    pub(crate) manual_refresh: Option<Receiver<Instant>>,
    pub(crate) writer: Box<dyn FrameWriter>,
    pub(crate) debug: Option<Box<dyn Write + Send>>,
    pub(crate) cancel: Option<Receiver<()>>,
    pub(crate) wait_group: Option<WaitGroup>,
    pub(crate) shutdown_notifier: Option<Sender<()>>,
}

impl Default for ProgressBuilder {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            refresh_rate: DEFAULT_REFRESH_RATE,
            manual_refresh: None,
            writer: Box::new(CursorWriter::new(std::io::stdout())),
            debug: None,
            cancel: None,
            wait_group: None,
            shutdown_notifier: None,
        }
    }
}

impl ProgressBuilder {
    /// Starts from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the width used when the writer cannot report the terminal size. Zero is ignored.
    #[must_use]
    pub const fn with_width(mut self, width: usize) -> Self {
        if width > 0 {
            self.width = width;
        }
        self
    }

    /// Sets the interval between render passes. Values below 10 ms are ignored.
    #[must_use]
    pub fn with_refresh_rate(mut self, rate: Duration) -> Self {
        if rate >= MIN_REFRESH_RATE {
            self.refresh_rate = rate;
        }
        self
    }

    /// Renders once per received instant instead of on an internal ticker.
    ///
    /// Closing the channel stops periodic rendering; forced refreshes still happen.
    #[must_use]
    pub fn with_manual_refresh(mut self, ticks: Receiver<Instant>) -> Self {
        self.manual_refresh = Some(ticks);
        self
    }

    /// Draws to `out` using cursor movement escape codes.
    #[must_use]
    pub fn with_output<W: Write + Send + 'static>(self, out: W) -> Self {
        self.with_writer(CursorWriter::new(out))
    }

    /// Draws through a custom [`FrameWriter`].
    #[must_use]
    pub fn with_writer(mut self, writer: impl FrameWriter + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    /// Reports decorator faults and writer errors as `[multibar]`-prefixed lines to `out`.
    #[must_use]
    pub fn with_debug_output<W: Write + Send + 'static>(mut self, out: W) -> Self {
        self.debug = Some(Box::new(out));
        self
    }

    /// Completes every bar, including bars added later, once `cancel` receives a message or
    /// disconnects.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Receiver<()>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Makes [`Progress::wait`] first wait for an external group of workers.
    #[must_use]
    pub fn with_wait_group(mut self, wg: WaitGroup) -> Self {
        self.wait_group = Some(wg);
        self
    }

    /// Sends one message on `notifier` once the render loop has stopped.
    #[must_use]
    pub fn with_shutdown_notifier(mut self, notifier: Sender<()>) -> Self {
        self.shutdown_notifier = Some(notifier);
        self
    }

    /// Starts the container's render loop.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::Spawn`] if the render thread cannot be started.
    pub fn build(self) -> Result<Progress, ProgressError> {
        Progress::from_builder(self)
    }
}

/// Per-bar options for [`Progress::add`].
#[derive(Default)]
pub struct BarBuilder {
    pub(crate) width: Option<usize>,
    pub(crate) runes: BarRunes,
    pub(crate) trim_left: bool,
    pub(crate) trim_right: bool,
    pub(crate) remove_on_complete: bool,
    pub(crate) clear_on_complete: bool,
    pub(crate) auto_increment: Option<(u64, u64)>,
    pub(crate) priority: Option<i64>,
    pub(crate) predecessor: Option<Bar>,
    pub(crate) prepend: Vec<Box<dyn Decorator>>,
    pub(crate) append: Vec<Box<dyn Decorator>>,
}

impl BarBuilder {
    /// Starts from the defaults: container width, `[=>-]` glyphs, padded both sides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the width of the glyph span. Zero is ignored.
    #[must_use]
    pub const fn with_width(mut self, width: usize) -> Self {
        if width > 0 {
            self.width = Some(width);
        }
        self
    }

    /// Sets the five bar glyphs, e.g. `"[=>-]"`. Anything but exactly five characters is ignored.
    #[must_use]
    pub fn with_runes(mut self, format: &str) -> Self {
        if let Some(runes) = BarRunes::parse(format) {
            self.runes = runes;
        }
        self
    }

    /// Drops the space before the glyph span.
    #[must_use]
    pub const fn with_trim_left(mut self, trim: bool) -> Self {
        self.trim_left = trim;
        self
    }

    /// Drops the space after the glyph span.
    #[must_use]
    pub const fn with_trim_right(mut self, trim: bool) -> Self {
        self.trim_right = trim;
        self
    }

    /// Removes the bar from the display once its final frame was drawn.
    #[must_use]
    pub const fn with_remove_on_complete(mut self) -> Self {
        self.remove_on_complete = true;
        self
    }

    /// Keeps the decorators but blanks the glyph span after completion.
    #[must_use]
    pub const fn with_clear_on_complete(mut self) -> Self {
        self.clear_on_complete = true;
        self
    }

    /// Makes the total dynamic: once the remaining percentage drops to `trigger`, the total
    /// grows by `by`.
    #[must_use]
    pub const fn with_auto_increment_total(mut self, trigger: u64, by: u64) -> Self {
        self.auto_increment = Some((trigger, by));
        self
    }

    /// Sets the render order key. Lower draws first; the default is the bar's id.
    #[must_use]
    pub const fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Shows this bar only after `predecessor` retires, taking over its priority.
    #[must_use]
    pub fn after(mut self, predecessor: &Bar) -> Self {
        self.predecessor = Some(predecessor.clone());
        self
    }

    /// Adds a decorator to the left of the bar.
    #[must_use]
    pub fn prepend(mut self, decorator: impl Decorator + 'static) -> Self {
        self.prepend.push(Box::new(decorator));
        self
    }

    /// Adds a decorator to the right of the bar.
    #[must_use]
    pub fn append(mut self, decorator: impl Decorator + 'static) -> Self {
        self.append.push(Box::new(decorator));
        self
    }
}
