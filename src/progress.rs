//! The progress container.
//!
//! A [`Progress`] owns the set of visible bars and a single render thread. That thread is the
//! only place where container state changes: public methods submit closures to it and, where
//! they need an answer, wait on a reply channel.
//!
//! # Render Pass
//!
//! On every tick (or forced refresh) the render thread:
//!
//! 1. Rebuilds the width matrices if the set of queued bars changed.
//! 2. Asks every queued bar for a frame. Bars draw concurrently on their own threads.
//! 3. Coordinates the column width barriers while the bars draw.
//! 4. Pops bars in priority order, writing each frame. Bars that report completion are
//!    scheduled for shutdown, release their successors and, if configured, leave the queue.
//! 5. Shuts down the bars retired by the *previous* pass and flushes the writer.
//!
//! Retiring a bar forces an extra pass, so its shutdown follows its final frame promptly.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, Sender, bounded, never, select, tick, unbounded};
use parking_lot::Mutex;

use crate::{
    bar::{Bar, Frame, SpawnContext},
    builder::{BarBuilder, ProgressBuilder},
    error::ProgressError,
    filler::{BarFiller, Filler, SpinnerAlignment, SpinnerFiller},
    matrix::{SyncMatrix, SyncTable},
    queue::{Prioritized, PriorityQueue},
    sync::WaitGroup,
    writer::{DebugSink, FrameWriter},
};

type Operation = Box<dyn FnOnce(&mut State) + Send>;

/// A container that renders a set of bars to one output.
///
/// Cloning is cheap; clones share the same container. Dropping the last clone without calling
/// [`wait`](Self::wait) stops rendering immediately.
#[derive(Clone)]
pub struct Progress {
    inner: Arc<Inner>,
}

struct Inner {
    ops: Sender<Operation>,
    bars: WaitGroup,
    user: Option<WaitGroup>,
    // Dropping the sender stops the render loop.
    done: Mutex<Option<Sender<()>>>,
    control: Mutex<Option<JoinHandle<()>>>,
}

impl Progress {
    /// Starts a container with the default configuration, drawing to stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::Spawn`] if the render thread cannot be started.
    pub fn new() -> Result<Self, ProgressError> {
        ProgressBuilder::new().build()
    }

    pub(crate) fn from_builder(builder: ProgressBuilder) -> Result<Self, ProgressError> {
        let ProgressBuilder {
            width,
            refresh_rate,
            manual_refresh,
            writer,
            debug,
            cancel,
            wait_group,
            shutdown_notifier,
        } = builder;

        let (ops, ops_rx) = unbounded();
        let (done, done_rx) = bounded(0);
        let (force, force_rx) = bounded(1);
        let bars = WaitGroup::new();

        let state = State {
            heap: PriorityQueue::new(),
            pending: Vec::new(),
            waiting: HashMap::new(),
            retired: HashSet::new(),
            heap_updated: false,
            next_id: 0,
            width,
            prepend: SyncMatrix::new(),
            append: SyncMatrix::new(),
            tables: HashMap::new(),
            writer,
            debug: debug.map(DebugSink::new).unwrap_or_default(),
            context: SpawnContext {
                width,
                bars: bars.clone(),
            },
            cancelled: false,
            force,
        };
        let control = Control {
            ops: ops_rx,
            ticks: manual_refresh.unwrap_or_else(|| tick(refresh_rate)),
            force: force_rx,
            cancel: cancel.unwrap_or_else(never),
            done: done_rx,
            notifier: shutdown_notifier,
        };

        let handle = thread::Builder::new()
            .name("multibar-render".into())
            .spawn(move || control.run(state))
            .map_err(ProgressError::Spawn)?;
        tracing::debug!(width, ?refresh_rate, "progress container started");

        Ok(Self {
            inner: Arc::new(Inner {
                ops,
                bars,
                user: wait_group,
                done: Mutex::new(Some(done)),
                control: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Adds a bar drawn by `filler`.
    ///
    /// A zero `total` starts the bar with a dynamic total.
    ///
    /// # Errors
    ///
    /// * [`ProgressError::Closed`] after [`wait`](Self::wait) has returned.
    /// * [`ProgressError::Spawn`] if the bar's thread cannot be started.
    pub fn add(
        &self,
        total: u64,
        filler: impl Filler + 'static,
        options: BarBuilder,
    ) -> Result<Bar, ProgressError> {
        self.add_boxed(total, Box::new(filler), options)
    }

    /// Adds a classic `[===>---]` bar using the builder's glyphs.
    ///
    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn add_bar(&self, total: u64, options: BarBuilder) -> Result<Bar, ProgressError> {
        let filler = BarFiller::new(options.runes);
        self.add_boxed(total, Box::new(filler), options)
    }

    /// Adds a spinner with the default frames.
    ///
    /// # Errors
    ///
    /// See [`add`](Self::add).
    pub fn add_spinner(
        &self,
        total: u64,
        alignment: SpinnerAlignment,
        options: BarBuilder,
    ) -> Result<Bar, ProgressError> {
        self.add_boxed(total, Box::new(SpinnerFiller::new(alignment)), options)
    }

    fn add_boxed(
        &self,
        total: u64,
        filler: Box<dyn Filler>,
        options: BarBuilder,
    ) -> Result<Bar, ProgressError> {
        let (reply, outcome) = bounded(1);
        self.inner.bars.add(1);
        self.send(move |s| {
            let _ = reply.send(s.spawn_bar(total, filler, options));
        });
        // The operation is dropped unanswered once the render loop is gone.
        let outcome = outcome.recv().unwrap_or(Err(ProgressError::Closed));
        if outcome.is_err() {
            self.inner.bars.done();
        }
        outcome
    }

    /// Stops a bar early.
    ///
    /// The bar is shut down on the next pass, keeping its current state. With `remove` it also
    /// disappears from the display. Bars waiting on it are released. A bar that already retired
    /// is left alone.
    pub fn abort(&self, bar: &Bar, remove: bool) {
        let bar = bar.clone();
        self.send(move |s| s.abort(bar, remove));
    }

    /// Changes a bar's render order. Lower draws first.
    pub fn update_bar_priority(&self, bar: &Bar, priority: i64) {
        let bar = bar.clone();
        self.send(move |s| {
            if !s.heap.update(&bar, priority) {
                bar.set_priority(priority);
            }
        });
    }

    /// Number of bars currently queued for display, or 0 once the container stopped.
    #[must_use]
    pub fn bar_count(&self) -> usize {
        let (reply, count) = bounded(1);
        self.send(move |s| {
            let _ = reply.send(s.heap.len());
        });
        count.recv().unwrap_or(0)
    }

    /// Blocks until the external wait group (if any) and every bar have finished, then stops
    /// the render loop.
    ///
    /// Every bar must eventually complete or be aborted, otherwise this never returns. The
    /// container accepts no new bars afterwards.
    pub fn wait(&self) {
        if let Some(user) = &self.inner.user {
            user.wait();
        }
        self.inner.bars.wait();
        drop(self.inner.done.lock().take());
        if let Some(handle) = self.inner.control.lock().take() {
            if handle.join().is_err() {
                tracing::error!("render thread panicked");
            }
        }
    }

    fn send(&self, op: impl FnOnce(&mut State) + Send + 'static) {
        let _ = self.inner.ops.send(Box::new(op));
    }
}

// ============================================================================
// Render thread
// ============================================================================

struct Control {
    ops: Receiver<Operation>,
    ticks: Receiver<std::time::Instant>,
    force: Receiver<()>,
    cancel: Receiver<()>,
    done: Receiver<()>,
    notifier: Option<Sender<()>>,
}

enum Wake {
    Operation(Operation),
    Refresh,
    TicksClosed,
    Cancel,
    Stop,
}

impl Control {
    fn run(self, mut state: State) {
        let Self {
            ops,
            mut ticks,
            force,
            mut cancel,
            done,
            notifier,
        } = self;

        loop {
            let wake = select! {
                recv(ops) -> op => op.map_or(Wake::Stop, Wake::Operation),
                recv(ticks) -> tick => if tick.is_ok() { Wake::Refresh } else { Wake::TicksClosed },
                recv(force) -> _ => Wake::Refresh,
                recv(cancel) -> _ => Wake::Cancel,
                recv(done) -> _ => Wake::Stop,
            };
            match wake {
                Wake::Operation(op) => op(&mut state),
                Wake::Refresh => state.refresh(),
                Wake::TicksClosed => ticks = never(),
                Wake::Cancel => {
                    state.cancel_all();
                    cancel = never();
                }
                Wake::Stop => break,
            }
        }

        tracing::debug!("render loop stopped");
        if let Some(notifier) = notifier {
            let _ = notifier.send(());
        }
    }
}

/// Container state, owned by the render thread.
pub(crate) struct State {
    heap: PriorityQueue<Bar>,
    // Retired by the previous pass, shut down by the next one.
    pending: Vec<Bar>,
    // Predecessor id -> bars to queue once it retires.
    waiting: HashMap<usize, Vec<Bar>>,
    retired: HashSet<usize>,
    heap_updated: bool,
    next_id: usize,
    width: usize,
    prepend: SyncMatrix,
    append: SyncMatrix,
    tables: HashMap<usize, Arc<SyncTable>>,
    writer: Box<dyn FrameWriter>,
    debug: DebugSink,
    context: SpawnContext,
    // Set once the cancel channel fires; later bars start complete.
    cancelled: bool,
    force: Sender<()>,
}

impl State {
    fn spawn_bar(
        &mut self,
        total: u64,
        filler: Box<dyn Filler>,
        options: BarBuilder,
    ) -> Result<Bar, ProgressError> {
        let id = self.next_id;
        let bar =
            Bar::spawn(id, total, filler, options, &self.context).map_err(ProgressError::Spawn)?;
        self.next_id += 1;
        if self.cancelled {
            bar.cancel();
        }

        match bar.predecessor().map(Bar::id) {
            Some(predecessor) if !self.retired.contains(&predecessor) => {
                tracing::debug!(bar = id, predecessor, "bar waiting");
                self.waiting.entry(predecessor).or_default().push(bar.clone());
            }
            _ => {
                tracing::debug!(bar = id, priority = bar.priority(), "bar queued");
                self.heap.push(bar.clone());
                self.heap_updated = true;
            }
        }
        Ok(bar)
    }

    /// Completes every queued and waiting bar, and every bar added from now on.
    fn cancel_all(&mut self) {
        self.cancelled = true;
        let waiting = self.waiting.values().flatten();
        for bar in self.heap.iter().chain(waiting) {
            bar.cancel();
        }
        tracing::debug!(
            bars = self.heap.len(),
            waiting = self.waiting.len(),
            "bars cancelled"
        );
    }

    fn abort(&mut self, bar: Bar, remove: bool) {
        if self.retired.contains(&bar.id()) {
            return;
        }
        let queued = self.heap.contains(&bar);
        if !queued && !self.unchain(&bar) {
            return;
        }
        if queued && remove && self.heap.remove(&bar).is_some() {
            self.heap_updated = true;
        }

        let mut released = Vec::new();
        self.retire(&bar, &mut released);
        for next in released {
            self.heap.push(next);
        }
        tracing::debug!(bar = bar.id(), remove, "bar aborted");
        self.pending.push(bar);
    }

    /// Takes a bar out of the waiting lists. Returns `false` if it was not waiting.
    fn unchain(&mut self, bar: &Bar) -> bool {
        let Some(predecessor) = bar.predecessor().map(Bar::id) else {
            return false;
        };
        let Some(successors) = self.waiting.get_mut(&predecessor) else {
            return false;
        };
        let before = successors.len();
        successors.retain(|waiting| !waiting.same(bar));
        let found = successors.len() < before;
        if successors.is_empty() {
            self.waiting.remove(&predecessor);
        }
        found
    }

    /// Marks `bar` as retired and collects the bars that were waiting on it.
    fn retire(&mut self, bar: &Bar, released: &mut Vec<Bar>) {
        self.retired.insert(bar.id());
        if let Some(successors) = self.waiting.remove(&bar.id()) {
            released.extend(successors);
            self.heap_updated = true;
        }
    }

    fn refresh(&mut self) {
        if let Err(err) = self.render() {
            tracing::warn!("render pass failed: {err}");
            self.debug.line(format_args!("{err}"));
        }
    }

    fn render(&mut self) -> Result<(), ProgressError> {
        if self.heap_updated {
            self.rebuild_matrices();
            self.heap_updated = false;
        }

        let width = self
            .writer
            .width()
            .filter(|w| *w > 0)
            .unwrap_or(self.width);

        let mut frames = HashMap::with_capacity(self.heap.len());
        for bar in self.heap.iter() {
            let (reply, frame) = bounded(1);
            let table = self.tables.get(&bar.id()).cloned().unwrap_or_default();
            bar.render(width, table, self.debug.clone(), reply);
            frames.insert(bar.id(), frame);
        }

        // Bars walk prepend columns before append columns.
        self.prepend.synchronize();
        self.append.synchronize();

        self.flush(frames)
    }

    fn rebuild_matrices(&mut self) {
        self.prepend = SyncMatrix::new();
        self.append = SyncMatrix::new();
        self.tables.clear();
        for bar in self.heap.iter() {
            let (prepend, append) = bar.decorator_counts();
            let table = SyncTable {
                prepend: self.prepend.join(prepend),
                append: self.append.join(append),
            };
            self.tables.insert(bar.id(), Arc::new(table));
        }
        tracing::debug!(
            bars = self.heap.len(),
            prepend = self.prepend.width(),
            append = self.append.width(),
            "width matrices rebuilt"
        );
    }

    fn flush(&mut self, mut frames: HashMap<usize, Receiver<Frame>>) -> Result<(), ProgressError> {
        let mut lines = 0;
        let mut failure = None;
        let mut requeue = Vec::with_capacity(self.heap.len());
        let mut retiring = Vec::new();

        while let Some(bar) = self.heap.pop() {
            let Some(frame) = frames.remove(&bar.id()).and_then(|rx| rx.recv().ok()) else {
                tracing::warn!(bar = bar.id(), "bar produced no frame, dropping it");
                self.heap_updated = true;
                continue;
            };

            if let Err(err) = self.writer.write(&frame.text) {
                failure.get_or_insert(err);
            }
            lines += frame.lines;

            if frame.to_shutdown {
                let _ = self.force.try_send(());
                self.retire(&bar, &mut requeue);
                retiring.push(bar.clone());
                if frame.remove_on_complete {
                    self.heap_updated = true;
                    continue;
                }
            }
            requeue.push(bar);
        }

        for bar in requeue {
            self.heap.push(bar);
        }
        for bar in self.pending.drain(..).rev() {
            bar.shutdown();
        }
        self.pending.append(&mut retiring);

        let flushed = self.writer.flush(lines);
        match failure {
            Some(err) => Err(err.into()),
            None => flushed.map_err(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::Arc,
        thread,
        time::{Duration, Instant},
    };

    use compact_str::CompactString;
    use crossbeam_channel::{Receiver, Sender, unbounded};
    use parking_lot::Mutex;

    use super::Progress;
    use crate::{
        bar::BarStatus,
        builder::{BarBuilder, ProgressBuilder},
        decor::{self, Statistics, WidthConfig, WidthSync},
        error::ProgressError,
        sync::WaitGroup,
        writer::FrameWriter,
    };

    /// Sends every flushed pass as a list of frames.
    struct Capture {
        passes: Sender<Vec<String>>,
        frames: Vec<String>,
    }

    impl Capture {
        fn new(passes: Sender<Vec<String>>) -> Self {
            Self {
                passes,
                frames: Vec::new(),
            }
        }
    }

    impl FrameWriter for Capture {
        fn write(&mut self, frame: &str) -> io::Result<()> {
            self.frames.push(frame.to_owned());
            Ok(())
        }

        fn flush(&mut self, _lines: usize) -> io::Result<()> {
            let _ = self.passes.send(std::mem::take(&mut self.frames));
            Ok(())
        }
    }

    struct Harness {
        progress: Progress,
        ticks: Sender<Instant>,
        passes: Receiver<Vec<String>>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with(ProgressBuilder::new())
        }

        fn with(builder: ProgressBuilder) -> Self {
            let (ticks, tick_rx) = unbounded();
            let (pass_tx, passes) = unbounded();
            let progress = builder
                .with_width(40)
                .with_manual_refresh(tick_rx)
                .with_writer(Capture::new(pass_tx))
                .build()
                .unwrap();
            Self {
                progress,
                ticks,
                passes,
            }
        }

        /// Ticks until a pass satisfies `pred`.
        fn until(&self, pred: impl Fn(&[String]) -> bool) -> Vec<String> {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                assert!(Instant::now() < deadline, "no matching render pass");
                self.ticks.send(Instant::now()).unwrap();
                if let Ok(pass) = self.passes.recv_timeout(Duration::from_millis(500)) {
                    if pred(&pass) {
                        return pass;
                    }
                }
            }
        }
    }

    /// Fails every write, still reporting each pass.
    struct Broken {
        passes: Sender<usize>,
    }

    impl FrameWriter for Broken {
        fn write(&mut self, _frame: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self, lines: usize) -> io::Result<()> {
            let _ = self.passes.send(lines);
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    /// Collects debug output.
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Shared {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    /// A 6-column bar with a synchronised label and no padding.
    fn labelled(label: &str) -> BarBuilder {
        BarBuilder::new()
            .with_width(6)
            .with_trim_left(true)
            .with_trim_right(true)
            .prepend(decor::name(label.to_owned(), WidthConfig::sync_left()))
    }

    /// Render Order
    /// Frames are written lowest priority first, regardless of creation order.
    #[test]
    fn test_priority_order() {
        let h = Harness::new();
        let _c = h.progress.add_bar(10, labelled("c").with_priority(3)).unwrap();
        let _a = h.progress.add_bar(10, labelled("a").with_priority(1)).unwrap();
        let _b = h.progress.add_bar(10, labelled("b").with_priority(2)).unwrap();

        let pass = h.until(|p| p.len() == 3);
        assert_eq!(pass, ["a[----]\n", "b[----]\n", "c[----]\n"]);
        assert_eq!(h.progress.bar_count(), 3);
    }

    /// Width Agreement
    /// Synchronised columns line up across bars at the widest submission.
    #[test]
    fn test_width_sync_aligns_columns() {
        let h = Harness::new();
        let _short = h.progress.add_bar(10, labelled("a")).unwrap();
        let long = h.progress.add_bar(10, labelled("abcde")).unwrap();
        long.incr_by(5);

        let pass = h.until(|p| p.len() == 2 && p[1].contains('>'));
        assert_eq!(pass, ["a    [----]\n", "abcde[=>--]\n"]);
    }

    /// Retirement
    /// A remove-on-complete bar leaves the display, a persistent one keeps its last frame,
    /// and both actors shut down.
    #[test]
    fn test_remove_on_complete_vs_persistent() {
        let h = Harness::new();
        let gone = h
            .progress
            .add_bar(1, labelled("g").with_remove_on_complete())
            .unwrap();
        let kept = h.progress.add_bar(1, labelled("k")).unwrap();
        gone.increment();
        kept.increment();

        let pass = h.until(|p| p.len() == 1);
        assert_eq!(pass, ["k[====]\n"]);

        h.progress.wait();
        assert_eq!(gone.status(), BarStatus::ShutDown);
        assert_eq!(kept.status(), BarStatus::ShutDown);
        assert_eq!(kept.current(), 1);
        assert!(matches!(
            h.progress.add_bar(1, BarBuilder::new()),
            Err(ProgressError::Closed)
        ));
        assert_eq!(h.progress.bar_count(), 0);
    }

    /// Priority Update
    /// Changing a queued bar's priority reorders the next pass.
    #[test]
    fn test_update_priority_reorders() {
        let h = Harness::new();
        let _a = h.progress.add_bar(10, labelled("a")).unwrap();
        let b = h.progress.add_bar(10, labelled("b")).unwrap();
        h.until(|p| p.len() == 2 && p[0].starts_with('a'));

        h.progress.update_bar_priority(&b, -1);
        h.until(|p| p.len() == 2 && p[0].starts_with('b'));
        assert_eq!(b.priority(), -1);
    }

    /// Fault Isolation
    /// A panicking decorator degrades only its own bar.
    #[test]
    fn test_decorator_panic_is_isolated() {
        let h = Harness::new();
        let boom = |_: &Statistics, _: &mut WidthSync<'_>| -> CompactString {
            panic!("bad decorator")
        };
        let bad = h
            .progress
            .add_bar(10, BarBuilder::new().with_priority(-1).prepend(boom))
            .unwrap();
        let good = h.progress.add_bar(10, labelled("g")).unwrap();

        let pass = h.until(|p| p.len() == 2);
        assert_eq!(pass, ["panic: bad decorator\n", "g[----]\n"]);
        assert!(bad.completed());

        good.incr_by(5);
        let pass = h.until(|p| p.len() == 2 && p[1].contains('>'));
        assert_eq!(pass, ["panic: bad decorator\n", "g[=>--]\n"]);
        assert!(!good.completed());
    }

    /// Abort
    /// An aborted bar with `remove` disappears and its actor shuts down.
    #[test]
    fn test_abort_removes_bar() {
        let h = Harness::new();
        let a = h.progress.add_bar(10, labelled("a")).unwrap();
        let _b = h.progress.add_bar(10, labelled("b")).unwrap();
        h.until(|p| p.len() == 2);

        h.progress.abort(&a, true);
        let pass = h.until(|p| p.len() == 1);
        assert_eq!(pass, ["b[----]\n"]);

        h.until(|_| a.status() == BarStatus::ShutDown);
        assert_eq!(h.progress.bar_count(), 1);
        assert!(!a.completed());
    }

    /// Chained Bars
    /// A successor appears only after its predecessor retires, at the predecessor's priority.
    #[test]
    fn test_successor_waits_for_predecessor() {
        let h = Harness::new();
        let a = h.progress.add_bar(1, labelled("a").with_priority(5)).unwrap();
        let b = h.progress.add_bar(1, labelled("b").after(&a)).unwrap();
        assert_eq!(b.priority(), 5);

        let pass = h.until(|p| !p.is_empty());
        assert_eq!(pass, ["a[----]\n"]);
        assert_eq!(h.progress.bar_count(), 1);

        a.increment();
        let pass = h.until(|p| p.len() == 2);
        assert!(pass.contains(&"b[----]\n".to_owned()));
        assert!(pass.contains(&"a[====]\n".to_owned()));
    }

    /// Late Successor
    /// A successor of an already retired bar is queued right away.
    #[test]
    fn test_successor_of_retired_bar_is_queued() {
        let h = Harness::new();
        let a = h.progress.add_bar(1, labelled("a")).unwrap();
        a.increment();
        h.until(|_| a.status() == BarStatus::ShutDown);

        let _b = h.progress.add_bar(1, labelled("b").after(&a)).unwrap();
        assert_eq!(h.progress.bar_count(), 2);
    }

    /// Unsynced Columns
    /// A decorator that does not synchronise leaves the shared column width alone.
    #[test]
    fn test_unsynced_decorator_does_not_widen_column() {
        let h = Harness::new();
        let bar = |label: &str, config| {
            BarBuilder::new()
                .with_width(4)
                .with_trim_left(true)
                .with_trim_right(true)
                .prepend(decor::name(label.to_owned(), config))
        };
        let _a = h
            .progress
            .add_bar(10, bar("a-very-long-label", WidthConfig::none()))
            .unwrap();
        let _b = h.progress.add_bar(10, bar("ab", WidthConfig::sync_left())).unwrap();

        let pass = h.until(|p| p.len() == 2);
        assert_eq!(pass, ["a-very-long-label[--]\n", "ab[--]\n"]);
    }

    /// Writer Failure
    /// A failing writer is reported on the debug output, rendering carries on, and completed
    /// bars still shut down so `wait` returns.
    #[test]
    fn test_writer_errors_do_not_stop_rendering() {
        let (ticks, tick_rx) = unbounded();
        let (pass_tx, passes) = unbounded();
        let debug = Shared::default();
        let progress = ProgressBuilder::new()
            .with_width(40)
            .with_manual_refresh(tick_rx)
            .with_writer(Broken { passes: pass_tx })
            .with_debug_output(debug.clone())
            .build()
            .unwrap();
        let bar = progress.add_bar(2, labelled("io")).unwrap();

        let tick = || {
            ticks.send(Instant::now()).unwrap();
            passes.recv_timeout(Duration::from_secs(5)).unwrap()
        };
        assert_eq!(tick(), 1);
        assert_eq!(tick(), 1);
        assert!(debug.text().contains("[multibar] failed to write frame: pipe closed"));

        bar.incr_by(2);
        let deadline = Instant::now() + Duration::from_secs(5);
        while bar.status() != BarStatus::ShutDown {
            assert!(Instant::now() < deadline, "bar never shut down");
            tick();
        }
        progress.wait();
        assert!(bar.completed());
    }

    /// Cancellation
    /// One cancel message completes every bar, including waiting successors and bars added
    /// afterwards, which lets `wait` return.
    #[test]
    fn test_cancel_completes_all_bars() {
        let (cancel_tx, cancel_rx) = unbounded::<()>();
        let h = Harness::with(ProgressBuilder::new().with_cancel(cancel_rx));
        let a = h.progress.add_bar(100, labelled("a")).unwrap();
        let b = h.progress.add_bar(100, labelled("b")).unwrap();
        let c = h.progress.add_bar(100, labelled("c").after(&a)).unwrap();
        a.incr_by(10);

        cancel_tx.send(()).unwrap();
        h.until(|_| a.completed() && b.completed());
        let d = h.progress.add_bar(100, labelled("d")).unwrap();

        let bars = [&a, &b, &c, &d];
        h.until(|_| bars.iter().all(|bar| bar.status() == BarStatus::ShutDown));
        h.progress.wait();
        assert_eq!(a.current(), 10);
        assert_eq!(d.current(), 0);
        drop(cancel_tx);
    }

    /// Concurrent Workers
    /// Workers increment from their own threads; `wait` joins them through the wait group and
    /// the shutdown notifier fires once rendering stops.
    #[test]
    fn test_wait_joins_workers_and_notifies() {
        let (note_tx, note_rx) = unbounded();
        let (pass_tx, passes) = unbounded();
        let wg = WaitGroup::new();
        let progress = ProgressBuilder::new()
            .with_refresh_rate(Duration::from_millis(10))
            .with_writer(Capture::new(pass_tx))
            .with_wait_group(wg.clone())
            .with_shutdown_notifier(note_tx)
            .build()
            .unwrap();

        wg.add(3);
        let workers: Vec<_> = (0..3)
            .map(|i| {
                let bar = progress.add_bar(5, labelled(&format!("w{i}"))).unwrap();
                let wg = wg.clone();
                thread::spawn(move || {
                    for _ in 0..5 {
                        bar.increment();
                        thread::sleep(Duration::from_millis(2));
                    }
                    wg.done();
                })
            })
            .collect();

        progress.wait();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(note_rx.recv_timeout(Duration::from_secs(1)).is_ok());
        let last = passes.try_iter().last().unwrap();
        assert_eq!(last.len(), 3);
        assert!(last.iter().all(|frame| frame.ends_with("[====]\n")));
    }
}
