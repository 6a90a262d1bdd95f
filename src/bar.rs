//! The bar actor.
//!
//! Each [`Bar`] is a cheap, cloneable handle to a dedicated thread that owns the bar's mutable
//! state. Every operation on the handle becomes a command in the actor's mailbox, and the actor
//! runs commands one at a time in arrival order. That ordering is the only synchronisation
//! there is: no lock guards the state while the actor runs.
//!
//! # Lifecycle
//!
//! ```text
//! Running --(reaches total / external cancel / decorator fault)--> Completing
//! Completing --(container flushed the 100% frame, sends Shutdown)--> ShutDown
//! ```
//!
//! On shutdown the actor moves its state into a shared cache and stops accepting work. From
//! then on queries are answered from the cache, and the same thread keeps drawing render requests
//! from it, so a bar that stays on screen shows its final frame until every handle is dropped.

use std::{
    any::Any,
    fmt, io,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicIsize, Ordering},
    },
    thread,
    time::Duration,
};

use compact_str::{CompactString, format_compact};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use web_time::Instant;

use crate::{
    builder::BarBuilder,
    decor::{Decorator, Statistics, WidthSync, calc_percentage},
    filler::{Filler, Refill},
    io::{ProxyReader, ProxyWriter},
    matrix::{ColumnLink, SyncTable, abandon_all},
    queue::Prioritized,
    sync::{DoneGuard, WaitGroup},
    writer::DebugSink,
};

/// Smoothing constant of the per-item time estimate.
pub(crate) const ETA_ALPHA: f64 = 0.12;

/// Coarse lifecycle state of a bar.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BarStatus {
    /// Accepting progress.
    Running,
    /// Complete; waiting for its final frame to be flushed and the container to retire it.
    Completing,
    /// The actor has terminated; the state is frozen.
    ShutDown,
}

type Operation = Box<dyn FnOnce(&mut BarState) + Send>;

enum Command {
    Operate(Operation),
    Render(RenderJob),
    Shutdown,
}

/// Everything a new bar actor needs from its container.
#[derive(Clone)]
pub(crate) struct SpawnContext {
    pub(crate) width: usize,
    pub(crate) bars: WaitGroup,
}

/// One rendered bar, as handed to the container.
#[derive(Debug, Default)]
pub(crate) struct Frame {
    pub(crate) text: String,
    pub(crate) lines: usize,
    pub(crate) to_shutdown: bool,
    pub(crate) remove_on_complete: bool,
}

impl Frame {
    fn new(text: String) -> Self {
        Self {
            lines: text.matches('\n').count(),
            text,
            ..Default::default()
        }
    }
}

/// A handle to one progress bar.
///
/// Handles are cheap to clone and can be moved to any thread. All operations are serialised
/// through the bar's actor; once the bar has shut down, mutations are ignored and queries
/// return the final state.
#[derive(Clone)]
pub struct Bar {
    shared: Arc<Shared>,
}

struct Shared {
    id: usize,
    // Written only by the container thread.
    priority: AtomicI64,
    index: AtomicIsize,
    predecessor: Option<Bar>,
    mailbox: Sender<Command>,
    cache: Arc<Mutex<Option<BarState>>>,
}

impl fmt::Debug for Bar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bar")
            .field("id", &self.shared.id)
            .field("priority", &self.priority())
            .finish_non_exhaustive()
    }
}

impl Bar {
    /// Starts the actor thread for a new bar.
    pub(crate) fn spawn(
        id: usize,
        total: u64,
        filler: Box<dyn Filler>,
        options: BarBuilder,
        ctx: &SpawnContext,
    ) -> io::Result<Self> {
        let BarBuilder {
            width,
            runes: _,
            trim_left,
            trim_right,
            remove_on_complete,
            clear_on_complete,
            auto_increment,
            priority,
            predecessor,
            prepend,
            append,
        } = options;

        let (trigger, by) = auto_increment.unwrap_or_default();
        let state = BarState {
            id,
            width: width.unwrap_or(ctx.width),
            filler,
            total,
            current: 0,
            dynamic: total == 0 || auto_increment.is_some(),
            auto_incr_trigger: trigger,
            auto_incr_by: by,
            trim_left,
            trim_right,
            complete: false,
            complete_flushed: false,
            remove_on_complete,
            clear_on_complete,
            start: None,
            block_start: None,
            elapsed: Duration::ZERO,
            per_item: Duration::ZERO,
            remaining: Duration::ZERO,
            eta_alpha: ETA_ALPHA,
            prepend,
            append,
            fault: None,
        };

        #[allow(clippy::cast_possible_wrap)]
        let priority = predecessor
            .as_ref()
            .map_or_else(|| priority.unwrap_or(id as i64), Self::priority);

        let (mailbox, inbox) = unbounded();
        let cache = Arc::new(Mutex::new(None));
        let actor = Actor {
            state,
            inbox,
            cache: cache.clone(),
        };
        let bars = ctx.bars.clone();
        thread::Builder::new()
            .name(format!("multibar-bar-{id}"))
            .spawn(move || actor.run(DoneGuard(bars)))?;

        Ok(Self {
            shared: Arc::new(Shared {
                id,
                priority: AtomicI64::new(priority),
                index: AtomicIsize::new(-1),
                predecessor,
                mailbox,
                cache,
            }),
        })
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Shorthand for `incr_by(1)`.
    pub fn increment(&self) {
        self.incr_by(1);
    }

    /// Adds `n` to the current value and updates the time estimates.
    ///
    /// Reaching the total completes the bar, unless the total is dynamic, in which case it may
    /// be extended instead.
    pub fn incr_by(&self, n: u64) {
        let now = Instant::now();
        self.operate(move |s| s.incr_by(n, now));
    }

    /// Sets the total. Zero leaves it unchanged.
    ///
    /// `is_final` marks the total as known; until then it stays dynamic. A final total that the
    /// current value already reached completes the bar.
    pub fn set_total(&self, total: u64, is_final: bool) {
        self.operate(move |s| s.set_total(total, is_final));
    }

    /// Fixes the total at the current value and completes the bar.
    pub fn finish(&self) {
        self.operate(|s| {
            s.total = s.current;
            s.dynamic = false;
            s.complete = true;
        });
    }

    /// Starts a new measurement block for the time-per-item estimate.
    ///
    /// Call right before the work whose result is reported by the next increment, so that
    /// idle time between increments does not count. Also starts the clock on first use.
    pub fn start_block(&self) {
        let now = Instant::now();
        self.operate(move |s| s.start_block(now));
    }

    /// Draws progress up to `till` with `glyph`, e.g. work resumed from a previous run.
    ///
    /// Replaces any earlier refill. A zero `till` is ignored.
    pub fn resume_fill(&self, glyph: char, till: u64) {
        if till == 0 {
            return;
        }
        self.operate(move |s| s.filler.set_refill(Refill { glyph, till }));
    }

    /// Removes every prepend decorator.
    pub fn remove_all_prependers(&self) {
        self.operate(|s| s.prepend.clear());
    }

    /// Removes every append decorator.
    pub fn remove_all_appenders(&self) {
        self.operate(|s| s.append.clear());
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Creation-order id, unique within its container.
    #[must_use]
    pub fn id(&self) -> usize {
        self.shared.id
    }

    /// Render order key; lower is drawn first.
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.shared.priority.load(Ordering::Relaxed)
    }

    /// Sum of all increments, capped at a fixed total.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.query(|s| s.current)
    }

    /// Current target value.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.query(|s| s.total)
    }

    /// Whether the bar reached completion.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.query(|s| s.complete)
    }

    /// Number of prepend decorators.
    #[must_use]
    pub fn num_prependers(&self) -> usize {
        self.query(|s| s.prepend.len())
    }

    /// Number of append decorators.
    #[must_use]
    pub fn num_appenders(&self) -> usize {
        self.query(|s| s.append.len())
    }

    /// Snapshot of the statistics decorators see.
    #[must_use]
    pub fn statistics(&self) -> Statistics {
        self.query(BarState::statistics)
    }

    /// Lifecycle state.
    #[must_use]
    pub fn status(&self) -> BarStatus {
        self.ask(|s| {
            if s.complete {
                BarStatus::Completing
            } else {
                BarStatus::Running
            }
        })
        .unwrap_or(BarStatus::ShutDown)
    }

    /// Wraps a reader so that every read advances this bar by the bytes read.
    pub fn proxy_reader<R>(&self, inner: R) -> ProxyReader<R> {
        ProxyReader::new(inner, self.clone())
    }

    /// Wraps a writer so that every write advances this bar by the bytes written.
    pub fn proxy_writer<W>(&self, inner: W) -> ProxyWriter<W> {
        ProxyWriter::new(inner, self.clone())
    }

    // ========================================================================
    // Container side
    // ========================================================================

    pub(crate) fn predecessor(&self) -> Option<&Self> {
        self.shared.predecessor.as_ref()
    }

    pub(crate) fn decorator_counts(&self) -> (usize, usize) {
        self.query(|s| (s.prepend.len(), s.append.len()))
    }

    /// Completes the bar, leaving the actor running.
    pub(crate) fn cancel(&self) {
        self.operate(|s| s.complete = true);
    }

    /// Asks the bar for one frame, delivered on `reply`. Never blocks.
    pub(crate) fn render(
        &self,
        width: usize,
        table: Arc<SyncTable>,
        debug: DebugSink,
        reply: Sender<Frame>,
    ) {
        let job = RenderJob {
            width,
            table,
            debug,
            reply,
            pending: true,
        };
        // A rejected job is dropped here, which answers it with an empty frame.
        let _ = self.shared.mailbox.send(Command::Render(job));
    }

    /// Final command: the actor freezes its state into the cache.
    pub(crate) fn shutdown(&self) {
        let _ = self.shared.mailbox.send(Command::Shutdown);
    }

    fn operate(&self, op: impl FnOnce(&mut BarState) + Send + 'static) {
        let _ = self.shared.mailbox.send(Command::Operate(Box::new(op)));
    }

    /// Runs `f` on the live state, or `None` if the actor has terminated.
    fn ask<T: Send + 'static>(&self, f: fn(&BarState) -> T) -> Option<T> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.operate(move |s| {
            let _ = tx.send(f(s));
        });
        // The command is dropped unanswered if the actor exits first.
        rx.recv().ok()
    }

    fn query<T: Send + Default + 'static>(&self, f: fn(&BarState) -> T) -> T {
        self.ask(f)
            .unwrap_or_else(|| self.shared.cache.lock().as_ref().map(f).unwrap_or_default())
    }
}

impl Prioritized for Bar {
    fn priority(&self) -> i64 {
        Self::priority(self)
    }

    fn set_priority(&self, priority: i64) {
        self.shared.priority.store(priority, Ordering::Relaxed);
    }

    fn index(&self) -> Option<usize> {
        usize::try_from(self.shared.index.load(Ordering::Relaxed)).ok()
    }

    #[allow(clippy::cast_possible_wrap)]
    fn set_index(&self, index: Option<usize>) {
        let raw = index.map_or(-1, |i| i as isize);
        self.shared.index.store(raw, Ordering::Relaxed);
    }

    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

// ============================================================================
// Actor
// ============================================================================

struct Actor {
    state: BarState,
    inbox: Receiver<Command>,
    cache: Arc<Mutex<Option<BarState>>>,
}

impl Actor {
    fn run(self, done: DoneGuard) {
        let Self {
            mut state,
            inbox,
            cache,
        } = self;

        let shutdown = loop {
            match inbox.recv() {
                Ok(Command::Operate(op)) => op(&mut state),
                Ok(Command::Render(job)) => job.run(&mut state),
                Ok(Command::Shutdown) => break true,
                Err(_) => break false,
            }
        };

        tracing::debug!(bar = state.id, "bar shut down");
        *cache.lock() = Some(state);
        drop(done);
        if !shutdown {
            return;
        }

        // Frozen: queries are dropped unanswered and fall back to the cache, while render
        // requests keep being drawn from it until every handle is gone.
        for cmd in &inbox {
            if let Command::Render(job) = cmd {
                job.run_cached(&cache);
            }
        }
    }
}

/// A render request. Dropping it unanswered abandons its width links and replies with an
/// empty frame, so the render pass never waits on a bar that is gone.
pub(crate) struct RenderJob {
    width: usize,
    table: Arc<SyncTable>,
    debug: DebugSink,
    reply: Sender<Frame>,
    pending: bool,
}

impl RenderJob {
    fn run(mut self, state: &mut BarState) {
        self.pending = false;
        let frame = state.render(self.width, &self.table, &self.debug);
        let _ = self.reply.send(frame);
    }

    fn run_cached(mut self, cache: &Mutex<Option<BarState>>) {
        let mut cached = cache.lock();
        let Some(state) = cached.as_mut() else {
            return;
        };
        self.pending = false;
        let frame = state.render_cached(self.width, &self.table, &self.debug);
        drop(cached);
        let _ = self.reply.send(frame);
    }
}

impl Drop for RenderJob {
    fn drop(&mut self) {
        if self.pending {
            self.table.abandon();
            let _ = self.reply.send(Frame::default());
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// The private state owned by a bar actor.
pub(crate) struct BarState {
    id: usize,
    width: usize,
    filler: Box<dyn Filler>,
    total: u64,
    current: u64,
    dynamic: bool,
    auto_incr_trigger: u64,
    auto_incr_by: u64,
    trim_left: bool,
    trim_right: bool,
    complete: bool,
    complete_flushed: bool,
    remove_on_complete: bool,
    clear_on_complete: bool,
    start: Option<Instant>,
    block_start: Option<Instant>,
    elapsed: Duration,
    per_item: Duration,
    remaining: Duration,
    eta_alpha: f64,
    prepend: Vec<Box<dyn Decorator>>,
    append: Vec<Box<dyn Decorator>>,
    fault: Option<CompactString>,
}

impl BarState {
    fn incr_by(&mut self, n: u64, now: Instant) {
        if n == 0 {
            return;
        }
        let start = *self.start.get_or_insert(now);
        let block = now.saturating_duration_since(self.block_start.unwrap_or(start));
        self.block_start = Some(now);

        self.current = self.current.saturating_add(n);
        self.elapsed = now.saturating_duration_since(start);
        self.update_estimate(n, block);

        if self.dynamic {
            let headroom = 100u64.saturating_sub(calc_percentage(self.total, self.current, 100));
            if headroom <= self.auto_incr_trigger {
                self.total = self.total.saturating_add(self.auto_incr_by);
            }
        } else if self.current >= self.total {
            self.current = self.total;
            self.complete = true;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn update_estimate(&mut self, n: u64, block: Duration) {
        let last = block.as_secs_f64() / n as f64;
        let estimate =
            self.eta_alpha * last + (1.0 - self.eta_alpha) * self.per_item.as_secs_f64();
        self.per_item = Duration::try_from_secs_f64(estimate).unwrap_or(Duration::MAX);

        let left = self.total.saturating_sub(self.current) as f64;
        self.remaining = Duration::try_from_secs_f64(left * estimate).unwrap_or(Duration::MAX);
    }

    fn set_total(&mut self, total: u64, is_final: bool) {
        if total != 0 {
            self.total = total;
        }
        self.dynamic = !is_final;
        if is_final && self.total > 0 && self.current >= self.total {
            self.current = self.total;
            self.complete = true;
        }
    }

    fn start_block(&mut self, now: Instant) {
        self.start.get_or_insert(now);
        self.block_start = Some(now);
    }

    fn statistics(&self) -> Statistics {
        Statistics {
            id: self.id,
            completed: self.complete_flushed,
            total: self.total,
            current: self.current,
            start: self.start,
            elapsed: self.elapsed,
            remaining: self.remaining,
            per_item: self.per_item,
        }
    }

    /// Produces one frame and advances the completion handshake.
    ///
    /// The first frame rendered after completion is flagged `to_shutdown`; every later frame
    /// reports `completed` in its statistics.
    fn render(&mut self, width: usize, table: &SyncTable, debug: &DebugSink) -> Frame {
        let width = if width == 0 { self.width } else { width };
        let text = if let Some(msg) = &self.fault {
            table.abandon();
            fault_line(msg, width)
        } else {
            match self.draw(width, table) {
                Ok(text) => text,
                Err(msg) => self.on_fault(msg, width, debug),
            }
        };

        let mut frame = Frame::new(text);
        frame.to_shutdown = self.complete && !self.complete_flushed;
        frame.remove_on_complete = self.remove_on_complete;
        self.complete_flushed = self.complete;
        frame
    }

    /// Renders a terminated bar: same text, no lifecycle signals.
    fn render_cached(&mut self, width: usize, table: &SyncTable, debug: &DebugSink) -> Frame {
        let mut frame = self.render(width, table, debug);
        frame.to_shutdown = false;
        frame.remove_on_complete = false;
        frame
    }

    fn on_fault(&mut self, msg: CompactString, width: usize, debug: &DebugSink) -> String {
        tracing::warn!(bar = self.id, "{msg}");
        debug.line(format_args!("bar id {:02} {msg}", self.id));
        self.prepend.clear();
        self.append.clear();
        self.complete = true;
        let line = fault_line(&msg, width);
        self.fault = Some(msg);
        line
    }

    fn draw(&mut self, width: usize, table: &SyncTable) -> Result<String, CompactString> {
        let stats = self.statistics();

        let prepend = match decorate(&mut self.prepend, &table.prepend, &stats) {
            Ok(text) => text,
            Err(msg) => {
                abandon_all(&table.append);
                return Err(msg);
            }
        };
        let append = decorate(&mut self.append, &table.append, &stats)?;

        let mut line = String::with_capacity(prepend.len() + self.width + append.len() + 1);
        line.push_str(&prepend);

        if !(self.clear_on_complete && self.complete_flushed) {
            let decorated = prepend.chars().count() + append.chars().count();
            let spaces = usize::from(!self.trim_left) + usize::from(!self.trim_right);
            let span = if decorated + self.width + spaces > width {
                width.saturating_sub(decorated + spaces)
            } else {
                self.width
            };
            line.push_str(&self.fill(span, &stats)?);
        }

        line.push_str(&append);
        line.push('\n');
        Ok(line)
    }

    fn fill(&mut self, width: usize, stats: &Statistics) -> Result<String, CompactString> {
        let mut buf = String::with_capacity(width + 2);
        if !self.trim_left {
            buf.push(' ');
        }
        let filler = &mut self.filler;
        panic::catch_unwind(AssertUnwindSafe(|| filler.fill(&mut buf, width, stats)))
            .map_err(|payload| panic_message(payload.as_ref()))?;
        if !self.trim_right {
            buf.push(' ');
        }
        Ok(buf)
    }
}

/// Runs one decorator chain, taking part in every wired column exactly once.
///
/// After a fault the remaining columns are abandoned instead of drawn.
fn decorate(
    chain: &mut [Box<dyn Decorator>],
    links: &[ColumnLink],
    stats: &Statistics,
) -> Result<String, CompactString> {
    let mut out = String::new();
    let mut fault = None;

    for (column, decorator) in chain.iter_mut().enumerate() {
        let mut sync = WidthSync::new(links.get(column));
        if fault.is_some() {
            sync.abandon();
            continue;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| decorator.decor(stats, &mut sync))) {
            Ok(text) => {
                sync.abandon();
                out.push_str(&text);
            }
            Err(payload) => {
                sync.abandon();
                fault = Some(panic_message(payload.as_ref()));
            }
        }
    }
    abandon_all(links.get(chain.len()..).unwrap_or_default());

    fault.map_or(Ok(out), Err)
}

fn panic_message(payload: &(dyn Any + Send)) -> CompactString {
    let msg = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown fault");
    format_compact!("panic: {msg}")
}

/// The message truncated to one terminal line.
fn fault_line(msg: &str, width: usize) -> String {
    msg.chars()
        .filter(|c| *c != '\n')
        .take(width)
        .chain(std::iter::once('\n'))
        .collect()
}
