//! # `multibar`
//!
//! Concurrent multi-bar progress rendering for terminals.
//!
//! `multibar` draws any number of progress bars to one output, refreshing them together at a
//! fixed rate while worker threads update them independently. It is designed to be:
//!
//! * **Concurrent**: Every bar is an actor on its own thread. [`Bar`] handles are cheap to clone
//!   and all updates are serialised through the bar's mailbox, so no caller ever holds a lock.
//! * **Aligned**: Decorator columns agree on a common width across bars every render pass.
//! * **Resilient**: A panicking decorator or filler degrades its own bar to an error line
//!   instead of taking down the display.
//!
//! ## Modules
//!
//! * [`progress`]: The [`Progress`] container and its render loop.
//! * [`bar`]: The [`Bar`] handle and actor.
//! * [`builder`]: Fluent configuration for containers and bars.
//! * [`decor`]: The [`Decorator`] trait, width synchronisation and built-in decorators.
//! * [`filler`]: Glyph span renderers: bars and spinners.
//! * [`writer`]: The [`FrameWriter`] output abstraction.
//! * [`io`]: [`std::io::Read`] and [`std::io::Write`] wrappers that advance a bar.
//! * [`iter`]: Extension traits for tracking progress on iterators.
//! * [`sync`]: A [`WaitGroup`] for joining workers with the container.
//!
//! ## Example
//!
//! ```no_run
//! use multibar::{BarBuilder, Progress, decor::{self, WidthConfig}};
//!
//! let progress = Progress::new()?;
//! let bar = progress.add_bar(
//!     100,
//!     BarBuilder::new()
//!         .prepend(decor::name("download", WidthConfig::sync_left()))
//!         .append(decor::percentage(WidthConfig::sync_right().with_min_width(5))),
//! )?;
//! for _ in 0..100 {
//!     bar.increment();
//! }
//! progress.wait();
//! # Ok::<(), multibar::ProgressError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod bar;
pub mod builder;
pub mod decor;
pub mod error;
pub mod filler;
pub mod io;
pub mod iter;
pub mod progress;
pub mod sync;
pub mod writer;

mod matrix;
mod queue;

pub use bar::{Bar, BarStatus};
pub use builder::{BarBuilder, ProgressBuilder};
pub use decor::{Decorator, Statistics, WidthSync};
pub use error::ProgressError;
pub use filler::{BarFiller, Filler, SpinnerFiller};
pub use iter::{BarIter, BarIteratorExt};
pub use progress::Progress;
pub use sync::WaitGroup;
pub use writer::{CursorWriter, FrameWriter};
