//! Iterator adapters for automatic progress tracking.
//!
//! [`BarIteratorExt`] attaches a bar to any [`Iterator`]: every yielded item advances the bar by
//! one, and exhausting the iterator fixes the total at the final count and completes the bar.
//!
//! # Heuristics
//!
//! [`progress_in`](BarIteratorExt::progress_in) reads [`Iterator::size_hint`]: an exact size
//! becomes the bar's total, anything else starts the bar with a dynamic total.
//!
//! # Example
//!
//! ```no_run
//! use multibar::{BarBuilder, BarIteratorExt, Progress};
//!
//! let progress = Progress::new()?;
//! for item in vec![1, 2, 3].into_iter().progress_in(&progress, BarBuilder::new())? {
//!     // ...
//! #   let _ = item;
//! }
//! progress.wait();
//! # Ok::<(), multibar::ProgressError>(())
//! ```

use crate::{bar::Bar, builder::BarBuilder, error::ProgressError, progress::Progress};

/// An iterator that advances a [`Bar`] on every item.
pub struct BarIter<I> {
    iter: I,
    bar: Bar,
    finished: bool,
}

impl<I> BarIter<I> {
    /// Wraps `iter`. Usually constructed via [`BarIteratorExt`].
    pub const fn new(iter: I, bar: Bar) -> Self {
        Self {
            iter,
            bar,
            finished: false,
        }
    }

    /// The bar being advanced.
    #[must_use]
    pub const fn bar(&self) -> &Bar {
        &self.bar
    }
}

impl<I: Iterator> Iterator for BarIter<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.iter.next();
        match item {
            Some(_) => self.bar.increment(),
            None if !self.finished => {
                self.finished = true;
                self.bar.finish();
            }
            None => {}
        }
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

/// Extension trait attaching bars to iterators.
pub trait BarIteratorExt: Iterator + Sized {
    /// Advances an existing bar.
    fn progress_with(self, bar: Bar) -> BarIter<Self>;

    /// Adds a new bar to `progress`, sized from [`Iterator::size_hint`].
    ///
    /// # Errors
    ///
    /// Fails like [`Progress::add_bar`].
    fn progress_in(
        self,
        progress: &Progress,
        options: BarBuilder,
    ) -> Result<BarIter<Self>, ProgressError>;
}

impl<I: Iterator> BarIteratorExt for I {
    fn progress_with(self, bar: Bar) -> BarIter<Self> {
        BarIter::new(self, bar)
    }

    fn progress_in(
        self,
        progress: &Progress,
        options: BarBuilder,
    ) -> Result<BarIter<Self>, ProgressError> {
        let total = match self.size_hint() {
            (lower, Some(upper)) if lower == upper => lower as u64,
            _ => 0,
        };
        let bar = progress.add_bar(total, options)?;
        Ok(BarIter::new(self, bar))
    }
}
