//! Decorators: the column text drawn to the left and right of a bar.
//!
//! A [`Decorator`] turns an immutable [`Statistics`] snapshot into text. To line up with the same
//! column of every other bar, it may call [`WidthSync::sync`] once with its natural width and
//! render at the width it gets back, which is the widest submission across all bars this pass.
//!
//! The built-in decorators in this module all take a [`WidthConfig`] that decides alignment,
//! minimum width and whether the column takes part in synchronisation.

use std::time::Duration;

use compact_str::{CompactString, format_compact};
use web_time::Instant;

use crate::matrix::ColumnLink;

/// Plain-data view of a bar's progress, handed to decorators and fillers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Statistics {
    /// Creation-order id of the bar.
    pub id: usize,
    /// Whether the bar's 100% frame has already been flushed.
    pub completed: bool,
    /// Target value.
    pub total: u64,
    /// Current value.
    pub current: u64,
    /// Time of the first activity, if any.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub start: Option<Instant>,
    /// Time between the first activity and the latest increment.
    pub elapsed: Duration,
    /// Estimated time until `current` reaches `total`.
    pub remaining: Duration,
    /// Smoothed time per unit of progress.
    pub per_item: Duration,
}

impl Statistics {
    /// Completion as a whole percentage, `0..=100`.
    #[must_use]
    pub fn percentage(&self) -> u64 {
        calc_percentage(self.total, self.current, 100)
    }
}

/// Scales `current / total` onto `0..=width`, rounding to the nearest column.
///
/// A zero `total` yields zero; `current >= total` yields `width`.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn calc_percentage(total: u64, current: u64, width: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    if current >= total {
        return width;
    }
    let percent = current as f64 / total as f64 * 100.0;
    let scaled = (percent * width as f64 / 100.0).round() as u64;
    scaled.min(width)
}

/// The bar side of one column's width barrier, handed to [`Decorator::decor`].
///
/// Only the first [`sync`](Self::sync) call per render takes part in the barrier. A decorator
/// that never calls it submits zero, so it neither waits nor widens the column.
pub struct WidthSync<'a> {
    link: Option<&'a ColumnLink>,
    synced: bool,
}

impl<'a> WidthSync<'a> {
    pub(crate) const fn new(link: Option<&'a ColumnLink>) -> Self {
        Self {
            link,
            synced: false,
        }
    }

    /// A handle that is not wired to any barrier; [`sync`](Self::sync) echoes its input.
    #[must_use]
    pub const fn detached() -> Self {
        Self::new(None)
    }

    /// Submits `width` and returns the widest width any bar submitted for this column.
    ///
    /// Blocks until every bar sharing the column has submitted.
    pub fn sync(&mut self, width: usize) -> usize {
        if self.synced {
            return width;
        }
        self.synced = true;
        self.link.map_or(width, |link| link.exchange(width))
    }

    /// Submits zero without waiting, unless already synchronised.
    pub(crate) fn abandon(&mut self) {
        if !self.synced {
            self.synced = true;
            if let Some(link) = self.link {
                link.abandon();
            }
        }
    }
}

/// Produces one column of text for a bar.
///
/// Implementations must not block except inside [`WidthSync::sync`]. Closures with a matching
/// signature implement this trait.
pub trait Decorator: Send {
    /// Renders this column for the given snapshot.
    fn decor(&mut self, stats: &Statistics, sync: &mut WidthSync<'_>) -> CompactString;
}

impl<F> Decorator for F
where
    F: FnMut(&Statistics, &mut WidthSync<'_>) -> CompactString + Send,
{
    fn decor(&mut self, stats: &Statistics, sync: &mut WidthSync<'_>) -> CompactString {
        self(stats, sync)
    }
}

/// Horizontal alignment inside a padded column.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Align {
    /// Pad on the right.
    #[default]
    Left,
    /// Pad on the left.
    Right,
}

/// Width policy shared by the built-in decorators.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WidthConfig {
    /// Where padding goes.
    pub align: Align,
    /// Lower bound on the rendered width.
    pub min_width: usize,
    /// Whether the column takes part in cross-bar width agreement.
    pub sync: bool,
}

impl WidthConfig {
    /// Unsynchronised, left aligned, no minimum.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            align: Align::Left,
            min_width: 0,
            sync: false,
        }
    }

    /// Synchronised and left aligned.
    #[must_use]
    pub const fn sync_left() -> Self {
        Self {
            align: Align::Left,
            min_width: 0,
            sync: true,
        }
    }

    /// Synchronised and right aligned.
    #[must_use]
    pub const fn sync_right() -> Self {
        Self {
            align: Align::Right,
            min_width: 0,
            sync: true,
        }
    }

    /// Sets the minimum width.
    #[must_use]
    pub const fn with_min_width(mut self, min_width: usize) -> Self {
        self.min_width = min_width;
        self
    }

    /// Pads `text` according to this policy, synchronising if enabled.
    pub fn format(&self, text: &str, sync: &mut WidthSync<'_>) -> CompactString {
        let natural = text.chars().count().max(self.min_width);
        let width = if self.sync {
            sync.sync(natural)
        } else {
            natural
        };
        pad(text, width, self.align)
    }
}

/// Pads `text` with spaces to `width` characters. Longer text is returned as is.
#[must_use]
pub fn pad(text: &str, width: usize, align: Align) -> CompactString {
    let fill = width.saturating_sub(text.chars().count());
    let mut out = CompactString::with_capacity(text.len() + fill);
    if align == Align::Right {
        out.extend(std::iter::repeat_n(' ', fill));
    }
    out.push_str(text);
    if align == Align::Left {
        out.extend(std::iter::repeat_n(' ', fill));
    }
    out
}

/// Static text, e.g. a task label.
pub fn name(text: impl Into<CompactString>, wc: WidthConfig) -> impl Decorator {
    let text = text.into();
    move |_: &Statistics, sync: &mut WidthSync<'_>| wc.format(&text, sync)
}

/// Completion percentage, e.g. `42 %`.
pub fn percentage(wc: WidthConfig) -> impl Decorator {
    move |stats: &Statistics, sync: &mut WidthSync<'_>| {
        wc.format(&format_compact!("{} %", stats.percentage()), sync)
    }
}

/// Current and total, e.g. `42 / 100`.
pub fn counters(wc: WidthConfig) -> impl Decorator {
    move |stats: &Statistics, sync: &mut WidthSync<'_>| {
        wc.format(&format_compact!("{} / {}", stats.current, stats.total), sync)
    }
}

/// Elapsed time as `[h:]mm:ss`.
pub fn elapsed(wc: WidthConfig) -> impl Decorator {
    move |stats: &Statistics, sync: &mut WidthSync<'_>| {
        wc.format(&format_clock(stats.elapsed), sync)
    }
}

/// Estimated time remaining as `[h:]mm:ss`; blank once the bar is complete.
pub fn eta(wc: WidthConfig) -> impl Decorator {
    move |stats: &Statistics, sync: &mut WidthSync<'_>| {
        let text = if stats.completed {
            CompactString::default()
        } else {
            format_clock(stats.remaining)
        };
        wc.format(&text, sync)
    }
}

/// Formats a duration as `mm:ss`, or `h:mm:ss` past one hour.
#[must_use]
pub fn format_clock(d: Duration) -> CompactString {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format_compact!("{h}:{m:02}:{s:02}")
    } else {
        format_compact!("{m:02}:{s:02}")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        Align, Decorator, Statistics, WidthConfig, WidthSync, calc_percentage, counters,
        format_clock, name, pad, percentage,
    };

    fn stats(current: u64, total: u64) -> Statistics {
        Statistics {
            id: 0,
            total,
            current,
            ..Default::default()
        }
    }

    /// Percentage Math
    /// Rounds to the nearest column and saturates at the edges.
    #[test]
    fn test_calc_percentage() {
        assert_eq!(calc_percentage(0, 10, 50), 0);
        assert_eq!(calc_percentage(100, 0, 10), 0);
        assert_eq!(calc_percentage(100, 100, 10), 10);
        assert_eq!(calc_percentage(100, 250, 10), 10);
        assert_eq!(calc_percentage(100, 44, 10), 4);
        assert_eq!(calc_percentage(100, 45, 10), 5);
        assert_eq!(calc_percentage(3, 1, 100), 33);
    }

    /// Padding
    /// Left/right alignment pads on the opposite side and never truncates.
    #[test]
    fn test_pad() {
        assert_eq!(pad("ab", 5, Align::Left), "ab   ");
        assert_eq!(pad("ab", 5, Align::Right), "   ab");
        assert_eq!(pad("abcdef", 3, Align::Right), "abcdef");
    }

    /// Built-ins
    /// Detached handles render at natural or minimum width.
    #[test]
    fn test_builtin_decorators() {
        let mut sync = WidthSync::detached();
        let mut pct = percentage(WidthConfig::sync_right().with_min_width(6));
        assert_eq!(pct.decor(&stats(42, 100), &mut sync), "  42 %");

        let mut sync = WidthSync::detached();
        let mut cnt = counters(WidthConfig::none());
        assert_eq!(cnt.decor(&stats(3, 9), &mut sync), "3 / 9");

        let mut sync = WidthSync::detached();
        let mut label = name("job", WidthConfig::none().with_min_width(5));
        assert_eq!(label.decor(&stats(0, 1), &mut sync), "job  ");
    }

    /// Clock
    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(Duration::from_secs(0)), "00:00");
        assert_eq!(format_clock(Duration::from_secs(75)), "01:15");
        assert_eq!(format_clock(Duration::from_secs(3_726)), "1:02:06");
    }
}
