//! Fillers draw the central glyph span of a bar.
//!
//! The bar decides how many columns the span gets (see the draw step in [`crate::bar`]); a
//! [`Filler`] decides what goes into them. [`BarFiller`] is the classic `[===>---]` bar,
//! [`SpinnerFiller`] cycles through animation frames for work of unknown size.

use crate::decor::{Statistics, calc_percentage};

/// Glyph positions inside a [`BarRunes`] format string.
const LEFT: usize = 0;
const FILL: usize = 1;
const TIP: usize = 2;
const EMPTY: usize = 3;
const RIGHT: usize = 4;

/// Draws a bar's glyph span into `buf`.
pub trait Filler: Send {
    /// Appends exactly `width` columns (or fewer, if `width` is too small to be meaningful).
    fn fill(&mut self, buf: &mut String, width: usize, stats: &Statistics);

    /// Marks progress up to `refill.till` as carried over from an earlier run.
    ///
    /// Fillers without a notion of filled columns ignore it.
    fn set_refill(&mut self, _refill: Refill) {}
}

/// An alternate fill glyph applied from the start of the bar up to a progress point.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Refill {
    /// Glyph for the refilled part.
    pub glyph: char,
    /// Progress value the refilled part extends to.
    pub till: u64,
}

/// The five glyphs of a bar: left cap, fill, tip, empty, right cap.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BarRunes([char; 5]);

impl Default for BarRunes {
    fn default() -> Self {
        Self(['[', '=', '>', '-', ']'])
    }
}

impl BarRunes {
    /// Parses a five character format such as `"[=>-]"` or `"╢▌▌░╟"`.
    ///
    /// Returns `None` unless the string has exactly five characters.
    #[must_use]
    pub fn parse(format: &str) -> Option<Self> {
        let mut runes = [' '; 5];
        let mut chars = format.chars();
        for slot in &mut runes {
            *slot = chars.next()?;
        }
        chars.next().is_none().then_some(Self(runes))
    }
}

/// The default progress bar filler.
#[derive(Clone, Debug, Default)]
pub struct BarFiller {
    runes: BarRunes,
    refill: Option<Refill>,
}

impl BarFiller {
    /// Creates a filler drawing with `runes`.
    #[must_use]
    pub const fn new(runes: BarRunes) -> Self {
        Self {
            runes,
            refill: None,
        }
    }
}

impl Filler for BarFiller {
    fn fill(&mut self, buf: &mut String, width: usize, stats: &Statistics) {
        let runes = self.runes.0;
        buf.push(runes[LEFT]);
        if width <= 2 {
            buf.push(runes[RIGHT]);
            return;
        }

        let inner = width - 2;
        let completed = to_columns(calc_percentage(stats.total, stats.current, inner as u64));

        let refilled = self.refill.map_or(0, |refill| {
            to_columns(calc_percentage(stats.total, refill.till, inner as u64)).min(completed)
        });
        if let Some(refill) = self.refill {
            buf.extend(std::iter::repeat_n(refill.glyph, refilled));
        }
        buf.extend(std::iter::repeat_n(runes[FILL], completed - refilled));

        if completed > 0 && completed < inner {
            buf.pop();
            buf.push(runes[TIP]);
        }

        buf.extend(std::iter::repeat_n(runes[EMPTY], inner - completed));
        buf.push(runes[RIGHT]);
    }

    fn set_refill(&mut self, refill: Refill) {
        self.refill = Some(refill);
    }
}

fn to_columns(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Where a spinner frame sits inside its span.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpinnerAlignment {
    /// Frame first, padding after.
    #[default]
    Left,
    /// Padding split around the frame.
    Middle,
    /// Padding first, frame last.
    Right,
}

/// Default spinner frames.
pub const DEFAULT_SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Animates one frame per draw, ignoring progress.
#[derive(Clone, Debug)]
pub struct SpinnerFiller {
    frames: Vec<String>,
    alignment: SpinnerAlignment,
    count: usize,
}

impl Default for SpinnerFiller {
    fn default() -> Self {
        Self::new(SpinnerAlignment::default())
    }
}

impl SpinnerFiller {
    /// A spinner with the default frames.
    #[must_use]
    pub fn new(alignment: SpinnerAlignment) -> Self {
        Self::with_frames(DEFAULT_SPINNER_FRAMES, alignment)
    }

    /// A spinner with custom frames. An empty list falls back to the defaults.
    #[must_use]
    pub fn with_frames<I, S>(frames: I, alignment: SpinnerAlignment) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut frames: Vec<String> = frames.into_iter().map(Into::into).collect();
        if frames.is_empty() {
            frames = DEFAULT_SPINNER_FRAMES.iter().map(|f| (*f).to_owned()).collect();
        }
        Self {
            frames,
            alignment,
            count: 0,
        }
    }
}

impl Filler for SpinnerFiller {
    fn fill(&mut self, buf: &mut String, width: usize, _stats: &Statistics) {
        let frame = &self.frames[self.count % self.frames.len()];
        self.count = self.count.wrapping_add(1);

        let frame_width = frame.chars().count();
        if width < frame_width {
            return;
        }
        let free = width - frame_width;
        let (before, after) = match self.alignment {
            SpinnerAlignment::Left => (0, free),
            SpinnerAlignment::Middle => (free / 2, free - free / 2),
            SpinnerAlignment::Right => (free, 0),
        };
        buf.extend(std::iter::repeat_n(' ', before));
        buf.push_str(frame);
        buf.extend(std::iter::repeat_n(' ', after));
    }
}
