//! Cross-bar column width agreement.
//!
//! Every bar draws its decorators independently, yet column `k` of every bar's prepend (or
//! append) chain should come out equally wide. Once per render pass and per column, each
//! participating bar submits its natural width over a [`ColumnLink`], the container-side
//! [`SyncMatrix`] reduces the submissions with `max`, and broadcasts the result back. No bar
//! proceeds past a column until every participant has submitted to it.
//!
//! Bars walk their columns in a fixed order (prepend `0..n`, then append `0..m`) and the
//! container coordinates in the same order, so a single coordinating thread is enough.
//!
//! The wiring depends on which bars are queued, so the container rebuilds both matrices
//! whenever queue membership changes.

use crossbeam_channel::{Receiver, Sender, bounded};

/// The bar side of one column's barrier.
#[derive(Clone, Debug)]
pub(crate) struct ColumnLink {
    submit: Sender<usize>,
    receive: Receiver<usize>,
}

impl ColumnLink {
    /// Submits `width` and blocks for the column maximum.
    ///
    /// Falls back to `width` if the coordinator went away.
    pub(crate) fn exchange(&self, width: usize) -> usize {
        self.discard_stale();
        if self.submit.send(width).is_err() {
            return width;
        }
        self.receive.recv().unwrap_or(width)
    }

    /// Submits a zero width without waiting for the reply.
    ///
    /// Used by bars that have nothing to draw in this column; the unread reply is discarded
    /// at the start of the next exchange.
    pub(crate) fn abandon(&self) {
        self.discard_stale();
        let _ = self.submit.try_send(0);
    }

    fn discard_stale(&self) {
        while self.receive.try_recv().is_ok() {}
    }
}

/// One bar's links for both decorator sides, indexed by column.
#[derive(Clone, Debug, Default)]
pub(crate) struct SyncTable {
    pub(crate) prepend: Vec<ColumnLink>,
    pub(crate) append: Vec<ColumnLink>,
}

impl SyncTable {
    /// Abandons every link on both sides.
    pub(crate) fn abandon(&self) {
        abandon_all(&self.prepend);
        abandon_all(&self.append);
    }
}

pub(crate) fn abandon_all(links: &[ColumnLink]) {
    for link in links {
        link.abandon();
    }
}

/// Coordinator end of one participant in a column.
#[derive(Debug)]
struct Endpoint {
    gather: Receiver<usize>,
    scatter: Sender<usize>,
}

/// Coordinator side of every column for one decorator side.
#[derive(Debug, Default)]
pub(crate) struct SyncMatrix {
    columns: Vec<Vec<Endpoint>>,
}

impl SyncMatrix {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of columns with at least one participant.
    pub(crate) fn width(&self) -> usize {
        self.columns.len()
    }

    /// Number of participants in `column`.
    #[cfg(test)]
    pub(crate) fn participants(&self, column: usize) -> usize {
        self.columns.get(column).map_or(0, Vec::len)
    }

    /// Registers a participant for columns `0..count` and returns its links.
    pub(crate) fn join(&mut self, count: usize) -> Vec<ColumnLink> {
        if self.columns.len() < count {
            self.columns.resize_with(count, Vec::new);
        }
        self.columns[..count]
            .iter_mut()
            .map(|column| {
                let (submit, gather) = bounded(1);
                let (scatter, receive) = bounded(1);
                column.push(Endpoint { gather, scatter });
                ColumnLink { submit, receive }
            })
            .collect()
    }

    /// Runs the barrier for every column in order.
    ///
    /// Blocks until every participant submitted to a column before broadcasting its maximum.
    /// Participants whose link was dropped are skipped.
    pub(crate) fn synchronize(&self) {
        for column in &self.columns {
            let max = column
                .iter()
                .filter_map(|endpoint| endpoint.gather.recv().ok())
                .max()
                .unwrap_or(0);
            for endpoint in column {
                let _ = endpoint.scatter.try_send(max);
            }
        }
    }
}
