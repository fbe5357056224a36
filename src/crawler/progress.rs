//! Phase-level progress reporting for snapshot loading.

use strum::{Display, EnumIter};

/// A step of [`crate::CachedSnapshot::load`], reported before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum CrawlPhase {
    /// Recording GC handle targets.
    Seed,
    /// Following references from the seeds through the heap.
    InstanceCrawl,
    /// Following references held in static storage.
    StaticCrawl,
    /// Filling the slots of GC handles that share a target.
    DuplicateReconciliation,
    /// Linking managed shells to native objects.
    CrossReference,
    /// Summing object sizes.
    Aggregate,
    /// Building the incoming and outgoing connection maps.
    ConnectionMaps,
}

/// Receives phase boundaries while a snapshot loads.
///
/// Implemented for any `FnMut(CrawlPhase)` closure and for [`NoProgress`].
pub trait CrawlProgress {
    /// Called once per phase, before the phase starts.
    fn phase(&mut self, phase: CrawlPhase);
}

impl<F: FnMut(CrawlPhase)> CrawlProgress for F {
    fn phase(&mut self, phase: CrawlPhase) {
        self(phase);
    }
}

/// Discards all progress reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl CrawlProgress for NoProgress {
    fn phase(&mut self, _phase: CrawlPhase) {}
}
