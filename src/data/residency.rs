//! Chunk residency ledger
//!
//! Every chunk loaded during a run is admitted through the ledger and
//! carries a guard until it is released. Admitting a second chunk while
//! one is still resident is a `MemoryBoundViolation`.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::error::{MemboostError, Result};

#[derive(Debug, Default)]
struct LedgerInner {
    live: AtomicUsize,
    peak: AtomicUsize,
    admitted: AtomicUsize,
}

/// Tracks how many chunk buffers are alive at once
#[derive(Debug, Clone, Default)]
pub struct ResidencyLedger {
    inner: Arc<LedgerInner>,
}

impl ResidencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit `data` as the resident chunk `index` covering `rows`
    pub fn admit<T>(&self, index: usize, rows: Range<usize>, data: T) -> Result<ResidentChunk<T>> {
        let live = self.inner.live.load(Ordering::SeqCst);
        if live > 0 {
            return Err(MemboostError::MemoryBoundViolation(format!(
                "chunk {} (rows {:?}) loaded while {} chunk(s) still resident",
                index, rows, live
            )));
        }
        let now = self.inner.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        self.inner.admitted.fetch_add(1, Ordering::SeqCst);
        trace!(chunk = index, rows = ?rows, "Chunk admitted");

        Ok(ResidentChunk {
            index,
            rows,
            data,
            guard: ResidencyGuard { inner: Arc::clone(&self.inner) },
        })
    }

    /// Chunks currently resident
    pub fn live(&self) -> usize {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Most chunks ever resident at once
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    /// Total chunks admitted
    pub fn admitted(&self) -> usize {
        self.inner.admitted.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct ResidencyGuard {
    inner: Arc<LedgerInner>,
}

impl Drop for ResidencyGuard {
    fn drop(&mut self) {
        self.inner.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Chunk data that counts against the residency ledger until dropped
#[derive(Debug)]
pub struct ResidentChunk<T> {
    index: usize,
    rows: Range<usize>,
    data: T,
    guard: ResidencyGuard,
}

impl<T> ResidentChunk<T> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    /// Transform the resident data, consuming the previous buffer
    pub fn try_map<U>(self, f: impl FnOnce(T) -> Result<U>) -> Result<ResidentChunk<U>> {
        let ResidentChunk { index, rows, data, guard } = self;
        Ok(ResidentChunk { index, rows, data: f(data)?, guard })
    }

    /// Free the chunk's buffers
    pub fn release(self) {
        trace!(chunk = self.index, "Chunk released");
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_chunks_allowed() {
        let ledger = ResidencyLedger::new();
        for i in 0..3 {
            let chunk = ledger.admit(i, i * 10..(i + 1) * 10, vec![0u8; 16]).unwrap();
            assert_eq!(ledger.live(), 1);
            chunk.release();
        }
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.peak(), 1);
        assert_eq!(ledger.admitted(), 3);
    }

    #[test]
    fn test_overlapping_chunks_rejected() {
        let ledger = ResidencyLedger::new();
        let _first = ledger.admit(0, 0..10, ()).unwrap();
        assert!(matches!(
            ledger.admit(1, 10..20, ()),
            Err(MemboostError::MemoryBoundViolation(_))
        ));
    }

    #[test]
    fn test_map_keeps_residency() {
        let ledger = ResidencyLedger::new();
        let chunk = ledger.admit(0, 0..4, vec![1, 2, 3, 4]).unwrap();
        let mapped = chunk.try_map(|v| Ok(v.len())).unwrap();
        assert_eq!(*mapped.data(), 4);
        assert_eq!(ledger.live(), 1);
        drop(mapped);
        assert_eq!(ledger.live(), 0);
    }
}
