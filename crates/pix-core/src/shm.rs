//! Fixed-layout shared-memory region holding the ticker lattice and the
//! composite index vector.
//!
//! # Memory layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ tickers[NUM_EXCHANGES][MAX_SYMBOLS]   (row-major TickerData) │
//! ├──────────────────────────────────────────────────────────────┤
//! │ indices[MAX_SYMBOLS]                  (PriceIndex)           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The region is a regular file in the working directory, truncated to
//! exactly `size_of::<ShmLayout>()` and mapped shared. This process is the
//! single writer; readers attach read-only and tolerate stale values.
//!
//! There are no locks. Cell `[e][j]` of the lattice is written only by the
//! session owning exchange row `e`, and the index vector only by the index
//! engine, so writers never race each other. Readers may observe a
//! half-updated cell; every field is stored as a naturally aligned 64-bit
//! (or 32-bit) atomic with `Relaxed` ordering, so a concurrent read yields
//! either the old or the new value of each field, never a splice. The
//! cross-thread ordering the index engine relies on comes from the update
//! channel (release on send, acquire on receive).

use std::fs::OpenOptions;
use std::mem::size_of;
use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use memmap2::{Mmap, MmapMut};

use crate::error::PixError;
use crate::types::{Exchange, NUM_EXCHANGES, PriceIndex, TickerData};

/// Preallocated symbol columns per exchange row.
pub const MAX_SYMBOLS: usize = 128;

/// One lattice cell. Same byte layout as [`TickerData`]: the atomics carry
/// `f64::to_bits` and have the size and alignment of plain `u64`s.
#[repr(C)]
pub struct TickerCell {
    bid: AtomicU64,
    ask: AtomicU64,
    bid_qty: AtomicU64,
    ask_qty: AtomicU64,
}

impl TickerCell {
    #[inline]
    pub fn store(&self, t: TickerData) {
        self.bid.store(t.bid.to_bits(), Ordering::Relaxed);
        self.ask.store(t.ask.to_bits(), Ordering::Relaxed);
        self.bid_qty.store(t.bid_qty.to_bits(), Ordering::Relaxed);
        self.ask_qty.store(t.ask_qty.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn load(&self) -> TickerData {
        TickerData {
            bid: f64::from_bits(self.bid.load(Ordering::Relaxed)),
            ask: f64::from_bits(self.ask.load(Ordering::Relaxed)),
            bid_qty: f64::from_bits(self.bid_qty.load(Ordering::Relaxed)),
            ask_qty: f64::from_bits(self.ask_qty.load(Ordering::Relaxed)),
        }
    }
}

/// One index slot. Same byte layout as [`PriceIndex`]; the 4 bytes after
/// `count` are padding.
#[repr(C)]
pub struct IndexCell {
    val: AtomicU64,
    count: AtomicI32,
    _pad: u32,
    bid_vwap: AtomicU64,
    ask_vwap: AtomicU64,
    bid_qty_total: AtomicU64,
    ask_qty_total: AtomicU64,
}

impl IndexCell {
    #[inline]
    pub fn load(&self) -> PriceIndex {
        PriceIndex::new(
            f64::from_bits(self.val.load(Ordering::Relaxed)),
            self.count.load(Ordering::Relaxed),
            f64::from_bits(self.bid_vwap.load(Ordering::Relaxed)),
            f64::from_bits(self.ask_vwap.load(Ordering::Relaxed)),
            f64::from_bits(self.bid_qty_total.load(Ordering::Relaxed)),
            f64::from_bits(self.ask_qty_total.load(Ordering::Relaxed)),
        )
    }

    #[inline]
    pub fn val(&self) -> f64 {
        f64::from_bits(self.val.load(Ordering::Relaxed))
    }

    /// Publish a full recompute result.
    #[inline]
    pub fn commit(&self, ix: PriceIndex) {
        self.val.store(ix.val.to_bits(), Ordering::Relaxed);
        self.count.store(ix.count, Ordering::Relaxed);
        self.bid_vwap.store(ix.bid_vwap.to_bits(), Ordering::Relaxed);
        self.ask_vwap.store(ix.ask_vwap.to_bits(), Ordering::Relaxed);
        self.bid_qty_total.store(ix.bid_qty_total.to_bits(), Ordering::Relaxed);
        self.ask_qty_total.store(ix.ask_qty_total.to_bits(), Ordering::Relaxed);
    }

    /// No venue contributes: only `val` becomes `NaN`; `count` and the
    /// remaining fields keep their previous values.
    #[inline]
    pub fn invalidate(&self) {
        self.val.store(f64::NAN.to_bits(), Ordering::Relaxed);
    }
}

/// The complete mapped record.
#[repr(C)]
pub struct ShmLayout {
    pub tickers: [[TickerCell; MAX_SYMBOLS]; NUM_EXCHANGES],
    pub indices: [IndexCell; MAX_SYMBOLS],
}

/// Writer-side handle: the single mutable view of the region.
///
/// Dropping the region unmaps it; the backing file is left in place so that
/// readers surviving a restart see the prior snapshot.
pub struct ShmRegion {
    map: MmapMut,
}

impl ShmRegion {
    /// Open (or create) the backing file, truncate it to exactly the layout
    /// size, map it shared, and reset every ticker cell and index `val` to
    /// `NaN` (remaining index fields to zero).
    pub fn create(path: &Path) -> Result<Self, PixError> {
        let size = size_of::<ShmLayout>();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| PixError::Shm(format!("open {}: {e}", path.display())))?;
        file.set_len(size as u64)
            .map_err(|e| PixError::Shm(format!("truncate {}: {e}", path.display())))?;

        // SAFETY: the file stays open for the lifetime of the mapping and no
        // other process writes it (single-writer by convention).
        let map = unsafe { MmapMut::map_mut(&file) }
            .map_err(|e| PixError::Shm(format!("mmap {}: {e}", path.display())))?;

        let region = Self { map };
        for row in &region.layout().tickers {
            for cell in row {
                cell.store(TickerData::EMPTY);
            }
        }
        for cell in &region.layout().indices {
            cell.commit(PriceIndex::EMPTY);
        }
        Ok(region)
    }

    #[inline]
    fn layout(&self) -> &ShmLayout {
        // SAFETY: the mapping is exactly size_of::<ShmLayout>() bytes and
        // page-aligned; the layout is atomics and plain integers, for which
        // every bit pattern is valid.
        unsafe { &*(self.map.as_ptr() as *const ShmLayout) }
    }

    #[inline]
    pub fn ticker(&self, exchange: Exchange, slot: usize) -> &TickerCell {
        &self.layout().tickers[exchange.ordinal()][slot]
    }

    #[inline]
    pub fn index(&self, slot: usize) -> &IndexCell {
        &self.layout().indices[slot]
    }

    /// Total mapped size in bytes.
    pub fn size() -> usize {
        size_of::<ShmLayout>()
    }
}

/// Read-only attach for external consumers and tests.
pub struct ShmReader {
    map: Mmap,
}

impl ShmReader {
    pub fn open(path: &Path) -> Result<Self, PixError> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| PixError::Shm(format!("open {}: {e}", path.display())))?;
        let len = file
            .metadata()
            .map_err(|e| PixError::Shm(format!("stat {}: {e}", path.display())))?
            .len() as usize;
        if len != size_of::<ShmLayout>() {
            return Err(PixError::Shm(format!(
                "{}: size {len} does not match layout ({} bytes)",
                path.display(),
                size_of::<ShmLayout>()
            )));
        }
        // SAFETY: size checked above; read-only mapping.
        let map = unsafe { Mmap::map(&file) }
            .map_err(|e| PixError::Shm(format!("mmap {}: {e}", path.display())))?;
        Ok(Self { map })
    }

    #[inline]
    fn layout(&self) -> &ShmLayout {
        // SAFETY: same argument as ShmRegion::layout; atomic loads are
        // reads, which a PROT_READ mapping permits.
        unsafe { &*(self.map.as_ptr() as *const ShmLayout) }
    }

    #[inline]
    pub fn ticker(&self, exchange: Exchange, slot: usize) -> TickerData {
        self.layout().tickers[exchange.ordinal()][slot].load()
    }

    #[inline]
    pub fn index(&self, slot: usize) -> PriceIndex {
        self.layout().indices[slot].load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("pix_shm_{name}_{}", std::process::id()))
    }

    #[test]
    fn layout_is_byte_exact() {
        assert_eq!(size_of::<TickerCell>(), size_of::<TickerData>());
        assert_eq!(size_of::<TickerCell>(), 32);
        assert_eq!(size_of::<IndexCell>(), size_of::<PriceIndex>());
        assert_eq!(size_of::<IndexCell>(), 48);
        assert_eq!(
            size_of::<ShmLayout>(),
            NUM_EXCHANGES * MAX_SYMBOLS * 32 + MAX_SYMBOLS * 48
        );
    }

    #[test]
    fn fresh_region_is_all_nan() {
        let path = tmp("fresh");
        let region = ShmRegion::create(&path).unwrap();
        for e in Exchange::ALL {
            let t = region.ticker(e, 0).load();
            assert!(t.bid.is_nan() && t.ask.is_nan() && t.bid_qty.is_nan() && t.ask_qty.is_nan());
        }
        assert!(region.index(0).val().is_nan());
        assert_eq!(region.index(0).load().count, 0);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn reader_sees_writer_updates() {
        let path = tmp("rw");
        let region = ShmRegion::create(&path).unwrap();
        let quote = TickerData::new(60000.0, 60001.0, 1.5, 2.5);
        region.ticker(Exchange::Okx, 3).store(quote);
        region.index(3).commit(PriceIndex::new(60000.5, 1, 60000.0, 60001.0, 1.5, 2.5));

        let reader = ShmReader::open(&path).unwrap();
        assert_eq!(reader.ticker(Exchange::Okx, 3), quote);
        let ix = reader.index(3);
        assert_eq!(ix.val, 60000.5);
        assert_eq!(ix.count, 1);
        // untouched cells stay NaN
        assert!(reader.ticker(Exchange::Binance, 3).bid.is_nan());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn invalidate_keeps_previous_metadata() {
        let path = tmp("inv");
        let region = ShmRegion::create(&path).unwrap();
        region.index(0).commit(PriceIndex::new(100.0, 3, 99.0, 101.0, 5.0, 6.0));
        region.index(0).invalidate();
        let ix = region.index(0).load();
        assert!(ix.val.is_nan());
        assert_eq!(ix.count, 3);
        assert_eq!(ix.bid_vwap, 99.0);
        assert_eq!(ix.bid_qty_total, 5.0);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn reader_rejects_wrong_size() {
        let path = tmp("short");
        std::fs::write(&path, b"not a region").unwrap();
        assert!(ShmReader::open(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
