/// Collections backing the eviction cache
///
/// - FastBitmap: slot liveness bitmap with POPCNT/TZCNT

pub mod fast_bitmap;

pub use fast_bitmap::FastBitmap;
