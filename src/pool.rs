// Buffer pools for the hot decode path. Tiles and strips churn through
// short-lived byte buffers; recycling them keeps allocator pressure down
// when serving many reads from one process.
//
// Three pools:
//   - fixed-size byte slabs in four capacity buckets,
//   - growable byte vectors for decompressor output of unknown size,
//   - u64 slices matching decoded 256x256 / 512x512 four-band tiles.

use std::sync::{LazyLock, Mutex};

pub const SMALL_BUFFER_SIZE: usize = 64 * 1024;
pub const MEDIUM_BUFFER_SIZE: usize = 256 * 1024;
pub const LARGE_BUFFER_SIZE: usize = 1024 * 1024;
pub const XLARGE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

pub const TILE_256_U64_LEN: usize = 256 * 256 * 4;
pub const TILE_512_U64_LEN: usize = 512 * 512 * 4;

const BUCKET_SIZES: [usize; 4] = [
    SMALL_BUFFER_SIZE,
    MEDIUM_BUFFER_SIZE,
    LARGE_BUFFER_SIZE,
    XLARGE_BUFFER_SIZE,
];

/// Size-bucketed byte-slab pool plus growable and u64 side pools.
/// Buckets are LIFO, so the most recently released buffer is handed out
/// first while its pages are still warm.
pub struct BufferPool {
    buckets: [Mutex<Vec<Vec<u8>>>; 4],
    growable: Mutex<Vec<Vec<u8>>>,
    tile256: Mutex<Vec<Vec<u64>>>,
    tile512: Mutex<Vec<Vec<u64>>>,
}

static POOL: LazyLock<BufferPool> = LazyLock::new(BufferPool::new);

impl BufferPool {
    pub fn new() -> Self {
        Self {
            buckets: [
                Mutex::new(Vec::new()),
                Mutex::new(Vec::new()),
                Mutex::new(Vec::new()),
                Mutex::new(Vec::new()),
            ],
            growable: Mutex::new(Vec::new()),
            tile256: Mutex::new(Vec::new()),
            tile512: Mutex::new(Vec::new()),
        }
    }

    fn bucket_index(capacity: usize) -> Option<usize> {
        BUCKET_SIZES.iter().position(|&size| size == capacity)
    }

    /// Returns a byte slice of exactly `len` bytes, backed by the smallest
    /// bucket that fits, or a direct allocation above the largest bucket.
    /// Contents are unspecified.
    pub fn acquire(&self, len: usize) -> Vec<u8> {
        let Some(index) = BUCKET_SIZES.iter().position(|&b| len <= b) else {
            return vec![0; len];
        };
        let bucket_size = BUCKET_SIZES[index];
        let mut buf = self.buckets[index]
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(bucket_size));
        if buf.len() < len {
            buf.resize(len, 0);
        } else {
            buf.truncate(len);
        }
        buf
    }

    /// Returns a buffer to the bucket matching its capacity. Buffers with a
    /// non-bucket capacity (including direct allocations) are dropped.
    pub fn release(&self, buf: Vec<u8>) {
        if let Some(index) = Self::bucket_index(buf.capacity()) {
            self.buckets[index].lock().unwrap().push(buf);
        }
    }

    /// Returns an empty growable byte vector for output of unknown size.
    pub fn acquire_growable(&self) -> Vec<u8> {
        let mut buf = self.growable.lock().unwrap().pop().unwrap_or_default();
        buf.clear();
        buf
    }

    /// Returns a growable vector to its pool. Vectors grown past the
    /// largest slab bucket are dropped rather than retained.
    pub fn release_growable(&self, buf: Vec<u8>) {
        if buf.capacity() <= XLARGE_BUFFER_SIZE {
            self.growable.lock().unwrap().push(buf);
        }
    }

    /// Returns a u64 slice of exactly `len` elements for decoded pixel data.
    pub fn acquire_u64(&self, len: usize) -> Vec<u64> {
        let (pool, bucket_len) = if len <= TILE_256_U64_LEN {
            (&self.tile256, TILE_256_U64_LEN)
        } else if len <= TILE_512_U64_LEN {
            (&self.tile512, TILE_512_U64_LEN)
        } else {
            return vec![0; len];
        };
        let mut buf = pool
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(bucket_len));
        if buf.len() < len {
            buf.resize(len, 0);
        } else {
            buf.truncate(len);
        }
        buf
    }

    pub fn release_u64(&self, buf: Vec<u64>) {
        match buf.capacity() {
            TILE_256_U64_LEN => self.tile256.lock().unwrap().push(buf),
            TILE_512_U64_LEN => self.tile512.lock().unwrap().push(buf),
            _ => {}
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide pool used by the tile/strip engine.
pub fn acquire(len: usize) -> Vec<u8> {
    POOL.acquire(len)
}

pub fn release(buf: Vec<u8>) {
    POOL.release(buf)
}

pub fn acquire_growable() -> Vec<u8> {
    POOL.acquire_growable()
}

pub fn release_growable(buf: Vec<u8>) {
    POOL.release_growable(buf)
}

pub fn acquire_u64(len: usize) -> Vec<u64> {
    POOL.acquire_u64(len)
}

pub fn release_u64(buf: Vec<u64>) {
    POOL.release_u64(buf)
}
