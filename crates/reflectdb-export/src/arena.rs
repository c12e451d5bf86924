//! Bump arena backing the exported memory image
//!
//! The arena is one contiguous, append-only byte region. Allocations hand out
//! byte offsets rather than addresses, so the backing store is free to grow
//! without invalidating anything already allocated; offsets only become
//! pointers in the emitted blob, where they are base-relative by definition.
//! Nothing is ever freed; the arena lives for the whole export.

/// Append-only arena of zero-initialized, aligned byte ranges.
#[derive(Debug, Default)]
pub struct Arena {
    bytes: Vec<u8>,
}

impl Arena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Create an arena with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Wrap an existing image, such as the data section of a decoded blob,
    /// so record accessors can read it.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Allocate `size` zero bytes aligned to `align`, returning the offset of
    /// the new range. `align` must be a power of two.
    pub fn alloc(&mut self, size: u64, align: u64) -> u64 {
        debug_assert!(align.is_power_of_two());
        let mask = align - 1;
        let start = (self.bytes.len() as u64 + mask) & !mask;
        self.bytes.resize((start + size) as usize, 0);
        start
    }

    /// Allocate a contiguous run of `count` records of `stride` bytes each,
    /// 8-byte aligned.
    pub fn alloc_array(&mut self, stride: u64, count: u64) -> u64 {
        self.alloc(stride * count, 8)
    }

    /// Current high-water mark in bytes.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether nothing has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The raw image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Read a `u32` at `offset` (little-endian).
    pub fn read_u32(&self, offset: u64) -> u32 {
        let at = offset as usize;
        u32::from_le_bytes(self.bytes[at..at + 4].try_into().unwrap())
    }

    /// Write a `u32` at `offset` (little-endian).
    pub fn write_u32(&mut self, offset: u64, value: u32) {
        let at = offset as usize;
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read an `i32` at `offset` (little-endian).
    pub fn read_i32(&self, offset: u64) -> i32 {
        let at = offset as usize;
        i32::from_le_bytes(self.bytes[at..at + 4].try_into().unwrap())
    }

    /// Write an `i32` at `offset` (little-endian).
    pub fn write_i32(&mut self, offset: u64, value: i32) {
        let at = offset as usize;
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Read a `u64` at `offset` (little-endian).
    pub fn read_u64(&self, offset: u64) -> u64 {
        let at = offset as usize;
        u64::from_le_bytes(self.bytes[at..at + 8].try_into().unwrap())
    }

    /// Write a `u64` at `offset` (little-endian).
    pub fn write_u64(&mut self, offset: u64, value: u64) {
        let at = offset as usize;
        self.bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Read an `f64` at `offset` (little-endian).
    pub fn read_f64(&self, offset: u64) -> f64 {
        f64::from_bits(self.read_u64(offset))
    }

    /// Write an `f64` at `offset` (little-endian).
    pub fn write_f64(&mut self, offset: u64, value: f64) {
        self.write_u64(offset, value.to_bits());
    }

    /// Copy raw bytes into the arena at `offset`.
    pub fn write_bytes(&mut self, offset: u64, data: &[u8]) {
        let at = offset as usize;
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }

    /// Read the null-terminated string starting at `offset`.
    ///
    /// Name and attribute text blobs store UTF-8; anything invalid is
    /// replaced rather than propagated, since this is only used for
    /// diagnostics and the text dump.
    pub fn read_cstr(&self, offset: u64) -> String {
        let at = offset as usize;
        let end = self.bytes[at..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.bytes.len(), |n| at + n);
        String::from_utf8_lossy(&self.bytes[at..end]).into_owned()
    }
}
