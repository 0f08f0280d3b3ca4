//! Typed access to the module's linear memory.
//!
//! Every accessor goes through the store to the *current* backing buffer. The
//! module may grow its memory during any call, so nothing here holds on to a
//! slice between two accesses.
//!
//! Offsets are raw byte addresses in the module's pointer space. An
//! out-of-range access fails with `MemoryAccessError`; array accessors check
//! the whole range before allocating, so a bogus length never aborts the host.

use wasmtime::{AsContext, AsContextMut, Memory, MemoryAccessError};

/// Byte order for multi-byte accessors.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

/// Growth-safe view over one linear memory.
#[derive(Clone, Debug)]
pub struct MemoryView {
    memory: Memory,
    endianness: Endianness,
}

impl MemoryView {
    pub fn new(memory: Memory) -> Self {
        Self {
            memory,
            endianness: Endianness::Little,
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Current size in bytes.
    pub fn byte_len(&self, store: impl AsContext) -> usize {
        self.memory.data_size(&store)
    }

    pub fn read_bytes(
        &self,
        store: impl AsContext,
        ptr: u32,
        buf: &mut [u8],
    ) -> Result<(), MemoryAccessError> {
        if buf.is_empty() {
            return Ok(());
        }
        self.memory.read(&store, ptr as usize, buf)
    }

    pub fn write_bytes(
        &self,
        mut store: impl AsContextMut,
        ptr: u32,
        bytes: &[u8],
    ) -> Result<(), MemoryAccessError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.memory.write(&mut store, ptr as usize, bytes)
    }

    pub fn get_u8(&self, store: impl AsContext, ptr: u32) -> Result<u8, MemoryAccessError> {
        let mut b = [0u8; 1];
        self.read_bytes(store, ptr, &mut b)?;
        Ok(b[0])
    }

    pub fn set_u8(
        &self,
        store: impl AsContextMut,
        ptr: u32,
        value: u8,
    ) -> Result<(), MemoryAccessError> {
        self.write_bytes(store, ptr, &[value])
    }

    pub fn get_u32(&self, store: impl AsContext, ptr: u32) -> Result<u32, MemoryAccessError> {
        let mut b = [0u8; 4];
        self.read_bytes(store, ptr, &mut b)?;
        Ok(self.decode_u32(b))
    }

    pub fn set_u32(
        &self,
        store: impl AsContextMut,
        ptr: u32,
        value: u32,
    ) -> Result<(), MemoryAccessError> {
        self.write_bytes(store, ptr, &self.encode_u32(value))
    }

    pub fn get_u64(&self, store: impl AsContext, ptr: u32) -> Result<u64, MemoryAccessError> {
        let mut b = [0u8; 8];
        self.read_bytes(store, ptr, &mut b)?;
        Ok(match self.endianness {
            Endianness::Little => u64::from_le_bytes(b),
            Endianness::Big => u64::from_be_bytes(b),
        })
    }

    pub fn set_u64(
        &self,
        store: impl AsContextMut,
        ptr: u32,
        value: u64,
    ) -> Result<(), MemoryAccessError> {
        let b = match self.endianness {
            Endianness::Little => value.to_le_bytes(),
            Endianness::Big => value.to_be_bytes(),
        };
        self.write_bytes(store, ptr, &b)
    }

    pub fn get_f32(&self, store: impl AsContext, ptr: u32) -> Result<f32, MemoryAccessError> {
        self.get_u32(store, ptr).map(f32::from_bits)
    }

    pub fn set_f32(
        &self,
        store: impl AsContextMut,
        ptr: u32,
        value: f32,
    ) -> Result<(), MemoryAccessError> {
        self.set_u32(store, ptr, value.to_bits())
    }

    pub fn read_u8_array(
        &self,
        store: impl AsContext,
        ptr: u32,
        len: usize,
    ) -> Result<Vec<u8>, MemoryAccessError> {
        self.check_range(&store, ptr, len)?;
        let mut out = vec![0u8; len];
        self.read_bytes(store, ptr, &mut out)?;
        Ok(out)
    }

    pub fn write_u8_array(
        &self,
        store: impl AsContextMut,
        ptr: u32,
        values: &[u8],
    ) -> Result<(), MemoryAccessError> {
        self.write_bytes(store, ptr, values)
    }

    pub fn read_u32_array(
        &self,
        store: impl AsContext,
        ptr: u32,
        len: usize,
    ) -> Result<Vec<u32>, MemoryAccessError> {
        let raw = self.read_u8_array(store, ptr, words_to_bytes(len))?;
        Ok(raw
            .chunks_exact(4)
            .map(|c| self.decode_u32([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    pub fn write_u32_array(
        &self,
        store: impl AsContextMut,
        ptr: u32,
        values: &[u32],
    ) -> Result<(), MemoryAccessError> {
        self.check_range(&store, ptr, words_to_bytes(values.len()))?;
        let raw: Vec<u8> = values.iter().flat_map(|&v| self.encode_u32(v)).collect();
        self.write_bytes(store, ptr, &raw)
    }

    pub fn read_f32_array(
        &self,
        store: impl AsContext,
        ptr: u32,
        len: usize,
    ) -> Result<Vec<f32>, MemoryAccessError> {
        Ok(self
            .read_u32_array(store, ptr, len)?
            .into_iter()
            .map(f32::from_bits)
            .collect())
    }

    pub fn write_f32_array(
        &self,
        store: impl AsContextMut,
        ptr: u32,
        values: &[f32],
    ) -> Result<(), MemoryAccessError> {
        let bits: Vec<u32> = values.iter().map(|v| v.to_bits()).collect();
        self.write_u32_array(store, ptr, &bits)
    }

    /// Read a NUL-terminated string, lossily decoded as UTF-8.
    ///
    /// A string that runs off the end of memory is cut at the end.
    pub fn read_c_string(
        &self,
        store: impl AsContext,
        ptr: u32,
    ) -> Result<String, MemoryAccessError> {
        let start = ptr as usize;
        // Zero-length read: only the bounds check of `start`.
        self.memory.read(&store, start, &mut [])?;
        let tail = self.memory.data(&store).get(start..).unwrap_or_default();
        let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
        Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    /// Set `[from, end of memory)` to zero.
    pub fn zero_from(&self, mut store: impl AsContextMut, from: u32) {
        let data = self.memory.data_mut(&mut store);
        if let Some(tail) = data.get_mut(from as usize..) {
            tail.fill(0);
        }
    }

    /// Fails unless `[ptr, ptr + len)` lies inside the current memory.
    fn check_range(
        &self,
        store: impl AsContext,
        ptr: u32,
        len: usize,
    ) -> Result<(), MemoryAccessError> {
        if len == 0 {
            return Ok(());
        }
        // A zero-length read at the end offset is exactly the bounds check.
        let end = (ptr as usize).saturating_add(len);
        self.memory.read(&store, end, &mut [])
    }

    fn decode_u32(&self, b: [u8; 4]) -> u32 {
        match self.endianness {
            Endianness::Little => u32::from_le_bytes(b),
            Endianness::Big => u32::from_be_bytes(b),
        }
    }

    fn encode_u32(&self, v: u32) -> [u8; 4] {
        match self.endianness {
            Endianness::Little => v.to_le_bytes(),
            Endianness::Big => v.to_be_bytes(),
        }
    }
}

/// Byte length of `len` 32-bit words; saturates so the range check rejects it.
fn words_to_bytes(len: usize) -> usize {
    len.checked_mul(4).unwrap_or(usize::MAX)
}
