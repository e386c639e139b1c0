//! Resource limits for decode/encode operations.

use crate::error::{CodecError, Result};

/// Hard ceiling on either image axis, applied even when no [`Limits`] are set.
pub const MAX_DIMENSION: u32 = 1 << 24;

/// Resource limits for decode/encode operations.
///
/// Used to prevent DoS attacks and resource exhaustion. All limits are optional.
#[derive(Clone, Debug, Default)]
pub struct Limits {
    /// Maximum image width in pixels.
    pub max_width: Option<u64>,
    /// Maximum image height in pixels.
    pub max_height: Option<u64>,
    /// Maximum total pixels (width × height).
    pub max_pixels: Option<u64>,
    /// Maximum size of any single pixel buffer in bytes.
    pub max_memory_bytes: Option<u64>,
}

impl Limits {
    /// Create a new Limits with no restrictions.
    pub fn none() -> Self {
        Self::default()
    }

    /// Set maximum total pixels.
    pub fn with_max_pixels(mut self, max: u64) -> Self {
        self.max_pixels = Some(max);
        self
    }

    /// Set maximum pixel-buffer size in bytes.
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Check if dimensions are within limits.
    ///
    /// Returns `Err` with a description if any limit is exceeded.
    pub fn check_dimensions(&self, width: u64, height: u64) -> core::result::Result<(), &'static str> {
        if width > MAX_DIMENSION as u64 || height > MAX_DIMENSION as u64 {
            return Err("dimension exceeds hard ceiling");
        }

        if let Some(max_width) = self.max_width {
            if width > max_width {
                return Err("width exceeds limit");
            }
        }

        if let Some(max_height) = self.max_height {
            if height > max_height {
                return Err("height exceeds limit");
            }
        }

        if let Some(max_pixels) = self.max_pixels {
            let pixels = width.saturating_mul(height);
            if pixels > max_pixels {
                return Err("pixel count exceeds limit");
            }
        }

        Ok(())
    }

    /// Check if a memory allocation is within limits.
    pub fn check_memory(&self, bytes: u64) -> core::result::Result<(), &'static str> {
        if let Some(max_memory) = self.max_memory_bytes {
            if bytes > max_memory {
                return Err("memory allocation exceeds limit");
            }
        }
        Ok(())
    }

    /// Validate header dimensions: zero is invalid, oversize is a limit error.
    pub(crate) fn validate(&self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(CodecError::InvalidDimensions { width, height });
        }
        self.check_dimensions(width as u64, height as u64)
            .map_err(|msg| CodecError::LimitExceeded(msg.into()))
    }

    /// Allocate a zeroed buffer of `len` elements, honouring the memory limit.
    pub(crate) fn alloc<T: Copy + Default>(&self, len: usize) -> Result<Vec<T>> {
        let bytes = (len as u64).saturating_mul(size_of::<T>() as u64);
        self.check_memory(bytes)
            .map_err(|msg| CodecError::LimitExceeded(msg.into()))?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| CodecError::Oom)?;
        buf.resize(len, T::default());
        Ok(buf)
    }
}

/// Multiply image extents, reporting overflow as a limit failure.
pub(crate) fn checked_len(parts: &[usize]) -> Result<usize> {
    parts
        .iter()
        .try_fold(1usize, |acc, &p| acc.checked_mul(p))
        .ok_or_else(|| CodecError::LimitExceeded("buffer size overflows usize".into()))
}
