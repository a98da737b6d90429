//! Render target descriptions
//!
//! The shadow mask is written into a texture owned by the host. This side only
//! records which texture and how large it is.

use super::mesh_data::GpuResource;

/// Pixel format of the shadow mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderTargetFormat {
    /// Format not specified yet
    #[default]
    Unknown,
    /// 8-bit unsigned normalized single channel
    Ru8,
    /// 16-bit float single channel
    Rf16,
    /// 32-bit float single channel
    Rf32,
}

impl RenderTargetFormat {
    /// Bytes per pixel, zero when unknown
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Unknown => 0,
            Self::Ru8 => 1,
            Self::Rf16 => 2,
            Self::Rf32 => 4,
        }
    }
}

/// Texture the backend writes shadows into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderTarget {
    /// Host texture
    pub texture: Option<GpuResource>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: RenderTargetFormat,
}

impl RenderTarget {
    /// Size of one full readback in bytes
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_uses_format() {
        let target = RenderTarget { width: 4, height: 2, format: RenderTargetFormat::Rf16, ..Default::default() };
        assert_eq!(target.byte_size(), 16);
        assert_eq!(RenderTarget::default().byte_size(), 0);
    }
}
