/// Pixel layout of a shared frame.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8 = 0,
    Bgr8 = 1,
    Rgb8 = 2,
}

impl PixelFormat {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(PixelFormat::Gray8),
            1 => Some(PixelFormat::Bgr8),
            2 => Some(PixelFormat::Rgb8),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
        }
    }
}

/// Descriptor of a frame whose pixels live in the bulk area of a shared
/// segment, `data_offset` bytes from the segment base.
///
/// The offset is segment-relative so every attached process can translate
/// it against its own mapping.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub rows: u32,
    pub cols: u32,
    pixel_format: u32,
    pub data_offset: u64,
}

impl FrameHeader {
    pub fn new(rows: u32, cols: u32, format: PixelFormat, data_offset: u64) -> Self {
        Self {
            rows,
            cols,
            pixel_format: format as u32,
            data_offset,
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::from_u32(self.pixel_format).unwrap_or(PixelFormat::Gray8)
    }

    /// Size in bytes of the pixel buffer this header describes.
    pub fn data_len(&self) -> usize {
        self.rows as usize * self.cols as usize * self.pixel_format().bytes_per_pixel()
    }
}

/// A frame copied out of a segment, owning its pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub rows: u32,
    pub cols: u32,
    pixel_format: PixelFormat,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(rows: u32, cols: u32, pixel_format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            rows,
            cols,
            pixel_format,
            data,
        }
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_len_accounts_for_pixel_format() {
        let gray = FrameHeader::new(480, 640, PixelFormat::Gray8, 0);
        assert_eq!(gray.data_len(), 480 * 640);

        let bgr = FrameHeader::new(480, 640, PixelFormat::Bgr8, 0);
        assert_eq!(bgr.data_len(), 480 * 640 * 3);
    }

    #[test]
    fn unknown_pixel_format_decodes_to_gray() {
        let mut header = FrameHeader::new(1, 1, PixelFormat::Rgb8, 0);
        header.pixel_format = 99;
        assert_eq!(header.pixel_format(), PixelFormat::Gray8);
    }
}
