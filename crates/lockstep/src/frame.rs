//! Frame payloads: the slot holds a `FrameHeader` descriptor while the
//! pixels live in the segment's bulk area, so consumers read them without
//! copying.

use crate::errors::LockstepError;
use crate::node::NodeState;
use crate::segment;
use crate::sink::Sink;
use crate::source::Source;
use datatypes::{Frame, FrameHeader, PixelFormat};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Producer of frames.
pub struct FrameSink {
    inner: Sink<FrameHeader>,
    header: FrameHeader,
}

impl FrameSink {
    /// Bind `address` with a bulk area sized for `rows × cols` pixels of
    /// `format`, and publish the frame geometry in the header before any
    /// consumer can observe it.
    pub fn bind(
        address: &str,
        rows: u32,
        cols: u32,
        format: PixelFormat,
    ) -> Result<Self, LockstepError> {
        let payload_bytes = rows as usize * cols as usize * format.bytes_per_pixel();
        let layout = segment::layout::<FrameHeader>(payload_bytes);
        let header = FrameHeader::new(rows, cols, format, layout.data as u64);

        let inner = Sink::<FrameHeader>::bind_with(address, payload_bytes, Some(header))?;

        Ok(Self { inner, header })
    }

    pub fn wait(&mut self) -> Result<(), LockstepError> {
        self.inner.wait()
    }

    pub fn post(&mut self) -> Result<(), LockstepError> {
        self.inner.post()
    }

    /// The pixel buffer, for in-place filling between `wait()` and `post()`.
    pub fn data_mut(&mut self) -> &mut [u8] {
        let len = self.header.data_len();
        &mut self.inner.data_mut()[..len]
    }

    /// One full cycle: wait, copy `pixels` into the bulk area, post.
    pub fn push_frame(&mut self, pixels: &[u8]) -> Result<(), LockstepError> {
        if pixels.len() != self.header.data_len() {
            return Err(LockstepError::SizeMismatch);
        }
        self.inner.wait()?;
        self.data_mut().copy_from_slice(pixels);
        self.inner.post()
    }

    pub fn rows(&self) -> u32 {
        self.header.rows
    }

    pub fn cols(&self) -> u32 {
        self.header.cols
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.header.pixel_format()
    }

    pub fn write_number(&self) -> u64 {
        self.inner.write_number()
    }

    pub fn source_ref_count(&self) -> u32 {
        self.inner.source_ref_count()
    }

    pub fn address(&self) -> &str {
        self.inner.address()
    }

    pub fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.inner.set_interrupt_flag(flag);
    }
}

/// Zero-copy view of the current frame, borrowed from the segment.
#[derive(Debug)]
pub struct FrameRef<'a> {
    pub rows: u32,
    pub cols: u32,
    pub pixel_format: PixelFormat,
    pub data: &'a [u8],
}

impl FrameRef<'_> {
    /// Deep copy, detached from the segment and from the publication cycle.
    pub fn to_frame(&self) -> Frame {
        Frame::new(self.rows, self.cols, self.pixel_format, self.data.to_vec())
    }
}

/// Consumer of frames.
pub struct FrameSource {
    inner: Source<FrameHeader>,
    view: Option<FrameHeader>,
}

impl FrameSource {
    pub fn touch(address: &str) -> Result<Self, LockstepError> {
        Ok(Self {
            inner: Source::touch(address)?,
            view: None,
        })
    }

    pub fn touch_existing(address: &str) -> Result<Self, LockstepError> {
        Ok(Self {
            inner: Source::touch_existing(address)?,
            view: None,
        })
    }

    /// Synchronize with the stream and materialize the frame view from the
    /// published header.
    ///
    /// The segment may have been created by this source before the sink
    /// arrived and grew it; in that case the attach-time mapping is too
    /// small for the bulk area and is re-taken at the current length.
    pub fn connect(&mut self) -> Result<(), LockstepError> {
        self.inner.connect()?;

        let header = *self.inner.retrieve()?;
        let needed = header.data_offset as usize + header.data_len();
        if self.inner.segment_len() < needed {
            self.inner.remap()?;
        }
        self.view = Some(header);
        Ok(())
    }

    pub fn wait(&mut self) -> Result<NodeState, LockstepError> {
        self.inner.wait()
    }

    pub fn post(&mut self) -> Result<(), LockstepError> {
        self.inner.post()
    }

    /// The current frame, zero-copy. Valid between `wait()` returning
    /// `Active` and the matching `post()`.
    pub fn frame(&self) -> Result<FrameRef<'_>, LockstepError> {
        let header = self.view.ok_or(LockstepError::ReadWithoutBoundSink)?;
        let data = self
            .inner
            .data_region(header.data_offset as usize, header.data_len())?;
        Ok(FrameRef {
            rows: header.rows,
            cols: header.cols,
            pixel_format: header.pixel_format(),
            data,
        })
    }

    /// Deep copy of the current frame, for consumers that release the cycle
    /// quickly and process offline.
    pub fn clone_frame(&self) -> Result<Frame, LockstepError> {
        Ok(self.frame()?.to_frame())
    }

    pub fn write_number(&self) -> u64 {
        self.inner.write_number()
    }

    pub fn address(&self) -> &str {
        self.inner.address()
    }

    pub fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.inner.set_interrupt_flag(flag);
    }
}
