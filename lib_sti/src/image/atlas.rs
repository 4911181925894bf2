use log::{debug, warn};
use thiserror::Error;

use super::format::FrameDescriptor;
use crate::constants::SMALL_PORTRAIT_SIZES;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AtlasError {
    #[error("Atlas holds {actual} bytes but the frame table describes {expected}")]
    AtlasSize { expected: usize, actual: usize },
    #[error("Invalid pixel buffer length: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },
    #[error("Frame index out of range: {0}")]
    FrameIndexOutOfRange(usize),
    #[error("Frame {index} cannot change from {current:?} to {requested:?}")]
    UnsupportedLayout {
        index: usize,
        current: (u16, u16),
        requested: (u16, u16),
    },
}

/// Which geometries a frame may take when it is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizePolicy {
    /// The replacement must have the frame's current geometry.
    #[default]
    Locked,
    /// Any listed geometry may replace any other listed geometry.
    Allowed(&'static [(u16, u16)]),
}

impl ResizePolicy {
    pub const SMALL_PORTRAIT: ResizePolicy = ResizePolicy::Allowed(SMALL_PORTRAIT_SIZES);

    /// Policy for a frame that currently has the given geometry.
    pub fn for_geometry(width: u16, height: u16) -> Self {
        if SMALL_PORTRAIT_SIZES.contains(&(width, height)) {
            Self::SMALL_PORTRAIT
        } else {
            Self::Locked
        }
    }

    pub fn permits(&self, current: (u16, u16), requested: (u16, u16)) -> bool {
        if current == requested {
            return true;
        }
        match self {
            ResizePolicy::Locked => false,
            ResizePolicy::Allowed(sizes) => sizes.contains(&current) && sizes.contains(&requested),
        }
    }
}

/// Cuts `atlas` into one buffer per descriptor, in order, with no gaps.
pub fn split_atlas(atlas: &[u8], frames: &[FrameDescriptor]) -> Result<Vec<Vec<u8>>, AtlasError> {
    let expected: usize = frames.iter().map(FrameDescriptor::rgba_len).sum();
    if atlas.len() != expected {
        return Err(AtlasError::AtlasSize {
            expected,
            actual: atlas.len(),
        });
    }

    let mut rest = atlas;
    let mut buffers = Vec::with_capacity(frames.len());
    for frame in frames {
        let (head, tail) = rest.split_at(frame.rgba_len());
        buffers.push(head.to_vec());
        rest = tail;
    }
    Ok(buffers)
}

pub fn join_atlas(frames: &[Vec<u8>]) -> Vec<u8> {
    frames.concat()
}

/// Frame descriptors together with their decoded RGBA buffers.
#[derive(Debug, Clone, Default)]
pub struct FrameSet {
    descriptors: Vec<FrameDescriptor>,
    buffers: Vec<Vec<u8>>,
    policies: Vec<ResizePolicy>,
}

impl FrameSet {
    /// Pairs descriptors with an atlas. Each frame's resize policy follows from
    /// its geometry at load time.
    pub fn from_atlas(descriptors: Vec<FrameDescriptor>, atlas: &[u8]) -> Result<Self, AtlasError> {
        let buffers = split_atlas(atlas, &descriptors)?;
        let policies = descriptors
            .iter()
            .map(|d| ResizePolicy::for_geometry(d.width, d.height))
            .collect();
        Ok(Self {
            descriptors,
            buffers,
            policies,
        })
    }

    /// Builds a set from `(width, height, rgba)` frames.
    pub fn from_frames(
        frames: impl IntoIterator<Item = (u16, u16, Vec<u8>)>,
    ) -> Result<Self, AtlasError> {
        let mut set = Self::default();
        for (width, height, rgba) in frames {
            let descriptor = FrameDescriptor::with_geometry(width, height);
            if rgba.len() != descriptor.rgba_len() {
                return Err(AtlasError::BufferSize {
                    expected: descriptor.rgba_len(),
                    actual: rgba.len(),
                });
            }
            set.policies.push(ResizePolicy::for_geometry(width, height));
            set.descriptors.push(descriptor);
            set.buffers.push(rgba);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[FrameDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, index: usize) -> Option<&FrameDescriptor> {
        self.descriptors.get(index)
    }

    pub fn buffers(&self) -> &[Vec<u8>] {
        &self.buffers
    }

    pub fn frame(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(Vec::as_slice)
    }

    pub fn policy(&self, index: usize) -> Option<ResizePolicy> {
        self.policies.get(index).copied()
    }

    pub fn set_policy(&mut self, index: usize, policy: ResizePolicy) -> Result<(), AtlasError> {
        let slot = self
            .policies
            .get_mut(index)
            .ok_or(AtlasError::FrameIndexOutOfRange(index))?;
        *slot = policy;
        Ok(())
    }

    pub fn join(&self) -> Vec<u8> {
        join_atlas(&self.buffers)
    }

    /// Replaces all buffers with slices of `atlas`, keeping the descriptors.
    pub fn resplit(&mut self, atlas: &[u8]) -> Result<(), AtlasError> {
        self.buffers = split_atlas(atlas, &self.descriptors)?;
        Ok(())
    }

    /// Replaces frame `index` with `rgba`, a `width` × `height` RGBA image.
    ///
    /// The geometry may only change when the frame's [`ResizePolicy`] allows it.
    pub fn replace_frame(
        &mut self,
        index: usize,
        rgba: Vec<u8>,
        width: u16,
        height: u16,
    ) -> Result<(), AtlasError> {
        let descriptor = self
            .descriptors
            .get_mut(index)
            .ok_or(AtlasError::FrameIndexOutOfRange(index))?;

        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(AtlasError::BufferSize {
                expected,
                actual: rgba.len(),
            });
        }

        let current = descriptor.geometry();
        if !self.policies[index].permits(current, (width, height)) {
            warn!(
                "Rejected resize of frame {} from {:?} to {:?}",
                index,
                current,
                (width, height)
            );
            return Err(AtlasError::UnsupportedLayout {
                index,
                current,
                requested: (width, height),
            });
        }

        descriptor.width = width;
        descriptor.height = height;
        self.buffers[index] = rgba;
        debug!("Frame {} replaced ({}x{})", index, width, height);
        Ok(())
    }

    /// Records where each encoded frame lands in the payload and returns the
    /// payload. `encoded` must be in frame order.
    pub fn record_layout(&mut self, encoded: Vec<Vec<u8>>) -> Vec<u8> {
        let mut layout = FrameLayout::default();
        for (descriptor, stream) in self.descriptors.iter_mut().zip(encoded) {
            let (offset, size) = layout.push(stream);
            descriptor.offset = offset;
            descriptor.size = size;
        }
        layout.into_payload()
    }
}

/// Concatenates per-frame streams while tracking each one's offset and size.
#[derive(Debug, Default)]
pub struct FrameLayout {
    payload: Vec<u8>,
}

impl FrameLayout {
    pub fn push(&mut self, stream: Vec<u8>) -> (u32, u32) {
        let offset = self.payload.len() as u32;
        let size = stream.len() as u32;
        self.payload.extend(stream);
        (offset, size)
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
