//! GPU buffer backends.
//!
//! The resource manager only ever talks to a [`GpuBackend`], so the
//! lifecycle logic is the same whether buffers live on a real device or in
//! the bookkeeping-only [`HeadlessBackend`].

use std::collections::HashMap;

use crate::error::{RenderError, RenderResult};

/// Opaque identifier of a buffer created by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(u64);

impl BufferHandle {
    #[must_use]
    pub fn id(self) -> u64 {
        self.0
    }
}

/// What a buffer will be bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    /// RGBA8 splatmap texels, copied into a texture by the terrain pass.
    Splatmap,
}

/// Creates and destroys GPU buffers.
///
/// Destroying a handle the backend does not know is a no-op.
pub trait GpuBackend {
    /// Create a buffer initialized with `contents`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Gpu`] if the buffer cannot be created.
    fn create_buffer(
        &mut self,
        label: &str,
        kind: BufferKind,
        contents: &[u8],
    ) -> RenderResult<BufferHandle>;

    fn destroy_buffer(&mut self, handle: BufferHandle);
}

/// A backend that allocates nothing and only tracks live handles.
///
/// Used for tests and for running the pipeline without a device. An
/// optional byte budget makes creation fail once exceeded, standing in for
/// device memory exhaustion.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_id: u64,
    live: HashMap<BufferHandle, usize>,
    live_bytes: usize,
    memory_limit: Option<usize>,
}

impl HeadlessBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that refuses to hold more than `bytes` at once.
    #[must_use]
    pub fn with_memory_limit(bytes: usize) -> Self {
        Self {
            memory_limit: Some(bytes),
            ..Self::default()
        }
    }

    /// Number of buffers created and not yet destroyed.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    #[must_use]
    pub fn is_live(&self, handle: BufferHandle) -> bool {
        self.live.contains_key(&handle)
    }
}

impl GpuBackend for HeadlessBackend {
    fn create_buffer(
        &mut self,
        label: &str,
        _kind: BufferKind,
        contents: &[u8],
    ) -> RenderResult<BufferHandle> {
        if let Some(limit) = self.memory_limit
            && self.live_bytes + contents.len() > limit
        {
            return Err(RenderError::Gpu {
                label: label.to_string(),
                message: format!(
                    "{} bytes requested with {} of {limit} in use",
                    contents.len(),
                    self.live_bytes
                ),
            });
        }

        self.next_id += 1;
        let handle = BufferHandle(self.next_id);
        self.live.insert(handle, contents.len());
        self.live_bytes += contents.len();
        Ok(handle)
    }

    fn destroy_buffer(&mut self, handle: BufferHandle) {
        if let Some(size) = self.live.remove(&handle) {
            self.live_bytes -= size;
        }
    }
}

#[cfg(feature = "wgpu")]
pub use self::wgpu_backend::WgpuBackend;

#[cfg(feature = "wgpu")]
mod wgpu_backend {
    use std::collections::HashMap;

    use wgpu::util::DeviceExt;

    use super::{BufferHandle, BufferKind, GpuBackend};
    use crate::error::RenderResult;

    /// A backend that uploads buffers to a `wgpu` device.
    #[derive(Debug)]
    pub struct WgpuBackend {
        device: wgpu::Device,
        next_id: u64,
        buffers: HashMap<BufferHandle, wgpu::Buffer>,
    }

    impl WgpuBackend {
        #[must_use]
        pub fn new(device: wgpu::Device) -> Self {
            Self {
                device,
                next_id: 0,
                buffers: HashMap::new(),
            }
        }

        /// The buffer behind `handle`, for binding in a render pass.
        #[must_use]
        pub fn buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
            self.buffers.get(&handle)
        }
    }

    impl GpuBackend for WgpuBackend {
        fn create_buffer(
            &mut self,
            label: &str,
            kind: BufferKind,
            contents: &[u8],
        ) -> RenderResult<BufferHandle> {
            let usage = match kind {
                BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
                BufferKind::Index => wgpu::BufferUsages::INDEX,
                BufferKind::Splatmap => wgpu::BufferUsages::COPY_SRC,
            };
            let buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage,
                });

            self.next_id += 1;
            let handle = BufferHandle(self.next_id);
            self.buffers.insert(handle, buffer);
            Ok(handle)
        }

        fn destroy_buffer(&mut self, handle: BufferHandle) {
            if let Some(buffer) = self.buffers.remove(&handle) {
                buffer.destroy();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headless_tracks_live_handles() {
        let mut backend = HeadlessBackend::new();
        let a = backend
            .create_buffer("a", BufferKind::Vertex, &[0; 28])
            .unwrap();
        let b = backend.create_buffer("b", BufferKind::Index, &[0; 12]).unwrap();
        assert_ne!(a, b);
        assert_eq!(backend.live_buffers(), 2);
        assert_eq!(backend.live_bytes(), 40);

        backend.destroy_buffer(a);
        backend.destroy_buffer(a);
        assert!(!backend.is_live(a));
        assert!(backend.is_live(b));
        assert_eq!(backend.live_bytes(), 12);
    }

    #[test]
    fn test_memory_limit() {
        let mut backend = HeadlessBackend::with_memory_limit(64);
        let a = backend
            .create_buffer("a", BufferKind::Vertex, &[0; 56])
            .unwrap();
        let err = backend
            .create_buffer("b", BufferKind::Index, &[0; 12])
            .unwrap_err();
        assert!(matches!(err, RenderError::Gpu { ref label, .. } if label == "b"));

        backend.destroy_buffer(a);
        assert!(backend.create_buffer("b", BufferKind::Index, &[0; 12]).is_ok());
    }
}
