//! Uniform block packing for the shared scene buffer.
//!
//! Many logical per-frame slots of scene data live in one physical uniform
//! buffer. Devices impose a minimum alignment on dynamically-indexed uniform
//! offsets, so each slot occupies a padded stride rather than the raw struct
//! size. The offset for a given frame is supplied at descriptor bind time as
//! a dynamic offset; the descriptor itself is written once.

/// Round `struct_size` up to the next multiple of `min_alignment`.
///
/// An alignment of 0 means the device imposes no requirement and the size
/// passes through unchanged. `min_alignment` is guaranteed a power of two by
/// the Vulkan spec, which is what makes the bitwise rounding valid.
pub const fn aligned_stride(struct_size: u64, min_alignment: u64) -> u64 {
    if min_alignment == 0 {
        struct_size
    } else {
        (struct_size + min_alignment - 1) & !(min_alignment - 1)
    }
}

/// Layout of the shared scene uniform buffer across frame slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneUniformLayout {
    stride: u64,
    slot_count: u64,
}

impl SceneUniformLayout {
    /// Compute the layout for `slot_count` frame slots of a `struct_size`
    /// byte block under the device's `min_alignment`.
    pub fn new(struct_size: u64, min_alignment: u64, slot_count: usize) -> Self {
        Self {
            stride: aligned_stride(struct_size, min_alignment),
            slot_count: slot_count as u64,
        }
    }

    /// Padded size of one slot.
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Total buffer size covering all slots.
    pub fn total_size(&self) -> u64 {
        self.stride * self.slot_count
    }

    /// Byte offset of the slot used by `frame_number`.
    pub fn offset_for(&self, frame_number: u64) -> u64 {
        self.stride * (frame_number % self.slot_count)
    }
}

/// Scene-wide shading parameters.
///
/// Written once per frame into this frame's slot of the shared scene buffer.
/// The vec4 fields keep the layout identical under std140 and repr(C).
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSceneData {
    pub fog_color: [f32; 4],
    /// x = fog start, y = fog end
    pub fog_distances: [f32; 4],
    pub ambient_color: [f32; 4],
    /// w component is unused
    pub sunlight_direction: [f32; 4],
    pub sunlight_color: [f32; 4],
}

impl Default for GpuSceneData {
    fn default() -> Self {
        Self {
            fog_color: [0.1, 0.1, 0.1, 1.0],
            fog_distances: [10.0, 150.0, 0.0, 0.0],
            ambient_color: [0.1, 0.1, 0.1, 1.0],
            sunlight_direction: [0.3, -1.0, 0.3, 0.0],
            sunlight_color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

impl GpuSceneData {
    /// Size in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_aligned_for_all_sizes() {
        for size in 1..=4096u64 {
            assert_eq!(aligned_stride(size, 0), size);
            for align in [16u64, 64, 256] {
                let stride = aligned_stride(size, align);
                assert_eq!(stride % align, 0, "size {size} align {align}");
                assert!(stride >= size);
            }
        }
    }

    #[test]
    fn stride_never_over_pads() {
        for size in 1..=4096u64 {
            for align in [16u64, 64, 256] {
                assert!(aligned_stride(size, align) < size + align);
            }
        }
    }

    #[test]
    fn stride_of_exact_multiple_is_identity() {
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(512, 256), 512);
        assert_eq!(aligned_stride(64, 16), 64);
    }

    #[test]
    fn consecutive_offsets_partition_the_buffer() {
        let layout = SceneUniformLayout::new(GpuSceneData::SIZE, 256, 2);

        let first = layout.offset_for(0);
        let second = layout.offset_for(1);
        assert_eq!(second - first, layout.stride());

        for frame in 0..8u64 {
            let offset = layout.offset_for(frame);
            assert!(offset < layout.total_size());
            assert_eq!(offset % layout.stride(), 0);
        }

        // The ring wraps: frame N reuses frame 0's slot.
        assert_eq!(layout.offset_for(2), first);
        assert_eq!(layout.offset_for(3), second);
    }

    #[test]
    fn total_size_covers_every_slot() {
        let layout = SceneUniformLayout::new(80, 64, 3);
        assert_eq!(layout.stride(), 128);
        assert_eq!(layout.total_size(), 384);
    }

    #[test]
    fn scene_data_layout() {
        assert_eq!(GpuSceneData::SIZE, 80);
        assert_eq!(std::mem::offset_of!(GpuSceneData, fog_color), 0);
        assert_eq!(std::mem::offset_of!(GpuSceneData, fog_distances), 16);
        assert_eq!(std::mem::offset_of!(GpuSceneData, ambient_color), 32);
        assert_eq!(std::mem::offset_of!(GpuSceneData, sunlight_direction), 48);
        assert_eq!(std::mem::offset_of!(GpuSceneData, sunlight_color), 64);
    }
}
