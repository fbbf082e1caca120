//! Per-frame-slot ring of fences and command buffers (spec §5 "Frame lifecycle").
//!
//! One graph execution records into a single command encoder; this ring lets CPU frame N+1
//! start preparing while GPU frame N is still executing, by rotating through
//! `SE_FRAME_FLIGHTS_COUNT` independent slots.

use std::sync::Arc;

use lume_rhi::{CommandEncoder, Device, Fence, Swapchain, SwapchainFrame};

/// Compile-time frame-in-flight count (spec §4.3, §5).
pub const SE_FRAME_FLIGHTS_COUNT: usize = 2;

/// Owns the per-slot fences and tracks which slot is current. Command encoders are created
/// fresh each `frame_start` rather than pooled, since `lume_rhi::Device` doesn't expose
/// encoder reset.
pub struct FrameResources {
    device: Arc<dyn Device>,
    fences: Vec<Box<dyn Fence>>,
    flight_index: usize,
}

impl FrameResources {
    pub fn new(device: Arc<dyn Device>) -> Result<Self, String> {
        let mut fences = Vec::with_capacity(SE_FRAME_FLIGHTS_COUNT);
        for _ in 0..SE_FRAME_FLIGHTS_COUNT {
            fences.push(device.create_fence(true)?);
        }
        Ok(Self { device, fences, flight_index: 0 })
    }

    pub fn flight_index(&self) -> usize {
        self.flight_index
    }

    /// Waits for the current slot's fence, resets it, optionally acquires the next swapchain
    /// image, and returns a fresh command encoder to record into.
    pub fn frame_start<'a>(
        &mut self,
        swapchain: Option<&'a mut dyn Swapchain>,
    ) -> Result<(Box<dyn CommandEncoder>, Option<SwapchainFrame<'a>>), String> {
        let fence = &self.fences[self.flight_index];
        fence.wait(u64::MAX)?;
        fence.reset()?;
        let acquired = match swapchain {
            Some(sc) => Some(sc.acquire_next_image(None)?),
            None => None,
        };
        let encoder = self.device.create_command_encoder()?;
        Ok((encoder, acquired))
    }

    /// Presents (if a swapchain image was acquired this frame) and advances to the next slot.
    pub fn frame_end(&mut self, swapchain: Option<&dyn Swapchain>, image_index: Option<u32>) -> Result<(), String> {
        if let (Some(sc), Some(idx)) = (swapchain, image_index) {
            sc.present(idx, None)?;
        }
        self.flight_index = (self.flight_index + 1) % SE_FRAME_FLIGHTS_COUNT;
        Ok(())
    }
}
