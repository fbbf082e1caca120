//! Lume Renderer: the render dependency graph core.

use std::sync::Arc;

use lume_rhi::Device;

use crate::error::{RdgError, RdgResult};
use crate::pass::RenderData;

pub mod cache;
pub mod config;
pub mod error;
pub mod frame;
pub mod graph;
pub mod id;
pub mod pass;
pub mod reflection;
pub mod resource;
pub mod scene;

/// Owns the device, the per-flight frame ring, and one render dependency graph; ties them
/// together into the per-frame record/submit/present cycle (spec §5, §4.4).
pub struct Renderer {
    device: Arc<dyn Device>,
    frames: frame::FrameResources,
    graph: graph::Graph,
}

impl Renderer {
    pub fn new(device: Arc<dyn Device>) -> Result<Self, String> {
        let frames = frame::FrameResources::new(device.clone())?;
        Ok(Self { device, frames, graph: graph::Graph::new() })
    }

    /// Access the render graph to register passes and edges before `build()`.
    pub fn graph_mut(&mut self) -> &mut graph::Graph {
        &mut self.graph
    }

    /// Flattens the graph, devirtualizes resources, and pre-computes barriers. Must run once
    /// after every pass/edge has been declared and before the first `render_frame`.
    pub fn build(&mut self) -> RdgResult<()> {
        self.graph.build(self.device.as_ref())
    }

    /// Runs one frame: waits for the current flight's fence, records the graph into a fresh
    /// command encoder, and submits it (spec §5 "Frame lifecycle").
    pub fn render_frame(&mut self, data: &RenderData) -> RdgResult<()> {
        let (mut encoder, _swapchain_frame) = self.frames.frame_start(None).map_err(RdgError::Device)?;
        let flight_index = self.frames.flight_index();

        self.graph.execute(encoder.as_mut(), flight_index, data)?;

        let command_buffer = encoder.finish().map_err(RdgError::Device)?;
        self.device.submit(vec![command_buffer]).map_err(RdgError::Device)?;
        self.frames.frame_end(None, None).map_err(RdgError::Device)?;
        Ok(())
    }
}
