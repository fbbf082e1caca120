//! Pass abstraction hierarchy: `Pass` -> `PipelinePass` -> {`RenderPass`, `ComputePass`}
//! (spec §4.3).
//!
//! Rust has no implementation inheritance, so the hierarchy is a sealed trait (`Pass`) plus a
//! composable helper (`PipelineState`) that `RenderPassImpl`/`ComputePassImpl` hold rather than
//! inherit from. `Graph::add_pass` is what actually calls `reflect()` once and salts the
//! resulting `PassReflection`'s resource ids with the pass's identifier hash (spec's
//! `Pass::init`) — see `init_reflection` below.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use lume_rhi::{CommandEncoder, DescriptorPool, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutBinding, Device};

use crate::error::{RdgError, RdgResult};
use crate::frame::SE_FRAME_FLIGHTS_COUNT;
use crate::id::{self, Uid};
use crate::reflection::{BindingSlot, ShaderReflection};
use crate::resource::PassReflection;
use crate::scene::SceneProvider;

/// Per-pass-execution context: the command encoder to record into and which frame-flight slot
/// is current (spec §5, §12 "frame-flight indexed RenderContext").
pub struct RenderContext<'a> {
    pub encoder: &'a mut dyn CommandEncoder,
    pub flight_index: usize,
}

/// A named binding a pass consumes this frame, resolved to a devirtualized resource id rather
/// than a live GPU handle — the graph's physical resource tables own the handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    Texture(Uid),
    Buffer(Uid),
}

/// Frame-scoped data threaded through `Pass::execute` (spec §12 `RenderData`): named binding
/// resources, small scratch maps for per-frame scalars/matrices, and an optional scene handle.
#[derive(Default)]
pub struct RenderData {
    pub bindings: HashMap<String, BindingResource>,
    pub uvec2: HashMap<String, [u32; 2]>,
    pub uint: HashMap<String, u32>,
    pub mat4: HashMap<String, [f32; 16]>,
    scene: Option<Arc<dyn SceneProvider>>,
}

impl RenderData {
    pub fn get_texture_id(&self, name: &str) -> Option<Uid> {
        match self.bindings.get(name) {
            Some(BindingResource::Texture(uid)) => Some(*uid),
            _ => None,
        }
    }

    pub fn get_buffer_id(&self, name: &str) -> Option<Uid> {
        match self.bindings.get(name) {
            Some(BindingResource::Buffer(uid)) => Some(*uid),
            _ => None,
        }
    }

    pub fn set_scene(&mut self, scene: Arc<dyn SceneProvider>) {
        self.scene = Some(scene);
    }

    pub fn scene(&self) -> Option<&Arc<dyn SceneProvider>> {
        self.scene.as_ref()
    }
}

/// A unit of GPU work with a stable identifier, a resource reflection, and an execute hook
/// (spec §4.3 `Pass`).
pub trait Pass: Any {
    /// Stable identifier; becomes the debug marker label and salts this pass's resource ids.
    fn identifier(&self) -> &str;

    fn reflect(&self) -> PassReflection;

    fn execute(&mut self, ctx: &mut RenderContext, data: &RenderData) -> RdgResult<()>;

    /// Optional readback hook; default no-op.
    fn readback(&mut self, _data: &RenderData) {}

    /// Optional editor/inspector hook; default no-op, since the editor itself is out of scope.
    fn render_ui(&mut self) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Calls `pass.reflect()` once and salts every resource id it declared with a hash of the
/// pass's identifier, so two passes naming a resource "color" never collide (spec's
/// `Pass::init`). Returns the pass's own identifier hash alongside, since the graph needs it
/// again when resolving `prev` links across passes.
pub fn init_reflection(pass: &dyn Pass) -> (Uid, PassReflection) {
    let pass_uid = id::string_uid(pass.identifier());
    let mut reflection = pass.reflect();
    reflection.salt_ids(pass_uid);
    (pass_uid, reflection)
}

/// A deterministic RGBA debug-marker color derived from a pass's identifier (spec §4.3, §6).
pub fn debug_marker_color(identifier: &str) -> [f32; 4] {
    let hash = id::string_uid(identifier);
    let r = ((hash >> 0) & 0xff) as f32 / 255.0;
    let g = ((hash >> 8) & 0xff) as f32 / 255.0;
    let b = ((hash >> 16) & 0xff) as f32 / 255.0;
    [r, g, b, 1.0]
}

/// Per-set, per-flight bind-groups derived from a combined shader reflection (spec §4.3
/// `PipelinePass`). `RenderPassImpl`/`ComputePassImpl` hold one of these rather than
/// inheriting it, since Rust traits don't carry fields.
pub struct PipelineState {
    pub reflection: ShaderReflection,
    set_layouts: Vec<Box<dyn DescriptorSetLayout>>,
    /// `bind_groups[set][flight]`.
    bind_groups: Vec<Vec<Box<dyn DescriptorSet>>>,
}

impl PipelineState {
    /// Builds one `DescriptorSetLayout` per declared set and `SE_FRAME_FLIGHTS_COUNT`
    /// bind-groups per set, all from the combined shader reflection.
    pub fn new(device: &dyn Device, pool: &dyn DescriptorPool, reflection: ShaderReflection) -> Result<Self, String> {
        let max_set = reflection.bindings.keys().map(|s| s.set).max().unwrap_or(0);
        let mut set_layouts = Vec::new();
        let mut bind_groups = Vec::new();

        for set in 0..=max_set {
            let bindings: Vec<DescriptorSetLayoutBinding> = reflection
                .bindings
                .iter()
                .filter(|(slot, _)| slot.set == set)
                .map(|(slot, entry)| DescriptorSetLayoutBinding {
                    binding: slot.binding,
                    descriptor_type: entry.descriptor_type,
                    count: entry.count,
                    stages: entry.visibility,
                })
                .collect();
            let layout = device.create_descriptor_set_layout(&bindings)?;

            let mut per_flight = Vec::with_capacity(SE_FRAME_FLIGHTS_COUNT);
            for _ in 0..SE_FRAME_FLIGHTS_COUNT {
                per_flight.push(pool.allocate_set(layout.as_ref())?);
            }
            bind_groups.push(per_flight);
            set_layouts.push(layout);
        }

        Ok(Self { reflection, set_layouts, bind_groups })
    }

    pub fn set_layouts(&self) -> &[Box<dyn DescriptorSetLayout>] {
        &self.set_layouts
    }

    /// Looks up `name` in the combined reflection map and patches exactly one entry of the
    /// current flight's bind-group (spec §4.3 `update_binding`).
    pub fn update_binding(
        &mut self,
        flight_index: usize,
        name: &str,
        write: impl FnOnce(&mut dyn DescriptorSet, BindingSlot) -> Result<(), String>,
    ) -> RdgResult<()> {
        let slot = *self
            .reflection
            .names
            .get(name)
            .ok_or_else(|| RdgError::ResourceMiss(name.to_string()))?;
        let set = self
            .bind_groups
            .get_mut(slot.set as usize)
            .and_then(|flights| flights.get_mut(flight_index))
            .ok_or_else(|| RdgError::ResourceMiss(name.to_string()))?;
        write(set.as_mut(), slot).map_err(RdgError::Device)
    }

    /// Convenience wiring the conventional scene-wide bindings (indices, positions, vertices,
    /// camera, geometry, material, lights, light-BVH, scene info, textures) if this pipeline's
    /// reflection declares them (spec §4.3 `update_binding_scene`).
    pub fn update_binding_scene(&mut self, flight_index: usize, scene: &dyn SceneProvider) -> RdgResult<()> {
        const SCENE_BUFFER_BINDINGS: &[(&str, fn(&dyn SceneProvider) -> &dyn lume_rhi::Buffer)] = &[
            ("indices", |s| s.indices()),
            ("positions", |s| s.positions()),
            ("vertices", |s| s.vertices()),
            ("camera", |s| s.cameras()),
            ("geometries", |s| s.geometries()),
            ("materials", |s| s.materials()),
            ("lights", |s| s.lights()),
            ("light_bvh", |s| s.light_bvh()),
            ("scene_info", |s| s.scene_info()),
        ];
        for (name, accessor) in SCENE_BUFFER_BINDINGS {
            if !self.reflection.names.contains_key(*name) {
                continue;
            }
            let buffer = accessor(scene);
            self.update_binding(flight_index, name, |set, slot| set.write_buffer(slot.binding, buffer, 0, buffer.size()))?;
        }

        if self.reflection.names.contains_key("textures") {
            let sampler = scene.sampler();
            for (index, texture) in scene.textures().iter().enumerate() {
                self.update_binding(flight_index, "textures", |set, slot| {
                    set.write_sampled_image_at(slot.binding, index as u32, *texture, sampler)
                })?;
            }
        }
        Ok(())
    }
}

/// A `RenderPass` in spec terms: owns a graphics pipeline plus the combined-reflection
/// [`PipelineState`] built from its vertex and fragment shaders. `init` is expected to load
/// `VertexMain`/`FragmentMain` entry points from one shader source and build `pipeline` from
/// them before constructing this.
pub struct RenderPassResources {
    pub pipeline: Box<dyn lume_rhi::GraphicsPipeline>,
    pub state: PipelineState,
}

impl RenderPassResources {
    pub fn new(pipeline: Box<dyn lume_rhi::GraphicsPipeline>, state: PipelineState) -> Self {
        Self { pipeline, state }
    }

    /// Binds the pipeline and every set's current-flight bind-group on `encoder` (spec §4.3
    /// `begin_pass`: "sets viewport/scissor ... and binds every bind-group"; viewport/scissor
    /// are a property of the render-pass descriptor the caller already built, not repeated
    /// here).
    pub fn begin_pass<'a>(&'a self, encoder: &mut dyn lume_rhi::RenderPass, flight_index: usize) {
        encoder.set_pipeline(self.pipeline.as_ref());
        for (set_index, flights) in self.state.bind_groups.iter().enumerate() {
            if let Some(set) = flights.get(flight_index) {
                encoder.bind_descriptor_set(set_index as u32, set.as_ref());
            }
        }
    }
}

/// A `ComputePass` in spec terms: owns a compute pipeline plus its [`PipelineState`]. `init` is
/// expected to load the `ComputeMain` entry point before constructing this.
pub struct ComputePassResources {
    pub pipeline: Box<dyn lume_rhi::ComputePipeline>,
    pub state: PipelineState,
}

impl ComputePassResources {
    pub fn new(pipeline: Box<dyn lume_rhi::ComputePipeline>, state: PipelineState) -> Self {
        Self { pipeline, state }
    }

    pub fn prepare_dispatch(&self, encoder: &mut dyn lume_rhi::ComputePass, flight_index: usize) {
        encoder.set_pipeline(self.pipeline.as_ref());
        for (set_index, flights) in self.state.bind_groups.iter().enumerate() {
            if let Some(set) = flights.get(flight_index) {
                encoder.bind_descriptor_set(set_index as u32, set.as_ref());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_marker_color_is_deterministic_per_identifier() {
        assert_eq!(debug_marker_color("Depth"), debug_marker_color("Depth"));
        assert_ne!(debug_marker_color("Depth"), debug_marker_color("Color"));
    }

    #[test]
    fn init_reflection_salts_resource_ids_by_pass_identity() {
        struct Stub;
        impl Pass for Stub {
            fn identifier(&self) -> &str {
                "Depth"
            }
            fn reflect(&self) -> PassReflection {
                let mut refl = PassReflection::default();
                refl.add_output(
                    "depth",
                    crate::resource::ResourceInfo::texture("depth", crate::resource::TextureInfo::default()),
                );
                refl
            }
            fn execute(&mut self, _ctx: &mut RenderContext, _data: &RenderData) -> RdgResult<()> {
                Ok(())
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }

        let stub = Stub;
        let (pass_uid, reflection) = init_reflection(&stub);
        let unsalted = id::string_uid("depth");
        let salted = reflection.get_resource_info("depth").unwrap().uid;
        assert_ne!(salted, unsalted);
        assert_eq!(salted, id::combine_uid(pass_uid, unsalted));
    }
}
