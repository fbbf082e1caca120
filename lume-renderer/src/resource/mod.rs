//! Virtual resource descriptors held inside a [`PassReflection`] (spec §3, §4.1, §12).
//!
//! A pass never touches a GPU handle directly; it declares a [`TextureInfo`]/[`BufferInfo`]
//! with a set of *consume entries* describing how it touches the resource, and the graph
//! turns that declaration into a physical resource plus synchronization barriers during
//! devirtualization (see `crate::graph`).

pub mod state_machine;

use std::collections::HashMap;

use lume_rhi::{
    AccessFlags, BlendState, BufferMemoryPreference, BufferUsage, ByteRange, ColorTargetState,
    CompareOp, DepthStencilState, ImageLayout, PipelineStage, ResourceId, SubresourceRange,
    TextureFormat, TextureUsage,
};

use crate::id::{self, Uid};

/// How a texture's extent is resolved at graph `build()` time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    /// Exact `(width, height, depth_or_layers)`.
    Absolute(u32, u32, u32),
    /// Multiplied against the graph's `standard_size` (default 1280x720x1).
    RelativeToStandard(f32, f32, f32),
}

impl Default for TextureSize {
    fn default() -> Self {
        TextureSize::RelativeToStandard(1.0, 1.0, 1.0)
    }
}

/// The kind of a texture consume entry; each kind carries the canonical stage/access/layout
/// defaults the core auto-fills (spec §3 "Consume entry (texture)").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureConsumeKind {
    ColorAttachment,
    DepthStencilAttachment,
    TextureBinding,
    StorageBinding,
}

/// One declared use of a texture by a pass.
#[derive(Debug, Clone, Copy)]
pub struct TextureConsumeEntry {
    pub kind: TextureConsumeKind,
    pub stages: PipelineStage,
    pub access: AccessFlags,
    pub layout: ImageLayout,
    pub range: SubresourceRange,
    /// Color attachment output index; unused outside `ColorAttachment`.
    pub location: u32,
    pub blend: Option<BlendComponentPair>,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareOp,
}

#[derive(Debug, Clone, Copy)]
pub struct BlendComponentPair {
    pub color: lume_rhi::BlendComponent,
    pub alpha: lume_rhi::BlendComponent,
}

impl TextureConsumeEntry {
    fn color_attachment(location: u32, blend: Option<BlendComponentPair>) -> Self {
        Self {
            kind: TextureConsumeKind::ColorAttachment,
            stages: PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            access: AccessFlags::COLOR_ATTACHMENT_READ | AccessFlags::COLOR_ATTACHMENT_WRITE,
            layout: ImageLayout::ColorAttachment,
            range: SubresourceRange::whole(1, 1),
            location,
            blend,
            depth_write_enabled: false,
            depth_compare: CompareOp::Always,
        }
    }

    fn depth_stencil_attachment(depth_write_enabled: bool, depth_compare: CompareOp) -> Self {
        let access = if depth_write_enabled {
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        } else {
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
        };
        Self {
            kind: TextureConsumeKind::DepthStencilAttachment,
            stages: PipelineStage::EARLY_FRAGMENT_TESTS | PipelineStage::LATE_FRAGMENT_TESTS,
            access,
            layout: ImageLayout::DepthStencilAttachment,
            range: SubresourceRange::whole(1, 1),
            location: 0,
            blend: None,
            depth_write_enabled,
            depth_compare,
        }
    }

    fn texture_binding(stages: PipelineStage, range: SubresourceRange) -> Self {
        Self {
            kind: TextureConsumeKind::TextureBinding,
            stages,
            access: AccessFlags::SHADER_READ,
            layout: ImageLayout::ShaderReadOnly,
            range,
            location: 0,
            blend: None,
            depth_write_enabled: false,
            depth_compare: CompareOp::Always,
        }
    }

    fn storage_binding(stages: PipelineStage, range: SubresourceRange, read_only: bool) -> Self {
        let access = if read_only {
            AccessFlags::SHADER_READ
        } else {
            AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE
        };
        Self {
            kind: TextureConsumeKind::StorageBinding,
            stages,
            access,
            layout: ImageLayout::General,
            range,
            location: 0,
            blend: None,
            depth_write_enabled: false,
            depth_compare: CompareOp::Always,
        }
    }
}

/// One declared use of a buffer by a pass. `size: None` means "whole buffer, resolved at
/// build time" (spec §3's `-1` sentinel, expressed the idiomatic way).
#[derive(Debug, Clone, Copy)]
pub struct BufferConsumeEntry {
    pub stages: PipelineStage,
    pub access: AccessFlags,
    pub offset: u64,
    pub size: Option<u64>,
}

impl BufferConsumeEntry {
    fn new(stages: PipelineStage, access: AccessFlags, offset: u64, size: Option<u64>) -> Self {
        Self { stages, access, offset, size }
    }

    /// Resolves against the owning buffer's declared byte size when `size` is `None`.
    pub fn byte_range(&self, buffer_size: u64) -> ByteRange {
        ByteRange { offset: self.offset, size: self.size.unwrap_or(buffer_size - self.offset) }
    }
}

/// A virtual texture descriptor declared by a pass (spec §3 `TextureInfo`).
#[derive(Debug, Clone)]
pub struct TextureInfo {
    pub size: TextureSize,
    /// `None` means "auto from max(width, height)" (spec §3's `-1` mip count).
    pub mip_level_count: Option<u32>,
    pub array_layers: u32,
    pub sample_count: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub consume_entries: Vec<TextureConsumeEntry>,
}

impl Default for TextureInfo {
    fn default() -> Self {
        Self {
            size: TextureSize::default(),
            mip_level_count: Some(1),
            array_layers: 1,
            sample_count: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::empty(),
            consume_entries: Vec::new(),
        }
    }
}

impl TextureInfo {
    pub fn with_size_absolute(mut self, width: u32, height: u32, depth_or_layers: u32) -> Self {
        self.size = TextureSize::Absolute(width, height, depth_or_layers);
        self
    }

    pub fn with_size_relative(mut self, x: f32, y: f32, z: f32) -> Self {
        self.size = TextureSize::RelativeToStandard(x, y, z);
        self
    }

    pub fn with_format(mut self, format: TextureFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_mip_levels(mut self, levels: u32) -> Self {
        self.mip_level_count = Some(levels);
        self
    }

    /// Mip count resolved from `max(width, height)` at `build()` time.
    pub fn with_auto_mip_levels(mut self) -> Self {
        self.mip_level_count = None;
        self
    }

    pub fn with_array_layers(mut self, layers: u32) -> Self {
        self.array_layers = layers;
        self
    }

    pub fn with_sample_count(mut self, samples: u32) -> Self {
        self.sample_count = samples;
        self
    }

    pub fn consume_as_color_attachment_at(mut self, location: u32) -> Self {
        self.usage |= TextureUsage::RENDER_ATTACHMENT;
        self.consume_entries.push(TextureConsumeEntry::color_attachment(location, None));
        self
    }

    pub fn consume_as_color_attachment_blended_at(
        mut self,
        location: u32,
        blend: BlendComponentPair,
    ) -> Self {
        self.usage |= TextureUsage::RENDER_ATTACHMENT;
        self.consume_entries.push(TextureConsumeEntry::color_attachment(location, Some(blend)));
        self
    }

    pub fn consume_as_depth_stencil_attachment_at(
        mut self,
        depth_write_enabled: bool,
        depth_compare: CompareOp,
    ) -> Self {
        self.usage |= TextureUsage::RENDER_ATTACHMENT;
        self.consume_entries
            .push(TextureConsumeEntry::depth_stencil_attachment(depth_write_enabled, depth_compare));
        self
    }

    pub fn consume_as_texture_binding(mut self, stages: PipelineStage, range: SubresourceRange) -> Self {
        self.usage |= TextureUsage::TEXTURE_BINDING;
        self.consume_entries.push(TextureConsumeEntry::texture_binding(stages, range));
        self
    }

    pub fn consume_as_storage_binding(mut self, stages: PipelineStage, range: SubresourceRange, read_only: bool) -> Self {
        self.usage |= TextureUsage::STORAGE_BINDING;
        self.consume_entries.push(TextureConsumeEntry::storage_binding(stages, range, read_only));
        self
    }

    /// Convenience over `consume_as_storage_binding` for the common compute read-write case.
    pub fn consume_as_storage_binding_in_compute(self, range: SubresourceRange) -> Self {
        self.consume_as_storage_binding(PipelineStage::COMPUTE_SHADER, range, false)
    }

    /// Whole-resource range sized to this texture's current mip/layer counts, falling back to
    /// one mip if auto-resolution hasn't run yet.
    pub fn whole_range(&self) -> SubresourceRange {
        SubresourceRange::whole(self.mip_level_count.unwrap_or(1), self.array_layers)
    }
}

/// A virtual buffer descriptor declared by a pass (spec §3 `BufferInfo`).
#[derive(Debug, Clone, Default)]
pub struct BufferInfo {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: BufferMemoryPreference,
    pub consume_entries: Vec<BufferConsumeEntry>,
}

impl BufferInfo {
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_memory(mut self, memory: BufferMemoryPreference) -> Self {
        self.memory = memory;
        self
    }

    pub fn consume_as_uniform(mut self, stages: PipelineStage, offset: u64, size: Option<u64>) -> Self {
        self.usage |= BufferUsage::UNIFORM;
        self.consume_entries
            .push(BufferConsumeEntry::new(stages, AccessFlags::UNIFORM_READ, offset, size));
        self
    }

    pub fn consume_as_storage_read(mut self, stages: PipelineStage, offset: u64, size: Option<u64>) -> Self {
        self.usage |= BufferUsage::STORAGE;
        self.consume_entries
            .push(BufferConsumeEntry::new(stages, AccessFlags::SHADER_READ, offset, size));
        self
    }

    pub fn consume_as_storage_write(mut self, stages: PipelineStage, offset: u64, size: Option<u64>) -> Self {
        self.usage |= BufferUsage::STORAGE;
        self.consume_entries.push(BufferConsumeEntry::new(
            stages,
            AccessFlags::SHADER_READ | AccessFlags::SHADER_WRITE,
            offset,
            size,
        ));
        self
    }

    /// Convenience over `consume_as_storage_write` for the common compute read-write case.
    pub fn consume_as_storage_binding_in_compute(self, offset: u64, size: Option<u64>) -> Self {
        self.consume_as_storage_write(PipelineStage::COMPUTE_SHADER, offset, size)
    }

    pub fn consume_as_indirect(mut self, offset: u64, size: Option<u64>) -> Self {
        self.usage |= BufferUsage::INDIRECT;
        self.consume_entries
            .push(BufferConsumeEntry::new(PipelineStage::DRAW_INDIRECT, AccessFlags::INDIRECT_COMMAND_READ, offset, size));
        self
    }

    pub fn whole_range(&self) -> ByteRange {
        ByteRange { offset: 0, size: self.size }
    }
}

/// The payload of a [`ResourceInfo`]: either a buffer or a texture descriptor.
#[derive(Debug, Clone)]
pub enum ResourceInfoData {
    Buffer(BufferInfo),
    Texture(TextureInfo),
}

/// A named resource declared inside a [`PassReflection`] (spec §3 `ResourceInfo`).
///
/// `prev` names the upstream producer's resource by UID; the graph resolves it during
/// devirtualization to decide whether this resource reuses a physical handle (input /
/// input-output) or gets a fresh one (internal / output). `reference` pins an existing GPU
/// handle directly, bypassing devirtualization's allocation.
#[derive(Debug, Clone)]
pub struct ResourceInfo {
    pub uid: Uid,
    pub data: ResourceInfoData,
    pub devirtualize_id: Option<Uid>,
    pub prev: Option<Uid>,
    pub reference: Option<ResourceId>,
}

impl ResourceInfo {
    pub fn buffer(local_name: &str, info: BufferInfo) -> Self {
        Self {
            uid: id::string_uid(local_name),
            data: ResourceInfoData::Buffer(info),
            devirtualize_id: None,
            prev: None,
            reference: None,
        }
    }

    pub fn texture(local_name: &str, info: TextureInfo) -> Self {
        Self {
            uid: id::string_uid(local_name),
            data: ResourceInfoData::Texture(info),
            devirtualize_id: None,
            prev: None,
            reference: None,
        }
    }

    pub fn is_buffer(&self) -> bool {
        matches!(self.data, ResourceInfoData::Buffer(_))
    }

    pub fn is_texture(&self) -> bool {
        matches!(self.data, ResourceInfoData::Texture(_))
    }

    pub fn as_buffer(&self) -> Option<&BufferInfo> {
        match &self.data {
            ResourceInfoData::Buffer(b) => Some(b),
            ResourceInfoData::Texture(_) => None,
        }
    }

    pub fn as_buffer_mut(&mut self) -> Option<&mut BufferInfo> {
        match &mut self.data {
            ResourceInfoData::Buffer(b) => Some(b),
            ResourceInfoData::Texture(_) => None,
        }
    }

    pub fn as_texture(&self) -> Option<&TextureInfo> {
        match &self.data {
            ResourceInfoData::Texture(t) => Some(t),
            ResourceInfoData::Buffer(_) => None,
        }
    }

    pub fn as_texture_mut(&mut self) -> Option<&mut TextureInfo> {
        match &mut self.data {
            ResourceInfoData::Texture(t) => Some(t),
            ResourceInfoData::Buffer(_) => None,
        }
    }

    /// Pins this resource to a pre-existing GPU handle, used for `add_external` (swapchain
    /// backed textures and the like). Devirtualization uses the handle instead of allocating.
    pub fn with_reference(mut self, handle: ResourceId) -> Self {
        self.reference = Some(handle);
        self
    }
}

/// Four name-keyed resource maps a pass populates in its `reflect()` hook (spec §3/§4.3).
#[derive(Debug, Clone, Default)]
pub struct PassReflection {
    pub inputs: HashMap<String, ResourceInfo>,
    pub outputs: HashMap<String, ResourceInfo>,
    pub input_outputs: HashMap<String, ResourceInfo>,
    pub internals: HashMap<String, ResourceInfo>,
}

impl PassReflection {
    pub fn add_input(&mut self, name: impl Into<String>, info: ResourceInfo) {
        self.inputs.insert(name.into(), info);
    }

    pub fn add_output(&mut self, name: impl Into<String>, info: ResourceInfo) {
        self.outputs.insert(name.into(), info);
    }

    pub fn add_input_output(&mut self, name: impl Into<String>, info: ResourceInfo) {
        self.input_outputs.insert(name.into(), info);
    }

    pub fn add_internal(&mut self, name: impl Into<String>, info: ResourceInfo) {
        self.internals.insert(name.into(), info);
    }

    /// Registers a resource pinned to an existing GPU handle without going through the
    /// input/output/internal bookkeeping (spec §12, swapchain-backed outputs).
    pub fn add_external(&mut self, name: impl Into<String>, info: ResourceInfo, handle: ResourceId) {
        self.outputs.insert(name.into(), info.with_reference(handle));
    }

    /// Looks a named resource up across all four maps, in input/output/input-output/internal
    /// order.
    pub fn get_resource_info(&self, name: &str) -> Option<&ResourceInfo> {
        self.inputs
            .get(name)
            .or_else(|| self.outputs.get(name))
            .or_else(|| self.input_outputs.get(name))
            .or_else(|| self.internals.get(name))
    }

    pub fn get_resource_info_mut(&mut self, name: &str) -> Option<&mut ResourceInfo> {
        if self.inputs.contains_key(name) {
            return self.inputs.get_mut(name);
        }
        if self.outputs.contains_key(name) {
            return self.outputs.get_mut(name);
        }
        if self.input_outputs.contains_key(name) {
            return self.input_outputs.get_mut(name);
        }
        self.internals.get_mut(name)
    }

    fn all_resources(&self) -> impl Iterator<Item = &ResourceInfo> {
        self.inputs
            .values()
            .chain(self.outputs.values())
            .chain(self.input_outputs.values())
            .chain(self.internals.values())
    }

    fn all_resources_mut(&mut self) -> impl Iterator<Item = &mut ResourceInfo> {
        self.inputs
            .values_mut()
            .chain(self.outputs.values_mut())
            .chain(self.input_outputs.values_mut())
            .chain(self.internals.values_mut())
    }

    /// Salts every resource's UID with the owning pass's identifier hash, so two passes that
    /// declare resources under the same local name never collide (spec §4.3 `Pass::init`).
    pub fn salt_ids(&mut self, pass_uid: Uid) {
        for info in self.all_resources_mut() {
            info.uid = id::combine_uid(pass_uid, info.uid);
        }
    }

    /// Synthesizes a `DepthStencilState` by scanning this reflection's textures for a
    /// `DepthStencilAttachment` consume entry.
    pub fn get_depth_stencil_state(&self) -> Option<DepthStencilState> {
        for info in self.all_resources() {
            let Some(tex) = info.as_texture() else { continue };
            for entry in &tex.consume_entries {
                if entry.kind == TextureConsumeKind::DepthStencilAttachment {
                    return Some(DepthStencilState {
                        format: tex.format,
                        depth_write_enabled: entry.depth_write_enabled,
                        depth_compare: entry.depth_compare,
                    });
                }
            }
        }
        None
    }

    /// Synthesizes `ColorTargetState`s ordered by declared attachment `location`, by scanning
    /// this reflection's textures for `ColorAttachment` consume entries.
    pub fn get_color_target_state(&self) -> Vec<ColorTargetState> {
        let mut targets: Vec<(u32, ColorTargetState)> = Vec::new();
        for info in self.all_resources() {
            let Some(tex) = info.as_texture() else { continue };
            for entry in &tex.consume_entries {
                if entry.kind != TextureConsumeKind::ColorAttachment {
                    continue;
                }
                let blend = entry.blend.map(|pair| BlendState { color: pair.color, alpha: pair.alpha });
                targets.push((entry.location, ColorTargetState { format: tex.format, blend }));
            }
        }
        targets.sort_by_key(|(location, _)| *location);
        targets.into_iter().map(|(_, state)| state).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_builder_accumulates_usage_and_entries() {
        let tex = TextureInfo::default()
            .with_format(TextureFormat::D32Float)
            .consume_as_depth_stencil_attachment_at(true, CompareOp::LessOrEqual);
        assert!(tex.usage.contains(TextureUsage::RENDER_ATTACHMENT));
        assert_eq!(tex.consume_entries.len(), 1);
        assert_eq!(tex.consume_entries[0].kind, TextureConsumeKind::DepthStencilAttachment);
    }

    #[test]
    fn pass_reflection_salts_ids_deterministically() {
        let mut a = PassReflection::default();
        a.add_output("color", ResourceInfo::texture("color", TextureInfo::default()));
        let mut b = a.clone();

        let pass_a_uid = id::string_uid("Depth");
        let pass_b_uid = id::string_uid("Color");
        a.salt_ids(pass_a_uid);
        b.salt_ids(pass_b_uid);

        assert_ne!(
            a.get_resource_info("color").unwrap().uid,
            b.get_resource_info("color").unwrap().uid
        );
    }

    #[test]
    fn color_target_state_orders_by_location() {
        let mut refl = PassReflection::default();
        refl.add_output(
            "c1",
            ResourceInfo::texture("c1", TextureInfo::default().consume_as_color_attachment_at(1)),
        );
        refl.add_output(
            "c0",
            ResourceInfo::texture("c0", TextureInfo::default().consume_as_color_attachment_at(0)),
        );
        let targets = refl.get_color_target_state();
        assert_eq!(targets.len(), 2);
    }
}
