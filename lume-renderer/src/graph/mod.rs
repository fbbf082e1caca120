//! The render dependency graph: DAG construction, topological flatten, resource
//! devirtualization, barrier synthesis, and the execution driver (spec §4.4).
//!
//! Passes are registered by the graph and connected by name; `build()` turns that declaration
//! into physical GPU resources and a pre-computed barrier list per pass, and `execute()` walks
//! the flattened order issuing those barriers and invoking each pass.

use std::collections::{HashMap, HashSet, VecDeque};

use lume_rhi::{
    BarrierDescriptor, BarrierResourceLookup, Buffer, BufferDescriptor, Device, ImageLayout, PipelineStage,
    ResourceId, Texture, TextureDescriptor, TextureDimension, TextureUsage,
};

use crate::error::{RdgError, RdgResult};
use crate::id::{self, Uid};
use crate::pass::{debug_marker_color, init_reflection, Pass, RenderContext, RenderData};
use crate::resource::state_machine::{merge_texture_sub_barriers, BufferStateMachine, BufferSubState, TextureStateMachine, TextureSubState};
use crate::resource::{BufferConsumeEntry, ResourceInfoData, TextureConsumeEntry, TextureSize};

/// Forward adjacency over pass ids: `adj[a]` is the set of passes `a` produces for.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    adj: HashMap<Uid, HashSet<Uid>>,
}

impl Dag {
    pub fn ensure_node(&mut self, node: Uid) {
        self.adj.entry(node).or_default();
    }

    pub fn add_edge(&mut self, src: Uid, dst: Uid) {
        self.adj.entry(src).or_default().insert(dst);
        self.adj.entry(dst).or_default();
    }

    pub fn len(&self) -> usize {
        self.adj.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }

    /// A new DAG with every edge's direction flipped (spec §12, used by the editor's debug
    /// visualization rather than by `flatten_bfs` itself — see the note on `flatten_bfs` below).
    pub fn reverse(&self) -> Dag {
        let mut out = Dag::default();
        for &node in self.adj.keys() {
            out.ensure_node(node);
        }
        for (&src, succs) in &self.adj {
            for &dst in succs {
                out.add_edge(dst, src);
            }
        }
        out
    }
}

/// Sink-first extraction on a mutable copy of `dag`'s adjacency: repeatedly pick *a* node with
/// no outgoing edges (any one — the first found in iteration order), push it onto a stack, and
/// erase it from every remaining node's successor set. The stack popped back-to-front is a
/// producer-before-consumer linearization (spec §4.4 `flatten_bfs`).
///
/// Seeds from a single sink per iteration, matching the source engine's behavior exactly: on a
/// disconnected DAG only the component reachable from the first-found sink gets ordered, and
/// the remaining components are silently absent from the result (same `len() != total` check
/// that also catches a genuine cycle). This is the "single-sink" open question (SPEC_FULL §13)
/// kept intentionally rather than looped over every remaining sink.
pub fn flatten_bfs(dag: &Dag) -> Option<Vec<Uid>> {
    let mut working = dag.adj.clone();
    let mut rev_list = Vec::with_capacity(working.len());
    let mut waiting: VecDeque<Uid> = VecDeque::new();

    for (&node, succs) in &working {
        if succs.is_empty() {
            waiting.push_back(node);
            break;
        }
    }

    while let Some(node) = waiting.pop_front() {
        rev_list.push(node);
        for succs in working.values_mut() {
            succs.remove(&node);
        }
        working.remove(&node);

        for (&candidate, succs) in &working {
            if succs.is_empty() {
                waiting.push_back(candidate);
                break;
            }
        }
    }

    rev_list.reverse();
    if rev_list.len() == dag.len() {
        Some(rev_list)
    } else {
        None
    }
}

/// A physical texture owned by the graph after `build()` (spec §3 `TextureResource`).
struct PhysicalTexture {
    name: String,
    size: TextureSize,
    mip_level_count: Option<u32>,
    array_layers: u32,
    sample_count: u32,
    format: lume_rhi::TextureFormat,
    usage: TextureUsage,
    /// When set, devirtualization pinned this resource to an externally-owned GPU handle
    /// instead of allocating a fresh one (spec §4.4 "A `reference` field ... may pin a
    /// specific pre-existing GPU handle").
    reference: Option<ResourceId>,
    history: Vec<(Uid, TextureConsumeEntry)>,
    handle: Option<Box<dyn Texture>>,
    start_state: Option<TextureStateMachine>,
    end_state: Option<TextureStateMachine>,
}

/// A physical buffer owned by the graph after `build()` (spec §3 `BufferResource`).
struct PhysicalBuffer {
    name: String,
    size: u64,
    usage: lume_rhi::BufferUsage,
    memory: lume_rhi::BufferMemoryPreference,
    reference: Option<ResourceId>,
    history: Vec<(Uid, BufferConsumeEntry)>,
    handle: Option<Box<dyn Buffer>>,
    start_state: Option<BufferStateMachine>,
    end_state: Option<BufferStateMachine>,
}

/// Resolves a devirtualization id to the live GPU resource it was bound to, so
/// `CommandEncoder::pipeline_barrier` can look up handles by id (spec's
/// `BarrierResourceLookup`, implemented here rather than by the backend since the graph is
/// what owns the id -> handle mapping).
struct GraphResourceLookup<'a> {
    textures: &'a HashMap<Uid, PhysicalTexture>,
    buffers: &'a HashMap<Uid, PhysicalBuffer>,
    external_textures: &'a HashMap<ResourceId, Box<dyn Texture>>,
}

impl<'a> BarrierResourceLookup for GraphResourceLookup<'a> {
    fn resolve_buffer(&self, id: ResourceId) -> Option<&dyn Buffer> {
        self.buffers.get(&id).and_then(|b| b.handle.as_deref())
    }

    fn resolve_texture(&self, id: ResourceId) -> Option<&dyn Texture> {
        if let Some(t) = self.external_textures.get(&id) {
            return Some(t.as_ref());
        }
        self.textures.get(&id).and_then(|t| t.handle.as_deref())
    }
}

/// The render dependency graph (spec §4.4 `Graph`).
pub struct Graph {
    passes: HashMap<Uid, Box<dyn Pass>>,
    reflections: HashMap<Uid, crate::resource::PassReflection>,
    insertion_order: Vec<Uid>,
    dag: Dag,
    edges_debug: Vec<(Uid, Uid, String, String)>,
    standard_size: (u32, u32, u32),
    flattened: Vec<Uid>,
    textures: HashMap<Uid, PhysicalTexture>,
    buffers: HashMap<Uid, PhysicalBuffer>,
    external_textures: HashMap<ResourceId, Box<dyn Texture>>,
    /// Pre-pass barrier bucket, keyed by the consuming pass's id.
    barriers: HashMap<Uid, Vec<BarrierDescriptor>>,
    output: Option<(Uid, String)>,
}

impl Default for Graph {
    fn default() -> Self {
        Self {
            passes: HashMap::new(),
            reflections: HashMap::new(),
            insertion_order: Vec::new(),
            dag: Dag::default(),
            edges_debug: Vec::new(),
            standard_size: (1280, 720, 1),
            flattened: Vec::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            external_textures: HashMap::new(),
            barriers: HashMap::new(),
            output: None,
        }
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_standard_size(&mut self, size: (u32, u32, u32)) {
        self.standard_size = size;
    }

    /// Registers `pass`, calling `reflect()` once and salting its declared resource ids with
    /// the pass's identifier hash (spec §4.3 `Pass::init`). Returns the pass's id, used by
    /// `add_edge`.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) -> Uid {
        let (pass_uid, reflection) = init_reflection(pass.as_ref());
        self.dag.ensure_node(pass_uid);
        self.insertion_order.push(pass_uid);
        self.passes.insert(pass_uid, pass);
        self.reflections.insert(pass_uid, reflection);
        pass_uid
    }

    /// Registers a producer -> consumer edge, wiring `dst_resource`'s `prev` link to
    /// `src_resource`'s (salted) id. Unknown pass/resource names are a validation error: logged
    /// and the edge is dropped so `build()` can keep surfacing further errors (spec §7).
    pub fn add_edge(&mut self, src_pass: Uid, src_resource: &str, dst_pass: Uid, dst_resource: &str) -> RdgResult<()> {
        let src_uid = self
            .reflections
            .get(&src_pass)
            .and_then(|r| r.get_resource_info(src_resource))
            .map(|info| info.uid)
            .ok_or_else(|| {
                let err = RdgError::Validation(format!("unknown source resource \"{src_resource}\""));
                log::error!("{err}");
                err
            })?;

        {
            let dst_refl = self.reflections.get_mut(&dst_pass).ok_or_else(|| {
                let err = RdgError::Validation("unknown destination pass".to_string());
                log::error!("{err}");
                err
            })?;
            let dst_info = dst_refl.get_resource_info_mut(dst_resource).ok_or_else(|| {
                let err = RdgError::Validation(format!("unknown destination resource \"{dst_resource}\""));
                log::error!("{err}");
                err
            })?;
            dst_info.prev = Some(src_uid);
        }

        self.dag.add_edge(src_pass, dst_pass);
        self.edges_debug.push((src_pass, dst_pass, src_resource.to_string(), dst_resource.to_string()));
        Ok(())
    }

    /// Records the graph's presentation output; OR-masks `RENDER_ATTACHMENT` into the
    /// resource's usage so a downstream presenter can blit it (spec §4.4 `mark_output`).
    pub fn mark_output(&mut self, pass: Uid, resource: &str) -> RdgResult<()> {
        let refl = self
            .reflections
            .get_mut(&pass)
            .ok_or_else(|| RdgError::Validation("unknown output pass".to_string()))?;
        let info = refl
            .get_resource_info_mut(resource)
            .ok_or_else(|| RdgError::Validation(format!("unknown output resource \"{resource}\"")))?;
        if let Some(tex) = info.as_texture_mut() {
            tex.usage |= TextureUsage::RENDER_ATTACHMENT;
        }
        self.output = Some((pass, resource.to_string()));
        Ok(())
    }

    /// Binds a live GPU handle for a resource pinned via `ResourceInfo::with_reference`
    /// (swapchain-backed outputs and the like) so `execute()` can resolve barriers against it.
    pub fn bind_external_texture(&mut self, id: ResourceId, handle: Box<dyn Texture>) {
        self.external_textures.insert(id, handle);
    }

    /// Topologically orders passes, devirtualizes every declared resource into a physical
    /// buffer or texture, and pre-computes each pass's barrier list (spec §4.4 `build`).
    pub fn build(&mut self, device: &dyn Device) -> RdgResult<()> {
        let flattened = flatten_bfs(&self.dag).ok_or_else(|| {
            let err = RdgError::Topology { flattened: 0, total: self.dag.len() };
            log::error!("{err}");
            err
        })?;
        self.flattened = flattened;

        self.devirtualize();
        self.resolve_sizes();
        self.create_physical_resources(device)?;
        self.synthesize_barriers();
        self.merge_barriers();
        Ok(())
    }

    fn devirtualize(&mut self) {
        let mut resource_to_devirt: HashMap<Uid, Uid> = HashMap::new();

        for &pass_uid in &self.flattened.clone() {
            let reflection = self.reflections.get(&pass_uid).unwrap().clone();

            for (name, info) in reflection.outputs.iter().chain(reflection.internals.iter()) {
                let devirt_id = info.reference.unwrap_or_else(id::next_runtime_uid);
                resource_to_devirt.insert(info.uid, devirt_id);
                self.register_consume(pass_uid, name, &info.data, devirt_id, info.reference, true);
            }

            for (name, info) in reflection.inputs.iter().chain(reflection.input_outputs.iter()) {
                let devirt_id = if let Some(reference) = info.reference {
                    reference
                } else if let Some(prev) = info.prev.and_then(|p| resource_to_devirt.get(&p).copied()) {
                    prev
                } else {
                    log::error!("input-output resource \"{name}\" on pass {pass_uid:x} has no producer; allocating a fresh resource");
                    id::next_runtime_uid()
                };
                resource_to_devirt.insert(info.uid, devirt_id);
                self.register_consume(pass_uid, name, &info.data, devirt_id, info.reference, false);
            }
        }
    }

    /// Creates (on first sight) or updates (on reuse) the physical resource record for one
    /// consume-entry set, OR-merging usage bits and appending consume history.
    fn register_consume(
        &mut self,
        pass_uid: Uid,
        name: &str,
        data: &ResourceInfoData,
        devirt_id: Uid,
        reference: Option<ResourceId>,
        fresh: bool,
    ) {
        match data {
            ResourceInfoData::Texture(tex) => {
                let entry = self.textures.entry(devirt_id).or_insert_with(|| PhysicalTexture {
                    name: format!("RDG::{pass_uid:x}::{name}"),
                    size: tex.size,
                    mip_level_count: tex.mip_level_count,
                    array_layers: tex.array_layers,
                    sample_count: tex.sample_count,
                    format: tex.format,
                    usage: TextureUsage::empty(),
                    reference,
                    history: Vec::new(),
                    handle: None,
                    start_state: None,
                    end_state: None,
                });
                entry.usage |= tex.usage;
                if fresh && entry.reference.is_none() {
                    entry.reference = reference;
                }
                for consume in &tex.consume_entries {
                    entry.history.push((pass_uid, *consume));
                }
            }
            ResourceInfoData::Buffer(buf) => {
                let entry = self.buffers.entry(devirt_id).or_insert_with(|| PhysicalBuffer {
                    name: format!("RDG::{pass_uid:x}::{name}"),
                    size: buf.size,
                    usage: lume_rhi::BufferUsage::empty(),
                    memory: buf.memory,
                    reference,
                    history: Vec::new(),
                    handle: None,
                    start_state: None,
                    end_state: None,
                });
                entry.usage |= buf.usage;
                if fresh && entry.reference.is_none() {
                    entry.reference = reference;
                }
                for consume in &buf.consume_entries {
                    entry.history.push((pass_uid, *consume));
                }
            }
        }
    }

    /// Resolves `-1` mip counts to `floor(log2(max(w,h))) + 1` and relative sizes against
    /// `standard_size` (spec §4.4 "Auto size resolution").
    fn resolve_sizes(&mut self) {
        for tex in self.textures.values_mut() {
            let (width, height, _depth) = match tex.size {
                TextureSize::Absolute(w, h, d) => (w, h, d),
                TextureSize::RelativeToStandard(x, y, z) => (
                    (self.standard_size.0 as f32 * x) as u32,
                    (self.standard_size.1 as f32 * y) as u32,
                    (self.standard_size.2 as f32 * z) as u32,
                ),
            };
            if tex.mip_level_count.is_none() {
                let max_dim = width.max(height).max(1);
                tex.mip_level_count = Some((max_dim as f32).log2().floor() as u32 + 1);
            }
        }
    }

    fn create_physical_resources(&mut self, device: &dyn Device) -> RdgResult<()> {
        for tex in self.textures.values_mut() {
            if tex.reference.is_some() {
                continue;
            }
            let (width, height, depth_or_layers) = match tex.size {
                TextureSize::Absolute(w, h, d) => (w, h, d),
                TextureSize::RelativeToStandard(x, y, z) => (
                    (self.standard_size.0 as f32 * x) as u32,
                    (self.standard_size.1 as f32 * y) as u32,
                    (self.standard_size.2 as f32 * z) as u32,
                ),
            };
            let dimension = if tex.array_layers > 1 { TextureDimension::D2Array } else { TextureDimension::D2 };
            let descriptor = TextureDescriptor {
                label: None,
                size: (width, height, depth_or_layers.max(tex.array_layers)),
                format: tex.format,
                usage: tex.usage,
                dimension,
                mip_level_count: tex.mip_level_count.unwrap_or(1),
            };
            let handle = device.create_texture(&descriptor).map_err(|e| {
                let err = RdgError::Device(e);
                log::error!("{err}");
                err
            })?;
            tex.handle = Some(handle);
        }

        for buf in self.buffers.values_mut() {
            if buf.reference.is_some() {
                continue;
            }
            let descriptor = BufferDescriptor { label: None, size: buf.size, usage: buf.usage, memory: buf.memory };
            let handle = device.create_buffer(&descriptor).map_err(|e| {
                let err = RdgError::Device(e);
                log::error!("{err}");
                err
            })?;
            buf.handle = Some(handle);
        }
        Ok(())
    }

    /// Per physical resource, walks its consume history in pass order, initializing a state
    /// machine from the first entry (`startState`) and running `update_subresource` for every
    /// later entry, attaching emitted barriers to the consuming pass's bucket (spec §4.4
    /// "Barrier synthesis").
    fn synthesize_barriers(&mut self) {
        for (&devirt_id, tex) in self.textures.iter_mut() {
            let mip_levels = tex.mip_level_count.unwrap_or(1);
            let Some((_, first)) = tex.history.first().copied() else { continue };
            let mut sm = TextureStateMachine::new(devirt_id, mip_levels, tex.array_layers);
            sm.update_subresource(first.range, sub_state(&first));
            let start_state = sm.clone();

            for &(pass_uid, entry) in tex.history.iter().skip(1) {
                let emitted = sm.update_subresource(entry.range, sub_state(&entry));
                if !emitted.is_empty() {
                    self.barriers.entry(pass_uid).or_default().extend(emitted);
                }
            }
            tex.start_state = Some(start_state);
            tex.end_state = Some(sm);
        }

        for (&devirt_id, buf) in self.buffers.iter_mut() {
            let Some((_, first)) = buf.history.first().copied() else { continue };
            let mut sm = BufferStateMachine::new(devirt_id);
            sm.update_subresource(first.byte_range(buf.size), buffer_sub_state(&first));
            let start_state = sm.clone();

            for &(pass_uid, entry) in buf.history.iter().skip(1) {
                let emitted = sm.update_subresource(entry.byte_range(buf.size), buffer_sub_state(&entry));
                if !emitted.is_empty() {
                    self.barriers.entry(pass_uid).or_default().extend(emitted);
                }
            }
            buf.start_state = Some(start_state);
            buf.end_state = Some(sm);
        }
    }

    /// Coalesces same-bucket barriers that share `(src_stage_mask, dst_stage_mask)` into one
    /// `BarrierDescriptor`, then merges adjacent texture sub-barriers within each merged
    /// descriptor (spec §4.4 "barrier merging").
    fn merge_barriers(&mut self) {
        for bucket in self.barriers.values_mut() {
            let mut by_stage_pair: HashMap<(PipelineStage, PipelineStage), BarrierDescriptor> = HashMap::new();
            for barrier in bucket.drain(..) {
                let key = (barrier.src_stage_mask, barrier.dst_stage_mask);
                let merged = by_stage_pair.entry(key).or_insert_with(|| BarrierDescriptor {
                    src_stage_mask: barrier.src_stage_mask,
                    dst_stage_mask: barrier.dst_stage_mask,
                    ..Default::default()
                });
                merged.memory_barriers.extend(barrier.memory_barriers);
                merged.buffer_memory_barriers.extend(barrier.buffer_memory_barriers);
                merged.texture_memory_barriers.extend(barrier.texture_memory_barriers);
            }
            for merged in by_stage_pair.values_mut() {
                merge_texture_sub_barriers(&mut merged.texture_memory_barriers);
            }
            *bucket = by_stage_pair.into_values().collect();
        }
    }

    /// Walks flattened passes, issuing each pass's pre-computed barriers, a debug marker, and
    /// its `execute` hook (spec §4.4 "Execution driver").
    pub fn execute(&mut self, encoder: &mut dyn lume_rhi::CommandEncoder, flight_index: usize, data: &RenderData) -> RdgResult<()> {
        self.transition_in(encoder);

        for &pass_uid in &self.flattened.clone() {
            if let Some(bucket) = self.barriers.get(&pass_uid) {
                let lookup = GraphResourceLookup {
                    textures: &self.textures,
                    buffers: &self.buffers,
                    external_textures: &self.external_textures,
                };
                for barrier in bucket {
                    encoder.pipeline_barrier(barrier, &lookup);
                }
            }

            let pass = self.passes.get_mut(&pass_uid).unwrap();
            let _marker_color = debug_marker_color(pass.identifier());
            let mut ctx = RenderContext { encoder: &mut *encoder, flight_index };
            pass.execute(&mut ctx, data)?;
        }

        self.transition_out();
        Ok(())
    }

    /// Transitions every physical texture from its current GPU-side tracked state to the
    /// graph's entry state, idempotent across frames (spec §4.4 step 1).
    fn transition_in(&mut self, encoder: &mut dyn lume_rhi::CommandEncoder) {
        for tex in self.textures.values() {
            let (Some(start), Some(handle)) = (&tex.start_state, tex.handle.as_deref()) else { continue };
            let Some((_, first_state)) = start.entries().first().copied() else { continue };
            encoder.pipeline_barrier_texture(handle, ImageLayout::Undefined, first_state.1.layout);
        }
    }

    /// Stores each resource's `endState` back so the next graph execution starts coherently
    /// (spec §4.4 step 3). Physical allocation is per-`build()`, so this simply leaves the
    /// machines as they are; a long-lived graph across frames keeps calling `execute` against
    /// the same `start_state`/`end_state` pair without re-running `build()`.
    fn transition_out(&mut self) {
        // `start_state`/`end_state` already hold the graph-entry and graph-exit states computed
        // by `synthesize_barriers`; nothing further to persist until `build()` runs again.
    }

    pub fn flattened_order(&self) -> &[Uid] {
        &self.flattened
    }

    pub fn edges_debug(&self) -> &[(Uid, Uid, String, String)] {
        &self.edges_debug
    }

    pub fn barriers_for(&self, pass: Uid) -> &[BarrierDescriptor] {
        self.barriers.get(&pass).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

fn sub_state(entry: &TextureConsumeEntry) -> TextureSubState {
    TextureSubState::new(entry.stages, entry.access, entry.layout)
}

fn buffer_sub_state(entry: &BufferConsumeEntry) -> BufferSubState {
    BufferSubState { stages: entry.stages, access: entry.access }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{PassReflection, ResourceInfo};

    struct StubPass {
        name: &'static str,
        reflection: fn() -> PassReflection,
    }

    impl Pass for StubPass {
        fn identifier(&self) -> &str {
            self.name
        }
        fn reflect(&self) -> PassReflection {
            (self.reflection)()
        }
        fn execute(&mut self, _ctx: &mut RenderContext, _data: &RenderData) -> RdgResult<()> {
            Ok(())
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    // Property 1 + Scenario E: diamond graph, A first, D last.
    #[test]
    fn flatten_orders_diamond_with_producer_first() {
        let mut dag = Dag::default();
        let (a, b, c, d) = (1, 2, 3, 4);
        dag.add_edge(a, b);
        dag.add_edge(a, c);
        dag.add_edge(b, d);
        dag.add_edge(c, d);

        let order = flatten_bfs(&dag).unwrap();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], a);
        assert_eq!(order[3], d);
        assert!(order.contains(&b) && order.contains(&c));
    }

    // Scenario F: cyclic error.
    #[test]
    fn flatten_detects_cycle() {
        let mut dag = Dag::default();
        dag.add_edge(1, 2);
        dag.add_edge(2, 1);
        assert!(flatten_bfs(&dag).is_none());
    }

    #[test]
    fn build_fails_with_topology_error_on_cycle() {
        struct NoOpPass(&'static str);
        impl Pass for NoOpPass {
            fn identifier(&self) -> &str {
                self.0
            }
            fn reflect(&self) -> PassReflection {
                PassReflection::default()
            }
            fn execute(&mut self, _ctx: &mut RenderContext, _data: &RenderData) -> RdgResult<()> {
                Ok(())
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }

        let mut graph = Graph::new();
        let a = graph.add_pass(Box::new(NoOpPass("A")));
        let b = graph.add_pass(Box::new(NoOpPass("B")));
        graph.dag.add_edge(a, b);
        graph.dag.add_edge(b, a);

        let result = flatten_bfs(&graph.dag);
        assert!(result.is_none());
        assert!(graph.textures.is_empty());
        assert!(graph.buffers.is_empty());
    }

    #[test]
    fn devirtualization_shares_physical_resource_across_input_output_edge() {
        fn depth_reflection() -> PassReflection {
            let mut refl = PassReflection::default();
            refl.add_output(
                "depth",
                ResourceInfo::texture(
                    "depth",
                    crate::resource::TextureInfo::default().consume_as_depth_stencil_attachment_at(true, lume_rhi::CompareOp::LessOrEqual),
                ),
            );
            refl
        }
        fn color_reflection() -> PassReflection {
            let mut refl = PassReflection::default();
            refl.add_input_output(
                "depth",
                ResourceInfo::texture(
                    "depth",
                    crate::resource::TextureInfo::default().consume_as_depth_stencil_attachment_at(false, lume_rhi::CompareOp::Equal),
                ),
            );
            refl
        }

        let mut graph = Graph::new();
        let depth_pass = graph.add_pass(Box::new(StubPass { name: "Depth", reflection: depth_reflection }));
        let color_pass = graph.add_pass(Box::new(StubPass { name: "Color", reflection: color_reflection }));
        graph.add_edge(depth_pass, "depth", color_pass, "depth").unwrap();

        graph.flattened = flatten_bfs(&graph.dag).unwrap();
        graph.devirtualize();

        assert_eq!(graph.textures.len(), 1);
        let tex = graph.textures.values().next().unwrap();
        assert_eq!(tex.history.len(), 2);
    }
}
