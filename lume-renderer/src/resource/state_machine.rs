//! Resource state machines (spec §4.1).
//!
//! Two independent trackers: [`TextureStateMachine`] keeps one ordered,
//! non-overlapping, fully-covering list of `(SubresourceRange, state)`
//! entries; [`BufferStateMachine`] keeps two such lists (writers, readers)
//! over byte ranges so it can tell RAW/WAR/WAW hazards apart. Both emit
//! [`lume_rhi::BarrierDescriptor`]s scoped to exactly the subresource that
//! changed state.
//!
//! The texture machine has no reader/writer split; a texture WAR hazard is
//! caught implicitly because any differing access or layout change still
//! goes through `update_subresource` and emits a barrier. This asymmetry
//! with the buffer machine is carried over from the source engine
//! intentionally, not an oversight (see SPEC_FULL §13).

use lume_rhi::{
    AccessFlags, BarrierDescriptor, ByteRange, ImageLayout, PipelineStage, ResourceId,
    SubresourceRange, TextureMemoryBarrier,
};

/// `(pipeline-stage-mask, access-mask, layout)` triple for one texture subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureSubState {
    pub stages: PipelineStage,
    pub access: AccessFlags,
    pub layout: ImageLayout,
}

impl TextureSubState {
    pub const fn new(stages: PipelineStage, access: AccessFlags, layout: ImageLayout) -> Self {
        Self { stages, access, layout }
    }

    /// Initial state of every subresource before anything has consumed the texture.
    pub const UNDEFINED: Self = Self {
        stages: PipelineStage::ALL_COMMANDS,
        access: AccessFlags::empty(),
        layout: ImageLayout::Undefined,
    };
}

fn mip_range_eq(a: SubresourceRange, b: SubresourceRange) -> bool {
    a.base_mip_level == b.base_mip_level && a.level_count == b.level_count
}

fn layer_range_eq(a: SubresourceRange, b: SubresourceRange) -> bool {
    a.base_array_layer == b.base_array_layer && a.layer_count == b.layer_count
}

fn intersect_range(a: SubresourceRange, b: SubresourceRange) -> Option<SubresourceRange> {
    let mip_beg = a.base_mip_level.max(b.base_mip_level);
    let mip_end = a.mip_end().min(b.mip_end());
    let layer_beg = a.base_array_layer.max(b.base_array_layer);
    let layer_end = a.layer_end().min(b.layer_end());
    if mip_beg < mip_end && layer_beg < layer_end {
        Some(SubresourceRange {
            base_mip_level: mip_beg,
            level_count: mip_end - mip_beg,
            base_array_layer: layer_beg,
            layer_count: layer_end - layer_beg,
        })
    } else {
        None
    }
}

/// Pieces of `whole` left over once `cut` (a subrange of `whole`) is removed.
/// Mip-outside pieces (spanning the whole layer range) come first, then
/// layer-outside pieces restricted to `cut`'s mip range.
fn diff_range(whole: SubresourceRange, cut: SubresourceRange) -> Vec<SubresourceRange> {
    let mut out = Vec::with_capacity(4);
    if whole.base_mip_level < cut.base_mip_level {
        out.push(SubresourceRange {
            base_mip_level: whole.base_mip_level,
            level_count: cut.base_mip_level - whole.base_mip_level,
            base_array_layer: whole.base_array_layer,
            layer_count: whole.layer_count,
        });
    }
    if cut.mip_end() < whole.mip_end() {
        out.push(SubresourceRange {
            base_mip_level: cut.mip_end(),
            level_count: whole.mip_end() - cut.mip_end(),
            base_array_layer: whole.base_array_layer,
            layer_count: whole.layer_count,
        });
    }
    if whole.base_array_layer < cut.base_array_layer {
        out.push(SubresourceRange {
            base_mip_level: cut.base_mip_level,
            level_count: cut.level_count,
            base_array_layer: whole.base_array_layer,
            layer_count: cut.base_array_layer - whole.base_array_layer,
        });
    }
    if cut.layer_end() < whole.layer_end() {
        out.push(SubresourceRange {
            base_mip_level: cut.base_mip_level,
            level_count: cut.level_count,
            base_array_layer: cut.layer_end(),
            layer_count: whole.layer_end() - cut.layer_end(),
        });
    }
    out
}

/// Merge two ranges that are identical on one axis and axis-adjacent on the other.
pub(crate) fn try_merge_range(a: SubresourceRange, b: SubresourceRange) -> Option<SubresourceRange> {
    if layer_range_eq(a, b) && a.mip_end() == b.base_mip_level {
        return Some(SubresourceRange {
            base_mip_level: a.base_mip_level,
            level_count: a.level_count + b.level_count,
            base_array_layer: a.base_array_layer,
            layer_count: a.layer_count,
        });
    }
    if layer_range_eq(a, b) && b.mip_end() == a.base_mip_level {
        return try_merge_range(b, a);
    }
    if mip_range_eq(a, b) && a.layer_end() == b.base_array_layer {
        return Some(SubresourceRange {
            base_mip_level: a.base_mip_level,
            level_count: a.level_count,
            base_array_layer: a.base_array_layer,
            layer_count: a.layer_count + b.layer_count,
        });
    }
    if mip_range_eq(a, b) && b.layer_end() == a.base_array_layer {
        return try_merge_range(b, a);
    }
    None
}

fn texture_barrier(
    texture: ResourceId,
    range: SubresourceRange,
    prev: TextureSubState,
    next: TextureSubState,
) -> BarrierDescriptor {
    BarrierDescriptor {
        src_stage_mask: prev.stages,
        dst_stage_mask: next.stages,
        memory_barriers: Vec::new(),
        buffer_memory_barriers: Vec::new(),
        texture_memory_barriers: vec![TextureMemoryBarrier {
            texture,
            range,
            old_layout: prev.layout,
            new_layout: next.layout,
            src_access: prev.access,
            dst_access: next.access,
        }],
    }
}

/// Per-subresource pipeline-stage/access/layout tracker for one texture (spec §4.1).
#[derive(Debug, Clone)]
pub struct TextureStateMachine {
    resource: ResourceId,
    entries: Vec<(SubresourceRange, TextureSubState)>,
}

impl TextureStateMachine {
    /// A fresh machine covering `mip_levels` mips × `array_layers` layers, all `UNDEFINED`.
    pub fn new(resource: ResourceId, mip_levels: u32, array_layers: u32) -> Self {
        Self {
            resource,
            entries: vec![(SubresourceRange::whole(mip_levels, array_layers), TextureSubState::UNDEFINED)],
        }
    }

    pub fn entries(&self) -> &[(SubresourceRange, TextureSubState)] {
        &self.entries
    }

    /// Transition `range` to `state`, emitting the minimal set of barriers.
    /// If an existing entry already covers `range` exactly with the target
    /// state applied on top, still emits one barrier (property 4 only holds
    /// when the state truly doesn't change on the matching entry).
    pub fn update_subresource(&mut self, range: SubresourceRange, state: TextureSubState) -> Vec<BarrierDescriptor> {
        let mut barriers = Vec::new();
        let mut added: Vec<(SubresourceRange, TextureSubState)> = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            let (entry_range, entry_state) = self.entries[i];
            if entry_range == range {
                if entry_state != state {
                    barriers.push(texture_barrier(self.resource, range, entry_state, state));
                }
                self.entries[i].1 = state;
                return barriers;
            }
            if let Some(isect) = intersect_range(entry_range, range) {
                if entry_state != state {
                    barriers.push(texture_barrier(self.resource, isect, entry_state, state));
                }
                added.push((isect, state));
                for piece in diff_range(entry_range, isect) {
                    added.push((piece, entry_state));
                }
                self.entries.remove(i);
                continue;
            }
            i += 1;
        }
        self.entries.extend(added);
        self.try_merge();
        barriers
    }

    /// Run `update_subresource` for every entry of `other` in order, concatenating barriers.
    /// Used to transition this machine's tracked GPU-side state to another machine's state
    /// at graph boundaries (spec §4.1 "Transition across machines").
    pub fn transition(&mut self, other: &TextureStateMachine) -> Vec<BarrierDescriptor> {
        let mut out = Vec::new();
        for &(range, state) in &other.entries {
            out.extend(self.update_subresource(range, state));
        }
        out
    }

    fn try_merge(&mut self) {
        if self.entries.len() <= 1 {
            return;
        }
        loop {
            let mut merged_any = false;
            'outer: for i in 0..self.entries.len() {
                for j in 0..self.entries.len() {
                    if i == j {
                        continue;
                    }
                    let (ra, sa) = self.entries[i];
                    let (rb, sb) = self.entries[j];
                    if sa == sb {
                        if let Some(merged) = try_merge_range(ra, rb) {
                            let (hi, lo) = if i > j { (i, j) } else { (j, i) };
                            self.entries.remove(hi);
                            self.entries.remove(lo);
                            self.entries.push((merged, sa));
                            merged_any = true;
                            break 'outer;
                        }
                    }
                }
            }
            if !merged_any {
                break;
            }
        }
    }
}

/// Coalesces texture sub-barriers that share an image, access pair and layout pair whose
/// ranges are axis-adjacent, used by the graph's per-pass barrier-bucket merge pass (spec
/// §4.4 "coalesce image sub-barriers with identical image/access/layout whose subresource
/// ranges are adjacent").
pub(crate) fn merge_texture_sub_barriers(list: &mut Vec<TextureMemoryBarrier>) {
    loop {
        let mut merged_any = false;
        'outer: for i in 0..list.len() {
            for j in 0..list.len() {
                if i == j {
                    continue;
                }
                let a = list[i];
                let b = list[j];
                let same_transition = a.texture == b.texture
                    && a.src_access == b.src_access
                    && a.dst_access == b.dst_access
                    && a.old_layout == b.old_layout
                    && a.new_layout == b.new_layout;
                if same_transition {
                    if let Some(merged_range) = try_merge_range(a.range, b.range) {
                        let (hi, lo) = if i > j { (i, j) } else { (j, i) };
                        list.remove(hi);
                        list.remove(lo);
                        list.push(TextureMemoryBarrier { range: merged_range, ..a });
                        merged_any = true;
                        break 'outer;
                    }
                }
            }
        }
        if !merged_any {
            break;
        }
    }
}

/// `(pipeline-stage-mask, access-mask)` for one buffer byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSubState {
    pub stages: PipelineStage,
    pub access: AccessFlags,
}

impl Default for BufferSubState {
    fn default() -> Self {
        Self { stages: PipelineStage::empty(), access: AccessFlags::empty() }
    }
}

/// Access bits that represent a write for RAW/WAR/WAW discrimination (spec §4.1).
pub const WRITE_ACCESS: AccessFlags = AccessFlags::SHADER_WRITE
    .union(AccessFlags::COLOR_ATTACHMENT_WRITE)
    .union(AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
    .union(AccessFlags::TRANSFER_WRITE)
    .union(AccessFlags::HOST_WRITE)
    .union(AccessFlags::MEMORY_WRITE);

/// Access bits that represent a read.
pub const READ_ACCESS: AccessFlags = AccessFlags::INDIRECT_COMMAND_READ
    .union(AccessFlags::INDEX_READ)
    .union(AccessFlags::VERTEX_ATTRIBUTE_READ)
    .union(AccessFlags::UNIFORM_READ)
    .union(AccessFlags::SHADER_READ)
    .union(AccessFlags::COLOR_ATTACHMENT_READ)
    .union(AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ)
    .union(AccessFlags::TRANSFER_READ)
    .union(AccessFlags::HOST_READ)
    .union(AccessFlags::MEMORY_READ);

fn intersect_byte_range(a: ByteRange, b: ByteRange) -> Option<ByteRange> {
    let beg = a.offset.max(b.offset);
    let end = a.end().min(b.end());
    if beg < end {
        Some(ByteRange { offset: beg, size: end - beg })
    } else {
        None
    }
}

fn diff_byte_range(whole: ByteRange, cut: ByteRange) -> Vec<ByteRange> {
    let mut out = Vec::with_capacity(2);
    if whole.offset < cut.offset {
        out.push(ByteRange { offset: whole.offset, size: cut.offset - whole.offset });
    }
    if cut.end() < whole.end() {
        out.push(ByteRange { offset: cut.end(), size: whole.end() - cut.end() });
    }
    out
}

fn buffer_barrier(
    buffer: ResourceId,
    range: ByteRange,
    prev: BufferSubState,
    next: BufferSubState,
) -> BarrierDescriptor {
    BarrierDescriptor {
        src_stage_mask: prev.stages,
        dst_stage_mask: next.stages,
        memory_barriers: Vec::new(),
        buffer_memory_barriers: vec![lume_rhi::BufferMemoryBarrier {
            buffer,
            range,
            src_access: prev.access,
            dst_access: next.access,
        }],
        texture_memory_barriers: Vec::new(),
    }
}

/// RAW/WAR/WAW hazard tracker over byte ranges of one buffer (spec §4.1).
#[derive(Debug, Clone, Default)]
pub struct BufferStateMachine {
    resource: Option<ResourceId>,
    writers: Vec<(ByteRange, BufferSubState)>,
    readers: Vec<(ByteRange, BufferSubState)>,
}

impl BufferStateMachine {
    pub fn new(resource: ResourceId) -> Self {
        Self { resource: Some(resource), writers: Vec::new(), readers: Vec::new() }
    }

    pub fn writers(&self) -> &[(ByteRange, BufferSubState)] {
        &self.writers
    }

    pub fn readers(&self) -> &[(ByteRange, BufferSubState)] {
        &self.readers
    }

    /// Transition byte `range` to `state`, emitting RAW/WAR/WAW barriers against the
    /// existing writer/reader history and updating that history.
    pub fn update_subresource(&mut self, range: ByteRange, state: BufferSubState) -> Vec<BarrierDescriptor> {
        let resource = self.resource.expect("BufferStateMachine used before resource id was set");
        let mut barriers = Vec::new();
        let write_access = state.access & WRITE_ACCESS;
        let read_access = state.access & READ_ACCESS;

        if !write_access.is_empty() {
            let target = BufferSubState { stages: state.stages, access: write_access };
            for &(r, s) in &self.writers {
                if let Some(isect) = intersect_byte_range(r, range) {
                    if !s.access.is_empty() {
                        barriers.push(buffer_barrier(resource, isect, s, target));
                    }
                }
            }
            for &(r, s) in &self.readers {
                if let Some(isect) = intersect_byte_range(r, range) {
                    if !s.access.is_empty() {
                        barriers.push(buffer_barrier(resource, isect, s, target));
                    }
                }
            }
        }
        if !read_access.is_empty() {
            let target = BufferSubState { stages: state.stages, access: read_access };
            for &(r, s) in &self.writers {
                if let Some(isect) = intersect_byte_range(r, range) {
                    if !s.access.is_empty() {
                        barriers.push(buffer_barrier(resource, isect, s, target));
                    }
                }
            }
        }

        if !write_access.is_empty() {
            let target = BufferSubState { stages: state.stages, access: write_access };
            Self::replace_overlapping(&mut self.writers, range, target);
            // A write invalidates any chained readers over the same range.
            Self::replace_overlapping(&mut self.readers, range, BufferSubState::default());
            self.readers.retain(|(_, s)| !s.access.is_empty());
        }
        if !read_access.is_empty() {
            // The read has just been synchronized against every overlapping writer above via
            // RAW barriers; retire those writer entries so a second read over the same range
            // doesn't see them again and re-emit a redundant RAW (spec property 5 / Scenario D:
            // "between R1 and R2, zero barriers").
            Self::replace_overlapping(&mut self.writers, range, BufferSubState::default());
            self.writers.retain(|(_, s)| !s.access.is_empty());
            Self::or_merge_overlapping(&mut self.readers, range, state.stages, read_access);
        }
        barriers
    }

    /// Replaces whatever `list` says about `range` with `target`, splitting
    /// any partially-overlapping entries so every byte of `list`'s domain
    /// keeps exactly one state. Bytes of `range` not previously covered by
    /// any entry (including the common case of a fresh, empty `list`) get a
    /// new entry too — `list` only ever describes `range`'s own history, so
    /// silently dropping that piece would mean the first write/read to a
    /// byte range never gets recorded.
    fn replace_overlapping(list: &mut Vec<(ByteRange, BufferSubState)>, range: ByteRange, target: BufferSubState) {
        let mut added = Vec::new();
        let mut remaining = vec![range];
        let mut i = 0;
        while i < list.len() {
            let (r, s) = list[i];
            if r == range {
                list[i].1 = target;
                return;
            }
            if let Some(isect) = intersect_byte_range(r, range) {
                for piece in diff_byte_range(r, isect) {
                    added.push((piece, s));
                }
                list.remove(i);
                remaining = remaining
                    .iter()
                    .flat_map(|&rr| match intersect_byte_range(rr, isect) {
                        Some(cut) => diff_byte_range(rr, cut),
                        None => vec![rr],
                    })
                    .collect();
                continue;
            }
            i += 1;
        }
        for rem in remaining {
            added.push((rem, target));
        }
        list.extend(added);
    }

    fn or_merge_overlapping(
        list: &mut Vec<(ByteRange, BufferSubState)>,
        range: ByteRange,
        stages: PipelineStage,
        access: AccessFlags,
    ) {
        let mut added = Vec::new();
        let mut remaining = vec![range];
        let mut i = 0;
        while i < list.len() {
            let (r, s) = list[i];
            if r == range {
                list[i].1 = BufferSubState { stages: s.stages | stages, access: s.access | access };
                return;
            }
            if let Some(isect) = intersect_byte_range(r, range) {
                added.push((isect, BufferSubState { stages: s.stages | stages, access: s.access | access }));
                for piece in diff_byte_range(r, isect) {
                    added.push((piece, s));
                }
                list.remove(i);
                remaining = remaining
                    .iter()
                    .flat_map(|&rr| match intersect_byte_range(rr, isect) {
                        Some(cut) => diff_byte_range(rr, cut),
                        None => vec![rr],
                    })
                    .collect();
                continue;
            }
            i += 1;
        }
        for rem in remaining {
            added.push((rem, BufferSubState { stages, access }));
        }
        list.extend(added);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whole(mips: u32, layers: u32) -> SubresourceRange {
        SubresourceRange::whole(mips, layers)
    }

    // Scenario C: split subresource.
    #[test]
    fn texture_split_subresource() {
        let mut sm = TextureStateMachine::new(1, 4, 1);
        let s1 = TextureSubState::new(PipelineStage::FRAGMENT_SHADER, AccessFlags::SHADER_READ, ImageLayout::ShaderReadOnly);
        let s2 = TextureSubState::new(PipelineStage::COMPUTE_SHADER, AccessFlags::SHADER_WRITE, ImageLayout::General);

        let range_full = SubresourceRange { base_mip_level: 0, level_count: 4, base_array_layer: 0, layer_count: 1 };
        let barriers = sm.update_subresource(range_full, s1);
        assert_eq!(barriers.len(), 1);

        let range_mid = SubresourceRange { base_mip_level: 1, level_count: 2, base_array_layer: 0, layer_count: 1 };
        let barriers = sm.update_subresource(range_mid, s2);
        assert_eq!(barriers.len(), 1);
        assert_eq!(barriers[0].texture_memory_barriers[0].range, range_mid);

        let mut entries = sm.entries().to_vec();
        entries.sort_by_key(|(r, _)| r.base_mip_level);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, SubresourceRange { base_mip_level: 0, level_count: 1, base_array_layer: 0, layer_count: 1 });
        assert_eq!(entries[0].1, s1);
        assert_eq!(entries[1].0, range_mid);
        assert_eq!(entries[1].1, s2);
        assert_eq!(entries[2].0, SubresourceRange { base_mip_level: 3, level_count: 1, base_array_layer: 0, layer_count: 1 });
        assert_eq!(entries[2].1, s1);
    }

    #[test]
    fn texture_coverage_invariant_holds_after_updates() {
        let mut sm = TextureStateMachine::new(2, 4, 2);
        let s = TextureSubState::new(PipelineStage::COMPUTE_SHADER, AccessFlags::SHADER_WRITE, ImageLayout::General);
        sm.update_subresource(SubresourceRange { base_mip_level: 1, level_count: 1, base_array_layer: 0, layer_count: 1 }, s);
        sm.update_subresource(SubresourceRange { base_mip_level: 0, level_count: 2, base_array_layer: 1, layer_count: 1 }, s);

        let total: u64 = sm.entries().iter().map(|(r, _)| (r.level_count as u64) * (r.layer_count as u64)).sum();
        assert_eq!(total, 4 * 2);
        for (i, (ra, _)) in sm.entries().iter().enumerate() {
            for (j, (rb, _)) in sm.entries().iter().enumerate() {
                if i != j {
                    assert!(intersect_range(*ra, *rb).is_none());
                }
            }
        }
    }

    #[test]
    fn texture_no_barrier_when_state_unchanged_on_matching_entry() {
        let mut sm = TextureStateMachine::new(3, 1, 1);
        let s = TextureSubState::new(PipelineStage::FRAGMENT_SHADER, AccessFlags::SHADER_READ, ImageLayout::ShaderReadOnly);
        let range = whole(1, 1);
        sm.update_subresource(range, s);
        let barriers = sm.update_subresource(range, s);
        assert!(barriers.is_empty());
    }

    // Scenario D: read-read fan-in.
    #[test]
    fn buffer_raw_then_read_read_no_hazard() {
        let mut sm = BufferStateMachine::new(1);
        let range = ByteRange { offset: 0, size: 64 };
        let write = BufferSubState { stages: PipelineStage::COMPUTE_SHADER, access: AccessFlags::SHADER_WRITE };
        let read = BufferSubState { stages: PipelineStage::FRAGMENT_SHADER, access: AccessFlags::SHADER_READ };

        sm.update_subresource(range, write);
        let raw = sm.update_subresource(range, read);
        assert_eq!(raw.len(), 1);

        let second_read = sm.update_subresource(range, read);
        assert!(second_read.is_empty());
    }

    #[test]
    fn buffer_waw_and_war_and_rar() {
        let mut sm = BufferStateMachine::new(1);
        let range = ByteRange { offset: 0, size: 16 };
        let write = BufferSubState { stages: PipelineStage::COMPUTE_SHADER, access: AccessFlags::SHADER_WRITE };
        let read = BufferSubState { stages: PipelineStage::VERTEX_SHADER, access: AccessFlags::SHADER_READ };

        // two writers -> one WAW
        sm.update_subresource(range, write);
        let waw = sm.update_subresource(range, write);
        assert_eq!(waw.len(), 1);

        // reader then writer -> one WAR
        sm.update_subresource(range, read);
        let war = sm.update_subresource(range, write);
        assert_eq!(war.len(), 1);

        // two readers -> zero barriers
        sm.update_subresource(range, read);
        let rar = sm.update_subresource(range, read);
        assert!(rar.is_empty());
    }
}
