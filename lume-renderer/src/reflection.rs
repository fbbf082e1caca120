//! Shader reflection records and their combination rules (spec §1, §4.3).
//!
//! A `PipelinePass` combines the reflection of every shader stage it runs with `+`; the rules
//! are spelled out in spec §4.3 "Combining shader reflections" and exercised by property 7
//! ("reflection composition identity").

use std::collections::HashMap;
use std::ops::Add;

use lume_rhi::{DescriptorType, ShaderStages};

/// One `(set, binding)` slot's reflected shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingSlot {
    pub set: u32,
    pub binding: u32,
}

/// What a single shader stage's reflection says about one binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingEntry {
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub visibility: ShaderStages,
    /// Every stage that sees this binding must agree it's read-only for the combined entry to
    /// stay read-only (spec §9 "AND when merging stages").
    pub not_writable: bool,
    pub not_readable: bool,
}

/// A push-constant byte range visible to some set of stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushConstantRange {
    pub offset: u32,
    pub size: u32,
    pub visibility: ShaderStages,
}

/// The reflected shape of one or more shader stages: per-slot binding entries, push-constant
/// ranges, and a name lookup into the slot map (spec §4.3).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderReflection {
    pub bindings: HashMap<BindingSlot, BindingEntry>,
    pub push_constants: Vec<PushConstantRange>,
    pub names: HashMap<String, BindingSlot>,
}

impl ShaderReflection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_binding(mut self, name: impl Into<String>, slot: BindingSlot, entry: BindingEntry) -> Self {
        self.names.insert(name.into(), slot);
        self.bindings.insert(slot, entry);
        self
    }

    pub fn with_push_constant(mut self, range: PushConstantRange) -> Self {
        self.push_constants.push(range);
        self
    }

    /// Appends ranges with identical offsets by OR-ing their visibility, then sorts by offset
    /// and coalesces ranges that abut (spec §4.3).
    fn coalesce_push_constants(mut ranges: Vec<PushConstantRange>) -> Vec<PushConstantRange> {
        ranges.sort_by_key(|r| r.offset);
        let mut merged: Vec<PushConstantRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            if let Some(last) = merged.last_mut() {
                if last.offset == range.offset {
                    last.size = last.size.max(range.size);
                    last.visibility |= range.visibility;
                    continue;
                }
                if last.offset + last.size == range.offset && last.visibility == range.visibility {
                    last.size += range.size;
                    continue;
                }
            }
            merged.push(range);
        }
        merged
    }
}

impl Add for ShaderReflection {
    type Output = ShaderReflection;

    fn add(self, rhs: ShaderReflection) -> ShaderReflection {
        let mut bindings = self.bindings;
        for (slot, rhs_entry) in rhs.bindings {
            bindings
                .entry(slot)
                .and_modify(|entry| {
                    debug_assert_eq!(
                        entry.descriptor_type, rhs_entry.descriptor_type,
                        "binding {:?} reflected with conflicting descriptor types",
                        slot
                    );
                    entry.visibility |= rhs_entry.visibility;
                    entry.not_writable = entry.not_writable && rhs_entry.not_writable;
                    entry.not_readable = entry.not_readable && rhs_entry.not_readable;
                    entry.count = entry.count.max(rhs_entry.count);
                })
                .or_insert(rhs_entry);
        }

        let mut push_constants = self.push_constants;
        push_constants.extend(rhs.push_constants);
        let push_constants = Self::coalesce_push_constants(push_constants);

        let mut names = self.names;
        for (name, slot) in rhs.names {
            if let Some(existing) = names.insert(name.clone(), slot) {
                debug_assert_eq!(existing, slot, "binding name \"{name}\" reflected at conflicting slots");
            }
        }

        ShaderReflection { bindings, push_constants, names }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ty: DescriptorType, visibility: ShaderStages) -> BindingEntry {
        BindingEntry { descriptor_type: ty, count: 1, visibility, not_writable: true, not_readable: false }
    }

    // Property 7: A + empty == A.
    #[test]
    fn composition_identity() {
        let a = ShaderReflection::empty().with_binding(
            "camera",
            BindingSlot { set: 0, binding: 0 },
            entry(DescriptorType::UniformBuffer, ShaderStages::VERTEX),
        );
        let combined = a.clone() + ShaderReflection::empty();
        assert_eq!(a, combined);
    }

    #[test]
    fn visibility_ors_and_readonly_flags_and() {
        let vs = ShaderReflection::empty().with_binding(
            "tex",
            BindingSlot { set: 0, binding: 1 },
            BindingEntry { descriptor_type: DescriptorType::SampledImage, count: 1, visibility: ShaderStages::VERTEX, not_writable: true, not_readable: false },
        );
        let fs = ShaderReflection::empty().with_binding(
            "tex",
            BindingSlot { set: 0, binding: 1 },
            BindingEntry { descriptor_type: DescriptorType::SampledImage, count: 1, visibility: ShaderStages::FRAGMENT, not_writable: false, not_readable: false },
        );
        let combined = vs + fs;
        let slot = BindingSlot { set: 0, binding: 1 };
        let merged = &combined.bindings[&slot];
        assert_eq!(merged.visibility, ShaderStages::VERTEX | ShaderStages::FRAGMENT);
        assert!(!merged.not_writable);
    }

    #[test]
    fn push_constants_merge_same_offset_and_coalesce_adjacent() {
        let a = ShaderReflection::empty().with_push_constant(PushConstantRange {
            offset: 0,
            size: 16,
            visibility: ShaderStages::VERTEX,
        });
        let b = ShaderReflection::empty().with_push_constant(PushConstantRange {
            offset: 0,
            size: 16,
            visibility: ShaderStages::FRAGMENT,
        });
        let combined = a + b;
        assert_eq!(combined.push_constants.len(), 1);
        assert_eq!(combined.push_constants[0].visibility, ShaderStages::VERTEX | ShaderStages::FRAGMENT);

        let c = ShaderReflection::empty().with_push_constant(PushConstantRange {
            offset: 0,
            size: 16,
            visibility: ShaderStages::VERTEX,
        });
        let d = ShaderReflection::empty().with_push_constant(PushConstantRange {
            offset: 16,
            size: 16,
            visibility: ShaderStages::VERTEX,
        });
        let combined = c + d;
        assert_eq!(combined.push_constants.len(), 1);
        assert_eq!(combined.push_constants[0].size, 32);
    }
}
