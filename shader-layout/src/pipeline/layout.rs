// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The binding model shared by all shader stages of a pipeline.
//!
//! A [`PipelineLayoutManager`] owns one [`BindingGroup`] per variable type. Groups are created
//! the first time a resource of their type is allocated, so group indices follow the order in
//! which variable types are first seen. A resource declared by several stages gets one binding
//! per stage; each binding is only visible to the stage that declared it.
//!
//! Once every stage has allocated its resources, [`finalize`](PipelineLayoutManager::finalize)
//! creates one native descriptor set layout per group and a pipeline layout made of them, in
//! group index order.

use crate::{
    descriptor_set::layout::BindingGroup,
    device::LayoutDevice,
    shader::{resources::Resource, ShaderStage, VariableType},
    Validated, ValidationError, VulkanError,
};
use foldhash::HashMap;
use smallvec::SmallVec;
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

/// Where a resource was placed in the binding model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotAllocation {
    /// The index of the group, which is also the descriptor set number.
    pub group: u32,

    /// The binding number within the group.
    pub binding: u32,

    /// The cache offset of the first array element within the group.
    pub cache_offset: u32,
}

/// Builds the binding groups and the native pipeline layout of a pipeline.
#[derive(Default)]
pub struct PipelineLayoutManager {
    // Dropped before the groups its layout is made of.
    native: Option<NativePipelineLayout>,
    groups: SmallVec<[BindingGroup; VariableType::COUNT]>,
    group_index: [Option<u8>; VariableType::COUNT],
    // Keyed by name, holding the catalog index of the resource the slot belongs to.
    allocations: HashMap<(ShaderStage, String), (usize, SlotAllocation)>,
}

impl PipelineLayoutManager {
    /// Creates an empty manager.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `resource`, declared by `stage`, in the group of its variable type.
    ///
    /// Allocating the same resource of the same stage again returns the existing allocation.
    /// Allocating another resource of the stage with the same name is an error.
    pub fn allocate_resource_slot(
        &mut self,
        resource: Resource<'_>,
        stage: ShaderStage,
    ) -> Result<SlotAllocation, Box<ValidationError>> {
        if self.native.is_some() {
            return Err(Box::new(ValidationError {
                problem: "the pipeline layout has already been finalized".into(),
                ..Default::default()
            }));
        }

        let key = (stage, resource.name().to_owned());

        if let Some(&(index, allocation)) = self.allocations.get(&key) {
            if index == resource.index() {
                return Ok(allocation);
            }

            return Err(Box::new(ValidationError {
                context: format!("resource `{}`", resource.name()).into(),
                problem: format!(
                    "the {:?} stage declares more than one resource with this name",
                    stage,
                )
                .into(),
            }));
        }

        let variable_type = resource.variable_type();
        let group = match self.group_index[variable_type.index()] {
            Some(group) => group as usize,
            None => {
                let group = self.groups.len();
                self.groups.push(BindingGroup::new(variable_type));
                self.group_index[variable_type.index()] = Some(group as u8);
                group
            }
        };

        let (binding, cache_offset) = self.groups[group]
            .add_binding(resource, stage)
            .map_err(|err| err.add_context(format!("resource `{}`", resource.name())))?;

        let allocation = SlotAllocation {
            group: group as u32,
            binding,
            cache_offset: cache_offset.get(),
        };
        self.allocations.insert(key, (resource.index(), allocation));

        Ok(allocation)
    }

    /// Creates the native layouts of all groups, then the pipeline layout.
    pub fn finalize(&mut self, device: &Arc<dyn LayoutDevice>) -> Result<(), Validated<VulkanError>> {
        if self.native.is_some() {
            return Err(Box::new(ValidationError {
                problem: "the pipeline layout has already been finalized".into(),
                ..Default::default()
            })
            .into());
        }

        let mut set_layouts_vk: SmallVec<[ash::vk::DescriptorSetLayout; VariableType::COUNT]> =
            SmallVec::new();

        for (index, group) in self.groups.iter_mut().enumerate() {
            if group.handle().is_none() {
                group
                    .finalize(device)
                    .map_err(|err| err.add_context(format!("groups[{}]", index)))?;
            }

            set_layouts_vk.extend(group.handle());
        }

        let create_info_vk = ash::vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts_vk);
        let handle = device.create_pipeline_layout(&create_info_vk)?;
        log::debug!(
            "created pipeline layout {:?} with {} descriptor set layouts",
            handle,
            set_layouts_vk.len(),
        );

        self.native = Some(NativePipelineLayout {
            handle,
            device: device.clone(),
        });

        Ok(())
    }

    /// Returns whether [`finalize`](Self::finalize) has succeeded.
    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.native.is_some()
    }

    /// Returns the native pipeline layout handle, if the manager has been finalized.
    #[inline]
    pub fn handle(&self) -> Option<ash::vk::PipelineLayout> {
        self.native.as_ref().map(|native| native.handle)
    }

    /// Returns the groups, in group index order.
    #[inline]
    pub fn groups(&self) -> &[BindingGroup] {
        &self.groups
    }

    /// Returns the index of the group holding resources of `variable_type`, if there is one.
    #[inline]
    pub fn group_index(&self, variable_type: VariableType) -> Option<usize> {
        self.group_index[variable_type.index()].map(usize::from)
    }

    /// Returns the total number of descriptors of each group, which are the sizes to initialize
    /// a cache with.
    pub fn group_sizes(&self) -> SmallVec<[u32; VariableType::COUNT]> {
        self.groups
            .iter()
            .map(BindingGroup::total_descriptors)
            .collect()
    }

    /// Returns the number of dynamic uniform and storage buffer descriptors in all groups.
    pub fn num_dynamic_descriptors(&self) -> u32 {
        self.groups
            .iter()
            .map(BindingGroup::num_dynamic_descriptors)
            .sum()
    }

    /// Returns whether the first `num_groups` groups of `self` and `other` are identical, so
    /// that descriptor sets bound for one can be used with the other.
    pub fn is_compatible_with(&self, other: &PipelineLayoutManager, num_groups: usize) -> bool {
        self.groups.len() >= num_groups
            && other.groups.len() >= num_groups
            && self.groups[..num_groups] == other.groups[..num_groups]
    }
}

impl PartialEq for PipelineLayoutManager {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.groups == other.groups
    }
}

impl Eq for PipelineLayoutManager {}

impl Hash for PipelineLayoutManager {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.groups.len().hash(state);

        for group in &self.groups {
            group.hash(state);
        }
    }
}

impl Debug for PipelineLayoutManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("PipelineLayoutManager")
            .field("handle", &self.handle())
            .field("groups", &self.groups)
            .finish_non_exhaustive()
    }
}

struct NativePipelineLayout {
    handle: ash::vk::PipelineLayout,
    device: Arc<dyn LayoutDevice>,
}

impl Drop for NativePipelineLayout {
    fn drop(&mut self) {
        log::debug!("destroying pipeline layout {:?}", self.handle);
        unsafe { self.device.destroy_pipeline_layout(self.handle) };
    }
}
