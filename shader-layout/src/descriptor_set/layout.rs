// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Describes the layout of all descriptors within a binding group.
//!
//! Resources are added to a [`BindingGroup`] one at a time. Each one gets the next binding
//! number and as many cache offsets as it has array elements, so both are dense starting at 0.
//! Once every resource has been added, the group is finalized into a native descriptor set
//! layout.

use crate::{
    device::LayoutDevice,
    macros::vulkan_enum,
    sampler::Sampler,
    shader::{resources::Resource, ShaderStage, ShaderStages, VariableType},
    Validated, ValidationError, VulkanError, VulkanObject,
};
use smallvec::SmallVec;
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

/// The largest binding number a group can hold.
pub const MAX_BINDING: u32 = u16::MAX as u32;

vulkan_enum! {
    /// Describes what kind of resource may later be bound to a descriptor.
    DescriptorType impl {
        /// Returns whether the offset of descriptors of this type is given when binding the set.
        #[inline]
        pub const fn is_dynamic(self) -> bool {
            matches!(self, Self::UniformBufferDynamic | Self::StorageBufferDynamic)
        }
    }
    = DescriptorType(i32);

    /// A sampler that is used together with a separately bound image.
    Sampler = SAMPLER,

    /// An image and a sampler, bound together.
    CombinedImageSampler = COMBINED_IMAGE_SAMPLER,

    /// An image that is sampled with a separately bound sampler.
    SampledImage = SAMPLED_IMAGE,

    /// An image that is read and written without a sampler.
    StorageImage = STORAGE_IMAGE,

    /// A buffer view that is only read.
    UniformTexelBuffer = UNIFORM_TEXEL_BUFFER,

    /// A buffer view that is read and written.
    StorageTexelBuffer = STORAGE_TEXEL_BUFFER,

    /// A buffer that is only read.
    UniformBuffer = UNIFORM_BUFFER,

    /// A buffer that is read and written.
    StorageBuffer = STORAGE_BUFFER,

    /// As `UniformBuffer`, but the offset within the buffer is specified at the time the
    /// descriptor set is bound.
    UniformBufferDynamic = UNIFORM_BUFFER_DYNAMIC,

    /// As `StorageBuffer`, but the offset within the buffer is specified at the time the
    /// descriptor set is bound.
    StorageBufferDynamic = STORAGE_BUFFER_DYNAMIC,
}

/// The offset of a slot within the cache region of a binding group.
///
/// Offsets are limited to 24 bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheOffset(u32);

impl CacheOffset {
    /// The largest representable offset.
    pub const MAX: u32 = (1 << 24) - 1;

    /// Returns a `CacheOffset` for `offset`, or an error if it is out of range.
    pub fn new(offset: u32) -> Result<Self, Box<ValidationError>> {
        if offset > Self::MAX {
            return Err(Box::new(ValidationError {
                problem: format!(
                    "the cache offset {} exceeds the maximum of {}",
                    offset,
                    Self::MAX,
                )
                .into(),
                ..Default::default()
            }));
        }

        Ok(CacheOffset(offset))
    }

    /// Returns the offset as an integer.
    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// A single binding in a binding group.
#[derive(Clone, Debug)]
pub struct BindingGroupBinding {
    /// The binding number.
    pub binding: u32,

    /// The type of the descriptors in the binding.
    pub descriptor_type: DescriptorType,

    /// The number of descriptors in the binding.
    pub descriptor_count: u32,

    /// The shader stage that accesses the binding.
    pub stages: ShaderStages,

    /// The samplers baked into the binding. Either empty, or it holds `descriptor_count`
    /// elements.
    pub immutable_samplers: Vec<Arc<Sampler>>,
}

impl PartialEq for BindingGroupBinding {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.binding == other.binding
            && self.descriptor_type == other.descriptor_type
            && self.descriptor_count == other.descriptor_count
            && self.stages == other.stages
            && self.immutable_samplers.is_empty() == other.immutable_samplers.is_empty()
    }
}

impl Eq for BindingGroupBinding {}

impl Hash for BindingGroupBinding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.binding.hash(state);
        self.descriptor_type.hash(state);
        self.descriptor_count.hash(state);
        self.stages.hash(state);
        self.immutable_samplers.is_empty().hash(state);
    }
}

/// Groups the bindings of all resources of one variable type.
pub struct BindingGroup {
    variable_type: VariableType,
    bindings: Vec<BindingGroupBinding>,
    total_descriptors: u32,
    num_dynamic_descriptors: u32,
    native: Option<NativeSetLayout>,
}

impl BindingGroup {
    /// Creates an empty group for resources of `variable_type`.
    pub fn new(variable_type: VariableType) -> Self {
        BindingGroup {
            variable_type,
            bindings: Vec::new(),
            total_descriptors: 0,
            num_dynamic_descriptors: 0,
            native: None,
        }
    }

    /// Appends a binding for `resource`, accessed by `stage`. Returns the binding number and
    /// the cache offset of the first array element.
    pub fn add_binding(
        &mut self,
        resource: Resource<'_>,
        stage: ShaderStage,
    ) -> Result<(u32, CacheOffset), Box<ValidationError>> {
        if self.native.is_some() {
            return Err(Box::new(ValidationError {
                problem: "the group has already been finalized".into(),
                ..Default::default()
            }));
        }

        let binding = self.bindings.len() as u32;

        if binding > MAX_BINDING {
            return Err(Box::new(ValidationError {
                problem: format!(
                    "the group already holds the maximum of {} bindings",
                    MAX_BINDING + 1,
                )
                .into(),
                ..Default::default()
            }));
        }

        let descriptor_count = resource.array_size();
        let cache_offset = CacheOffset::new(self.total_descriptors)?;
        CacheOffset::new(self.total_descriptors + descriptor_count - 1)?;

        let descriptor_type = resource.kind().descriptor_type();
        let immutable_samplers = resource
            .immutable_sampler()
            .map(|sampler| vec![sampler.clone(); descriptor_count as usize])
            .unwrap_or_default();

        self.bindings.push(BindingGroupBinding {
            binding,
            descriptor_type,
            descriptor_count,
            stages: stage.into(),
            immutable_samplers,
        });
        self.total_descriptors += descriptor_count;

        if descriptor_type.is_dynamic() {
            self.num_dynamic_descriptors += descriptor_count;
        }

        Ok((binding, cache_offset))
    }

    /// Returns the variable type of the resources in the group.
    #[inline]
    pub fn variable_type(&self) -> VariableType {
        self.variable_type
    }

    /// Returns the bindings of the group, in binding number order.
    #[inline]
    pub fn bindings(&self) -> &[BindingGroupBinding] {
        &self.bindings
    }

    /// Returns the total number of descriptors, which is also the size of the cache region of
    /// the group.
    #[inline]
    pub fn total_descriptors(&self) -> u32 {
        self.total_descriptors
    }

    /// Returns the number of descriptors whose offset is given when binding the set.
    #[inline]
    pub fn num_dynamic_descriptors(&self) -> u32 {
        self.num_dynamic_descriptors
    }

    /// Returns the native layout handle, if the group has been finalized.
    #[inline]
    pub fn handle(&self) -> Option<ash::vk::DescriptorSetLayout> {
        self.native.as_ref().map(|native| native.handle)
    }

    /// Creates the native layout of the group.
    pub fn finalize(&mut self, device: &Arc<dyn LayoutDevice>) -> Result<(), Validated<VulkanError>> {
        if self.native.is_some() {
            return Err(Box::new(ValidationError {
                problem: "the group has already been finalized".into(),
                ..Default::default()
            })
            .into());
        }

        let immutable_samplers_vk: Vec<SmallVec<[ash::vk::Sampler; 4]>> = self
            .bindings
            .iter()
            .map(|binding| {
                binding
                    .immutable_samplers
                    .iter()
                    .map(|sampler| sampler.handle())
                    .collect()
            })
            .collect();

        let bindings_vk: Vec<_> = self
            .bindings
            .iter()
            .zip(&immutable_samplers_vk)
            .map(|(binding, immutable_samplers_vk)| {
                let binding_vk = ash::vk::DescriptorSetLayoutBinding::default()
                    .binding(binding.binding)
                    .descriptor_type(binding.descriptor_type.into())
                    .descriptor_count(binding.descriptor_count)
                    .stage_flags(binding.stages.into());

                if immutable_samplers_vk.is_empty() {
                    binding_vk
                } else {
                    binding_vk.immutable_samplers(immutable_samplers_vk)
                }
            })
            .collect();

        let create_info_vk = ash::vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings_vk);
        let handle = device.create_descriptor_set_layout(&create_info_vk)?;
        log::debug!(
            "created descriptor set layout {:?} for {:?} resources ({} bindings)",
            handle,
            self.variable_type,
            self.bindings.len(),
        );

        self.native = Some(NativeSetLayout {
            handle,
            device: device.clone(),
        });

        Ok(())
    }
}

impl PartialEq for BindingGroup {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.bindings == other.bindings
    }
}

impl Eq for BindingGroup {}

impl Hash for BindingGroup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bindings.hash(state);
    }
}

impl Debug for BindingGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("BindingGroup")
            .field("variable_type", &self.variable_type)
            .field("bindings", &self.bindings)
            .field("total_descriptors", &self.total_descriptors)
            .field("handle", &self.handle())
            .finish_non_exhaustive()
    }
}

struct NativeSetLayout {
    handle: ash::vk::DescriptorSetLayout,
    device: Arc<dyn LayoutDevice>,
}

impl Drop for NativeSetLayout {
    fn drop(&mut self) {
        log::debug!("destroying descriptor set layout {:?}", self.handle);
        unsafe { self.device.destroy_descriptor_set_layout(self.handle) };
    }
}

#[cfg(test)]
mod tests {
    use super::{BindingGroup, CacheOffset, DescriptorType};
    use crate::{
        sampler::SamplerDesc,
        shader::{ImmutableSamplerDesc, ShaderDesc, ShaderStage, VariableType},
        tests::{catalog, device, sampler_cache, SpirvBuilder},
    };

    #[test]
    fn dense_bindings_and_offsets() {
        let (_mock, samplers) = sampler_cache();

        let mut builder = SpirvBuilder::new();
        builder.uniform_buffer("g_Constants", 0, 5);
        builder.separate_image_array("g_Textures", 4);
        builder.storage_image("g_Output", 2, 9);
        let catalog = catalog(&samplers, &ShaderDesc::default(), &builder.into_words());

        let mut group = BindingGroup::new(VariableType::Static);
        let mut offsets = Vec::new();

        for res in catalog.resources() {
            let (binding, offset) = group.add_binding(res, ShaderStage::Vertex).unwrap();
            assert_eq!(binding as usize, res.index());
            offsets.extend((0..res.array_size()).map(|i| offset.get() + i));
        }

        assert_eq!(group.total_descriptors(), 6);
        assert_eq!(offsets, (0..6).collect::<Vec<_>>());
        assert_eq!(group.num_dynamic_descriptors(), 1);
        assert_eq!(
            group.bindings()[0].descriptor_type,
            DescriptorType::UniformBufferDynamic,
        );
    }

    #[test]
    fn finalize_once() {
        let (mock, device) = device!();
        let samplers = crate::sampler::SamplerCache::new(device.clone());

        let mut builder = SpirvBuilder::new();
        builder.sampled_image("g_Combined", 0, 0);
        builder.uniform_buffer("g_Constants", 0, 1);
        let desc = ShaderDesc {
            immutable_samplers: vec![ImmutableSamplerDesc::new(
                "g_Combined",
                SamplerDesc::simple_repeat_linear(),
            )],
            ..Default::default()
        };
        let catalog = catalog(&samplers, &desc, &builder.into_words());

        let mut group = BindingGroup::new(VariableType::Mutable);
        for res in catalog.resources() {
            group.add_binding(res, ShaderStage::Fragment).unwrap();
        }

        group.finalize(&device).unwrap();
        assert!(group.handle().is_some());
        assert_eq!(mock.live_set_layouts(), 1);

        let recorded = mock.last_set_layout_bindings();
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].descriptor_type, ash::vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC);
        assert_eq!(recorded[1].descriptor_type, ash::vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!((recorded[1].binding, recorded[1].descriptor_count), (1, 1));
        assert_eq!(recorded[1].immutable_samplers, 1);
        assert_eq!(recorded[1].stages, ash::vk::ShaderStageFlags::FRAGMENT);

        assert!(group.finalize(&device).is_err());
        assert!(group
            .add_binding(catalog.resource(0), ShaderStage::Fragment)
            .is_err());

        drop(group);
        assert_eq!(mock.live_set_layouts(), 0);
    }

    #[test]
    fn cache_offset_range() {
        assert_eq!(CacheOffset::new(CacheOffset::MAX).unwrap().get(), CacheOffset::MAX);
        assert!(CacheOffset::new(CacheOffset::MAX + 1).is_err());
    }
}
