// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The catalog of resources a shader declares.
//!
//! A [`ResourceCatalog`] is built once per shader and never changes afterwards. Its resources are
//! sorted into runs by [`ResourceKind`], in the order of the variants of that enum, and within
//! each run they are in the order the shader declares them. Layouts refer to resources by their
//! index in the catalog, so these indices must stay stable.

use super::{
    reflect::{self, ReflectedResource, Reflection},
    spirv::Spirv,
    ShaderDesc, ShaderStage, VariableType, VariableTypes,
};
use crate::{
    descriptor_set::layout::DescriptorType,
    memory::pool::{ArenaSizer, PooledStr, ResourceArena, StringPool},
    sampler::{Sampler, SamplerCache},
    Validated, ValidationError, VulkanError,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::{
    fmt::{Display, Error as FmtError, Formatter},
    ops::{Deref, Range},
    sync::Arc,
};

/// The maximum number of distinct immutable samplers a single shader can reference.
pub const MAX_IMMUTABLE_SAMPLERS: usize = u8::MAX as usize;

/// The kind of a shader resource.
///
/// The order of the variants is the order of the runs in a [`ResourceCatalog`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum ResourceKind {
    /// A uniform (constant) buffer.
    UniformBuffer,

    /// A read-write storage buffer.
    StorageBuffer,

    /// A formatted buffer that is only read.
    UniformTexelBuffer,

    /// A formatted buffer that is read and written.
    StorageTexelBuffer,

    /// An image that is read and written without a sampler.
    StorageImage,

    /// An image combined with a sampler.
    SampledImage,

    /// An atomic counter buffer.
    AtomicCounter,

    /// A sampler declared separately from any image.
    SeparateSampler,

    /// An image declared separately from any sampler.
    SeparateImage,
}

/// Native descriptor type of each resource kind, indexed by `ResourceKind as usize`.
const DESCRIPTOR_TYPES: [DescriptorType; ResourceKind::COUNT] = [
    DescriptorType::UniformBufferDynamic,
    DescriptorType::StorageBufferDynamic,
    DescriptorType::UniformTexelBuffer,
    DescriptorType::StorageTexelBuffer,
    DescriptorType::StorageImage,
    DescriptorType::CombinedImageSampler,
    DescriptorType::StorageBuffer,
    DescriptorType::Sampler,
    DescriptorType::SampledImage,
];

impl ResourceKind {
    /// The number of resource kinds.
    pub const COUNT: usize = 9;

    /// All resource kinds, in run order.
    pub const ALL: [ResourceKind; Self::COUNT] = [
        Self::UniformBuffer,
        Self::StorageBuffer,
        Self::UniformTexelBuffer,
        Self::StorageTexelBuffer,
        Self::StorageImage,
        Self::SampledImage,
        Self::AtomicCounter,
        Self::SeparateSampler,
        Self::SeparateImage,
    ];

    /// Returns the native descriptor type used for resources of this kind.
    #[inline]
    pub const fn descriptor_type(self) -> DescriptorType {
        DESCRIPTOR_TYPES[self as usize]
    }

    /// Returns whether resources of this kind can have an immutable sampler.
    #[inline]
    pub const fn allows_immutable_sampler(self) -> bool {
        matches!(self, Self::SampledImage | Self::SeparateSampler)
    }

    /// Returns whether resources of this kind are bound with a dynamic offset.
    #[inline]
    pub const fn has_dynamic_offset(self) -> bool {
        matches!(self, Self::UniformBuffer | Self::StorageBuffer)
    }

    /// Returns a human-readable name of the kind.
    pub const fn name(self) -> &'static str {
        match self {
            Self::UniformBuffer => "uniform buffer",
            Self::StorageBuffer => "storage buffer",
            Self::UniformTexelBuffer => "uniform texel buffer",
            Self::StorageTexelBuffer => "storage texel buffer",
            Self::StorageImage => "storage image",
            Self::SampledImage => "sampled image",
            Self::AtomicCounter => "atomic counter",
            Self::SeparateSampler => "separate sampler",
            Self::SeparateImage => "separate image",
        }
    }
}

/// A resource declared by a shader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceDescriptor {
    name: PooledStr,
    array_size: u16,
    kind: ResourceKind,
    variable_type: VariableType,
    immutable_sampler: Option<u8>,
    paired_resource: Option<u32>,
    binding_patch_offset: u32,
    descriptor_set_patch_offset: u32,
}

impl ResourceDescriptor {
    /// Returns the number of array elements; 1 for resources that are not arrays.
    #[inline]
    pub fn array_size(&self) -> u32 {
        self.array_size as u32
    }

    /// Returns the kind of the resource.
    #[inline]
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the variable type of the resource.
    #[inline]
    pub fn variable_type(&self) -> VariableType {
        self.variable_type
    }

    /// Returns the index of the immutable sampler of the resource in the catalog, if any.
    #[inline]
    pub fn immutable_sampler_index(&self) -> Option<usize> {
        self.immutable_sampler.map(usize::from)
    }

    /// Returns whether the resource has an immutable sampler.
    #[inline]
    pub fn has_immutable_sampler(&self) -> bool {
        self.immutable_sampler.is_some()
    }

    /// For a separate image, returns the catalog index of the sampler assigned to it. For a
    /// separate sampler, returns the catalog index of the image it is assigned to.
    #[inline]
    pub fn paired_resource_index(&self) -> Option<usize> {
        self.paired_resource.map(|index| index as usize)
    }

    /// Returns the word offset in the SPIR-V module of the binding number of the resource.
    #[inline]
    pub fn binding_patch_offset(&self) -> usize {
        self.binding_patch_offset as usize
    }

    /// Returns the word offset in the SPIR-V module of the descriptor set number of the
    /// resource.
    #[inline]
    pub fn descriptor_set_patch_offset(&self) -> usize {
        self.descriptor_set_patch_offset as usize
    }
}

/// A resource of a catalog, together with its name.
#[derive(Clone, Copy, Debug)]
pub struct Resource<'a> {
    catalog: &'a ResourceCatalog,
    index: usize,
    descriptor: &'a ResourceDescriptor,
}

impl<'a> Resource<'a> {
    /// Returns the index of the resource in its catalog.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the name of the resource.
    #[inline]
    pub fn name(&self) -> &'a str {
        self.catalog.names.get(self.descriptor.name)
    }

    /// Returns the name of array element `array_index`, for example `g_Textures[2]`.
    pub fn print_name(&self, array_index: u32) -> String {
        debug_assert!(array_index < self.array_size());

        if self.array_size() > 1 {
            format!("{}[{}]", self.name(), array_index)
        } else {
            self.name().to_owned()
        }
    }

    /// Returns the descriptor of the resource.
    #[inline]
    pub fn descriptor(&self) -> &'a ResourceDescriptor {
        self.descriptor
    }

    /// Returns the immutable sampler of the resource, if any.
    #[inline]
    pub fn immutable_sampler(&self) -> Option<&'a Arc<Sampler>> {
        self.descriptor
            .immutable_sampler_index()
            .map(|index| &self.catalog.immutable_samplers[index])
    }

    /// Returns the resource this resource is paired with by combined sampler emulation.
    #[inline]
    pub fn paired_resource(&self) -> Option<Resource<'a>> {
        self.descriptor
            .paired_resource_index()
            .map(|index| self.catalog.resource(index))
    }
}

impl Deref for Resource<'_> {
    type Target = ResourceDescriptor;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.descriptor
    }
}

/// An input of a vertex shader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageInput {
    semantic: PooledStr,
    location: u32,
    location_patch_offset: u32,
}

impl StageInput {
    /// Returns the location the shader was compiled with.
    #[inline]
    pub fn location(&self) -> u32 {
        self.location
    }

    /// Returns the word offset in the SPIR-V module of the location of the input.
    #[inline]
    pub fn location_patch_offset(&self) -> usize {
        self.location_patch_offset as usize
    }
}

/// The number of resources of each kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceCounts([u32; ResourceKind::COUNT]);

impl ResourceCounts {
    /// Returns the number of resources of `kind`.
    #[inline]
    pub fn get(&self, kind: ResourceKind) -> u32 {
        self.0[kind as usize]
    }

    /// Returns the total number of resources.
    #[inline]
    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }
}

/// The resources declared by one shader.
#[derive(Debug)]
pub struct ResourceCatalog {
    name: String,
    stage: ShaderStage,
    combined_sampler_suffix: Option<String>,

    descriptors: Box<[ResourceDescriptor]>,
    immutable_samplers: Box<[Arc<Sampler>]>,
    stage_inputs: Box<[StageInput]>,
    names: StringPool,

    // Start of the run of each kind, followed by the total number of resources.
    offsets: [u32; ResourceKind::COUNT + 1],
}

impl ResourceCatalog {
    /// Builds the catalog of the shader whose SPIR-V words are `words`.
    ///
    /// Immutable samplers referenced by the shader are created through `samplers`.
    pub fn new(
        samplers: &SamplerCache,
        desc: &ShaderDesc,
        words: &[u32],
    ) -> Result<Arc<ResourceCatalog>, Validated<VulkanError>> {
        let spirv = Spirv::new(words).map_err(|err| {
            Box::new(ValidationError {
                context: "bytecode".into(),
                problem: format!("is not a valid SPIR-V module: {}", err).into(),
            })
        })?;
        let reflection = reflect::reflect(&spirv, desc.stage)
            .map_err(|err| err.add_context(format!("shader `{}`", desc.name)))?;

        Self::from_reflection(samplers, desc, &reflection)
    }

    fn from_reflection(
        samplers: &SamplerCache,
        desc: &ShaderDesc,
        reflection: &Reflection,
    ) -> Result<Arc<ResourceCatalog>, Validated<VulkanError>> {
        // The immutable samplers this shader references, as indices into
        // `desc.immutable_samplers`, in order of first reference.
        let mut referenced_samplers: SmallVec<[usize; 4]> = SmallVec::new();
        let mut sizes = ArenaSizer::default();

        for kind in ResourceKind::ALL {
            for res in reflection.of_kind(kind) {
                sizes.add_descriptor(&res.name);

                if kind.allows_immutable_sampler() {
                    let is_separate_sampler = kind == ResourceKind::SeparateSampler;

                    if let Some(index) = desc.find_immutable_sampler(&res.name, is_separate_sampler)
                    {
                        if !referenced_samplers.contains(&index) {
                            referenced_samplers.push(index);
                            sizes.add_sampler();
                        }
                    }
                }
            }
        }

        for input in &reflection.stage_inputs {
            sizes.add_string(&input.semantic);
        }

        if referenced_samplers.len() > MAX_IMMUTABLE_SAMPLERS {
            return Err(Box::new(ValidationError {
                context: format!("shader `{}`", desc.name).into(),
                problem: format!(
                    "the shader references {} immutable samplers, but at most {} are supported",
                    referenced_samplers.len(),
                    MAX_IMMUTABLE_SAMPLERS,
                )
                .into(),
            })
            .into());
        }

        let mut arena = ResourceArena::new(sizes);

        for &index in &referenced_samplers {
            let sampler = samplers
                .get_or_create(&desc.immutable_samplers[index].sampler)
                .map_err(|err| {
                    err.add_context(format!("immutable_samplers[{}].sampler", index))
                })?;
            arena.push_sampler(sampler);
        }

        let suffix = desc.combined_sampler_suffix();
        let mut offsets = [0; ResourceKind::COUNT + 1];

        for kind in ResourceKind::ALL {
            offsets[kind as usize] = arena.descriptors().len() as u32;

            for res in reflection.of_kind(kind) {
                let descriptor = Self::make_descriptor(&mut arena, desc, &referenced_samplers, res)?;
                let index = arena.push_descriptor(descriptor);

                if kind == ResourceKind::SeparateImage {
                    if let Some(suffix) = suffix {
                        Self::pair_with_sampler(&mut arena, &offsets, index, suffix);
                    }
                }
            }
        }

        offsets[ResourceKind::COUNT] = arena.descriptors().len() as u32;

        let stage_inputs: Vec<_> = reflection
            .stage_inputs
            .iter()
            .map(|input| StageInput {
                semantic: arena.names_mut().copy_string(&input.semantic),
                location: input.location,
                location_patch_offset: input.location_offset as u32,
            })
            .collect();

        let (descriptors, immutable_samplers, names) = arena.finish();

        let catalog = ResourceCatalog {
            name: desc.name.clone(),
            stage: desc.stage,
            combined_sampler_suffix: suffix.map(str::to_owned),
            descriptors,
            immutable_samplers,
            stage_inputs: stage_inputs.into_boxed_slice(),
            names,
            offsets,
        };

        if cfg!(debug_assertions) {
            catalog.report_unused_declarations(desc);
        }

        Ok(Arc::new(catalog))
    }

    fn make_descriptor(
        arena: &mut ResourceArena<ResourceDescriptor, Arc<Sampler>>,
        desc: &ShaderDesc,
        referenced_samplers: &[usize],
        res: &ReflectedResource,
    ) -> Result<ResourceDescriptor, Box<ValidationError>> {
        let is_separate_sampler = res.kind == ResourceKind::SeparateSampler;

        log::debug!(
            "shader `{}`: {} `{}` compiled at set {} binding {}",
            desc.name,
            res.kind.name(),
            res.name,
            res.descriptor_set,
            res.binding,
        );

        let immutable_sampler = if res.kind.allows_immutable_sampler() {
            desc.find_immutable_sampler(&res.name, is_separate_sampler)
                .and_then(|index| referenced_samplers.iter().position(|&i| i == index))
                .map(|position| position as u8)
        } else {
            None
        };

        let binding_patch_offset = u32::try_from(res.binding_offset);
        let descriptor_set_patch_offset = u32::try_from(res.descriptor_set_offset);

        let (Ok(binding_patch_offset), Ok(descriptor_set_patch_offset)) =
            (binding_patch_offset, descriptor_set_patch_offset)
        else {
            return Err(Box::new(ValidationError {
                context: res.name.clone().into(),
                problem: "the decorations of the variable are beyond the addressable range of \
                    the module"
                    .into(),
            }));
        };

        Ok(ResourceDescriptor {
            name: arena.names_mut().copy_string(&res.name),
            array_size: res.array_size,
            kind: res.kind,
            variable_type: desc.find_variable_type(&res.name, is_separate_sampler),
            immutable_sampler,
            paired_resource: None,
            binding_patch_offset,
            descriptor_set_patch_offset,
        })
    }

    /// Assigns the separate sampler named `<image name><suffix>` to the separate image at
    /// `image_index`, if there is one. Samplers precede images, so it has already been pushed.
    fn pair_with_sampler(
        arena: &mut ResourceArena<ResourceDescriptor, Arc<Sampler>>,
        offsets: &[u32; ResourceKind::COUNT + 1],
        image_index: usize,
        suffix: &str,
    ) {
        let samplers = offsets[ResourceKind::SeparateSampler as usize] as usize
            ..offsets[ResourceKind::SeparateImage as usize] as usize;
        let image = &arena.descriptors()[image_index];
        let image_name = arena.names().get(image.name);
        let image_array_size = image.array_size;

        let sampler_index = samplers.into_iter().find(|&i| {
            let sampler_name = arena.names().get(arena.descriptors()[i].name);

            sampler_name.strip_suffix(suffix) == Some(image_name)
        });

        let Some(sampler_index) = sampler_index else {
            return;
        };

        let sampler_array_size = arena.descriptors()[sampler_index].array_size;

        if !sampler_array_size_fits(sampler_array_size.into(), image_array_size.into())
            && cfg!(debug_assertions)
        {
            log::warn!(
                "separate sampler `{}{}` has {} elements, but the texture it is assigned to has \
                {}; it must have either 1 element or as many as the texture",
                image_name,
                suffix,
                sampler_array_size,
                image_array_size,
            );
        }

        arena.descriptor_mut(image_index).paired_resource = Some(sampler_index as u32);
        arena.descriptor_mut(sampler_index).paired_resource = Some(image_index as u32);
    }

    fn report_unused_declarations(&self, desc: &ShaderDesc) {
        let suffix = self.combined_sampler_suffix();
        let declares = |name: &str| {
            self.resources().any(|res| {
                res.name() == name
                    || (res.kind() == ResourceKind::SeparateSampler
                        && suffix.is_some_and(|suffix| {
                            res.name().strip_suffix(suffix) == Some(name)
                        }))
            })
        };

        for variable in &desc.variables {
            if !declares(&variable.name) {
                log::warn!(
                    "variable `{}` is listed in the description of shader `{}`, but the shader \
                    does not declare it",
                    variable.name,
                    self.name,
                );
            }
        }

        for sampler in &desc.immutable_samplers {
            let used = self.resources().any(|res| {
                res.kind().allows_immutable_sampler()
                    && desc.find_immutable_sampler(
                        res.name(),
                        res.kind() == ResourceKind::SeparateSampler,
                    )
                    .is_some_and(|index| desc.immutable_samplers[index].name == sampler.name)
            });

            if !used {
                log::warn!(
                    "immutable sampler `{}` is listed in the description of shader `{}`, but no \
                    sampler or texture of the shader uses it",
                    sampler.name,
                    self.name,
                );
            }
        }
    }

    /// Builds a catalog that only contains the resources of `self` whose variable type is in
    /// `allowed`. Pairings between resources that are both kept are preserved.
    pub fn filtered(&self, allowed: VariableTypes) -> Arc<ResourceCatalog> {
        let mut sizes = ArenaSizer::default();
        let mut kept = Vec::with_capacity(self.descriptors.len());

        for res in self.resources() {
            if allowed.contains_type(res.variable_type()) {
                sizes.add_descriptor(res.name());
                kept.push(res.index());
            }
        }

        for (semantic, _) in self.stage_inputs() {
            sizes.add_string(semantic);
        }

        for _ in self.immutable_samplers.iter() {
            sizes.add_sampler();
        }

        let mut arena = ResourceArena::new(sizes);

        for sampler in self.immutable_samplers.iter() {
            arena.push_sampler(sampler.clone());
        }

        let new_index = |old: usize| kept.iter().position(|&i| i == old).map(|i| i as u32);
        let mut offsets = [0; ResourceKind::COUNT + 1];

        for kind in ResourceKind::ALL {
            offsets[kind as usize] = arena.descriptors().len() as u32;

            for res in self.resources_of_kind(kind) {
                if !allowed.contains_type(res.variable_type()) {
                    continue;
                }

                let descriptor = ResourceDescriptor {
                    name: arena.names_mut().copy_string(res.name()),
                    paired_resource: res.paired_resource_index().and_then(new_index),
                    ..res.descriptor().clone()
                };
                arena.push_descriptor(descriptor);
            }
        }

        offsets[ResourceKind::COUNT] = arena.descriptors().len() as u32;

        let stage_inputs: Vec<_> = self
            .stage_inputs
            .iter()
            .map(|input| StageInput {
                semantic: arena
                    .names_mut()
                    .copy_string(self.names.get(input.semantic)),
                ..input.clone()
            })
            .collect();

        let (descriptors, immutable_samplers, names) = arena.finish();

        Arc::new(ResourceCatalog {
            name: self.name.clone(),
            stage: self.stage,
            combined_sampler_suffix: self.combined_sampler_suffix.clone(),
            descriptors,
            immutable_samplers,
            stage_inputs: stage_inputs.into_boxed_slice(),
            names,
            offsets,
        })
    }

    /// Returns the name of the shader, as given in its description.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the stage of the shader.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Returns the combined sampler suffix, if combined sampler emulation is enabled.
    #[inline]
    pub fn combined_sampler_suffix(&self) -> Option<&str> {
        self.combined_sampler_suffix.as_deref()
    }

    /// Returns whether combined sampler emulation is enabled.
    #[inline]
    pub fn is_using_combined_samplers(&self) -> bool {
        self.combined_sampler_suffix.is_some()
    }

    /// Returns the total number of resources.
    #[inline]
    pub fn total_resources(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns the index of the first resource of `kind`. For [`ResourceKind::COUNT`] this is
    /// the total number of resources.
    #[inline]
    pub fn kind_offset(&self, kind: ResourceKind) -> usize {
        self.offsets[kind as usize] as usize
    }

    /// Returns the range of indices of the resources of `kind`.
    #[inline]
    pub fn kind_range(&self, kind: ResourceKind) -> Range<usize> {
        self.offsets[kind as usize] as usize..self.offsets[kind as usize + 1] as usize
    }

    /// Returns the number of resources of `kind`.
    #[inline]
    pub fn num_resources(&self, kind: ResourceKind) -> usize {
        self.kind_range(kind).len()
    }

    /// Returns the resource at `index`.
    ///
    /// # Panics
    ///
    /// - Panics if `index` is out of range.
    #[inline]
    pub fn resource(&self, index: usize) -> Resource<'_> {
        Resource {
            catalog: self,
            index,
            descriptor: &self.descriptors[index],
        }
    }

    /// Returns an iterator over all resources, in catalog order.
    pub fn resources(&self) -> impl ExactSizeIterator<Item = Resource<'_>> {
        (0..self.descriptors.len()).map(move |index| self.resource(index))
    }

    /// Returns an iterator over the resources of `kind`.
    pub fn resources_of_kind(&self, kind: ResourceKind) -> impl ExactSizeIterator<Item = Resource<'_>> {
        self.kind_range(kind).map(move |index| self.resource(index))
    }

    /// Returns the resource named `name`, if any.
    pub fn find(&self, name: &str) -> Option<Resource<'_>> {
        self.resources().find(|res| res.name() == name)
    }

    /// Returns the immutable samplers referenced by the resources.
    #[inline]
    pub fn immutable_samplers(&self) -> &[Arc<Sampler>] {
        &self.immutable_samplers
    }

    /// Returns the inputs of the shader, if it is a vertex shader, with their semantics.
    pub fn stage_inputs(&self) -> impl ExactSizeIterator<Item = (&str, &StageInput)> {
        self.stage_inputs
            .iter()
            .map(move |input| (self.names.get(input.semantic), input))
    }

    /// Counts the resources of each kind whose variable type is in `allowed`.
    pub fn count_resources(&self, allowed: VariableTypes) -> ResourceCounts {
        let mut counts = ResourceCounts::default();

        for res in self.resources() {
            if allowed.contains_type(res.variable_type()) {
                counts.0[res.kind() as usize] += 1;
            }
        }

        counts
    }

    /// Calls `f` for every resource whose variable type is in `allowed`, in catalog order. The
    /// second argument is the index of the resource within the run of its kind.
    pub fn process_resources<'a>(
        &'a self,
        allowed: VariableTypes,
        mut f: impl FnMut(Resource<'a>, usize),
    ) {
        for kind in ResourceKind::ALL {
            for (n, res) in self.resources_of_kind(kind).enumerate() {
                if allowed.contains_type(res.variable_type()) {
                    f(res, n);
                }
            }
        }
    }

    /// Returns whether `self` and `other` declare structurally identical resources: the same
    /// number of each kind and, pairwise, the same array size, kind, variable type, presence of
    /// an immutable sampler and pairing.
    pub fn is_compatible_with(&self, other: &ResourceCatalog) -> bool {
        self.offsets == other.offsets
            && self.descriptors.iter().zip(other.descriptors.iter()).all(|(a, b)| {
                a.array_size == b.array_size
                    && a.kind == b.kind
                    && a.variable_type == b.variable_type
                    && a.immutable_sampler.is_some() == b.immutable_sampler.is_some()
                    && a.paired_resource == b.paired_resource
            })
    }
}

impl Display for ResourceCatalog {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        writeln!(
            f,
            "shader `{}` ({:?}): {} resources",
            self.name,
            self.stage,
            self.total_resources(),
        )?;

        for res in self.resources() {
            write!(
                f,
                "  {:>3} {:<20} {:<24} {:?}",
                res.index(),
                res.kind().name(),
                res.name(),
                res.variable_type(),
            )?;

            if res.array_size() > 1 {
                write!(f, " [{}]", res.array_size())?;
            }

            if res.has_immutable_sampler() {
                write!(f, " immutable sampler")?;
            }

            if let Some(paired) = res.paired_resource() {
                write!(f, " paired with `{}`", paired.name())?;
            }

            writeln!(f)?;
        }

        for (semantic, input) in self.stage_inputs() {
            writeln!(f, "  input {} at location {}", semantic, input.location())?;
        }

        Ok(())
    }
}

/// Returns whether a separate sampler with `sampler_array_size` elements can be assigned to a
/// texture with `image_array_size` elements. A single sampler is shared by every element.
#[inline]
pub(crate) fn sampler_array_size_fits(sampler_array_size: u32, image_array_size: u32) -> bool {
    sampler_array_size == 1 || sampler_array_size == image_array_size
}
