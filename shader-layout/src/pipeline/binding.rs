// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Setting shader variables by name.
//!
//! A [`ShaderVariableManager`] is a view over the resources of a [`ShaderResourceLayout`] that
//! can be set by the application. [`ShaderVariable`]s returned from it bind objects into a
//! [`ShaderResourceCache`].
//!
//! Static variables are set on a [`ShaderStaticResources`], which belongs to a single shader.
//! Mutable and dynamic variables are set on a [`ShaderResourceBinding`], which is created from
//! the [`PipelineResources`] of a pipeline. The static resources are copied into the binding with
//! [`ShaderResourceBinding::initialize_static_resources`].

use super::{layout::PipelineLayoutManager, resource_layout::ShaderResourceLayout};
use crate::{
    descriptor_set::cache::{
        BindError, BoundResource, DescriptorWrite, ResourceCacheCreateInfo, ShaderResourceCache,
    },
    device::LayoutDevice,
    shader::{
        resources::{Resource, ResourceCatalog, ResourceKind},
        ShaderStage, VariableTypes,
    },
    Validated, ValidationError, VulkanError,
};
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

/// The variables of one layout whose type is in a given set.
#[derive(Debug)]
pub struct ShaderVariableManager {
    layout: Arc<ShaderResourceLayout>,
    // Positions in the layout.
    variables: Vec<usize>,
}

impl ShaderVariableManager {
    /// Creates a manager for the resources of `layout` whose variable type is in `allowed`.
    ///
    /// Separate samplers that have an immutable sampler or that are assigned to a texture are
    /// not variables: the former can't be set, the latter are set together with their texture.
    pub fn new(layout: Arc<ShaderResourceLayout>, allowed: VariableTypes) -> Self {
        let variables = (0..layout.resources().len())
            .filter(|&position| {
                let (res, _) = layout.resource(position);

                allowed.contains_type(res.variable_type())
                    && !(res.kind() == ResourceKind::SeparateSampler
                        && (res.has_immutable_sampler() || res.paired_resource_index().is_some()))
            })
            .collect();

        ShaderVariableManager { layout, variables }
    }

    /// Returns the layout the variables belong to.
    #[inline]
    pub fn layout(&self) -> &Arc<ShaderResourceLayout> {
        &self.layout
    }

    /// Returns the number of variables.
    #[inline]
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Returns the index of the variable named `name`.
    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables
            .iter()
            .position(|&position| self.layout.resource(position).0.name() == name)
    }

    /// Returns the variable named `name`, which binds into `cache`. If there is no such variable,
    /// an error is logged and `None` is returned.
    pub fn get_variable<'a>(
        &'a self,
        name: &str,
        cache: &'a mut ShaderResourceCache,
    ) -> Option<ShaderVariable<'a>> {
        match self.variable_index(name) {
            Some(index) => Some(self.variable(index, cache)),
            None => {
                log::error!(
                    "shader `{}` has no variable named `{}` in this scope",
                    self.layout.catalog().name(),
                    name,
                );

                None
            }
        }
    }

    /// Returns the variable at `index`, which binds into `cache`.
    ///
    /// # Panics
    ///
    /// - Panics if `index` is out of range.
    pub fn variable<'a>(&'a self, index: usize, cache: &'a mut ShaderResourceCache) -> ShaderVariable<'a> {
        ShaderVariable {
            layout: &self.layout,
            position: self.variables[index],
            cache,
        }
    }
}

/// A shader variable that objects can be bound to.
#[derive(Debug)]
pub struct ShaderVariable<'a> {
    layout: &'a ShaderResourceLayout,
    position: usize,
    cache: &'a mut ShaderResourceCache,
}

impl<'a> ShaderVariable<'a> {
    /// Returns the resource of the variable.
    #[inline]
    pub fn resource(&self) -> Resource<'a> {
        self.layout.resource(self.position).0
    }

    /// Returns the name of the variable.
    #[inline]
    pub fn name(&self) -> &'a str {
        self.resource().name()
    }

    /// Returns the number of array elements of the variable.
    #[inline]
    pub fn array_size(&self) -> u32 {
        self.resource().array_size()
    }

    /// Binds `resource` to the first array element.
    #[inline]
    pub fn set(&mut self, resource: BoundResource) -> Result<(), BindError> {
        self.set_at(resource, 0)
    }

    /// Binds `resource` to array element `array_index`.
    ///
    /// If the variable is a separate image with a sampler assigned to it, the sampler of the
    /// image view is bound to the sampler as well.
    pub fn set_at(&mut self, resource: BoundResource, array_index: u32) -> Result<(), BindError> {
        let (res, slot) = self.layout.resource(self.position);
        let slot = *slot;
        let group = slot.group as usize;

        // A failed bind leaves both the image and its sampler unchanged.
        let mut sampler_bind = None;
        let mut missing_sampler = None;

        if let (BoundResource::ImageView(view), Some(sampler_offset), Some(sampler_res)) =
            (&resource, slot.assigned_sampler_offset, res.paired_resource())
        {
            if !sampler_res.has_immutable_sampler() {
                if let Some(sampler) = view.sampler() {
                    let sampler_index = if sampler_res.array_size() == 1 {
                        0
                    } else {
                        array_index
                    };
                    let sampler = BoundResource::Sampler(sampler);

                    self.cache
                        .validate_bind(group, sampler_offset, sampler_index, &sampler)
                        .inspect_err(|err| {
                            log::error!(
                                "failed to bind the sampler of element {} of texture `{}` to \
                                element {} of `{}`: {}",
                                array_index,
                                res.name(),
                                sampler_index,
                                sampler_res.name(),
                                err,
                            );
                        })?;
                    sampler_bind = Some((sampler_offset, sampler_index, sampler));
                } else {
                    missing_sampler = Some(sampler_res);
                }
            }
        }

        self.cache
            .bind_resource(group, slot.cache_offset, array_index, resource)?;

        if let Some(sampler_res) = missing_sampler {
            log::error!(
                "no sampler is set in the view bound to texture `{}`, which has sampler `{}` \
                assigned to it",
                res.print_name(array_index),
                sampler_res.name(),
            );
        }

        match sampler_bind {
            Some((sampler_offset, sampler_index, sampler)) => {
                self.cache
                    .bind_resource(group, sampler_offset, sampler_index, sampler)
            }
            None => Ok(()),
        }
    }

    /// Binds `resources` to consecutive array elements starting at `first_element`. Every
    /// element is attempted; the first error is returned.
    pub fn set_array(
        &mut self,
        resources: &[BoundResource],
        first_element: u32,
    ) -> Result<(), BindError> {
        let mut result = Ok(());

        for (array_index, resource) in (first_element..).zip(resources) {
            let element_result = self.set_at(resource.clone(), array_index);

            if result.is_ok() {
                result = element_result;
            }
        }

        result
    }

    /// Returns the object bound to array element `array_index`.
    pub fn get(&self, array_index: u32) -> Option<&BoundResource> {
        let (_, slot) = self.layout.resource(self.position);

        if array_index >= self.array_size() {
            return None;
        }

        self.cache
            .slot(slot.group as usize, slot.cache_offset + array_index)
            .resource()
    }
}

/// The static resources of a single shader.
#[derive(Debug)]
pub struct ShaderStaticResources {
    cache: ShaderResourceCache,
    variables: ShaderVariableManager,
}

impl ShaderStaticResources {
    /// Lays out the static resources of `catalog` and creates a cache for them.
    pub fn new(
        catalog: Arc<ResourceCatalog>,
        create_info: ResourceCacheCreateInfo,
    ) -> Result<ShaderStaticResources, Box<ValidationError>> {
        let mut cache = ShaderResourceCache::new(create_info);
        let layout = Arc::new(ShaderResourceLayout::new_static(catalog, &mut cache)?);
        let variables = ShaderVariableManager::new(layout, VariableTypes::STATIC);

        Ok(ShaderStaticResources { cache, variables })
    }

    /// Returns the static layout.
    #[inline]
    pub fn layout(&self) -> &Arc<ShaderResourceLayout> {
        self.variables.layout()
    }

    /// Returns the cache holding the bound static resources.
    #[inline]
    pub fn cache(&self) -> &ShaderResourceCache {
        &self.cache
    }

    /// Returns the number of static variables.
    #[inline]
    pub fn num_variables(&self) -> usize {
        self.variables.num_variables()
    }

    /// Returns the static variable named `name`.
    pub fn get_variable(&mut self, name: &str) -> Option<ShaderVariable<'_>> {
        self.variables.get_variable(name, &mut self.cache)
    }
}

/// The layouts and the binding model of a pipeline.
#[derive(Debug)]
pub struct PipelineResources {
    layouts: Vec<Arc<ShaderResourceLayout>>,
    bytecodes: Vec<Vec<u32>>,
    layout_manager: PipelineLayoutManager,
}

impl PipelineResources {
    /// Lays out the resources of every stage, patches the bytecode of every stage and creates
    /// the native pipeline layout.
    ///
    /// Each stage is given as its catalog together with the SPIR-V words the catalog was built
    /// from.
    pub fn new(
        device: &Arc<dyn LayoutDevice>,
        stages: Vec<(Arc<ResourceCatalog>, Vec<u32>)>,
    ) -> Result<PipelineResources, Validated<VulkanError>> {
        for (i, (catalog, _)) in stages.iter().enumerate() {
            if stages[..i]
                .iter()
                .any(|(other, _)| other.stage() == catalog.stage())
            {
                return Err(Box::new(ValidationError {
                    context: format!("stages[{}]", i).into(),
                    problem: format!("stage {:?} is given more than once", catalog.stage()).into(),
                })
                .into());
            }
        }

        let (catalogs, mut bytecodes): (Vec<_>, Vec<_>) = stages.into_iter().unzip();
        let mut layout_manager = PipelineLayoutManager::new();

        let layouts =
            ShaderResourceLayout::new_pipeline(&catalogs, &mut bytecodes, &mut layout_manager)
                .map_err(|err| err.add_context("stages"))?;
        layout_manager
            .finalize(device)
            .map_err(|err| err.add_context("layout_manager"))?;

        Ok(PipelineResources {
            layouts: layouts.into_iter().map(Arc::new).collect(),
            bytecodes,
            layout_manager,
        })
    }

    /// Returns the number of stages.
    #[inline]
    pub fn num_stages(&self) -> usize {
        self.layouts.len()
    }

    /// Returns the layouts of the stages, in the order the stages were given.
    #[inline]
    pub fn layouts(&self) -> &[Arc<ShaderResourceLayout>] {
        &self.layouts
    }

    /// Returns the index of `stage`, if the pipeline has it.
    pub fn stage_index(&self, stage: ShaderStage) -> Option<usize> {
        self.layouts.iter().position(|layout| layout.stage() == stage)
    }

    /// Returns the patched bytecode of the stage at `index`, ready to create a shader module
    /// from.
    #[inline]
    pub fn bytecode(&self, index: usize) -> &[u32] {
        &self.bytecodes[index]
    }

    /// Returns the layout manager.
    #[inline]
    pub fn layout_manager(&self) -> &PipelineLayoutManager {
        &self.layout_manager
    }

    /// Returns whether shader resource bindings created for `self` can be used with `other`.
    #[inline]
    pub fn is_compatible_with(&self, other: &PipelineResources) -> bool {
        self.layout_manager == other.layout_manager
    }
}

/// The resources bound for one use of a pipeline.
#[derive(Debug)]
pub struct ShaderResourceBinding {
    cache: ShaderResourceCache,
    variables: Vec<ShaderVariableManager>,
    num_dynamic_descriptors: u32,
    static_resources_initialized: bool,
}

impl ShaderResourceBinding {
    /// Creates a binding object with a cache laid out for `pipeline`.
    pub fn new(pipeline: &PipelineResources, create_info: ResourceCacheCreateInfo) -> Self {
        let mut cache = ShaderResourceCache::new(create_info);
        cache.initialize_sets(&pipeline.layout_manager.group_sizes());

        for layout in &pipeline.layouts {
            layout.initialize_resource_cache(&mut cache);
        }

        debug_assert!(cache.verify_initialized());

        let variables = pipeline
            .layouts
            .iter()
            .map(|layout| {
                ShaderVariableManager::new(
                    layout.clone(),
                    VariableTypes::MUTABLE.union(VariableTypes::DYNAMIC),
                )
            })
            .collect();

        ShaderResourceBinding {
            cache,
            variables,
            num_dynamic_descriptors: pipeline.layout_manager.num_dynamic_descriptors(),
            static_resources_initialized: false,
        }
    }

    /// Returns the cache.
    #[inline]
    pub fn cache(&self) -> &ShaderResourceCache {
        &self.cache
    }

    fn stage_variables(&self, stage: ShaderStage) -> Option<usize> {
        self.variables
            .iter()
            .position(|variables| variables.layout().stage() == stage)
    }

    /// Returns the number of mutable and dynamic variables of `stage`.
    pub fn num_variables(&self, stage: ShaderStage) -> usize {
        self.stage_variables(stage)
            .map_or(0, |index| self.variables[index].num_variables())
    }

    /// Returns the mutable or dynamic variable named `name` of `stage`.
    pub fn get_variable(&mut self, stage: ShaderStage, name: &str) -> Option<ShaderVariable<'_>> {
        let Some(index) = self.stage_variables(stage) else {
            log::error!("the pipeline has no {:?} stage", stage);

            return None;
        };

        self.variables[index].get_variable(name, &mut self.cache)
    }

    /// Copies the static resources of each stage from `static_resources`. Returns whether every
    /// static resource was bound.
    pub fn initialize_static_resources(
        &mut self,
        static_resources: &[&ShaderStaticResources],
    ) -> bool {
        let mut all_bound = true;

        for src in static_resources {
            let stage = src.layout().stage();

            let Some(index) = self.stage_variables(stage) else {
                log::error!("the pipeline has no {:?} stage", stage);
                all_bound = false;

                continue;
            };

            let layout = self.variables[index].layout().clone();
            all_bound &= layout.initialize_static_resources(src.layout(), src.cache(), &mut self.cache);
        }

        self.static_resources_initialized = true;

        all_bound
    }

    /// Returns whether [`initialize_static_resources`](Self::initialize_static_resources) has
    /// been called.
    #[inline]
    pub fn static_resources_initialized(&self) -> bool {
        self.static_resources_initialized
    }

    /// Returns the dynamic offsets to bind the descriptor sets with, for the command sequence
    /// identified by `context_id`.
    pub fn dynamic_offsets(&self, context_id: usize) -> SmallVec<[u32; 8]> {
        if self.cache.num_dynamic_buffers() == 0 {
            return smallvec![0; self.num_dynamic_descriptors as usize];
        }

        self.cache.get_dynamic_buffer_offsets(context_id)
    }

    /// Returns the descriptor writes for the bound slots of `group`, ordered by binding.
    pub fn descriptor_writes(&self, group: u32) -> Vec<DescriptorWrite> {
        let mut writes: Vec<_> = self
            .variables
            .iter()
            .flat_map(|variables| variables.layout().descriptor_writes(&self.cache, group))
            .collect();
        writes.sort_by_key(|write| (write.binding, write.first_array_element));

        writes
    }

    /// Returns whether every slot of every stage has an object bound, logging every slot that
    /// does not.
    pub fn verify_bindings(&self) -> bool {
        self.variables
            .iter()
            .fold(true, |all_bound, variables| {
                variables.layout().verify_bindings(&self.cache) && all_bound
            })
    }
}
