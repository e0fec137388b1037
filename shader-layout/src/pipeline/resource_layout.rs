// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Assigns the resources of one shader to slots of the binding model.
//!
//! There are two ways to build a [`ShaderResourceLayout`]:
//!
//! - [`new_static`](ShaderResourceLayout::new_static) lays out only the static resources of a
//!   single shader, in a private cache that belongs to that shader. Static variables are set
//!   there before any pipeline using the shader exists.
//! - [`new_pipeline`](ShaderResourceLayout::new_pipeline) lays out every resource of every stage
//!   of a pipeline through a shared [`PipelineLayoutManager`], and rewrites the binding and
//!   descriptor set decorations of each stage's SPIR-V to match.
//!
//! In both cases the uniform and storage buffers of a group come before its other resources,
//! which is what [`get_dynamic_buffer_offsets`] relies on.
//!
//! [`get_dynamic_buffer_offsets`]: crate::descriptor_set::cache::ShaderResourceCache::get_dynamic_buffer_offsets

use super::layout::PipelineLayoutManager;
use crate::{
    descriptor_set::{
        cache::{DescriptorWrite, ShaderResourceCache},
        layout::BindingGroup,
    },
    shader::{
        resources::{Resource, ResourceCatalog, ResourceKind},
        ShaderStage, VariableType, VariableTypes,
    },
    ValidationError,
};
use std::sync::Arc;

/// Where a resource lives in the binding model and in the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayoutSlot {
    /// The index of the group.
    pub group: u32,

    /// The binding number within the group.
    pub binding: u32,

    /// The cache offset of the first array element within the group.
    pub cache_offset: u32,

    /// For a separate image with a sampler assigned to it, the cache offset of the sampler.
    pub assigned_sampler_offset: Option<u32>,
}

/// A resource of a layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutResource {
    /// The index of the resource in the catalog.
    pub index: usize,

    /// The slot of the resource.
    pub slot: LayoutSlot,
}

/// The layout of the resources of one shader.
#[derive(Debug)]
pub struct ShaderResourceLayout {
    catalog: Arc<ResourceCatalog>,
    // Sorted by catalog index.
    resources: Vec<LayoutResource>,
}

impl ShaderResourceLayout {
    /// Lays out the static resources of `catalog` in a single group, and initializes `cache`
    /// with it.
    ///
    /// # Panics
    ///
    /// - Panics if the sets of `cache` have already been initialized.
    pub fn new_static(
        catalog: Arc<ResourceCatalog>,
        cache: &mut ShaderResourceCache,
    ) -> Result<ShaderResourceLayout, Box<ValidationError>> {
        let mut group = BindingGroup::new(VariableType::Static);
        let mut resources = Vec::with_capacity(catalog.total_resources());

        // Catalog order puts the uniform and storage buffers first.
        for res in catalog.resources() {
            if res.variable_type() != VariableType::Static {
                continue;
            }

            let (binding, cache_offset) = group
                .add_binding(res, catalog.stage())
                .map_err(|err| err.add_context(format!("resource `{}`", res.name())))?;

            resources.push(LayoutResource {
                index: res.index(),
                slot: LayoutSlot {
                    group: 0,
                    binding,
                    cache_offset: cache_offset.get(),
                    assigned_sampler_offset: None,
                },
            });
        }

        let mut layout = ShaderResourceLayout { catalog, resources };
        layout.assign_samplers();

        cache.initialize_sets(&[group.total_descriptors()]);
        layout.initialize_resource_cache(cache);

        Ok(layout)
    }

    /// Lays out all resources of the stages of a pipeline. `catalogs[i]` must have been built
    /// from `bytecodes[i]`; the binding and descriptor set decorations of `bytecodes[i]` are
    /// rewritten with the slots assigned by `manager`.
    ///
    /// The uniform buffers of all stages are allocated first, then the storage buffers of all
    /// stages, then the remaining resources stage by stage.
    pub fn new_pipeline(
        catalogs: &[Arc<ResourceCatalog>],
        bytecodes: &mut [Vec<u32>],
        manager: &mut PipelineLayoutManager,
    ) -> Result<Vec<ShaderResourceLayout>, Box<ValidationError>> {
        assert_eq!(catalogs.len(), bytecodes.len());

        let mut resources: Vec<Vec<LayoutResource>> = catalogs
            .iter()
            .map(|catalog| Vec::with_capacity(catalog.total_resources()))
            .collect();

        let passes = [
            Some(ResourceKind::UniformBuffer),
            Some(ResourceKind::StorageBuffer),
            None,
        ];

        for pass in passes {
            for (stage_index, catalog) in catalogs.iter().enumerate() {
                let bytecode = &mut bytecodes[stage_index];

                for res in catalog.resources() {
                    let in_pass = match pass {
                        Some(kind) => res.kind() == kind,
                        None => !res.kind().has_dynamic_offset(),
                    };

                    if !in_pass {
                        continue;
                    }

                    let allocation = manager
                        .allocate_resource_slot(res, catalog.stage())
                        .map_err(|err| err.add_context(format!("catalogs[{}]", stage_index)))?;

                    patch_word(bytecode, res.binding_patch_offset(), allocation.binding)
                        .and_then(|()| {
                            patch_word(bytecode, res.descriptor_set_patch_offset(), allocation.group)
                        })
                        .map_err(|err| {
                            err.add_context(format!("bytecodes[{}]", stage_index))
                        })?;

                    resources[stage_index].push(LayoutResource {
                        index: res.index(),
                        slot: LayoutSlot {
                            group: allocation.group,
                            binding: allocation.binding,
                            cache_offset: allocation.cache_offset,
                            assigned_sampler_offset: None,
                        },
                    });
                }
            }
        }

        Ok(catalogs
            .iter()
            .zip(resources)
            .map(|(catalog, mut resources)| {
                resources.sort_unstable_by_key(|res| res.index);

                let mut layout = ShaderResourceLayout {
                    catalog: catalog.clone(),
                    resources,
                };
                layout.assign_samplers();

                layout
            })
            .collect())
    }

    fn assign_samplers(&mut self) {
        for i in 0..self.resources.len() {
            let res = self.catalog.resource(self.resources[i].index);

            if res.kind() != ResourceKind::SeparateImage {
                continue;
            }

            let Some(sampler_index) = res.paired_resource_index() else {
                continue;
            };

            let sampler_offset = self
                .position(sampler_index)
                .map(|position| self.resources[position].slot.cache_offset);
            self.resources[i].slot.assigned_sampler_offset = sampler_offset;
        }
    }

    fn position(&self, catalog_index: usize) -> Option<usize> {
        self.resources
            .binary_search_by_key(&catalog_index, |res| res.index)
            .ok()
    }

    /// Returns the catalog of the shader.
    #[inline]
    pub fn catalog(&self) -> &Arc<ResourceCatalog> {
        &self.catalog
    }

    /// Returns the stage of the shader.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.catalog.stage()
    }

    /// Returns the resources of the layout, in catalog order.
    #[inline]
    pub fn resources(&self) -> &[LayoutResource] {
        &self.resources
    }

    /// Returns the catalog resource and the slot of the `i`th resource of the layout.
    #[inline]
    pub fn resource(&self, i: usize) -> (Resource<'_>, &LayoutSlot) {
        let layout_res = &self.resources[i];

        (self.catalog.resource(layout_res.index), &layout_res.slot)
    }

    /// Returns the position in the layout of the resource named `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.catalog
            .find(name)
            .and_then(|res| self.position(res.index()))
    }

    /// Returns the slot of the resource at `catalog_index`, if it is part of the layout.
    pub fn slot(&self, catalog_index: usize) -> Option<&LayoutSlot> {
        self.position(catalog_index)
            .map(|position| &self.resources[position].slot)
    }

    /// Calls `f` for every resource whose variable type is in `allowed`, in catalog order.
    pub fn process_resources<'a>(
        &'a self,
        allowed: VariableTypes,
        mut f: impl FnMut(Resource<'a>, &'a LayoutSlot),
    ) {
        for layout_res in &self.resources {
            let res = self.catalog.resource(layout_res.index);

            if allowed.contains_type(res.variable_type()) {
                f(res, &layout_res.slot);
            }
        }
    }

    /// Assigns the slots of every resource of the layout in `cache`.
    pub fn initialize_resource_cache(&self, cache: &mut ShaderResourceCache) {
        self.process_resources(VariableTypes::all(), |res, slot| {
            cache.initialize_resources(
                slot.group as usize,
                slot.cache_offset,
                res.array_size(),
                res.kind(),
                res.variable_type(),
            );
        });
    }

    /// Copies the static resources bound in `src_cache`, laid out by `src_layout`, to the
    /// static slots of `self` in `dst_cache`. Returns whether every static resource was bound.
    pub fn initialize_static_resources(
        &self,
        src_layout: &ShaderResourceLayout,
        src_cache: &ShaderResourceCache,
        dst_cache: &mut ShaderResourceCache,
    ) -> bool {
        let mut all_bound = true;

        self.process_resources(VariableTypes::STATIC, |res, dst_slot| {
            if is_immutable_sampler(res) {
                return;
            }

            let Some(src_slot) = src_layout.slot_by_name(res.name()) else {
                log::error!(
                    "static resource `{}` of shader `{}` is not part of the source layout",
                    res.name(),
                    self.catalog.name(),
                );
                all_bound = false;

                return;
            };

            for array_index in 0..res.array_size() {
                let bound = src_cache
                    .slot(src_slot.group as usize, src_slot.cache_offset + array_index)
                    .resource();

                match bound {
                    Some(bound) => {
                        let result = dst_cache.bind_resource(
                            dst_slot.group as usize,
                            dst_slot.cache_offset,
                            array_index,
                            bound.clone(),
                        );
                        all_bound &= result.is_ok();
                    }
                    None => {
                        log::error!(
                            "no resource is bound to static variable `{}` of shader `{}`",
                            res.print_name(array_index),
                            self.catalog.name(),
                        );
                        all_bound = false;
                    }
                }
            }
        });

        all_bound
    }

    fn slot_by_name(&self, name: &str) -> Option<&LayoutSlot> {
        self.find(name).map(|position| &self.resources[position].slot)
    }

    /// Returns whether an object is bound to every slot of the layout in `cache`, logging every
    /// slot that is not.
    pub fn verify_bindings(&self, cache: &ShaderResourceCache) -> bool {
        let mut all_bound = true;

        self.process_resources(VariableTypes::all(), |res, slot| {
            if is_immutable_sampler(res) {
                return;
            }

            for array_index in 0..res.array_size() {
                let cache_slot = cache.slot(slot.group as usize, slot.cache_offset + array_index);

                if !cache_slot.is_bound() {
                    log::error!(
                        "no resource is bound to {:?} variable `{}` of shader `{}`",
                        res.variable_type(),
                        res.print_name(array_index),
                        self.catalog.name(),
                    );
                    all_bound = false;
                }
            }
        });

        all_bound
    }

    /// Returns a descriptor write for every bound slot of `group` that belongs to the layout.
    pub fn descriptor_writes(&self, cache: &ShaderResourceCache, group: u32) -> Vec<DescriptorWrite> {
        let mut writes = Vec::new();

        self.process_resources(VariableTypes::all(), |res, slot| {
            if slot.group != group {
                return;
            }

            for array_index in 0..res.array_size() {
                let cache_slot = cache.slot(group as usize, slot.cache_offset + array_index);

                if let Some(resource) = cache_slot.resource() {
                    writes.push(DescriptorWrite {
                        binding: slot.binding,
                        first_array_element: array_index,
                        descriptor_type: res.kind().descriptor_type(),
                        resource: resource.clone(),
                    });
                }
            }
        });

        writes
    }

    /// Rewrites the location of every vertex input in `bytecode` with the location `map`
    /// returns for its semantic. Inputs for which `map` returns `None` keep their location.
    pub fn map_vertex_inputs(
        &self,
        bytecode: &mut [u32],
        mut map: impl FnMut(&str) -> Option<u32>,
    ) -> Result<(), Box<ValidationError>> {
        for (semantic, input) in self.catalog.stage_inputs() {
            match map(semantic) {
                Some(location) => patch_word(bytecode, input.location_patch_offset(), location)
                    .map_err(|err| err.add_context(format!("input `{}`", semantic)))?,
                None => {
                    if cfg!(debug_assertions) {
                        log::warn!(
                            "no location is given for vertex input `{}` of shader `{}`",
                            semantic,
                            self.catalog.name(),
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

fn is_immutable_sampler(res: Resource<'_>) -> bool {
    res.kind() == ResourceKind::SeparateSampler && res.has_immutable_sampler()
}

fn patch_word(bytecode: &mut [u32], offset: usize, value: u32) -> Result<(), Box<ValidationError>> {
    let len = bytecode.len();
    let word = bytecode.get_mut(offset).ok_or_else(|| {
        Box::new(ValidationError {
            problem: format!(
                "the word offset {} is out of range for a module of {} words",
                offset, len,
            )
            .into(),
            ..Default::default()
        })
    })?;
    *word = value;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::ShaderResourceLayout;
    use crate::{
        descriptor_set::cache::{BoundResource, ShaderResourceCache},
        pipeline::layout::PipelineLayoutManager,
        sampler::SamplerDesc,
        shader::{
            resources::ResourceKind, spirv::Spirv, ImmutableSamplerDesc, ShaderDesc, ShaderStage,
            ShaderVariableDesc, VariableType,
        },
        tests::{catalog, sampler_cache, SpirvBuilder, TestBuffer, TestImageView},
    };
    use std::{collections::BTreeSet, sync::Arc};

    fn decorations(words: &[u32], name: &str) -> (u32, u32) {
        use crate::shader::spirv::Decoration;

        let spirv = Spirv::new(words).unwrap();
        let id = spirv
            .instructions()
            .iter()
            .filter_map(|inst| inst.instruction.result_id())
            .find(|&id| spirv.name(id) == Some(name))
            .unwrap();

        let mut set = None;
        let mut binding = None;
        for info in spirv.iter_decoration(id) {
            match info.decoration {
                Decoration::DescriptorSet { descriptor_set } => set = Some(descriptor_set),
                Decoration::Binding { binding_point } => binding = Some(binding_point),
                _ => (),
            }
        }

        (set.unwrap(), binding.unwrap())
    }

    #[test]
    fn static_layout_skips_other_types() {
        let (_mock, samplers) = sampler_cache();

        let mut builder = SpirvBuilder::new();
        builder.uniform_buffer("g_Constants", 0, 0);
        builder.uniform_buffer("g_PerDraw", 0, 1);
        builder.separate_image_array("g_Textures", 3);
        builder.storage_buffer("g_Particles", 0, 2);
        let desc = ShaderDesc {
            variables: vec![ShaderVariableDesc::new("g_PerDraw", VariableType::Dynamic)],
            ..Default::default()
        };
        let catalog = catalog(&samplers, &desc, &builder.into_words());

        let mut cache = ShaderResourceCache::new(Default::default());
        let layout = ShaderResourceLayout::new_static(catalog.clone(), &mut cache).unwrap();

        assert_eq!(layout.resources().len(), 3);
        assert!(layout.find("g_PerDraw").is_none());
        assert_eq!(cache.num_groups(), 1);
        assert_eq!(cache.group_slots(0).len(), 5);
        assert!(cache.verify_initialized());

        let offsets: BTreeSet<u32> = layout
            .resources()
            .iter()
            .flat_map(|res| {
                let size = catalog.resource(res.index).array_size();
                (0..size).map(move |i| res.slot.cache_offset + i)
            })
            .collect();
        assert_eq!(offsets, (0..5).collect());
    }

    #[test]
    fn pipeline_layout_patches_bytecode() {
        let (_mock, samplers) = sampler_cache();

        let build_vs = || {
            let mut builder = SpirvBuilder::new();
            builder.separate_image("g_HeightMap", 3, 3);
            builder.uniform_buffer("Frame", 2, 7);
            builder.into_words()
        };
        let build_ps = || {
            let mut builder = SpirvBuilder::new();
            builder.uniform_buffer("Frame", 2, 7);
            builder.storage_buffer("g_Lights", 1, 1);
            builder.separate_image("g_Albedo", 0, 4);
            builder.into_words()
        };

        let vs_desc = ShaderDesc {
            stage: ShaderStage::Vertex,
            ..Default::default()
        };
        let ps_desc = ShaderDesc {
            stage: ShaderStage::Fragment,
            variables: vec![ShaderVariableDesc::new("g_Albedo", VariableType::Mutable)],
            ..Default::default()
        };

        let catalogs = [
            catalog(&samplers, &vs_desc, &build_vs()),
            catalog(&samplers, &ps_desc, &build_ps()),
        ];
        let mut bytecodes = vec![build_vs(), build_ps()];
        let mut manager = PipelineLayoutManager::new();

        let layouts =
            ShaderResourceLayout::new_pipeline(&catalogs, &mut bytecodes, &mut manager).unwrap();

        // Buffers of both stages first, then the rest.
        assert_eq!(decorations(&bytecodes[0], "Frame"), (0, 0));
        assert_eq!(decorations(&bytecodes[1], "Frame"), (0, 1));
        assert_eq!(decorations(&bytecodes[1], "g_Lights"), (0, 2));
        assert_eq!(decorations(&bytecodes[0], "g_HeightMap"), (0, 3));
        assert_eq!(decorations(&bytecodes[1], "g_Albedo"), (1, 0));

        let static_group = &manager.groups()[0];
        assert_eq!(static_group.bindings().len(), 4);
        assert_eq!(manager.groups()[1].variable_type(), VariableType::Mutable);

        let frame = layouts[1].find("Frame").unwrap();
        assert_eq!(layouts[1].resources()[frame].slot.cache_offset, 1);
        assert_eq!(layouts[0].stage(), ShaderStage::Vertex);
        assert_eq!(layouts[1].resources().len(), 3);

        // Dynamic offsets can be gathered from a cache laid out this way.
        let mut cache = ShaderResourceCache::new(Default::default());
        cache.initialize_sets(&manager.group_sizes());
        for layout in &layouts {
            layout.initialize_resource_cache(&mut cache);
        }
        assert!(cache.verify_initialized());
        assert_eq!(cache.get_dynamic_buffer_offsets(0).len(), 3);
    }

    #[test]
    fn assigned_sampler_offsets() {
        let (_mock, samplers) = sampler_cache();

        let mut builder = SpirvBuilder::new();
        builder.separate_image("g_Texture", 0, 0);
        builder.sampler("g_Texture_sampler");
        let words = builder.into_words();

        let desc = ShaderDesc {
            stage: ShaderStage::Fragment,
            combined_sampler_suffix: Some("_sampler".to_owned()),
            ..Default::default()
        };
        let catalog = catalog(&samplers, &desc, &words);

        let mut cache = ShaderResourceCache::new(Default::default());
        let layout = ShaderResourceLayout::new_static(catalog.clone(), &mut cache).unwrap();

        let texture = layout.find("g_Texture").unwrap();
        let sampler = layout.find("g_Texture_sampler").unwrap();
        assert_eq!(
            layout.resources()[texture].slot.assigned_sampler_offset,
            Some(layout.resources()[sampler].slot.cache_offset),
        );
        assert_eq!(layout.resources()[sampler].slot.assigned_sampler_offset, None);
    }

    #[test]
    fn static_resources_are_copied() {
        let (_mock, samplers) = sampler_cache();

        let mut builder = SpirvBuilder::new();
        builder.uniform_buffer("g_Constants", 0, 0);
        builder.separate_image("g_Texture", 0, 1);
        builder.sampler("g_Sampler");
        builder.storage_buffer("g_Output", 0, 2);
        let words = builder.into_words();

        let desc = ShaderDesc {
            stage: ShaderStage::Compute,
            variables: vec![ShaderVariableDesc::new("g_Output", VariableType::Dynamic)],
            immutable_samplers: vec![ImmutableSamplerDesc::new(
                "g_Sampler",
                SamplerDesc::simple_repeat_linear(),
            )],
            ..Default::default()
        };
        let catalog = catalog(&samplers, &desc, &words);

        let mut static_cache = ShaderResourceCache::new(Default::default());
        let static_layout =
            ShaderResourceLayout::new_static(catalog.clone(), &mut static_cache).unwrap();

        let mut bytecodes = vec![words];
        let mut manager = PipelineLayoutManager::new();
        let layouts = ShaderResourceLayout::new_pipeline(
            &[catalog.clone()],
            &mut bytecodes,
            &mut manager,
        )
        .unwrap();
        let layout = &layouts[0];

        let mut cache = ShaderResourceCache::new(Default::default());
        cache.initialize_sets(&manager.group_sizes());
        layout.initialize_resource_cache(&mut cache);

        // Nothing is bound yet.
        assert!(!layout.initialize_static_resources(&static_layout, &static_cache, &mut cache));

        let constants = static_layout.resource(static_layout.find("g_Constants").unwrap()).1;
        let texture = static_layout.resource(static_layout.find("g_Texture").unwrap()).1;
        let buffer = BoundResource::Buffer(Arc::new(TestBuffer::new(None)));
        let view = BoundResource::ImageView(Arc::new(TestImageView::sampled(None)));
        static_cache
            .bind_resource(0, constants.cache_offset, 0, buffer.clone())
            .unwrap();
        static_cache
            .bind_resource(0, texture.cache_offset, 0, view.clone())
            .unwrap();

        assert!(layout.initialize_static_resources(&static_layout, &static_cache, &mut cache));

        let dst = layout.slot(catalog.find("g_Texture").unwrap().index()).unwrap();
        assert!(cache
            .slot(dst.group as usize, dst.cache_offset)
            .resource()
            .unwrap()
            .same_object(&view));

        // The dynamic storage buffer is still unbound.
        assert!(!layout.verify_bindings(&cache));
        let output = layout.slot(catalog.find("g_Output").unwrap().index()).unwrap();
        cache
            .bind_resource(output.group as usize, output.cache_offset, 0, buffer)
            .unwrap();
        assert!(layout.verify_bindings(&cache));

        let writes = layout.descriptor_writes(&cache, dst.group);
        assert_eq!(writes.len(), 2);
        assert!(writes
            .iter()
            .any(|write| write.binding == dst.binding && write.first_array_element == 0));
        assert_eq!(
            writes
                .iter()
                .find(|write| write.binding == dst.binding)
                .unwrap()
                .descriptor_type,
            ResourceKind::SeparateImage.descriptor_type(),
        );
    }

    #[test]
    fn vertex_inputs_are_remapped() {
        let (_mock, samplers) = sampler_cache();

        let mut builder = SpirvBuilder::new();
        builder.input("in_Position", 0, Some("ATTRIB0"));
        builder.input("in_UV", 1, Some("ATTRIB1"));
        let mut words = builder.into_words();

        let catalog = catalog(&samplers, &ShaderDesc::default(), &words);
        let mut cache = ShaderResourceCache::new(Default::default());
        let layout = ShaderResourceLayout::new_static(catalog.clone(), &mut cache).unwrap();

        layout
            .map_vertex_inputs(&mut words, |semantic| match semantic {
                "ATTRIB0" => Some(4),
                _ => None,
            })
            .unwrap();

        let locations: Vec<_> = catalog
            .stage_inputs()
            .map(|(_, input)| words[input.location_patch_offset()])
            .collect();
        assert_eq!(locations, [4, 1]);
    }
}
