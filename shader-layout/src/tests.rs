// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

#![cfg(test)]

use crate::{
    descriptor_set::cache::{BufferResource, ImageViewResource, ViewAccess},
    device::LayoutDevice,
    sampler::{Sampler, SamplerCache},
    shader::{resources::ResourceCatalog, ShaderDesc},
    VulkanError,
};
use ash::vk::{self, Handle};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};

/// Creates a `MockDevice`, returning it both as itself and as a `LayoutDevice`.
macro_rules! device {
    () => {{
        let mock = std::sync::Arc::new($crate::tests::MockDevice::default());
        let device: std::sync::Arc<dyn $crate::device::LayoutDevice> = mock.clone();

        (mock, device)
    }};
}

pub(crate) use device;

pub(crate) fn sampler_cache() -> (Arc<MockDevice>, SamplerCache) {
    let (mock, device) = device!();

    (mock, SamplerCache::new(device))
}

pub(crate) fn catalog(
    samplers: &SamplerCache,
    desc: &ShaderDesc,
    words: &[u32],
) -> Arc<ResourceCatalog> {
    ResourceCatalog::new(samplers, desc, words).unwrap()
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn next_handle() -> u64 {
    NEXT_HANDLE.fetch_add(1, Ordering::Relaxed)
}

/// A binding of a descriptor set layout that was created through a `MockDevice`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RecordedBinding {
    pub(crate) binding: u32,
    pub(crate) descriptor_type: vk::DescriptorType,
    pub(crate) descriptor_count: u32,
    pub(crate) stages: vk::ShaderStageFlags,
    pub(crate) immutable_samplers: usize,
}

/// A device that hands out fake handles and counts the objects that are alive.
#[derive(Debug, Default)]
pub(crate) struct MockDevice {
    live_samplers: AtomicUsize,
    live_set_layouts: AtomicUsize,
    live_pipeline_layouts: AtomicUsize,
    last_set_layout_bindings: Mutex<Vec<RecordedBinding>>,
}

impl MockDevice {
    pub(crate) fn live_samplers(&self) -> usize {
        self.live_samplers.load(Ordering::Relaxed)
    }

    pub(crate) fn live_set_layouts(&self) -> usize {
        self.live_set_layouts.load(Ordering::Relaxed)
    }

    pub(crate) fn live_pipeline_layouts(&self) -> usize {
        self.live_pipeline_layouts.load(Ordering::Relaxed)
    }

    pub(crate) fn last_set_layout_bindings(&self) -> Vec<RecordedBinding> {
        self.last_set_layout_bindings.lock().clone()
    }
}

impl LayoutDevice for MockDevice {
    fn create_sampler(
        &self,
        _create_info: &vk::SamplerCreateInfo<'_>,
    ) -> Result<vk::Sampler, VulkanError> {
        self.live_samplers.fetch_add(1, Ordering::Relaxed);

        Ok(vk::Sampler::from_raw(next_handle()))
    }

    unsafe fn destroy_sampler(&self, _sampler: vk::Sampler) {
        self.live_samplers.fetch_sub(1, Ordering::Relaxed);
    }

    fn create_descriptor_set_layout(
        &self,
        create_info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> Result<vk::DescriptorSetLayout, VulkanError> {
        let bindings_vk = if create_info.binding_count == 0 {
            &[][..]
        } else {
            unsafe {
                std::slice::from_raw_parts(
                    create_info.p_bindings,
                    create_info.binding_count as usize,
                )
            }
        };

        *self.last_set_layout_bindings.lock() = bindings_vk
            .iter()
            .map(|binding_vk| RecordedBinding {
                binding: binding_vk.binding,
                descriptor_type: binding_vk.descriptor_type,
                descriptor_count: binding_vk.descriptor_count,
                stages: binding_vk.stage_flags,
                immutable_samplers: if binding_vk.p_immutable_samplers.is_null() {
                    0
                } else {
                    binding_vk.descriptor_count as usize
                },
            })
            .collect();
        self.live_set_layouts.fetch_add(1, Ordering::Relaxed);

        Ok(vk::DescriptorSetLayout::from_raw(next_handle()))
    }

    unsafe fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
        self.live_set_layouts.fetch_sub(1, Ordering::Relaxed);
    }

    fn create_pipeline_layout(
        &self,
        _create_info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<vk::PipelineLayout, VulkanError> {
        self.live_pipeline_layouts.fetch_add(1, Ordering::Relaxed);

        Ok(vk::PipelineLayout::from_raw(next_handle()))
    }

    unsafe fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        self.live_pipeline_layouts.fetch_sub(1, Ordering::Relaxed);
    }
}

/// A buffer. If it has a dynamic offset, the offset for a context is the base offset plus the
/// context id.
#[derive(Debug)]
pub(crate) struct TestBuffer {
    handle: vk::Buffer,
    dynamic_offset: Option<u32>,
}

impl TestBuffer {
    pub(crate) fn new(dynamic_offset: Option<u32>) -> Self {
        TestBuffer {
            handle: vk::Buffer::from_raw(next_handle()),
            dynamic_offset,
        }
    }
}

impl BufferResource for TestBuffer {
    fn handle(&self) -> vk::Buffer {
        self.handle
    }

    fn size(&self) -> vk::DeviceSize {
        256
    }

    fn is_dynamic(&self) -> bool {
        self.dynamic_offset.is_some()
    }

    fn dynamic_offset(&self, context_id: usize) -> u32 {
        self.dynamic_offset.unwrap_or(0) + context_id as u32
    }
}

#[derive(Debug)]
pub(crate) struct TestImageView {
    handle: vk::ImageView,
    access: ViewAccess,
    sampler: Option<Arc<Sampler>>,
}

impl TestImageView {
    pub(crate) fn sampled(sampler: Option<Arc<Sampler>>) -> Self {
        TestImageView {
            handle: vk::ImageView::from_raw(next_handle()),
            access: ViewAccess::Read,
            sampler,
        }
    }

    pub(crate) fn storage() -> Self {
        TestImageView {
            handle: vk::ImageView::from_raw(next_handle()),
            access: ViewAccess::ReadWrite,
            sampler: None,
        }
    }
}

impl ImageViewResource for TestImageView {
    fn handle(&self) -> vk::ImageView {
        self.handle
    }

    fn access(&self) -> ViewAccess {
        self.access
    }

    fn sampler(&self) -> Option<Arc<Sampler>> {
        self.sampler.clone()
    }
}

const OP_NAME: u32 = 5;
const OP_TYPE_INT: u32 = 21;
const OP_TYPE_FLOAT: u32 = 22;
const OP_TYPE_IMAGE: u32 = 25;
const OP_TYPE_SAMPLER: u32 = 26;
const OP_TYPE_SAMPLED_IMAGE: u32 = 27;
const OP_TYPE_ARRAY: u32 = 28;
const OP_TYPE_STRUCT: u32 = 30;
const OP_TYPE_POINTER: u32 = 32;
const OP_CONSTANT: u32 = 43;
const OP_VARIABLE: u32 = 59;
const OP_DECORATE: u32 = 71;
const OP_DECORATE_STRING: u32 = 5632;

const DECORATION_BLOCK: u32 = 2;
const DECORATION_BUFFER_BLOCK: u32 = 3;
const DECORATION_BUILT_IN: u32 = 11;
const DECORATION_LOCATION: u32 = 30;
const DECORATION_BINDING: u32 = 33;
const DECORATION_DESCRIPTOR_SET: u32 = 34;
const DECORATION_USER_SEMANTIC: u32 = 5635;

const STORAGE_CLASS_UNIFORM_CONSTANT: u32 = 0;
const STORAGE_CLASS_INPUT: u32 = 1;
const STORAGE_CLASS_UNIFORM: u32 = 2;
const STORAGE_CLASS_ATOMIC_COUNTER: u32 = 10;
const STORAGE_CLASS_STORAGE_BUFFER: u32 = 12;

const DIM_2D: u32 = 1;
const DIM_BUFFER: u32 = 5;

const BUILT_IN_VERTEX_INDEX: u32 = 42;

/// Assembles small SPIR-V modules that declare resource variables.
///
/// Every call declares its own types, so that each variable can be found through its own
/// decorations. Samplers and arrays that are not given a binding get one in descriptor set 0,
/// counting up from 100.
pub(crate) struct SpirvBuilder {
    next_id: u32,
    next_binding: u32,
    debug: Vec<u32>,
    annotations: Vec<u32>,
    types: Vec<u32>,
}

impl SpirvBuilder {
    pub(crate) fn new() -> Self {
        SpirvBuilder {
            next_id: 1,
            next_binding: 100,
            debug: Vec::new(),
            annotations: Vec::new(),
            types: Vec::new(),
        }
    }

    pub(crate) fn into_words(self) -> Vec<u32> {
        let mut words = vec![0x0723_0203, 0x0001_0000, 0, self.next_id, 0];
        words.extend(self.debug);
        words.extend(self.annotations);
        words.extend(self.types);

        words
    }

    pub(crate) fn uniform_buffer(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let block = self.block(DECORATION_BLOCK);
        self.resource(name, set, binding, block, STORAGE_CLASS_UNIFORM)
    }

    pub(crate) fn storage_buffer(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let block = self.block(DECORATION_BLOCK);
        self.resource(name, set, binding, block, STORAGE_CLASS_STORAGE_BUFFER)
    }

    /// A storage buffer declared the pre-1.3 way.
    pub(crate) fn buffer_block(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let block = self.block(DECORATION_BUFFER_BLOCK);
        self.resource(name, set, binding, block, STORAGE_CLASS_UNIFORM)
    }

    pub(crate) fn uniform_texel_buffer(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let image = self.image(DIM_BUFFER, 1);
        self.resource(name, set, binding, image, STORAGE_CLASS_UNIFORM_CONSTANT)
    }

    pub(crate) fn sampled_texel_buffer(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let image = self.image(DIM_BUFFER, 1);
        let sampled_image = self.sampled_image_type(image);
        self.resource(name, set, binding, sampled_image, STORAGE_CLASS_UNIFORM_CONSTANT)
    }

    pub(crate) fn storage_texel_buffer(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let image = self.image(DIM_BUFFER, 2);
        self.resource(name, set, binding, image, STORAGE_CLASS_UNIFORM_CONSTANT)
    }

    pub(crate) fn storage_image(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let image = self.image(DIM_2D, 2);
        self.resource(name, set, binding, image, STORAGE_CLASS_UNIFORM_CONSTANT)
    }

    pub(crate) fn sampled_image(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let image = self.image(DIM_2D, 1);
        let sampled_image = self.sampled_image_type(image);
        self.resource(name, set, binding, sampled_image, STORAGE_CLASS_UNIFORM_CONSTANT)
    }

    pub(crate) fn atomic_counter(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let uint = self.uint();
        self.resource(name, set, binding, uint, STORAGE_CLASS_ATOMIC_COUNTER)
    }

    pub(crate) fn separate_image(&mut self, name: &str, set: u32, binding: u32) -> u32 {
        let image = self.image(DIM_2D, 1);
        self.resource(name, set, binding, image, STORAGE_CLASS_UNIFORM_CONSTANT)
    }

    pub(crate) fn sampler(&mut self, name: &str) -> u32 {
        let sampler = self.id();
        self.push_type(OP_TYPE_SAMPLER, &[sampler]);

        let binding = self.auto_binding();
        self.resource(name, 0, binding, sampler, STORAGE_CLASS_UNIFORM_CONSTANT)
    }

    pub(crate) fn sampler_array(&mut self, name: &str, len: u32) -> u32 {
        let sampler = self.id();
        self.push_type(OP_TYPE_SAMPLER, &[sampler]);
        let array = self.array(sampler, len);

        let binding = self.auto_binding();
        self.resource(name, 0, binding, array, STORAGE_CLASS_UNIFORM_CONSTANT)
    }

    pub(crate) fn separate_image_array(&mut self, name: &str, len: u32) -> u32 {
        let image = self.image(DIM_2D, 1);
        let array = self.array(image, len);

        let binding = self.auto_binding();
        self.resource(name, 0, binding, array, STORAGE_CLASS_UNIFORM_CONSTANT)
    }

    pub(crate) fn separate_image_array_2d(&mut self, name: &str, inner: u32, outer: u32) -> u32 {
        let image = self.image(DIM_2D, 1);
        let inner = self.array(image, inner);
        let outer = self.array(inner, outer);

        let binding = self.auto_binding();
        self.resource(name, 0, binding, outer, STORAGE_CLASS_UNIFORM_CONSTANT)
    }

    /// A uniform buffer whose variable has no name, so that it is known by its block type name.
    pub(crate) fn unnamed_uniform_buffer(&mut self, type_name: &str) -> u32 {
        let block = self.block(DECORATION_BLOCK);
        self.name(block, type_name);

        let pointer = self.pointer(STORAGE_CLASS_UNIFORM, block);
        let variable = self.variable(pointer, STORAGE_CLASS_UNIFORM);
        let binding = self.auto_binding();
        self.decorate(variable, DECORATION_DESCRIPTOR_SET, &[0]);
        self.decorate(variable, DECORATION_BINDING, &[binding]);

        variable
    }

    pub(crate) fn input(&mut self, name: &str, location: u32, semantic: Option<&str>) -> u32 {
        let variable = self.input_variable(name);
        self.decorate(variable, DECORATION_LOCATION, &[location]);

        if let Some(semantic) = semantic {
            let mut operands = vec![variable, DECORATION_USER_SEMANTIC];
            operands.extend(string_words(semantic));
            push(&mut self.annotations, OP_DECORATE_STRING, &operands);
        }

        variable
    }

    pub(crate) fn builtin_input(&mut self, name: &str) -> u32 {
        let variable = self.input_variable(name);
        self.decorate(variable, DECORATION_BUILT_IN, &[BUILT_IN_VERTEX_INDEX]);

        variable
    }

    fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;

        id
    }

    fn auto_binding(&mut self) -> u32 {
        let binding = self.next_binding;
        self.next_binding += 1;

        binding
    }

    fn push_type(&mut self, opcode: u32, operands: &[u32]) {
        push(&mut self.types, opcode, operands);
    }

    fn name(&mut self, target: u32, name: &str) {
        let mut operands = vec![target];
        operands.extend(string_words(name));
        push(&mut self.debug, OP_NAME, &operands);
    }

    fn decorate(&mut self, target: u32, decoration: u32, literals: &[u32]) {
        let mut operands = vec![target, decoration];
        operands.extend_from_slice(literals);
        push(&mut self.annotations, OP_DECORATE, &operands);
    }

    fn float(&mut self) -> u32 {
        let float = self.id();
        self.push_type(OP_TYPE_FLOAT, &[float, 32]);

        float
    }

    fn uint(&mut self) -> u32 {
        let uint = self.id();
        self.push_type(OP_TYPE_INT, &[uint, 32, 0]);

        uint
    }

    fn block(&mut self, decoration: u32) -> u32 {
        let member = self.float();
        let block = self.id();
        self.push_type(OP_TYPE_STRUCT, &[block, member]);
        self.decorate(block, decoration, &[]);

        block
    }

    fn image(&mut self, dim: u32, sampled: u32) -> u32 {
        let sampled_type = self.float();
        let image = self.id();
        self.push_type(OP_TYPE_IMAGE, &[image, sampled_type, dim, 0, 0, 0, sampled, 0]);

        image
    }

    fn sampled_image_type(&mut self, image: u32) -> u32 {
        let sampled_image = self.id();
        self.push_type(OP_TYPE_SAMPLED_IMAGE, &[sampled_image, image]);

        sampled_image
    }

    fn array(&mut self, element: u32, len: u32) -> u32 {
        let uint = self.uint();
        let length = self.id();
        self.push_type(OP_CONSTANT, &[uint, length, len]);

        let array = self.id();
        self.push_type(OP_TYPE_ARRAY, &[array, element, length]);

        array
    }

    fn pointer(&mut self, storage_class: u32, ty: u32) -> u32 {
        let pointer = self.id();
        self.push_type(OP_TYPE_POINTER, &[pointer, storage_class, ty]);

        pointer
    }

    fn variable(&mut self, pointer: u32, storage_class: u32) -> u32 {
        let variable = self.id();
        self.push_type(OP_VARIABLE, &[pointer, variable, storage_class]);

        variable
    }

    fn resource(&mut self, name: &str, set: u32, binding: u32, ty: u32, storage_class: u32) -> u32 {
        let pointer = self.pointer(storage_class, ty);
        let variable = self.variable(pointer, storage_class);
        self.name(variable, name);
        self.decorate(variable, DECORATION_DESCRIPTOR_SET, &[set]);
        self.decorate(variable, DECORATION_BINDING, &[binding]);

        variable
    }

    fn input_variable(&mut self, name: &str) -> u32 {
        let float = self.float();
        let pointer = self.pointer(STORAGE_CLASS_INPUT, float);
        let variable = self.variable(pointer, STORAGE_CLASS_INPUT);
        self.name(variable, name);

        variable
    }
}

fn push(section: &mut Vec<u32>, opcode: u32, operands: &[u32]) {
    section.push(((operands.len() as u32 + 1) << 16) | opcode);
    section.extend_from_slice(operands);
}

/// Encodes a nul-terminated string, padded to a whole number of words.
fn string_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    bytes.resize(bytes.len().next_multiple_of(4), 0);

    bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
