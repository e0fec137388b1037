// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Holds the objects bound to the slots of one or more binding groups.
//!
//! The slots of all groups live in one allocation. Each group owns the contiguous region that
//! starts at its base offset, and within that region a resource with `n` array elements owns
//! `n` consecutive slots starting at its cache offset.
//!
//! Binding is not synchronized. Callers that bind to the same cache from several threads must
//! provide their own mutual exclusion; distinct caches can be used concurrently.

use super::layout::DescriptorType;
use crate::{
    sampler::Sampler,
    shader::{resources::ResourceKind, VariableType},
    NonExhaustive,
};
use smallvec::SmallVec;
use std::{
    error::Error,
    fmt::{Debug, Display, Error as FmtError, Formatter},
    sync::Arc,
};

/// A buffer that can be bound to a uniform buffer, storage buffer or atomic counter slot.
pub trait BufferResource: Debug + Send + Sync {
    /// Returns the native buffer handle.
    fn handle(&self) -> ash::vk::Buffer;

    /// Returns the size of the bound range of the buffer.
    fn size(&self) -> ash::vk::DeviceSize;

    /// Returns whether the buffer is suballocated anew every time it is written, so that its
    /// offset has to be supplied when binding.
    fn is_dynamic(&self) -> bool {
        false
    }

    /// Returns the offset of the current allocation of the buffer for the command sequence
    /// identified by `context_id`.
    fn dynamic_offset(&self, context_id: usize) -> u32 {
        let _ = context_id;

        0
    }
}

/// How a texel buffer view or image view may be accessed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewAccess {
    /// The view is only read.
    Read,

    /// The view is read and written.
    ReadWrite,
}

/// A formatted view of a buffer.
pub trait BufferViewResource: Debug + Send + Sync {
    /// Returns the native buffer view handle.
    fn handle(&self) -> ash::vk::BufferView;

    /// Returns how the view may be accessed.
    fn access(&self) -> ViewAccess;
}

/// A view of an image.
pub trait ImageViewResource: Debug + Send + Sync {
    /// Returns the native image view handle.
    fn handle(&self) -> ash::vk::ImageView;

    /// Returns how the view may be accessed.
    fn access(&self) -> ViewAccess;

    /// Returns the sampler to use with the view, if it has one.
    ///
    /// When a separate image has a sampler assigned to it, binding the image also binds this
    /// sampler.
    fn sampler(&self) -> Option<Arc<Sampler>> {
        None
    }
}

/// An object bound to a cache slot.
#[derive(Clone, Debug)]
pub enum BoundResource {
    Buffer(Arc<dyn BufferResource>),
    BufferView(Arc<dyn BufferViewResource>),
    ImageView(Arc<dyn ImageViewResource>),
    Sampler(Arc<Sampler>),
}

impl BoundResource {
    /// Returns whether `self` and `other` refer to the same object.
    pub fn same_object(&self, other: &BoundResource) -> bool {
        match (self, other) {
            (Self::Buffer(a), Self::Buffer(b)) => {
                Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
            }
            (Self::BufferView(a), Self::BufferView(b)) => {
                Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
            }
            (Self::ImageView(a), Self::ImageView(b)) => {
                Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
            }
            (Self::Sampler(a), Self::Sampler(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Returns a short description of the object, used in errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Buffer(_) => "buffer",
            Self::BufferView(view) => match view.access() {
                ViewAccess::Read => "read-only buffer view",
                ViewAccess::ReadWrite => "read-write buffer view",
            },
            Self::ImageView(view) => match view.access() {
                ViewAccess::Read => "read-only image view",
                ViewAccess::ReadWrite => "read-write image view",
            },
            Self::Sampler(_) => "sampler",
        }
    }

    /// Returns whether the object can be bound to a slot of `kind`.
    pub fn is_compatible_with(&self, kind: ResourceKind) -> bool {
        match self {
            Self::Buffer(_) => matches!(
                kind,
                ResourceKind::UniformBuffer
                    | ResourceKind::StorageBuffer
                    | ResourceKind::AtomicCounter
            ),
            Self::BufferView(view) => match view.access() {
                ViewAccess::Read => kind == ResourceKind::UniformTexelBuffer,
                ViewAccess::ReadWrite => kind == ResourceKind::StorageTexelBuffer,
            },
            Self::ImageView(view) => match view.access() {
                ViewAccess::Read => matches!(
                    kind,
                    ResourceKind::SampledImage | ResourceKind::SeparateImage
                ),
                ViewAccess::ReadWrite => kind == ResourceKind::StorageImage,
            },
            Self::Sampler(_) => kind == ResourceKind::SeparateSampler,
        }
    }

    fn dynamic_buffer(&self) -> Option<&Arc<dyn BufferResource>> {
        match self {
            Self::Buffer(buffer) if buffer.is_dynamic() => Some(buffer),
            _ => None,
        }
    }
}

impl From<Arc<Sampler>> for BoundResource {
    #[inline]
    fn from(val: Arc<Sampler>) -> Self {
        Self::Sampler(val)
    }
}

/// What happens when a different object is bound to a static slot that is already bound.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RebindPolicy {
    /// The new object replaces the old one, and a warning is logged.
    #[default]
    Permissive,

    /// The bind fails with [`BindError::StaticRebind`] and the old object stays bound.
    Strict,
}

/// Parameters to create a new `ShaderResourceCache`.
#[derive(Clone, Debug)]
pub struct ResourceCacheCreateInfo {
    /// What happens when a different object is bound to an already bound static slot.
    ///
    /// The default value is [`RebindPolicy::Permissive`].
    pub static_rebind_policy: RebindPolicy,

    /// Whether to check that every slot is initialized exactly once before it is used.
    ///
    /// The default value is `true` in debug builds and `false` otherwise.
    pub track_initialized: bool,

    pub _ne: NonExhaustive,
}

impl Default for ResourceCacheCreateInfo {
    #[inline]
    fn default() -> Self {
        Self {
            static_rebind_policy: RebindPolicy::Permissive,
            track_initialized: cfg!(debug_assertions),
            _ne: NonExhaustive(()),
        }
    }
}

/// Error that can happen when binding an object to a cache slot. The slot keeps its previous
/// state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BindError {
    /// The object can't be bound to a slot of this kind.
    TypeMismatch {
        expected: ResourceKind,
        provided: &'static str,
    },

    /// The array element doesn't exist.
    ArrayIndexOutOfRange { index: u32, array_size: u32 },

    /// No resource has been assigned to the slot.
    SlotNotInitialized,

    /// A different object is already bound to the static slot.
    StaticRebind,
}

impl Error for BindError {}

impl Display for BindError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::TypeMismatch { expected, provided } => write!(
                f,
                "a {} can't be bound to a {} slot",
                provided,
                expected.name(),
            ),
            Self::ArrayIndexOutOfRange { index, array_size } => write!(
                f,
                "array index {} is out of range for an array of size {}",
                index, array_size,
            ),
            Self::SlotNotInitialized => write!(f, "no resource has been assigned to the slot"),
            Self::StaticRebind => write!(
                f,
                "a different object is already bound to the static slot",
            ),
        }
    }
}

/// One slot of a [`ShaderResourceCache`].
#[derive(Clone, Debug, Default)]
pub struct CacheSlot {
    kind: Option<ResourceKind>,
    variable_type: VariableType,
    array_size: u16,
    resource: Option<BoundResource>,
}

impl CacheSlot {
    /// Returns the kind of the resource the slot belongs to, or `None` if no resource has been
    /// assigned to it.
    #[inline]
    pub fn kind(&self) -> Option<ResourceKind> {
        self.kind
    }

    /// Returns the variable type of the resource the slot belongs to.
    #[inline]
    pub fn variable_type(&self) -> VariableType {
        self.variable_type
    }

    /// Returns the bound object.
    #[inline]
    pub fn resource(&self) -> Option<&BoundResource> {
        self.resource.as_ref()
    }

    /// Returns whether an object is bound.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.resource.is_some()
    }
}

/// A descriptor update produced from a bound cache slot.
#[derive(Clone, Debug)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub first_array_element: u32,
    pub descriptor_type: DescriptorType,
    pub resource: BoundResource,
}

/// Holds the objects bound to the slots of a set of binding groups.
#[derive(Debug)]
pub struct ShaderResourceCache {
    static_rebind_policy: RebindPolicy,
    track_initialized: bool,

    slots: Vec<CacheSlot>,
    // Start of the region of each group, followed by the total number of slots.
    group_offsets: SmallVec<[u32; 4]>,
    num_dynamic_buffers: u32,
}

impl ShaderResourceCache {
    /// Creates an empty cache. Call [`initialize_sets`](Self::initialize_sets) before using it.
    pub fn new(create_info: ResourceCacheCreateInfo) -> Self {
        let ResourceCacheCreateInfo {
            static_rebind_policy,
            track_initialized,
            _ne: _,
        } = create_info;

        ShaderResourceCache {
            static_rebind_policy,
            track_initialized,
            slots: Vec::new(),
            group_offsets: SmallVec::from_slice(&[0]),
            num_dynamic_buffers: 0,
        }
    }

    /// Allocates the slots of all groups. `group_sizes` holds the total number of descriptors
    /// of each group.
    ///
    /// # Panics
    ///
    /// - Panics if the sets have already been initialized.
    pub fn initialize_sets(&mut self, group_sizes: &[u32]) {
        assert!(
            self.group_offsets.len() == 1 && self.slots.is_empty(),
            "the sets of the cache have already been initialized",
        );

        let mut total = 0;

        for &size in group_sizes {
            total += size;
            self.group_offsets.push(total);
        }

        self.slots = vec![CacheSlot::default(); total as usize];
    }

    /// Assigns `array_size` slots starting at `offset` in `group` to a resource.
    ///
    /// # Panics
    ///
    /// - Panics if the slots are outside of the region of `group`.
    pub fn initialize_resources(
        &mut self,
        group: usize,
        offset: u32,
        array_size: u32,
        kind: ResourceKind,
        variable_type: VariableType,
    ) {
        let first = self.slot_index(group, offset);
        let last = self.slot_index(group, offset + array_size - 1);

        for slot in &mut self.slots[first..=last] {
            if self.track_initialized && slot.kind.is_some() {
                log::error!(
                    "cache slot {} of group {} is initialized more than once",
                    offset,
                    group,
                );
                debug_assert!(false);
            }

            *slot = CacheSlot {
                kind: Some(kind),
                variable_type,
                array_size: array_size as u16,
                resource: None,
            };
        }
    }

    /// Returns whether every slot has been assigned to a resource. Always returns `true` if
    /// tracking is disabled.
    pub fn verify_initialized(&self) -> bool {
        if !self.track_initialized {
            return true;
        }

        let mut all_initialized = true;

        for group in 0..self.num_groups() {
            for (offset, slot) in self.group_slots(group).iter().enumerate() {
                if slot.kind.is_none() {
                    log::error!("cache slot {} of group {} is never initialized", offset, group);
                    all_initialized = false;
                }
            }
        }

        all_initialized
    }

    /// Returns the number of groups.
    #[inline]
    pub fn num_groups(&self) -> usize {
        self.group_offsets.len() - 1
    }

    /// Returns the slots of `group`.
    pub fn group_slots(&self, group: usize) -> &[CacheSlot] {
        &self.slots[self.group_offsets[group] as usize..self.group_offsets[group + 1] as usize]
    }

    /// Returns the slot at `offset` in `group`.
    #[inline]
    pub fn slot(&self, group: usize, offset: u32) -> &CacheSlot {
        &self.slots[self.slot_index(group, offset)]
    }

    fn slot_index(&self, group: usize, offset: u32) -> usize {
        let index = self.group_offsets[group] + offset;
        assert!(
            index < self.group_offsets[group + 1],
            "cache offset {} is out of range for group {}",
            offset,
            group,
        );

        index as usize
    }

    /// Binds `resource` to element `array_index` of the resource whose first slot is at
    /// `offset` in `group`.
    ///
    /// On error, the error is logged and the slot keeps its previous state.
    pub fn bind_resource(
        &mut self,
        group: usize,
        offset: u32,
        array_index: u32,
        resource: BoundResource,
    ) -> Result<(), BindError> {
        self.try_bind_resource(group, offset, array_index, resource)
            .inspect_err(|err| {
                log::error!(
                    "failed to bind element {} of cache slot {} of group {}: {}",
                    array_index,
                    offset,
                    group,
                    err,
                );
            })
    }

    /// Checks that `resource` can be bound to element `array_index` of the resource whose
    /// first slot is at `offset` in `group`, without changing anything.
    pub fn validate_bind(
        &self,
        group: usize,
        offset: u32,
        array_index: u32,
        resource: &BoundResource,
    ) -> Result<(), BindError> {
        let (index, kind) = self.element_index(group, offset, array_index)?;

        if !resource.is_compatible_with(kind) {
            return Err(BindError::TypeMismatch {
                expected: kind,
                provided: resource.type_name(),
            });
        }

        let slot = &self.slots[index];

        if slot.variable_type == VariableType::Static
            && self.static_rebind_policy == RebindPolicy::Strict
            && slot.resource.as_ref().is_some_and(|old| !old.same_object(resource))
        {
            return Err(BindError::StaticRebind);
        }

        Ok(())
    }

    fn element_index(
        &self,
        group: usize,
        offset: u32,
        array_index: u32,
    ) -> Result<(usize, ResourceKind), BindError> {
        let first = &self.slots[self.slot_index(group, offset)];

        let Some(kind) = first.kind else {
            return Err(BindError::SlotNotInitialized);
        };

        let array_size = first.array_size as u32;

        if array_index >= array_size {
            return Err(BindError::ArrayIndexOutOfRange {
                index: array_index,
                array_size,
            });
        }

        Ok((self.slot_index(group, offset + array_index), kind))
    }

    fn try_bind_resource(
        &mut self,
        group: usize,
        offset: u32,
        array_index: u32,
        resource: BoundResource,
    ) -> Result<(), BindError> {
        self.validate_bind(group, offset, array_index, &resource)?;
        let (index, _) = self.element_index(group, offset, array_index)?;
        let slot = &mut self.slots[index];

        if slot.variable_type == VariableType::Static
            && cfg!(debug_assertions)
            && slot.resource.as_ref().is_some_and(|old| !old.same_object(&resource))
        {
            log::warn!(
                "a different object is bound to element {} of static cache slot {} of group {}; \
                it replaces the previous one",
                array_index,
                offset,
                group,
            );
        }

        if slot.resource.as_ref().and_then(BoundResource::dynamic_buffer).is_some() {
            self.num_dynamic_buffers -= 1;
        }

        if resource.dynamic_buffer().is_some() {
            self.num_dynamic_buffers += 1;
        }

        slot.resource = Some(resource);

        Ok(())
    }

    /// Unbinds element `array_index` of the resource whose first slot is at `offset` in
    /// `group`.
    pub fn reset_resource(
        &mut self,
        group: usize,
        offset: u32,
        array_index: u32,
    ) -> Result<(), BindError> {
        let (index, _) = self.element_index(group, offset, array_index)?;
        let slot = &mut self.slots[index];

        if slot.resource.as_ref().and_then(BoundResource::dynamic_buffer).is_some() {
            self.num_dynamic_buffers -= 1;
        }

        slot.resource = None;

        Ok(())
    }

    /// Returns the number of bound buffers that need their offset supplied when binding.
    #[inline]
    pub fn num_dynamic_buffers(&self) -> u32 {
        self.num_dynamic_buffers
    }

    /// Returns one offset per uniform and storage buffer descriptor, group by group, in slot
    /// order. Descriptors without a bound dynamic buffer get an offset of 0.
    ///
    /// # Panics
    ///
    /// - Panics if a uniform or storage buffer follows a slot of another kind within a group.
    pub fn get_dynamic_buffer_offsets(&self, context_id: usize) -> SmallVec<[u32; 8]> {
        let mut offsets = SmallVec::new();

        for group in 0..self.num_groups() {
            let mut past_buffers = false;

            for slot in self.group_slots(group) {
                match slot.kind {
                    Some(kind) if kind.has_dynamic_offset() => {
                        assert!(
                            !past_buffers,
                            "all uniform and storage buffers of a group must come before any \
                            other resource",
                        );

                        let offset = slot
                            .resource
                            .as_ref()
                            .and_then(BoundResource::dynamic_buffer)
                            .map_or(0, |buffer| buffer.dynamic_offset(context_id));
                        offsets.push(offset);
                    }
                    _ => past_buffers = true,
                }
            }
        }

        offsets
    }
}
