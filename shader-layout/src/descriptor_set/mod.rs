// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Binding groups and the caches that hold the objects bound to them.
//!
//! A [`BindingGroup`](layout::BindingGroup) is the equivalent of a descriptor set layout: an
//! ordered list of bindings that is finalized into one native layout object. The objects bound
//! to the slots of one or more groups live in a
//! [`ShaderResourceCache`](cache::ShaderResourceCache).

pub mod cache;
pub mod layout;

pub use self::{
    cache::{
        BindError, BoundResource, BufferResource, BufferViewResource, CacheSlot, DescriptorWrite,
        ImageViewResource, RebindPolicy, ResourceCacheCreateInfo, ShaderResourceCache,
    },
    layout::{BindingGroup, BindingGroupBinding, CacheOffset, DescriptorType},
};
