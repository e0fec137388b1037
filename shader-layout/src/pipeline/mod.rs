// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Laying out the resources of the stages of a pipeline, and binding objects to them.
//!
//! The [`PipelineLayoutManager`](layout::PipelineLayoutManager) owns the binding model of a
//! pipeline. A [`ShaderResourceLayout`](resource_layout::ShaderResourceLayout) places the
//! resources of one stage in it, and [`binding`] gives access to the resulting slots by
//! variable name.

pub mod binding;
pub mod layout;
pub mod resource_layout;

pub use self::{
    binding::{
        PipelineResources, ShaderResourceBinding, ShaderStaticResources, ShaderVariable,
        ShaderVariableManager,
    },
    layout::{PipelineLayoutManager, SlotAllocation},
    resource_layout::{LayoutResource, LayoutSlot, ShaderResourceLayout},
};
