// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The device that native layout objects are created with.
//!
//! Creating and destroying native objects is left to an implementation of [`LayoutDevice`].
//! [`AshDevice`] implements it for a logical device loaded with `ash`. Every object created
//! through a `LayoutDevice` is owned by a wrapper that destroys it when dropped.

use crate::VulkanError;
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    sync::Arc,
};

/// Creates and destroys the native objects that make up a binding model.
pub trait LayoutDevice: Send + Sync {
    /// Creates a sampler.
    fn create_sampler(
        &self,
        create_info: &ash::vk::SamplerCreateInfo<'_>,
    ) -> Result<ash::vk::Sampler, VulkanError>;

    /// Destroys a sampler.
    ///
    /// # Safety
    ///
    /// - `sampler` must have been created by `self` and must not be in use.
    unsafe fn destroy_sampler(&self, sampler: ash::vk::Sampler);

    /// Creates a descriptor set layout.
    fn create_descriptor_set_layout(
        &self,
        create_info: &ash::vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> Result<ash::vk::DescriptorSetLayout, VulkanError>;

    /// Destroys a descriptor set layout.
    ///
    /// # Safety
    ///
    /// - `layout` must have been created by `self`.
    unsafe fn destroy_descriptor_set_layout(&self, layout: ash::vk::DescriptorSetLayout);

    /// Creates a pipeline layout.
    fn create_pipeline_layout(
        &self,
        create_info: &ash::vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<ash::vk::PipelineLayout, VulkanError>;

    /// Destroys a pipeline layout.
    ///
    /// # Safety
    ///
    /// - `layout` must have been created by `self` and must not be in use.
    unsafe fn destroy_pipeline_layout(&self, layout: ash::vk::PipelineLayout);
}

/// A [`LayoutDevice`] backed by an `ash` logical device.
#[derive(Clone)]
pub struct AshDevice {
    device: ash::Device,
}

impl AshDevice {
    /// Wraps `device`.
    ///
    /// # Safety
    ///
    /// - `device` must stay valid for as long as the returned object and every object created
    ///   through it are alive.
    pub unsafe fn new(device: ash::Device) -> Arc<Self> {
        Arc::new(AshDevice { device })
    }
}

impl LayoutDevice for AshDevice {
    fn create_sampler(
        &self,
        create_info: &ash::vk::SamplerCreateInfo<'_>,
    ) -> Result<ash::vk::Sampler, VulkanError> {
        unsafe { self.device.create_sampler(create_info, None) }.map_err(VulkanError::from)
    }

    unsafe fn destroy_sampler(&self, sampler: ash::vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn create_descriptor_set_layout(
        &self,
        create_info: &ash::vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> Result<ash::vk::DescriptorSetLayout, VulkanError> {
        unsafe { self.device.create_descriptor_set_layout(create_info, None) }
            .map_err(VulkanError::from)
    }

    unsafe fn destroy_descriptor_set_layout(&self, layout: ash::vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_pipeline_layout(
        &self,
        create_info: &ash::vk::PipelineLayoutCreateInfo<'_>,
    ) -> Result<ash::vk::PipelineLayout, VulkanError> {
        unsafe { self.device.create_pipeline_layout(create_info, None) }
            .map_err(VulkanError::from)
    }

    unsafe fn destroy_pipeline_layout(&self, layout: ash::vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) };
    }
}

impl Debug for AshDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("AshDevice")
            .field("handle", &self.device.handle())
            .finish()
    }
}
