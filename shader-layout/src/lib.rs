// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Shader resource reflection, binding layouts and resource caches for Vulkan pipelines.
//!
//! # Overview
//!
//! - A [`ResourceCatalog`](crate::shader::resources::ResourceCatalog) is built once per compiled
//!   shader from its SPIR-V words and a [`ShaderDesc`](crate::shader::ShaderDesc). It lists every
//!   buffer, image and sampler the shader declares, grouped by resource kind, together with the
//!   visibility class (static, mutable or dynamic) each of them was given, and the word offsets
//!   of their `Binding` and `DescriptorSet` decorations.
//!
//! - A [`ShaderResourceLayout`](crate::pipeline::resource_layout::ShaderResourceLayout) assigns
//!   every resource a location: a binding group, a binding number and an offset into the
//!   resource cache. The static path builds a private layout for the static resources of one
//!   shader. The pipeline path registers the resources of every stage of a pipeline with a
//!   [`PipelineLayoutManager`](crate::pipeline::layout::PipelineLayoutManager) and rewrites the
//!   decorations of each stage's SPIR-V so that it matches the final binding model.
//!
//! - The [`PipelineLayoutManager`](crate::pipeline::layout::PipelineLayoutManager) keeps one
//!   [`BindingGroup`](crate::descriptor_set::layout::BindingGroup) per visibility class. Once
//!   every stage is registered, it is finalized into native descriptor set layouts and a native
//!   pipeline layout through a [`LayoutDevice`](crate::device::LayoutDevice).
//!
//! - A [`ShaderResourceCache`](crate::descriptor_set::cache::ShaderResourceCache) holds the
//!   objects that are bound to each descriptor. It is filled through the
//!   [`ShaderVariable`](crate::pipeline::binding::ShaderVariable)s of a
//!   [`ShaderResourceBinding`](crate::pipeline::binding::ShaderResourceBinding), and read back
//!   when recording commands, to produce descriptor writes and dynamic offsets.

pub use ash::vk::Handle;
use std::{
    borrow::Cow,
    error::Error,
    fmt::{Debug, Display, Error as FmtError, Formatter},
};

pub mod descriptor_set;
pub mod device;
mod macros;
pub mod memory;
pub mod pipeline;
pub mod sampler;
pub mod shader;
#[cfg(test)]
mod tests;

/// Gives access to the native handle of an object.
pub unsafe trait VulkanObject {
    /// The type of the handle.
    type Handle: ash::vk::Handle;

    /// Returns the raw Vulkan handle of the object.
    fn handle(&self) -> Self::Handle;
}

/// An error that can happen when the device fails to create an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VulkanError {
    /// A host memory allocation has failed.
    OutOfHostMemory,

    /// A device memory allocation has failed.
    OutOfDeviceMemory,

    /// Initialization of an object could not be completed for implementation-specific reasons.
    InitializationFailed,

    /// Too many objects of the type have already been created.
    TooManyObjects,

    /// Any other error code.
    Unnamed(ash::vk::Result),
}

impl From<ash::vk::Result> for VulkanError {
    fn from(val: ash::vk::Result) -> VulkanError {
        match val {
            ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY => Self::OutOfHostMemory,
            ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => Self::OutOfDeviceMemory,
            ash::vk::Result::ERROR_INITIALIZATION_FAILED => Self::InitializationFailed,
            ash::vk::Result::ERROR_TOO_MANY_OBJECTS => Self::TooManyObjects,
            _ => Self::Unnamed(val),
        }
    }
}

impl Error for VulkanError {}

impl Display for VulkanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            VulkanError::OutOfHostMemory => write!(f, "a host memory allocation has failed"),
            VulkanError::OutOfDeviceMemory => write!(f, "a device memory allocation has failed"),
            VulkanError::InitializationFailed => write!(
                f,
                "initialization of an object could not be completed for implementation-specific \
                reasons",
            ),
            VulkanError::TooManyObjects => write!(
                f,
                "too many objects of the type have already been created",
            ),
            VulkanError::Unnamed(result) => {
                write!(f, "unnamed error, VkResult value {}", result.as_raw())
            }
        }
    }
}

/// A wrapper for error types of functions that can return validation errors.
#[derive(Clone)]
pub enum Validated<E> {
    /// A non-validation error occurred.
    Error(E),

    /// A validation error occurred.
    ValidationError(Box<ValidationError>),
}

impl<E> Validated<E> {
    /// Maps the inner `Error` value using the provided function, or does nothing if the value is
    /// `ValidationError`.
    #[inline]
    pub fn map<F>(self, f: impl FnOnce(E) -> F) -> Validated<F> {
        match self {
            Self::Error(err) => Validated::Error(f(err)),
            Self::ValidationError(err) => Validated::ValidationError(err),
        }
    }

    /// Returns the inner `ValidationError`, if any.
    #[inline]
    pub fn validation_error(&self) -> Option<&ValidationError> {
        match self {
            Self::Error(_) => None,
            Self::ValidationError(err) => Some(err),
        }
    }

    #[inline]
    fn add_context(self, context: impl Into<Cow<'static, str>>) -> Self {
        match self {
            Self::Error(err) => Self::Error(err),
            Self::ValidationError(err) => Self::ValidationError(err.add_context(context)),
        }
    }
}

impl<E> Error for Validated<E>
where
    E: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Error(err) => Some(err),
            Self::ValidationError(err) => Some(err),
        }
    }
}

impl<E> Display for Validated<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::Error(_) => write!(f, "a non-validation error occurred"),
            Self::ValidationError(_) => write!(f, "a validation error occurred"),
        }
    }
}

impl<E> Debug for Validated<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::Error(err) => write!(f, "a non-validation error occurred: {err}"),
            Self::ValidationError(err) => {
                write!(f, "a validation error occurred\n\nCaused by:\n    {err:?}")
            }
        }
    }
}

impl<E> From<Box<ValidationError>> for Validated<E> {
    fn from(err: Box<ValidationError>) -> Self {
        Self::ValidationError(err)
    }
}

impl From<VulkanError> for Validated<VulkanError> {
    fn from(err: VulkanError) -> Self {
        Self::Error(err)
    }
}

/// The arguments or other context of a call were found to be invalid, or the reflected shader
/// uses a shape that cannot be laid out.
#[derive(Clone, Default)]
pub struct ValidationError {
    /// The context in which the problem exists, for example the name of a shader variable.
    pub context: Cow<'static, str>,

    /// A description of what the problem is.
    pub problem: Cow<'static, str>,
}

impl ValidationError {
    pub(crate) fn add_context(mut self: Box<Self>, context: impl Into<Cow<'static, str>>) -> Box<Self> {
        if self.context.is_empty() {
            self.context = context.into();
        } else {
            self.context = format!("{}.{}", context.into(), self.context).into();
        }

        self
    }
}

impl Debug for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        if self.context.is_empty() {
            write!(f, "{}", self.problem)
        } else {
            write!(f, "{}: {}", self.context, self.problem)
        }
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        Debug::fmt(self, f)
    }
}

impl Error for ValidationError {}

/// A helper type for non-exhaustive structs.
///
/// This type cannot be constructed outside this crate. Structures with a field of this type can
/// only be constructed by calling a constructor function or `Default::default()`. The effect is
/// similar to the standard Rust `#[non_exhaustive]` attribute, except that it does not prevent
/// update syntax from being used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NonExhaustive(pub(crate) ());

impl NonExhaustive {
    #[allow(dead_code)]
    pub(crate) const fn new() -> Self {
        Self(())
    }
}
