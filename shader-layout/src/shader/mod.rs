// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Shader stages, shader descriptions, and the resources a shader declares.
//!
//! A [`ShaderDesc`] accompanies the SPIR-V words of a shader. It tells the catalog which
//! [`VariableType`] each resource gets, which resources are given an immutable sampler, and
//! whether separate samplers are paired with textures by a name suffix.
//!
//! # Combined sampler emulation
//!
//! Shaders compiled from languages with separate texture and sampler objects can be made to
//! behave as if they used combined image samplers. When
//! [`combined_sampler_suffix`](ShaderDesc::combined_sampler_suffix) is set to, for example,
//! `"_sampler"`, a separate sampler named `g_Texture_sampler` is assigned to the separate image
//! named `g_Texture`. The sampler takes on the variable type of its texture, and is bound
//! together with it.

use crate::{
    macros::{vulkan_bitflags, vulkan_enum},
    sampler::SamplerDesc,
    NonExhaustive,
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub mod reflect;
pub mod resources;
pub mod spirv;

vulkan_enum! {
    /// A shader stage within a pipeline.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    ShaderStage = ShaderStageFlags(u32);

    Vertex = VERTEX,
    TessellationControl = TESSELLATION_CONTROL,
    TessellationEvaluation = TESSELLATION_EVALUATION,
    Geometry = GEOMETRY,
    Fragment = FRAGMENT,
    Compute = COMPUTE,
}

vulkan_bitflags! {
    /// A set of [`ShaderStage`] values.
    ShaderStages impl {
        /// Creates a `ShaderStages` struct with all graphics stages set.
        #[inline]
        pub const fn all_graphics() -> ShaderStages {
            ShaderStages::VERTEX
                .union(ShaderStages::TESSELLATION_CONTROL)
                .union(ShaderStages::TESSELLATION_EVALUATION)
                .union(ShaderStages::GEOMETRY)
                .union(ShaderStages::FRAGMENT)
        }
    }
    = ShaderStageFlags(u32);

    VERTEX = VERTEX,
    TESSELLATION_CONTROL = TESSELLATION_CONTROL,
    TESSELLATION_EVALUATION = TESSELLATION_EVALUATION,
    GEOMETRY = GEOMETRY,
    FRAGMENT = FRAGMENT,
    COMPUTE = COMPUTE,
}

impl From<ShaderStage> for ShaderStages {
    #[inline]
    fn from(val: ShaderStage) -> Self {
        Self(val as u32)
    }
}

/// How often the object bound to a shader variable is expected to change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum VariableType {
    /// Bound once per shader, before any pipeline using it is used.
    Static = 0,

    /// Bound once per shader resource binding object.
    #[default]
    Mutable = 1,

    /// May be bound any number of times, typically once per draw.
    Dynamic = 2,
}

impl VariableType {
    /// The number of variable types.
    pub const COUNT: usize = 3;

    /// All variable types, in index order.
    pub const ALL: [VariableType; Self::COUNT] = [Self::Static, Self::Mutable, Self::Dynamic];

    /// Returns the index of the variable type.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// A set of [`VariableType`] values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VariableTypes(u8);

impl VariableTypes {
    pub const STATIC: Self = Self(1 << VariableType::Static as u8);
    pub const MUTABLE: Self = Self(1 << VariableType::Mutable as u8);
    pub const DYNAMIC: Self = Self(1 << VariableType::Dynamic as u8);

    /// Returns a `VariableTypes` with none of the types set.
    #[inline]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Returns a `VariableTypes` with all of the types set.
    #[inline]
    pub const fn all() -> Self {
        Self::STATIC.union(Self::MUTABLE).union(Self::DYNAMIC)
    }

    /// Returns the union of `self` and `other`.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns whether `variable_type` is in the set.
    #[inline]
    pub const fn contains_type(self, variable_type: VariableType) -> bool {
        self.0 & (1 << variable_type as u8) != 0
    }
}

impl From<VariableType> for VariableTypes {
    #[inline]
    fn from(val: VariableType) -> Self {
        Self(1 << val as u8)
    }
}

impl FromIterator<VariableType> for VariableTypes {
    fn from_iter<T: IntoIterator<Item = VariableType>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::empty(), |acc, ty| acc.union(ty.into()))
    }
}

/// Gives a shader variable a non-default variable type.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShaderVariableDesc {
    /// The name of the variable, as declared in the shader.
    pub name: String,

    /// The variable type to give the variable.
    pub variable_type: VariableType,
}

impl ShaderVariableDesc {
    #[inline]
    pub fn new(name: impl Into<String>, variable_type: VariableType) -> Self {
        Self {
            name: name.into(),
            variable_type,
        }
    }
}

/// Bakes a sampler into the layout of a combined image sampler or separate sampler.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ImmutableSamplerDesc {
    /// The name of the sampler or texture the sampler is for.
    ///
    /// With combined sampler emulation, this may also be the name of the texture a separate
    /// sampler is assigned to.
    pub name: String,

    /// The sampler to create.
    pub sampler: SamplerDesc,
}

impl ImmutableSamplerDesc {
    #[inline]
    pub fn new(name: impl Into<String>, sampler: SamplerDesc) -> Self {
        Self {
            name: name.into(),
            sampler,
        }
    }
}

/// Describes how the resources of a shader should be laid out.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShaderDesc {
    /// A name used in diagnostics.
    ///
    /// The default value is empty.
    pub name: String,

    /// The stage the shader is for.
    ///
    /// The default value is [`ShaderStage::Vertex`].
    pub stage: ShaderStage,

    /// The variable type of resources that are not listed in `variables`.
    ///
    /// The default value is [`VariableType::Static`].
    pub default_variable_type: VariableType,

    /// Variables with a non-default variable type.
    ///
    /// The default value is empty.
    pub variables: Vec<ShaderVariableDesc>,

    /// Immutable samplers.
    ///
    /// The default value is empty.
    pub immutable_samplers: Vec<ImmutableSamplerDesc>,

    /// If set, enables combined sampler emulation with the given suffix.
    ///
    /// The default value is `None`.
    pub combined_sampler_suffix: Option<String>,

    #[cfg_attr(feature = "serde", serde(skip, default = "NonExhaustive::new"))]
    pub _ne: NonExhaustive,
}

impl Default for ShaderDesc {
    #[inline]
    fn default() -> Self {
        Self {
            name: String::new(),
            stage: ShaderStage::Vertex,
            default_variable_type: VariableType::Static,
            variables: Vec::new(),
            immutable_samplers: Vec::new(),
            combined_sampler_suffix: None,
            _ne: NonExhaustive(()),
        }
    }
}

impl ShaderDesc {
    /// Returns the combined sampler suffix, if combined sampler emulation is enabled.
    #[inline]
    pub fn combined_sampler_suffix(&self) -> Option<&str> {
        self.combined_sampler_suffix
            .as_deref()
            .filter(|suffix| !suffix.is_empty())
    }

    /// Returns the variable type of the resource named `name`.
    ///
    /// With combined sampler emulation, a separate sampler takes the variable type of the
    /// texture it is assigned to.
    pub fn find_variable_type(&self, name: &str, is_separate_sampler: bool) -> VariableType {
        let name = match self.combined_sampler_suffix() {
            Some(suffix) if is_separate_sampler => name.strip_suffix(suffix).unwrap_or(name),
            _ => name,
        };

        self.variables
            .iter()
            .find(|variable| variable.name == name)
            .map_or(self.default_variable_type, |variable| {
                variable.variable_type
            })
    }

    /// Returns the index of the immutable sampler for the resource named `name`.
    ///
    /// A combined image sampler only matches by its own name. A separate sampler also matches
    /// the name of its texture when combined sampler emulation is enabled.
    pub fn find_immutable_sampler(&self, name: &str, is_separate_sampler: bool) -> Option<usize> {
        let suffix = self.combined_sampler_suffix().filter(|_| is_separate_sampler);

        self.immutable_samplers.iter().position(|sampler| {
            name == sampler.name
                || suffix.is_some_and(|suffix| {
                    name.strip_suffix(suffix) == Some(sampler.name.as_str())
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ImmutableSamplerDesc, ShaderDesc, ShaderStage, ShaderStages, ShaderVariableDesc,
        VariableType, VariableTypes,
    };
    use crate::sampler::SamplerDesc;

    #[test]
    fn stage_flags() {
        let stages = ShaderStages::from(ShaderStage::Vertex) | ShaderStage::Fragment.into();
        assert!(stages.contains(ShaderStages::VERTEX));
        assert!(stages.contains(ShaderStages::FRAGMENT));
        assert!(!stages.intersects(ShaderStages::COMPUTE));
        assert_eq!(stages.count(), 2);
        assert!(ShaderStages::all_graphics().contains(stages));
        assert_eq!(
            ash::vk::ShaderStageFlags::from(stages),
            ash::vk::ShaderStageFlags::VERTEX | ash::vk::ShaderStageFlags::FRAGMENT,
        );
        assert_eq!(
            ShaderStage::try_from(ash::vk::ShaderStageFlags::COMPUTE),
            Ok(ShaderStage::Compute),
        );
    }

    #[test]
    fn variable_types() {
        let types: VariableTypes = [VariableType::Mutable, VariableType::Dynamic]
            .into_iter()
            .collect();
        assert!(!types.contains_type(VariableType::Static));
        assert!(types.contains_type(VariableType::Mutable));
        assert!(VariableTypes::all().contains_type(VariableType::Static));
    }

    #[test]
    fn suffix_lookups() {
        let desc = ShaderDesc {
            default_variable_type: VariableType::Static,
            variables: vec![ShaderVariableDesc::new("g_Texture", VariableType::Dynamic)],
            immutable_samplers: vec![ImmutableSamplerDesc::new(
                "g_Texture",
                SamplerDesc::default(),
            )],
            combined_sampler_suffix: Some("_sampler".to_owned()),
            ..Default::default()
        };

        assert_eq!(
            desc.find_variable_type("g_Texture", false),
            VariableType::Dynamic,
        );
        assert_eq!(
            desc.find_variable_type("g_Texture_sampler", true),
            VariableType::Dynamic,
        );
        assert_eq!(
            desc.find_variable_type("g_Texture_sampler", false),
            VariableType::Static,
        );

        assert_eq!(desc.find_immutable_sampler("g_Texture_sampler", true), Some(0));
        assert_eq!(desc.find_immutable_sampler("g_Texture", false), Some(0));
        assert_eq!(desc.find_immutable_sampler("g_Texture_sampler", false), None);

        let no_suffix = ShaderDesc {
            combined_sampler_suffix: None,
            ..desc
        };
        assert_eq!(no_suffix.find_immutable_sampler("g_Texture_sampler", true), None);
    }
}
