// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Immutable samplers.
//!
//! Samplers that are declared in a [`ShaderDesc`](crate::shader::ShaderDesc) are created when the
//! resource catalog of the shader is built, and are baked into the descriptor set layouts of every
//! pipeline that uses the shader. They are created through a [`SamplerCache`], so that shaders
//! declaring the same sampler share one native object.

use crate::{
    device::LayoutDevice,
    macros::{impl_id_counter, vulkan_enum},
    NonExhaustive, Validated, ValidationError, VulkanError, VulkanObject,
};
use foldhash::HashMap;
use parking_lot::RwLock;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Error as FmtError, Formatter},
    hash::{Hash, Hasher},
    num::NonZero,
    ops::RangeInclusive,
    sync::Arc,
};

vulkan_enum! {
    /// Describes how the color of each pixel should be determined.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    Filter = Filter(i32);

    /// The pixel whose center is nearest to the requested coordinates is taken from the source
    /// and its value is returned as-is.
    Nearest = NEAREST,

    /// The 8/4/2 pixels (depending on view dimensionality) whose center surround the requested
    /// coordinates are taken, then their values are interpolated.
    Linear = LINEAR,
}

vulkan_enum! {
    /// Describes which mipmap from the source to use.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    SamplerMipmapMode = SamplerMipmapMode(i32);

    /// Use the mipmap whose dimensions are the nearest to the dimensions of the destination.
    Nearest = NEAREST,

    /// Take the two mipmaps whose dimensions are immediately inferior and superior to the
    /// dimensions of the destination, calculate the value for both, and interpolate them.
    Linear = LINEAR,
}

vulkan_enum! {
    /// How the sampler should behave when it needs to access a pixel that is out of range of the
    /// texture.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    SamplerAddressMode = SamplerAddressMode(i32);

    /// Repeat the texture.
    Repeat = REPEAT,

    /// Repeat the texture but mirror it at every repetition.
    MirroredRepeat = MIRRORED_REPEAT,

    /// The coordinates are clamped to the valid range.
    ClampToEdge = CLAMP_TO_EDGE,

    /// Any pixel out of range is colored using the border color.
    ClampToBorder = CLAMP_TO_BORDER,

    /// Similar to `MirroredRepeat`, except that coordinates are clamped to the range
    /// `[-1.0, 1.0]`.
    MirrorClampToEdge = MIRROR_CLAMP_TO_EDGE,
}

vulkan_enum! {
    /// The color to use for the border of an image.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    BorderColor = BorderColor(i32);

    FloatTransparentBlack = FLOAT_TRANSPARENT_BLACK,
    IntTransparentBlack = INT_TRANSPARENT_BLACK,
    FloatOpaqueBlack = FLOAT_OPAQUE_BLACK,
    IntOpaqueBlack = INT_OPAQUE_BLACK,
    FloatOpaqueWhite = FLOAT_OPAQUE_WHITE,
    IntOpaqueWhite = INT_OPAQUE_WHITE,
}

vulkan_enum! {
    /// Specifies how two values should be compared to decide whether a test passes or fails.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    CompareOp = CompareOp(i32);

    Never = NEVER,
    Less = LESS,
    Equal = EQUAL,
    LessOrEqual = LESS_OR_EQUAL,
    Greater = GREATER,
    NotEqual = NOT_EQUAL,
    GreaterOrEqual = GREATER_OR_EQUAL,
    Always = ALWAYS,
}

/// Describes a sampler.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SamplerDesc {
    /// How the sampled value of a single mipmap should be calculated,
    /// when magnification is applied (LOD <= 0.0).
    ///
    /// The default value is [`Nearest`](Filter::Nearest).
    pub mag_filter: Filter,

    /// How the sampled value of a single mipmap should be calculated,
    /// when minification is applied (LOD > 0.0).
    ///
    /// The default value is [`Nearest`](Filter::Nearest).
    pub min_filter: Filter,

    /// How the final sampled value should be calculated from the samples of individual
    /// mipmaps.
    ///
    /// The default value is [`Nearest`](SamplerMipmapMode::Nearest).
    pub mipmap_mode: SamplerMipmapMode,

    /// How out-of-range texture coordinates should be treated, for the `u`, `v` and `w` texture
    /// coordinate indices respectively.
    ///
    /// The default value is [`ClampToEdge`](SamplerAddressMode::ClampToEdge).
    pub address_mode: [SamplerAddressMode; 3],

    /// The bias value to be added to the base LOD before clamping.
    ///
    /// The default value is `0.0`.
    pub mip_lod_bias: f32,

    /// Whether anisotropic texel filtering is enabled (`Some`), and the maximum anisotropy value
    /// to use if it is enabled.
    ///
    /// The value must be at least `1.0`.
    ///
    /// The default value is `None`.
    pub anisotropy: Option<f32>,

    /// Whether depth comparison is enabled (`Some`), and the comparison operator to use if it is
    /// enabled.
    ///
    /// The default value is `None`.
    pub compare: Option<CompareOp>,

    /// The range that LOD values must be clamped to.
    ///
    /// The default value is `0.0..=0.0`.
    pub lod: RangeInclusive<f32>,

    /// The border color to use if `address_mode` is set to
    /// [`ClampToBorder`](SamplerAddressMode::ClampToBorder).
    ///
    /// The default value is [`FloatTransparentBlack`](BorderColor::FloatTransparentBlack).
    pub border_color: BorderColor,

    #[cfg_attr(feature = "serde", serde(skip, default = "NonExhaustive::new"))]
    pub _ne: NonExhaustive,
}

impl Default for SamplerDesc {
    #[inline]
    fn default() -> Self {
        Self {
            mag_filter: Filter::Nearest,
            min_filter: Filter::Nearest,
            mipmap_mode: SamplerMipmapMode::Nearest,
            address_mode: [SamplerAddressMode::ClampToEdge; 3],
            mip_lod_bias: 0.0,
            anisotropy: None,
            compare: None,
            lod: 0.0..=0.0,
            border_color: BorderColor::FloatTransparentBlack,
            _ne: NonExhaustive(()),
        }
    }
}

impl SamplerDesc {
    /// Shortcut for creating a sampler with linear sampling, linear mipmaps, and with the
    /// repeat mode for borders.
    #[inline]
    pub fn simple_repeat_linear() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_mode: SamplerMipmapMode::Linear,
            address_mode: [SamplerAddressMode::Repeat; 3],
            lod: 0.0..=ash::vk::LOD_CLAMP_NONE,
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        if !self.mip_lod_bias.is_finite() {
            return Err(Box::new(ValidationError {
                context: "mip_lod_bias".into(),
                problem: "is not finite".into(),
            }));
        }

        if let Some(max_anisotropy) = self.anisotropy {
            if !(max_anisotropy >= 1.0) {
                return Err(Box::new(ValidationError {
                    context: "anisotropy".into(),
                    problem: "is `Some(max_anisotropy)`, but `max_anisotropy` is less than 1.0"
                        .into(),
                }));
            }
        }

        if !(self.lod.start() <= self.lod.end()) {
            return Err(Box::new(ValidationError {
                context: "lod".into(),
                problem: "the start of the range is greater than the end".into(),
            }));
        }

        Ok(())
    }

    pub(crate) fn to_vk(&self) -> ash::vk::SamplerCreateInfo<'static> {
        let (anisotropy_enable, max_anisotropy) = match self.anisotropy {
            Some(max_anisotropy) => (true, max_anisotropy),
            None => (false, 1.0),
        };
        let (compare_enable, compare_op) = match self.compare {
            Some(compare_op) => (true, compare_op.into()),
            None => (false, ash::vk::CompareOp::NEVER),
        };

        ash::vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter.into())
            .min_filter(self.min_filter.into())
            .mipmap_mode(self.mipmap_mode.into())
            .address_mode_u(self.address_mode[0].into())
            .address_mode_v(self.address_mode[1].into())
            .address_mode_w(self.address_mode[2].into())
            .mip_lod_bias(self.mip_lod_bias)
            .anisotropy_enable(anisotropy_enable)
            .max_anisotropy(max_anisotropy)
            .compare_enable(compare_enable)
            .compare_op(compare_op)
            .min_lod(*self.lod.start())
            .max_lod(*self.lod.end())
            .border_color(self.border_color.into())
    }

    fn key(&self) -> impl PartialEq + Hash {
        (
            self.mag_filter,
            self.min_filter,
            self.mipmap_mode,
            self.address_mode,
            self.mip_lod_bias.to_bits(),
            self.anisotropy.map(f32::to_bits),
            self.compare,
            self.lod.start().to_bits(),
            self.lod.end().to_bits(),
            self.border_color,
        )
    }
}

impl PartialEq for SamplerDesc {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SamplerDesc {}

impl Hash for SamplerDesc {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// A native sampler object. It is destroyed when dropped.
pub struct Sampler {
    handle: ash::vk::Sampler,
    device: Arc<dyn LayoutDevice>,
    id: NonZero<u64>,

    desc: SamplerDesc,
}

impl Sampler {
    /// Creates a new `Sampler`.
    pub fn new(
        device: Arc<dyn LayoutDevice>,
        desc: SamplerDesc,
    ) -> Result<Arc<Sampler>, Validated<VulkanError>> {
        desc.validate().map_err(|err| err.add_context("desc"))?;

        let handle = device.create_sampler(&desc.to_vk())?;
        log::debug!("created sampler {:?}", handle);

        Ok(Arc::new(Sampler {
            handle,
            device,
            id: Self::next_id(),
            desc,
        }))
    }

    /// Returns the description the sampler was created with.
    #[inline]
    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        log::debug!("destroying sampler {:?}", self.handle);
        unsafe { self.device.destroy_sampler(self.handle) };
    }
}

unsafe impl VulkanObject for Sampler {
    type Handle = ash::vk::Sampler;

    #[inline]
    fn handle(&self) -> Self::Handle {
        self.handle
    }
}

impl Debug for Sampler {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("Sampler")
            .field("handle", &self.handle)
            .field("id", &self.id)
            .field("desc", &self.desc)
            .finish_non_exhaustive()
    }
}

impl_id_counter!(Sampler);

/// Creates samplers, and returns the existing sampler when one with the same description was
/// created before.
///
/// Readers never block each other, except when an entry is vacant. In that case it gets written
/// to once and then never again, entries are immutable after insertion.
pub struct SamplerCache {
    device: Arc<dyn LayoutDevice>,
    samplers: RwLock<HashMap<SamplerDesc, Arc<Sampler>>>,
}

impl SamplerCache {
    /// Creates an empty `SamplerCache`.
    pub fn new(device: Arc<dyn LayoutDevice>) -> Self {
        SamplerCache {
            device,
            samplers: RwLock::new(HashMap::default()),
        }
    }

    /// Returns the device samplers are created with.
    #[inline]
    pub fn device(&self) -> &Arc<dyn LayoutDevice> {
        &self.device
    }

    /// Returns the sampler for `desc`, if it has been created.
    pub fn get(&self, desc: &SamplerDesc) -> Option<Arc<Sampler>> {
        self.samplers.read().get(desc).cloned()
    }

    /// Returns the sampler for `desc`, creating it if it doesn't exist. If creation fails, the
    /// error is propagated and the entry isn't written to.
    pub fn get_or_create(&self, desc: &SamplerDesc) -> Result<Arc<Sampler>, Validated<VulkanError>> {
        if let Some(sampler) = self.get(desc) {
            return Ok(sampler);
        }

        let sampler = Sampler::new(self.device.clone(), desc.clone())?;

        Ok(self
            .samplers
            .write()
            .entry(desc.clone())
            .or_insert(sampler)
            .clone())
    }

    /// Returns the number of samplers in the cache.
    pub fn len(&self) -> usize {
        self.samplers.read().len()
    }
}

impl Debug for SamplerCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.debug_struct("SamplerCache")
            .field("samplers", &*self.samplers.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{Filter, SamplerCache, SamplerDesc};
    use crate::{device::LayoutDevice, tests::MockDevice, Validated};
    use std::sync::Arc;

    #[test]
    fn cache_shares_samplers() {
        let mock = Arc::new(MockDevice::default());
        let cache = SamplerCache::new(mock.clone() as Arc<dyn LayoutDevice>);

        let linear = SamplerDesc::simple_repeat_linear();
        let a = cache.get_or_create(&linear).unwrap();
        let b = cache.get_or_create(&linear.clone()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let nearest = cache.get_or_create(&SamplerDesc::default()).unwrap();
        assert!(!Arc::ptr_eq(&a, &nearest));
        assert_eq!(cache.len(), 2);
        assert_eq!(mock.live_samplers(), 2);

        drop((a, b, nearest));
        drop(cache);
        assert_eq!(mock.live_samplers(), 0);
    }

    #[test]
    fn invalid_desc() {
        let mock = Arc::new(MockDevice::default());
        let cache = SamplerCache::new(mock.clone() as Arc<dyn LayoutDevice>);

        let desc = SamplerDesc {
            mag_filter: Filter::Linear,
            anisotropy: Some(0.5),
            ..Default::default()
        };

        match cache.get_or_create(&desc) {
            Err(Validated::ValidationError(err)) => assert_eq!(err.context, "desc.anisotropy"),
            _ => panic!(),
        }
        assert_eq!(cache.len(), 0);
        assert_eq!(mock.live_samplers(), 0);
    }
}
