// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Extraction of the resource variables and stage inputs of a SPIR-V module.

use super::{
    resources::ResourceKind,
    spirv::{Decoration, Dim, Id, Instruction, Spirv, StorageClass, DECORATION_USER_SEMANTIC},
    ShaderStage,
};
use crate::ValidationError;

/// A resource variable, as declared in the module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ReflectedResource {
    pub(crate) name: String,
    pub(crate) kind: ResourceKind,
    pub(crate) array_size: u16,
    pub(crate) binding: u32,
    pub(crate) descriptor_set: u32,
    pub(crate) binding_offset: usize,
    pub(crate) descriptor_set_offset: usize,
}

/// An input variable of a vertex shader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ReflectedStageInput {
    pub(crate) semantic: String,
    pub(crate) location: u32,
    pub(crate) location_offset: usize,
}

/// The resources of a module, grouped by kind. Within each kind, resources are in the order
/// their variables are declared.
#[derive(Clone, Debug, Default)]
pub(crate) struct Reflection {
    pub(crate) resources: [Vec<ReflectedResource>; ResourceKind::COUNT],
    pub(crate) stage_inputs: Vec<ReflectedStageInput>,
}

impl Reflection {
    pub(crate) fn of_kind(&self, kind: ResourceKind) -> &[ReflectedResource] {
        &self.resources[kind as usize]
    }
}

/// Returns the resources of `spirv`.
pub(crate) fn reflect(spirv: &Spirv, stage: ShaderStage) -> Result<Reflection, Box<ValidationError>> {
    let mut reflection = Reflection::default();

    for inst in spirv.instructions() {
        let (result_type_id, result_id, storage_class) = match inst.instruction {
            Instruction::Variable {
                result_type_id,
                result_id,
                storage_class,
            } => (result_type_id, result_id, storage_class),
            _ => continue,
        };

        if storage_class == StorageClass::Input {
            if stage == ShaderStage::Vertex {
                if let Some(input) = stage_input(spirv, result_id) {
                    reflection.stage_inputs.push(input);
                }
            }

            continue;
        }

        let pointed_ty = match pointer_target(spirv, result_type_id) {
            Some(ty) => ty,
            None => continue,
        };

        if let Some(resource) = resource_of(spirv, result_id, pointed_ty, storage_class)
            .map_err(|err| err.add_context(variable_name(spirv, result_id, pointed_ty)))?
        {
            reflection.resources[resource.kind as usize].push(resource);
        }
    }

    Ok(reflection)
}

fn resource_of(
    spirv: &Spirv,
    variable_id: Id,
    pointed_ty: Id,
    storage_class: StorageClass,
) -> Result<Option<ReflectedResource>, Box<ValidationError>> {
    if !matches!(
        storage_class,
        StorageClass::UniformConstant
            | StorageClass::Uniform
            | StorageClass::StorageBuffer
            | StorageClass::AtomicCounter
    ) {
        return Ok(None);
    }

    let (element_ty, array_size) = array_of(spirv, pointed_ty)?;

    let kind = match storage_class {
        StorageClass::AtomicCounter => ResourceKind::AtomicCounter,
        StorageClass::StorageBuffer => ResourceKind::StorageBuffer,
        StorageClass::Uniform => {
            let is_buffer_block = spirv.iter_decoration(element_ty).any(|info| {
                matches!(info.decoration, Decoration::BufferBlock)
            });

            if is_buffer_block {
                ResourceKind::StorageBuffer
            } else {
                ResourceKind::UniformBuffer
            }
        }
        StorageClass::UniformConstant => match spirv.id(element_ty).map(|info| info.instruction()) {
            Some(&Instruction::TypeImage { dim, sampled, .. }) => match (dim, sampled) {
                (Dim::SubpassData, _) => {
                    return Err(Box::new(ValidationError {
                        problem: "input attachments are not supported".into(),
                        ..Default::default()
                    }));
                }
                (Dim::Buffer, 2) => ResourceKind::StorageTexelBuffer,
                (Dim::Buffer, _) => ResourceKind::UniformTexelBuffer,
                (_, 2) => ResourceKind::StorageImage,
                (_, _) => ResourceKind::SeparateImage,
            },
            Some(&Instruction::TypeSampledImage { image_type, .. }) => {
                match spirv.id(image_type).map(|info| info.instruction()) {
                    Some(&Instruction::TypeImage {
                        dim: Dim::Buffer, ..
                    }) => ResourceKind::UniformTexelBuffer,
                    Some(Instruction::TypeImage { .. }) => ResourceKind::SampledImage,
                    _ => {
                        return Err(Box::new(ValidationError {
                            problem: "the image type of the sampled image type is not an image \
                                type"
                                .into(),
                            ..Default::default()
                        }));
                    }
                }
            }
            Some(Instruction::TypeSampler { .. }) => ResourceKind::SeparateSampler,
            _ => {
                return Err(Box::new(ValidationError {
                    problem: "the resource type is not supported".into(),
                    ..Default::default()
                }));
            }
        },
        _ => unreachable!(),
    };

    let mut binding = None;
    let mut descriptor_set = None;

    for info in spirv.iter_decoration(variable_id) {
        match info.decoration {
            Decoration::Binding { binding_point } => {
                binding = Some((binding_point, info.operand_offset));
            }
            Decoration::DescriptorSet { descriptor_set: set } => {
                descriptor_set = Some((set, info.operand_offset));
            }
            _ => (),
        }
    }

    let (binding, binding_offset) = binding.ok_or_else(|| {
        Box::new(ValidationError {
            problem: "the variable has no `Binding` decoration".into(),
            ..Default::default()
        })
    })?;
    let (descriptor_set, descriptor_set_offset) = descriptor_set.ok_or_else(|| {
        Box::new(ValidationError {
            problem: "the variable has no `DescriptorSet` decoration".into(),
            ..Default::default()
        })
    })?;

    let name = variable_name(spirv, variable_id, pointed_ty);

    if name.is_empty() {
        return Err(Box::new(ValidationError {
            problem: "neither the variable nor its type has a name".into(),
            ..Default::default()
        }));
    }

    Ok(Some(ReflectedResource {
        name,
        kind,
        array_size,
        binding,
        descriptor_set,
        binding_offset,
        descriptor_set_offset,
    }))
}

/// Strips one level of array from `ty`, returning the element type and the length.
fn array_of(spirv: &Spirv, ty: Id) -> Result<(Id, u16), Box<ValidationError>> {
    let (element_type, length) = match spirv.id(ty).map(|info| info.instruction()) {
        Some(&Instruction::TypeArray {
            element_type,
            length,
            ..
        }) => (element_type, length),
        Some(Instruction::TypeRuntimeArray { .. }) => {
            return Err(Box::new(ValidationError {
                problem: "runtime-sized arrays of resources are not supported".into(),
                ..Default::default()
            }));
        }
        _ => return Ok((ty, 1)),
    };

    if matches!(
        spirv.id(element_type).map(|info| info.instruction()),
        Some(Instruction::TypeArray { .. } | Instruction::TypeRuntimeArray { .. }),
    ) {
        return Err(Box::new(ValidationError {
            problem: "multi-dimensional arrays of resources are not supported".into(),
            ..Default::default()
        }));
    }

    let length = match spirv.id(length).map(|info| info.instruction()) {
        Some(Instruction::Constant { value, .. }) => {
            // Only the low word matters, larger values are rejected below anyway.
            if value.iter().skip(1).any(|&word| word != 0) {
                u32::MAX
            } else {
                value.first().copied().unwrap_or(0)
            }
        }
        _ => {
            return Err(Box::new(ValidationError {
                problem: "the length of the array is not a constant".into(),
                ..Default::default()
            }));
        }
    };

    match u16::try_from(length) {
        Ok(length) if length > 0 => Ok((element_type, length)),
        _ => Err(Box::new(ValidationError {
            problem: format!(
                "the array length {} is not in the range [1, {}]",
                length,
                u16::MAX,
            )
            .into(),
            ..Default::default()
        })),
    }
}

fn pointer_target(spirv: &Spirv, pointer_ty: Id) -> Option<Id> {
    match spirv.id(pointer_ty)?.instruction() {
        &Instruction::TypePointer { ty, .. } => Some(ty),
        _ => None,
    }
}

/// Returns the name of a variable, or the name of the (element) type it points to if the
/// variable itself is unnamed.
fn variable_name(spirv: &Spirv, variable_id: Id, pointed_ty: Id) -> String {
    if let Some(name) = spirv.name(variable_id).filter(|name| !name.is_empty()) {
        return name.to_owned();
    }

    let element_ty = match spirv.id(pointed_ty).map(|info| info.instruction()) {
        Some(&Instruction::TypeArray { element_type, .. }) => element_type,
        _ => pointed_ty,
    };

    spirv.name(element_ty).unwrap_or_default().to_owned()
}

fn stage_input(spirv: &Spirv, variable_id: Id) -> Option<ReflectedStageInput> {
    let mut location = None;

    for info in spirv.iter_decoration(variable_id) {
        match info.decoration {
            Decoration::BuiltIn { .. } => return None,
            Decoration::Location { location: l } => location = Some((l, info.operand_offset)),
            _ => (),
        }
    }

    let (location, location_offset) = location?;
    let semantic = spirv
        .decoration_string(variable_id, DECORATION_USER_SEMANTIC)
        .or_else(|| spirv.name(variable_id))
        .unwrap_or_default()
        .to_owned();

    Some(ReflectedStageInput {
        semantic,
        location,
        location_offset,
    })
}

#[cfg(test)]
mod tests {
    use super::reflect;
    use crate::{
        shader::{resources::ResourceKind, spirv::Spirv, ShaderStage},
        tests::SpirvBuilder,
    };

    #[test]
    fn kinds_from_types() {
        let mut builder = SpirvBuilder::new();
        builder.uniform_buffer("g_Constants", 0, 0);
        builder.storage_buffer("g_Particles", 0, 1);
        builder.buffer_block("g_Legacy", 0, 2);
        builder.uniform_texel_buffer("g_Texels", 0, 3);
        builder.sampled_texel_buffer("g_SampledTexels", 0, 4);
        builder.storage_texel_buffer("g_RWTexels", 0, 5);
        builder.storage_image("g_RWImage", 0, 6);
        builder.sampled_image("g_Combined", 0, 7);
        builder.atomic_counter("g_Counter", 0, 8);
        builder.separate_image("g_Texture", 1, 0);
        builder.sampler("g_Sampler");
        let words = builder.into_words();

        let spirv = Spirv::new(&words).unwrap();
        let reflection = reflect(&spirv, ShaderStage::Fragment).unwrap();

        let names = |kind| -> Vec<&str> {
            reflection
                .of_kind(kind)
                .iter()
                .map(|res| res.name.as_str())
                .collect()
        };

        assert_eq!(names(ResourceKind::UniformBuffer), ["g_Constants"]);
        assert_eq!(names(ResourceKind::StorageBuffer), ["g_Particles", "g_Legacy"]);
        assert_eq!(
            names(ResourceKind::UniformTexelBuffer),
            ["g_Texels", "g_SampledTexels"],
        );
        assert_eq!(names(ResourceKind::StorageTexelBuffer), ["g_RWTexels"]);
        assert_eq!(names(ResourceKind::StorageImage), ["g_RWImage"]);
        assert_eq!(names(ResourceKind::SampledImage), ["g_Combined"]);
        assert_eq!(names(ResourceKind::AtomicCounter), ["g_Counter"]);
        assert_eq!(names(ResourceKind::SeparateImage), ["g_Texture"]);
        assert_eq!(names(ResourceKind::SeparateSampler), ["g_Sampler"]);

        let texture = &reflection.of_kind(ResourceKind::SeparateImage)[0];
        assert_eq!(texture.descriptor_set, 1);
        assert_eq!(words[texture.descriptor_set_offset], 1);
        assert_eq!(words[texture.binding_offset], texture.binding);
    }

    #[test]
    fn arrays() {
        let mut builder = SpirvBuilder::new();
        builder.separate_image_array("g_Textures", 8);
        let words = builder.into_words();

        let spirv = Spirv::new(&words).unwrap();
        let reflection = reflect(&spirv, ShaderStage::Fragment).unwrap();
        assert_eq!(reflection.of_kind(ResourceKind::SeparateImage)[0].array_size, 8);
    }

    #[test]
    fn multi_dimensional_array() {
        let mut builder = SpirvBuilder::new();
        builder.separate_image_array_2d("g_Grid", 2, 2);
        let words = builder.into_words();

        let spirv = Spirv::new(&words).unwrap();
        let err = reflect(&spirv, ShaderStage::Fragment).unwrap_err();
        assert_eq!(err.context, "g_Grid");
        assert!(err.problem.contains("multi-dimensional"));
    }

    #[test]
    fn unnamed_block_uses_type_name() {
        let mut builder = SpirvBuilder::new();
        builder.unnamed_uniform_buffer("Globals");
        let words = builder.into_words();

        let spirv = Spirv::new(&words).unwrap();
        let reflection = reflect(&spirv, ShaderStage::Vertex).unwrap();
        assert_eq!(reflection.of_kind(ResourceKind::UniformBuffer)[0].name, "Globals");
    }

    #[test]
    fn vertex_inputs() {
        let mut builder = SpirvBuilder::new();
        builder.input("in_Position", 0, Some("ATTRIB0"));
        builder.input("in_Normal", 1, None);
        builder.builtin_input("gl_VertexIndex");
        let words = builder.into_words();

        let spirv = Spirv::new(&words).unwrap();
        let reflection = reflect(&spirv, ShaderStage::Vertex).unwrap();
        let semantics: Vec<_> = reflection
            .stage_inputs
            .iter()
            .map(|input| (input.semantic.as_str(), input.location))
            .collect();
        assert_eq!(semantics, [("ATTRIB0", 0), ("in_Normal", 1)]);

        let reflection = reflect(&spirv, ShaderStage::Fragment).unwrap();
        assert!(reflection.stage_inputs.is_empty());
    }
}
