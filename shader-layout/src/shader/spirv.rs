// Copyright (c) 2024 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! Parsing of SPIR-V modules.
//!
//! Only the instructions that describe resource variables are decoded: names, decorations,
//! image, sampler, array, struct and pointer types, constants and variables. Every other
//! instruction is kept as [`Instruction::Unknown`] so that word offsets stay exact.

use foldhash::HashMap;
use std::{
    error::Error,
    fmt::{Display, Error as FmtError, Formatter},
};

const MAGIC: u32 = 0x0723_0203;
const HEADER_WORDS: usize = 5;

/// A result ID of a SPIR-V module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(u32);

impl Id {
    /// Returns the numeric value of the ID.
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl From<Id> for u32 {
    #[inline]
    fn from(id: Id) -> u32 {
        id.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "%{}", self.0)
    }
}

/// A storage class of a pointer type or variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageClass {
    UniformConstant,
    Input,
    Uniform,
    Output,
    PushConstant,
    AtomicCounter,
    StorageBuffer,
    Other(u32),
}

impl From<u32> for StorageClass {
    fn from(val: u32) -> Self {
        match val {
            0 => Self::UniformConstant,
            1 => Self::Input,
            2 => Self::Uniform,
            3 => Self::Output,
            9 => Self::PushConstant,
            10 => Self::AtomicCounter,
            12 => Self::StorageBuffer,
            _ => Self::Other(val),
        }
    }
}

/// The dimensionality of an image type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dim {
    Dim1D,
    Dim2D,
    Dim3D,
    Cube,
    Rect,
    Buffer,
    SubpassData,
    Other(u32),
}

impl From<u32> for Dim {
    fn from(val: u32) -> Self {
        match val {
            0 => Self::Dim1D,
            1 => Self::Dim2D,
            2 => Self::Dim3D,
            3 => Self::Cube,
            4 => Self::Rect,
            5 => Self::Buffer,
            6 => Self::SubpassData,
            _ => Self::Other(val),
        }
    }
}

/// A decoration applied with `OpDecorate`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoration {
    Block,
    BufferBlock,
    BuiltIn { built_in: u32 },
    Location { location: u32 },
    Binding { binding_point: u32 },
    DescriptorSet { descriptor_set: u32 },
    Other { decoration: u32, operands: Vec<u32> },
}

impl Decoration {
    fn parse(decoration: u32, operands: &[u32]) -> Self {
        let first = operands.first().copied();

        match (decoration, first) {
            (2, _) => Self::Block,
            (3, _) => Self::BufferBlock,
            (11, Some(built_in)) => Self::BuiltIn { built_in },
            (30, Some(location)) => Self::Location { location },
            (33, Some(binding_point)) => Self::Binding { binding_point },
            (34, Some(descriptor_set)) => Self::DescriptorSet { descriptor_set },
            _ => Self::Other {
                decoration,
                operands: operands.to_vec(),
            },
        }
    }
}

/// The `HlslSemanticGOOGLE`/`UserSemantic` decoration.
pub const DECORATION_USER_SEMANTIC: u32 = 5635;

/// A decoded instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    EntryPoint {
        execution_model: u32,
        entry_point: Id,
        name: String,
        interface: Vec<Id>,
    },
    Name {
        target: Id,
        name: String,
    },
    Decorate {
        target: Id,
        decoration: Decoration,
    },
    DecorateString {
        target: Id,
        decoration: u32,
        strings: Vec<String>,
    },
    TypeInt {
        result_id: Id,
        width: u32,
        signedness: u32,
    },
    TypeFloat {
        result_id: Id,
        width: u32,
    },
    TypeImage {
        result_id: Id,
        sampled_type: Id,
        dim: Dim,
        depth: u32,
        arrayed: u32,
        ms: u32,
        sampled: u32,
        image_format: u32,
    },
    TypeSampler {
        result_id: Id,
    },
    TypeSampledImage {
        result_id: Id,
        image_type: Id,
    },
    TypeArray {
        result_id: Id,
        element_type: Id,
        length: Id,
    },
    TypeRuntimeArray {
        result_id: Id,
        element_type: Id,
    },
    TypeStruct {
        result_id: Id,
        member_types: Vec<Id>,
    },
    TypePointer {
        result_id: Id,
        storage_class: StorageClass,
        ty: Id,
    },
    Constant {
        result_type_id: Id,
        result_id: Id,
        value: Vec<u32>,
    },
    Variable {
        result_type_id: Id,
        result_id: Id,
        storage_class: StorageClass,
    },
    Unknown {
        opcode: u16,
    },
}

impl Instruction {
    fn parse(opcode: u16, operands: &[u32]) -> Result<Self, ParseError> {
        let mut reader = OperandReader { operands, pos: 0 };

        let instruction = match opcode {
            5 => Self::Name {
                target: reader.id()?,
                name: reader.string()?,
            },
            15 => Self::EntryPoint {
                execution_model: reader.word()?,
                entry_point: reader.id()?,
                name: reader.string()?,
                interface: reader.remainder().iter().copied().map(Id).collect(),
            },
            21 => Self::TypeInt {
                result_id: reader.id()?,
                width: reader.word()?,
                signedness: reader.word()?,
            },
            22 => Self::TypeFloat {
                result_id: reader.id()?,
                width: reader.word()?,
            },
            25 => Self::TypeImage {
                result_id: reader.id()?,
                sampled_type: reader.id()?,
                dim: reader.word()?.into(),
                depth: reader.word()?,
                arrayed: reader.word()?,
                ms: reader.word()?,
                sampled: reader.word()?,
                image_format: reader.word()?,
            },
            26 => Self::TypeSampler {
                result_id: reader.id()?,
            },
            27 => Self::TypeSampledImage {
                result_id: reader.id()?,
                image_type: reader.id()?,
            },
            28 => Self::TypeArray {
                result_id: reader.id()?,
                element_type: reader.id()?,
                length: reader.id()?,
            },
            29 => Self::TypeRuntimeArray {
                result_id: reader.id()?,
                element_type: reader.id()?,
            },
            30 => Self::TypeStruct {
                result_id: reader.id()?,
                member_types: reader.remainder().iter().copied().map(Id).collect(),
            },
            32 => Self::TypePointer {
                result_id: reader.id()?,
                storage_class: reader.word()?.into(),
                ty: reader.id()?,
            },
            43 => Self::Constant {
                result_type_id: reader.id()?,
                result_id: reader.id()?,
                value: reader.remainder().to_vec(),
            },
            59 => Self::Variable {
                result_type_id: reader.id()?,
                result_id: reader.id()?,
                storage_class: reader.word()?.into(),
            },
            71 => {
                let target = reader.id()?;
                let decoration = reader.word()?;

                Self::Decorate {
                    target,
                    decoration: Decoration::parse(decoration, reader.remainder()),
                }
            }
            5632 => {
                let target = reader.id()?;
                let decoration = reader.word()?;
                let mut strings = Vec::new();

                while !reader.is_empty() {
                    strings.push(reader.string()?);
                }

                Self::DecorateString {
                    target,
                    decoration,
                    strings,
                }
            }
            _ => Self::Unknown { opcode },
        };

        Ok(instruction)
    }

    /// Returns the ID of the result of the instruction, if it has one that is tracked.
    pub fn result_id(&self) -> Option<Id> {
        match *self {
            Self::TypeInt { result_id, .. }
            | Self::TypeFloat { result_id, .. }
            | Self::TypeImage { result_id, .. }
            | Self::TypeSampler { result_id }
            | Self::TypeSampledImage { result_id, .. }
            | Self::TypeArray { result_id, .. }
            | Self::TypeRuntimeArray { result_id, .. }
            | Self::TypeStruct { result_id, .. }
            | Self::TypePointer { result_id, .. }
            | Self::Constant { result_id, .. }
            | Self::Variable { result_id, .. } => Some(result_id),
            _ => None,
        }
    }
}

struct OperandReader<'a> {
    operands: &'a [u32],
    pos: usize,
}

impl OperandReader<'_> {
    fn is_empty(&self) -> bool {
        self.pos >= self.operands.len()
    }

    fn word(&mut self) -> Result<u32, ParseError> {
        let word = *self
            .operands
            .get(self.pos)
            .ok_or(ParseError::MissingOperands)?;
        self.pos += 1;

        Ok(word)
    }

    fn id(&mut self) -> Result<Id, ParseError> {
        self.word().map(Id)
    }

    fn string(&mut self) -> Result<String, ParseError> {
        let remainder = &self.operands[self.pos.min(self.operands.len())..];
        let bytes: Vec<u8> = remainder
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .take_while(|&byte| byte != 0)
            .collect();

        // The terminator is always present, so it is counted as well.
        let words = bytes.len() / 4 + 1;

        if words > remainder.len() {
            return Err(ParseError::UnterminatedString);
        }

        self.pos += words;

        String::from_utf8(bytes).map_err(|_| ParseError::InvalidUtf8)
    }

    fn remainder(&mut self) -> &[u32] {
        let remainder = &self.operands[self.pos.min(self.operands.len())..];
        self.pos = self.operands.len();

        remainder
    }
}

enum ParseError {
    MissingOperands,
    UnterminatedString,
    InvalidUtf8,
}

/// A decoration together with the position of its first literal operand in the module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecorationInfo {
    /// The decoration.
    pub decoration: Decoration,

    /// The word offset of the first literal operand of the decoration, within the whole module.
    pub operand_offset: usize,
}

/// An instruction together with the position of its first word in the module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedInstruction {
    /// The word offset of the instruction within the whole module.
    pub offset: usize,

    /// The decoded instruction.
    pub instruction: Instruction,
}

/// A parsed SPIR-V module.
#[derive(Clone, Debug)]
pub struct Spirv {
    version: (u8, u8),
    bound: u32,
    instructions: Vec<ParsedInstruction>,
    ids: HashMap<Id, usize>,
    names: HashMap<Id, String>,
    decorations: HashMap<Id, Vec<DecorationInfo>>,
    string_decorations: HashMap<Id, Vec<(u32, Vec<String>)>>,
}

impl Spirv {
    /// Parses a SPIR-V module from its words.
    pub fn new(words: &[u32]) -> Result<Spirv, SpirvError> {
        if words.len() < HEADER_WORDS {
            return Err(SpirvError::InvalidHeader);
        }

        if words[0] != MAGIC {
            return Err(SpirvError::MagicNumberMismatch { magic: words[0] });
        }

        let version = (
            ((words[1] & 0x00ff_0000) >> 16) as u8,
            ((words[1] & 0x0000_ff00) >> 8) as u8,
        );
        let bound = words[3];

        let mut instructions = Vec::new();
        let mut ids = HashMap::default();
        let mut names = HashMap::default();
        let mut decorations: HashMap<Id, Vec<DecorationInfo>> = HashMap::default();
        let mut string_decorations: HashMap<Id, Vec<(u32, Vec<String>)>> = HashMap::default();

        let mut offset = HEADER_WORDS;

        while offset < words.len() {
            let word_count = (words[offset] >> 16) as usize;
            let opcode = (words[offset] & 0xffff) as u16;

            if word_count == 0 {
                return Err(SpirvError::InvalidWordCount { offset });
            }

            if offset + word_count > words.len() {
                return Err(SpirvError::InstructionTooLong { offset });
            }

            let operands = &words[offset + 1..offset + word_count];
            let instruction = Instruction::parse(opcode, operands).map_err(|err| match err {
                ParseError::MissingOperands => SpirvError::MissingOperands { offset, opcode },
                ParseError::UnterminatedString => SpirvError::UnterminatedString { offset },
                ParseError::InvalidUtf8 => SpirvError::InvalidUtf8 { offset },
            })?;

            match &instruction {
                Instruction::Name { target, name } => {
                    names.insert(*target, name.clone());
                }
                Instruction::Decorate { target, decoration } => {
                    decorations
                        .entry(*target)
                        .or_default()
                        .push(DecorationInfo {
                            decoration: decoration.clone(),
                            // Opcode word, target and decoration precede the literals.
                            operand_offset: offset + 3,
                        });
                }
                Instruction::DecorateString {
                    target,
                    decoration,
                    strings,
                } => {
                    string_decorations
                        .entry(*target)
                        .or_default()
                        .push((*decoration, strings.clone()));
                }
                _ => (),
            }

            if let Some(result_id) = instruction.result_id() {
                if ids.insert(result_id, instructions.len()).is_some() {
                    return Err(SpirvError::DuplicateResultId { id: result_id });
                }
            }

            instructions.push(ParsedInstruction {
                offset,
                instruction,
            });
            offset += word_count;
        }

        Ok(Spirv {
            version,
            bound,
            instructions,
            ids,
            names,
            decorations,
            string_decorations,
        })
    }

    /// Parses a SPIR-V module from its bytes. Both byte orders are accepted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Spirv, SpirvError> {
        Self::new(&words_from_bytes(bytes)?)
    }

    /// Returns the version of the module as `(major, minor)`.
    #[inline]
    pub fn version(&self) -> (u8, u8) {
        self.version
    }

    /// Returns the upper bound of the result IDs declared in the header.
    #[inline]
    pub fn bound(&self) -> u32 {
        self.bound
    }

    /// Returns all instructions of the module, in order.
    #[inline]
    pub fn instructions(&self) -> &[ParsedInstruction] {
        &self.instructions
    }

    /// Returns the instruction that declares `id`, if any.
    #[inline]
    pub fn id(&self, id: Id) -> Option<IdInfo<'_>> {
        self.ids.get(&id).map(|&index| IdInfo {
            spirv: self,
            id,
            instruction: &self.instructions[index].instruction,
        })
    }

    /// Returns the name given to `id` by `OpName`, if any.
    #[inline]
    pub fn name(&self, id: Id) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Returns an iterator over the `OpDecorate` decorations of `id`.
    pub fn iter_decoration(&self, id: Id) -> impl Iterator<Item = &DecorationInfo> {
        self.decorations.get(&id).into_iter().flatten()
    }

    /// Returns the first string of the `OpDecorateString` decoration `decoration` of `id`.
    pub fn decoration_string(&self, id: Id, decoration: u32) -> Option<&str> {
        self.string_decorations
            .get(&id)?
            .iter()
            .find(|(d, _)| *d == decoration)
            .and_then(|(_, strings)| strings.first())
            .map(String::as_str)
    }
}

/// Information about a result ID.
#[derive(Clone, Copy, Debug)]
pub struct IdInfo<'a> {
    spirv: &'a Spirv,
    id: Id,
    instruction: &'a Instruction,
}

impl<'a> IdInfo<'a> {
    /// Returns the instruction that declares the ID.
    #[inline]
    pub fn instruction(&self) -> &'a Instruction {
        self.instruction
    }

    /// Returns the name given to the ID, if any.
    #[inline]
    pub fn name(&self) -> Option<&'a str> {
        self.spirv.name(self.id)
    }

    /// Returns an iterator over the decorations of the ID.
    #[inline]
    pub fn iter_decoration(&self) -> impl Iterator<Item = &'a DecorationInfo> {
        self.spirv.decorations.get(&self.id).into_iter().flatten()
    }
}

fn words_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, SpirvError> {
    if bytes.len() % 4 != 0 {
        return Err(SpirvError::InvalidByteLength { len: bytes.len() });
    }

    if let Ok(words) = bytemuck::try_cast_slice::<u8, u32>(bytes) {
        if words.first() == Some(&MAGIC) {
            return Ok(words.to_vec());
        }
    }

    let little_endian = bytes.get(..4) == Some(&MAGIC.to_le_bytes()[..]);

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| {
            let chunk = [chunk[0], chunk[1], chunk[2], chunk[3]];

            if little_endian {
                u32::from_le_bytes(chunk)
            } else {
                u32::from_be_bytes(chunk)
            }
        })
        .collect())
}

/// Error that can happen when parsing a SPIR-V module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpirvError {
    /// The module is shorter than its header.
    InvalidHeader,

    /// The first word is not the SPIR-V magic number.
    MagicNumberMismatch { magic: u32 },

    /// The length in bytes is not a multiple of 4.
    InvalidByteLength { len: usize },

    /// An instruction has a word count of zero.
    InvalidWordCount { offset: usize },

    /// An instruction extends past the end of the module.
    InstructionTooLong { offset: usize },

    /// An instruction has fewer operands than its opcode requires.
    MissingOperands { offset: usize, opcode: u16 },

    /// A string literal has no terminator.
    UnterminatedString { offset: usize },

    /// A string literal is not valid UTF-8.
    InvalidUtf8 { offset: usize },

    /// The same result ID is declared more than once.
    DuplicateResultId { id: Id },
}

impl Error for SpirvError {}

impl Display for SpirvError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::InvalidHeader => write!(f, "the module is too short to contain a header"),
            Self::MagicNumberMismatch { magic } => {
                write!(f, "the magic number {:#010x} is not valid", magic)
            }
            Self::InvalidByteLength { len } => {
                write!(f, "the byte length {} is not a multiple of 4", len)
            }
            Self::InvalidWordCount { offset } => {
                write!(f, "the instruction at word {} has a word count of zero", offset)
            }
            Self::InstructionTooLong { offset } => write!(
                f,
                "the instruction at word {} extends past the end of the module",
                offset,
            ),
            Self::MissingOperands { offset, opcode } => write!(
                f,
                "the instruction at word {} (opcode {}) is missing operands",
                offset, opcode,
            ),
            Self::UnterminatedString { offset } => write!(
                f,
                "the instruction at word {} contains an unterminated string",
                offset,
            ),
            Self::InvalidUtf8 { offset } => write!(
                f,
                "the instruction at word {} contains a string that is not valid UTF-8",
                offset,
            ),
            Self::DuplicateResultId { id } => write!(f, "the result ID {} is declared twice", id),
        }
    }
}
