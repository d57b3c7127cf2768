//! Shapes (hidden classes).
//!
//! A [`Shape`] describes the layout shared by a family of objects: instance
//! type and size, three packed bit-field words, and an ordered list of own
//! [`Descriptor`]s. Shapes form a tree through back pointers; a child differs
//! from its parent by one added descriptor, by a keyed "special" change, or
//! by being a descriptor-less clone.
//!
//! ```text
//!   root {}  ──x──►  {x}  ──y──►  {x, y}
//!     ▲               ▲              │
//!     └── back ───────┴──── back ────┘
//! ```
//!
//! Name comparison needs the heap (string contents), so lookups that match
//! descriptor or transition keys by name live on [`Heap`](crate::Heap).

use std::fmt;

use smallvec::SmallVec;

use crate::object::InstanceType;
use crate::value::{ObjectId, ShapeId, Value};

// =============================================================================
// Property Details
// =============================================================================

bitflags::bitflags! {
    /// Property attributes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyAttributes: u8 {
        /// Value cannot be reassigned.
        const READ_ONLY = 1 << 0;
        /// Skipped by enumeration.
        const DONT_ENUM = 1 << 1;
        /// Cannot be deleted.
        const DONT_DELETE = 1 << 2;
    }
}

/// Data property or accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PropertyKind {
    Data = 0,
    Accessor = 1,
}

/// Where the property's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PropertyLocation {
    /// In the object's property storage, at the field index.
    Field = 0,
    /// In the descriptor itself (constant methods, accessors).
    Descriptor = 1,
}

/// Field representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Representation {
    None = 0,
    Smi = 1,
    Double = 2,
    HeapObject = 3,
    Tagged = 4,
}

impl Representation {
    /// Decode a raw representation.
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Representation::None,
            1 => Representation::Smi,
            2 => Representation::Double,
            3 => Representation::HeapObject,
            4 => Representation::Tagged,
            _ => return None,
        })
    }
}

/// Packed per-descriptor metadata.
///
/// ```text
///   bit 0      kind
///   bit 1      location
///   bits 2-4   attributes
///   bits 5-7   representation
///   bits 8-17  field index
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyDetails(u32);

impl PropertyDetails {
    const ATTRIBUTES_SHIFT: u32 = 2;
    const REPRESENTATION_SHIFT: u32 = 5;
    const FIELD_INDEX_SHIFT: u32 = 8;
    const FIELD_INDEX_BITS: u32 = 10;

    /// Largest field index that fits.
    pub const MAX_FIELD_INDEX: u32 = (1 << Self::FIELD_INDEX_BITS) - 1;

    /// Data property stored in field `index`.
    pub const fn field(attributes: PropertyAttributes, representation: Representation, index: u32) -> Self {
        debug_assert!(index <= Self::MAX_FIELD_INDEX);
        PropertyDetails(
            (PropertyKind::Data as u32)
                | ((PropertyLocation::Field as u32) << 1)
                | ((attributes.bits() as u32) << Self::ATTRIBUTES_SHIFT)
                | ((representation as u32) << Self::REPRESENTATION_SHIFT)
                | (index << Self::FIELD_INDEX_SHIFT),
        )
    }

    /// Data property whose value is held by the descriptor.
    pub const fn constant(attributes: PropertyAttributes) -> Self {
        PropertyDetails(
            (PropertyKind::Data as u32)
                | ((PropertyLocation::Descriptor as u32) << 1)
                | ((attributes.bits() as u32) << Self::ATTRIBUTES_SHIFT)
                | ((Representation::HeapObject as u32) << Self::REPRESENTATION_SHIFT),
        )
    }

    /// Accessor whose callbacks are held by the descriptor.
    pub const fn accessor_constant(attributes: PropertyAttributes) -> Self {
        PropertyDetails(
            (PropertyKind::Accessor as u32)
                | ((PropertyLocation::Descriptor as u32) << 1)
                | ((attributes.bits() as u32) << Self::ATTRIBUTES_SHIFT)
                | ((Representation::Tagged as u32) << Self::REPRESENTATION_SHIFT),
        )
    }

    /// Rebuild from the packed word; `None` if a field is out of range.
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw >> (Self::FIELD_INDEX_SHIFT + Self::FIELD_INDEX_BITS) != 0 {
            return None;
        }
        Representation::from_u8(((raw >> Self::REPRESENTATION_SHIFT) & 0x7) as u8)?;
        Some(PropertyDetails(raw))
    }

    /// Packed word.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn kind(self) -> PropertyKind {
        if self.0 & 1 == 0 {
            PropertyKind::Data
        } else {
            PropertyKind::Accessor
        }
    }

    #[inline]
    pub const fn location(self) -> PropertyLocation {
        if (self.0 >> 1) & 1 == 0 {
            PropertyLocation::Field
        } else {
            PropertyLocation::Descriptor
        }
    }

    #[inline]
    pub const fn attributes(self) -> PropertyAttributes {
        PropertyAttributes::from_bits_truncate(((self.0 >> Self::ATTRIBUTES_SHIFT) & 0x7) as u8)
    }

    #[inline]
    pub fn representation(self) -> Representation {
        Representation::from_u8(((self.0 >> Self::REPRESENTATION_SHIFT) & 0x7) as u8)
            .unwrap_or(Representation::None)
    }

    #[inline]
    pub const fn field_index(self) -> u32 {
        (self.0 >> Self::FIELD_INDEX_SHIFT) & Self::MAX_FIELD_INDEX
    }
}

impl fmt::Debug for PropertyDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDetails")
            .field("kind", &self.kind())
            .field("location", &self.location())
            .field("attributes", &self.attributes())
            .field("representation", &self.representation())
            .field("field_index", &self.field_index())
            .finish()
    }
}

// =============================================================================
// Bit Field 3
// =============================================================================

/// Third packed shape word: descriptor counts plus shape-state flags.
///
/// The two count fields are derived from the descriptor list and are
/// ignored when comparing shapes for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BitField3(u32);

impl BitField3 {
    const COUNT_BITS: u32 = 10;
    const OWN_DESCRIPTORS_MASK: u32 = (1 << Self::COUNT_BITS) - 1;
    const ENUM_LENGTH_SHIFT: u32 = Self::COUNT_BITS;
    const ENUM_LENGTH_MASK: u32 = Self::OWN_DESCRIPTORS_MASK << Self::ENUM_LENGTH_SHIFT;

    /// Both count fields.
    pub const COUNTS_MASK: u32 = Self::OWN_DESCRIPTORS_MASK | Self::ENUM_LENGTH_MASK;
    pub const DICTIONARY_MAP: u32 = 1 << 20;
    pub const STABLE: u32 = 1 << 21;
    pub const DEPRECATED: u32 = 1 << 22;
    pub const PROTOTYPE_MAP: u32 = 1 << 23;

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        BitField3(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn own_descriptors(self) -> u32 {
        self.0 & Self::OWN_DESCRIPTORS_MASK
    }

    #[inline]
    pub const fn enum_length(self) -> u32 {
        (self.0 & Self::ENUM_LENGTH_MASK) >> Self::ENUM_LENGTH_SHIFT
    }

    /// Flag bits with the counts masked off.
    #[inline]
    pub const fn without_counts(self) -> u32 {
        self.0 & !Self::COUNTS_MASK
    }

    #[inline]
    pub const fn has(self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    /// Replace both counts.
    pub const fn with_counts(self, own: u32, enum_length: u32) -> Self {
        BitField3(
            self.without_counts()
                | (own & Self::OWN_DESCRIPTORS_MASK)
                | ((enum_length << Self::ENUM_LENGTH_SHIFT) & Self::ENUM_LENGTH_MASK),
        )
    }
}

// =============================================================================
// Descriptors and Transitions
// =============================================================================

/// One own property of a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    /// Property name, a string or a symbol.
    pub key: ObjectId,
    pub details: PropertyDetails,
    /// Constant value for descriptor-located properties, field type
    /// information (or empty) for fields.
    pub value: Value,
}

/// Outgoing edge in the shape tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Added property name, or a private symbol for special transitions.
    pub key: ObjectId,
    pub target: ShapeId,
}

// =============================================================================
// Shape
// =============================================================================

/// Layout description shared by a family of objects.
#[derive(Debug, Clone)]
pub struct Shape {
    pub instance_type: InstanceType,
    pub instance_size: i32,
    pub inobject_properties: i32,
    pub unused_property_fields: i32,
    pub bit_field: u8,
    pub bit_field2: u8,
    pub bit_field3: BitField3,
    descriptors: Vec<Descriptor>,
    pub back_pointer: Option<ShapeId>,
    pub transitions: SmallVec<[Transition; 2]>,
    /// Constructor function, or empty.
    pub constructor: Value,
    /// Prototype object, or empty.
    pub prototype: Value,
}

impl Shape {
    /// Fresh root shape with no descriptors and no links.
    pub fn new(instance_type: InstanceType, instance_size: i32, inobject_properties: i32) -> Self {
        Shape {
            instance_type,
            instance_size,
            inobject_properties,
            unused_property_fields: inobject_properties,
            bit_field: 0,
            bit_field2: 0,
            bit_field3: BitField3::default(),
            descriptors: Vec::new(),
            back_pointer: None,
            transitions: SmallVec::new(),
            constructor: Value::Empty,
            prototype: Value::Empty,
        }
    }

    /// Copy of the layout fields with no descriptors, links, or transitions.
    pub fn copy_drop_descriptors(&self) -> Self {
        Shape {
            instance_type: self.instance_type,
            instance_size: self.instance_size,
            inobject_properties: self.inobject_properties,
            unused_property_fields: self.unused_property_fields,
            bit_field: self.bit_field,
            bit_field2: self.bit_field2,
            bit_field3: self.bit_field3.with_counts(0, 0),
            descriptors: Vec::new(),
            back_pointer: None,
            transitions: SmallVec::new(),
            constructor: self.constructor,
            prototype: self.prototype,
        }
    }

    /// Own descriptors in insertion order.
    #[inline]
    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Mutable access to descriptor values. The key set is fixed.
    #[inline]
    pub fn descriptor_mut(&mut self, index: usize) -> &mut Descriptor {
        &mut self.descriptors[index]
    }

    #[inline]
    pub fn own_descriptor_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Replace the descriptor list and refresh the count bits.
    pub fn set_descriptors(&mut self, descriptors: Vec<Descriptor>) {
        let enumerable = descriptors
            .iter()
            .filter(|d| !d.details.attributes().contains(PropertyAttributes::DONT_ENUM))
            .count() as u32;
        self.bit_field3 = self
            .bit_field3
            .with_counts(descriptors.len() as u32, enumerable);
        self.descriptors = descriptors;
    }

    /// Key of the transition leading to `target`, if this shape has one.
    pub fn transition_key_to(&self, target: ShapeId) -> Option<ObjectId> {
        self.transitions
            .iter()
            .find(|t| t.target == target)
            .map(|t| t.key)
    }

    /// Whether two shapes agree on everything except descriptor names and
    /// count-only fields.
    pub fn header_equivalent_for_dedup(&self, other: &Shape) -> bool {
        self.instance_type == other.instance_type
            && self.instance_size == other.instance_size
            && self.inobject_properties == other.inobject_properties
            && self.bit_field == other.bit_field
            && self.bit_field2 == other.bit_field2
            && self.bit_field3.without_counts() == other.bit_field3.without_counts()
            && self.constructor == other.constructor
            && self.prototype == other.prototype
            && self.descriptors.len() == other.descriptors.len()
            && self
                .descriptors
                .iter()
                .zip(&other.descriptors)
                .all(|(a, b)| a.details == b.details)
    }
}

// =============================================================================
// Tests
// =============================================================================
