//! Value types and constant literals understood by the target VM.
//!
//! Types are identified by the name the target ISA uses for them (e.g.
//! `SystemInt32`). Only a handful are known to the compiler; everything else is
//! an opaque reference type carried by name.

use core::fmt;
use core::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::String;
use crate::vm::AddressRef;

/// The declared type of a variable or action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Boolean,
    Int32,
    UInt32,
    Single,
    String,
    /// The root object type; any reference can be stored here.
    Object,
    /// Any other reference type, named as the target ISA names it
    /// (e.g. `UnityEngineGameObject`).
    Reference(String),
}

impl ValueType {
    /// The type name used in variable declarations and extern signatures.
    pub fn isa_name(&self) -> &str {
        match self {
            ValueType::Boolean => "SystemBoolean",
            ValueType::Int32 => "SystemInt32",
            ValueType::UInt32 => "SystemUInt32",
            ValueType::Single => "SystemSingle",
            ValueType::String => "SystemString",
            ValueType::Object => "SystemObject",
            ValueType::Reference(name) => name,
        }
    }

    /// Value types compare by value; everything else compares through the
    /// ISA's generic object equality.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            ValueType::Boolean | ValueType::Int32 | ValueType::UInt32 | ValueType::Single
        )
    }

    /// Whether a value of type `other` can be bound where `self` is expected.
    ///
    /// `Object` accepts every reference type.
    pub fn accepts(&self, other: &ValueType) -> bool {
        self == other || (*self == ValueType::Object && !other.is_value_type())
    }

    /// The type of `this`, the object running the program.
    pub fn game_object() -> ValueType {
        ValueType::Reference(String::from("UnityEngineGameObject"))
    }

    pub fn player() -> ValueType {
        ValueType::Reference(String::from("VRCSDKBaseVRCPlayerApi"))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.isa_name())
    }
}

/// A literal value stored in a constant slot of the variable table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConstValue {
    Null,
    Boolean(bool),
    Int32(i32),
    UInt32(u32),
    Single(f32),
    String(String),
    /// An instruction or method address, known only after linking.
    #[serde(skip)]
    Address(AddressRef),
}

impl ConstValue {
    /// Whether this literal can initialise a slot of type `ty`.
    pub fn fits(&self, ty: &ValueType) -> bool {
        match self {
            ConstValue::Null => !ty.is_value_type(),
            ConstValue::Boolean(_) => *ty == ValueType::Boolean,
            ConstValue::Int32(_) => *ty == ValueType::Int32,
            ConstValue::UInt32(_) | ConstValue::Address(_) => *ty == ValueType::UInt32,
            ConstValue::Single(_) => *ty == ValueType::Single,
            ConstValue::String(_) => matches!(ty, ValueType::String | ValueType::Object),
        }
    }

    /// The natural type of the literal, if it has one (`Null` does not).
    pub fn natural_type(&self) -> Option<ValueType> {
        match self {
            ConstValue::Null => None,
            ConstValue::Boolean(_) => Some(ValueType::Boolean),
            ConstValue::Int32(_) => Some(ValueType::Int32),
            ConstValue::UInt32(_) | ConstValue::Address(_) => Some(ValueType::UInt32),
            ConstValue::Single(_) => Some(ValueType::Single),
            ConstValue::String(_) => Some(ValueType::String),
        }
    }
}

// Floats compare by bit pattern so that identical literals share a slot.
impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Null, ConstValue::Null) => true,
            (ConstValue::Boolean(a), ConstValue::Boolean(b)) => a == b,
            (ConstValue::Int32(a), ConstValue::Int32(b)) => a == b,
            (ConstValue::UInt32(a), ConstValue::UInt32(b)) => a == b,
            (ConstValue::Single(a), ConstValue::Single(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::String(a), ConstValue::String(b)) => a == b,
            (ConstValue::Address(a), ConstValue::Address(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            ConstValue::Null => {}
            ConstValue::Boolean(b) => b.hash(state),
            ConstValue::Int32(i) => i.hash(state),
            ConstValue::UInt32(u) => u.hash(state),
            ConstValue::Single(f) => f.to_bits().hash(state),
            ConstValue::String(s) => s.hash(state),
            ConstValue::Address(a) => a.hash(state),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => write!(f, "null"),
            ConstValue::Boolean(b) => write!(f, "{}", b),
            ConstValue::Int32(i) => write!(f, "{}", i),
            ConstValue::UInt32(u) => write!(f, "{:#010X}", u),
            ConstValue::Single(x) => write!(f, "{}", x),
            ConstValue::String(s) => write!(f, "{:?}", s),
            ConstValue::Address(a) => write!(f, "&{}", a),
        }
    }
}
