use std::fmt::Display;

use super::types::TypeDesc;

/// A literal value, tagged with the C primitive it was written as.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Char(i8),
    SignedChar(i8),
    UnsignedChar(u8),
    Short(i16),
    UnsignedShort(u16),
    Int(i32),
    UnsignedInt(u32),
    Long(i64),
    UnsignedLong(u64),
    LongLong(i64),
    UnsignedLongLong(u64),
    Float(f32),
    Double(f64),
    LongDouble(f64),
}

impl Constant {
    /// The descriptor of the type this constant was written as.
    pub fn type_desc(&self) -> TypeDesc {
        let name = match self {
            Constant::Char(_) => "char",
            Constant::SignedChar(_) => "signed char",
            Constant::UnsignedChar(_) => "unsigned char",
            Constant::Short(_) => "short",
            Constant::UnsignedShort(_) => "unsigned short",
            Constant::Int(_) => "int",
            Constant::UnsignedInt(_) => "unsigned int",
            Constant::Long(_) => "long",
            Constant::UnsignedLong(_) => "unsigned long",
            Constant::LongLong(_) => "long long",
            Constant::UnsignedLongLong(_) => "unsigned long long",
            Constant::Float(_) => "float",
            Constant::Double(_) => "double",
            Constant::LongDouble(_) => "long double",
        };
        TypeDesc::primitive(name).expect("every constant kind maps to a primitive type")
    }

    /// The value as a 64-bit integer, for integer-kinded constants only.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Constant::Char(v) | Constant::SignedChar(v) => Some(v as i64),
            Constant::UnsignedChar(v) => Some(v as i64),
            Constant::Short(v) => Some(v as i64),
            Constant::UnsignedShort(v) => Some(v as i64),
            Constant::Int(v) => Some(v as i64),
            Constant::UnsignedInt(v) => Some(v as i64),
            Constant::Long(v) | Constant::LongLong(v) => Some(v),
            Constant::UnsignedLong(v) | Constant::UnsignedLongLong(v) => Some(v as i64),
            Constant::Float(_) | Constant::Double(_) | Constant::LongDouble(_) => None,
        }
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Constant::Char(v) | Constant::SignedChar(v) => write!(f, "{v}"),
            Constant::UnsignedChar(v) => write!(f, "{v}"),
            Constant::Short(v) => write!(f, "{v}"),
            Constant::UnsignedShort(v) => write!(f, "{v}"),
            Constant::Int(v) => write!(f, "{v}"),
            Constant::UnsignedInt(v) => write!(f, "{v}u"),
            Constant::Long(v) => write!(f, "{v}l"),
            Constant::UnsignedLong(v) => write!(f, "{v}ul"),
            Constant::LongLong(v) => write!(f, "{v}ll"),
            Constant::UnsignedLongLong(v) => write!(f, "{v}ull"),
            Constant::Float(v) => write!(f, "{v}f"),
            Constant::Double(v) => write!(f, "{v}"),
            Constant::LongDouble(v) => write!(f, "{v}l"),
        }
    }
}
