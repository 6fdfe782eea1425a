//! Format characters: the byte vocabulary of NDR format strings

use ndrgen_ast::{BaseType, PointerKind};

/// A format character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Fc {
    Byte = 0x01,
    Char = 0x02,
    Small = 0x03,
    USmall = 0x04,
    WChar = 0x05,
    Short = 0x06,
    UShort = 0x07,
    Long = 0x08,
    ULong = 0x09,
    Float = 0x0a,
    Hyper = 0x0b,
    Double = 0x0c,
    Enum16 = 0x0d,
    Enum32 = 0x0e,
    Ignore = 0x0f,
    ErrorStatusT = 0x10,
    Rp = 0x11,
    Up = 0x12,
    Fp = 0x14,
    Struct = 0x15,
    CStruct = 0x17,
    CvStruct = 0x19,
    CArray = 0x1b,
    CvArray = 0x1c,
    SmFArray = 0x1d,
    LgFArray = 0x1e,
    SmVArray = 0x1f,
    LgVArray = 0x20,
    CCString = 0x22,
    CWString = 0x25,
    CString = 0x26,
    WString = 0x29,
    StringSized = 0x44,
    InParam = 0x4d,
    InParamBasetype = 0x4e,
    InOutParam = 0x50,
    OutParam = 0x51,
    ReturnParam = 0x52,
    ReturnParamBasetype = 0x53,
    Dereference = 0x54,
    Div2 = 0x55,
    Mult2 = 0x56,
    Add1 = 0x57,
    Sub1 = 0x58,
    Callback = 0x59,
    End = 0x5b,
    Pad = 0x5c,
}

/// Correlation kinds, or-ed into the first byte of a correlation descriptor
pub const FC_NORMAL_CONFORMANCE: u8 = 0x00;
pub const FC_TOP_LEVEL_CONFORMANCE: u8 = 0x20;
pub const FC_CONSTANT_CONFORMANCE: u8 = 0x40;

/// Second byte of a pointer descriptor for a pointer to a scalar
pub const FC_SIMPLE_POINTER: u8 = 0x08;

impl Fc {
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Symbolic name used in rendered tables
    pub fn name(self) -> &'static str {
        match self {
            Fc::Byte => "FC_BYTE",
            Fc::Char => "FC_CHAR",
            Fc::Small => "FC_SMALL",
            Fc::USmall => "FC_USMALL",
            Fc::WChar => "FC_WCHAR",
            Fc::Short => "FC_SHORT",
            Fc::UShort => "FC_USHORT",
            Fc::Long => "FC_LONG",
            Fc::ULong => "FC_ULONG",
            Fc::Float => "FC_FLOAT",
            Fc::Hyper => "FC_HYPER",
            Fc::Double => "FC_DOUBLE",
            Fc::Enum16 => "FC_ENUM16",
            Fc::Enum32 => "FC_ENUM32",
            Fc::Ignore => "FC_IGNORE",
            Fc::ErrorStatusT => "FC_ERROR_STATUS_T",
            Fc::Rp => "FC_RP",
            Fc::Up => "FC_UP",
            Fc::Fp => "FC_FP",
            Fc::Struct => "FC_STRUCT",
            Fc::CStruct => "FC_CSTRUCT",
            Fc::CvStruct => "FC_CVSTRUCT",
            Fc::CArray => "FC_CARRAY",
            Fc::CvArray => "FC_CVARRAY",
            Fc::SmFArray => "FC_SMFARRAY",
            Fc::LgFArray => "FC_LGFARRAY",
            Fc::SmVArray => "FC_SMVARRAY",
            Fc::LgVArray => "FC_LGVARRAY",
            Fc::CCString => "FC_C_CSTRING",
            Fc::CWString => "FC_C_WSTRING",
            Fc::CString => "FC_CSTRING",
            Fc::WString => "FC_WSTRING",
            Fc::StringSized => "FC_STRING_SIZED",
            Fc::InParam => "FC_IN_PARAM",
            Fc::InParamBasetype => "FC_IN_PARAM_BASETYPE",
            Fc::InOutParam => "FC_IN_OUT_PARAM",
            Fc::OutParam => "FC_OUT_PARAM",
            Fc::ReturnParam => "FC_RETURN_PARAM",
            Fc::ReturnParamBasetype => "FC_RETURN_PARAM_BASETYPE",
            Fc::Dereference => "FC_DEREFERENCE",
            Fc::Div2 => "FC_DIV_2",
            Fc::Mult2 => "FC_MULT_2",
            Fc::Add1 => "FC_ADD_1",
            Fc::Sub1 => "FC_SUB_1",
            Fc::Callback => "FC_CALLBACK",
            Fc::End => "FC_END",
            Fc::Pad => "FC_PAD",
        }
    }

    pub fn base(base: BaseType) -> Fc {
        match base {
            BaseType::Byte => Fc::Byte,
            BaseType::Char => Fc::Char,
            BaseType::Small => Fc::Small,
            BaseType::USmall => Fc::USmall,
            BaseType::WChar => Fc::WChar,
            BaseType::Short => Fc::Short,
            BaseType::UShort => Fc::UShort,
            BaseType::Long => Fc::Long,
            BaseType::ULong => Fc::ULong,
            BaseType::Hyper => Fc::Hyper,
            BaseType::Float => Fc::Float,
            BaseType::Double => Fc::Double,
            BaseType::Enum16 => Fc::Enum16,
            BaseType::Enum32 => Fc::Enum32,
            BaseType::ErrorStatus => Fc::ErrorStatusT,
            BaseType::Ignore => Fc::Ignore,
        }
    }

    pub fn pointer(kind: PointerKind) -> Fc {
        match kind {
            PointerKind::Ref => Fc::Rp,
            PointerKind::Unique => Fc::Up,
            PointerKind::Full => Fc::Fp,
        }
    }
}
