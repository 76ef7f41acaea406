/// The scalar/composite kinds a [`crate::Descriptor`] node can describe
/// (spec §3). Integer widths and signedness are tracked separately from
/// the run-time [`crate::Value`] representation, which always widens to
/// `u64`/`i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    U8,
    U16,
    U32,
    U64,
    ULong,
    USize,
    I8,
    I16,
    I32,
    I64,
    ILong,
    ISize,
    Bool,
    Double,
    OwnedString,
    BorrowedString,
    Pointer,
    Struct,
    Array,
    Enum,
}

impl Type {
    /// Compile-time-known width in bytes for primitive types; `None` for
    /// `Struct`/`Array`/`Enum`, whose size is declared on the descriptor
    /// instead (spec §4.3 `get_size`).
    pub fn primitive_size(self) -> Option<usize> {
        use Type::*;
        match self {
            U8 | I8 | Bool => Some(1),
            U16 | I16 => Some(2),
            U32 | I32 => Some(4),
            U64 | I64 | ULong | ISize | ILong | USize => Some(8),
            Double => Some(8),
            OwnedString | BorrowedString | Pointer => Some(std::mem::size_of::<usize>()),
            Struct | Array | Enum => None,
        }
    }

    pub fn is_integer(self) -> bool {
        use Type::*;
        matches!(
            self,
            U8 | U16 | U32 | U64 | ULong | USize | I8 | I16 | I32 | I64 | ILong | ISize
        )
    }

    pub fn is_signed(self) -> bool {
        use Type::*;
        matches!(self, I8 | I16 | I32 | I64 | ILong | ISize)
    }

    /// Canonical type-name string used by the serialisers.
    pub fn name(self) -> &'static str {
        use Type::*;
        match self {
            U8 => "uint8",
            U16 => "uint16",
            U32 => "uint32",
            U64 => "uint64",
            ULong => "ulong",
            USize => "usize",
            I8 => "int8",
            I16 => "int16",
            I32 => "int32",
            I64 => "int64",
            ILong => "long",
            ISize => "ssize",
            Bool => "bool",
            Double => "double",
            OwnedString => "string",
            BorrowedString => "string",
            Pointer => "pointer",
            Struct => "struct",
            Array => "array",
            Enum => "enum",
        }
    }
}
