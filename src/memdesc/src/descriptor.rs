use std::sync::Arc;

use coreerr::{CoreError, CoreResult};

use crate::ty::Type;
use crate::value::Value;

pub type InitFn = dyn Fn(&Descriptor) -> Value + Send + Sync;
pub type SetContentFn = dyn Fn(&Descriptor, &mut Value, &Value) -> CoreResult<()> + Send + Sync;
pub type CopyFn = dyn Fn(&Descriptor, &Value) -> Value + Send + Sync;
pub type CompareFn = dyn Fn(&Descriptor, &Value, &Value) -> i32 + Send + Sync;
pub type FreeFn = dyn Fn(&Descriptor, &mut Value) + Send + Sync;

pub type GetLengthFn = dyn Fn(&Value) -> usize + Send + Sync;
pub type GetElementFn = dyn Fn(&Value, usize) -> CoreResult<Value> + Send + Sync;
pub type ResizeFn = dyn Fn(&Descriptor, &mut Value, usize) -> CoreResult<()> + Send + Sync;

/// Which built-in container backs an array descriptor (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayBacking {
    Vector,
    HandleVector,
}

/// The three-function array operation table (spec §4.3).
#[derive(Clone)]
pub struct ArrayOps {
    pub backing: ArrayBacking,
    pub get_length: Arc<GetLengthFn>,
    pub get_element: Arc<GetElementFn>,
    pub resize: Arc<ResizeFn>,
}

pub type ToStrFn = dyn Fn(i64) -> Option<&'static str> + Send + Sync;
pub type FromStrFn = dyn Fn(&str) -> Option<i64> + Send + Sync;

#[derive(Clone)]
pub struct EnumOps {
    pub to_str: Arc<ToStrFn>,
    pub from_str: Arc<FromStrFn>,
}

/// Overrides for the default engine behaviour (spec §3). Any field left
/// `None` falls back to the engine's built-in implementation.
#[derive(Clone, Default)]
pub struct Ops {
    pub init_defaults: Option<Arc<InitFn>>,
    pub set_content: Option<Arc<SetContentFn>>,
    pub copy: Option<Arc<CopyFn>>,
    pub compare: Option<Arc<CompareFn>>,
    pub free_content: Option<Arc<FreeFn>>,
    pub array: Option<ArrayOps>,
    pub enum_ops: Option<EnumOps>,
}

/// One member of a structure descriptor.
pub struct Member {
    pub base: Arc<Descriptor>,
    pub name: &'static str,
    pub offset: usize,
    pub optional: bool,
    pub detail: bool,
}

/// A string↔integer mapping for enumeration descriptors.
#[derive(Default)]
pub struct EnumMapping {
    pub entries: Vec<(&'static str, i64)>,
}

impl EnumMapping {
    pub fn to_str(&self, value: i64) -> Option<&'static str> {
        self.entries.iter().find(|(_, v)| *v == value).map(|(s, _)| *s)
    }

    pub fn from_str(&self, s: &str) -> Option<i64> {
        self.entries.iter().find(|(n, _)| *n == s).map(|(_, v)| *v)
    }
}

/// The children a descriptor node may carry, depending on its [`Type`]
/// (spec §3). Scalars carry `None`.
pub enum DescKind {
    Pointer(Arc<Descriptor>),
    Array(Arc<Descriptor>),
    Struct(Vec<Member>),
    Enum(EnumMapping),
}

/// One node of the memory-description tree (spec §3).
pub struct Descriptor {
    pub size: usize,
    pub ty: Type,
    pub defcontent: Option<Value>,
    pub kind: Option<DescKind>,
    pub ops: Ops,
}

impl Descriptor {
    pub fn scalar(ty: Type) -> CoreResult<Descriptor> {
        let size = ty.primitive_size().ok_or(CoreError::InvalidArgument)?;
        Ok(Descriptor {
            size,
            ty,
            defcontent: None,
            kind: None,
            ops: Ops::default(),
        })
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.defcontent = Some(value);
        self
    }

    pub fn with_ops(mut self, ops: Ops) -> Self {
        self.ops = ops;
        self
    }

    pub fn pointer(target: Arc<Descriptor>) -> Descriptor {
        Descriptor {
            size: Type::Pointer.primitive_size().unwrap(),
            ty: Type::Pointer,
            defcontent: None,
            kind: Some(DescKind::Pointer(target)),
            ops: Ops::default(),
        }
    }

    /// Structure descriptors must declare a non-zero `size`, and each
    /// member's `offset + base.size` must fit within it (spec §3).
    pub fn structure(size: usize, members: Vec<Member>) -> CoreResult<Descriptor> {
        if size == 0 {
            return Err(CoreError::InvalidArgument);
        }
        for member in &members {
            if member.offset.checked_add(member.base.size).ok_or(CoreError::OutOfRange)? > size {
                return Err(CoreError::OutOfRange);
            }
        }
        Ok(Descriptor {
            size,
            ty: Type::Struct,
            defcontent: None,
            kind: Some(DescKind::Struct(members)),
            ops: Ops::default(),
        })
    }

    /// Array descriptors must declare a non-zero `size` and an array-ops
    /// table (one of the two built-in adapters, or a custom one).
    pub fn array(size: usize, element: Arc<Descriptor>, array_ops: ArrayOps) -> CoreResult<Descriptor> {
        if size == 0 {
            return Err(CoreError::InvalidArgument);
        }
        Ok(Descriptor {
            size,
            ty: Type::Array,
            defcontent: None,
            kind: Some(DescKind::Array(element)),
            ops: Ops {
                array: Some(array_ops),
                ..Ops::default()
            },
        })
    }

    /// Enumeration `size` must be `≤ 8` (spec §3).
    pub fn enumeration(size: usize, mapping: EnumMapping) -> CoreResult<Descriptor> {
        if size == 0 || size > 8 {
            return Err(CoreError::InvalidArgument);
        }
        Ok(Descriptor {
            size,
            ty: Type::Enum,
            defcontent: None,
            kind: Some(DescKind::Enum(mapping)),
            ops: Ops::default(),
        })
    }

    /// `get_size(D)` (spec §4.3): the compile-time width for primitives,
    /// or the declared `size` for structure/array/enumeration.
    pub fn get_size(&self) -> CoreResult<usize> {
        match self.ty.primitive_size() {
            Some(n) => Ok(n),
            None => Ok(self.size),
        }
    }
}
