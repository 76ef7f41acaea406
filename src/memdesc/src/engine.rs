//! Default behaviour for `init_defaults`, `set_content`, `copy`, `compare`
//! and `free_content` (spec §4.3). Every entry point checks `D.ops` first
//! and only falls back to the logic here when no override is installed.

use coreerr::{CoreError, CoreResult};

use crate::array_ops::new_empty_array;
use crate::descriptor::{ArrayBacking, DescKind, Descriptor};
use crate::ty::Type;
use crate::value::Value;

fn zero_value(d: &Descriptor) -> Value {
    if d.ty.is_signed() {
        return Value::Int(0);
    }
    if d.ty.is_integer() {
        return Value::UInt(0);
    }
    match d.ty {
        Type::Bool => Value::Bool(false),
        Type::Double => Value::Double(0.0),
        Type::OwnedString => Value::OwnedString(None),
        Type::BorrowedString => Value::BorrowedString(None),
        Type::Pointer => Value::Pointer(None),
        Type::Enum => Value::Enum(0),
        Type::Struct | Type::Array => unreachable!("composite types build their zero value structurally"),
        _ => unreachable!("integer types are handled above"),
    }
}

/// `init_defaults(D, mem)` (spec §4.3): zero-fills, then recurses into
/// structure members or applies `D.defcontent`, deferring to `D.ops` first.
pub fn init_defaults(d: &Descriptor) -> Value {
    if let Some(f) = &d.ops.init_defaults {
        return f(d);
    }

    match &d.kind {
        Some(DescKind::Struct(members)) => Value::Struct(members.iter().map(|m| init_defaults(&m.base)).collect()),
        Some(DescKind::Array(_)) => {
            let backing = d.ops.array.as_ref().map(|a| a.backing).unwrap_or(ArrayBacking::Vector);
            new_empty_array(backing)
        }
        Some(DescKind::Pointer(_)) => Value::Pointer(None),
        Some(DescKind::Enum(_)) | None => match &d.defcontent {
            Some(v) => v.clone(),
            None => zero_value(d),
        },
    }
}

/// `set_content(D, mem, src)` (spec §4.3), deferring to `D.ops` first.
pub fn set_content(d: &Descriptor, dst: &mut Value, src: &Value) -> CoreResult<()> {
    if let Some(f) = &d.ops.set_content {
        return f(d, dst, src);
    }

    match &d.kind {
        Some(DescKind::Struct(members)) => {
            let (Value::Struct(dst_fields), Value::Struct(src_fields)) = (dst, src) else {
                return Err(CoreError::InvalidArgument);
            };
            for (i, member) in members.iter().enumerate() {
                set_content(&member.base, &mut dst_fields[i], &src_fields[i])?;
            }
            Ok(())
        }
        Some(DescKind::Array(element)) => {
            let array_ops = d.ops.array.as_ref().ok_or(CoreError::NotSupported)?;
            let src_len = (array_ops.get_length)(src);
            (array_ops.resize)(d, dst, src_len)?;
            match (dst, src) {
                (Value::Array(dst_vec), Value::Array(src_vec)) => {
                    for i in 0..src_len {
                        set_content(element, &mut dst_vec[i], &src_vec[i])?;
                    }
                    Ok(())
                }
                (Value::HandleArray(dst_hv), Value::HandleArray(src_hv)) => {
                    for i in 0..src_len {
                        dst_hv.set_at(i, *src_hv.get(i).ok_or(CoreError::OutOfRange)?)?;
                    }
                    Ok(())
                }
                _ => Err(CoreError::InvalidArgument),
            }
        }
        Some(DescKind::Pointer(target)) => set_pointer_content(target, dst, src),
        Some(DescKind::Enum(_)) | None => {
            *dst = src.clone();
            Ok(())
        }
    }
}

fn set_pointer_content(target: &Descriptor, dst: &mut Value, src: &Value) -> CoreResult<()> {
    let Value::Pointer(dst_inner) = dst else {
        return Err(CoreError::InvalidArgument);
    };
    let Value::Pointer(src_inner) = src else {
        return Err(CoreError::InvalidArgument);
    };

    match (dst_inner.as_mut(), src_inner.as_ref()) {
        (None, Some(src_box)) => {
            let mut fresh = init_defaults(target);
            set_content(target, &mut fresh, src_box)?;
            *dst = Value::Pointer(Some(Box::new(fresh)));
            Ok(())
        }
        (Some(_), None) => {
            if let Value::Pointer(Some(mut inner)) = std::mem::replace(dst, Value::Pointer(None)) {
                free_content(target, &mut inner);
            }
            Ok(())
        }
        (Some(dst_box), Some(src_box)) => set_content(target, dst_box, src_box),
        (None, None) => Ok(()),
    }
}

/// `compare(D, a, b)` (spec §4.3), deferring to `D.ops` first. Errors are
/// reported by returning `0`, matching the errno-on-error convention.
pub fn compare(d: &Descriptor, a: &Value, b: &Value) -> i32 {
    if let Some(f) = &d.ops.compare {
        return f(d, a, b);
    }

    match &d.kind {
        Some(DescKind::Struct(members)) => {
            let (Value::Struct(af), Value::Struct(bf)) = (a, b) else {
                return 0;
            };
            for (i, member) in members.iter().enumerate() {
                let c = compare(&member.base, &af[i], &bf[i]);
                if c != 0 {
                    return c;
                }
            }
            0
        }
        Some(DescKind::Array(element)) => {
            let Some(array_ops) = &d.ops.array else { return 0 };
            let la = (array_ops.get_length)(a);
            let lb = (array_ops.get_length)(b);
            for i in 0..la.min(lb) {
                let (Ok(ea), Ok(eb)) = ((array_ops.get_element)(a, i), (array_ops.get_element)(b, i)) else {
                    return 0;
                };
                let c = compare(element, &ea, &eb);
                if c != 0 {
                    return c;
                }
            }
            (la as i64 - lb as i64).signum() as i32
        }
        Some(DescKind::Pointer(target)) => compare_pointers(target, a, b),
        Some(DescKind::Enum(_)) | None => compare_scalar(a, b),
    }
}

fn compare_pointers(target: &Descriptor, a: &Value, b: &Value) -> i32 {
    let (Value::Pointer(pa), Value::Pointer(pb)) = (a, b) else {
        return 0;
    };
    match (pa, pb) {
        (None, None) => 0,
        (None, Some(_)) => -1,
        (Some(_), None) => 1,
        (Some(va), Some(vb)) => compare(target, va, vb),
    }
}

fn compare_scalar(a: &Value, b: &Value) -> i32 {
    match (a, b) {
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y).map(|o| o as i32).unwrap_or(0),
        (Value::OwnedString(x), Value::OwnedString(y)) => compare_opt_str(x.as_deref(), y.as_deref()),
        (Value::BorrowedString(x), Value::BorrowedString(y)) => compare_opt_str(*x, *y),
        _ => match (a.as_int64(), b.as_int64()) {
            (Some(x), Some(y)) => (x - y).signum() as i32,
            _ => 0,
        },
    }
}

fn compare_opt_str(a: Option<&str>, b: Option<&str>) -> i32 {
    match (a, b) {
        (None, None) => 0,
        (None, Some(_)) => -1,
        (Some(_), None) => 1,
        (Some(x), Some(y)) => match x.cmp(y) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        },
    }
}

/// `free_content(D, mem)` (spec §4.3): idempotent by construction, since
/// the second call observes the already-freed state from the first.
pub fn free_content(d: &Descriptor, v: &mut Value) {
    if let Some(f) = &d.ops.free_content {
        f(d, v);
        return;
    }

    match &d.kind {
        Some(DescKind::Struct(members)) => {
            if let Value::Struct(fields) = v {
                for (member, field) in members.iter().zip(fields.iter_mut()) {
                    free_content(&member.base, field);
                }
            }
        }
        Some(DescKind::Array(element)) => {
            if let Some(array_ops) = &d.ops.array {
                let len = (array_ops.get_length)(v);
                for i in 0..len {
                    if let Ok(mut elem) = (array_ops.get_element)(v, i) {
                        free_content(element, &mut elem);
                    }
                }
            }
            let backing = d.ops.array.as_ref().map(|a| a.backing).unwrap_or(ArrayBacking::Vector);
            *v = new_empty_array(backing);
        }
        Some(DescKind::Pointer(target)) => {
            if let Value::Pointer(Some(mut inner)) = std::mem::replace(v, Value::Pointer(None)) {
                free_content(target, &mut inner);
            }
        }
        Some(DescKind::Enum(_)) | None => *v = zero_value(d),
    }
}

/// `append_array_element` (spec §4.3): grows by one, then sets the new
/// slot's content, rolling the length back on failure.
pub fn append_array_element(d: &Descriptor, arr: &mut Value, content: &Value) -> CoreResult<()> {
    let array_ops = d.ops.array.as_ref().ok_or(CoreError::NotSupported)?;
    let element = match &d.kind {
        Some(DescKind::Array(element)) => element.as_ref(),
        _ => return Err(CoreError::InvalidArgument),
    };

    let len = (array_ops.get_length)(arr);
    (array_ops.resize)(d, arr, len + 1)?;

    let result = match arr {
        Value::Array(vec) => set_content(element, &mut vec[len], content),
        Value::HandleArray(hv) => match content.as_int64() {
            Some(handle) => hv.set_at(len, handle as u64),
            None => Err(CoreError::InvalidArgument),
        },
        _ => Err(CoreError::InvalidArgument),
    };

    if result.is_err() {
        let _ = (array_ops.resize)(d, arr, len);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_ops::vector;
    use crate::descriptor::Member;
    use std::sync::Arc;

    #[test]
    fn init_defaults_then_compare_self_is_zero() {
        let d = Descriptor::scalar(Type::U32).unwrap();
        let v = init_defaults(&d);
        assert_eq!(compare(&d, &v, &v), 0);
    }

    #[test]
    fn copy_then_compare_round_trips_to_zero() {
        let d = Descriptor::scalar(Type::I64).unwrap().with_default(Value::Int(-7));
        let original = init_defaults(&d);
        let mut copy_target = init_defaults(&Descriptor::scalar(Type::I64).unwrap());
        set_content(&d, &mut copy_target, &original).unwrap();
        assert_eq!(compare(&d, &original, &copy_target), 0);
    }

    #[test]
    fn free_content_is_idempotent() {
        let d = Descriptor::scalar(Type::OwnedString).unwrap();
        let mut v = Value::OwnedString(Some("hello".to_string()));
        free_content(&d, &mut v);
        let after_first = format!("{v:?}");
        free_content(&d, &mut v);
        assert_eq!(format!("{v:?}"), after_first);
    }

    #[test]
    fn struct_compare_and_copy_round_trip() {
        let a = Arc::new(Descriptor::scalar(Type::U32).unwrap());
        let b = Arc::new(Descriptor::scalar(Type::Bool).unwrap());
        let d = Descriptor::structure(
            8,
            vec![
                Member { base: a, name: "x", offset: 0, optional: false, detail: false },
                Member { base: b, name: "y", offset: 4, optional: false, detail: false },
            ],
        )
        .unwrap();

        let v = init_defaults(&d);
        assert_eq!(compare(&d, &v, &v), 0);

        let mut w = init_defaults(&d);
        set_content(&d, &mut w, &v).unwrap();
        assert_eq!(compare(&d, &v, &w), 0);
    }

    #[test]
    fn array_append_and_resize_round_trip() {
        let element = Arc::new(Descriptor::scalar(Type::U32).unwrap());
        let d = Descriptor::array(64, element, vector()).unwrap();

        let mut arr = init_defaults(&d);
        append_array_element(&d, &mut arr, &Value::UInt(10)).unwrap();
        append_array_element(&d, &mut arr, &Value::UInt(20)).unwrap();

        let array_ops = d.ops.array.as_ref().unwrap();
        assert_eq!((array_ops.get_length)(&arr), 2);
        assert_eq!((array_ops.get_element)(&arr, 0).unwrap().as_int64(), Some(10));
        assert_eq!((array_ops.get_element)(&arr, 1).unwrap().as_int64(), Some(20));
    }

    #[test]
    fn pointer_round_trip_allocates_and_frees() {
        let target = Arc::new(Descriptor::scalar(Type::U32).unwrap());
        let d = Descriptor::pointer(target.clone());

        let mut dst = init_defaults(&d);
        let src = Value::Pointer(Some(Box::new(Value::UInt(99))));
        set_content(&d, &mut dst, &src).unwrap();
        assert_eq!(compare(&d, &dst, &src), 0);

        free_content(&d, &mut dst);
        assert_eq!(compare(&d, &dst, &Value::Pointer(None)), 0);
    }
}
