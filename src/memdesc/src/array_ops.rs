use std::sync::Arc;

use coreerr::CoreError;
use vecx::{HandleVector, Vector};

use crate::descriptor::{ArrayBacking, ArrayOps, DescKind, Descriptor};
use crate::engine;
use crate::value::Value;

fn element_descriptor(d: &Descriptor) -> &Descriptor {
    match &d.kind {
        Some(DescKind::Array(element)) => element,
        _ => unreachable!("array ops invoked on a non-array descriptor"),
    }
}

/// The vector adapter (spec §4.3): backs the array over `V<T>`. `resize`
/// grows by appending element-descriptor defaults and shrinks by freeing
/// the removed elements' contents before truncating.
pub fn vector() -> ArrayOps {
    ArrayOps {
        backing: ArrayBacking::Vector,
        get_length: Arc::new(|v| match v {
            Value::Array(vec) => vec.len(),
            _ => 0,
        }),
        get_element: Arc::new(|v, idx| match v {
            Value::Array(vec) => vec.get(idx).cloned().ok_or(CoreError::OutOfRange),
            _ => Err(CoreError::InvalidArgument),
        }),
        resize: Arc::new(|d, v, new_len| {
            let Value::Array(vec) = v else {
                return Err(CoreError::InvalidArgument);
            };
            let element = element_descriptor(d);

            match new_len.cmp(&vec.len()) {
                std::cmp::Ordering::Greater => {
                    while vec.len() < new_len {
                        let fresh = engine::init_defaults(element);
                        vec.append(fresh).map_err(|_| CoreError::OutOfMemory)?;
                    }
                    Ok(())
                }
                std::cmp::Ordering::Less => {
                    for i in new_len..vec.len() {
                        if let Some(elem) = vec.get_mut(i) {
                            engine::free_content(element, elem);
                        }
                    }
                    vec.del_range(new_len, vec.len() - new_len).map(|_| ())
                }
                std::cmp::Ordering::Equal => Ok(()),
            }
        }),
    }
}

/// The handle-vector adapter (spec §4.3): same shape as the vector
/// adapter, but backed by `HV` with the element size fixed at the
/// pointer width — checked against the element descriptor's declared
/// width when growing.
pub fn handle_vector() -> ArrayOps {
    ArrayOps {
        backing: ArrayBacking::HandleVector,
        get_length: Arc::new(|v| match v {
            Value::HandleArray(hv) => hv.len(),
            _ => 0,
        }),
        get_element: Arc::new(|v, idx| match v {
            Value::HandleArray(hv) => hv.get(idx).map(|h| Value::UInt(*h)).ok_or(CoreError::OutOfRange),
            _ => Err(CoreError::InvalidArgument),
        }),
        resize: Arc::new(|d, v, new_len| {
            let Value::HandleArray(hv) = v else {
                return Err(CoreError::InvalidArgument);
            };
            let element = element_descriptor(d);
            if element.get_size()? != std::mem::size_of::<u64>() {
                return Err(CoreError::InvalidArgument);
            }

            match new_len.cmp(&hv.len()) {
                std::cmp::Ordering::Greater => {
                    while hv.len() < new_len {
                        hv.push_back(0).map_err(|_| CoreError::OutOfMemory)?;
                    }
                    Ok(())
                }
                std::cmp::Ordering::Less => hv.truncate(new_len),
                std::cmp::Ordering::Equal => Ok(()),
            }
        }),
    }
}

pub(crate) fn new_empty_array(backing: ArrayBacking) -> Value {
    match backing {
        ArrayBacking::Vector => Value::Array(Vector::new()),
        ArrayBacking::HandleVector => Value::HandleArray(HandleVector::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::Type;
    use std::sync::Arc as StdArc;

    fn u32_array_descriptor() -> Descriptor {
        let element = StdArc::new(Descriptor::scalar(Type::U32).unwrap());
        Descriptor::array(64, element, vector()).unwrap()
    }

    #[test]
    fn vector_adapter_grows_with_element_defaults() {
        let d = u32_array_descriptor();
        let mut v = new_empty_array(ArrayBacking::Vector);
        (d.ops.array.as_ref().unwrap().resize)(&d, &mut v, 3).unwrap();
        assert_eq!((d.ops.array.as_ref().unwrap().get_length)(&v), 3);
    }

    #[test]
    fn vector_adapter_shrinks_and_frees() {
        let d = u32_array_descriptor();
        let mut v = new_empty_array(ArrayBacking::Vector);
        let ops = d.ops.array.as_ref().unwrap();
        (ops.resize)(&d, &mut v, 5).unwrap();
        (ops.resize)(&d, &mut v, 2).unwrap();
        assert_eq!((ops.get_length)(&v), 2);
    }

    #[test]
    fn handle_vector_adapter_grows_and_shrinks() {
        let element = StdArc::new(Descriptor::scalar(Type::Pointer).unwrap());
        let d = Descriptor::array(8, element, handle_vector()).unwrap();
        let mut v = new_empty_array(ArrayBacking::HandleVector);
        let ops = d.ops.array.as_ref().unwrap();
        (ops.resize)(&d, &mut v, 3).unwrap();
        assert_eq!((ops.get_length)(&v), 3);
        (ops.resize)(&d, &mut v, 1).unwrap();
        assert_eq!((ops.get_length)(&v), 1);
    }

    #[test]
    fn handle_vector_adapter_rejects_mismatched_element_width() {
        let element = StdArc::new(Descriptor::scalar(Type::U8).unwrap());
        let d = Descriptor::array(8, element, handle_vector()).unwrap();
        let mut v = new_empty_array(ArrayBacking::HandleVector);
        let result = (d.ops.array.as_ref().unwrap().resize)(&d, &mut v, 1);
        assert_eq!(result, Err(CoreError::InvalidArgument));
    }
}
