//! Memory-descriptor reflection: a run-time type tree ([`Descriptor`])
//! paired with an engine (`init_defaults`/`set_content`/`copy`/`compare`/
//! `free_content`) and pluggable serialisation (spec §3, §4.3).

mod array_ops;
mod descriptor;
mod engine;
mod render;
mod ty;
mod value;

pub use array_ops::{handle_vector, vector};
pub use descriptor::{ArrayBacking, ArrayOps, DescKind, Descriptor, EnumMapping, EnumOps, Member, Ops};
pub use engine::{append_array_element, compare, free_content, init_defaults, set_content};
pub use render::{render, Producers, SerializeOptions, Shape, Surround};
pub use ty::Type;
pub use value::Value;

/// `copy(D, v)` (spec §8): builds a fresh default instance and copies
/// `v`'s content into it — the round-trip half of `copy`+`compare`.
pub fn copy(d: &Descriptor, v: &Value) -> coreerr::CoreResult<Value> {
    let mut out = init_defaults(d);
    set_content(d, &mut out, v)?;
    Ok(out)
}
