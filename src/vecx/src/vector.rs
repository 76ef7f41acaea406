//! `Vector<T>` — a growable contiguous sequence with an explicit
//! next-power-of-two capacity policy (spec §3, §4.1).
//!
//! Capacity is never left to an allocator's whim: it always equals
//! `next_pow2(len)`, shrinking as well as growing, so that a caller probing
//! `capacity()` after any mutation observes the same number the C original
//! would report from its realloc-based vector.

use std::{alloc, mem, ptr, ptr::NonNull, slice};

use coreerr::{CoreError, CoreResult};

/// Entries beyond this count are rejected by `append`/`append_n` (spec §4.1).
pub const MAX_LEN: usize = 65535;

pub struct Vector<T> {
    data: Option<NonNull<T>>,
    len: usize,
    cap: usize,
}

unsafe impl<T: Send> Send for Vector<T> {}
unsafe impl<T: Sync> Sync for Vector<T> {}

impl<T> Default for Vector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Vector<T> {
    pub const fn new() -> Self {
        Self {
            data: None,
            len: 0,
            cap: 0,
        }
    }

    pub fn elem_size(&self) -> usize {
        mem::size_of::<T>()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    fn target_capacity(len: usize) -> usize {
        if len == 0 {
            0
        } else {
            len.next_power_of_two()
        }
    }

    fn layout_for(cap: usize) -> alloc::Layout {
        alloc::Layout::array::<T>(cap).expect("capacity overflows isize")
    }

    /// Reallocates the backing storage so that `capacity() == new_cap`.
    /// `new_cap` must be `>= len`.
    fn set_capacity(&mut self, new_cap: usize) {
        debug_assert!(new_cap >= self.len);
        if new_cap == self.cap {
            return;
        }

        if mem::size_of::<T>() == 0 {
            // No allocation is ever needed for a zero-sized element type.
            self.cap = new_cap;
            return;
        }

        let new_data = if new_cap == 0 {
            None
        } else {
            let new_layout = Self::layout_for(new_cap);
            let raw = match self.data {
                None => unsafe { alloc::alloc(new_layout) },
                Some(old_ptr) => {
                    let old_layout = Self::layout_for(self.cap);
                    unsafe {
                        alloc::realloc(old_ptr.as_ptr().cast(), old_layout, new_layout.size())
                    }
                }
            };
            Some(NonNull::new(raw.cast()).unwrap_or_else(|| alloc::handle_alloc_error(new_layout)))
        };

        if self.data.is_some() && new_data.is_none() {
            // Shrunk to zero: free explicitly (realloc is never asked to do this above).
            let old_layout = Self::layout_for(self.cap);
            unsafe { alloc::dealloc(self.data.unwrap().as_ptr().cast(), old_layout) };
        }

        self.data = new_data;
        self.cap = new_cap;
    }

    pub fn as_slice(&self) -> &[T] {
        match self.data {
            Some(ptr) => unsafe { slice::from_raw_parts(ptr.as_ptr(), self.len) },
            None => &[],
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self.data {
            Some(ptr) => unsafe { slice::from_raw_parts_mut(ptr.as_ptr(), self.len) },
            None => &mut [],
        }
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        self.as_slice().get(i)
    }

    pub fn get_mut(&mut self, i: usize) -> Option<&mut T> {
        self.as_mut_slice().get_mut(i)
    }

    /// Grows by `n` elements, default-initialising the new slots, and
    /// returns them as a mutable slice. Rejects growth past `MAX_LEN`.
    pub fn append_n(&mut self, n: usize) -> CoreResult<&mut [T]>
    where
        T: Default,
    {
        let new_len = self
            .len
            .checked_add(n)
            .ok_or(CoreError::CapacityOverflow)?;
        if new_len > MAX_LEN {
            return Err(CoreError::CapacityOverflow);
        }

        let new_cap = Self::target_capacity(new_len);
        if new_cap != self.cap {
            self.set_capacity(new_cap);
        }

        let base = self.data.map(|p| p.as_ptr()).unwrap_or(ptr::null_mut());
        for i in self.len..new_len {
            unsafe { base.add(i).write(T::default()) };
        }

        let start = self.len;
        self.len = new_len;
        Ok(&mut self.as_mut_slice()[start..new_len])
    }

    pub fn append(&mut self, value: T) -> CoreResult<&mut T>
    where
        T: Default,
    {
        self.append_n(1)?;
        let idx = self.len - 1;
        let slot = &mut self.as_mut_slice()[idx];
        *slot = value;
        Ok(&mut self.as_mut_slice()[idx])
    }

    /// Removes the element at `i`, shifting survivors down to preserve order.
    pub fn del(&mut self, i: usize) -> CoreResult<T> {
        if i >= self.len {
            return Err(CoreError::OutOfRange);
        }
        self.del_range(i, 1).map(|mut v| v.remove(0))
    }

    /// Removes `n` elements starting at `i`, shifting survivors down.
    pub fn del_range(&mut self, i: usize, n: usize) -> CoreResult<Vec<T>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let end = i.checked_add(n).ok_or(CoreError::OutOfRange)?;
        if end > self.len {
            return Err(CoreError::OutOfRange);
        }

        let base = self.data.unwrap().as_ptr();
        let mut removed = Vec::with_capacity(n);
        for k in 0..n {
            removed.push(unsafe { base.add(i + k).read() });
        }

        let tail = self.len - end;
        if tail > 0 {
            unsafe { ptr::copy(base.add(end), base.add(i), tail) };
        }

        self.len -= n;
        let new_cap = Self::target_capacity(self.len);
        if new_cap != self.cap {
            self.set_capacity(new_cap);
        }

        Ok(removed)
    }

    /// Removes the element at the address `elem_ptr`, validating that it
    /// falls exactly on an element boundary within this vector.
    pub fn del_element(&mut self, elem_ptr: *const T) -> CoreResult<T> {
        let base = match self.data {
            Some(p) => p.as_ptr(),
            None => return Err(CoreError::OutOfRange),
        };

        let byte_offset = (elem_ptr as usize)
            .checked_sub(base as usize)
            .ok_or(CoreError::OutOfRange)?;
        let elem_size = mem::size_of::<T>();
        if elem_size == 0 || byte_offset % elem_size != 0 {
            return Err(CoreError::InvalidArgument);
        }

        let index = byte_offset / elem_size;
        self.del(index)
    }

    pub fn clear(&mut self) {
        let _ = self.del_range(0, self.len);
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }
}

impl<T> Drop for Vector<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> std::ops::Index<usize> for Vector<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.as_slice()[i]
    }
}

impl<T> std::ops::IndexMut<usize> for Vector<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        &mut self.as_mut_slice()[i]
    }
}

impl<T: Clone + Default> Clone for Vector<T> {
    fn clone(&self) -> Self {
        let mut out = Self::new();
        for item in self.iter() {
            out.append(item.clone()).expect("cloning never exceeds MAX_LEN");
        }
        out
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Vector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_null_iff_len_zero() {
        let mut v: Vector<u32> = Vector::new();
        assert!(v.data.is_none());
        v.append(1).unwrap();
        assert!(v.data.is_some());
        v.del(0).unwrap();
        assert!(v.data.is_none());
    }

    #[test]
    fn capacity_is_next_pow2_of_len() {
        let mut v: Vector<u32> = Vector::new();
        for n in 1..=20 {
            v.append(n).unwrap();
            assert_eq!(v.capacity(), (n as usize).next_power_of_two());
        }
        for _ in 0..15 {
            v.del(v.len() - 1).unwrap();
            assert_eq!(v.capacity(), Vector::<u32>::target_capacity(v.len()));
        }
    }

    #[test]
    fn append_n_zero_fills() {
        let mut v: Vector<u32> = Vector::new();
        v.append(7).unwrap();
        let slots = v.append_n(3).unwrap();
        assert_eq!(slots, &[0, 0, 0]);
    }

    #[test]
    fn del_preserves_order() {
        let mut v: Vector<u32> = Vector::new();
        for n in 0..5 {
            v.append(n).unwrap();
        }
        v.del(1).unwrap();
        assert_eq!(v.as_slice(), &[0, 2, 3, 4]);
    }

    #[test]
    fn del_element_by_pointer() {
        let mut v: Vector<u32> = Vector::new();
        for n in 0..5 {
            v.append(n).unwrap();
        }
        let ptr = v.get(2).unwrap() as *const u32;
        let removed = v.del_element(ptr).unwrap();
        assert_eq!(removed, 2);
        assert_eq!(v.as_slice(), &[0, 1, 3, 4]);
    }

    #[test]
    fn del_element_rejects_misaligned_pointer() {
        let mut v: Vector<u32> = Vector::new();
        v.append(1).unwrap();
        v.append(2).unwrap();
        let ptr = v.get(0).unwrap() as *const u32;
        let misaligned = (ptr as usize + 1) as *const u32;
        assert_eq!(v.del_element(misaligned), Err(CoreError::InvalidArgument));
    }

    #[test]
    fn append_past_max_len_errors() {
        let mut v: Vector<u8> = Vector::new();
        v.append_n(MAX_LEN).unwrap();
        assert_eq!(v.append(0), Err(CoreError::CapacityOverflow));
    }

    #[test]
    fn get_is_bounds_checked() {
        let v: Vector<u32> = Vector::new();
        assert!(v.get(0).is_none());
    }
}
