use base::cell::Cell;
use base::cmp::Ordering;
use base::fmt;
use base::hash::{Hash, Hasher};
use base::marker::{PhantomData, Unpin};
use base::mem;
use base::ops::{Deref, DerefMut};
use base::ptr::{self, NonNull};

use base::boxed::Box;

use log::trace;

use crate::error::{self, Error};

/// A non-thread-safe reference-counted pointer that may be empty.
///
/// Every bound `SharedOwner` points at one heap block holding both the value and the number of
/// handles currently bound to it. Cloning increments that number, dropping, resetting or
/// reassigning a handle decrements it, and the block is freed exactly when it reaches zero.
///
/// Like `Rc`, all operations are associated functions (`SharedOwner::ref_count(&p)`) so that
/// they never shadow methods of the pointee reached through `Deref`.
pub struct SharedOwner<T> {
    ptr: Option<NonNull<SharedBox<T>>>,
    phantom: PhantomData<SharedBox<T>>,
}

struct SharedBox<T> {
    count: Cell<usize>,
    data: T,
}

impl<T> SharedOwner<T> {
    fn from_inner(ptr: Option<NonNull<SharedBox<T>>>) -> Self {
        Self { ptr, phantom: PhantomData }
    }

    #[inline]
    fn inner(&self) -> Option<&SharedBox<T>> {
        // While this handle is bound it holds one count, so the block is alive.
        self.ptr.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    #[inline]
    fn inc_count(inner: &SharedBox<T>) {
        let count = inner.count.get();

        if count == 0 || count == usize::MAX {
            panic!("SharedOwner reference count overflow");
        }
        inner.count.set(count + 1);
    }

    /// Decrement the count of the block behind `ptr`, freeing it if this was the last owner.
    ///
    /// Safety: `ptr` must come from a bound handle that gives up its count by this call.
    unsafe fn dec_count(ptr: NonNull<SharedBox<T>>) {
        let count = unsafe { ptr.as_ref() }.count.get() - 1;
        unsafe { ptr.as_ref() }.count.set(count);

        if count == 0 {
            trace!("freeing shared block at {:p}", ptr);
            drop(unsafe { Box::from_raw(ptr.as_ptr()) });
        }
    }

    /// Creates a handle that is not bound to any allocation.
    pub const fn empty() -> Self {
        Self { ptr: None, phantom: PhantomData }
    }

    /// Moves `data` to the heap and binds a new handle to it with a reference count of one.
    pub fn new(data: T) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(SharedBox {
            count: Cell::new(1),
            data,
        })));
        trace!("allocated shared block at {:p}", ptr);

        Self::from_inner(Some(ptr))
    }

    /// Takes ownership of an existing heap value.
    ///
    /// The value is moved out of `data` into a new block that also carries its reference
    /// count, so its address changes and the original allocation is freed.
    pub fn from_box(data: Box<T>) -> Self {
        Self::new(*data)
    }

    /// Returns true if the handle is not bound to any allocation.
    #[inline]
    pub fn is_empty(this: &Self) -> bool {
        this.ptr.is_none()
    }

    /// Number of handles bound to the same allocation as `this`, including `this`.
    ///
    /// Fails with [`Error::Empty`] if `this` is empty.
    pub fn ref_count(this: &Self) -> error::Result<usize> {
        this.inner().map(|inner| inner.count.get()).ok_or(Error::Empty)
    }

    /// Shared access to the owned value.
    ///
    /// Fails with [`Error::Empty`] if `this` is empty.
    pub fn get(this: &Self) -> error::Result<&T> {
        this.inner().map(|inner| &inner.data).ok_or(Error::Empty)
    }

    /// Mutable access to the owned value.
    ///
    /// Mutation is exclusive: it is only granted while `this` is the sole owner. Fails with
    /// [`Error::Empty`] if `this` is empty and with [`Error::Aliased`] if other handles share
    /// the allocation.
    pub fn get_mut(this: &mut Self) -> error::Result<&mut T> {
        let ptr = this.ptr.ok_or(Error::Empty)?;
        let count = unsafe { ptr.as_ref() }.count.get();

        if count != 1 {
            return Err(Error::Aliased { count });
        }

        // Sole owner, and `this` is borrowed mutably for the lifetime of the result.
        Ok(unsafe { &mut (*ptr.as_ptr()).data })
    }

    /// Returns true if both handles are bound to the same allocation.
    ///
    /// Two empty handles are not aliases of each other.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        match (this.ptr, other.ptr) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Gives up the current binding, if any, and leaves `this` empty.
    pub fn release(this: &mut Self) {
        if let Some(ptr) = this.ptr.take() {
            unsafe { Self::dec_count(ptr) }
        }
    }

    /// Releases the current binding and binds `this` to `data` with a fresh count of one.
    ///
    /// Other handles that shared the previous allocation keep it, with their count reduced
    /// by one.
    pub fn reset(this: &mut Self, data: T) {
        Self::release(this);
        this.ptr = Self::new(data).into_raw();
    }

    /// Like [`reset`](SharedOwner::reset), adopting an existing heap value.
    ///
    /// As with [`from_box`](SharedOwner::from_box), the value is moved into a new block and
    /// the allocation behind `data` is freed.
    pub fn reset_box(this: &mut Self, data: Box<T>) {
        Self::reset(this, *data)
    }

    /// Moves the binding out of `this` into a new handle, leaving `this` empty.
    ///
    /// The reference count is unchanged.
    pub fn take(this: &mut Self) -> Self {
        Self::from_inner(this.ptr.take())
    }

    /// Releases the binding of `this`, then moves the binding of `source` into it, leaving
    /// `source` empty.
    pub fn assign_from(this: &mut Self, source: &mut Self) {
        let taken = Self::take(source);
        Self::release(this);
        this.ptr = taken.into_raw();
    }

    /// Exchanges the bindings of two handles without touching either count.
    #[inline]
    pub fn swap(a: &mut Self, b: &mut Self) {
        mem::swap(&mut a.ptr, &mut b.ptr);
    }

    /// Returns the value if `this` is its sole owner, otherwise hands `this` back unchanged.
    pub fn try_unwrap(mut this: Self) -> Result<T, Self> {
        match this.ptr {
            Some(ptr) if unsafe { ptr.as_ref() }.count.get() == 1 => {
                this.ptr = None;
                trace!("unwrapping shared block at {:p}", ptr);

                let SharedBox { data, .. } = *unsafe { Box::from_raw(ptr.as_ptr()) };
                Ok(data)
            }
            _ => Err(this),
        }
    }

    /// Consumes the handle without giving up its count.
    fn into_raw(self) -> Option<NonNull<SharedBox<T>>> {
        let ptr = self.ptr;
        mem::forget(self);
        ptr
    }
}

impl<T> Clone for SharedOwner<T> {
    /// Makes another handle to the same allocation, increasing the reference count.
    ///
    /// Cloning an empty handle yields another empty handle.
    #[inline]
    fn clone(&self) -> Self {
        if let Some(inner) = self.inner() {
            Self::inc_count(inner);
        }
        Self::from_inner(self.ptr)
    }

    /// Copy-assignment. The new binding is acquired before the old one is released, so
    /// assigning from a handle that aliases `self` never frees the shared block.
    fn clone_from(&mut self, source: &Self) {
        if !Self::ptr_eq(self, source) {
            let copy = source.clone();
            Self::release(self);
            self.ptr = copy.into_raw();
        }
    }
}

impl<T> Drop for SharedOwner<T> {
    /// Drops the handle, decrementing the reference count and freeing the value and the count
    /// once no handle is left.
    ///
    /// # Examples
    ///
    /// ```
    /// use shared_owner::SharedOwner;
    ///
    /// struct Foo;
    ///
    /// impl Drop for Foo {
    ///     fn drop(&mut self) {
    ///         println!("dropped!");
    ///     }
    /// }
    ///
    /// let foo = SharedOwner::new(Foo);
    /// let foo2 = foo.clone();
    ///
    /// drop(foo);    // Doesn't print anything
    /// drop(foo2);   // Prints "dropped!"
    /// ```
    #[inline]
    fn drop(&mut self) {
        Self::release(self);
    }
}

impl<T> Default for SharedOwner<T> {
    /// Creates an empty `SharedOwner<T>`.
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Deref for SharedOwner<T> {
    type Target = T;

    /// # Panics
    ///
    /// Panics if the handle is empty.
    #[inline]
    fn deref(&self) -> &T {
        match Self::get(self) {
            Ok(data) => data,
            Err(err) => panic!("{}", err),
        }
    }
}

impl<T> DerefMut for SharedOwner<T> {
    /// # Panics
    ///
    /// Panics if the handle is empty or not the sole owner of its value.
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        match Self::get_mut(self) {
            Ok(data) => data,
            Err(err) => panic!("{}", err),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedOwner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::get(self) {
            Ok(data) => f.debug_tuple("SharedOwner").field(data).finish(),
            Err(_) => f.write_str("SharedOwner(<empty>)"),
        }
    }
}

impl<T> fmt::Pointer for SharedOwner<T> {
    /// Formats the address of the value, or a null pointer for an empty handle.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data: *const T = match self.ptr {
            Some(ptr) => unsafe { &ptr.as_ref().data },
            None => ptr::null(),
        };
        fmt::Pointer::fmt(&data, f)
    }
}

impl<T: PartialEq> PartialEq for SharedOwner<T> {
    /// Equality for two `SharedOwner`s.
    ///
    /// Two bound handles are equal if their values are equal, even if they are stored in
    /// different allocations. Two empty handles are equal, and an empty handle never equals a
    /// bound one.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Self::get(self).ok() == Self::get(other).ok()
    }
}

impl<T: Eq> Eq for SharedOwner<T> {}

impl<T: PartialOrd> PartialOrd for SharedOwner<T> {
    /// Compares the values, ordering empty handles before bound ones.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Self::get(self).ok().partial_cmp(&Self::get(other).ok())
    }
}

impl<T: Ord> Ord for SharedOwner<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::get(self).ok().cmp(&Self::get(other).ok())
    }
}

impl<T: Hash> Hash for SharedOwner<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Self::get(self).ok().hash(state)
    }
}

impl<T> From<T> for SharedOwner<T> {
    fn from(t: T) -> Self {
        SharedOwner::new(t)
    }
}

impl<T> From<Box<T>> for SharedOwner<T> {
    fn from(b: Box<T>) -> Self {
        SharedOwner::from_box(b)
    }
}

impl<T> Unpin for SharedOwner<T> {}

#[cfg(test)]
mod tests {
    use super::SharedOwner;

    #[test]
    #[should_panic(expected = "reference count overflow")]
    fn test_clone_at_max_count_panics() {
        let owner = SharedOwner::new(0u8);
        if let Some(inner) = owner.inner() {
            inner.count.set(usize::MAX);
        }
        let _overflow = owner.clone();
    }

    #[test]
    fn test_from_box_keeps_value() {
        let boxed = Box::new([7u64; 4]);
        let owner = SharedOwner::from_box(boxed);
        assert_eq!(SharedOwner::get(&owner), Ok(&[7u64; 4]));
        assert_eq!(SharedOwner::ref_count(&owner), Ok(1));
    }
}
