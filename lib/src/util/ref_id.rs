use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Reference compared and hashed by address instead of by value
///
/// Used for arena-allocated data that is unique per address (eg. classes in the class graph,
/// which are unique by name), so address identity is the same as structural equality.
#[derive(Debug)]
pub struct RefId<'a, T: ?Sized>(pub &'a T);

impl<T: ?Sized> Copy for RefId<'_, T> {}

impl<T: ?Sized> Clone for RefId<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> PartialEq for RefId<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0 as *const T as *const u8, other.0 as *const T as *const u8)
    }
}

impl<T: ?Sized> Eq for RefId<'_, T> {}

impl<T: ?Sized> Hash for RefId<'_, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.0 as *const T as *const u8 as usize).hash(state)
    }
}

impl<'a, T: ?Sized> Deref for RefId<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}
