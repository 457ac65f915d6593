use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Cheaply cloneable, refcounted string. Key features and bucket ids repeat
/// heavily across the database, so all of them are carried as `SharedStr` and
/// deduplicated by the storage interner.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SharedStr(Arc<str>);

impl SharedStr {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of live references to the backing allocation.
    #[inline]
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// True if both values share one backing allocation.
    #[inline]
    pub fn same_allocation(a: &SharedStr, b: &SharedStr) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl Deref for SharedStr {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SharedStr {
    #[inline]
    fn from(value: &str) -> SharedStr {
        SharedStr(Arc::from(value))
    }
}

impl From<String> for SharedStr {
    #[inline]
    fn from(value: String) -> SharedStr {
        SharedStr(Arc::from(value.into_boxed_str()))
    }
}

impl fmt::Display for SharedStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SharedStr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl PartialEq<str> for SharedStr {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for SharedStr {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_allocation() {
        let a = SharedStr::from("privilege");
        let b = a.clone();

        assert!(SharedStr::same_allocation(&a, &b));
        assert_eq!(a.ref_count(), 2);
    }

    #[test]
    fn test_equality_is_by_content() {
        let a = SharedStr::from("user");
        let b = SharedStr::from(String::from("user"));

        assert_eq!(a, b);
        assert!(!SharedStr::same_allocation(&a, &b));
    }
}
