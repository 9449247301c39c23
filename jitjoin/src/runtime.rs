//! Runtime helpers that generated code calls by symbol name.

use std::ffi::{c_char, CStr};

/// Symbol under which [`str_eq`] is registered with the JIT module.
pub const STR_EQ_SYMBOL: &str = "jitjoin_str_eq";

/// Content equality of two NUL-terminated strings; returns 1 when equal.
///
/// Identical pointers compare equal without reading memory. A null pointer
/// equals only another null pointer.
///
/// # Safety
///
/// Non-null arguments must point to valid NUL-terminated strings.
pub unsafe extern "C" fn str_eq(a: *const c_char, b: *const c_char) -> i32 {
    if a == b {
        return 1;
    }
    if a.is_null() || b.is_null() {
        return 0;
    }
    (CStr::from_ptr(a) == CStr::from_ptr(b)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    #[test]
    fn test_content_not_address() {
        let a = CString::new("join").unwrap();
        let b = CString::new("join").unwrap();
        let c = CString::new("joint").unwrap();
        assert_ne!(a.as_ptr(), b.as_ptr());
        unsafe {
            assert_eq!(str_eq(a.as_ptr(), b.as_ptr()), 1);
            assert_eq!(str_eq(a.as_ptr(), c.as_ptr()), 0);
            assert_eq!(str_eq(a.as_ptr(), a.as_ptr()), 1);
        }
    }

    #[test]
    fn test_null_handling() {
        let a = CString::new("").unwrap();
        unsafe {
            assert_eq!(str_eq(ptr::null(), ptr::null()), 1);
            assert_eq!(str_eq(a.as_ptr(), ptr::null()), 0);
        }
    }
}
