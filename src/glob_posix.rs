//! POSIX glob expansion via the platform `glob(3)` call.
//!
//! The glob library call itself is an out-of-scope platform primitive
//! per SPEC_FULL.md §1; this is a thin FFI wrapper around it using
//! `GLOB_BRACE | GLOB_NOCHECK` as specified in §4.6.

#![cfg(unix)]

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

pub fn glob_brace_nocheck(pattern: &[u8]) -> Vec<Vec<u8>> {
    let Ok(cpattern) = CString::new(pattern) else {
        return vec![pattern.to_vec()];
    };
    unsafe {
        let mut g: libc::glob_t = std::mem::zeroed();
        let flags = libc::GLOB_BRACE | libc::GLOB_NOCHECK;
        let rc = libc::glob(cpattern.as_ptr(), flags, None, &mut g);
        if rc != 0 {
            libc::globfree(&mut g);
            return vec![pattern.to_vec()];
        }
        let mut out = Vec::with_capacity(g.gl_pathc);
        for i in 0..g.gl_pathc {
            let ptr = *g.gl_pathv.add(i) as *const c_char;
            if ptr.is_null() {
                continue;
            }
            out.push(CStr::from_ptr(ptr).to_bytes().to_vec());
        }
        libc::globfree(&mut g);
        out
    }
}
