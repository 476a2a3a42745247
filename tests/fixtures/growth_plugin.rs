//! `y = a*exp(b*x)` exported through the plugin C ABI.
//!
//! Built with `--cfg numeric` it drops `fit_jacobian` and asks for finite
//! differences instead.

use std::ffi::c_char;
use std::slice;

#[no_mangle]
pub unsafe extern "C" fn fit_evaluate(x: f64, params: *const f64, n: usize) -> f64 {
    if params.is_null() || n < 2 {
        return f64::NAN;
    }
    let p = slice::from_raw_parts(params, n);
    p[0] * (p[1] * x).exp()
}

#[no_mangle]
pub extern "C" fn fit_parameter_names() -> *const c_char {
    b"a, b\0".as_ptr().cast()
}

#[no_mangle]
pub extern "C" fn fit_name() -> *const c_char {
    b"growth\0".as_ptr().cast()
}

#[cfg(not(numeric))]
#[no_mangle]
pub unsafe extern "C" fn fit_jacobian(x: f64, params: *const f64, n: usize, out: *mut f64) -> i32 {
    if params.is_null() || out.is_null() || n < 2 {
        return 0;
    }
    let p = slice::from_raw_parts(params, n);
    let out = slice::from_raw_parts_mut(out, n);
    let e = (p[1] * x).exp();
    out[0] = e;
    out[1] = p[0] * x * e;
    1
}

#[cfg(numeric)]
#[no_mangle]
pub extern "C" fn fit_numeric_jacobian() -> i32 {
    1
}

#[no_mangle]
pub unsafe extern "C" fn fit_guess(
    _x: *const f64,
    _y: *const f64,
    _points: usize,
    out: *mut f64,
    n: usize,
) -> i32 {
    if out.is_null() || n < 2 {
        return 0;
    }
    let out = slice::from_raw_parts_mut(out, n);
    out[0] = 1.0;
    out[1] = 0.1;
    1
}
