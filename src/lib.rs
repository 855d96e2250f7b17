#![cfg_attr(not(test), no_std)]
#![allow(unused_unsafe)]
//! A reference-counted owning handle for single-threaded code.
//!
//! [`SharedOwner`] shares one heap value among any number of handles and frees it exactly when
//! the last handle bound to it is dropped, reset or reassigned. Unlike `Rc`, a handle may be
//! empty: `SharedOwner::default()` owns nothing, and moving the binding out with
//! [`SharedOwner::take`] leaves the source empty but usable. Accessing the value or the count
//! of an empty handle fails with [`Error::Empty`].
//!
//! ```
//! use shared_owner::SharedOwner;
//!
//! let mut a = SharedOwner::new(1);
//! let b = a.clone();
//! assert_eq!(SharedOwner::ref_count(&b), Ok(2));
//!
//! SharedOwner::reset(&mut a, 2);
//! assert_eq!(*a, 2);
//! assert_eq!(*b, 1);
//! assert_eq!(SharedOwner::ref_count(&b), Ok(1));
//! ```
extern crate maybe_std as base;

mod error;
mod shared;

pub use error::{Error, Result};
pub use shared::SharedOwner;
