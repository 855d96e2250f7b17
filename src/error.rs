use thiserror::Error;

/// Misuse of a [`SharedOwner`](crate::SharedOwner) detected at the call site.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The handle is not bound to any allocation.
    #[error("cannot access the value of an empty SharedOwner")]
    Empty,

    /// Mutable access was requested while other handles share the allocation.
    #[error("cannot mutably access a SharedOwner shared by {count} owners")]
    Aliased { count: usize },
}

pub type Result<T> = core::result::Result<T, Error>;
