//! Helper macros used across the crate.

/// Returns early with `$error` unless `$predicate` holds.
///
/// Like `assert!` but for recoverable validation:
///
/// ```ignore
/// ensure!(boundary.len() <= 70, MultipartError::invalid_boundary("boundary too long"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
