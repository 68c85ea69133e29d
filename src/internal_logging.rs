//! Self-diagnostics macros for the pipeline.
//!
//! These macros are for the SDK's own components (processors, readers,
//! exporters), not for application logging. They forward to [`tracing`] when
//! the `internal-logs` feature is enabled, print to stdout under `cfg(test)`
//! so `--nocapture` runs show pipeline activity, and compile away entirely
//! otherwise.

/// Log an informational pipeline event.
#[macro_export]
macro_rules! otel_info {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::info!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name $(, $key = $value)*);
        }
        #[cfg(all(not(feature = "internal-logs"), test))]
        {
            print!("otel_info: name={}", $name);
            $(print!(", {}={}", stringify!($key), $value);)*
            println!();
        }
        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),*);
        }
    };
}

/// Log a debug-level pipeline event.
#[macro_export]
macro_rules! otel_debug {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::debug!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name $(, $key = $value)*);
        }
        #[cfg(all(not(feature = "internal-logs"), test))]
        {
            print!("otel_debug: name={}", $name);
            $(print!(", {}={}", stringify!($key), $value);)*
            println!();
        }
        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),*);
        }
    };
}

/// Log a warning-level pipeline event, e.g. a failed or dropped export.
#[macro_export]
macro_rules! otel_warn {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::warn!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name $(, $key = $value)*);
        }
        #[cfg(all(not(feature = "internal-logs"), test))]
        {
            print!("otel_warn: name={}", $name);
            $(print!(", {}={}", stringify!($key), $value);)*
            println!();
        }
        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),*);
        }
    };
}

/// Log an error-level pipeline event.
#[macro_export]
macro_rules! otel_error {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::error!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name $(, $key = $value)*);
        }
        #[cfg(all(not(feature = "internal-logs"), test))]
        {
            print!("otel_error: name={}", $name);
            $(print!(", {}={}", stringify!($key), $value);)*
            println!();
        }
        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name, $($value),*);
        }
    };
}
