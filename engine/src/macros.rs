//! Custom macros for reducing code repetition in retrocast

/// Log and publish a status notification in one step
///
/// # Example
/// ```ignore
/// emit_status!(events, Warning, "GPU stalled, falling back to {}", mode);
/// ```
#[macro_export]
macro_rules! emit_status {
    ($events:expr, $level:ident, $($arg:tt)+) => {{
        let message = format!($($arg)+);
        match common::StatusLevel::$level {
            common::StatusLevel::Info => log::info!("{}", message),
            common::StatusLevel::Warning => log::warn!("{}", message),
            common::StatusLevel::Error => log::error!("{}", message),
        }
        $events.emit(common::PipelineEvent::Status {
            level: common::StatusLevel::$level,
            message,
        });
    }};
}

/// Log parameters once when a preset is applied
///
/// # Example
/// ```ignore
/// log_params!("lcd", "saturation" => 1.1, "effect_strength" => 0.6);
/// ```
#[macro_export]
macro_rules! log_params {
    ($name:expr, $($key:expr => $value:expr),+) => {
        let params = vec![$(format!("{}={}", $key, $value)),+];
        log::info!("{} parameters: {}", $name, params.join(", "));
    };
}

/// Validate an enum-like string value
///
/// # Example
/// ```ignore
/// validate_enum!(mode, "auto", "gpu", "raster-2d", "raw");
/// ```
#[macro_export]
macro_rules! validate_enum {
    ($value:expr, $($variant:expr),+) => {
        match $value {
            $($variant)|+ => Ok(()),
            _ => Err(anyhow::anyhow!("Invalid value: {} (expected one of: {})", $value, [$($variant),+].join(", "))),
        }
    };
}
