//! Structured logging setup
//!
//! Builds the tracing filter string from [`LoggingConfig`], combining the
//! base level with any per-component overrides.

use crate::config::LoggingConfig;

/// Build filter directives string from LoggingConfig
///
/// Returns a filter string in the format:
/// "base_level,aigate::component1=level1,aigate::component2=level2"
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        for (component, level) in component_levels {
            filter_str.push_str(&format!(",aigate::{}={}", component, level));
        }
    }

    filter_str
}
