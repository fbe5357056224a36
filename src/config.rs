//! Crawler configuration
//!
//! Controls how far strings are decoded, which managed type bridges to native objects and
//! which optional passes run after the heap crawl.

/// Default bound for decoded strings, in UTF-16 code units.
pub const DEFAULT_MAX_STRING_LENGTH: usize = 8192;

/// Configuration for crawling a snapshot
///
/// The crawl itself (seeding, instance and static crawl, duplicate reconciliation and
/// aggregation) always runs. The cross-reference pass and the type-name heuristic are optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlerConfig {
    /// Maximum number of characters decoded from a managed string, `None` for no bound.
    /// Longer strings are cut and end in [`crate::memory::TRUNCATION_MARKER`].
    pub max_string_length: Option<usize>,

    /// Managed base type of every object that can own a native counterpart.
    pub native_bridge_type_name: String,

    /// Instance field of the bridge type holding the native object's address.
    pub cached_ptr_field_name: String,

    /// Managed string type, the only non-array type with a variable size.
    pub string_type_name: String,

    /// Map native types to managed types by name suffix after the cross-reference pass.
    pub enable_type_name_heuristic: bool,

    /// Link managed shells to their native objects after the crawl.
    pub resolve_native_links: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_string_length: Some(DEFAULT_MAX_STRING_LENGTH),
            native_bridge_type_name: "UnityEngine.Object".to_string(),
            cached_ptr_field_name: "m_CachedPtr".to_string(),
            string_type_name: "System.String".to_string(),
            enable_type_name_heuristic: true,
            resolve_native_links: true,
        }
    }
}

impl CrawlerConfig {
    /// Creates a configuration that only crawls the managed heap
    ///
    /// Skips the cross-reference pass and the type-name heuristic.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            enable_type_name_heuristic: false,
            resolve_native_links: false,
            ..Self::default()
        }
    }

    /// Creates a configuration with every pass enabled and strings decoded in full
    #[must_use]
    pub fn comprehensive() -> Self {
        Self {
            max_string_length: None,
            ..Self::default()
        }
    }

    /// Sets the string truncation bound.
    #[must_use]
    pub fn with_max_string_length(mut self, max: Option<usize>) -> Self {
        self.max_string_length = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let default = CrawlerConfig::default();
        assert_eq!(default.max_string_length, Some(DEFAULT_MAX_STRING_LENGTH));
        assert!(default.resolve_native_links);
        assert!(default.enable_type_name_heuristic);

        let minimal = CrawlerConfig::minimal();
        assert!(!minimal.resolve_native_links);
        assert!(!minimal.enable_type_name_heuristic);
        assert_eq!(minimal.cached_ptr_field_name, "m_CachedPtr");

        let comprehensive = CrawlerConfig::comprehensive();
        assert_eq!(comprehensive.max_string_length, None);
        assert!(comprehensive.resolve_native_links);
    }

    #[test]
    fn test_string_bound() {
        let config = CrawlerConfig::minimal().with_max_string_length(Some(4));
        assert_eq!(config.max_string_length, Some(4));
        assert!(!config.resolve_native_links);
    }
}
