// src/search/request.rs
// Request DTO, validation, and defaulting (spec.md §4.4).

use crate::config::SearchConfig;
use crate::error::{CoreError, CoreResult};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(rename = "memoryId")]
    pub memory_id: String,
    pub query: String,
    #[serde(default)]
    pub top_ke: Option<u32>,
    #[serde(default)]
    pub top_kc: Option<u32>,
    #[serde(default)]
    pub include_raw_entries: Option<bool>,
}

/// Validated, defaulted request ready for `SearchService`.
#[derive(Debug, Clone)]
pub struct ValidatedSearchRequest {
    pub memory_id: String,
    pub query: String,
    pub top_ke: u32,
    pub top_kc: u32,
    pub include_raw_entries: bool,
}

impl SearchRequest {
    /// Validates and defaults this request against `config`'s bounds.
    /// Rejects before any downstream call is made (spec.md §8: "Validation:
    /// topKE ∉ [0,25] or topKC ∉ [1,10] yields a client error and no
    /// downstream calls").
    pub fn validate(self, config: &SearchConfig) -> CoreResult<ValidatedSearchRequest> {
        if self.memory_id.trim().is_empty() {
            return Err(CoreError::validation("memoryId is required"));
        }

        let query = self.query.trim().to_string();
        if query.is_empty() {
            return Err(CoreError::validation("query is required"));
        }

        let top_ke = self.top_ke.unwrap_or(config.default_top_ke);
        if top_ke < config.min_top_ke || top_ke > config.max_top_ke {
            return Err(CoreError::validation(format!(
                "topKE must be in [{}, {}], got {}",
                config.min_top_ke, config.max_top_ke, top_ke
            )));
        }

        let top_kc = self.top_kc.unwrap_or(config.default_top_kc);
        if top_kc < config.min_top_kc || top_kc > config.max_top_kc {
            return Err(CoreError::validation(format!(
                "topKC must be in [{}, {}], got {}",
                config.min_top_kc, config.max_top_kc, top_kc
            )));
        }

        Ok(ValidatedSearchRequest {
            memory_id: self.memory_id,
            query,
            top_ke,
            top_kc,
            include_raw_entries: self.include_raw_entries.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SearchConfig {
        SearchConfig {
            alpha: 0.5,
            default_top_ke: 5,
            min_top_ke: 0,
            max_top_ke: 25,
            default_top_kc: 2,
            min_top_kc: 1,
            max_top_kc: 10,
        }
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let request = SearchRequest {
            memory_id: "m1".to_string(),
            query: "  hello  ".to_string(),
            top_ke: None,
            top_kc: None,
            include_raw_entries: None,
        };

        let validated = request.validate(&config()).unwrap();
        assert_eq!(validated.query, "hello");
        assert_eq!(validated.top_ke, 5);
        assert_eq!(validated.top_kc, 2);
        assert!(!validated.include_raw_entries);
    }

    #[test]
    fn top_ke_zero_is_valid() {
        let request = SearchRequest {
            memory_id: "m1".to_string(),
            query: "q".to_string(),
            top_ke: Some(0),
            top_kc: Some(1),
            include_raw_entries: None,
        };

        assert!(request.validate(&config()).is_ok());
    }

    #[test]
    fn top_ke_above_max_is_rejected() {
        let request = SearchRequest {
            memory_id: "m1".to_string(),
            query: "q".to_string(),
            top_ke: Some(26),
            top_kc: None,
            include_raw_entries: None,
        };

        assert!(request.validate(&config()).is_err());
    }

    #[test]
    fn top_kc_zero_is_rejected() {
        let request = SearchRequest {
            memory_id: "m1".to_string(),
            query: "q".to_string(),
            top_ke: None,
            top_kc: Some(0),
            include_raw_entries: None,
        };

        assert!(request.validate(&config()).is_err());
    }

    #[test]
    fn blank_query_is_rejected() {
        let request = SearchRequest {
            memory_id: "m1".to_string(),
            query: "   ".to_string(),
            top_ke: None,
            top_kc: None,
            include_raw_entries: None,
        };

        assert!(request.validate(&config()).is_err());
    }

    #[test]
    fn empty_memory_id_is_rejected() {
        let request = SearchRequest {
            memory_id: "".to_string(),
            query: "q".to_string(),
            top_ke: None,
            top_kc: None,
            include_raw_entries: None,
        };

        assert!(request.validate(&config()).is_err());
    }
}
