//! Display labels for internal state codes.
//!
//! Source documentation disagrees on naming ("Pending Review" vs
//! `PENDING_REVIEW`, some descriptions missing "Reviewed" entirely), so
//! labels are configuration data looked up at the edge of the system. The
//! internal codes are authoritative; nothing in the core consults this table
//! when deciding transition legality.

use std::collections::HashMap;

use serde::Deserialize;

use crate::model::states::*;
use crate::model::StateCode;

#[derive(Debug, Clone)]
pub struct DisplayNames {
    labels: HashMap<StateCode, String>,
}

impl Default for DisplayNames {
    fn default() -> Self {
        let labels = [
            (DRAFT, "Draft"),
            (PENDING_REVIEW, "Pending Review"),
            (REVIEWED, "Reviewed"),
            (PENDING_APPROVAL, "Pending Approval"),
            (PENDING_EFFECTIVE, "Pending Effective"),
            (EFFECTIVE, "Effective"),
            (PENDING_OBSOLETE, "Pending Obsoletion"),
            (OBSOLETE, "Obsolete"),
            (SUPERSEDED, "Superseded"),
            (TERMINATED, "Terminated"),
        ]
        .into_iter()
        .map(|(code, label)| (StateCode::from(code), label.to_string()))
        .collect();
        Self { labels }
    }
}

impl DisplayNames {
    /// Label for a state code, falling back to the code itself for states a
    /// deployment added without labeling.
    pub fn label<'a>(&'a self, code: &'a StateCode) -> &'a str {
        self.labels
            .get(code)
            .map(String::as_str)
            .unwrap_or_else(|| code.as_str())
    }

    /// Merge overrides from configuration on top of the defaults.
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        let mut names = Self::default();
        for (code, label) in overrides {
            names.labels.insert(StateCode::new(code), label);
        }
        names
    }
}

/// Serde shape for the `[display_names]` section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisplayNameOverrides(pub HashMap<String, String>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_labels_cover_builtin_states() {
        let names = DisplayNames::default();
        assert_eq!(names.label(&StateCode::from(PENDING_REVIEW)), "Pending Review");
        assert_eq!(names.label(&StateCode::from(PENDING_OBSOLETE)), "Pending Obsoletion");
    }

    #[test]
    fn unknown_code_falls_back_to_the_code() {
        let names = DisplayNames::default();
        assert_eq!(names.label(&StateCode::from("CUSTOM_STATE")), "CUSTOM_STATE");
    }

    #[test]
    fn overrides_replace_defaults() {
        let mut overrides = HashMap::new();
        overrides.insert("DRAFT".to_string(), "Authoring".to_string());
        let names = DisplayNames::with_overrides(overrides);
        assert_eq!(names.label(&StateCode::from(DRAFT)), "Authoring");
        assert_eq!(names.label(&StateCode::from(EFFECTIVE)), "Effective");
    }
}
