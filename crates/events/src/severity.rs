//! Status-word → severity classification.
//!
//! Which status words are "good news" or "bad news" depends on the vocabulary
//! of the business and its locale, so the word lists are data, loadable from
//! JSON, rather than code.

use serde::{Deserialize, Serialize};

use crate::event::Severity;

/// Environment variable holding a JSON-encoded [`SeverityRules`].
pub const SEVERITY_RULES_ENV: &str = "CHANTIER_SEVERITY_RULES";

/// Word lists used to classify a new status.
///
/// Matching is a case- and accent-insensitive substring search. Lists are
/// checked from most to least severe (critical, error, warning, success);
/// a status matching none of them is `info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeverityRules {
    pub critical: Vec<String>,
    pub error: Vec<String>,
    pub warning: Vec<String>,
    pub success: Vec<String>,
}

impl Default for SeverityRules {
    fn default() -> Self {
        fn words(ws: &[&str]) -> Vec<String> {
            ws.iter().map(|w| w.to_string()).collect()
        }

        Self {
            critical: words(&["critique", "bloque", "urgence", "sinistre"]),
            error: words(&["annule", "refuse", "rejete", "perdu", "echec", "abandonne"]),
            warning: words(&["retard", "attente", "suspendu", "pause", "relance", "reserve"]),
            success: words(&["signe", "valide", "termine", "gagne", "accepte", "livre", "clotur"]),
        }
    }
}

impl SeverityRules {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load from [`SEVERITY_RULES_ENV`]; defaults when unset.
    pub fn from_env() -> Result<Self, serde_json::Error> {
        match std::env::var(SEVERITY_RULES_ENV) {
            Ok(json) => Self::from_json(&json),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn classify(&self, status: &str) -> Severity {
        let status = fold(status);
        let hit = |list: &[String]| list.iter().any(|w| !w.is_empty() && status.contains(&fold(w)));

        if hit(&self.critical) {
            Severity::Critical
        } else if hit(&self.error) {
            Severity::Error
        } else if hit(&self.warning) {
            Severity::Warning
        } else if hit(&self.success) {
            Severity::Success
        } else {
            Severity::Info
        }
    }
}

/// Lowercase and strip the accents found in French status labels.
fn fold(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vocabulary_classifies_french_statuses() {
        let rules = SeverityRules::default();

        assert_eq!(rules.classify("Signé"), Severity::Success);
        assert_eq!(rules.classify("en_attente_validation"), Severity::Warning);
        assert_eq!(rules.classify("REFUSÉ"), Severity::Error);
        assert_eq!(rules.classify("chantier bloqué"), Severity::Critical);
        assert_eq!(rules.classify("en_cours"), Severity::Info);
    }

    #[test]
    fn more_severe_list_wins() {
        let rules = SeverityRules::default();
        // "annule" (error) and "valide" (success) both appear.
        assert_eq!(rules.classify("validation annulée"), Severity::Error);
    }

    #[test]
    fn rules_load_from_json_with_missing_lists_defaulted() {
        let rules = SeverityRules::from_json(r#"{"success": ["won"], "error": ["lost"]}"#).unwrap();

        assert_eq!(rules.classify("deal won"), Severity::Success);
        assert_eq!(rules.classify("deal lost"), Severity::Error);
        assert_eq!(rules.classify("signé"), Severity::Info);
        assert_eq!(rules.warning, SeverityRules::default().warning);
    }

    #[test]
    fn empty_words_never_match() {
        let rules = SeverityRules {
            critical: vec![String::new()],
            ..SeverityRules::default()
        };
        assert_eq!(rules.classify("en_cours"), Severity::Info);
    }
}
