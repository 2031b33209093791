//! Per-user adjustments applied after validation.

use querylens_config::knowledge::DomainProfile;
use querylens_config::{AnalysisConfig, KnowledgeBase, UserPreferences};
use querylens_core::Domain;
use std::collections::HashMap;
use tracing::debug;

pub struct Personalizer {
    users: HashMap<String, UserPreferences>,
    profiles: Vec<DomainProfile>,
    low_threshold: f64,
}

impl Personalizer {
    pub fn new(
        users: HashMap<String, UserPreferences>,
        knowledge: &KnowledgeBase,
        config: &AnalysisConfig,
    ) -> Self {
        Self {
            users,
            profiles: knowledge.domains.clone(),
            low_threshold: config.low_domain_threshold,
        }
    }

    pub fn preferences(&self, user_id: &str) -> Option<&UserPreferences> {
        self.users.get(user_id)
    }

    /// Replace a `General` or weak domain with the user's preferred one.
    ///
    /// Returns the domain to use and whether it was replaced.
    pub fn personalize_domain(&self, user_id: &str, domain: Domain) -> (Domain, bool) {
        let Some(preferred) = self
            .users
            .get(user_id)
            .and_then(|p| p.preferred_domain.as_deref())
        else {
            return (domain, false);
        };
        if preferred.eq_ignore_ascii_case(&domain.name) {
            return (domain, false);
        }
        if !domain.is_general() && domain.relevance_score >= self.low_threshold {
            return (domain, false);
        }

        let relevance = domain.relevance_score.max(self.low_threshold);
        let replaced = match self.profiles.iter().find(|p| p.name.eq_ignore_ascii_case(preferred)) {
            Some(profile) => Domain {
                name: profile.name.clone(),
                description: profile.description.clone(),
                key_concepts: Vec::new(),
                related_tables: profile.related_tables.clone(),
                relevance_score: relevance,
            },
            None => Domain::new(preferred, relevance),
        };
        debug!(user_id, from = %domain.name, to = %replaced.name, "Preferred domain applied");
        (replaced, true)
    }

    /// The user's term boosts that apply to any of `terms`.
    pub fn term_boosts(&self, user_id: &str, terms: &[String]) -> HashMap<String, f64> {
        let Some(prefs) = self.users.get(user_id) else {
            return HashMap::new();
        };
        prefs
            .term_boosts
            .iter()
            .filter(|(term, _)| {
                terms.iter().any(|t| {
                    t.eq_ignore_ascii_case(term)
                        || t.to_lowercase().trim_end_matches('s') == term.to_lowercase().trim_end_matches('s')
                })
            })
            .map(|(term, boost)| (term.clone(), *boost))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn personalizer() -> Personalizer {
        let mut users = HashMap::new();
        users.insert(
            "analyst-7".to_string(),
            UserPreferences {
                preferred_domain: Some("gaming".into()),
                term_boosts: HashMap::from([("ggr".to_string(), 0.2)]),
                ..Default::default()
            },
        );
        Personalizer::new(users, &KnowledgeBase::builtin(), &AnalysisConfig::default())
    }

    #[test]
    fn general_domain_replaced_by_preference() {
        let (domain, applied) = personalizer().personalize_domain("analyst-7", Domain::general(0.1));
        assert!(applied);
        assert_eq!(domain.name, "Gaming");
        assert!((domain.relevance_score - 0.3).abs() < 1e-9);
        assert!(domain.related_tables.contains(&"bets".to_string()));
    }

    #[test]
    fn confident_domain_kept() {
        let (domain, applied) =
            personalizer().personalize_domain("analyst-7", Domain::new("Banking", 0.34));
        assert!(!applied);
        assert_eq!(domain.name, "Banking");
    }

    #[test]
    fn unknown_user_is_untouched() {
        let p = personalizer();
        let (domain, applied) = p.personalize_domain("someone", Domain::general(0.0));
        assert!(!applied);
        assert!(domain.is_general());
        assert!(p.term_boosts("someone", &["ggr".into()]).is_empty());
    }

    #[test]
    fn boosts_only_for_present_terms() {
        let p = personalizer();
        assert_eq!(p.term_boosts("analyst-7", &["GGR".into()]).get("ggr"), Some(&0.2));
        assert!(p.term_boosts("analyst-7", &["deposit".into()]).is_empty());
    }
}
