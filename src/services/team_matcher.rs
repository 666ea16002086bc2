use std::sync::OnceLock;

use crate::models::{SuggestionReason, TeamMatch, TeamSuggestion};

/// Similarity floor used when reconciling names from an uploaded CSV.
pub const IMPORT_THRESHOLD: f64 = 0.6;
/// Similarity floor for ad-hoc lookups.
pub const DEFAULT_THRESHOLD: f64 = 0.7;
pub const MAX_SUGGESTIONS: usize = 5;
pub const CONTAINS_CONFIDENCE: u8 = 85;

/// Canonical club names and the spellings that show up in result feeds.
const TEAM_ALIASES: &[(&str, &[&str])] = &[
    ("Real Madrid", &["Real Madrid CF", "Madrid Fehér", "Los Blancos"]),
    ("Barcelona", &["FC Barcelona", "Barca", "Barça"]),
    ("Atletico Madrid", &["Atlético Madrid", "Atletico de Madrid", "Atl. Madrid"]),
    ("Athletic Bilbao", &["Athletic Club", "Athletic Club Bilbao"]),
    ("Real Betis", &["Betis", "Real Betis Balompié"]),
    ("Real Sociedad", &["La Real", "Real Sociedad de Fútbol"]),
    ("Sevilla", &["Sevilla FC"]),
    ("Valencia", &["Valencia CF"]),
    ("Villarreal", &["Villarreal CF"]),
    ("Manchester United", &["Man United", "Man Utd", "Manchester Utd"]),
    ("Manchester City", &["Man City"]),
    ("Tottenham Hotspur", &["Tottenham", "Spurs"]),
    ("Newcastle United", &["Newcastle"]),
    ("West Ham United", &["West Ham"]),
    ("Wolves", &["Wolverhampton", "Wolverhampton Wanderers"]),
    ("Brighton", &["Brighton & Hove Albion", "Brighton and Hove Albion"]),
    ("Nottingham Forest", &["Nott'm Forest", "Forest"]),
];

/// Normalized alias groups, canonical name first.
fn alias_groups() -> &'static [Vec<String>] {
    static GROUPS: OnceLock<Vec<Vec<String>>> = OnceLock::new();
    GROUPS.get_or_init(|| {
        TEAM_ALIASES
            .iter()
            .map(|(canonical, aliases)| {
                std::iter::once(*canonical)
                    .chain(aliases.iter().copied())
                    .map(normalize_name)
                    .collect()
            })
            .collect()
    })
}

/// Lowercase, drop punctuation, collapse whitespace.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// `1 - levenshtein / longer length`, measured in chars.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - strsim::levenshtein(a, b) as f64 / longest as f64
}

fn reason_for(similarity: f64) -> SuggestionReason {
    if similarity > 0.9 {
        SuggestionReason::VeryCloseMatch
    } else if similarity > 0.8 {
        SuggestionReason::CloseMatch
    } else {
        SuggestionReason::PossibleMatch
    }
}

struct RosterEntry {
    name: String,
    normalized: String,
}

/// Resolves free-text team names against a league roster.
pub struct TeamMatcher {
    roster: Vec<RosterEntry>,
    threshold: f64,
}

impl TeamMatcher {
    pub fn new<I, S>(roster: I, threshold: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roster = roster
            .into_iter()
            .map(|name| {
                let name = name.into();
                let normalized = normalize_name(&name);
                RosterEntry { name, normalized }
            })
            .collect();

        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            tracing::warn!("Ignoring non-finite match threshold, using {}", DEFAULT_THRESHOLD);
            DEFAULT_THRESHOLD
        };

        Self { roster, threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn roster_len(&self) -> usize {
        self.roster.len()
    }

    /// Exact (normalized) match, then alias table, then ranked fuzzy and
    /// containment suggestions. An exact hit never carries suggestions.
    pub fn match_team(&self, raw_name: &str) -> TeamMatch {
        let needle = normalize_name(raw_name);

        if let Some(entry) = self.roster.iter().find(|e| e.normalized == needle) {
            return TeamMatch {
                exact_match: Some(entry.name.clone()),
                suggestions: Vec::new(),
            };
        }

        if let Some(name) = self.alias_match(&needle) {
            return TeamMatch {
                exact_match: Some(name.to_string()),
                suggestions: Vec::new(),
            };
        }

        let mut suggestions: Vec<TeamSuggestion> = Vec::new();

        for entry in &self.roster {
            let score = similarity(&needle, &entry.normalized);
            if score >= self.threshold {
                suggestions.push(TeamSuggestion {
                    name: entry.name.clone(),
                    confidence: (score * 100.0).round() as u8,
                    reason: reason_for(score),
                });
            }
        }

        if !needle.is_empty() {
            for entry in &self.roster {
                if entry.normalized.is_empty()
                    || !(entry.normalized.contains(&needle) || needle.contains(&entry.normalized))
                {
                    continue;
                }
                match suggestions.iter_mut().find(|s| s.name == entry.name) {
                    Some(existing) if existing.confidence >= CONTAINS_CONFIDENCE => {}
                    Some(existing) => {
                        existing.confidence = CONTAINS_CONFIDENCE;
                        existing.reason = SuggestionReason::ContainsMatch;
                    }
                    None => suggestions.push(TeamSuggestion {
                        name: entry.name.clone(),
                        confidence: CONTAINS_CONFIDENCE,
                        reason: SuggestionReason::ContainsMatch,
                    }),
                }
            }
        }

        // Stable: equal confidences keep roster order.
        suggestions.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        suggestions.truncate(MAX_SUGGESTIONS);

        if !suggestions.is_empty() {
            tracing::debug!("No exact match for '{}', {} suggestion(s)", raw_name, suggestions.len());
        }

        TeamMatch {
            exact_match: None,
            suggestions,
        }
    }

    fn alias_match(&self, needle: &str) -> Option<&str> {
        alias_groups()
            .iter()
            .filter(|group| group.iter().any(|n| n == needle))
            .find_map(|group| {
                self.roster
                    .iter()
                    .find(|e| group.contains(&e.normalized))
                    .map(|e| e.name.as_str())
            })
    }
}
