use regex::Regex;
use std::sync::OnceLock;

use crate::models::{parse_goal, ImportErrorKind, ParsedRow, RowError};

fn match_time_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-1]?[0-9]|2[0-3]):[0-5][0-9]$").expect("valid regex"))
}

/// `HH:MM` on a 24-hour clock; the hour may drop its leading zero.
pub fn is_valid_match_time(raw: &str) -> bool {
    match_time_regex().is_match(raw)
}

/// Scalar sanity checks for a parsed row, roster not consulted.
///
/// Rules run in a fixed order and the first failure wins, so a row with
/// halftime goals above fulltime goals reports that even when its time is
/// also malformed. A missing team name is reported under `InvalidGoals`.
pub fn validate_row(row: &ParsedRow) -> Option<RowError> {
    if row.home_team.is_empty() || row.away_team.is_empty() {
        return Some(RowError::new(ImportErrorKind::InvalidGoals, "Missing team name"));
    }

    let goals = [
        &row.half_time_home_goals,
        &row.half_time_away_goals,
        &row.full_time_home_goals,
        &row.full_time_away_goals,
    ];
    if goals.iter().any(|g| parse_goal(g).is_none()) {
        return Some(RowError::new(ImportErrorKind::InvalidGoals, "Invalid goal value"));
    }

    if let Some(g) = row.goals() {
        if g.half_time_home > g.full_time_home || g.half_time_away > g.full_time_away {
            return Some(RowError::new(
                ImportErrorKind::InvalidGoals,
                "Halftime goals cannot exceed fulltime goals",
            ));
        }
    }

    if !is_valid_match_time(&row.match_time) {
        return Some(RowError::new(
            ImportErrorKind::InvalidTime,
            format!("Invalid time format: '{}' (expected HH:MM)", row.match_time),
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(time: &str, home: &str, away: &str, goals: [&str; 4]) -> ParsedRow {
        ParsedRow {
            match_time: time.to_string(),
            home_team: home.to_string(),
            away_team: away.to_string(),
            half_time_home_goals: goals[0].to_string(),
            half_time_away_goals: goals[1].to_string(),
            full_time_home_goals: goals[2].to_string(),
            full_time_away_goals: goals[3].to_string(),
        }
    }

    #[test]
    fn test_valid_row_passes() {
        assert_eq!(validate_row(&row("20:45", "Barcelona", "Real Madrid", ["1", "0", "2", "1"])), None);
        assert_eq!(validate_row(&row("9:05", "Barcelona", "Real Madrid", ["0", "0", "0", "0"])), None);
    }

    #[test]
    fn test_match_time_format() {
        for ok in ["00:00", "7:30", "19:59", "23:59"] {
            assert!(is_valid_match_time(ok), "{}", ok);
        }
        for bad in ["24:00", "25:61", "12:60", "1230", "12:5", "", " 12:30"] {
            assert!(!is_valid_match_time(bad), "{}", bad);
        }
    }

    #[test]
    fn test_missing_team_name_is_reported_as_goals_error() {
        let err = validate_row(&row("20:45", "", "Real Madrid", ["1", "0", "2", "1"])).unwrap();
        assert_eq!(err.kind, ImportErrorKind::InvalidGoals);
        assert_eq!(err.message, "Missing team name");
    }

    #[test]
    fn test_non_numeric_or_negative_goals() {
        for bad in ["x", "-1", "1.5", ""] {
            let err = validate_row(&row("20:45", "A", "B", ["0", bad, "2", "1"])).unwrap();
            assert_eq!(err.kind, ImportErrorKind::InvalidGoals);
            assert_eq!(err.message, "Invalid goal value");
        }
    }

    #[test]
    fn test_goal_count_beyond_storage_range() {
        let err = validate_row(&row("20:45", "A", "B", ["0", "0", "3000000000", "1"])).unwrap();
        assert_eq!(err.kind, ImportErrorKind::InvalidGoals);
        assert_eq!(err.message, "Invalid goal value");

        let max = i32::MAX.to_string();
        assert_eq!(validate_row(&row("20:45", "A", "B", ["0", "0", max.as_str(), "1"])), None);
    }

    #[test]
    fn test_halftime_above_fulltime_beats_bad_time() {
        let err = validate_row(&row("25:61", "A", "B", ["3", "0", "2", "0"])).unwrap();
        assert_eq!(err.kind, ImportErrorKind::InvalidGoals);
        assert!(err.message.contains("cannot exceed"));

        let err = validate_row(&row("garbage", "A", "B", ["0", "2", "0", "1"])).unwrap();
        assert_eq!(err.kind, ImportErrorKind::InvalidGoals);
    }

    #[test]
    fn test_bad_time_with_valid_goals() {
        let err = validate_row(&row("25:61", "Barca", "Real", ["1", "0", "2", "0"])).unwrap();
        assert_eq!(err.kind, ImportErrorKind::InvalidTime);
    }
}
