use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::models::Match;

/// Combine an upload date with an `HH:MM` kick-off time into a UTC timestamp.
pub fn combine_date_time(date: NaiveDate, time: &str) -> Option<DateTime<Utc>> {
    let (hour, minute) = time.trim().split_once(':')?;
    let time = NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)?;
    Some(date.and_time(time).and_utc())
}

/// Result of a finished match from one team's point of view: 'W', 'D' or 'L'.
/// `None` when the team did not play in it.
pub fn result_for_team(match_data: &Match, team_id: &str) -> Option<char> {
    let (scored, conceded) = if match_data.home_team_id == team_id {
        (match_data.home_score, match_data.away_score)
    } else if match_data.away_team_id == team_id {
        (match_data.away_score, match_data.home_score)
    } else {
        return None;
    };

    Some(match scored.cmp(&conceded) {
        std::cmp::Ordering::Greater => 'W',
        std::cmp::Ordering::Equal => 'D',
        std::cmp::Ordering::Less => 'L',
    })
}

/// Convert a win/loss/draw record to a form string (e.g., "WLWDW")
pub fn results_to_form(results: &[(char, DateTime<Utc>)]) -> String {
    let mut sorted_results = results.to_vec();
    sorted_results.sort_by(|a, b| b.1.cmp(&a.1)); // Most recent first

    sorted_results.iter().take(5).map(|(result, _)| *result).collect()
}

/// Share of available league points taken, 3 for a win and 1 for a draw.
pub fn points_percentage(wins: u32, draws: u32, losses: u32) -> f64 {
    let total_games = wins + draws + losses;
    if total_games == 0 {
        return 0.0;
    }

    let points = wins * 3 + draws;
    (points as f64) / ((total_games * 3) as f64) * 100.0
}

/// Format a ratio as a percentage of `total`, 0 when `total` is 0.
pub fn percentage(count: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}
