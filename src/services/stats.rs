use crate::models::{HeadToHead, Match, TeamRecord};
use crate::utils::{result_for_team, results_to_form};

/// Season record for one team over the given matches. Matches the team did
/// not play in are ignored.
pub fn team_record(team_id: &str, matches: &[Match]) -> TeamRecord {
    let mut record = TeamRecord {
        team_id: team_id.to_string(),
        ..Default::default()
    };
    let mut results = Vec::new();

    for m in matches {
        let Some(result) = result_for_team(m, team_id) else { continue };
        let (scored, conceded) = if m.home_team_id == team_id {
            (m.home_score, m.away_score)
        } else {
            (m.away_score, m.home_score)
        };

        record.played += 1;
        record.goals_for += scored.max(0) as u32;
        record.goals_against += conceded.max(0) as u32;
        match result {
            'W' => record.wins += 1,
            'D' => record.draws += 1,
            _ => record.losses += 1,
        }
        if m.both_teams_scored() {
            record.btts += 1;
        }
        results.push((result, m.match_date));
    }

    record.form = results_to_form(&results);
    record
}

/// Meetings between two teams regardless of venue, newest first.
pub fn head_to_head(team_a_id: &str, team_b_id: &str, matches: &[Match]) -> HeadToHead {
    let mut h2h = HeadToHead {
        team_a_id: team_a_id.to_string(),
        team_b_id: team_b_id.to_string(),
        ..Default::default()
    };

    let mut meetings: Vec<Match> = matches
        .iter()
        .filter(|m| {
            (m.home_team_id == team_a_id && m.away_team_id == team_b_id)
                || (m.home_team_id == team_b_id && m.away_team_id == team_a_id)
        })
        .cloned()
        .collect();
    meetings.sort_by(|a, b| b.match_date.cmp(&a.match_date));

    for m in &meetings {
        h2h.played += 1;
        match result_for_team(m, team_a_id) {
            Some('W') => h2h.team_a_wins += 1,
            Some('L') => h2h.team_b_wins += 1,
            _ => h2h.draws += 1,
        }
        if m.both_teams_scored() {
            h2h.btts += 1;
        }
    }

    h2h.matches = meetings;
    h2h
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn game(day: u32, home: &str, away: &str, home_score: i32, away_score: i32) -> Match {
        Match {
            id: format!("{}_{}_{}", day, home, away),
            league: "winmix".to_string(),
            home_team_id: home.to_string(),
            away_team_id: away.to_string(),
            home_team_name: home.to_uppercase(),
            away_team_name: away.to_uppercase(),
            match_date: Utc.with_ymd_and_hms(2024, 2, day, 20, 0, 0).unwrap(),
            half_time_home_goals: 0,
            half_time_away_goals: 0,
            home_score,
            away_score,
            created_at: Utc::now(),
        }
    }

    fn fixtures() -> Vec<Match> {
        vec![
            game(1, "rma", "bar", 2, 1),
            game(2, "val", "rma", 0, 0),
            game(3, "bar", "rma", 3, 3),
            game(4, "rma", "sev", 0, 1),
            game(5, "bar", "val", 1, 0),
        ]
    }

    #[test]
    fn test_team_record() {
        let record = team_record("rma", &fixtures());
        assert_eq!(record.played, 4);
        assert_eq!((record.wins, record.draws, record.losses), (1, 2, 1));
        assert_eq!(record.goals_for, 5);
        assert_eq!(record.goals_against, 5);
        assert_eq!(record.btts, 2);
        assert_eq!(record.form, "LDDW");
    }

    #[test]
    fn test_team_record_without_matches() {
        let record = team_record("ghost", &fixtures());
        assert_eq!(record.played, 0);
        assert!(record.form.is_empty());
    }

    #[test]
    fn test_head_to_head_counts_both_venues() {
        let h2h = head_to_head("bar", "rma", &fixtures());
        assert_eq!(h2h.played, 2);
        assert_eq!(h2h.team_a_wins, 0);
        assert_eq!(h2h.team_b_wins, 1);
        assert_eq!(h2h.draws, 1);
        assert_eq!(h2h.btts, 2);
        assert_eq!(h2h.matches[0].home_team_id, "bar"); // newest first
    }
}
