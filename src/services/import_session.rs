//! CSV result import: parse an uploaded file into reviewable records, let the
//! user correct team names, then commit the clean rows one by one.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;

use crate::error::ImportError;
use crate::models::{
    CommitSummary, ImportErrorKind, ImportRecord, ImportSession, Match, NewMatch, ParsedRow,
    RecordStatus, RowError, TeamRef, TeamSide,
};
use crate::services::team_matcher::TeamMatcher;
use crate::services::tokenizer::tokenize_line;
use crate::services::validator::validate_row;
use crate::utils::combine_date_time;

pub const EXPORT_HEADER: [&str; 9] = [
    "match_time",
    "home_team",
    "away_team",
    "half_time_home_goals",
    "half_time_away_goals",
    "full_time_home_goals",
    "full_time_away_goals",
    "error_message",
    "suggestions",
];

/// Source of the known teams for a league.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn teams_by_league(&self, league_id: &str) -> Result<Vec<TeamRef>>;
}

/// Where committed matches end up.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn insert_match(&self, new_match: &NewMatch) -> Result<Match>;
}

impl ImportSession {
    /// Fetch the league roster, then parse `text` against it.
    pub async fn start(
        text: &str,
        league_id: &str,
        upload_date: NaiveDate,
        roster: &dyn RosterProvider,
        threshold: f64,
    ) -> Result<Self> {
        let teams = roster.teams_by_league(league_id).await?;
        tracing::info!("Loaded {} teams for league {}", teams.len(), league_id);
        Ok(Self::parse(text, league_id, upload_date, teams, threshold))
    }

    /// Parse a whole file. The first line is a header and is discarded;
    /// blank lines are ignored and lines with fewer than seven fields are
    /// dropped and counted.
    pub fn parse(
        text: &str,
        league_id: &str,
        upload_date: NaiveDate,
        roster: Vec<TeamRef>,
        threshold: f64,
    ) -> Self {
        let matcher = TeamMatcher::new(roster.iter().map(|t| t.name.clone()), threshold);
        let mut records = Vec::new();
        let mut dropped_rows = 0;

        for (line_no, line) in text.lines().enumerate().skip(1) {
            if line.trim().is_empty() {
                continue;
            }

            let fields = tokenize_line(line);
            let Some(row) = ParsedRow::from_fields(&fields) else {
                tracing::debug!("Dropping line {}: {} field(s)", line_no + 1, fields.len());
                dropped_rows += 1;
                continue;
            };

            let mut record = ImportRecord::new(row);
            evaluate(&mut record, &matcher);
            records.push(record);
        }

        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            league_id: league_id.to_string(),
            upload_date,
            records,
            dropped_rows,
            roster,
            threshold: matcher.threshold(),
        };

        tracing::info!(
            "Parsed import {}: {} valid, {} with errors, {} dropped",
            session.id,
            session.valid_count(),
            session.error_count(),
            session.dropped_rows
        );

        session
    }

    fn matcher(&self) -> TeamMatcher {
        TeamMatcher::new(self.roster.iter().map(|t| t.name.clone()), self.threshold)
    }

    /// Replace one side's team name with `chosen` and re-check the row.
    pub fn apply_correction(
        &mut self,
        index: usize,
        side: TeamSide,
        chosen: &str,
    ) -> std::result::Result<&ImportRecord, ImportError> {
        let matcher = self.matcher();
        let record = self
            .records
            .get_mut(index)
            .ok_or(ImportError::RecordNotFound(index))?;
        if record.status != RecordStatus::Pending {
            return Err(ImportError::RecordClosed(index));
        }

        let chosen = chosen.trim().to_string();
        match side {
            TeamSide::Home => {
                record.corrected_home_team = Some(chosen.clone());
                record.row.home_team = chosen;
            }
            TeamSide::Away => {
                record.corrected_away_team = Some(chosen.clone());
                record.row.away_team = chosen;
            }
        }

        evaluate(record, &matcher);
        tracing::info!(
            "Corrected {} team on row {} (error remaining: {})",
            side.as_str(),
            index + 1,
            record.has_error
        );
        Ok(record)
    }

    /// Leave a record out of the import.
    pub fn skip(&mut self, index: usize) -> std::result::Result<(), ImportError> {
        let record = self
            .records
            .get_mut(index)
            .ok_or(ImportError::RecordNotFound(index))?;
        if record.status == RecordStatus::Committed {
            return Err(ImportError::RecordClosed(index));
        }
        record.status = RecordStatus::Skipped;
        Ok(())
    }

    /// Apply the best suggestion to every unresolved side of every pending
    /// record with an error. Returns the number of corrections made.
    pub fn accept_top_suggestions(&mut self) -> usize {
        let picks: Vec<(usize, TeamSide, String)> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == RecordStatus::Pending && r.has_error)
            .flat_map(|(index, record)| {
                [
                    (TeamSide::Home, &record.resolved_home_team, &record.home_suggestions),
                    (TeamSide::Away, &record.resolved_away_team, &record.away_suggestions),
                ]
                .into_iter()
                .filter(|(_, resolved, _)| resolved.is_none())
                .filter_map(move |(side, _, suggestions)| {
                    suggestions.first().map(|s| (index, side, s.name.clone()))
                })
            })
            .collect();

        let mut applied = 0;
        for (index, side, name) in picks {
            if self.apply_correction(index, side, &name).is_ok() {
                applied += 1;
            }
        }
        applied
    }

    /// True once every record is committed or skipped.
    pub fn is_finished(&self) -> bool {
        self.records.iter().all(|r| r.status != RecordStatus::Pending)
    }

    /// Records eligible for commit.
    pub fn valid_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_committable()).count()
    }

    pub fn error_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.has_error && r.status == RecordStatus::Pending)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.status == RecordStatus::Skipped)
            .count()
    }

    /// One-line status for the notification layer.
    pub fn summary(&self) -> String {
        let mut message = format!(
            "{} row(s) ready to import, {} with errors",
            self.valid_count(),
            self.error_count()
        );
        if self.skipped_count() > 0 {
            message.push_str(&format!(", {} skipped", self.skipped_count()));
        }
        if self.dropped_rows > 0 {
            message.push_str(&format!(", {} short line(s) dropped", self.dropped_rows));
        }
        message
    }

    /// Insert every pending, error-free record in file order, one at a time.
    ///
    /// A record that cannot be resolved or stored is annotated, counted and
    /// skipped; the rest of the batch still runs.
    pub async fn commit(
        &mut self,
        store: &dyn MatchStore,
        roster: &dyn RosterProvider,
    ) -> CommitSummary {
        let teams = match roster.teams_by_league(&self.league_id).await {
            Ok(teams) => teams,
            Err(e) => {
                tracing::warn!(
                    "Roster refresh failed for league {}: {}. Using roster loaded at parse time",
                    self.league_id,
                    e
                );
                self.roster.clone()
            }
        };
        let ids = team_id_map(&teams);

        let mut summary = CommitSummary::default();
        for (index, record) in self.records.iter_mut().enumerate() {
            if !record.is_committable() {
                continue;
            }

            match insert_record(record, &ids, &self.league_id, self.upload_date, store).await {
                Ok(saved) => {
                    tracing::debug!("Row {} stored as match {}", index + 1, saved.id);
                    record.status = RecordStatus::Committed;
                    summary.success_count += 1;
                }
                Err(e) => {
                    tracing::warn!("Row {} not imported: {}", index + 1, e);
                    record.set_error(RowError::new(e.kind(), e.to_string()));
                    summary.error_count += 1;
                }
            }
        }

        tracing::info!(
            "Import {} committed: {} stored, {} failed",
            self.id,
            summary.success_count,
            summary.error_count
        );
        summary
    }

    /// CSV of every record still carrying an error, with its suggestions.
    pub fn export_errors(&self) -> std::result::Result<String, ImportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(EXPORT_HEADER)?;

        for record in self.records.iter().filter(|r| r.has_error) {
            let suggestions = record
                .suggestions()
                .map(|s| format!("{} ({}%)", s.name, s.confidence))
                .collect::<Vec<_>>()
                .join(";");

            let mut row = record.row.to_csv_fields().to_vec();
            row.push(record.error_message.as_deref().unwrap_or(""));
            row.push(&suggestions);
            writer.write_record(&row)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| ImportError::Io(e.into_error()))?;
        Ok(String::from_utf8(bytes)?)
    }
}

impl CommitSummary {
    pub fn message(&self) -> String {
        if self.error_count == 0 {
            format!("Imported {} match(es)", self.success_count)
        } else {
            format!(
                "Imported {} match(es), {} failed",
                self.success_count, self.error_count
            )
        }
    }
}

/// Validate the row, then resolve both team names. A scalar error always
/// wins over a team error; otherwise the first unresolved side is reported.
fn evaluate(record: &mut ImportRecord, matcher: &TeamMatcher) {
    let row_error = validate_row(&record.row);
    let mut team_error: Option<RowError> = None;

    for side in [TeamSide::Home, TeamSide::Away] {
        let raw = record.row.team(side).to_string();
        let result = matcher.match_team(&raw);

        if result.exact_match.is_none() && team_error.is_none() {
            let label = match side {
                TeamSide::Home => "Home",
                TeamSide::Away => "Away",
            };
            team_error = Some(RowError::new(
                ImportErrorKind::TeamNotFound,
                format!("{} team not found: {}", label, raw),
            ));
        }

        match side {
            TeamSide::Home => {
                record.resolved_home_team = result.exact_match;
                record.home_suggestions = result.suggestions;
            }
            TeamSide::Away => {
                record.resolved_away_team = result.exact_match;
                record.away_suggestions = result.suggestions;
            }
        }
    }

    match row_error.or(team_error) {
        Some(error) => record.set_error(error),
        None => record.clear_error(),
    }
}

/// Lowercased roster name to team.
fn team_id_map(teams: &[TeamRef]) -> HashMap<String, &TeamRef> {
    teams
        .iter()
        .map(|t| (t.name.to_lowercase(), t))
        .collect()
}

async fn insert_record(
    record: &ImportRecord,
    ids: &HashMap<String, &TeamRef>,
    league_id: &str,
    upload_date: NaiveDate,
    store: &dyn MatchStore,
) -> std::result::Result<Match, ImportError> {
    let lookup = |side: TeamSide| {
        let name = record.team_name(side);
        ids.get(&name.to_lowercase())
            .copied()
            .ok_or_else(|| ImportError::TeamIdMissing(name.to_string()))
    };
    let home = lookup(TeamSide::Home)?;
    let away = lookup(TeamSide::Away)?;

    let match_time = combine_date_time(upload_date, &record.row.match_time).ok_or_else(|| {
        ImportError::InvalidTimestamp {
            date: upload_date,
            time: record.row.match_time.clone(),
        }
    })?;
    let goals = record.row.goals().ok_or(ImportError::InvalidGoals)?;

    let new_match = NewMatch {
        league_id: league_id.to_string(),
        home_team_id: home.id.clone(),
        away_team_id: away.id.clone(),
        home_team_name: home.name.clone(),
        away_team_name: away.name.clone(),
        match_time,
        goals,
    };

    store
        .insert_match(&new_match)
        .await
        .map_err(ImportError::Database)
}
