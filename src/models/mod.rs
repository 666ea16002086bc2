use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub league: String, // "winmix", "EPL", ...
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The slice of a team the importer cares about: roster name and its database ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: String,
    pub name: String,
}

impl From<&Team> for TeamRef {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id.clone(),
            name: team.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Match {
    pub id: String,
    pub league: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub match_date: DateTime<Utc>,
    pub half_time_home_goals: i32,
    pub half_time_away_goals: i32,
    pub home_score: i32,
    pub away_score: i32,
    pub created_at: DateTime<Utc>,
}

impl Match {
    /// BTTS: both full-time scores above zero.
    pub fn both_teams_scored(&self) -> bool {
        self.home_score > 0 && self.away_score > 0
    }
}

/// Insert payload built by the importer once both team IDs are known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMatch {
    pub league_id: String,
    pub home_team_id: String,
    pub away_team_id: String,
    pub home_team_name: String,
    pub away_team_name: String,
    pub match_time: DateTime<Utc>,
    pub goals: Goals,
}

/// HT/FT score pair for both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goals {
    pub half_time_home: u32,
    pub half_time_away: u32,
    pub full_time_home: u32,
    pub full_time_away: u32,
}

// ── CSV import ───────────────────────────────────────────────────────────────

pub const CSV_COLUMNS: usize = 7;

/// One CSV data line after tokenization. Goal cells keep their raw text so a
/// bad value can be echoed back in the error export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRow {
    pub match_time: String,
    pub home_team: String,
    pub away_team: String,
    pub half_time_home_goals: String,
    pub half_time_away_goals: String,
    pub full_time_home_goals: String,
    pub full_time_away_goals: String,
}

impl ParsedRow {
    /// Builds a row from tokenized fields; `None` when the line is too short.
    pub fn from_fields(fields: &[String]) -> Option<Self> {
        if fields.len() < CSV_COLUMNS {
            return None;
        }
        Some(Self {
            match_time: fields[0].clone(),
            home_team: fields[1].clone(),
            away_team: fields[2].clone(),
            half_time_home_goals: fields[3].clone(),
            half_time_away_goals: fields[4].clone(),
            full_time_home_goals: fields[5].clone(),
            full_time_away_goals: fields[6].clone(),
        })
    }

    pub fn goals(&self) -> Option<Goals> {
        Some(Goals {
            half_time_home: parse_goal(&self.half_time_home_goals)?,
            half_time_away: parse_goal(&self.half_time_away_goals)?,
            full_time_home: parse_goal(&self.full_time_home_goals)?,
            full_time_away: parse_goal(&self.full_time_away_goals)?,
        })
    }

    pub fn team(&self, side: TeamSide) -> &str {
        match side {
            TeamSide::Home => &self.home_team,
            TeamSide::Away => &self.away_team,
        }
    }

    pub fn to_csv_fields(&self) -> [&str; CSV_COLUMNS] {
        [
            self.match_time.as_str(),
            self.home_team.as_str(),
            self.away_team.as_str(),
            self.half_time_home_goals.as_str(),
            self.half_time_away_goals.as_str(),
            self.full_time_home_goals.as_str(),
            self.full_time_away_goals.as_str(),
        ]
    }
}

/// Largest goal count that fits the INTEGER columns of `matches`.
pub const MAX_GOALS: u32 = i32::MAX as u32;

/// Non-negative integer goal count, surrounding whitespace ignored.
pub fn parse_goal(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|g| *g <= MAX_GOALS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    Home,
    Away,
}

impl TeamSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Away => "away",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportErrorKind {
    TeamNotFound,
    InvalidTime,
    InvalidGoals,
    // Declared for parity with the export format; no rule raises it yet.
    Duplicate,
    DatabaseError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionReason {
    VeryCloseMatch,
    CloseMatch,
    PossibleMatch,
    ContainsMatch,
}

impl SuggestionReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::VeryCloseMatch => "Very close match",
            Self::CloseMatch => "Close match",
            Self::PossibleMatch => "Possible match",
            Self::ContainsMatch => "Contains match",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSuggestion {
    pub name: String,
    pub confidence: u8, // 0-100
    pub reason: SuggestionReason,
}

/// Result of resolving one raw name against a roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMatch {
    pub exact_match: Option<String>,
    pub suggestions: Vec<TeamSuggestion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub kind: ImportErrorKind,
    pub message: String,
}

impl RowError {
    pub fn new(kind: ImportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Skipped,
    Committed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRecord {
    #[serde(flatten)]
    pub row: ParsedRow,
    pub has_error: bool,
    pub error_message: Option<String>,
    pub error_kind: Option<ImportErrorKind>,
    pub home_suggestions: Vec<TeamSuggestion>,
    pub away_suggestions: Vec<TeamSuggestion>,
    /// Roster spelling found by exact or alias match.
    pub resolved_home_team: Option<String>,
    pub resolved_away_team: Option<String>,
    pub corrected_home_team: Option<String>,
    pub corrected_away_team: Option<String>,
    pub status: RecordStatus,
}

impl ImportRecord {
    pub fn new(row: ParsedRow) -> Self {
        Self {
            row,
            has_error: false,
            error_message: None,
            error_kind: None,
            home_suggestions: Vec::new(),
            away_suggestions: Vec::new(),
            resolved_home_team: None,
            resolved_away_team: None,
            corrected_home_team: None,
            corrected_away_team: None,
            status: RecordStatus::Pending,
        }
    }

    pub fn set_error(&mut self, error: RowError) {
        self.has_error = true;
        self.error_kind = Some(error.kind);
        self.error_message = Some(error.message);
    }

    pub fn clear_error(&mut self) {
        self.has_error = false;
        self.error_kind = None;
        self.error_message = None;
    }

    /// Home suggestions first, then away.
    pub fn suggestions(&self) -> impl Iterator<Item = &TeamSuggestion> {
        self.home_suggestions.iter().chain(self.away_suggestions.iter())
    }

    /// Name to look up in the roster at commit time.
    pub fn team_name(&self, side: TeamSide) -> &str {
        let resolved = match side {
            TeamSide::Home => self.resolved_home_team.as_deref(),
            TeamSide::Away => self.resolved_away_team.as_deref(),
        };
        resolved.unwrap_or_else(|| self.row.team(side))
    }

    pub fn is_committable(&self) -> bool {
        self.status == RecordStatus::Pending && !self.has_error
    }
}

/// All records parsed from one uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSession {
    pub id: String,
    pub league_id: String,
    pub upload_date: NaiveDate,
    pub records: Vec<ImportRecord>,
    /// Data lines with fewer than seven fields.
    pub dropped_rows: usize,
    /// Roster the records were matched against.
    #[serde(skip)]
    pub roster: Vec<TeamRef>,
    pub threshold: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub success_count: usize,
    pub error_count: usize,
}

// ── Statistics ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub team_id: String,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub btts: u32,
    pub form: String, // Last 5 games, newest first: "WLWDW"
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeadToHead {
    pub team_a_id: String,
    pub team_b_id: String,
    pub played: u32,
    pub team_a_wins: u32,
    pub team_b_wins: u32,
    pub draws: u32,
    pub btts: u32,
    pub matches: Vec<Match>,
}

// API Response types
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}
