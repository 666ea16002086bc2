pub mod seed;
pub use seed::seed_data;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::{SqliteConnectOptions, SqliteRow}, Row, SqlitePool};
use std::str::FromStr;

use crate::config::Config;
use crate::models::*;
use crate::services::{MatchStore, RosterProvider};
use crate::settings::KeyValueStore;

pub async fn clear_all_data(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM matches").execute(pool).await?;
    sqlx::query("DELETE FROM teams").execute(pool).await?;
    tracing::info!("All data cleared");
    Ok(())
}

pub async fn create_pool() -> Result<SqlitePool> {
    create_pool_with_url(&Config::from_env().database_url).await
}

pub async fn create_pool_with_url(database_url: &str) -> Result<SqlitePool> {
    // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);

    if !file_path.starts_with(":memory:") {
        if let Some(parent) = std::path::Path::new(file_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

/// Schema creation is idempotent; the server and every CLI command run it on
/// the pool they already hold.
pub async fn init_database_with_pool(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            league TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            id TEXT PRIMARY KEY,
            league TEXT NOT NULL,
            home_team_id TEXT NOT NULL,
            away_team_id TEXT NOT NULL,
            home_team_name TEXT NOT NULL,
            away_team_name TEXT NOT NULL,
            match_date TEXT NOT NULL,
            half_time_home_goals INTEGER NOT NULL,
            half_time_away_goals INTEGER NOT NULL,
            home_score INTEGER NOT NULL,
            away_score INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (home_team_id) REFERENCES teams (id),
            FOREIGN KEY (away_team_id) REFERENCES teams (id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // settings: key-value store behind user preferences
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(match_date)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_matches_teams ON matches(home_team_id, away_team_id)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_teams_league ON teams(league)")
        .execute(pool)
        .await?;

    tracing::info!("Database initialized successfully");
    Ok(())
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<chrono::DateTime<Utc>> {
    Ok(chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>(column))?.with_timezone(&Utc))
}

fn team_from_row(row: &SqliteRow) -> Result<Team> {
    Ok(Team {
        id: row.get("id"),
        name: row.get("name"),
        league: row.get("league"),
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn match_from_row(row: &SqliteRow) -> Result<Match> {
    Ok(Match {
        id: row.get("id"),
        league: row.get("league"),
        home_team_id: row.get("home_team_id"),
        away_team_id: row.get("away_team_id"),
        home_team_name: row.get("home_team_name"),
        away_team_name: row.get("away_team_name"),
        match_date: parse_timestamp(row, "match_date")?,
        half_time_home_goals: row.get("half_time_home_goals"),
        half_time_away_goals: row.get("half_time_away_goals"),
        home_score: row.get("home_score"),
        away_score: row.get("away_score"),
        created_at: parse_timestamp(row, "created_at")?,
    })
}

// Team operations
pub async fn insert_team(pool: &SqlitePool, team: &Team) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO teams
        (id, name, league, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&team.id)
    .bind(&team.name)
    .bind(&team.league)
    .bind(team.created_at.to_rfc3339())
    .bind(team.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_team_by_id(pool: &SqlitePool, team_id: &str) -> Result<Option<Team>> {
    let row = sqlx::query("SELECT * FROM teams WHERE id = ?")
        .bind(team_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(team_from_row).transpose()
}

pub async fn get_teams_by_league(pool: &SqlitePool, league: &str) -> Result<Vec<Team>> {
    let rows = sqlx::query("SELECT * FROM teams WHERE league = ? ORDER BY name")
        .bind(league)
        .fetch_all(pool)
        .await?;

    rows.iter().map(team_from_row).collect()
}

/// Case-insensitive substring search across all leagues.
pub async fn find_teams_by_name(pool: &SqlitePool, name: &str) -> Result<Vec<Team>> {
    let rows = sqlx::query("SELECT * FROM teams WHERE LOWER(name) LIKE LOWER(?) ORDER BY league, name")
        .bind(format!("%{}%", name.trim()))
        .fetch_all(pool)
        .await?;

    rows.iter().map(team_from_row).collect()
}

fn goal_column(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| anyhow::anyhow!("Goal count {} does not fit the matches table", value))
}

// Match operations
pub async fn insert_match(pool: &SqlitePool, new_match: &NewMatch) -> Result<Match> {
    let match_data = Match {
        id: uuid::Uuid::new_v4().to_string(),
        league: new_match.league_id.clone(),
        home_team_id: new_match.home_team_id.clone(),
        away_team_id: new_match.away_team_id.clone(),
        home_team_name: new_match.home_team_name.clone(),
        away_team_name: new_match.away_team_name.clone(),
        match_date: new_match.match_time,
        half_time_home_goals: goal_column(new_match.goals.half_time_home)?,
        half_time_away_goals: goal_column(new_match.goals.half_time_away)?,
        home_score: goal_column(new_match.goals.full_time_home)?,
        away_score: goal_column(new_match.goals.full_time_away)?,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO matches
        (id, league, home_team_id, away_team_id, home_team_name, away_team_name,
         match_date, half_time_home_goals, half_time_away_goals, home_score, away_score, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&match_data.id)
    .bind(&match_data.league)
    .bind(&match_data.home_team_id)
    .bind(&match_data.away_team_id)
    .bind(&match_data.home_team_name)
    .bind(&match_data.away_team_name)
    .bind(match_data.match_date.to_rfc3339())
    .bind(match_data.half_time_home_goals)
    .bind(match_data.half_time_away_goals)
    .bind(match_data.home_score)
    .bind(match_data.away_score)
    .bind(match_data.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(match_data)
}

pub async fn get_matches_for_team(pool: &SqlitePool, team_id: &str) -> Result<Vec<Match>> {
    let rows = sqlx::query(
        r#"SELECT * FROM matches
           WHERE home_team_id = ? OR away_team_id = ?
           ORDER BY match_date DESC"#,
    )
    .bind(team_id)
    .bind(team_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(match_from_row).collect()
}

pub async fn get_head_to_head(pool: &SqlitePool, team_a_id: &str, team_b_id: &str) -> Result<Vec<Match>> {
    let rows = sqlx::query(
        r#"SELECT * FROM matches
           WHERE (home_team_id = ? AND away_team_id = ?)
              OR (home_team_id = ? AND away_team_id = ?)
           ORDER BY match_date DESC"#,
    )
    .bind(team_a_id)
    .bind(team_b_id)
    .bind(team_b_id)
    .bind(team_a_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(match_from_row).collect()
}

// Collaborator implementations used by the importer and settings

#[derive(Clone)]
pub struct SqliteRoster {
    pool: SqlitePool,
}

impl SqliteRoster {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RosterProvider for SqliteRoster {
    async fn teams_by_league(&self, league_id: &str) -> Result<Vec<TeamRef>> {
        let teams = get_teams_by_league(&self.pool, league_id).await?;
        Ok(teams.iter().map(TeamRef::from).collect())
    }
}

#[derive(Clone)]
pub struct SqliteMatchStore {
    pool: SqlitePool,
}

impl SqliteMatchStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchStore for SqliteMatchStore {
    async fn insert_match(&self, new_match: &NewMatch) -> Result<Match> {
        insert_match(&self.pool, new_match).await
    }
}

#[derive(Clone)]
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET
                   value      = excluded.value,
                   updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    // One connection: every new connection to :memory: is a fresh database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_database_with_pool(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    use crate::settings::Settings;

    fn team(id: &str, name: &str, league: &str) -> Team {
        Team {
            id: id.to_string(),
            name: name.to_string(),
            league: league.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn new_match(home: &Team, away: &Team, day: u32, score: (u32, u32)) -> NewMatch {
        NewMatch {
            league_id: home.league.clone(),
            home_team_id: home.id.clone(),
            away_team_id: away.id.clone(),
            home_team_name: home.name.clone(),
            away_team_name: away.name.clone(),
            match_time: Utc.with_ymd_and_hms(2024, 3, day, 20, 0, 0).unwrap(),
            goals: Goals {
                half_time_home: 0,
                half_time_away: 0,
                full_time_home: score.0,
                full_time_away: score.1,
            },
        }
    }

    #[tokio::test]
    async fn test_teams_by_league_and_name_search() {
        let pool = memory_pool().await;
        insert_team(&pool, &team("w1", "Real Madrid", "winmix")).await.unwrap();
        insert_team(&pool, &team("w2", "Barcelona", "winmix")).await.unwrap();
        insert_team(&pool, &team("e1", "Arsenal", "EPL")).await.unwrap();

        let winmix = get_teams_by_league(&pool, "winmix").await.unwrap();
        let names: Vec<&str> = winmix.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Barcelona", "Real Madrid"]);

        let found = find_teams_by_name(&pool, "madrid").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "w1");
        assert!(get_team_by_id(&pool, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_match_and_head_to_head() {
        let pool = memory_pool().await;
        let rma = team("w1", "Real Madrid", "winmix");
        let bar = team("w2", "Barcelona", "winmix");
        insert_team(&pool, &rma).await.unwrap();
        insert_team(&pool, &bar).await.unwrap();

        insert_match(&pool, &new_match(&rma, &bar, 1, (2, 1))).await.unwrap();
        insert_match(&pool, &new_match(&bar, &rma, 8, (0, 0))).await.unwrap();

        let h2h = get_head_to_head(&pool, "w2", "w1").await.unwrap();
        assert_eq!(h2h.len(), 2);
        assert_eq!(h2h[0].home_team_id, "w2");
        assert_eq!(h2h[1].home_score, 2);

        let for_team = get_matches_for_team(&pool, "w1").await.unwrap();
        assert_eq!(for_team.len(), 2);
    }

    #[tokio::test]
    async fn test_import_commit_through_sqlite() {
        let pool = memory_pool().await;
        insert_team(&pool, &team("w1", "Real Madrid", "winmix")).await.unwrap();
        insert_team(&pool, &team("w2", "Barcelona", "winmix")).await.unwrap();

        let roster = SqliteRoster::new(pool.clone());
        let store = SqliteMatchStore::new(pool.clone());
        let text = "match_time,home_team,away_team,half_time_home_goals,half_time_away_goals,full_time_home_goals,full_time_away_goals\n\
                    20:45,Real Madrid CF,barcelona,1,0,2,1\n\
                    18:30,Barca,real madrid,0,0,0,0";
        let date = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();

        let mut session = ImportSession::start(text, "winmix", date, &roster, 0.6).await.unwrap();
        assert_eq!(session.valid_count(), 2);

        let summary = session.commit(&store, &roster).await;
        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.error_count, 0);

        let stored = get_matches_for_team(&pool, "w1").await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].home_team_name, "Barcelona");
        assert_eq!(stored[0].home_team_name, "Real Madrid");
        assert_eq!(stored[0].match_date, Utc.with_ymd_and_hms(2024, 4, 20, 20, 45, 0).unwrap());
    }

    #[tokio::test]
    async fn test_oversized_goal_count_is_never_stored() {
        let pool = memory_pool().await;
        let rma = team("w1", "Real Madrid", "winmix");
        let bar = team("w2", "Barcelona", "winmix");
        insert_team(&pool, &rma).await.unwrap();
        insert_team(&pool, &bar).await.unwrap();

        let roster = SqliteRoster::new(pool.clone());
        let store = SqliteMatchStore::new(pool.clone());
        let text = "match_time,home_team,away_team,half_time_home_goals,half_time_away_goals,full_time_home_goals,full_time_away_goals\n\
                    20:45,Real Madrid,Barcelona,0,0,3000000000,1";
        let date = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();

        let mut session = ImportSession::start(text, "winmix", date, &roster, 0.6).await.unwrap();
        assert!(session.records[0].has_error);
        assert_eq!(session.records[0].error_kind, Some(ImportErrorKind::InvalidGoals));

        let summary = session.commit(&store, &roster).await;
        assert_eq!(summary, CommitSummary::default());
        assert!(get_matches_for_team(&pool, "w1").await.unwrap().is_empty());

        let mut oversized = new_match(&rma, &bar, 1, (0, 0));
        oversized.goals.full_time_home = u32::MAX;
        assert!(insert_match(&pool, &oversized).await.is_err());
        assert!(get_matches_for_team(&pool, "w1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_settings_persist_in_sqlite() {
        let pool = memory_pool().await;
        let store = SqliteKeyValueStore::new(pool);
        let mut settings = Settings::load(&store).await;
        settings.default_league = Some("EPL".to_string());
        settings.save(&store).await.unwrap();
        settings.add_favorite("Arsenal");
        settings.save(&store).await.unwrap();

        let loaded = Settings::load(&store).await;
        assert_eq!(loaded.default_league.as_deref(), Some("EPL"));
        assert_eq!(loaded.favorite_teams, vec!["Arsenal".to_string()]);
    }
}
