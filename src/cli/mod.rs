use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use std::path::PathBuf;

use crate::db::{
    self, create_pool, find_teams_by_name, get_head_to_head, get_matches_for_team,
    get_teams_by_league, SqliteKeyValueStore, SqliteMatchStore, SqliteRoster,
};
use crate::models::{ImportSession, RecordStatus, Team};
use crate::services::stats::{head_to_head, team_record};
use crate::services::TeamMatcher;
use crate::settings::{Settings, FALLBACK_LEAGUE};
use crate::utils::{percentage, points_percentage, result_for_team};

pub struct ImportOptions {
    pub file: PathBuf,
    pub league: Option<String>,
    pub date: Option<NaiveDate>,
    pub threshold: Option<f64>,
    pub accept_suggestions: bool,
    pub dry_run: bool,
    pub errors_out: Option<PathBuf>,
}

#[derive(Default)]
pub struct SettingsUpdate {
    pub default_league: Option<String>,
    pub import_threshold: Option<f64>,
    pub match_threshold: Option<f64>,
    pub add_favorite: Option<String>,
    pub remove_favorite: Option<String>,
}

impl SettingsUpdate {
    fn is_empty(&self) -> bool {
        self.default_league.is_none()
            && self.import_threshold.is_none()
            && self.match_threshold.is_none()
            && self.add_favorite.is_none()
            && self.remove_favorite.is_none()
    }
}

async fn open_database() -> Result<SqlitePool> {
    let pool = create_pool().await?;
    db::init_database_with_pool(&pool).await?;
    Ok(pool)
}

pub async fn init_db(reset: bool) -> Result<()> {
    let pool = open_database().await?;
    if reset {
        db::clear_all_data(&pool).await?;
        println!("🧹 Removed all teams and matches");
    }
    println!("✅ Database ready");
    Ok(())
}

pub async fn seed() -> Result<()> {
    let pool = open_database().await?;
    db::seed_data(&pool).await?;
    println!("🌱 Rosters loaded. Try: winmix match --name \"Valenzia\" --league winmix");
    Ok(())
}

pub async fn import_file(options: ImportOptions) -> Result<()> {
    let pool = open_database().await?;
    let settings = Settings::load(&SqliteKeyValueStore::new(pool.clone())).await;

    let league = settings.league_or_default(options.league);
    let threshold = options.threshold.unwrap_or(settings.import_threshold);
    let date = options.date.unwrap_or_else(|| Utc::now().date_naive());

    let text = tokio::fs::read_to_string(&options.file)
        .await
        .with_context(|| format!("reading {}", options.file.display()))?;

    println!("📥 Importing {} into league '{}' ({})", options.file.display(), league, date);

    let roster = SqliteRoster::new(pool.clone());
    let mut session = ImportSession::start(&text, &league, date, &roster, threshold).await?;

    if session.roster.is_empty() {
        println!("⚠️  League '{}' has no teams. Run `winmix seed` or check the league name.", league);
    }

    if options.accept_suggestions {
        let applied = session.accept_top_suggestions();
        if applied > 0 {
            println!("🪄 Applied {} suggested team name(s)", applied);
        }
    }

    println!("📋 {}", session.summary());
    print_errors(&session);

    if let Some(path) = &options.errors_out {
        if session.error_count() > 0 {
            let csv = session.export_errors()?;
            tokio::fs::write(path, csv)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("📝 Wrote failed rows to {}", path.display());
        }
    }

    if options.dry_run {
        println!("\n🔍 Dry run, nothing stored.");
        return Ok(());
    }

    if session.valid_count() == 0 {
        println!("\n📭 No valid rows to import.");
        return Ok(());
    }

    let store = SqliteMatchStore::new(pool.clone());
    let summary = session.commit(&store, &roster).await;

    if summary.error_count == 0 {
        println!("\n✅ {}", summary.message());
    } else {
        println!("\n⚠️  {}", summary.message());
        for (i, record) in session.records.iter().enumerate() {
            if record.status == RecordStatus::Pending && record.has_error {
                println!(
                    "   Row {}: {}",
                    i + 1,
                    record.error_message.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }

    Ok(())
}

fn print_errors(session: &ImportSession) {
    let failed: Vec<_> = session
        .records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.has_error && r.status == RecordStatus::Pending)
        .collect();

    if failed.is_empty() {
        return;
    }

    println!("\n❌ Rows needing attention:");
    for (i, record) in failed {
        println!(
            "{:>4}. {} {} vs {}: {}",
            i + 1,
            record.row.match_time,
            record.row.home_team,
            record.row.away_team,
            record.error_message.as_deref().unwrap_or("unknown error")
        );
        for suggestion in record.suggestions() {
            println!(
                "        💡 {} ({}%, {})",
                suggestion.name,
                suggestion.confidence,
                suggestion.reason.label()
            );
        }
    }
}

pub async fn match_team(name: &str, league: Option<String>, threshold: Option<f64>) -> Result<()> {
    let pool = open_database().await?;
    let settings = Settings::load(&SqliteKeyValueStore::new(pool.clone())).await;

    let league = settings.league_or_default(league);
    let threshold = threshold.unwrap_or(settings.match_threshold);

    let teams = get_teams_by_league(&pool, &league).await?;
    if teams.is_empty() {
        println!("❌ No teams found for league '{}'", league);
        return Ok(());
    }

    let matcher = TeamMatcher::new(teams.iter().map(|t| t.name.clone()), threshold);
    let result = matcher.match_team(name);

    println!("🔍 Matching '{}' against {} teams in '{}'", name, matcher.roster_len(), league);
    match result.exact_match {
        Some(exact) => println!("✅ Exact match: {}", exact),
        None if result.suggestions.is_empty() => {
            println!("❌ No team matches '{}' above {:.0}%", name, matcher.threshold() * 100.0)
        }
        None => {
            println!("💡 Did you mean:");
            for (i, suggestion) in result.suggestions.iter().enumerate() {
                println!(
                    "{}. {} ({}%, {})",
                    i + 1,
                    suggestion.name,
                    suggestion.confidence,
                    suggestion.reason.label()
                );
            }
        }
    }

    Ok(())
}

/// Prefer a case-insensitive exact name, then the first partial match.
async fn resolve_team(pool: &SqlitePool, name: &str) -> Result<Option<Team>> {
    let mut teams = find_teams_by_name(pool, name).await?;
    let wanted = name.trim().to_lowercase();
    let exact = teams.iter().position(|t| t.name.to_lowercase() == wanted);
    Ok(match exact {
        Some(i) => Some(teams.swap_remove(i)),
        None => teams.into_iter().next(),
    })
}

pub async fn query_team(team_name: &str) -> Result<()> {
    let pool = open_database().await?;
    let settings = Settings::load(&SqliteKeyValueStore::new(pool.clone())).await;

    println!("🔍 Searching for team: {}", team_name);

    let Some(team) = resolve_team(&pool, team_name).await? else {
        println!("❌ No teams found matching '{}'", team_name);
        return Ok(());
    };

    let matches = get_matches_for_team(&pool, &team.id).await?;
    let record = team_record(&team.id, &matches);
    let star = if settings.is_favorite(&team.name) { " ⭐" } else { "" };

    println!("📊 Team Details:");
    println!("   Name: {}{}", team.name, star);
    println!("   League: {}", team.league);
    println!(
        "   Record: {}W {}D {}L in {} matches ({:.1}% of points)",
        record.wins,
        record.draws,
        record.losses,
        record.played,
        points_percentage(record.wins, record.draws, record.losses)
    );
    println!("   Goals: {} for, {} against", record.goals_for, record.goals_against);
    println!(
        "   BTTS: {} of {} ({:.1}%)",
        record.btts,
        record.played,
        percentage(record.btts, record.played)
    );
    if !record.form.is_empty() {
        println!("   Form: {}", record.form);
    }

    println!("\n📅 Recent Matches:");
    if matches.is_empty() {
        println!("   No matches imported yet");
    }
    for match_data in matches.iter().take(5) {
        let (venue, opponent) = if match_data.home_team_id == team.id {
            ("vs", &match_data.away_team_name)
        } else {
            ("at", &match_data.home_team_name)
        };
        println!(
            "   {} {} {} ({}-{}) {}",
            match_data.match_date.format("%m/%d %H:%M"),
            venue,
            opponent,
            match_data.home_score,
            match_data.away_score,
            result_for_team(match_data, &team.id).unwrap_or('?')
        );
    }

    Ok(())
}

pub async fn query_head_to_head(home: &str, away: &str) -> Result<()> {
    let pool = open_database().await?;

    let (Some(team_a), Some(team_b)) = (resolve_team(&pool, home).await?, resolve_team(&pool, away).await?) else {
        println!("❌ Both teams must exist. Try `winmix team --name <name>` first.");
        return Ok(());
    };

    let meetings = get_head_to_head(&pool, &team_a.id, &team_b.id).await?;
    let h2h = head_to_head(&team_a.id, &team_b.id, &meetings);

    println!("⚔️  {} vs {}", team_a.name, team_b.name);
    if h2h.played == 0 {
        println!("   No meetings imported yet");
        return Ok(());
    }

    println!(
        "   Played {}: {} {} wins, {} {} wins, {} draws",
        h2h.played, team_a.name, h2h.team_a_wins, team_b.name, h2h.team_b_wins, h2h.draws
    );
    println!("   BTTS: {:.1}%", percentage(h2h.btts, h2h.played));
    for m in h2h.matches.iter().take(10) {
        println!(
            "   {} {} {}-{} {} (HT {}-{})",
            m.match_date.format("%Y-%m-%d"),
            m.home_team_name,
            m.home_score,
            m.away_score,
            m.away_team_name,
            m.half_time_home_goals,
            m.half_time_away_goals
        );
    }

    Ok(())
}

pub async fn settings(update: SettingsUpdate) -> Result<()> {
    let pool = open_database().await?;
    let store = SqliteKeyValueStore::new(pool);
    let mut settings = Settings::load(&store).await;

    if !update.is_empty() {
        if let Some(league) = update.default_league {
            settings.default_league = Some(league);
        }
        if let Some(value) = update.import_threshold {
            settings.set_import_threshold(value);
        }
        if let Some(value) = update.match_threshold {
            settings.set_match_threshold(value);
        }
        if let Some(team) = update.add_favorite {
            if !settings.add_favorite(&team) {
                println!("ℹ️  {} is already a favourite", team);
            }
        }
        if let Some(team) = update.remove_favorite {
            if !settings.remove_favorite(&team) {
                println!("ℹ️  {} was not a favourite", team);
            }
        }
        settings.save(&store).await?;
        println!("✅ Settings saved");
    }

    println!("⚙️  Settings:");
    println!(
        "   Default league: {}",
        settings.default_league.as_deref().unwrap_or(FALLBACK_LEAGUE)
    );
    println!("   Import threshold: {:.2}", settings.import_threshold);
    println!("   Match threshold: {:.2}", settings.match_threshold);
    if settings.favorite_teams.is_empty() {
        println!("   Favourite teams: none");
    } else {
        println!("   Favourite teams: {}", settings.favorite_teams.join(", "));
    }

    Ok(())
}
