use anyhow::Result;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::insert_team;
use crate::models::Team;

pub const WINMIX_LEAGUE: &str = "winmix";
pub const EPL_LEAGUE: &str = "EPL";

pub async fn seed_data(pool: &SqlitePool) -> Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM teams")
        .fetch_one(pool)
        .await?;

    if count > 0 {
        tracing::info!("Database already seeded ({} teams found), skipping.", count);
        return Ok(());
    }

    tracing::info!("Seeding database with league rosters...");

    let winmix = seed_league(pool, WINMIX_LEAGUE, "winmix", &WINMIX_TEAMS).await?;
    let epl = seed_league(pool, EPL_LEAGUE, "epl", &EPL_TEAMS).await?;

    tracing::info!("Database seeded successfully: {} winmix teams, {} EPL teams", winmix, epl);
    Ok(())
}

// Virtual Spanish league the CSV uploads target by default.
const WINMIX_TEAMS: [&str; 16] = [
    "Real Madrid",
    "Barcelona",
    "Atletico Madrid",
    "Valencia",
    "Sevilla",
    "Villarreal",
    "Real Betis",
    "Real Sociedad",
    "Athletic Bilbao",
    "Getafe",
    "Osasuna",
    "Celta Vigo",
    "Girona",
    "Mallorca",
    "Las Palmas",
    "Alaves",
];

const EPL_TEAMS: [&str; 20] = [
    "Arsenal",
    "Liverpool",
    "Manchester City",
    "Chelsea",
    "Aston Villa",
    "Tottenham Hotspur",
    "Newcastle United",
    "Manchester United",
    "Brighton",
    "West Ham United",
    "Everton",
    "Fulham",
    "Crystal Palace",
    "Brentford",
    "Wolves",
    "Nottingham Forest",
    "Bournemouth",
    "Leicester City",
    "Ipswich Town",
    "Southampton",
];

async fn seed_league(pool: &SqlitePool, league: &str, id_prefix: &str, names: &[&str]) -> Result<usize> {
    let now = Utc::now();

    for (i, name) in names.iter().enumerate() {
        let team = Team {
            id: format!("{}_{}", id_prefix, i + 1),
            name: name.to_string(),
            league: league.to_string(),
            created_at: now,
            updated_at: now,
        };
        insert_team(pool, &team).await?;
    }

    Ok(names.len())
}
