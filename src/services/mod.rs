pub mod import_session;
pub mod stats;
pub mod team_matcher;
pub mod tokenizer;
pub mod validator;

pub use import_session::{MatchStore, RosterProvider};
pub use team_matcher::{TeamMatcher, DEFAULT_THRESHOLD, IMPORT_THRESHOLD};
