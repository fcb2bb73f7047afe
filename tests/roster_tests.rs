#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Roster and team codec tests against a real six-member team.

use showdown_client::team::{self, TeamEncoding, UnsetStats};
use showdown_client::{Roster, ShowdownError, TeamSlot};

const EXPORT: &str = include_str!("fixtures/canonical_team.txt");
const PACKED: &str = include_str!("fixtures/canonical_team.packed");

fn packed() -> &'static str {
    PACKED.trim_end()
}

fn fixture_path(name: &str) -> std::path::PathBuf {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn export_packs_byte_for_byte() {
    let mut roster = Roster::new();
    roster.load_human("gen8ou", EXPORT).unwrap();
    assert_eq!(roster.team_for("gen8ou").unwrap().wire_value(), packed());
}

#[test]
fn export_without_trailing_newline_packs_the_same() {
    assert_eq!(
        team::export_to_packed(EXPORT.trim_end(), UnsetStats::Blank).unwrap(),
        packed()
    );
}

#[test]
fn canonical_team_has_six_members() {
    let sets = team::parse_export(EXPORT).unwrap();
    assert_eq!(sets.len(), 6);
    assert_eq!(sets[0].nickname, "Barry");
    assert_eq!(sets[0].species, "Barraskewda");
    assert!(sets[0].shiny);
    assert_eq!(sets[1].level, Some(99));
    assert!(sets.iter().all(|set| set.moves.len() == 4));
    assert_eq!(packed().split(team::ENTRY_DELIMITER).count(), 6);
}

#[test]
fn explicit_unset_stats_fill_every_blank() {
    let explicit = team::export_to_packed(EXPORT, UnsetStats::Explicit).unwrap();
    let first = explicit.split(team::ENTRY_DELIMITER).next().unwrap();
    assert_eq!(
        first,
        "Barry|Barraskewda|aguavberry|swiftswim|agility,aquajet,brickbreak,closecombat|adamant|0,252,0,0,4,252|M|30,31,30,30,31,30|S||"
    );
}

#[test]
fn files_load_in_either_encoding() {
    let mut roster = Roster::new();
    roster
        .load_file("gen8ou", fixture_path("canonical_team.txt"), None)
        .unwrap();
    roster
        .load_file(
            "gen8uu",
            fixture_path("canonical_team.packed"),
            Some(TeamEncoding::Packed),
        )
        .unwrap();
    assert_eq!(
        roster.team_for("gen8ou"),
        Some(&TeamSlot::Packed(packed().to_owned()))
    );
    assert_eq!(roster.team_for("gen8ou"), roster.team_for("gen8uu"));
}

#[test]
fn no_team_sentinel_survives_both_loaders() {
    let mut roster = Roster::with_no_team_formats(["gen8randombattle"]);

    assert!(matches!(
        roster.load_human("gen8randombattle", EXPORT),
        Err(ShowdownError::NoTeamFormat { .. })
    ));
    assert!(matches!(
        roster.load_packed("gen8randombattle", packed()),
        Err(ShowdownError::NoTeamFormat { .. })
    ));
    assert!(matches!(
        roster.load_file("gen8randombattle", fixture_path("canonical_team.txt"), None),
        Err(ShowdownError::NoTeamFormat { .. })
    ));

    assert_eq!(roster.team_for("gen8randombattle"), Some(&TeamSlot::NoTeam));
}

#[test]
fn malformed_export_keeps_previous_team() {
    let mut roster = Roster::new();
    roster.load_human("gen8ou", EXPORT).unwrap();

    let broken = EXPORT.replace("Level: 99", "Level: ninety-nine");
    let err = roster.load_human("gen8ou", &broken).unwrap_err();
    assert!(matches!(err, ShowdownError::RosterFormat(_)));

    assert_eq!(roster.team_for("gen8ou").unwrap().wire_value(), packed());
}
