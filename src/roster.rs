//! Per-format team registry used when answering challenges.
//!
//! Each battle format maps either to a packed team or to the "no team
//! required" sentinel (random-battle style formats where the server builds
//! the team). Sentinel entries are never overwritten. Teams live in memory
//! for the lifetime of the client.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{Result, ShowdownError};
use crate::team::{self, TeamEncoding, UnsetStats};

/// Team value sent for formats that need no team.
pub const NO_TEAM: &str = "null";

/// What the roster holds for one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamSlot {
    /// A packed team string.
    Packed(String),
    /// The format needs no team.
    NoTeam,
}

impl TeamSlot {
    /// The value declared with `/utm`.
    pub fn wire_value(&self) -> &str {
        match self {
            Self::Packed(team) => team,
            Self::NoTeam => NO_TEAM,
        }
    }
}

/// Mapping from format name to team.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    teams: HashMap<String, TeamSlot>,
    unset_stats: UnsetStats,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a roster with `formats` pre-registered as needing no team.
    pub fn with_no_team_formats<I, S>(formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut roster = Self::new();
        for format in formats {
            roster.register_no_team(format);
        }
        roster
    }

    /// Set how unmentioned EVs/IVs are written by [`load_human`](Self::load_human).
    #[must_use]
    pub fn with_unset_stats(mut self, unset_stats: UnsetStats) -> Self {
        self.unset_stats = unset_stats;
        self
    }

    /// Mark `format` as needing no team, replacing any stored team.
    pub fn register_no_team(&mut self, format: impl Into<String>) {
        self.teams.insert(format.into(), TeamSlot::NoTeam);
    }

    /// The entry for `format`, if any.
    pub fn team_for(&self, format: &str) -> Option<&TeamSlot> {
        self.teams.get(format)
    }

    /// Formats with an entry, in no particular order.
    pub fn formats(&self) -> impl Iterator<Item = &str> {
        self.teams.keys().map(String::as_str)
    }

    /// Store already-packed text verbatim as the team for `format`.
    ///
    /// # Errors
    ///
    /// - [`ShowdownError::NoTeamFormat`] if `format` is a sentinel format.
    /// - [`ShowdownError::RosterFormat`] if the text is not a packed team.
    ///
    /// The roster is unchanged on error.
    pub fn load_packed(&mut self, format: &str, raw: &str) -> Result<()> {
        self.guard_sentinel(format)?;
        team::validate_packed(raw)?;
        self.store(format, raw.to_owned());
        Ok(())
    }

    /// Parse export text, pack it, and store it as the team for `format`.
    ///
    /// # Errors
    ///
    /// - [`ShowdownError::NoTeamFormat`] if `format` is a sentinel format.
    /// - [`ShowdownError::RosterFormat`] if the text does not parse.
    ///
    /// The roster is unchanged on error.
    pub fn load_human(&mut self, format: &str, raw: &str) -> Result<()> {
        self.guard_sentinel(format)?;
        let packed = team::export_to_packed(raw, self.unset_stats)?;
        self.store(format, packed);
        Ok(())
    }

    /// Read a team file and load it for `format`.
    ///
    /// Trailing newlines are stripped before the text is handed to
    /// [`load_packed`](Self::load_packed) or [`load_human`](Self::load_human).
    /// Pass `None` to pick the loader with [`TeamEncoding::detect`].
    ///
    /// # Errors
    ///
    /// [`ShowdownError::Io`] if the file cannot be read, otherwise as the
    /// chosen loader.
    pub fn load_file(
        &mut self,
        format: &str,
        path: impl AsRef<Path>,
        encoding: Option<TeamEncoding>,
    ) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let text = text.trim_end_matches(['\r', '\n']);
        let encoding = encoding.unwrap_or_else(|| TeamEncoding::detect(text));
        debug!(format, path = %path.display(), ?encoding, "loading team file");
        match encoding {
            TeamEncoding::Packed => self.load_packed(format, text),
            TeamEncoding::Export => self.load_human(format, text),
        }
    }

    fn guard_sentinel(&self, format: &str) -> Result<()> {
        match self.teams.get(format) {
            Some(TeamSlot::NoTeam) => Err(ShowdownError::NoTeamFormat {
                format: format.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    fn store(&mut self, format: &str, packed: String) {
        info!(format, members = packed.split(team::ENTRY_DELIMITER).count(), "team loaded");
        self.teams
            .insert(format.to_owned(), TeamSlot::Packed(packed));
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    const PACKED: &str = "Pikachu||lightball|static|thunderbolt,surf||,,,,,||,,,,,|||";

    #[test]
    fn load_packed_stores_verbatim() {
        let mut roster = Roster::new();
        roster.load_packed("gen8ou", PACKED).unwrap();
        assert_eq!(
            roster.team_for("gen8ou"),
            Some(&TeamSlot::Packed(PACKED.to_owned()))
        );
    }

    #[test]
    fn load_packed_replaces_previous_team() {
        let mut roster = Roster::new();
        roster.load_packed("gen8ou", PACKED).unwrap();
        roster
            .load_human("gen8ou", "Raichu @ Life Orb\n- Surf")
            .unwrap();
        assert_eq!(
            roster.team_for("gen8ou").unwrap().wire_value(),
            "Raichu||lifeorb||surf||,,,,,||,,,,,|||"
        );
    }

    #[test]
    fn sentinel_is_never_overwritten() {
        let mut roster = Roster::with_no_team_formats(["gen8randombattle"]);

        let err = roster.load_packed("gen8randombattle", PACKED).unwrap_err();
        assert!(matches!(err, ShowdownError::NoTeamFormat { .. }));

        let err = roster
            .load_human("gen8randombattle", "Pikachu\n- Surf")
            .unwrap_err();
        assert!(matches!(err, ShowdownError::NoTeamFormat { .. }));

        assert_eq!(roster.team_for("gen8randombattle"), Some(&TeamSlot::NoTeam));
        assert_eq!(
            roster.team_for("gen8randombattle").unwrap().wire_value(),
            NO_TEAM
        );
    }

    #[test]
    fn malformed_input_leaves_stored_team_intact() {
        let mut roster = Roster::new();
        roster.load_packed("gen8ou", PACKED).unwrap();

        assert!(roster.load_human("gen8ou", "Pikachu\nEVs: x HP").is_err());
        assert!(roster.load_packed("gen8ou", "garbage").is_err());

        assert_eq!(
            roster.team_for("gen8ou"),
            Some(&TeamSlot::Packed(PACKED.to_owned()))
        );
    }

    #[test]
    fn delimiter_in_export_keeps_previous_team() {
        let mut roster = Roster::new();
        roster.load_packed("gen8ou", PACKED).unwrap();

        let err = roster
            .load_human("gen8ou", "Zap|py (Pikachu) @ Light Ball\n- Thunderbolt")
            .unwrap_err();
        assert!(matches!(err, ShowdownError::RosterFormat(_)));
        assert!(roster.load_human("gen8ou", "Sp]ark (Pikachu)\n- Thunderbolt").is_err());

        assert_eq!(
            roster.team_for("gen8ou"),
            Some(&TeamSlot::Packed(PACKED.to_owned()))
        );
    }

    #[test]
    fn unknown_format_has_no_entry() {
        let roster = Roster::with_no_team_formats(["gen9randombattle"]);
        assert!(roster.team_for("gen8ou").is_none());
        assert_eq!(roster.formats().collect::<Vec<_>>(), vec!["gen9randombattle"]);
    }

    #[test]
    fn explicit_unset_stats_apply_to_human_loads() {
        let mut roster = Roster::new().with_unset_stats(UnsetStats::Explicit);
        roster.load_human("gen8ou", "Pikachu").unwrap();
        assert_eq!(
            roster.team_for("gen8ou").unwrap().wire_value(),
            "Pikachu||||||0,0,0,0,0,0||31,31,31,31,31,31|||"
        );
    }

    #[test]
    fn load_file_detects_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let packed_path = dir.path().join("packed.txt");
        let export_path = dir.path().join("export.txt");
        std::fs::write(&packed_path, format!("{PACKED}\n")).unwrap();
        std::fs::write(&export_path, "Pikachu @ Light Ball\nAbility: Static\n- Thunderbolt\n- Surf\n")
            .unwrap();

        let mut roster = Roster::new();
        roster.load_file("gen8ou", &packed_path, None).unwrap();
        assert_eq!(roster.team_for("gen8ou").unwrap().wire_value(), PACKED);

        roster.load_file("gen8uu", &export_path, None).unwrap();
        assert_eq!(roster.team_for("gen8uu").unwrap().wire_value(), PACKED);
    }

    #[test]
    fn load_file_missing_is_io_error() {
        let mut roster = Roster::new();
        let err = roster
            .load_file("gen8ou", "/definitely/not/here.txt", Some(TeamEncoding::Packed))
            .unwrap_err();
        assert!(matches!(err, ShowdownError::Io(_)));
    }
}
