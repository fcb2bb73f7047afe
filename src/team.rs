//! Team text codec: human export format to packed wire format.
//!
//! The export format is what team builders produce when a team is copied
//! out as text. Entries are separated by blank lines:
//!
//! ```text
//! Barry (Barraskewda) (M) @ Aguav Berry
//! Ability: Swift Swim
//! Shiny: Yes
//! EVs: 252 Atk / 4 SpD / 252 Spe
//! Adamant Nature
//! IVs: 30 HP / 30 Def / 30 SpA / 30 Spe
//! - Agility
//! - Aqua Jet
//! ```
//!
//! The packed format is one line, entries joined by `]`, each entry
//! `nickname|species|item|ability|moves|nature|evs|gender|ivs|shiny|level|`.
//! The field order is fixed by the server.

use crate::error::{Result, ShowdownError};

/// Separator between packed entries.
pub const ENTRY_DELIMITER: &str = "]";

/// Minimum number of `|`-separated fields in one packed entry.
const PACKED_ENTRY_FIELDS: usize = 11;

/// Characters with structural meaning inside a packed entry.
const PACKED_RESERVED: [char; 2] = ['|', ']'];
/// Moves are also joined with commas.
const MOVE_RESERVED: [char; 3] = ['|', ']', ','];

const MAX_MOVES: usize = 4;
const MAX_IV: u8 = 31;

/// Value the server assumes for an EV left blank.
pub const DEFAULT_EV: u8 = 0;
/// Value the server assumes for an IV left blank.
pub const DEFAULT_IV: u8 = 31;

/// How EVs and IVs that the export does not mention are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsetStats {
    /// Leave the field blank.
    ///
    /// The server's team unpacker reads each comma-separated slot of the
    /// EV field as `Number(slot) || 0` and of the IV field as
    /// `slot === '' ? 31 : Number(slot) || 0`, so a blank EV is [`DEFAULT_EV`]
    /// and a blank IV is [`DEFAULT_IV`]. Packed teams exported by the
    /// server's own team builder leave defaults blank the same way.
    #[default]
    Blank,
    /// Write [`DEFAULT_EV`] / [`DEFAULT_IV`] as numbers.
    Explicit,
}

/// Whether a team text is already packed or still in export form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamEncoding {
    Packed,
    Export,
}

impl TeamEncoding {
    /// Packed teams are a single line containing field delimiters.
    pub fn detect(text: &str) -> Self {
        let text = text.trim();
        if !text.contains('\n') && text.contains('|') {
            Self::Packed
        } else {
            Self::Export
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    fn code(self) -> &'static str {
        match self {
            Self::Male => "M",
            Self::Female => "F",
        }
    }
}

/// Stats in packed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stat {
    Hp,
    Atk,
    Def,
    SpA,
    SpD,
    Spe,
}

impl Stat {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hp" => Some(Self::Hp),
            "atk" => Some(Self::Atk),
            "def" => Some(Self::Def),
            "spa" => Some(Self::SpA),
            "spd" => Some(Self::SpD),
            "spe" => Some(Self::Spe),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Six stat values, `None` where the export left them out.
pub type StatSpread = [Option<u8>; 6];

/// One team member as described by an export.
///
/// Only `species` is mandatory; an entry with no explicit species uses its
/// nickname as species.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PokemonSet {
    pub nickname: String,
    pub species: String,
    pub item: String,
    pub ability: String,
    pub moves: Vec<String>,
    pub nature: String,
    pub evs: StatSpread,
    pub gender: Option<Gender>,
    pub ivs: StatSpread,
    pub shiny: bool,
    pub level: Option<u8>,
}

impl PokemonSet {
    /// Serialize as one packed entry (including the trailing `|`).
    pub fn pack(&self, unset: UnsetStats) -> String {
        // The server reads an empty species as "same as nickname".
        let species = if self.species == self.nickname {
            ""
        } else {
            self.species.as_str()
        };
        let moves = self
            .moves
            .iter()
            .map(|name| to_id(name))
            .collect::<Vec<_>>()
            .join(",");

        format!(
            "{nickname}|{species}|{item}|{ability}|{moves}|{nature}|{evs}|{gender}|{ivs}|{shiny}|{level}|",
            nickname = self.nickname,
            item = to_id(&self.item),
            ability = to_id(&self.ability),
            nature = self.nature.to_lowercase(),
            evs = pack_spread(&self.evs, DEFAULT_EV, unset),
            gender = self.gender.map(Gender::code).unwrap_or_default(),
            ivs = pack_spread(&self.ivs, DEFAULT_IV, unset),
            shiny = if self.shiny { "S" } else { "" },
            level = self.level.map(|l| l.to_string()).unwrap_or_default(),
        )
    }
}

/// Lowercase and drop spaces and hyphens: `"Aqua Jet"` becomes `"aquajet"`.
pub fn to_id(name: &str) -> String {
    name.trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn pack_spread(spread: &StatSpread, default: u8, unset: UnsetStats) -> String {
    spread
        .iter()
        .map(|value| match (value, unset) {
            (Some(v), _) => v.to_string(),
            (None, UnsetStats::Blank) => String::new(),
            (None, UnsetStats::Explicit) => default.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Serialize a whole team, entries joined by [`ENTRY_DELIMITER`].
pub fn pack_team(sets: &[PokemonSet], unset: UnsetStats) -> String {
    sets.iter()
        .map(|set| set.pack(unset))
        .collect::<Vec<_>>()
        .join(ENTRY_DELIMITER)
}

/// Parse an export and pack it in one step.
///
/// # Errors
///
/// See [`parse_export`].
pub fn export_to_packed(text: &str, unset: UnsetStats) -> Result<String> {
    Ok(pack_team(&parse_export(text)?, unset))
}

/// Check that already-packed text is plausibly a packed team.
///
/// # Errors
///
/// Returns [`ShowdownError::RosterFormat`] when the text is empty, an entry
/// has too few fields, or an entry names no Pokémon.
pub fn validate_packed(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(malformed("packed team is empty"));
    }
    for (index, entry) in text.split(ENTRY_DELIMITER).enumerate() {
        let fields: Vec<&str> = entry.split('|').collect();
        if fields.len() < PACKED_ENTRY_FIELDS {
            return Err(malformed(format!(
                "packed entry {} has {} fields, expected at least {PACKED_ENTRY_FIELDS}",
                index + 1,
                fields.len()
            )));
        }
        let named = fields.iter().take(2).any(|field| !field.trim().is_empty());
        if !named {
            return Err(malformed(format!("packed entry {} has no species", index + 1)));
        }
    }
    Ok(())
}

/// Parse export text into team members.
///
/// Unrecognized lines are ignored.
///
/// # Errors
///
/// Returns [`ShowdownError::RosterFormat`] when the text holds no entries,
/// a header names no species, an entry lists more than four moves, a
/// stat, IV or level line does not parse, or a name holds a character the
/// packed format uses as a separator (`|` and `]`, plus `,` in moves).
pub fn parse_export(text: &str) -> Result<Vec<PokemonSet>> {
    let mut sets = Vec::new();
    let mut current: Option<SetBuilder> = None;

    for (number, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            if let Some(builder) = current.take() {
                sets.push(builder.finish());
            }
            continue;
        }
        match current.as_mut() {
            None => current = Some(SetBuilder::header(line, number + 1)?),
            Some(builder) => builder.field(line, number + 1)?,
        }
    }
    if let Some(builder) = current.take() {
        sets.push(builder.finish());
    }

    if sets.is_empty() {
        return Err(malformed("team text contains no entries"));
    }
    Ok(sets)
}

/// Accumulates one entry; a fresh builder starts at every header line.
struct SetBuilder {
    set: PokemonSet,
}

impl SetBuilder {
    /// `Nickname (Species) (Gender) @ Item`, every part but the first optional.
    fn header(line: &str, number: usize) -> Result<Self> {
        let (head, item) = match line.rsplit_once('@') {
            Some((head, item)) => (head.trim(), item.trim()),
            None => (line, ""),
        };

        let mut head = head;
        let mut gender = None;
        if let Some(rest) = head.strip_suffix("(M)") {
            gender = Some(Gender::Male);
            head = rest.trim_end();
        } else if let Some(rest) = head.strip_suffix("(F)") {
            gender = Some(Gender::Female);
            head = rest.trim_end();
        }

        let (nickname, species) = match head
            .strip_suffix(')')
            .and_then(|inner| inner.rsplit_once(" ("))
        {
            Some((nickname, species)) => (nickname.trim(), species.trim()),
            None => (head, head),
        };
        if species.is_empty() {
            return Err(malformed(format!("line {number}: entry names no species")));
        }
        let nickname = if nickname.is_empty() {
            species
        } else {
            nickname
        };
        packable(nickname, "nickname", number, &PACKED_RESERVED)?;
        packable(species, "species", number, &PACKED_RESERVED)?;
        packable(item, "item", number, &PACKED_RESERVED)?;

        Ok(Self {
            set: PokemonSet {
                nickname: nickname.to_owned(),
                species: species.to_owned(),
                item: item.to_owned(),
                gender,
                ..PokemonSet::default()
            },
        })
    }

    fn field(&mut self, line: &str, number: usize) -> Result<()> {
        let set = &mut self.set;
        if let Some(name) = line.strip_prefix('-') {
            if set.moves.len() == MAX_MOVES {
                return Err(malformed(format!(
                    "line {number}: {} has more than {MAX_MOVES} moves",
                    set.nickname
                )));
            }
            let name = packable(name.trim(), "move", number, &MOVE_RESERVED)?;
            set.moves.push(name.to_owned());
        } else if let Some(ability) = line.strip_prefix("Ability:") {
            set.ability = packable(ability.trim(), "ability", number, &PACKED_RESERVED)?.to_owned();
        } else if let Some(level) = line.strip_prefix("Level:") {
            set.level = Some(parse_level(level, number)?);
        } else if let Some(shiny) = line.strip_prefix("Shiny:") {
            set.shiny = shiny.trim().eq_ignore_ascii_case("yes");
        } else if let Some(evs) = line.strip_prefix("EVs:") {
            set.evs = parse_spread(evs, number, u8::MAX)?;
        } else if let Some(ivs) = line.strip_prefix("IVs:") {
            set.ivs = parse_spread(ivs, number, MAX_IV)?;
        } else if let Some(nature) = line.strip_suffix(" Nature") {
            set.nature = packable(nature.trim(), "nature", number, &PACKED_RESERVED)?.to_owned();
        } else {
            tracing::trace!(line = number, text = %line, "ignoring unrecognized team line");
        }
        Ok(())
    }

    fn finish(self) -> PokemonSet {
        self.set
    }
}

fn parse_level(raw: &str, number: usize) -> Result<u8> {
    match raw.trim().parse::<u8>() {
        Ok(level) if (1..=100).contains(&level) => Ok(level),
        _ => Err(malformed(format!(
            "line {number}: invalid level {:?}",
            raw.trim()
        ))),
    }
}

/// `N Stat / N Stat / ...` into a spread.
fn parse_spread(raw: &str, number: usize, max: u8) -> Result<StatSpread> {
    let mut spread = StatSpread::default();
    for part in raw.split('/') {
        let mut words = part.split_whitespace();
        let (Some(value), Some(name), None) = (words.next(), words.next(), words.next()) else {
            return Err(malformed(format!("line {number}: cannot read stat {:?}", part.trim())));
        };
        let stat = Stat::parse(name)
            .ok_or_else(|| malformed(format!("line {number}: unknown stat {name:?}")))?;
        let value = value
            .parse::<u8>()
            .ok()
            .filter(|v| *v <= max)
            .ok_or_else(|| malformed(format!("line {number}: invalid value {value:?} for {name}")))?;
        if let Some(slot) = spread.get_mut(stat.index()) {
            *slot = Some(value);
        }
    }
    Ok(spread)
}

/// Reject text that would shift or split packed fields.
fn packable<'a>(
    value: &'a str,
    what: &str,
    number: usize,
    reserved: &[char],
) -> Result<&'a str> {
    match value.chars().find(|c| reserved.contains(c)) {
        Some(c) => Err(malformed(format!(
            "line {number}: {what} {value:?} contains reserved character {c:?}"
        ))),
        None => Ok(value),
    }
}

fn malformed(reason: impl Into<String>) -> ShowdownError {
    ShowdownError::RosterFormat(reason.into())
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

    #[test]
    fn header_with_nickname_species_gender_and_item() {
        let sets = parse_export("Barry (Barraskewda) (M) @ Aguav Berry").unwrap();
        let set = &sets[0];
        assert_eq!(set.nickname, "Barry");
        assert_eq!(set.species, "Barraskewda");
        assert_eq!(set.gender, Some(Gender::Male));
        assert_eq!(set.item, "Aguav Berry");
    }

    #[test]
    fn header_gender_is_not_species() {
        let sets = parse_export("Blissey (F) @ Assault Vest").unwrap();
        assert_eq!(sets[0].nickname, "Blissey");
        assert_eq!(sets[0].species, "Blissey");
        assert_eq!(sets[0].gender, Some(Gender::Female));
    }

    #[test]
    fn bare_species_header() {
        let sets = parse_export("Mr. Mime\n- Psychic").unwrap();
        assert_eq!(sets[0].species, "Mr. Mime");
        assert_eq!(sets[0].item, "");
        assert_eq!(sets[0].pack(UnsetStats::Blank), "Mr. Mime||||psychic||,,,,,||,,,,,|||");
    }

    #[test]
    fn fields_are_order_independent() {
        let a = parse_export("Pikachu\nLevel: 50\nAbility: Static\n- Thunderbolt").unwrap();
        let b = parse_export("Pikachu\n- Thunderbolt\nAbility: Static\nLevel: 50").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unrecognized_lines_are_ignored() {
        let sets =
            parse_export("Pikachu @ Light Ball\nTera Type: Electric\nHappiness: 0\n- Surf").unwrap();
        assert_eq!(sets[0].moves, vec!["Surf"]);
    }

    #[test]
    fn windows_line_endings_are_stripped() {
        let sets = parse_export("Pikachu @ Light Ball\r\nAbility: Static\r\n\r\nRaichu\r\n").unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].ability, "Static");
        assert_eq!(sets[1].species, "Raichu");
    }

    #[test]
    fn explicit_unset_stats_write_defaults() {
        let sets = parse_export("Pikachu\nEVs: 252 SpA\nIVs: 0 Atk").unwrap();
        assert_eq!(
            sets[0].pack(UnsetStats::Explicit),
            "Pikachu||||||0,0,0,252,0,0||31,0,31,31,31,31|||"
        );
    }

    #[test]
    fn fifth_move_is_rejected() {
        let err = parse_export("Pikachu\n- A\n- B\n- C\n- D\n- E").unwrap_err();
        assert!(matches!(err, ShowdownError::RosterFormat(_)));
    }

    #[test]
    fn bad_stat_lines_are_rejected() {
        for text in [
            "Pikachu\nEVs: lots Atk",
            "Pikachu\nEVs: 252 Speed",
            "Pikachu\nIVs: 32 HP",
            "Pikachu\nEVs: 300 HP",
            "Pikachu\nLevel: 0",
            "Pikachu\nLevel: many",
        ] {
            assert!(
                matches!(parse_export(text), Err(ShowdownError::RosterFormat(_))),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(matches!(
            parse_export("\n\n  \n"),
            Err(ShowdownError::RosterFormat(_))
        ));
    }

    #[test]
    fn header_without_species_is_rejected() {
        assert!(matches!(
            parse_export("@ Leftovers"),
            Err(ShowdownError::RosterFormat(_))
        ));
    }

    #[test]
    fn delimiter_in_header_is_rejected() {
        for header in [
            "Zap|py (Pikachu) @ Light Ball",
            "Sp]ark (Pikachu)",
            "Sparky (Pika|chu)",
            "Pikachu @ Light]Ball",
        ] {
            let err = export_to_packed(&format!("{header}\n- Thunderbolt"), UnsetStats::Blank)
                .unwrap_err();
            assert!(matches!(err, ShowdownError::RosterFormat(_)), "{header}");
        }
    }

    #[test]
    fn delimiter_in_fields_is_rejected() {
        for line in [
            "- Thunder,bolt",
            "- Volt]Tackle",
            "Ability: Stat|ic",
            "Tim|id Nature",
        ] {
            let err = parse_export(&format!("Pikachu\n{line}")).unwrap_err();
            let ShowdownError::RosterFormat(reason) = err else {
                panic!("unexpected error for {line:?}");
            };
            assert!(reason.starts_with("line 2:"), "{reason}");
        }
    }

    #[test]
    fn commas_outside_moves_are_kept() {
        let sets = parse_export("Mr. Mime, Jr. (Mr. Mime) @ Leftovers\n- Psychic").unwrap();
        assert_eq!(sets[0].nickname, "Mr. Mime, Jr.");
    }

    #[test]
    fn to_id_strips_spaces_and_hyphens() {
        assert_eq!(to_id("Will-O-Wisp"), "willowisp");
        assert_eq!(to_id(" Choice Band\n"), "choiceband");
    }

    #[test]
    fn detect_encoding() {
        assert_eq!(
            TeamEncoding::detect("Pikachu|||static|thunderbolt||,,,,,||,,,,,|||\n"),
            TeamEncoding::Packed
        );
        assert_eq!(
            TeamEncoding::detect("Pikachu\n- Thunderbolt"),
            TeamEncoding::Export
        );
    }

    #[test]
    fn validate_packed_checks_entries() {
        assert!(validate_packed("Pikachu|||static|thunderbolt||,,,,,||,,,,,|||").is_ok());
        assert!(validate_packed("").is_err());
        assert!(validate_packed("Pikachu|static").is_err());
        assert!(validate_packed("||||||||||||").is_err());
    }
}
