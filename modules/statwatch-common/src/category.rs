//! The closed catalogue of tracked stat categories.
//!
//! Categories are partitioned into disjoint groups. Each group carries the
//! baseline value assumed for an entity with no prior record of a category:
//! skills start at level 1, kill counts and clue completions at 0.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StatwatchError;

macro_rules! category_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($variant:ident => ($key:literal, $upstream:literal)),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stable snake_case key used for persistence and lookups.
            pub fn key(self) -> &'static str {
                match self {
                    $($name::$variant => $key),+
                }
            }

            /// Name used by the upstream hiscores listing.
            pub fn upstream_name(self) -> &'static str {
                match self {
                    $($name::$variant => $upstream),+
                }
            }
        }
    };
}

category_enum! {
    /// Trainable skills, valued by level.
    Skill {
        Attack => ("attack", "Attack"),
        Defence => ("defence", "Defence"),
        Strength => ("strength", "Strength"),
        Hitpoints => ("hitpoints", "Hitpoints"),
        Ranged => ("ranged", "Ranged"),
        Prayer => ("prayer", "Prayer"),
        Magic => ("magic", "Magic"),
        Cooking => ("cooking", "Cooking"),
        Woodcutting => ("woodcutting", "Woodcutting"),
        Fletching => ("fletching", "Fletching"),
        Fishing => ("fishing", "Fishing"),
        Firemaking => ("firemaking", "Firemaking"),
        Crafting => ("crafting", "Crafting"),
        Smithing => ("smithing", "Smithing"),
        Mining => ("mining", "Mining"),
        Herblore => ("herblore", "Herblore"),
        Agility => ("agility", "Agility"),
        Thieving => ("thieving", "Thieving"),
        Slayer => ("slayer", "Slayer"),
        Farming => ("farming", "Farming"),
        Runecraft => ("runecraft", "Runecraft"),
        Hunter => ("hunter", "Hunter"),
        Construction => ("construction", "Construction"),
    }
}

category_enum! {
    /// Boss kill counts.
    Boss {
        AbyssalSire => ("abyssal_sire", "Abyssal Sire"),
        AlchemicalHydra => ("alchemical_hydra", "Alchemical Hydra"),
        Artio => ("artio", "Artio"),
        BarrowsChests => ("barrows_chests", "Barrows Chests"),
        Bryophyta => ("bryophyta", "Bryophyta"),
        Callisto => ("callisto", "Callisto"),
        Calvarion => ("calvarion", "Cal'varion"),
        Cerberus => ("cerberus", "Cerberus"),
        ChambersOfXeric => ("chambers_of_xeric", "Chambers of Xeric"),
        ChambersOfXericChallengeMode => ("chambers_of_xeric_challenge_mode", "Chambers of Xeric: Challenge Mode"),
        ChaosElemental => ("chaos_elemental", "Chaos Elemental"),
        ChaosFanatic => ("chaos_fanatic", "Chaos Fanatic"),
        CommanderZilyana => ("commander_zilyana", "Commander Zilyana"),
        CorporealBeast => ("corporeal_beast", "Corporeal Beast"),
        CrazyArchaeologist => ("crazy_archaeologist", "Crazy Archaeologist"),
        DagannothPrime => ("dagannoth_prime", "Dagannoth Prime"),
        DagannothRex => ("dagannoth_rex", "Dagannoth Rex"),
        DagannothSupreme => ("dagannoth_supreme", "Dagannoth Supreme"),
        DerangedArchaeologist => ("deranged_archaeologist", "Deranged Archaeologist"),
        DukeSucellus => ("duke_sucellus", "Duke Sucellus"),
        GeneralGraardor => ("general_graardor", "General Graardor"),
        GiantMole => ("giant_mole", "Giant Mole"),
        GrotesqueGuardians => ("grotesque_guardians", "Grotesque Guardians"),
        Hespori => ("hespori", "Hespori"),
        KalphiteQueen => ("kalphite_queen", "Kalphite Queen"),
        KingBlackDragon => ("king_black_dragon", "King Black Dragon"),
        Kraken => ("kraken", "Kraken"),
        KreeArra => ("kreearra", "Kree'Arra"),
        KrilTsutsaroth => ("kril_tsutsaroth", "K'ril Tsutsaroth"),
        Mimic => ("mimic", "Mimic"),
        Nex => ("nex", "Nex"),
        Nightmare => ("nightmare", "Nightmare"),
        PhosanisNightmare => ("phosanis_nightmare", "Phosani's Nightmare"),
        Obor => ("obor", "Obor"),
        PhantomMuspah => ("phantom_muspah", "Phantom Muspah"),
        Sarachnis => ("sarachnis", "Sarachnis"),
        Scorpia => ("scorpia", "Scorpia"),
        Skotizo => ("skotizo", "Skotizo"),
        Spindel => ("spindel", "Spindel"),
        Tempoross => ("tempoross", "Tempoross"),
        TheGauntlet => ("the_gauntlet", "The Gauntlet"),
        TheCorruptedGauntlet => ("the_corrupted_gauntlet", "The Corrupted Gauntlet"),
        TheLeviathan => ("the_leviathan", "The Leviathan"),
        TheWhisperer => ("the_whisperer", "The Whisperer"),
        TheatreOfBlood => ("theatre_of_blood", "Theatre of Blood"),
        TheatreOfBloodHardMode => ("theatre_of_blood_hard_mode", "Theatre of Blood: Hard Mode"),
        ThermonuclearSmokeDevil => ("thermonuclear_smoke_devil", "Thermonuclear Smoke Devil"),
        TombsOfAmascut => ("tombs_of_amascut", "Tombs of Amascut"),
        TombsOfAmascutExpertMode => ("tombs_of_amascut_expert_mode", "Tombs of Amascut: Expert Mode"),
        TzKalZuk => ("tzkal_zuk", "TzKal-Zuk"),
        TzTokJad => ("tztok_jad", "TzTok-Jad"),
        Vardorvis => ("vardorvis", "Vardorvis"),
        Venenatis => ("venenatis", "Venenatis"),
        Vetion => ("vetion", "Vet'ion"),
        Vorkath => ("vorkath", "Vorkath"),
        Wintertodt => ("wintertodt", "Wintertodt"),
        Zalcano => ("zalcano", "Zalcano"),
        Zulrah => ("zulrah", "Zulrah"),
    }
}

category_enum! {
    /// Clue scroll completions per tier.
    ClueTier {
        All => ("clue_all", "Clue Scrolls (all)"),
        Beginner => ("clue_beginner", "Clue Scrolls (beginner)"),
        Easy => ("clue_easy", "Clue Scrolls (easy)"),
        Medium => ("clue_medium", "Clue Scrolls (medium)"),
        Hard => ("clue_hard", "Clue Scrolls (hard)"),
        Elite => ("clue_elite", "Clue Scrolls (elite)"),
        Master => ("clue_master", "Clue Scrolls (master)"),
    }
}

/// Disjoint partition of the category catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryGroup {
    Skill,
    Boss,
    Clue,
}

impl CategoryGroup {
    pub const ALL: [CategoryGroup; 3] = [Self::Skill, Self::Boss, Self::Clue];

    /// Value assumed when an entity has no prior record for a category in this group.
    pub fn baseline(self) -> u64 {
        match self {
            Self::Skill => 1,
            Self::Boss | Self::Clue => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skill => "skill",
            Self::Boss => "boss",
            Self::Clue => "clue",
        }
    }

    /// Every category belonging to this group, in catalogue order.
    pub fn categories(self) -> Vec<Category> {
        match self {
            Self::Skill => Skill::ALL.iter().copied().map(Category::Skill).collect(),
            Self::Boss => Boss::ALL.iter().copied().map(Category::Boss).collect(),
            Self::Clue => ClueTier::ALL.iter().copied().map(Category::Clue).collect(),
        }
    }
}

impl fmt::Display for CategoryGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryGroup {
    type Err = StatwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skill" => Ok(Self::Skill),
            "boss" => Ok(Self::Boss),
            "clue" => Ok(Self::Clue),
            other => Err(StatwatchError::UnknownCategory(other.to_string())),
        }
    }
}

/// One named numeric counter tracked per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Category {
    Skill(Skill),
    Boss(Boss),
    Clue(ClueTier),
}

impl Category {
    pub fn group(self) -> CategoryGroup {
        match self {
            Self::Skill(_) => CategoryGroup::Skill,
            Self::Boss(_) => CategoryGroup::Boss,
            Self::Clue(_) => CategoryGroup::Clue,
        }
    }

    pub fn baseline(self) -> u64 {
        self.group().baseline()
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Skill(s) => s.key(),
            Self::Boss(b) => b.key(),
            Self::Clue(c) => c.key(),
        }
    }

    pub fn upstream_name(self) -> &'static str {
        match self {
            Self::Skill(s) => s.upstream_name(),
            Self::Boss(b) => b.upstream_name(),
            Self::Clue(c) => c.upstream_name(),
        }
    }

    /// The full catalogue, grouped and in catalogue order.
    pub fn all() -> impl Iterator<Item = Category> {
        CategoryGroup::ALL.into_iter().flat_map(CategoryGroup::categories)
    }

    pub fn from_key(key: &str) -> Option<Category> {
        Self::all().find(|c| c.key() == key)
    }

    /// Match an upstream listing name, ignoring ASCII case.
    pub fn from_upstream_name(name: &str) -> Option<Category> {
        Self::all().find(|c| c.upstream_name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = StatwatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s).ok_or_else(|| StatwatchError::UnknownCategory(s.to_string()))
    }
}

impl TryFrom<String> for Category {
    type Error = StatwatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.key().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_are_unique_across_groups() {
        let keys: Vec<&str> = Category::all().map(Category::key).collect();
        let unique: HashSet<&str> = keys.iter().copied().collect();
        assert_eq!(keys.len(), unique.len(), "duplicate category key in catalogue");
    }

    #[test]
    fn groups_partition_the_catalogue() {
        let total: usize = CategoryGroup::ALL.iter().map(|g| g.categories().len()).sum();
        assert_eq!(total, Category::all().count());
        for group in CategoryGroup::ALL {
            assert!(group.categories().iter().all(|c| c.group() == group));
        }
    }

    #[test]
    fn skills_baseline_at_one_counts_at_zero() {
        assert_eq!(Category::Skill(Skill::Fishing).baseline(), 1);
        assert_eq!(Category::Boss(Boss::Zulrah).baseline(), 0);
        assert_eq!(Category::Clue(ClueTier::Hard).baseline(), 0);
    }

    #[test]
    fn key_round_trips_through_from_str() {
        let category: Category = "theatre_of_blood_hard_mode".parse().unwrap();
        assert_eq!(category, Category::Boss(Boss::TheatreOfBloodHardMode));
        assert!("not_a_category".parse::<Category>().is_err());
    }

    #[test]
    fn upstream_names_match_case_insensitively() {
        assert_eq!(
            Category::from_upstream_name("clue scrolls (elite)"),
            Some(Category::Clue(ClueTier::Elite))
        );
        assert_eq!(
            Category::from_upstream_name("Kree'Arra"),
            Some(Category::Boss(Boss::KreeArra))
        );
        assert_eq!(Category::from_upstream_name("Overall"), None);
    }

    #[test]
    fn serializes_as_key_string() {
        let json = serde_json::to_string(&Category::Skill(Skill::Runecraft)).unwrap();
        assert_eq!(json, "\"runecraft\"");
        let back: Category = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Category::Skill(Skill::Runecraft));
    }
}
