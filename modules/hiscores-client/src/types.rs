use serde::Deserialize;

/// Body of `index_lite.json` for one player.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerListing {
    pub skills: Vec<SkillEntry>,
    pub activities: Vec<ActivityEntry>,
}

/// A skill row. Unranked skills report `rank = -1` and may report `xp = -1`.
#[derive(Debug, Clone, Deserialize)]
pub struct SkillEntry {
    pub id: i32,
    pub name: String,
    pub rank: i64,
    pub level: i64,
    pub xp: i64,
}

/// An activity row (boss kills, clue scrolls, minigames). Unranked rows report `score = -1`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityEntry {
    pub id: i32,
    pub name: String,
    pub rank: i64,
    pub score: i64,
}

impl PlayerListing {
    pub fn skill(&self, name: &str) -> Option<&SkillEntry> {
        self.skills
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn activity(&self, name: &str) -> Option<&ActivityEntry> {
        self.activities
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }
}

impl SkillEntry {
    pub fn is_ranked(&self) -> bool {
        self.rank > 0
    }
}

impl ActivityEntry {
    pub fn is_ranked(&self) -> bool {
        self.rank > 0 && self.score >= 0
    }
}
