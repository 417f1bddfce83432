use serde::{Deserialize, Serialize};

/// One row of the roster table: a team page to scrape and where it belongs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeagueEntry {
    #[serde(rename = "Liga")]
    pub league: String,
    #[serde(rename = "Echipa")]
    pub team: String,
    #[serde(rename = "Link")]
    pub url: String,
    #[serde(rename = "Tara")]
    pub country: String,
}

/// A persisted player row. Optional fields are `None` when the page did not
/// provide them, and serialize as empty cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    #[serde(rename = "PlayerID")]
    pub player_id: String,
    #[serde(rename = "TeamID")]
    pub team_id: String,
    #[serde(rename = "Team")]
    pub team: String,
    #[serde(rename = "TeamLogo")]
    pub team_logo: Option<String>,
    #[serde(rename = "Number")]
    pub number: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Position")]
    pub position: Option<String>,
    #[serde(rename = "Age")]
    pub age: Option<String>,
    #[serde(rename = "Nationality")]
    pub nationality: Option<String>,
    #[serde(rename = "MarketValue")]
    pub market_value: Option<String>,
    #[serde(rename = "Image")]
    pub image: Option<String>,
    #[serde(rename = "League")]
    pub league: String,
    #[serde(rename = "Country")]
    pub country: String,
}

pub const PLAYER_COLUMNS: [&str; 13] = [
    "PlayerID",
    "TeamID",
    "Team",
    "TeamLogo",
    "Number",
    "Name",
    "Position",
    "Age",
    "Nationality",
    "MarketValue",
    "Image",
    "League",
    "Country",
];
