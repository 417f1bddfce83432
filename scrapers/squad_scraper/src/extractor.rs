use scraper::{ElementRef, Html, Selector};
use std::fmt;

use crate::normalize::{player_id, team_id};

/// Why a row (or a whole page) produced no player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoSquadTable,
    MissingNameCell { row: usize },
    EmptyName { row: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoSquadTable => write!(f, "no squad table on page"),
            SkipReason::MissingNameCell { row } => write!(f, "row {} has no player name cell", row),
            SkipReason::EmptyName { row } => write!(f, "row {} has an empty player name", row),
        }
    }
}

/// A player as read off the page, before assets are downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRow {
    pub player_id: String,
    pub team_id: String,
    pub name: String,
    pub number: Option<String>,
    pub position: Option<String>,
    pub age: Option<String>,
    pub nationality: Option<String>,
    pub market_value: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug)]
pub struct SquadPage {
    pub logo_url: Option<String>,
    pub rows: Vec<Result<PlayerRow, SkipReason>>,
}

impl SquadPage {
    pub fn players(&self) -> impl Iterator<Item = &PlayerRow> {
        self.rows.iter().filter_map(|row| row.as_ref().ok())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SkipReason> {
        self.rows.iter().filter_map(|row| row.as_ref().err())
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

fn text_of(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Prefers the lazy-load attribute; inline `data:` images count as no asset.
fn image_source(img: ElementRef) -> Option<String> {
    let value = img.value();
    let src = value
        .attr("data-src")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| value.attr("src"))?
        .trim();

    if src.is_empty() || src.starts_with("data:") {
        return None;
    }
    if let Some(rest) = src.strip_prefix("//") {
        return Some(format!("https://{}", rest));
    }
    Some(src.to_string())
}

pub struct SquadExtractor {
    logo: Selector,
    table: Selector,
    rows: Selector,
    number: Selector,
    name: Selector,
    link: Selector,
    inline_table: Selector,
    portrait: Selector,
    inline_rows: Selector,
    cell: Selector,
    centered: Selector,
    flag: Selector,
    market_value: Selector,
}

impl Default for SquadExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SquadExtractor {
    pub fn new() -> Self {
        Self {
            logo: selector("div.data-header__profile-container img"),
            table: selector("table.items"),
            rows: selector("tr.odd, tr.even"),
            number: selector("div.rn_nummer"),
            name: selector("td.hauptlink:not(.rechts)"),
            link: selector("a"),
            inline_table: selector("table.inline-table"),
            portrait: selector("img.bilderrahmen-fixed"),
            inline_rows: selector("tr"),
            cell: selector("td"),
            centered: selector("td.zentriert"),
            flag: selector("img.flaggenrahmen"),
            market_value: selector("td.rechts.hauptlink"),
        }
    }

    pub fn extract(&self, html: &str, team_name: &str) -> Result<SquadPage, SkipReason> {
        let document = Html::parse_document(html);

        let logo_url = document.select(&self.logo).next().and_then(image_source);

        let table = document.select(&self.table).next().ok_or(SkipReason::NoSquadTable)?;
        let rows = table
            .select(&self.rows)
            .enumerate()
            .map(|(index, row)| self.extract_row(row, index, team_name))
            .collect();

        Ok(SquadPage { logo_url, rows })
    }

    fn extract_row(&self, row: ElementRef, index: usize, team_name: &str) -> Result<PlayerRow, SkipReason> {
        let name_cell = row
            .select(&self.name)
            .next()
            .ok_or(SkipReason::MissingNameCell { row: index })?;
        let link = name_cell
            .select(&self.link)
            .next()
            .ok_or(SkipReason::MissingNameCell { row: index })?;
        let name = text_of(link);
        if name.is_empty() {
            return Err(SkipReason::EmptyName { row: index });
        }

        let number = row.select(&self.number).next().map(text_of).and_then(non_empty);

        let inline_table = row.select(&self.inline_table).next();
        let image_url = inline_table
            .and_then(|t| t.select(&self.portrait).next())
            .and_then(image_source);
        let position = inline_table
            .and_then(|t| t.select(&self.inline_rows).nth(1))
            .and_then(|tr| tr.select(&self.cell).next())
            .map(text_of)
            .and_then(non_empty);

        let age = row.select(&self.centered).nth(1).map(text_of).and_then(non_empty);
        let nationality = row
            .select(&self.flag)
            .next()
            .and_then(|img| img.value().attr("title"))
            .map(|t| t.trim().to_string())
            .and_then(non_empty);
        let market_value = row.select(&self.market_value).next().map(text_of).and_then(non_empty);

        Ok(PlayerRow {
            player_id: player_id(team_name, &name),
            team_id: team_id(team_name),
            name,
            number,
            position,
            age,
            nationality,
            market_value,
            image_url,
        })
    }
}
