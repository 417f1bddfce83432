use unicode_normalization::UnicodeNormalization;

/// Strips diacritics by canonical-compatibility decomposition and drops
/// whatever is still outside ASCII afterwards.
pub fn clean_text(text: &str) -> String {
    text.nfkd().filter(char::is_ascii).collect()
}

/// ASCII, lower-case, whitespace replaced by underscores.
pub fn normalize(text: &str) -> String {
    clean_text(text)
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c.to_ascii_lowercase() })
        .collect()
}

pub fn team_id(team_name: &str) -> String {
    normalize(team_name)
}

/// Stable across runs but not unique: two players on one team whose names
/// normalize identically get the same ID.
pub fn player_id(team_name: &str, player_name: &str) -> String {
    format!("{}_{}", normalize(team_name), normalize(player_name))
}
