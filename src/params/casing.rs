//! Identifier case conversion between wire keys and field names.

/// Upper-case runs the encoder keeps together as one word.
pub const DEFAULT_ACRONYMS: [&str; 4] = ["API", "JSON", "IP", "URL"];

/// Converts an exported field name to its wire key.
///
/// Words start at the first lower-case letter, at a known acronym, at a digit
/// run (optionally behind `_`), at `_`, or at a run of upper-case letters; each
/// takes any lower-case letters that follow. Words are lower-cased and joined
/// with `_`.
///
/// ```rust
/// use apiary::params::{DEFAULT_ACRONYMS, snake_case};
///
/// assert_eq!(snake_case("FirstName", &DEFAULT_ACRONYMS), "first_name");
/// assert_eq!(snake_case("IPAddress", &DEFAULT_ACRONYMS), "ip_address");
/// assert_eq!(snake_case("ID", &DEFAULT_ACRONYMS), "id");
/// ```
pub fn snake_case<S: AsRef<str>>(name: &str, acronyms: &[S]) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let Some(mut end) = word_head(&chars, i, acronyms) else {
            i += 1;
            continue;
        };
        while end < chars.len() && chars[end].is_lowercase() {
            end += 1;
        }
        let word: String = chars[i..end]
            .iter()
            .filter(|c| **c != '_')
            .flat_map(|c| c.to_lowercase())
            .collect();
        if !word.is_empty() {
            words.push(word);
        }
        i = end;
    }

    words.join("_")
}

/// End of the leading part of a word starting at `i`, if one starts there.
fn word_head<S: AsRef<str>>(chars: &[char], i: usize, acronyms: &[S]) -> Option<usize> {
    let c = chars[i];
    if i == 0 && c.is_lowercase() {
        return Some(1);
    }

    for acronym in acronyms {
        let acronym: Vec<char> = acronym.as_ref().chars().collect();
        if !acronym.is_empty() && chars[i..].starts_with(&acronym) {
            return Some(i + acronym.len());
        }
    }

    let digits = if c == '_' { i + 1 } else { i };
    if chars.get(digits).is_some_and(char::is_ascii_digit) {
        let mut end = digits;
        while chars.get(end).is_some_and(char::is_ascii_digit) {
            end += 1;
        }
        return Some(end);
    }

    if c == '_' {
        return Some(i + 1);
    }

    if c.is_uppercase() {
        let mut end = i;
        while chars.get(end).is_some_and(|c| c.is_uppercase()) {
            end += 1;
        }
        return Some(end);
    }

    None
}

/// Converts a wire key to an exported field name.
///
/// Splits on `_`; every segment (and the first one only when `upper_first`)
/// gets an upper-case first letter, and segments matching an abbreviation are
/// upper-cased whole.
///
/// ```rust
/// use apiary::params::snake_to_camel;
///
/// let abbreviations = ["id", "json"];
/// assert_eq!(snake_to_camel("user_id", true, &abbreviations), "UserID");
/// assert_eq!(snake_to_camel("first_name", false, &abbreviations), "firstName");
/// ```
pub fn snake_to_camel<S: AsRef<str>>(name: &str, upper_first: bool, abbreviations: &[S]) -> String {
    name.split('_')
        .enumerate()
        .map(|(i, word)| {
            if i == 0 && !upper_first {
                word.to_owned()
            } else if abbreviations.iter().any(|a| a.as_ref().eq_ignore_ascii_case(word)) {
                word.to_uppercase()
            } else {
                capitalize(word)
            }
        })
        .collect()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
