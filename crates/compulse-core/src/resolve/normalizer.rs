use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Legal-entity suffixes recognised at the end of a company name.
///
/// Order here is the order suffix variants are generated in; matching walks
/// [`suffixes_longest_first`] instead so "Corp." is tried before "Co.".
pub const LEGAL_SUFFIXES: [&str; 15] = [
    "Inc",
    "Inc.",
    "Incorporated",
    "Corp",
    "Corp.",
    "Corporation",
    "LLC",
    "L.L.C.",
    "Limited Liability Company",
    "Ltd",
    "Ltd.",
    "Limited",
    "Co",
    "Co.",
    "Company",
];

fn suffixes_longest_first() -> Vec<&'static str> {
    let mut suffixes = LEGAL_SUFFIXES.to_vec();
    // stable: equal lengths keep declaration order
    suffixes.sort_by(|a, b| b.len().cmp(&a.len()));
    suffixes
}

/// A company name reduced to its base form plus the spellings worth trying
/// against a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedName {
    pub original: String,
    pub base_form: String,
    pub variants: Vec<String>,
}

impl NormalizedName {
    /// Variants used for fuzzy scoring. Quoted forms are search syntax, not
    /// names, so they are left out.
    pub fn match_forms(&self) -> Vec<&str> {
        let mut forms: Vec<&str> = Vec::new();
        for variant in &self.variants {
            let form = variant.trim();
            if form.starts_with('"') || form.is_empty() || forms.contains(&form) {
                continue;
            }
            forms.push(form);
        }
        forms
    }

    /// Every variant, quoted forms included, for building upstream search
    /// queries.
    pub fn search_forms(&self) -> &[String] {
        &self.variants
    }

    pub fn contains_variant(&self, candidate: &str) -> bool {
        self.variants.iter().any(|v| v == candidate)
    }
}

/// Normalize a raw user-supplied company name.
///
/// Legal suffixes are stripped until none remain, so normalizing a base form
/// again leaves it unchanged. Fails only when the input is empty after
/// trimming.
pub fn normalize(raw: &str) -> Result<NormalizedName> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("company name is empty".into()));
    }

    let base_form = strip_all_suffixes(name).to_string();

    let mut variants: Vec<String> = Vec::new();
    let mut push = |value: String| {
        if !value.is_empty() && !variants.contains(&value) {
            variants.push(value);
        }
    };

    push(raw.to_string());
    push(name.to_string());
    push(base_form.clone());
    push(format!("\"{name}\""));
    push(format!("\"{base_form}\""));
    for suffix in LEGAL_SUFFIXES {
        push(format!("{base_form} {suffix}"));
    }

    Ok(NormalizedName {
        original: raw.to_string(),
        base_form,
        variants,
    })
}

/// Remove the first (longest) legal suffix found at the end of `name`.
///
/// Trailing commas and whitespace left behind ("Acme, Inc." -> "Acme") are
/// trimmed too. A name that is only a suffix is returned unchanged.
pub fn strip_suffix(name: &str) -> &str {
    let name = name.trim();
    let lowered = name.to_lowercase();

    for suffix in suffixes_longest_first() {
        let tail = format!(" {}", suffix.to_lowercase());
        let cut = name.len().saturating_sub(tail.len());
        if lowered.ends_with(&tail) && lowered.len() == name.len() && name.is_char_boundary(cut) {
            let stripped = name[..cut].trim_end_matches([',', ' ']);
            if !stripped.is_empty() {
                return stripped;
            }
        }
    }

    name
}

/// Apply [`strip_suffix`] until the name stops changing ("Acme Co Inc" ->
/// "Acme").
pub fn strip_all_suffixes(name: &str) -> &str {
    let mut current = name.trim();
    loop {
        let next = strip_suffix(current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Lowercased, punctuation-folded, suffix-stripped key used to merge
/// different spellings of the same party inside one result set.
pub fn canonical_key(name: &str) -> String {
    let folded = fold(name);
    strip_all_suffixes(&folded).to_string()
}

/// Lowercase, replace punctuation with spaces and collapse whitespace.
///
/// Runs of single letters are glued back together so dotted abbreviations
/// ("L.L.C.", "U.S.A.") fold to one token.
pub fn fold(value: &str) -> String {
    let mut spaced = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch == '\'' {
            continue;
        }
        if ch.is_alphanumeric() {
            spaced.extend(ch.to_lowercase());
        } else {
            spaced.push(' ');
        }
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut gluing = false;
    for token in spaced.split_whitespace() {
        let single = token.chars().count() == 1 && token.chars().all(char::is_alphabetic);
        match tokens.last_mut() {
            Some(last) if single && gluing => last.push_str(token),
            _ => tokens.push(token.to_string()),
        }
        gluing = single;
    }
    tokens.join(" ")
}
