//! Home color derivation from a home's display name.
//!
//! This is a presentation heuristic: two homes in the same category (say two
//! "Dad" homes) get the same color.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HomeColor {
    Dad,
    Mom,
    Grandma,
    Grandpa,
    Default,
}

impl HomeColor {
    pub fn hex(&self) -> &'static str {
        match self {
            HomeColor::Dad => "#3B82F6",
            HomeColor::Mom => "#EC4899",
            HomeColor::Grandma => "#A855F7",
            HomeColor::Grandpa => "#10B981",
            HomeColor::Default => "#6B7280",
        }
    }
}

// Grandparent words are checked first: "granddad" contains "dad".
const GRANDMA_WORDS: &[&str] = &["grandma", "grandmother", "granny", "nana", "abuela"];
const GRANDPA_WORDS: &[&str] = &["grandpa", "grandfather", "granddad", "grandad", "abuelo"];
const MOM_WORDS: &[&str] = &["mom", "mum", "mother", "mama", "mommy", "mummy"];
const DAD_WORDS: &[&str] = &["dad", "father", "papa", "daddy"];

/// Case-insensitive substring match against a small vocabulary.
pub fn home_color(name: &str) -> HomeColor {
    let name = name.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|word| name.contains(word));

    if mentions(GRANDMA_WORDS) {
        HomeColor::Grandma
    } else if mentions(GRANDPA_WORDS) {
        HomeColor::Grandpa
    } else if mentions(MOM_WORDS) {
        HomeColor::Mom
    } else if mentions(DAD_WORDS) {
        HomeColor::Dad
    } else {
        HomeColor::Default
    }
}
