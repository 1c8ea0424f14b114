//! Home-stay matching: does an event's title or location name one of the
//! child's homes?
//!
//! Matches are suggestions only. Turning one into a home-day goes through
//! the normal proposal workflow.

use crate::models::{Home, HomeStayCandidate, MatchConfidence, MatchReason};

/// Words too generic to identify a home on their own
const GENERIC_WORDS: &[&str] = &[
    "the", "a", "an", "at", "s", "house", "home", "place", "apartment", "apt", "flat",
];

/// Lowercase and turn punctuation into spaces, so "Dad's" reads "dad s".
fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    !phrase.is_empty() && format!(" {} ", haystack).contains(&format!(" {} ", phrase))
}

fn significant_words(normalized: &str) -> Vec<&str> {
    normalized
        .split(' ')
        .filter(|w| !w.is_empty() && !GENERIC_WORDS.contains(w))
        .collect()
}

/// Best match of normalized `text` against one home name
fn match_text(text: &str, home: &str) -> Option<MatchConfidence> {
    let home_name = normalize(home);
    if contains_phrase(text, &home_name) {
        return Some(MatchConfidence::High);
    }
    let words = significant_words(&home_name);
    let text_words: Vec<&str> = text.split(' ').collect();
    // "dads" still mentions "dad"
    let mentioned = |word: &str| {
        text_words
            .iter()
            .any(|t| *t == word || t.strip_suffix('s') == Some(word))
    };
    if !words.is_empty() && words.iter().all(|w| mentioned(w)) {
        return Some(MatchConfidence::Medium);
    }
    None
}

/// Fill in `candidate`'s home, confidence and reason from its title and
/// location. Ties go to the more specific (longer) home name.
pub fn classify(mut candidate: HomeStayCandidate, homes: &[Home]) -> HomeStayCandidate {
    let title = normalize(&candidate.title);
    let location = candidate.location.as_deref().map(normalize).unwrap_or_default();

    let mut best: Option<(MatchConfidence, MatchReason, &Home)> = None;
    for home in homes {
        let found = [
            (match_text(&title, &home.name), true),
            (match_text(&location, &home.name), false),
        ]
        .into_iter()
        .filter_map(|(confidence, in_title)| confidence.map(|c| (c, in_title)))
        .max_by_key(|(confidence, in_title)| (*confidence, *in_title));

        let Some((confidence, in_title)) = found else {
            continue;
        };
        let reason = match (confidence, in_title) {
            (MatchConfidence::High, true) => MatchReason::TitleNamesHome,
            (MatchConfidence::High, false) => MatchReason::LocationNamesHome,
            (MatchConfidence::Medium, true) => MatchReason::TitleMentionsHomeWords,
            (MatchConfidence::Medium, false) => MatchReason::LocationMentionsHomeWords,
        };

        let better = match &best {
            None => true,
            Some((c, _, h)) => {
                confidence > *c || (confidence == *c && home.name.len() > h.name.len())
            }
        };
        if better {
            best = Some((confidence, reason, home));
        }
    }

    candidate.home_id = best.map(|(_, _, h)| h.id);
    candidate.confidence = best.map(|(c, _, _)| c);
    candidate.reason = best.map(|(_, r, _)| r).unwrap_or(MatchReason::NoMatch);
    candidate
}

/// Classify each candidate and keep the ones that name a home.
pub fn matching_candidates(
    candidates: impl IntoIterator<Item = HomeStayCandidate>,
    homes: &[Home],
) -> Vec<HomeStayCandidate> {
    if homes.is_empty() {
        return Vec::new();
    }
    candidates
        .into_iter()
        .map(|c| classify(c, homes))
        .filter(HomeStayCandidate::is_match)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn home(name: &str) -> Home {
        Home {
            id: Uuid::new_v4(),
            name: name.to_string(),
        }
    }

    fn unmatched(title: &str, location: Option<&str>) -> HomeStayCandidate {
        let start = Utc.with_ymd_and_hms(2025, 1, 10, 18, 0, 0).unwrap();
        HomeStayCandidate {
            source_id: Uuid::nil(),
            external_event_id: "x".to_string(),
            title: title.to_string(),
            location: location.map(str::to_string),
            start_at: start,
            end_at: start,
            all_day: false,
            home_id: None,
            confidence: None,
            reason: MatchReason::NoMatch,
        }
    }

    #[test]
    fn full_name_in_title_is_high_confidence() {
        let dads = home("Dad's House");
        let c = classify(unmatched("Weekend at Dad's house", None), &[dads.clone()]);
        assert_eq!(c.home_id, Some(dads.id));
        assert_eq!(c.confidence, Some(MatchConfidence::High));
        assert_eq!(c.reason, MatchReason::TitleNamesHome);
    }

    #[test]
    fn possessive_spelling_is_a_partial_match() {
        let c = classify(unmatched("dads weekend", None), &[home("Dad's House")]);
        assert_eq!(c.confidence, Some(MatchConfidence::Medium));
    }

    #[test]
    fn location_and_partial_matches() {
        let lake = home("Lake Cabin");
        let c = classify(unmatched("Trip", Some("The Lake Cabin, Route 9")), &[lake]);
        assert_eq!(c.reason, MatchReason::LocationNamesHome);

        let grandma = home("Grandma's place");
        let c = classify(unmatched("Sleepover at grandma", None), &[grandma.clone()]);
        assert_eq!(c.home_id, Some(grandma.id));
        assert_eq!(c.confidence, Some(MatchConfidence::Medium));
        assert_eq!(c.reason, MatchReason::TitleMentionsHomeWords);
    }

    #[test]
    fn generic_words_alone_never_match() {
        let c = classify(unmatched("Home office day", None), &[home("The House")]);
        assert_eq!(c.reason, MatchReason::NoMatch);
        assert!(c.home_id.is_none());

        // word boundaries are respected
        let c = classify(unmatched("Momentum class", None), &[home("Mom")]);
        assert!(!c.is_match());
    }

    #[test]
    fn most_specific_home_wins() {
        let dads_lake = home("Dad Lake House");
        let c = classify(
            unmatched("Dad lake house weekend", None),
            &[home("Dad"), dads_lake.clone()],
        );
        assert_eq!(c.home_id, Some(dads_lake.id));
    }

    #[test]
    fn only_matches_are_kept() {
        let homes = [home("Mom's house")];
        let kept = matching_candidates(
            vec![unmatched("At mom's house", None), unmatched("Dentist", None)],
            &homes,
        );
        assert_eq!(kept.len(), 1);
        assert!(matching_candidates(vec![unmatched("At mom's house", None)], &[]).is_empty());
    }
}
