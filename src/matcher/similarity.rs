//! Name and geography signals used to score a climb / route pair.

use std::sync::LazyLock;

use regex::Regex;

const EARTH_RADIUS_KM: f64 = 6371.0;

static LEADING_ARTICLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(the|a|an)\s+").expect("valid article regex"));

/// Lowercase, drop punctuation, collapse whitespace, then strip a leading article.
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    LEADING_ARTICLE.replace(&collapsed, "").into_owned()
}

/// `1 - levenshtein / max(len)` over normalized names, in [0, 1].
///
/// Empty names never match anything.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let longest = a.chars().count().max(b.chars().count());
    let distance = strsim::levenshtein(&a, &b);
    (1.0 - distance as f64 / longest as f64).clamp(0.0, 1.0)
}

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Case-insensitive substring match in either direction between any climb label
/// and any route label. Blank labels are ignored.
pub fn location_names_match(climb_labels: &[Option<&str>], route_labels: &[Option<&str>]) -> bool {
    let normalize = |labels: &[Option<&str>]| -> Vec<String> {
        labels
            .iter()
            .flatten()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect()
    };
    let climb = normalize(climb_labels);
    let route = normalize(route_labels);

    climb
        .iter()
        .any(|c| route.iter().any(|r| c.contains(r.as_str()) || r.contains(c.as_str())))
}

/// Longest token of at least three characters in the normalized name.
pub fn longest_token(name: &str) -> Option<String> {
    normalize_name(name)
        .split_whitespace()
        .filter(|t| t.chars().count() >= 3)
        .max_by_key(|t| t.chars().count())
        .map(str::to_string)
}

/// Substring used to select candidate climbs by normalized name: the longest token, or
/// the whole normalized name when every token is short. `None` for names with nothing left.
pub fn search_key(name: &str) -> Option<String> {
    longest_token(name).or_else(|| {
        let normalized = normalize_name(name);
        (!normalized.is_empty()).then_some(normalized)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_articles_and_punctuation() {
        assert_eq!(normalize_name("The  Nose!"), "nose");
        assert_eq!(normalize_name("A Dream of Wild Turkeys"), "dream of wild turkeys");
        assert_eq!(normalize_name("Anaconda"), "anaconda");
        assert_eq!(normalize_name("  Crimson   Chrysalis "), "crimson chrysalis");
        assert_eq!(normalize_name("\"The Nose\""), "nose");
        assert_eq!(normalize_name("Crack-a-Jack"), "crackajack");
        assert_eq!(normalize_name("ÉLAN"), "élan");
    }

    #[test]
    fn similarity_bounds() {
        assert_eq!(name_similarity("The Nose", "nose"), 1.0);
        assert_eq!(name_similarity("", "nose"), 0.0);
        assert_eq!(name_similarity("!!!", "???"), 0.0);
        assert_eq!(name_similarity("\"The Nose\"", "Nose"), 1.0);
        let s = name_similarity("Crimson Chrysalis", "Crimson Chrysallis");
        assert!(s > 0.9 && s < 1.0);
        assert!(name_similarity("abc", "xyz") < 0.01);
    }

    #[test]
    fn haversine_known_distance() {
        assert_eq!(haversine_km(36.1, -115.4, 36.1, -115.4), 0.0);
        let one_degree_lat = haversine_km(0.0, 0.0, 1.0, 0.0);
        assert!((one_degree_lat - 111.19).abs() < 0.1);
    }

    #[test]
    fn location_match_either_direction() {
        assert!(location_names_match(
            &[Some("Red Rock Canyon"), None],
            &[Some("red rock"), None]
        ));
        assert!(location_names_match(&[Some("Kraft")], &[Some("Kraft Boulders")]));
        assert!(!location_names_match(&[Some("")], &[Some("Kraft")]));
        assert!(!location_names_match(&[None], &[Some("Kraft")]));
    }

    #[test]
    fn longest_token_skips_short_words() {
        assert_eq!(longest_token("The Nose"), Some("nose".to_string()));
        assert_eq!(longest_token("Go Up"), None);
        assert_eq!(longest_token("Levitation 29"), Some("levitation".to_string()));
    }

    #[test]
    fn search_key_falls_back_to_whole_name() {
        assert_eq!(search_key("Slap-Happy"), Some("slaphappy".to_string()));
        assert_eq!(search_key("Go Up"), Some("go up".to_string()));
        assert_eq!(search_key("Go!"), Some("go".to_string()));
        assert_eq!(search_key("?!"), None);
    }
}
