//! Hierarchical fuzzy matching of extracted locations against wards.
//!
//! Each ward path contributes a (province, district, ward) triple. Supplied
//! parts of the extracted location are compared against the triple with a
//! Levenshtein ratio and combined as a weighted average, ward weighing most.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::administrative::model::{AdministrativeLevel, ward_triple};
use crate::config::MatcherConfig;
use crate::error::DatabaseError;
use crate::store::Database;

const WARD_WEIGHT: f64 = 3.0;
const DISTRICT_WEIGHT: f64 = 2.0;
const PROVINCE_WEIGHT: f64 = 1.0;

/// Fewest candidates kept after capping; ambiguity compares the top two.
pub const MIN_CANDIDATES: usize = 2;

/// Location parts extracted from a farmer's message. Any part may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationExtraction {
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub ward: Option<String>,
    #[serde(default)]
    pub full_text: Option<String>,
}

impl LocationExtraction {
    /// True when none of province, district or ward was supplied.
    pub fn is_empty(&self) -> bool {
        [&self.province, &self.district, &self.ward]
            .iter()
            .all(|part| supplied(part).is_none())
    }
}

/// A ward that scored at or above the match threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub level: AdministrativeLevel,
    /// Weighted similarity, 0–100.
    pub score: f64,
}

pub struct LocationMatcher {
    db: Arc<dyn Database>,
    config: MatcherConfig,
}

impl LocationMatcher {
    pub fn new(db: Arc<dyn Database>, config: MatcherConfig) -> Self {
        Self { db, config }
    }

    /// Wards scoring at least `match_threshold`, best first, capped at
    /// `max_candidates`. The cap never drops the runner-up, so
    /// `is_ambiguous` sees the same top two as an uncapped search.
    pub async fn find_matching_wards(
        &self,
        location: &LocationExtraction,
    ) -> Result<Vec<MatchCandidate>, DatabaseError> {
        let wards = self
            .db
            .list_administrative_by_level(AdministrativeLevel::Ward)
            .await?;

        let mut candidates: Vec<MatchCandidate> = wards
            .into_iter()
            .filter_map(|ward| {
                let score = score_path(location, &ward.path);
                (score >= self.config.match_threshold).then(|| MatchCandidate {
                    id: ward.id,
                    name: ward.name,
                    path: ward.path,
                    level: ward.level,
                    score,
                })
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates.truncate(self.config.max_candidates.max(MIN_CANDIDATES));

        debug!(
            matches = candidates.len(),
            top_score = candidates.first().map(|c| c.score),
            "Location matched"
        );
        Ok(candidates)
    }

    /// Whether the top two candidates are too close to pick one.
    pub fn is_ambiguous(&self, candidates: &[MatchCandidate]) -> bool {
        match candidates {
            [first, second, ..] => first.score - second.score <= self.config.ambiguity_threshold,
            _ => false,
        }
    }
}

fn supplied(part: &Option<String>) -> Option<&str> {
    part.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Weighted similarity of `location` against a ward path. Parts the caller
/// did not supply do not count; nothing supplied scores 0.
pub fn score_path(location: &LocationExtraction, path: &str) -> f64 {
    let (province, district, ward) = ward_triple(path);

    let parts = [
        (supplied(&location.ward), ward, WARD_WEIGHT),
        (supplied(&location.district), district, DISTRICT_WEIGHT),
        (supplied(&location.province), province, PROVINCE_WEIGHT),
    ];

    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (given, segment, weight) in parts {
        if let Some(given) = given {
            weighted += similarity_ratio(given, &segment) * weight;
            total_weight += weight;
        }
    }

    if total_weight == 0.0 {
        0.0
    } else {
        weighted / total_weight
    }
}

/// Case-insensitive Levenshtein ratio in 0–100.
///
/// Uses the insertion/deletion distance normalised by the combined length,
/// so identical strings score exactly 100 and disjoint ones 0.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.trim().to_lowercase().chars().collect();
    let b: Vec<char> = b.trim().to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    let distance = total - 2 * longest_common_subsequence(&a, &b);
    (1.0 - distance as f64 / total as f64) * 100.0
}

fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::administrative::model::NewAdministrative;
    use crate::store::LibSqlBackend;

    const WESTLANDS: &str = "Kenya > Nairobi Region > Central District > Westlands Ward";

    fn loc(province: Option<&str>, district: Option<&str>, ward: Option<&str>) -> LocationExtraction {
        LocationExtraction {
            province: province.map(String::from),
            district: district.map(String::from),
            ward: ward.map(String::from),
            full_text: None,
        }
    }

    fn candidate(id: i64, score: f64) -> MatchCandidate {
        MatchCandidate {
            id,
            name: format!("Ward {id}"),
            path: format!("Kenya > R > D > Ward {id}"),
            level: AdministrativeLevel::Ward,
            score,
        }
    }

    async fn matcher_with(paths: &[&str], config: MatcherConfig) -> LocationMatcher {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        for path in paths {
            let name = path.rsplit(" > ").next().unwrap().to_string();
            db.insert_administrative(&NewAdministrative {
                code: name.to_lowercase(),
                name,
                level: AdministrativeLevel::Ward,
                parent_id: None,
                path: path.to_string(),
            })
            .await
            .unwrap();
        }
        LocationMatcher::new(db, config)
    }

    #[test]
    fn ratio_basics() {
        assert_eq!(similarity_ratio("Westlands", "westlands"), 100.0);
        assert_eq!(similarity_ratio("", ""), 100.0);
        assert_eq!(similarity_ratio("abc", "xyz"), 0.0);
        let r = similarity_ratio("Westlands", "Westland");
        assert!(r > 90.0 && r < 100.0);
    }

    #[test]
    fn identical_path_scores_exactly_100() {
        let location = loc(Some("Nairobi Region"), Some("Central District"), Some("Westlands Ward"));
        assert_eq!(score_path(&location, WESTLANDS), 100.0);
    }

    #[test]
    fn one_character_ward_typo_stays_high() {
        let location = loc(Some("Nairobi Region"), Some("Central District"), Some("Westlends Ward"));
        let score = score_path(&location, WESTLANDS);
        assert!(score < 100.0);
        assert!(score > 85.0, "score was {score}");
    }

    #[test]
    fn unsupplied_parts_are_not_scored_as_zero() {
        let ward_only = loc(None, None, Some("Westlands Ward"));
        assert_eq!(score_path(&ward_only, WESTLANDS), 100.0);

        let blank_district = loc(None, Some("  "), Some("Westlands Ward"));
        assert_eq!(score_path(&blank_district, WESTLANDS), 100.0);
    }

    #[test]
    fn nothing_supplied_scores_zero() {
        assert_eq!(score_path(&loc(None, None, None), WESTLANDS), 0.0);
        assert!(loc(None, Some(""), None).is_empty());
    }

    #[test]
    fn ward_weighs_most() {
        // Right ward, wrong province beats right province, wrong ward
        let right_ward = loc(Some("Coast"), None, Some("Westlands Ward"));
        let right_province = loc(Some("Nairobi Region"), None, Some("Kilimani"));
        assert!(score_path(&right_ward, WESTLANDS) > score_path(&right_province, WESTLANDS));
    }

    #[test]
    fn short_paths_pad_upper_levels() {
        let location = loc(Some("Nairobi Region"), None, Some("Westlands Ward"));
        // Province segment is empty for a two-segment path
        let score = score_path(&location, "Central District > Westlands Ward");
        assert!((score - 75.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn ambiguity_boundary() {
        let matcher = matcher_with(&[], MatcherConfig::default()).await;
        assert!(matcher.is_ambiguous(&[candidate(1, 90.0), candidate(2, 75.0)]));
        assert!(!matcher.is_ambiguous(&[candidate(1, 90.0), candidate(2, 74.9)]));
        assert!(!matcher.is_ambiguous(&[candidate(1, 90.0)]));
        assert!(!matcher.is_ambiguous(&[]));
        // Only the top two matter
        assert!(!matcher.is_ambiguous(&[candidate(1, 90.0), candidate(2, 60.0), candidate(3, 60.0)]));
    }

    #[tokio::test]
    async fn same_ward_name_under_two_districts_is_ambiguous() {
        let matcher = matcher_with(
            &[
                "Kenya > Nairobi Region > Central District > Township Ward",
                "Kenya > Rift Region > Nakuru District > Township Ward",
                "Kenya > Coast Region > Mombasa District > Mvita",
            ],
            MatcherConfig::default(),
        )
        .await;

        let found = matcher
            .find_matching_wards(&loc(None, None, Some("township ward")))
            .await
            .unwrap();
        assert!(similarity_ratio("township ward", "Mvita") < 60.0);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.name == "Township Ward"));
        assert_eq!(found[0].score, 100.0);
        assert_eq!(found[1].score, 100.0);
        assert!(matcher.is_ambiguous(&found));
    }

    #[tokio::test]
    async fn unique_match_ranks_first_and_is_clear() {
        let matcher = matcher_with(
            &[
                WESTLANDS,
                "Kenya > Nairobi Region > Central District > Kilimani",
                "Kenya > Coast Region > Mombasa District > Likoni Ward",
            ],
            MatcherConfig::default(),
        )
        .await;

        let found = matcher
            .find_matching_wards(&loc(
                Some("Nairobi Region"),
                Some("Central District"),
                Some("Westlands Ward"),
            ))
            .await
            .unwrap();
        assert_eq!(found[0].path, WESTLANDS);
        assert_eq!(found[0].score, 100.0);
        assert!(found.iter().skip(1).all(|c| c.score < 85.0));
        assert!(!matcher.is_ambiguous(&found));
        assert!(found.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn below_threshold_is_dropped() {
        let matcher = matcher_with(&[WESTLANDS], MatcherConfig::default()).await;
        let found = matcher
            .find_matching_wards(&loc(None, None, Some("Zzyzx")))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn thresholds_are_per_instance() {
        let strict = MatcherConfig {
            match_threshold: 99.0,
            ..MatcherConfig::default()
        };
        let matcher = matcher_with(&[WESTLANDS], strict).await;
        let found = matcher
            .find_matching_wards(&loc(None, None, Some("Westland Ward")))
            .await
            .unwrap();
        assert!(found.is_empty());

        let capped = MatcherConfig {
            max_candidates: 2,
            ..MatcherConfig::default()
        };
        let matcher = matcher_with(
            &[
                "Kenya > A > B > Township Ward",
                "Kenya > C > D > Township Ward",
                "Kenya > E > F > Township Ward",
            ],
            capped,
        )
        .await;
        let found = matcher
            .find_matching_wards(&loc(None, None, Some("Township Ward")))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn cap_below_two_still_reports_ambiguity() {
        let single = MatcherConfig {
            max_candidates: 1,
            ..MatcherConfig::default()
        };
        let matcher = matcher_with(
            &[
                "Kenya > A > B > Township Ward",
                "Kenya > C > D > Township Ward",
            ],
            single,
        )
        .await;
        let found = matcher
            .find_matching_wards(&loc(None, None, Some("Township Ward")))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(matcher.is_ambiguous(&found));
    }
}
