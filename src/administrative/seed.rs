//! Loading the administrative hierarchy from a JSON tree.
//!
//! ```json
//! {"name": "Kenya", "code": "KE", "children": [
//!   {"name": "Nairobi Region", "children": [ ... ]}
//! ]}
//! ```
//!
//! A file may hold one root object or an array of roots. Levels follow depth
//! (country, region, district, ward).

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::administrative::model::{AdministrativeLevel, NewAdministrative, join_path};
use crate::error::{ConfigError, OnboardingError, Result};
use crate::store::Database;

/// One node of the seed tree.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedNode {
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub children: Vec<SeedNode>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedFile {
    Many(Vec<SeedNode>),
    One(SeedNode),
}

/// Parse seed JSON into its root nodes.
pub fn parse_seed(json: &str) -> Result<Vec<SeedNode>> {
    let parsed: SeedFile = serde_json::from_str(json)
        .map_err(|e| OnboardingError::InvalidSeed(format!("malformed JSON: {e}")))?;
    Ok(match parsed {
        SeedFile::Many(roots) => roots,
        SeedFile::One(root) => vec![root],
    })
}

/// Read and parse a seed file.
pub fn load_seed_file(path: &Path) -> Result<Vec<SeedNode>> {
    let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_seed(&raw)
}

/// Insert every node of `roots` and return how many areas were written.
///
/// Trees deeper than country > region > district > ward are rejected before
/// anything is inserted.
pub async fn seed_administrative(db: &dyn Database, roots: &[SeedNode]) -> Result<usize> {
    for root in roots {
        validate(root, 0, &mut Vec::new())?;
    }

    let mut inserted = 0;
    for root in roots {
        // Iterative walk: (node, depth, parent id, ancestor names)
        let mut stack: Vec<(&SeedNode, usize, Option<i64>, Vec<String>)> =
            vec![(root, 0, None, Vec::new())];

        while let Some((node, depth, parent_id, mut lineage)) = stack.pop() {
            let level = AdministrativeLevel::from_depth(depth).ok_or_else(|| {
                OnboardingError::InvalidSeed(format!("'{}' is below ward level", node.name))
            })?;
            lineage.push(node.name.trim().to_string());

            let path = join_path(&lineage);
            let code = node
                .code
                .clone()
                .unwrap_or_else(|| default_code(&lineage));
            let id = db
                .insert_administrative(&NewAdministrative {
                    code,
                    name: node.name.trim().to_string(),
                    level,
                    parent_id,
                    path,
                })
                .await?;
            inserted += 1;

            for child in node.children.iter().rev() {
                stack.push((child, depth + 1, Some(id), lineage.clone()));
            }
        }
    }

    info!(inserted, "Administrative areas seeded");
    Ok(inserted)
}

fn validate(node: &SeedNode, depth: usize, lineage: &mut Vec<String>) -> Result<()> {
    lineage.push(node.name.clone());
    if node.name.trim().is_empty() {
        return Err(OnboardingError::InvalidSeed(format!(
            "empty name under '{}'",
            join_path(&lineage[..lineage.len() - 1])
        ))
        .into());
    }
    if AdministrativeLevel::from_depth(depth).is_none() {
        return Err(OnboardingError::InvalidSeed(format!(
            "'{}' is below ward level",
            join_path(lineage)
        ))
        .into());
    }
    for child in &node.children {
        validate(child, depth + 1, lineage)?;
    }
    lineage.pop();
    Ok(())
}

fn default_code(lineage: &[String]) -> String {
    lineage
        .iter()
        .map(|s| s.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-"))
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::LibSqlBackend;

    const KENYA: &str = r#"
    {
      "name": "Kenya", "code": "KE",
      "children": [
        {"name": "Nairobi Region", "children": [
          {"name": "Central District", "children": [
            {"name": "Westlands Ward"},
            {"name": "Parklands Ward", "code": "PKL"}
          ]}
        ]}
      ]
    }"#;

    #[tokio::test]
    async fn seeds_levels_and_paths() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let roots = parse_seed(KENYA).unwrap();

        let n = seed_administrative(&db, &roots).await.unwrap();
        assert_eq!(n, 5);

        let wards = db
            .list_administrative_by_level(AdministrativeLevel::Ward)
            .await
            .unwrap();
        assert_eq!(wards.len(), 2);
        assert_eq!(
            wards[0].path,
            "Kenya > Nairobi Region > Central District > Westlands Ward"
        );
        assert_eq!(wards[0].code, "kenya.nairobi-region.central-district.westlands-ward");
        assert_eq!(wards[1].code, "PKL");

        let district = db
            .get_administrative(wards[0].parent_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(district.level, AdministrativeLevel::District);
        assert_eq!(district.name, "Central District");
    }

    #[test]
    fn accepts_array_of_roots() {
        let roots = parse_seed(r#"[{"name": "Kenya"}, {"name": "Uganda"}]"#).unwrap();
        assert_eq!(roots.len(), 2);
    }

    #[test]
    fn malformed_json_is_invalid_seed() {
        let err = parse_seed("{not json").unwrap_err();
        assert!(matches!(err, Error::Onboarding(OnboardingError::InvalidSeed(_))));
    }

    #[tokio::test]
    async fn too_deep_tree_is_rejected_before_insert() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let roots = parse_seed(
            r#"{"name": "A", "children": [{"name": "B", "children": [{"name": "C",
                "children": [{"name": "D", "children": [{"name": "E"}]}]}]}]}"#,
        )
        .unwrap();

        let err = seed_administrative(&db, &roots).await.unwrap_err();
        assert!(matches!(err, Error::Onboarding(OnboardingError::InvalidSeed(_))));
        assert!(
            db.list_administrative_by_level(AdministrativeLevel::Country)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_seed_file(Path::new("/nonexistent/seed.json")).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::Io(_))));
    }
}
