use anyhow::Result;
use occacia_core::{AiAnalysis, BudgetTier, MatchCriteria, Package, MATCH_LIMIT};
use occacia_storage::CatalogRepository;
use tracing::info;

/// Queries the catalog for packages fitting the analysed criteria, at most [`MATCH_LIMIT`].
///
/// Returns an empty list without touching the catalog when the flow reported it could not
/// supply criteria. Catalog errors are passed through unchanged.
pub async fn find_matches<C>(analysis: &AiAnalysis, catalog: &C) -> Result<Vec<Package>>
where
    C: CatalogRepository,
{
    let Some(criteria) = MatchCriteria::from_analysis(analysis) else {
        info!("ai flow reported service unavailable, catalog not queried");
        return Ok(Vec::new());
    };

    info!(
        intent = analysis.intent.as_str(),
        location = ?criteria.location,
        budget = analysis.budget.map(BudgetTier::as_str).unwrap_or("none"),
        price = ?criteria.price,
        tags = ?criteria.tags,
        unconstrained = criteria.is_unconstrained(),
        "matching packages"
    );

    let mut matches = catalog.find_packages(&criteria, MATCH_LIMIT).await?;
    matches.truncate(MATCH_LIMIT);

    info!(matches = matches.len(), "package matches found");
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use occacia_core::{Intent, SERVICE_UNAVAILABLE};
    use occacia_storage::{seed_demo_catalog, MemoryStore};

    async fn catalog() -> MemoryStore {
        let store = MemoryStore::new();
        seed_demo_catalog(&store).await.unwrap();
        store
    }

    fn kandy_quiet(budget: BudgetTier) -> AiAnalysis {
        AiAnalysis {
            intent: Intent::Planning,
            location: Some("Kandy".to_string()),
            budget: Some(budget),
            tags: vec!["quiet".to_string()],
            ..AiAnalysis::default()
        }
    }

    #[tokio::test]
    async fn cheap_budget_excludes_kandy_package() {
        let matches = find_matches(&kandy_quiet(BudgetTier::Cheap), &catalog().await)
            .await
            .unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn moderate_budget_finds_kandy_package() {
        let matches = find_matches(&kandy_quiet(BudgetTier::Moderate), &catalog().await)
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "The Hermit's Dinner");
        assert_eq!(matches[0].price, 3_500.0);
    }

    #[tokio::test]
    async fn service_unavailable_short_circuits() {
        let mut analysis = kandy_quiet(BudgetTier::Moderate);
        analysis.missing_info.push(SERVICE_UNAVAILABLE.to_string());
        let matches = find_matches(&analysis, &catalog().await).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn no_criteria_returns_at_most_limit() {
        let analysis = AiAnalysis {
            intent: Intent::Planning,
            ..AiAnalysis::default()
        };
        let matches = find_matches(&analysis, &catalog().await).await.unwrap();
        assert_eq!(matches.len(), MATCH_LIMIT);
    }

    #[tokio::test]
    async fn budget_tiers_respect_price_bounds() {
        let store = catalog().await;
        for tier in [BudgetTier::Cheap, BudgetTier::Moderate, BudgetTier::Luxury] {
            let analysis = AiAnalysis {
                intent: Intent::Planning,
                budget: Some(tier),
                ..AiAnalysis::default()
            };
            let range = tier.price_range();
            let matches = find_matches(&analysis, &store).await.unwrap();
            assert!(!matches.is_empty(), "tier {tier:?}");
            assert!(matches.iter().all(|package| range.contains(package.price)));
        }
    }
}
