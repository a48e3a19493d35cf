// Per-cohort RV recomputation, serialized per cohort key
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::sqlite_storage::ReportStore;
use crate::fitrep::codes::TraitGrade;
use crate::scoring::cohort::{score_cohort, CohortKey, Eligibility};
use crate::scoring::fra::Fra;
use crate::scoring::relative_value::RvAnchors;
use crate::types::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecomputeSummary {
    pub key: CohortKey,
    pub anchors: Option<RvAnchors>,
    pub scored: usize,
    pub excluded: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegradeOutcome {
    pub id: i64,
    pub fra: Option<Fra>,
    pub cohort: Option<RecomputeSummary>,
}

/// Owns the store and one lock per cohort key. Two recomputes of the same
/// cohort never interleave; different cohorts proceed independently.
pub struct CohortRecalculator {
    store: Arc<Mutex<ReportStore>>,
    eligibility: Eligibility,
    locks: Mutex<HashMap<CohortKey, Arc<Mutex<()>>>>,
}

impl CohortRecalculator {
    pub fn new(store: ReportStore, eligibility: Eligibility) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            eligibility,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<Mutex<ReportStore>> {
        self.store.clone()
    }

    pub fn eligibility(&self) -> &Eligibility {
        &self.eligibility
    }

    async fn lock_for(&self, key: &CohortKey) -> Arc<Mutex<()>> {
        self.locks.lock().await.entry(key.clone()).or_default().clone()
    }

    /// Snapshot the cohort, score it, and cache the new RVs.
    pub async fn recompute(&self, key: &CohortKey) -> Result<RecomputeSummary> {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        let members = self.store.lock().await.cohort_members(key)?;
        let scores = score_cohort(&members, &self.eligibility);
        self.store.lock().await.store_relative_values(&scores)?;

        let summary = RecomputeSummary {
            key: key.clone(),
            anchors: scores.anchors,
            scored: scores.scored.len(),
            excluded: scores.excluded.len(),
        };
        debug!("cohort {}: {} scored, {} excluded", key, summary.scored, summary.excluded);
        Ok(summary)
    }

    /// Recompute each distinct key once, in key order.
    pub async fn recompute_keys<I>(&self, keys: I) -> Result<Vec<RecomputeSummary>>
    where
        I: IntoIterator<Item = CohortKey>,
    {
        let keys: BTreeSet<CohortKey> = keys.into_iter().collect();
        let mut summaries = Vec::with_capacity(keys.len());
        for key in &keys {
            summaries.push(self.recompute(key).await?);
        }
        info!("recomputed {} cohort(s)", summaries.len());
        Ok(summaries)
    }

    pub async fn recompute_all(&self) -> Result<Vec<RecomputeSummary>> {
        let keys = self.store.lock().await.cohort_keys()?;
        self.recompute_keys(keys).await
    }

    /// Replace a report's grades, then refresh its cohort if it has one.
    pub async fn regrade(&self, id: i64, grades: &[Option<TraitGrade>]) -> Result<RegradeOutcome> {
        let (fra, key) = {
            let store = self.store.lock().await;
            let fra = store.update_trait_grades(id, grades)?;
            (fra, store.cohort_key_of(id)?)
        };
        let cohort = match key {
            Some(key) => Some(self.recompute(&key).await?),
            None => None,
        };
        Ok(RegradeOutcome { id, fra, cohort })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitrep::codes::{OccasionCode, Rank};
    use crate::storage::sqlite_storage::tests::graded_report;

    fn key() -> CohortKey {
        CohortKey::new(Rank::Capt, "9876543210")
    }

    fn seeded(letters: &[char]) -> (CohortRecalculator, Vec<i64>) {
        let store = ReportStore::in_memory().unwrap();
        let ids = letters
            .iter()
            .enumerate()
            .map(|(i, &letter)| {
                let report = graded_report(&format!("M{}", i), letter, OccasionCode::Annual);
                store.insert_report(&report, None).unwrap()
            })
            .collect();
        (CohortRecalculator::new(store, Eligibility::default()), ids)
    }

    #[tokio::test]
    async fn test_recompute_caches_rvs() {
        let (recalc, ids) = seeded(&['D', 'E', 'C']);
        let summary = recalc.recompute(&key()).await.unwrap();
        assert_eq!(summary.scored, 3);
        assert_eq!(summary.anchors.unwrap().mean_fra, Fra::from_hundredths(400));

        let store = recalc.store();
        let store = store.lock().await;
        let rvs: Vec<Option<u8>> = ids
            .iter()
            .map(|&id| store.get_report(id).unwrap().relative_value.unwrap().rv)
            .collect();
        assert_eq!(rvs, vec![Some(90), Some(100), Some(80)]);
    }

    #[tokio::test]
    async fn test_small_cohort_caches_null_rv() {
        let (recalc, ids) = seeded(&['D', 'E']);
        let summary = recalc.recompute(&key()).await.unwrap();
        assert_eq!(summary.anchors, None);

        let store = recalc.store();
        let cached = store.lock().await.get_report(ids[0]).unwrap().relative_value.unwrap();
        assert_eq!(cached.rv, None);
    }

    #[tokio::test]
    async fn test_concurrent_recomputes_agree() {
        let (recalc, ids) = seeded(&['D', 'E', 'C', 'D']);
        let recalc = Arc::new(recalc);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let recalc = recalc.clone();
                tokio::spawn(async move { recalc.recompute(&key()).await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().scored, 4);
        }

        let store = recalc.store();
        let store = store.lock().await;
        assert_eq!(store.get_report(ids[1]).unwrap().relative_value.unwrap().rv, Some(100));
    }

    #[tokio::test]
    async fn test_regrade_moves_the_cohort() {
        let (recalc, ids) = seeded(&['D', 'E', 'C']);
        recalc.recompute_all().await.unwrap();

        let outcome = recalc.regrade(ids[2], &[TraitGrade::from_char('G'); 14]).await.unwrap();
        assert_eq!(outcome.fra, Some(Fra::from_hundredths(700)));
        assert_eq!(outcome.cohort.unwrap().anchors.unwrap().max_fra, Fra::from_hundredths(700));

        let store = recalc.store();
        let store = store.lock().await;
        assert_eq!(store.get_report(ids[2]).unwrap().relative_value.unwrap().rv, Some(100));
        assert!(store.get_report(ids[1]).unwrap().relative_value.unwrap().rv.unwrap() < 100);
    }

    #[tokio::test]
    async fn test_recompute_all_covers_every_key() {
        let store = ReportStore::in_memory().unwrap();
        let mut major = graded_report("X", 'D', OccasionCode::Annual);
        major.rank = Some(Rank::Maj);
        store.insert_report(&major, None).unwrap();
        store.insert_report(&graded_report("Y", 'D', OccasionCode::Annual), None).unwrap();

        let recalc = CohortRecalculator::new(store, Eligibility::default());
        let summaries = recalc.recompute_all().await.unwrap();
        assert_eq!(summaries.len(), 2);
    }
}
