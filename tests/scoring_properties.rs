// Scoring properties through the public API: FRA, RV and What-If
use rstest::rstest;
use std::collections::BTreeMap;

use fitrep_rv::fitrep::{OccasionCode, TRAIT_NAMES};
use fitrep_rv::scoring::{
    compute_fra_from_letters, compute_rv, predict_impact, CohortMember, Eligibility, Fra, HypotheticalReport, RvAnchors,
};

fn fra(s: &str) -> Fra {
    s.parse().unwrap()
}

fn cohort(values: &[&str]) -> Vec<Fra> {
    values.iter().map(|v| fra(v)).collect()
}

#[rstest]
#[case(&["A"], Some("1.00"))]
#[case(&["A", "G"], Some("4.00"))]
#[case(&["G", "A"], Some("4.00"))]
#[case(&["H", "H", "H"], None)]
#[case(&["B", "H", "C"], Some("2.50"))]
#[case(&[], None)]
fn test_fra_of_letters(#[case] letters: &[&str], #[case] expected: Option<&str>) {
    let result = compute_fra_from_letters(letters.iter().copied());
    assert_eq!(result.map(|f| f.to_string()), expected.map(String::from));
}

#[rstest]
#[case("3.00", &["3.00", "3.00", "3.00"], Some(90))]
#[case("4.00", &["2.00", "3.00", "4.00"], Some(100))]
#[case("3.00", &["2.00", "3.00", "4.00"], Some(90))]
#[case("2.00", &["2.00", "3.00", "4.00"], Some(80))]
#[case("3.50", &["2.00", "3.00", "4.00"], Some(95))]
#[case("2.50", &["2.00", "3.00", "4.00"], Some(85))]
#[case("3.45", &["2.00", "3.00", "4.00"], Some(94))]
#[case("2.35", &["2.00", "3.00", "4.00"], Some(84))]
#[case("4.00", &["4.00", "3.00"], None)]
#[case("1.00", &["1.00"], None)]
fn test_rv_within_cohort(#[case] target: &str, #[case] members: &[&str], #[case] expected: Option<u8>) {
    assert_eq!(compute_rv(fra(target), &cohort(members)), expected);
}

#[test]
fn test_anchors_map_back_to_80_90_100() {
    let members = cohort(&["4.57", "3.86", "5.14", "4.21", "3.93"]);
    let anchors = RvAnchors::from_cohort(&members).unwrap();

    assert_eq!(anchors.rv_for(anchors.max_fra), 100);
    assert_eq!(anchors.rv_for(anchors.mean_fra), 90);
    assert_eq!(anchors.rv_for(anchors.floor_fra), 80);
}

#[test]
fn test_rv_is_monotonic_and_bounded() {
    let members = cohort(&["4.57", "3.86", "5.14", "4.21", "3.93", "2.00"]);
    let mut last = 0;
    for hundredths in (100..=700).step_by(7) {
        let rv = compute_rv(Fra::from_hundredths(hundredths), &members).unwrap();
        assert!((80..=100).contains(&rv));
        assert!(rv >= last);
        last = rv;
    }
}

#[test]
fn test_what_if_against_a_mixed_cohort() {
    let existing: Vec<CohortMember<i64>> = [
        (1, "4.00", OccasionCode::Annual),
        (2, "3.00", OccasionCode::Transfer),
        (3, "2.00", OccasionCode::Annual),
        (4, "6.50", OccasionCode::EndOfService),
    ]
    .iter()
    .map(|&(id, value, occasion)| CohortMember {
        id,
        fra: Some(fra(value)),
        occasion: Some(occasion),
        not_observed: false,
    })
    .collect();

    let grades: BTreeMap<String, String> = TRAIT_NAMES.iter().map(|n| (n.to_string(), "D".to_string())).collect();
    let hypothetical = HypotheticalReport {
        label: "next annual".to_string(),
        grades,
        occasion: Some(OccasionCode::Annual),
    };

    let unchanged = predict_impact(&existing, &[], &Eligibility::default());
    assert!(unchanged.existing.iter().all(|e| e.old_rv == e.new_rv));
    assert_eq!(unchanged.existing[3].old_rv, None);

    let prediction = predict_impact(&existing, &[hypothetical], &Eligibility::default());
    assert_eq!(prediction.current.total_reports, 3);
    assert_eq!(prediction.predicted.total_reports, 4);
    assert_eq!(prediction.hypotheticals[0].fra, Some(fra("4.00")));
    assert_eq!(prediction.hypotheticals[0].predicted_rv, Some(100));
    assert_eq!(prediction.existing[0].new_rv, Some(100));
    assert_eq!(prediction.existing[3].new_rv, None);
}
