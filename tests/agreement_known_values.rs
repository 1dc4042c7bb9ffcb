use accord_harness::agreement::{
    bias_index, cohen_kappa, fleiss_kappa, fleiss_kappa_from_counts, gwet_ac1, pair_agreement,
    raw_agreement, AgreementError, Weighting,
};
use accord_harness::ratings::{RatingMatrix, Score};

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// Fleiss (1971) style example: 10 subjects, 14 raters, 5 categories.
fn fleiss_table() -> Vec<Vec<usize>> {
    vec![
        vec![0, 0, 0, 0, 14],
        vec![0, 2, 6, 4, 2],
        vec![0, 0, 3, 5, 6],
        vec![0, 3, 9, 2, 0],
        vec![2, 2, 8, 1, 1],
        vec![7, 7, 0, 0, 0],
        vec![3, 2, 6, 3, 0],
        vec![2, 5, 3, 2, 2],
        vec![6, 5, 2, 1, 0],
        vec![0, 2, 2, 3, 7],
    ]
}

/// Same table as a matrix: categories 1..=5, raters r0..r13 assigned in order.
fn fleiss_matrix() -> RatingMatrix {
    let mut m = RatingMatrix::new();
    for (subject, row) in fleiss_table().iter().enumerate() {
        let item = format!("s{subject}");
        let mut rater = 0;
        for (category, &count) in row.iter().enumerate() {
            for _ in 0..count {
                m.insert(&item, None, &format!("r{rater}"), category as Score + 1)
                    .unwrap();
                rater += 1;
            }
        }
    }
    m
}

/// 2x2 table a=20 (both accept), b=5, c=10, d=15.
fn textbook_pairs() -> Vec<(Score, Score)> {
    let mut pairs = vec![(1, 1); 20];
    pairs.extend(vec![(1, 0); 5]);
    pairs.extend(vec![(0, 1); 10]);
    pairs.extend(vec![(0, 0); 15]);
    pairs
}

fn two_rater_matrix(pairs: &[(Score, Score)]) -> RatingMatrix {
    let mut m = RatingMatrix::new();
    for (i, &(a, b)) in pairs.iter().enumerate() {
        let item = format!("i{i}");
        m.insert(&item, None, "a", a).unwrap();
        m.insert(&item, None, "b", b).unwrap();
    }
    m
}

#[test]
fn fleiss_kappa_matches_published_table() {
    let k = fleiss_kappa_from_counts(&fleiss_table()).unwrap();
    assert_eq!(k.subjects, 10);
    assert_eq!(k.raters_per_subject, 14);
    assert!(approx_eq(k.observed, 0.378022, 1e-6), "P = {}", k.observed);
    assert!(approx_eq(k.expected, 0.212755, 1e-6), "Pe = {}", k.expected);
    assert!(approx_eq(k.kappa.unwrap(), 0.209931, 1e-6));
    // Fleiss, Nee & Landis (1979) null standard error.
    assert!(approx_eq(k.std_err.unwrap(), 0.016965, 1e-6));
    assert!(approx_eq(k.z.unwrap(), 12.3743, 1e-3));
    assert!(k.p_value.unwrap() < 1e-12);
    assert_eq!(k.per_category.len(), 5);
    assert!(k.per_category.iter().all(|c| c.kappa.is_some()));
}

#[test]
fn fleiss_kappa_from_matrix_agrees_with_count_table() {
    let from_counts = fleiss_kappa_from_counts(&fleiss_table()).unwrap();
    let from_matrix = fleiss_kappa(&fleiss_matrix(), None).unwrap();
    assert_eq!(from_matrix.categories, vec![1, 2, 3, 4, 5]);
    assert_eq!(from_matrix.dropped_subjects, 0);
    assert!(approx_eq(
        from_matrix.kappa.unwrap(),
        from_counts.kappa.unwrap(),
        1e-12
    ));
}

#[test]
fn fleiss_kappa_drops_incomplete_subjects() {
    let mut m = fleiss_matrix();
    m.insert("partial", None, "r0", 1).unwrap();
    m.insert("partial", None, "r1", 2).unwrap();
    let k = fleiss_kappa(&m, None).unwrap();
    assert_eq!(k.subjects, 10);
    assert_eq!(k.dropped_subjects, 1);
    assert!(approx_eq(k.kappa.unwrap(), 0.209931, 1e-6));
}

#[test]
fn fleiss_counts_with_unequal_raters_are_rejected() {
    let err = fleiss_kappa_from_counts(&[vec![2, 1], vec![1, 1]]).unwrap_err();
    assert_eq!(
        err,
        AgreementError::UnequalRaters {
            subject: 1,
            got: 2,
            expected: 3
        }
    );
}

#[test]
fn gwet_ac1_on_published_table() {
    let ac1 = gwet_ac1(&fleiss_matrix(), None, 0.95).unwrap();
    assert!(approx_eq(ac1.expected, 0.196811, 1e-6));
    assert!(approx_eq(ac1.coefficient.unwrap(), 0.225614, 1e-6));
    let (lo, hi) = ac1.conf_int.unwrap();
    assert!(lo < ac1.coefficient.unwrap() && ac1.coefficient.unwrap() < hi);
}

/// Four raters, twelve units, 1..5 scale with skipped ratings (Gwet 2014).
fn raw4raters_matrix() -> RatingMatrix {
    let rows: [[Option<Score>; 4]; 12] = [
        [Some(1), Some(1), None, Some(1)],
        [Some(2), Some(2), Some(3), Some(2)],
        [Some(3), Some(3), Some(3), Some(3)],
        [Some(3), Some(3), Some(3), Some(3)],
        [Some(2), Some(2), Some(2), Some(2)],
        [Some(1), Some(2), Some(3), Some(4)],
        [Some(4), Some(4), Some(4), Some(4)],
        [Some(1), Some(1), Some(2), Some(1)],
        [Some(2), Some(2), Some(2), Some(2)],
        [None, Some(5), Some(5), Some(5)],
        [None, None, Some(1), Some(1)],
        [None, None, Some(3), None],
    ];
    let mut m = RatingMatrix::new();
    for (unit, row) in rows.iter().enumerate() {
        let item = format!("u{}", unit + 1);
        for (rater, score) in row.iter().enumerate() {
            if let Some(score) = score {
                m.insert(&item, None, &format!("rater{}", rater + 1), *score)
                    .unwrap();
            }
        }
    }
    m
}

#[test]
fn gwet_ac1_matches_published_raw_ratings_example() {
    let ac1 = gwet_ac1(&raw4raters_matrix(), None, 0.95).unwrap();
    assert_eq!(ac1.subjects, 12);
    assert_eq!(ac1.paired_subjects, 11);
    assert_eq!(ac1.categories, vec![1, 2, 3, 4, 5]);
    assert!(approx_eq(ac1.observed, 0.818182, 1e-6));
    assert!(approx_eq(ac1.expected, 0.190321, 1e-6));
    assert!(approx_eq(ac1.coefficient.unwrap(), 0.775444, 1e-6));
    assert!(approx_eq(ac1.std_err.unwrap(), 0.142950, 1e-6));

    // t(11) interval, upper bound clamped at 1.
    let (lo, hi) = ac1.conf_int.unwrap();
    assert!(approx_eq(lo, 0.460813, 1e-5), "lower = {lo}");
    assert_eq!(hi, 1.0);
    assert!(approx_eq(ac1.p_value.unwrap(), 1.0436e-4, 1e-6));
}

#[test]
fn cohen_and_ac1_on_textbook_two_by_two() {
    let pairs = textbook_pairs();
    let kappa = cohen_kappa(&pairs, Weighting::Unweighted, Some(&[0, 1])).unwrap();
    assert!(approx_eq(kappa.observed, 0.7, 1e-12));
    assert!(approx_eq(kappa.expected, 0.5, 1e-12));
    assert!(approx_eq(kappa.kappa.unwrap(), 0.4, 1e-12));

    let ac1 = gwet_ac1(&two_rater_matrix(&pairs), Some(&[0, 1]), 0.95).unwrap();
    assert!(approx_eq(ac1.expected, 0.495, 1e-12));
    assert!(approx_eq(ac1.coefficient.unwrap(), 0.405941, 1e-6));
}

#[test]
fn ac1_stays_high_when_prevalence_is_skewed() {
    // 45 joint accepts, 5 disagreements, no joint rejects: kappa collapses
    // below zero while AC1 still reflects 90% agreement.
    let mut pairs = vec![(1, 1); 45];
    pairs.extend(vec![(1, 0); 3]);
    pairs.extend(vec![(0, 1); 2]);
    let kappa = cohen_kappa(&pairs, Weighting::Unweighted, Some(&[0, 1]))
        .unwrap()
        .kappa
        .unwrap();
    let ac1 = gwet_ac1(&two_rater_matrix(&pairs), Some(&[0, 1]), 0.95)
        .unwrap()
        .coefficient
        .unwrap();
    assert!(kappa < 0.0, "kappa = {kappa}");
    assert!(ac1 > 0.8, "ac1 = {ac1}");
}

#[test]
fn raw_agreement_and_bias_on_textbook_table() {
    let pairs = textbook_pairs();
    assert!(approx_eq(pair_agreement(&pairs).unwrap(), 0.7, 1e-12));

    let raw = raw_agreement(&two_rater_matrix(&pairs)).unwrap();
    assert_eq!(raw.subjects, 50);
    assert!(approx_eq(raw.all_agree, 0.7, 1e-12));
    assert!(approx_eq(raw.pairwise, 0.7, 1e-12));

    let bi = bias_index(&pairs).unwrap();
    assert!(approx_eq(bi.bias_index, -0.1, 1e-12));
    assert!(approx_eq(bi.pabak, 0.4, 1e-12));
}

#[test]
fn constant_raters_have_undefined_kappa() {
    let pairs = vec![(1, 1); 10];
    let kappa = cohen_kappa(&pairs, Weighting::Unweighted, None).unwrap();
    assert_eq!(kappa.kappa, None);
    assert_eq!(kappa.std_err, None);

    let fleiss = fleiss_kappa_from_counts(&[vec![0, 3], vec![0, 3]]).unwrap();
    assert_eq!(fleiss.kappa, None);
}

#[test]
fn weighted_kappa_credits_near_misses() {
    let pairs: Vec<(Score, Score)> = vec![(1, 2), (2, 3), (3, 4), (4, 5), (5, 5), (1, 1), (3, 3)];
    let scale = [1, 2, 3, 4, 5];
    let plain = cohen_kappa(&pairs, Weighting::Unweighted, Some(&scale))
        .unwrap()
        .kappa
        .unwrap();
    let linear = cohen_kappa(&pairs, Weighting::Linear, Some(&scale))
        .unwrap()
        .kappa
        .unwrap();
    let quadratic = cohen_kappa(&pairs, Weighting::Quadratic, Some(&scale))
        .unwrap()
        .kappa
        .unwrap();
    assert!(plain < linear, "{plain} vs {linear}");
    assert!(linear < quadratic, "{linear} vs {quadratic}");
}
