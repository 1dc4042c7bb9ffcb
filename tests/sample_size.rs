use accord_harness::sample_size::{
    achieved_power, power_binary, precision_binary, PowerRequest, PrecisionRequest,
    SampleSizeError,
};

fn power(kappa0: f64, kappa1: f64, prevalence: f64, raters: usize) -> usize {
    power_binary(&PowerRequest {
        kappa0,
        kappa1,
        prevalence,
        raters,
        ..PowerRequest::default()
    })
    .unwrap()
    .subjects
}

#[test]
fn detecting_moderate_kappa_against_chance_needs_32_subjects() {
    let est = power_binary(&PowerRequest {
        kappa0: 0.0,
        kappa1: 0.5,
        prevalence: 0.5,
        raters: 2,
        alpha: 0.05,
        power: 0.8,
    })
    .unwrap();
    assert_eq!(est.subjects, 32);
    assert!((est.exact - 31.3955).abs() < 1e-3, "exact = {}", est.exact);
    // (1.959964 + 0.841621)^2
    assert!((est.noncentrality - 7.848879).abs() < 1e-5);
}

#[test]
fn default_request_and_rater_counts() {
    assert_eq!(power(0.4, 0.6, 0.5, 2), 165);
    assert_eq!(power(0.4, 0.6, 0.5, 3), 87);
    assert_eq!(power(0.4, 0.6, 0.5, 5), 49);
}

#[test]
fn more_raters_and_larger_effects_need_fewer_subjects() {
    let mut last = usize::MAX;
    for raters in 2..=6 {
        let n = power(0.4, 0.6, 0.5, raters);
        assert!(n <= last, "raters={raters}: {n} > {last}");
        last = n;
    }
    assert!(power(0.4, 0.8, 0.5, 2) < power(0.4, 0.6, 0.5, 2));
}

#[test]
fn skewed_prevalence_needs_more_subjects() {
    assert!(power(0.4, 0.6, 0.3, 2) > power(0.4, 0.6, 0.5, 2));
    assert_eq!(power(0.4, 0.6, 0.3, 2), 191);
}

#[test]
fn perfect_alternative_is_supported() {
    assert_eq!(power(0.4, 1.0, 0.5, 2), 19);
}

#[test]
fn rounded_sample_reaches_requested_power() {
    let est = power_binary(&PowerRequest {
        kappa0: 0.0,
        kappa1: 0.5,
        ..PowerRequest::default()
    })
    .unwrap();
    let at_n = achieved_power(0.0, 0.5, 0.5, 2, 0.05, est.subjects).unwrap();
    let below = achieved_power(0.0, 0.5, 0.5, 2, 0.05, est.subjects - 1).unwrap();
    assert!(at_n >= 0.8, "power at n = {at_n}");
    assert!(below < 0.8, "power at n-1 = {below}");
}

#[test]
fn precision_for_kappa_point_six_within_point_one() {
    let est = precision_binary(&PrecisionRequest::default()).unwrap();
    assert!((est.variance_per_subject - 0.64).abs() < 1e-12);
    assert_eq!(est.subjects, 246);
}

#[test]
fn halving_the_half_width_quadruples_subjects() {
    let wide = precision_binary(&PrecisionRequest {
        half_width: 0.2,
        ..PrecisionRequest::default()
    })
    .unwrap();
    let narrow = precision_binary(&PrecisionRequest {
        half_width: 0.1,
        ..PrecisionRequest::default()
    })
    .unwrap();
    assert!((narrow.exact / wide.exact - 4.0).abs() < 1e-9);
}

#[test]
fn invalid_inputs_are_rejected() {
    let base = PowerRequest::default();
    let cases = [
        (
            PowerRequest {
                prevalence: 0.0,
                ..base.clone()
            },
            SampleSizeError::Prevalence(0.0),
        ),
        (
            PowerRequest {
                kappa1: 0.4,
                ..base.clone()
            },
            SampleSizeError::NoEffect,
        ),
        (
            PowerRequest {
                raters: 1,
                ..base.clone()
            },
            SampleSizeError::Raters(1),
        ),
        (
            PowerRequest {
                alpha: 1.5,
                ..base.clone()
            },
            SampleSizeError::Alpha(1.5),
        ),
        (
            PowerRequest {
                power: 1.0,
                ..base.clone()
            },
            SampleSizeError::Power(1.0),
        ),
        (
            PowerRequest {
                kappa0: 1.0,
                ..base.clone()
            },
            SampleSizeError::NullKappa(1.0),
        ),
    ];
    for (req, expected) in cases {
        assert_eq!(power_binary(&req).unwrap_err(), expected);
    }

    assert_eq!(
        precision_binary(&PrecisionRequest {
            half_width: 0.0,
            ..PrecisionRequest::default()
        })
        .unwrap_err(),
        SampleSizeError::HalfWidth(0.0)
    );
    assert_eq!(
        achieved_power(0.0, 0.5, 0.5, 2, 0.05, 0).unwrap_err(),
        SampleSizeError::NoSubjects
    );
}
