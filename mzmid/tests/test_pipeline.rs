use mzmid::{
    CancellationToken, Composition, ExtractionParams, IdentificationRecord, IsotopeModel,
    LabelSpacing, LabelingMetric, MidExtractor, MidStatus, Scan, SpectralIndex,
};

const PEPTIDE_FORMULA: &str = "C34H53N7O15";

fn elution(t: f64, apex: f64) -> f32 {
    (2e5 * (-((t - apex) / 0.08).powi(2) / 2.0).exp()) as f32
}

/// A run from 20 to 25 minutes with a labeled PEPTIDE eluting at 22.0 and an unlabeled
/// copy of it at 23.5
fn make_index(model: &IsotopeModel) -> SpectralIndex {
    let specs = model
        .specs(&Composition::Peptide("PEPTIDE".into()), 2)
        .unwrap();
    let labeled = [0.5, 0.25, 0.15, 0.1];
    let mut builder = SpectralIndex::builder();
    for i in 0..=250 {
        let t = 20.0 + i as f64 * 0.02;
        let mut points = Vec::new();
        for (spec, share) in specs.iter().zip(labeled) {
            let natural = if spec.index == 0 { 1.0 } else { 0.0 };
            points.push((spec.mz, elution(t, 22.0) * share + elution(t, 23.5) * natural));
        }
        points.push((445.12, 1e4));
        let id = format!("controllerType=0 controllerNumber=1 scan={}", i + 1);
        builder.push_scan(Scan::new(i, id, t, points));
    }
    builder.build()
}

#[test_log::test]
fn test_batch_extraction() {
    let params = ExtractionParams {
        isotopologue_count: 3,
        retention_time_margin: 0.5,
        ..Default::default()
    };
    let index = make_index(&params.isotope_model());
    assert_eq!(index.len(), 251);

    let records = vec![
        IdentificationRecord::new(0, "PEPTIDE", 2, 22.0).with_sample("day-1"),
        IdentificationRecord::new(1, "K.PEPTIDE.R", 2, 23.5).with_sample("day-0"),
        IdentificationRecord::new(2, "PEPTIDE", 2, 22.1).with_formula(PEPTIDE_FORMULA),
        IdentificationRecord::new(3, "PEPTIDE", 2, 60.0),
        IdentificationRecord::new(4, "PEPTIDE", -2, 22.0),
    ];

    let extractor = MidExtractor::new(&index, params);
    let (rows, summary) = extractor.run_batch(&records);
    assert_eq!(rows.len(), records.len());
    assert_eq!(summary.ok, 3);
    assert_eq!(summary.insufficient_data, 1);
    assert_eq!(summary.invalid_input, 1);

    let labeled = &rows[0];
    assert_eq!(labeled.sample, "day-1");
    assert!(labeled.is_valid());
    assert_eq!(labeled.isotopologue_count(), 4);
    assert!((labeled.abundances[0] - 0.5).abs() < 0.01);
    assert!((labeled.labeling.unwrap() - 0.5).abs() < 0.01);

    let unlabeled = &rows[1];
    assert!(unlabeled.abundances[0] > 0.99);
    assert!(unlabeled.labeling.unwrap() < 0.01);
    let boundary = unlabeled.boundary.unwrap();
    assert!((boundary.apex_time - 23.5).abs() < 0.03);

    // The formula resolves to the same mass as the sequence
    for (a, b) in rows[2].abundances.iter().zip(labeled.abundances.iter()) {
        assert!((a - b).abs() < 1e-6);
    }

    assert_eq!(rows[3].status, MidStatus::InsufficientData);
    assert_eq!(rows[4].status, MidStatus::InvalidInput);
    assert!(rows[3..].iter().all(|r| !r.valid && r.abundances.iter().all(|f| *f == 0.0)));
}

#[test_log::test]
fn test_natural_abundance_labeling() {
    let params = ExtractionParams {
        isotopologue_count: 3,
        retention_time_margin: 0.5,
        labeling_metric: LabelingMetric::NaturalAbundanceCorrected,
        ..Default::default()
    };
    let index = make_index(&params.isotope_model());
    let extractor = MidExtractor::new(&index, params);
    let mid = extractor
        .process(&IdentificationRecord::new(0, "PEPTIDE", 2, 23.5))
        .unwrap();
    // A distribution purer than natural abundance is not labeled
    assert_eq!(mid.labeling, Some(0.0));

    let mid = extractor
        .process(&IdentificationRecord::new(1, "PEPTIDE", 2, 22.0))
        .unwrap();
    let labeling = mid.labeling.unwrap();
    assert!(labeling > 0.0 && labeling <= 1.0);
}

#[test_log::test]
fn test_deuterium_spacing_misses_carbon_peaks() {
    let carbon = ExtractionParams {
        isotopologue_count: 3,
        retention_time_margin: 0.5,
        mass_tolerance_ppm: 2.0,
        ..Default::default()
    };
    let index = make_index(&carbon.isotope_model());
    let deuterium = ExtractionParams {
        label_spacing: LabelSpacing::Deuterium,
        ..carbon
    };
    let mid = MidExtractor::new(&index, deuterium)
        .process(&IdentificationRecord::new(0, "PEPTIDE", 2, 22.0))
        .unwrap();
    // Only the monoisotopic peak is shared by both spacings
    assert_eq!(mid.abundances, vec![1.0, 0.0, 0.0, 0.0]);
}

#[test_log::test]
fn test_retention_time_from_scan_id() {
    let params = ExtractionParams::default();
    let index = make_index(&params.isotope_model());
    let t = index.time_of_scan("scan=101").unwrap();
    assert!((t - 22.0).abs() < 1e-9);
    assert_eq!(index.time_of_scan("101"), Some(t));
    assert!(index.time_of_scan("scan=9999").is_none());
}

#[test_log::test]
fn test_cancel_mid_batch() {
    let params = ExtractionParams {
        isotopologue_count: 3,
        retention_time_margin: 0.5,
        ..Default::default()
    };
    let index = make_index(&params.isotope_model());
    let records: Vec<_> = (0..64)
        .map(|i| IdentificationRecord::new(i, "PEPTIDE", 2, 22.0))
        .collect();
    let token = CancellationToken::new();
    let extractor = MidExtractor::new(&index, params).with_cancellation(token.clone());
    // A single worker visits the records in order
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap();
    let summary = pool.install(|| {
        extractor.run_batch_with(&records, |i, mid| {
            assert_eq!(mid.index, i);
            assert!(mid.is_valid());
            if i == 3 {
                token.cancel();
            }
        })
    });
    assert_eq!(summary.total(), records.len());
    assert!(summary.cancelled > 0);
    assert!(summary.ok >= 4);
    assert_eq!(summary.ok + summary.cancelled, records.len());
}
