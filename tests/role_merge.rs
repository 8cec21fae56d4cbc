use omws::dag::assembly::{Splice, lowest_presence_threshold, merge_dependency, splice_for};
use omws::types::{JobType, Role};
use serde_json::json;

#[test]
fn test_lowest_presence_threshold() {
    let cases = [
        ("plain lowest", json!("0.5 0.21 0.0 0.7"), "0.21"),
        ("long decimals lowered", json!("0.8 0.213456 0.3"), "0.213455"),
        ("four decimals lowered", json!("0.1234"), "0.1233"),
        ("trailing zero kept as a decimal", json!("0.5 0.12340"), "0.12339"),
        ("lowered to a round value", json!("0.12341"), "0.1234"),
        ("array of numbers", json!([0.9, 0.0012345]), "0.0012344"),
        ("array of strings", json!(["0.7", " 0.25 "]), "0.25"),
        ("only zeros", json!("0 0.0 1e-14"), "1"),
        ("empty", json!(""), "1"),
        ("garbage skipped", json!("abc 0.4 -0.2"), "0.4"),
    ];

    for (name, values, expected) in cases {
        assert_eq!(
            lowest_presence_threshold(&values).unwrap(),
            expected,
            "{name}"
        );
    }
}

#[test]
fn test_lowest_presence_threshold_rejects_other_shapes() {
    assert!(lowest_presence_threshold(&json!({ "values": "0.5" })).is_err());
    assert!(lowest_presence_threshold(&json!(0.5)).is_err());
}

#[test]
fn test_splice_table() {
    assert_eq!(splice_for(JobType::Model, &Role::Presence), Some(Splice::Points("presence")));
    assert_eq!(splice_for(JobType::Test, &Role::Absence), Some(Splice::Points("absence")));
    assert_eq!(splice_for(JobType::Projection, &Role::Model), Some(Splice::Algorithm));
    assert_eq!(splice_for(JobType::Evaluation, &Role::Model), Some(Splice::TrainingData));
    assert!(matches!(splice_for(JobType::Test, &Role::Lpt), Some(Splice::Threshold(_))));
    assert!(matches!(splice_for(JobType::Projection, &Role::Lpt), Some(Splice::Threshold(_))));

    // Gating only.
    assert_eq!(splice_for(JobType::Sampling, &Role::Presence), None);
    assert_eq!(splice_for(JobType::Model, &Role::Lpt), None);
    assert_eq!(splice_for(JobType::Projection, &Role::Presence), None);
    assert_eq!(splice_for(JobType::Test, &Role::from("mask")), None);
}

#[test]
fn test_threshold_splice_creates_missing_objects() {
    let mut template = json!({ "algorithm": null, "statistics": null });
    let splice = splice_for(JobType::Test, &Role::Lpt).unwrap();

    merge_dependency(&mut template, splice, &json!({ "values": [0.6, 0.45] })).unwrap();
    assert_eq!(template["statistics"]["confusion_matrix"]["threshold"], "0.45");
    assert!(template["algorithm"].is_null());
}

#[test]
fn test_merge_reports_missing_fields() {
    let mut template = json!({ "sampler": { "presence": null } });

    let err = merge_dependency(&mut template, Splice::Points("presence"), &json!({ "points": 3 })).unwrap_err();
    assert!(err.contains("'presence'"), "{err}");

    let err = merge_dependency(
        &mut template,
        Splice::TrainingData,
        &json!({ "serialized_model": { "algorithm": { "id": "GARP" } } }),
    )
    .unwrap_err();
    assert!(err.contains("serialized_model.sampler"), "{err}");
    // Nothing was spliced before the failure.
    assert!(template.get("algorithm").is_none());

    let err = merge_dependency(&mut json!([]), Splice::Algorithm, &json!({ "serialized_model": { "algorithm": 1 } }))
        .unwrap_err();
    assert!(err.contains("not a JSON object"), "{err}");
}
