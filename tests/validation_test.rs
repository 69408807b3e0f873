use triage::classifier::{FeatureUnion, VectorizerConfig};
use triage::{Classifier, ClassifierError, TransformerWeights};

fn two_document_builder() -> triage::ClassifierBuilder {
    Classifier::builder()
        .with_categories(["request", "aid_related"])
        .unwrap()
        .add_document("need water", vec![1, 1])
        .unwrap()
        .add_document("nice weather today", vec![0, 0])
        .unwrap()
        .with_seed(1)
}

#[test]
fn test_empty_category_set() {
    let result = Classifier::builder().with_categories(Vec::<String>::new());
    assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
}

#[test]
fn test_duplicate_category() {
    let result = Classifier::builder().with_categories(["request", "request"]);
    assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
}

#[test]
fn test_label_vector_length_mismatch() {
    let result = Classifier::builder()
        .with_categories(["request", "aid_related"])
        .unwrap()
        .add_document("need water", vec![1]);
    assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
}

#[test]
fn test_non_binary_label() {
    let result = Classifier::builder()
        .with_categories(["request"])
        .unwrap()
        .add_document("need water", vec![2]);
    assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
}

#[test]
fn test_build_without_documents() {
    let result = Classifier::builder()
        .with_categories(["request"])
        .unwrap()
        .build();
    assert!(matches!(result, Err(ClassifierError::BuildError(_))));

    let result = Classifier::builder().build();
    assert!(matches!(result, Err(ClassifierError::BuildError(_))));
}

#[test]
fn test_invalid_training_config() {
    let result = two_document_builder().with_cv_folds(1).train();
    assert!(result.is_err());

    let result = two_document_builder().with_test_size(1.0).train();
    assert!(matches!(result, Err(ClassifierError::ValidationError(_))));
}

#[test]
fn test_unknown_branch_weight_rejected() {
    let mut union = FeatureUnion::standard(VectorizerConfig::default());
    let weights = TransformerWeights::new().with("no_such_branch", 1.0);
    assert!(union.set_weights(&weights).is_err());

    let result = two_document_builder()
        .with_weights(TransformerWeights::standard(1.0, 0.5).with("no_such_branch", 2.0))
        .build();
    assert!(result.is_err());
}

#[test]
fn test_category_mismatch_detected() {
    let classifier = two_document_builder().build().unwrap();
    assert!(classifier.ensure_categories(&["request", "aid_related"]).is_ok());

    match classifier.ensure_categories(&["aid_related", "request"]) {
        Err(ClassifierError::CategoryMismatch { expected, found }) => {
            assert_eq!(expected, vec!["aid_related", "request"]);
            assert_eq!(found, vec!["request", "aid_related"]);
        }
        other => panic!("expected CategoryMismatch, got {:?}", other),
    }
}

#[test]
fn test_load_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let result = Classifier::load(dir.path().join("missing.bin"));
    assert!(matches!(result, Err(ClassifierError::ModelError(_))));
}

#[test]
fn test_corrupt_artifact_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("classifier.bin");
    two_document_builder().build()?.save(&path)?;

    let mut bytes = std::fs::read(&path)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes)?;
    assert!(matches!(Classifier::load(&path), Err(ClassifierError::ModelError(_))));

    std::fs::write(&path, b"not an artifact")?;
    assert!(matches!(Classifier::load(&path), Err(ClassifierError::ModelError(_))));
    Ok(())
}
