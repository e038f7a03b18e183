//! Compensation paths: every failed write sequence leaves no partial records.

use std::sync::Arc;

use termbase_db::test_fixtures::{FaultOp, FaultyStore, TestRegistry};
use termbase_db::{
    Concept, ConceptVersion, Database, Error, ParentRef, Record, RecordStore, Source,
    SourceVersion, User, VersionChanges, NON_FIELD_ERRORS,
};

async fn faulty_registry() -> (TestRegistry, Arc<FaultyStore>) {
    let faulty = Arc::new(FaultyStore::memory());
    let reg = TestRegistry::with_store(RecordStore::new(faulty.clone())).await;
    (reg, faulty)
}

#[tokio::test]
async fn test_concept_rolled_back_when_version_insert_fails() {
    let (reg, faulty) = faulty_registry().await;
    faulty.fail(FaultOp::Insert, ConceptVersion::COLLECTION);

    let mut concept = reg.concept("concept1");
    let errors = reg
        .db
        .concepts
        .persist_new(&mut concept, Some(&reg.user1), Some(&reg.source1), None)
        .await;
    assert_eq!(
        errors.get(NON_FIELD_ERRORS).unwrap(),
        ["An error occurred while trying to persist new Concept."]
    );

    faulty.clear();
    assert!(reg.db.concepts.get(concept.id).await.unwrap().is_none());
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 0);
    assert!(reg.current_version(&reg.source1).await.concepts.is_empty());
}

#[tokio::test]
async fn test_concept_rolled_back_when_index_update_fails() {
    let (reg, faulty) = faulty_registry().await;
    faulty.fail(FaultOp::Update, SourceVersion::COLLECTION);

    let mut concept = reg.concept("concept1");
    let errors = reg
        .db
        .concepts
        .persist_new(&mut concept, Some(&reg.user1), Some(&reg.source1), None)
        .await;
    assert!(errors.contains(NON_FIELD_ERRORS));

    faulty.clear();
    assert!(reg.db.concepts.get(concept.id).await.unwrap().is_none());
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 0);

    // The mnemonic is free again.
    let retry = reg.create_concept("concept1", &reg.source1).await;
    assert_eq!(reg.db.concepts.num_versions(&retry).await.unwrap(), 1);
}

#[tokio::test]
async fn test_source_rolled_back_when_initial_version_fails() {
    let (reg, faulty) = faulty_registry().await;
    faulty.fail(FaultOp::Insert, SourceVersion::COLLECTION);

    let mut source = Source::new("source3", "source3");
    let errors = reg
        .db
        .sources
        .persist_new(&mut source, Some(&reg.user1), Some(ParentRef::Organization(reg.org1.id)))
        .await;
    assert_eq!(
        errors.get(NON_FIELD_ERRORS).unwrap(),
        ["An error occurred while trying to persist new Source."]
    );

    faulty.clear();
    assert!(reg.db.sources.get(source.id).await.unwrap().is_none());
    assert_eq!(reg.db.sources.num_versions(&source).await.unwrap(), 0);
}

#[tokio::test]
async fn test_release_swap_restored_when_new_version_fails() {
    let (reg, faulty) = faulty_registry().await;
    let current = reg.current_version(&reg.source1).await;
    faulty.fail(FaultOp::Insert, SourceVersion::COLLECTION);

    let mut version =
        SourceVersion::for_base_object(&reg.source1, "v1", Some(&current), None, true);
    let errors = reg
        .db
        .source_versions
        .persist_new(&mut version, VersionChanges::default())
        .await;
    assert_eq!(
        errors.get(NON_FIELD_ERRORS).unwrap(),
        ["Encountered an error while updating version."]
    );

    faulty.clear();
    let restored = reg.db.source_versions.get(current.id).await.unwrap().unwrap();
    assert!(restored.released);
    assert_eq!(reg.current_version(&reg.source1).await.id, current.id);
    assert!(reg.db.source_versions.get(version.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_new_release_removed_when_demotion_fails() {
    let (reg, faulty) = faulty_registry().await;
    let current = reg.current_version(&reg.source1).await;
    // The insert of v1 succeeds; un-releasing the current version does not.
    faulty.fail(FaultOp::Update, SourceVersion::COLLECTION);

    let mut version =
        SourceVersion::for_base_object(&reg.source1, "v1", Some(&current), None, true);
    let errors = reg
        .db
        .source_versions
        .persist_new(&mut version, VersionChanges::default())
        .await;
    assert_eq!(
        errors.get(NON_FIELD_ERRORS).unwrap(),
        ["Encountered an error while updating version."]
    );

    faulty.clear();
    assert!(reg.db.source_versions.get(version.id).await.unwrap().is_none());
    let kept = reg.db.source_versions.get(current.id).await.unwrap().unwrap();
    assert!(kept.released);
    assert_eq!(reg.current_version(&reg.source1).await.id, current.id);
}

#[tokio::test]
async fn test_retire_restored_when_version_insert_fails() {
    let (reg, faulty) = faulty_registry().await;
    let mut concept = reg.create_concept("concept1", &reg.source1).await;
    let before = reg.current_version(&reg.source1).await;
    faulty.fail(FaultOp::Insert, ConceptVersion::COLLECTION);

    let err = reg.db.concepts.retire(&mut concept).await.unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert!(!concept.retired);

    faulty.clear();
    let stored: Concept = reg.db.concepts.get(concept.id).await.unwrap().unwrap();
    assert!(!stored.retired);
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 1);
    assert_eq!(reg.current_version(&reg.source1).await.concepts, before.concepts);

    // Retiring works once storage recovers.
    assert!(reg.db.concepts.retire(&mut concept).await.unwrap());
}

#[tokio::test]
async fn test_retire_restored_when_index_update_fails() {
    let (reg, faulty) = faulty_registry().await;
    let mut concept = reg.create_concept("concept1", &reg.source1).await;
    let before = reg.current_version(&reg.source1).await;
    faulty.fail(FaultOp::Update, SourceVersion::COLLECTION);

    assert!(reg.db.concepts.retire(&mut concept).await.is_err());

    faulty.clear();
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 1);
    assert!(!reg.db.concepts.get(concept.id).await.unwrap().unwrap().retired);
    assert_eq!(reg.current_version(&reg.source1).await.concepts, before.concepts);
}

#[tokio::test]
async fn test_user_removed_when_token_insert_fails() {
    let faulty = Arc::new(FaultyStore::memory());
    let db = Database::new(RecordStore::new(faulty.clone()));
    faulty.fail(FaultOp::Insert, "auth_token");

    let user = User::new("user1", "user1@test.com");
    assert!(db.users.create_user(&user).await.is_err());

    faulty.clear();
    assert!(db.users.get(user.id).await.unwrap().is_none());
    assert!(db.users.create_user(&user).await.is_ok());
}
