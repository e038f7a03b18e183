//! Concept creation, editing, retirement and derived accessors, run against
//! the in-memory store.

use termbase_db::test_fixtures::TestRegistry;
use termbase_db::{
    Concept, ConceptVersion, HasNames, LocalizedText, ParentRef, ResourceVersion, Source,
    SourceVersion, SubResource, VersionChanges, ALL_FIELDS, ORGANIZATION_TYPE, USER_TYPE,
};

#[tokio::test]
async fn test_persist_new_positive() {
    let reg = TestRegistry::new().await;
    let source_version = reg.current_version(&reg.source1).await;
    assert!(source_version.concepts.is_empty());

    let mut concept = reg.concept("concept1");
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 0);

    let errors = reg
        .db
        .concepts
        .persist_new(&mut concept, Some(&reg.user1), Some(&reg.source1), None)
        .await;
    assert!(errors.is_empty(), "{}", errors);

    assert_eq!(concept.owner_id, Some(reg.user1.id));
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 1);

    let version = reg.db.concepts.latest_version(&concept).await.unwrap().unwrap();
    assert!(version.released);
    assert!(!version.retired);
    assert_eq!(version.mnemonic, version.id.to_string());
    assert_eq!(version.previous_version_id, None);

    let source_version = reg.current_version(&reg.source1).await;
    assert_eq!(source_version.concepts, vec![version.id]);
}

#[tokio::test]
async fn test_persist_new_without_owner() {
    let reg = TestRegistry::new().await;
    let mut concept = reg.concept("concept1");

    let errors = reg
        .db
        .concepts
        .persist_new(&mut concept, None, Some(&reg.source1), None)
        .await;
    assert_eq!(errors.len(), 1);
    assert!(errors.contains("owner"));

    assert!(reg.db.concepts.get(concept.id).await.unwrap().is_none());
    assert!(reg.current_version(&reg.source1).await.concepts.is_empty());
}

#[tokio::test]
async fn test_persist_new_without_parent() {
    let reg = TestRegistry::new().await;
    let mut concept = reg.concept("concept1");

    let errors = reg
        .db
        .concepts
        .persist_new(&mut concept, Some(&reg.user1), None, None)
        .await;
    assert_eq!(errors.len(), 1);
    assert!(errors.contains("parent"));
    assert!(reg.db.concepts.get(concept.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_persist_new_into_unsaved_source() {
    let reg = TestRegistry::new().await;
    let mut ghost = Source::new("ghost", "ghost");
    ghost.bind(reg.user1.id, ParentRef::Organization(reg.org1.id));

    let mut concept = reg.concept("concept1");
    let errors = reg
        .db
        .concepts
        .persist_new(&mut concept, Some(&reg.user1), Some(&ghost), None)
        .await;
    assert_eq!(
        errors.get("parent").unwrap(),
        ["Parent resource does not exist."]
    );
    assert!(reg.db.concepts.get(concept.id).await.unwrap().is_none());
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 0);
}

#[tokio::test]
async fn test_persist_new_invalid_fields_writes_nothing() {
    let reg = TestRegistry::new().await;
    let mut concept = Concept::new("not valid", "");
    concept.names.push(LocalizedText::new("", "en"));

    let errors = reg
        .db
        .concepts
        .persist_new(&mut concept, Some(&reg.user1), Some(&reg.source1), None)
        .await;
    assert!(errors.contains("mnemonic"));
    assert!(errors.contains("concept_class"));
    assert!(errors.contains("names"));
    assert!(reg.db.concepts.get(concept.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_persist_new_duplicate_mnemonic_in_same_source() {
    let reg = TestRegistry::new().await;
    reg.create_concept("concept1", &reg.source1).await;
    let before = reg.current_version(&reg.source1).await;
    assert_eq!(before.concepts.len(), 1);

    let mut duplicate = reg.concept("concept1");
    let errors = reg
        .db
        .concepts
        .persist_new(&mut duplicate, Some(&reg.user1), Some(&reg.source1), None)
        .await;
    assert_eq!(errors.len(), 1);
    assert!(errors.contains(ALL_FIELDS));

    let after = reg.current_version(&reg.source1).await;
    assert_eq!(after.concepts, before.concepts);
}

#[tokio::test]
async fn test_persist_new_same_mnemonic_in_other_source() {
    let reg = TestRegistry::new().await;
    reg.create_concept("concept1", &reg.source1).await;

    let mut other = reg.concept("concept1");
    let errors = reg
        .db
        .concepts
        .persist_new(&mut other, Some(&reg.user1), Some(&reg.source2), None)
        .await;
    assert!(errors.is_empty(), "{}", errors);

    let version = reg.db.concepts.latest_version(&other).await.unwrap().unwrap();
    assert_eq!(reg.current_version(&reg.source2).await.concepts, vec![version.id]);
    assert_eq!(reg.current_version(&reg.source1).await.concepts.len(), 1);
}

#[tokio::test]
async fn test_persist_new_into_explicit_source_version() {
    let reg = TestRegistry::new().await;
    let initial = reg.current_version(&reg.source1).await;

    let mut branch = SourceVersion::for_base_object(&reg.source1, "version1", Some(&initial), None, true);
    let errors = reg
        .db
        .source_versions
        .persist_new(&mut branch, VersionChanges::default())
        .await;
    assert!(errors.is_empty(), "{}", errors);

    let mut concept = reg.concept("concept1");
    let errors = reg
        .db
        .concepts
        .persist_new(&mut concept, Some(&reg.user1), Some(&reg.source1), Some(&initial))
        .await;
    assert!(errors.is_empty(), "{}", errors);

    let version = reg.db.concepts.latest_version(&concept).await.unwrap().unwrap();
    let initial = reg.db.source_versions.get(initial.id).await.unwrap().unwrap();
    let branch = reg.db.source_versions.get(branch.id).await.unwrap().unwrap();
    assert_eq!(initial.concepts, vec![version.id]);
    assert!(branch.concepts.is_empty());
}

#[tokio::test]
async fn test_persist_new_rejects_foreign_source_version() {
    let reg = TestRegistry::new().await;
    let foreign = reg.current_version(&reg.source2).await;

    let mut concept = reg.concept("concept1");
    let errors = reg
        .db
        .concepts
        .persist_new(&mut concept, Some(&reg.user1), Some(&reg.source1), Some(&foreign))
        .await;
    assert!(errors.contains("parent_resource_version"));
    assert!(reg.db.concepts.get(concept.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_retire_positive() {
    let reg = TestRegistry::new().await;
    let mut concept = reg.create_concept("concept1", &reg.source1).await;
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 1);
    let initial = reg.db.concepts.latest_version(&concept).await.unwrap().unwrap();

    assert!(reg.db.concepts.retire(&mut concept).await.unwrap());
    assert!(concept.retired);
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 2);

    let latest = reg.db.concepts.latest_version(&concept).await.unwrap().unwrap();
    assert!(latest.retired);
    assert!(latest.released);
    assert_eq!(latest.previous_version_id, Some(initial.id));

    let source_version = reg.current_version(&reg.source1).await;
    assert_eq!(source_version.concepts, vec![latest.id]);

    let versions = reg.db.concept_versions.list(concept.id).await.unwrap();
    assert_eq!(versions.iter().filter(|v| v.retired).count(), 1);
    assert_eq!(versions.iter().filter(|v| !v.retired).count(), 1);

    let stored = reg.db.concepts.get(concept.id).await.unwrap().unwrap();
    assert!(stored.retired);
}

#[tokio::test]
async fn test_retire_twice_reports_false() {
    let reg = TestRegistry::new().await;
    let mut concept = reg.create_concept("concept1", &reg.source1).await;

    assert!(reg.db.concepts.retire(&mut concept).await.unwrap());
    assert!(!reg.db.concepts.retire(&mut concept).await.unwrap());
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 2);

    // A stale copy still sees the stored retirement.
    let mut stale = concept.clone();
    stale.retired = false;
    assert!(!reg.db.concepts.retire(&mut stale).await.unwrap());
    assert!(stale.retired);
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 2);
}

#[tokio::test]
async fn test_retire_ignores_unsaved_edits() {
    let reg = TestRegistry::new().await;
    let mut concept = reg.create_concept("concept1", &reg.source1).await;
    concept.concept_class = "Symptom".to_string();
    concept.mnemonic = "renamed".to_string();

    assert!(reg.db.concepts.retire(&mut concept).await.unwrap());
    assert!(concept.retired);
    assert_eq!(concept.concept_class, "Symptom");

    let stored = reg.db.concepts.get(concept.id).await.unwrap().unwrap();
    assert!(stored.retired);
    assert_eq!(stored.concept_class, "First");
    assert_eq!(stored.mnemonic, "concept1");
    assert_eq!(stored.updated_at, concept.updated_at);

    let latest = reg.db.concepts.latest_version(&concept).await.unwrap().unwrap();
    assert!(latest.retired);
    assert_eq!(latest.concept_class, "First");
}

#[tokio::test]
async fn test_persist_changes_keeps_version_count() {
    let reg = TestRegistry::new().await;
    let mut concept = reg.create_concept("concept1", &reg.source1).await;

    concept.datatype = Some("Numeric".to_string());
    concept.descriptions.push(LocalizedText::new("A test concept", "en"));
    let errors = reg.db.concepts.persist_changes(&mut concept).await;
    assert!(errors.is_empty(), "{}", errors);

    let stored = reg.db.concepts.get(concept.id).await.unwrap().unwrap();
    assert_eq!(stored.datatype.as_deref(), Some("Numeric"));
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 1);
}

#[tokio::test]
async fn test_persist_changes_rejects_sibling_mnemonic() {
    let reg = TestRegistry::new().await;
    reg.create_concept("concept1", &reg.source1).await;
    let mut second = reg.create_concept("concept2", &reg.source1).await;

    second.mnemonic = "concept1".to_string();
    let errors = reg.db.concepts.persist_changes(&mut second).await;
    assert!(errors.contains(ALL_FIELDS));
}

#[tokio::test]
async fn test_soft_deleted_concept_frees_mnemonic() {
    let reg = TestRegistry::new().await;
    let mut concept = reg.create_concept("concept1", &reg.source1).await;
    assert!(reg.db.concepts.soft_delete(&mut concept).await.unwrap());

    let mut replacement = reg.concept("concept1");
    let errors = reg
        .db
        .concepts
        .persist_new(&mut replacement, Some(&reg.user1), Some(&reg.source1), None)
        .await;
    assert!(errors.is_empty(), "{}", errors);
    assert_eq!(
        reg.db
            .concepts
            .get_by_mnemonic(reg.source1.id, "concept1")
            .await
            .unwrap()
            .map(|c| c.id),
        Some(replacement.id)
    );
}

#[tokio::test]
async fn test_concept_accessors() {
    let reg = TestRegistry::new().await;
    let mut concept = reg.concept("concept1");
    concept.names = vec![
        LocalizedText::new("Concept One", "en"),
        LocalizedText::new("Concept Un", "fr").preferred(),
    ];
    let errors = reg
        .db
        .concepts
        .persist_new(&mut concept, Some(&reg.user1), Some(&reg.source1), None)
        .await;
    assert!(errors.is_empty(), "{}", errors);

    assert_eq!(concept.display_name(), Some("Concept Un"));
    assert_eq!(concept.display_locale(), Some("fr"));
    assert_eq!(
        reg.db.concepts.owner_name(&concept).await.unwrap().as_deref(),
        Some("user1")
    );
    assert_eq!(reg.db.concepts.owner_type(&concept).await.unwrap(), Some(USER_TYPE));
    assert_eq!(
        reg.db.concepts.parent_resource(&concept).await.unwrap().as_deref(),
        Some("source1")
    );
    assert_eq!(
        reg.db.concepts.url(&concept).await.unwrap().as_deref(),
        Some("/users/user1/sources/source1/concepts/concept1/")
    );

    let version = reg.db.concepts.latest_version(&concept).await.unwrap().unwrap();
    assert_eq!(
        reg.db.concept_versions.name(&version).await.unwrap().as_deref(),
        Some("concept1")
    );
    assert_eq!(
        reg.db.concept_versions.owner_name(&version).await.unwrap().as_deref(),
        Some("user1")
    );
    assert_eq!(
        reg.db.concept_versions.url(&version).await.unwrap(),
        Some(format!(
            "/users/user1/sources/source1/concepts/concept1/{}/",
            version.id
        ))
    );
    assert_eq!(version.display_name(), Some("Concept Un"));
}

#[tokio::test]
async fn test_organization_owned_concept_accessors() {
    let reg = TestRegistry::new().await;
    let concept = reg.create_concept("concept1", &reg.source2).await;

    assert_eq!(
        reg.db.concepts.owner_name(&concept).await.unwrap().as_deref(),
        Some("org2")
    );
    assert_eq!(
        reg.db.concepts.owner_type(&concept).await.unwrap(),
        Some(ORGANIZATION_TYPE)
    );
    assert_eq!(
        reg.db.concepts.url(&concept).await.unwrap().as_deref(),
        Some("/orgs/org2/sources/source2/concepts/concept1/")
    );
}

#[tokio::test]
async fn test_concept_version_persist_new_direct() {
    let reg = TestRegistry::new().await;
    let concept = reg.create_concept("concept1", &reg.source1).await;
    let initial = reg.db.concepts.latest_version(&concept).await.unwrap().unwrap();

    let mut version = ConceptVersion::for_concept(&concept, "version1", Some(&initial));
    let errors = reg.db.concept_versions.persist_new(&mut version).await;
    assert!(errors.is_empty(), "{}", errors);
    assert_eq!(version.mnemonic, "version1");
    assert_eq!(
        reg.db
            .concept_versions
            .previous_version_mnemonic(&version)
            .await
            .unwrap(),
        Some(initial.mnemonic.clone())
    );

    let mut duplicate = ConceptVersion::for_concept(&concept, "version1", None);
    let errors = reg.db.concept_versions.persist_new(&mut duplicate).await;
    assert!(errors.contains("mnemonic"));
}

#[tokio::test]
async fn test_concept_version_persist_clone() {
    let reg = TestRegistry::new().await;
    let concept = reg.create_concept("concept1", &reg.source1).await;
    let neighbour = reg.create_concept("concept2", &reg.source1).await;
    let original = reg.db.concepts.latest_version(&concept).await.unwrap().unwrap();
    let neighbour_version = reg.db.concepts.latest_version(&neighbour).await.unwrap().unwrap();
    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 1);

    let mut clone = original.clone_version();
    let errors = reg.db.concept_versions.persist_clone(&mut clone).await;
    assert!(errors.is_empty(), "{}", errors);

    assert_eq!(reg.db.concepts.num_versions(&concept).await.unwrap(), 2);
    assert_eq!(clone.mnemonic, clone.id.to_string());
    assert_eq!(clone.previous_version_id, Some(original.id));
    let latest = reg.db.concepts.latest_version(&concept).await.unwrap().unwrap();
    assert_eq!(latest.id, clone.id);
    assert_eq!(latest.previous_version_id, Some(original.id));

    // The clone is not indexed until the caller places it.
    let current = reg.current_version(&reg.source1).await;
    assert_eq!(current.concepts, vec![original.id, neighbour_version.id]);

    let changed = reg
        .db
        .source_versions
        .update_concept_version(current.id, &clone)
        .await
        .unwrap();
    assert!(changed);
    let current = reg.current_version(&reg.source1).await;
    assert_eq!(current.concepts, vec![clone.id, neighbour_version.id]);
}
