//! Ruleset export/import round-trip.

mod common;

use common::*;
use iptv_hub::models::*;

#[tokio::test]
async fn exported_ruleset_reimports_identically() {
    let db = test_db().await;

    let original = db
        .get_ruleset_by_name("Default")
        .await
        .unwrap()
        .expect("seeded default ruleset should exist");
    let original_rules = db.list_tag_rules(original.id).await.unwrap();
    assert!(!original_rules.is_empty());

    let document = db.export_ruleset(original.id).await.unwrap();
    assert_eq!(document.version, 1);
    assert_eq!(document.kind, "tag_ruleset");
    assert_eq!(document.ruleset.rules.len(), original_rules.len());

    // Through JSON, as the management surface would ship it
    let json = serde_json::to_string_pretty(&document).unwrap();
    let parsed: RuleSetDocument = serde_json::from_str(&json).unwrap();

    let imported = db
        .import_ruleset(&parsed, Some("Default (copy)"))
        .await
        .unwrap();
    let imported_rules = db.list_tag_rules(imported.id).await.unwrap();

    assert_eq!(imported_rules.len(), original_rules.len());
    for (original_rule, imported_rule) in original_rules.iter().zip(&imported_rules) {
        assert_eq!(original_rule.name, imported_rule.name);
        assert_eq!(original_rule.pattern, imported_rule.pattern);
        assert_eq!(original_rule.pattern_kind, imported_rule.pattern_kind);
        assert_eq!(original_rule.tag_name, imported_rule.tag_name);
        assert_eq!(original_rule.source, imported_rule.source);
        assert_eq!(original_rule.remove_from_name, imported_rule.remove_from_name);
        assert_eq!(original_rule.replacement, imported_rule.replacement);
        assert_eq!(original_rule.priority, imported_rule.priority);
    }
}

#[tokio::test]
async fn imported_ruleset_drives_extraction_like_the_original() {
    let db = test_db().await;
    let account = create_account(&db, "Imported Rules").await;

    let default = db.get_ruleset_by_name("Default").await.unwrap().unwrap();
    let document = db.export_ruleset(default.id).await.unwrap();
    let imported = db.import_ruleset(&document, Some("Clone")).await.unwrap();

    // Assign only the imported clone to the account
    db.assign_ruleset(account.id, imported.id, 10).await.unwrap();

    let rules = db.rules_for_account(account.id).await.unwrap();
    let mut engine = iptv_hub::tagging::TagEngine::new();
    let extraction = engine.extract(
        "US: FASHION ONE ᵁᴴᴰ 3840P",
        "US| ENTERTAINMENT ᴴᴰ/ᴿᴬᵂ ⁶⁰ᶠᵖˢ",
        &rules,
    );

    for tag in ["US", "UHD", "4K", "HD", "RAW", "60FPS"] {
        assert!(extraction.tags.contains(tag), "missing {tag}");
    }
    assert_eq!(extraction.cleaned_name, "FASHION ONE");
}

#[tokio::test]
async fn unknown_document_kinds_are_rejected() {
    let db = test_db().await;

    let document = RuleSetDocument {
        version: 1,
        kind: "epg_ruleset".to_string(),
        ruleset: RuleSetExport {
            name: "X".to_string(),
            description: None,
            rules: Vec::new(),
        },
    };
    assert!(db.import_ruleset(&document, None).await.is_err());

    let document = RuleSetDocument {
        version: 2,
        kind: "tag_ruleset".to_string(),
        ruleset: RuleSetExport {
            name: "X".to_string(),
            description: None,
            rules: Vec::new(),
        },
    };
    assert!(db.import_ruleset(&document, None).await.is_err());
}
