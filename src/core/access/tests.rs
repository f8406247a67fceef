//! Integration tests for the access policy engine

use super::*;
use crate::settings::{AccessSettings, DeploymentMode, FeatureFlags};
use serde_json::json;

fn repo(id: &str, private: bool) -> RepositoryInfo {
    RepositoryInfo {
        id: id.to_string(),
        name: id.to_string(),
        private,
    }
}

#[test]
fn test_complex_policy_scenario() {
    let evaluator = PolicyEvaluator::builtin();
    let statements = vec![
        // Superusers can do anything
        Statement::allow(&["admin"], &["*"]).unwrap(),
        // Nobody deletes their own account
        Statement::deny(&["*"], &["destroy"])
            .unwrap()
            .with_condition(ConditionRef::new("isSelf")),
        // Anyone can read
        Statement::allow(&["*"], &["<safe_methods>"]).unwrap(),
        // Owners can edit
        Statement::allow(&["authenticated"], &["update", "partial_update"])
            .unwrap()
            .with_condition(ConditionRef::new("ownsNamespace")),
        // Staff can delete other accounts
        Statement::allow(&["staff"], &["destroy"]).unwrap(),
    ];

    let settings = AccessSettings::default();
    let mut store = InMemoryStore::new();
    store.add_namespace_owner("acme", "u1");

    let ns_ctx = ResourceContext::new(&settings, &store)
        .with_object(ContextObject::new("namespace", "acme"));
    let self_ctx = ResourceContext::new(&settings, &store)
        .with_object(ContextObject::new("user", "u7"));
    let other_ctx = ResourceContext::new(&settings, &store)
        .with_object(ContextObject::new("user", "u8"));

    let root = Principal::user("0", "root").superuser();
    let owner = Principal::user("u1", "owner");
    let stranger = Principal::user("u2", "stranger");
    let staff = Principal::user("u7", "staffer").staff();
    let anon = Principal::anonymous();

    let eval = |p: &Principal, a: &str, ctx: &ResourceContext<'_>| {
        evaluator.evaluate(&statements, p, &Action::new(a), ctx).allowed
    };

    // Reads are open
    assert!(eval(&anon, "list", &ns_ctx));
    assert!(eval(&stranger, "retrieve", &ns_ctx));

    // Only owners edit
    assert!(eval(&owner, "update", &ns_ctx));
    assert!(!eval(&stranger, "partial_update", &ns_ctx));
    assert!(!eval(&anon, "update", &ns_ctx));

    // Staff may delete others, not themselves
    assert!(eval(&staff, "destroy", &other_ctx));
    assert!(!eval(&staff, "destroy", &self_ctx));

    // Superuser wins because the admin statement comes first
    assert!(eval(&root, "destroy", &ns_ctx));
}

#[test]
fn test_policy_json_with_evaluation() {
    let document: PolicyDocument = serde_json::from_value(json!({
        "version": "1.0.0",
        "resources": {
            "DistributionViewSet": {
                "statements": {
                    "standalone": [
                        {
                            "sid": "view-visible",
                            "action": ["list", "retrieve"],
                            "principal": "*",
                            "effect": "allow",
                            "condition": "canViewRepositoryContent"
                        },
                        {
                            "sid": "create-unreserved",
                            "action": "create",
                            "principal": "authenticated",
                            "effect": "allow",
                            "condition": [
                                "pathNotProtected",
                                {"name": "hasModelPermission", "args": ["ansible.add_ansibledistribution"]}
                            ]
                        }
                    ]
                },
                "scoping_function": "scopeByViewRepositoryPermissions"
            }
        }
    }))
    .unwrap();

    let checker = AccessChecker::from_document(document).unwrap();
    let settings = AccessSettings::default();
    let mut store = InMemoryStore::new();
    store
        .add_distribution("community", repo("community-repo", false))
        .add_distribution("internal", repo("internal-repo", true))
        .grant_user_permission("u1", "ansible.add_ansibledistribution");
    let u1 = Principal::user("u1", "one");
    let anon = Principal::anonymous();

    let community = ResourceContext::new(&settings, &store).with_route("distro_base_path", "community");
    let internal = ResourceContext::new(&settings, &store).with_route("distro_base_path", "internal");
    assert!(checker.has_permission(&EvaluationRequest::new("DistributionViewSet", "list", &anon, &community)));
    assert!(!checker.has_permission(&EvaluationRequest::new("DistributionViewSet", "list", &anon, &internal)));

    let reserved = ResourceContext::new(&settings, &store).with_data("base_path", "published");
    let fresh = ResourceContext::new(&settings, &store).with_data("base_path", "team-a");
    assert!(!checker.has_permission(&EvaluationRequest::new("DistributionViewSet", "create", &u1, &reserved)));
    assert!(checker.has_permission(&EvaluationRequest::new("DistributionViewSet", "create", &u1, &fresh)));
    assert!(!checker.has_permission(&EvaluationRequest::new("DistributionViewSet", "create", &anon, &fresh)));
}

#[test]
fn test_builtin_upload_flow() {
    let checker = AccessChecker::builtin().unwrap();
    let settings = AccessSettings::default();
    let mut store = InMemoryStore::new();
    store.grant_group_object_permission(
        "acme-publishers",
        "galaxy.upload_to_namespace",
        ObjectRef::new("namespace", "acme"),
    );

    let publisher = Principal::user("u3", "pub").with_group("acme-publishers");
    let outsider = Principal::user("u4", "out");
    let upload = ResourceContext::new(&settings, &store)
        .with_data("filename", "acme-widgets-2.0.0.tar.gz");

    assert!(checker.has_permission(&EvaluationRequest::new(
        "CollectionUploadViewSet",
        "create",
        &publisher,
        &upload
    )));
    assert!(!checker.has_permission(&EvaluationRequest::new(
        "CollectionUploadViewSet",
        "create",
        &outsider,
        &upload
    )));
}

#[test]
fn test_builtin_approval_depends_on_signing_flags() {
    let checker = AccessChecker::builtin().unwrap();
    let mut store = InMemoryStore::new();
    store
        .add_distribution("staging", repo("staging-repo", false))
        .grant_user_permission("u5", "ansible.modify_ansible_repo_content");
    let curator = Principal::user("u5", "curator");

    let unsigned = AccessSettings::default();
    let ctx = ResourceContext::new(&unsigned, &store)
        .with_route("distro_base_path", "staging")
        .with_data("destination_repository", "published-repo");
    assert!(checker.has_permission(&EvaluationRequest::new(
        "CollectionApproveViewSet",
        "move_content",
        &curator,
        &ctx
    )));

    let signing_required = AccessSettings::default().with_features(FeatureFlags {
        signing_service_configured: true,
        require_signatures_for_approval: true,
        ..FeatureFlags::default()
    });
    let ctx = ResourceContext::new(&signing_required, &store)
        .with_route("distro_base_path", "staging")
        .with_data("destination_repository", "published-repo");
    let result = checker
        .check(&EvaluationRequest::new(
            "CollectionApproveViewSet",
            "move_content",
            &curator,
            &ctx,
        ))
        .unwrap();
    assert!(!result.allowed);
    assert_eq!(
        result.trace,
        vec![
            TraceEntry::ConditionFailed("signaturesNotRequired".into()),
            TraceEntry::ConditionFailed("canSignCollections".into()),
        ]
    );
}

#[test]
fn test_outage_denies_and_is_traced() {
    let checker = AccessChecker::builtin().unwrap();
    let settings = AccessSettings::default();
    let mut store = InMemoryStore::new();
    store.add_namespace_owner("acme", "u1").set_unavailable(true);
    let owner = Principal::user("u1", "owner");
    let ctx = ResourceContext::new(&settings, &store)
        .with_object(ContextObject::new("namespace", "acme"));

    let result = checker
        .check(&EvaluationRequest::new("NamespaceOwnersViewSet", "update", &owner, &ctx))
        .unwrap();
    assert!(!result.allowed);
    assert!(result.indeterminate());
}

#[test]
fn test_legacy_roles_flag_gates_everything() {
    let checker = AccessChecker::builtin().unwrap();
    let store = InMemoryStore::new();
    let root = Principal::user("0", "root").superuser();

    let off = AccessSettings::default();
    let ctx = ResourceContext::new(&off, &store);
    assert!(!checker.has_permission(&EvaluationRequest::new("LegacyRoleViewSet", "list", &root, &ctx)));

    let on = AccessSettings::default().with_features(FeatureFlags {
        legacy_roles: true,
        ..FeatureFlags::default()
    });
    let ctx = ResourceContext::new(&on, &store);
    assert!(checker.has_permission(&EvaluationRequest::new("LegacyRoleViewSet", "list", &root, &ctx)));
}

#[test]
fn test_unknown_mode_string_falls_back() {
    let checker = AccessChecker::builtin().unwrap();
    let settings = AccessSettings::default();
    let store = InMemoryStore::new();
    let ctx = ResourceContext::new(&settings, &store);
    let user = Principal::user("u1", "one");

    let request = EvaluationRequest::new("TokenViewSet", "create", &user, &ctx).with_mode("Cloud ");
    assert_eq!(request.mode(), &DeploymentMode::Other("cloud".into()));
    assert!(checker.has_permission(&request));
}

#[test]
fn test_statement_table_from_toml_and_json_agree() {
    let conditions = ConditionRegistry::builtin();
    let scoping = ScopingRegistry::builtin();
    let loader = PolicyLoader::new(&conditions, &scoping);

    let from_json = loader
        .load_json_str(
            &json!({
                "version": "1.0.0",
                "resources": {"GroupViewSet": {
                    "statements": {"standalone": [
                        {"action": "list", "principal": "group:admins", "effect": "allow",
                         "condition": "userInGroup:admins"}
                    ]},
                    "scoping_function": "scopeByGroupMembership"
                }}
            })
            .to_string(),
        )
        .unwrap();

    let from_toml = loader
        .load_toml_str(
            r#"
            version = "1.0.0"

            [resources.GroupViewSet]
            scoping_function = "scopeByGroupMembership"

            [[resources.GroupViewSet.statements.standalone]]
            action = "list"
            principal = "group:admins"
            effect = "allow"
            condition = "userInGroup:admins"
            "#,
        )
        .unwrap();

    assert_eq!(from_json, from_toml);
}
