//! Built-in condition library
//!
//! Every predicate here has the registry signature and can be called directly
//! with a hand-built principal and context. Lookups that fail surface as
//! [`Indeterminate`]; missing data (no object, no claims, no base path) is a
//! plain `false` unless documented otherwise.

use super::condition::{Arity, ConditionOutcome, ConditionRegistry, Indeterminate};
use super::context::{ContextObject, ResourceContext};
use super::policy::Action;
use super::principal::Principal;
use super::store::{InMemoryStore, ObjectRef, RepositoryInfo};

/// Permission that grants read access to a private repository
pub const VIEW_REPOSITORY: &str = "ansible.view_ansiblerepository";

/// Conditions whose single argument is a permission name
pub const PERMISSION_CONDITIONS: &[&str] = &[
    "hasModelPermission",
    "hasObjectPermission",
    "hasModelOrObjectPermission",
    "hasNamespaceObjectPermission",
    "hasRepositoryPermission",
    "canCopyOrMove",
    "canSignCollections",
];

/// Register every built-in condition
pub fn register_builtin(registry: &mut ConditionRegistry) {
    registry
        .register("isSuperuser", Arity::None, is_superuser)
        .register("isAuthenticatedUser", Arity::None, is_authenticated_user)
        .register("isSelf", Arity::None, is_self)
        .register("userInGroup", Arity::Exactly(1), user_in_group)
        .register("ownsNamespace", Arity::None, owns_namespace)
        .register("ownsLegacyNamespace", Arity::None, owns_legacy_namespace)
        .register("hasModelPermission", Arity::Exactly(1), has_model_permission)
        .register("hasObjectPermission", Arity::Exactly(1), has_object_permission)
        .register(
            "hasModelOrObjectPermission",
            Arity::Exactly(1),
            has_model_or_object_permission,
        )
        .register(
            "hasNamespaceObjectPermission",
            Arity::Exactly(1),
            has_namespace_object_permission,
        )
        .register(
            "hasRepositoryPermission",
            Arity::Exactly(1),
            has_repository_permission,
        )
        .register(
            "canViewRepositoryContent",
            Arity::None,
            can_view_repository_content,
        )
        .register("canCopyOrMove", Arity::Exactly(1), can_copy_or_move)
        .register("canSignCollections", Arity::Exactly(1), can_sign_collections)
        .register("signaturesNotRequired", Arity::None, signatures_not_required)
        .register("entitlementPresent", Arity::Exactly(1), entitlement_present)
        .register("pathNotProtected", Arity::AtLeast(0), path_not_protected)
        .register("objectIsPublic", Arity::None, object_is_public)
        .register("requireRequirementsFile", Arity::None, require_requirements_file)
        .register(
            "localResourceManagementEnabled",
            Arity::None,
            local_resource_management_enabled,
        )
        .register(
            "unauthenticatedDownloadEnabled",
            Arity::None,
            unauthenticated_download_enabled,
        )
        .register(
            "unauthenticatedAccessEnabled",
            Arity::None,
            unauthenticated_access_enabled,
        )
        .register("legacyRolesEnabled", Arity::None, legacy_roles_enabled)
        .register("uploadSignaturesEnabled", Arity::None, upload_signatures_enabled);
}

fn arg<'s>(args: &'s [String], index: usize) -> Result<&'s str, Indeterminate> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| Indeterminate::new(format!("missing argument {}", index)))
}

/// Namespace the request is about: the object's namespace, the object itself
/// when it is a namespace, or the `namespace` route value.
fn namespace_of(ctx: &ResourceContext<'_>) -> Result<Option<String>, Indeterminate> {
    if let Some(object) = ctx.object()? {
        if let Some(ns) = &object.namespace {
            return Ok(Some(ns.clone()));
        }
        if object.kind == InMemoryStore::NAMESPACE_KIND || object.kind == "legacy_namespace" {
            return Ok(Some(object.id.clone()));
        }
    }
    Ok(ctx.route("namespace").map(str::to_string))
}

/// Split `namespace-name-version.tar.gz` into its parts
pub fn parse_collection_filename(filename: &str) -> Option<(&str, &str, &str)> {
    let stem = filename.strip_suffix(".tar.gz")?;
    let mut parts = stem.splitn(3, '-');
    let namespace = parts.next().filter(|s| !s.is_empty())?;
    let name = parts.next().filter(|s| !s.is_empty())?;
    let version = parts.next().filter(|s| !s.is_empty())?;
    Some((namespace, name, version))
}

/// Repository the request targets, via the route base path or the object
fn repository_of(ctx: &ResourceContext<'_>) -> Result<Option<RepositoryInfo>, Indeterminate> {
    if let Some(base_path) = ctx.route("distro_base_path") {
        return Ok(ctx.store().repository_for_distribution(base_path)?);
    }
    Ok(ctx
        .object()?
        .filter(|o| o.kind == InMemoryStore::REPOSITORY_KIND)
        .map(repository_from_object))
}

fn repository_from_object(object: &ContextObject) -> RepositoryInfo {
    RepositoryInfo {
        id: object.id.clone(),
        name: object
            .attributes
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or(&object.id)
            .to_string(),
        private: object.private,
    }
}

/// Global permission first; `object` is only resolved when that fails
fn model_or_object<F>(
    principal: &Principal,
    ctx: &ResourceContext<'_>,
    permission: &str,
    object: F,
) -> ConditionOutcome
where
    F: FnOnce() -> Result<Option<ObjectRef>, Indeterminate>,
{
    let store = ctx.store();
    if store.has_model_permission(principal, permission)? {
        return Ok(true);
    }
    match object()? {
        Some(object) => Ok(store.has_object_permission(principal, permission, &object)?),
        None => Ok(false),
    }
}

pub fn is_superuser(principal: &Principal, _: &ResourceContext<'_>, _: &Action, _: &[String]) -> ConditionOutcome {
    Ok(principal.is_superuser)
}

pub fn is_authenticated_user(
    principal: &Principal,
    _: &ResourceContext<'_>,
    _: &Action,
    _: &[String],
) -> ConditionOutcome {
    Ok(principal.is_authenticated && !principal.is_anonymous)
}

/// The object is owned by (or, for user objects, is) the principal
pub fn is_self(principal: &Principal, ctx: &ResourceContext<'_>, _: &Action, _: &[String]) -> ConditionOutcome {
    if !principal.is_authenticated {
        return Ok(false);
    }
    let Some(object) = ctx.object()? else {
        return Ok(false);
    };
    let owner = match &object.owner_id {
        Some(owner) => Some(owner),
        None if object.kind == "user" => Some(&object.id),
        None => None,
    };
    Ok(owner == Some(&principal.id))
}

pub fn user_in_group(principal: &Principal, _: &ResourceContext<'_>, _: &Action, args: &[String]) -> ConditionOutcome {
    Ok(principal.is_authenticated && principal.in_group(arg(args, 0)?))
}

pub fn owns_namespace(principal: &Principal, ctx: &ResourceContext<'_>, _: &Action, _: &[String]) -> ConditionOutcome {
    if !principal.is_authenticated {
        return Ok(false);
    }
    let Some(namespace) = namespace_of(ctx)? else {
        return Ok(false);
    };
    let owners = ctx.store().namespace_owners(&namespace)?;
    Ok(owners.iter().any(|owner| *owner == principal.id))
}

pub fn owns_legacy_namespace(
    principal: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    _: &[String],
) -> ConditionOutcome {
    if !principal.is_authenticated {
        return Ok(false);
    }
    let Some(namespace) = namespace_of(ctx)? else {
        return Ok(false);
    };
    let owners = ctx.store().legacy_namespace_owners(&namespace)?;
    Ok(owners.iter().any(|owner| *owner == principal.id))
}

pub fn has_model_permission(
    principal: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    args: &[String],
) -> ConditionOutcome {
    Ok(ctx.store().has_model_permission(principal, arg(args, 0)?)?)
}

pub fn has_object_permission(
    principal: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    args: &[String],
) -> ConditionOutcome {
    let permission = arg(args, 0)?;
    match ctx.object()? {
        Some(object) => Ok(ctx
            .store()
            .has_object_permission(principal, permission, &object.object_ref())?),
        None => Ok(false),
    }
}

/// Global permission, else permission on the object when there is one
pub fn has_model_or_object_permission(
    principal: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    args: &[String],
) -> ConditionOutcome {
    model_or_object(principal, ctx, arg(args, 0)?, || {
        Ok(ctx.object()?.map(ContextObject::object_ref))
    })
}

/// Global permission, else permission on the namespace the request targets.
///
/// For uploads the namespace comes from the body, either a `namespace` field
/// or the `filename` of the artifact.
pub fn has_namespace_object_permission(
    principal: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    args: &[String],
) -> ConditionOutcome {
    model_or_object(principal, ctx, arg(args, 0)?, || {
        let namespace = match namespace_of(ctx)? {
            Some(ns) => Some(ns),
            None => ctx
                .data_str("namespace")
                .or_else(|| {
                    ctx.data_str("filename")
                        .and_then(parse_collection_filename)
                        .map(|(ns, _, _)| ns)
                })
                .map(str::to_string),
        };
        Ok(namespace.map(|ns| ObjectRef::new(InMemoryStore::NAMESPACE_KIND, ns)))
    })
}

pub fn has_repository_permission(
    principal: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    args: &[String],
) -> ConditionOutcome {
    model_or_object(principal, ctx, arg(args, 0)?, || {
        Ok(repository_of(ctx)?.map(|repo| repo.object_ref()))
    })
}

/// Public repositories are readable by anyone the statement admits; private
/// ones need the view permission. An unknown base path is never readable.
pub fn can_view_repository_content(
    principal: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    _: &[String],
) -> ConditionOutcome {
    let Some(repo) = repository_of(ctx)? else {
        return Ok(false);
    };
    if !repo.private {
        return Ok(true);
    }
    model_or_object(principal, ctx, VIEW_REPOSITORY, || Ok(Some(repo.object_ref())))
}

/// Permission on both the source repository and `destination_repository`
pub fn can_copy_or_move(principal: &Principal, ctx: &ResourceContext<'_>, _: &Action, args: &[String]) -> ConditionOutcome {
    let permission = arg(args, 0)?;
    let Some(source) = repository_of(ctx)? else {
        return Ok(false);
    };
    let Some(destination) = ctx.data_str("destination_repository") else {
        return Ok(false);
    };
    let destination = ObjectRef::new(InMemoryStore::REPOSITORY_KIND, destination);
    Ok(model_or_object(principal, ctx, permission, || Ok(Some(source.object_ref())))?
        && model_or_object(principal, ctx, permission, || Ok(Some(destination)))?)
}

pub fn can_sign_collections(
    principal: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    args: &[String],
) -> ConditionOutcome {
    if !ctx.features().signing_service_configured {
        return Ok(false);
    }
    Ok(ctx.store().has_model_permission(principal, arg(args, 0)?)?)
}

pub fn signatures_not_required(_: &Principal, ctx: &ResourceContext<'_>, _: &Action, _: &[String]) -> ConditionOutcome {
    Ok(!ctx.features().require_signatures_for_approval)
}

/// Claims absent means not entitled
pub fn entitlement_present(_: &Principal, ctx: &ResourceContext<'_>, _: &Action, args: &[String]) -> ConditionOutcome {
    let claim = arg(args, 0)?;
    Ok(ctx.claims().is_some_and(|claims| claims.is_entitled(claim)))
}

/// The target base path is not reserved.
///
/// Reserved paths are the statement arguments when given, otherwise the
/// configured `reserved_base_paths`. A base path matches a reserved entry
/// when it equals it or lies beneath it. No base path means nothing to
/// protect. The object's `base_path` is only read when the route and the
/// body give none.
pub fn path_not_protected(_: &Principal, ctx: &ResourceContext<'_>, _: &Action, args: &[String]) -> ConditionOutcome {
    let requested = ctx
        .route("distro_base_path")
        .or_else(|| ctx.route("path"))
        .or_else(|| ctx.data_str("base_path"));
    let base_path = match requested {
        Some(path) => Some(path),
        None => ctx
            .object()?
            .and_then(|o| o.attributes.get("base_path"))
            .and_then(|v| v.as_str()),
    };
    let Some(base_path) = base_path else {
        return Ok(true);
    };

    let reserved: &[String] = if args.is_empty() {
        &ctx.settings().reserved_base_paths
    } else {
        args
    };
    let protected = reserved.iter().any(|prefix| {
        base_path == prefix
            || base_path
                .strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    });
    Ok(!protected)
}

pub fn object_is_public(_: &Principal, ctx: &ResourceContext<'_>, _: &Action, _: &[String]) -> ConditionOutcome {
    Ok(ctx.object()?.is_some_and(|o| !o.private))
}

/// Remotes pointing at a community host must carry a requirements file
pub fn require_requirements_file(
    _: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    _: &[String],
) -> ConditionOutcome {
    let Some(url) = ctx.data_str("url") else {
        return Ok(true);
    };
    let host = url_host(url);
    let community = ctx
        .settings()
        .community_remote_hosts
        .iter()
        .any(|h| h.eq_ignore_ascii_case(host));
    if !community {
        return Ok(true);
    }
    Ok(ctx.data_str("requirements_file").is_some())
}

fn url_host(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    authority.split(':').next().unwrap_or(authority)
}

pub fn local_resource_management_enabled(
    _: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    _: &[String],
) -> ConditionOutcome {
    Ok(ctx.features().local_resource_management)
}

pub fn unauthenticated_download_enabled(
    _: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    _: &[String],
) -> ConditionOutcome {
    Ok(ctx.features().unauthenticated_download)
}

pub fn unauthenticated_access_enabled(
    _: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    _: &[String],
) -> ConditionOutcome {
    Ok(ctx.features().unauthenticated_access)
}

pub fn legacy_roles_enabled(_: &Principal, ctx: &ResourceContext<'_>, _: &Action, _: &[String]) -> ConditionOutcome {
    Ok(ctx.features().legacy_roles)
}

pub fn upload_signatures_enabled(
    _: &Principal,
    ctx: &ResourceContext<'_>,
    _: &Action,
    _: &[String],
) -> ConditionOutcome {
    Ok(ctx.features().upload_signatures)
}
