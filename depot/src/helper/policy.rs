// SPDX-License-Identifier: MPL-2.0

//! Policy-action derivation (§4.8 step 2, §6.3 table). Pure: no I/O, no
//! authorization decision — just `(method, flags, already_deployed) ->
//! action key`.

use crate::refs::Kind;

use super::{Error, Method, RequestFlags, METADATA_REF_NAME};

/// The action key an [`super::AuthBroker`] is asked to authorize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyAction {
    Install(Kind),
    Update(Kind),
    Uninstall(Kind),
    InstallBundle,
    ConfigureRemote,
    Configure,
    UpdateRemote,
    ModifyRepo,
    AppstreamUpdate,
    MetadataUpdate,
}

/// Derive the policy action a [`Method`] must be authorized under.
///
/// `already_deployed` only matters for `Deploy`: whether the targeted ref
/// already has a deployment on disk, absent an explicit hint flag. A ref
/// named [`METADATA_REF_NAME`] always escalates to [`PolicyAction::MetadataUpdate`]
/// regardless of method (§6.3).
pub fn policy_action(method: &Method, flags: RequestFlags, already_deployed: bool) -> Result<PolicyAction, Error> {
    if let Some(ref_) = targeted_ref(method) {
        if ref_.name == METADATA_REF_NAME {
            return Ok(PolicyAction::MetadataUpdate);
        }
    }

    Ok(match method {
        Method::Deploy { ref_, .. } => {
            let kind = if flags.contains(RequestFlags::APP_HINT) { Kind::App } else { ref_.kind };
            let is_update = already_deployed && !flags.contains(RequestFlags::INSTALL_HINT) && !flags.contains(RequestFlags::REINSTALL);
            if is_update {
                PolicyAction::Update(kind)
            } else {
                PolicyAction::Install(kind)
            }
        }
        Method::DeployAppstream { .. } => PolicyAction::AppstreamUpdate,
        Method::Uninstall { ref_ } => PolicyAction::Uninstall(ref_.kind),
        Method::InstallBundle { .. } => PolicyAction::InstallBundle,
        Method::ConfigureRemote { .. } => PolicyAction::ConfigureRemote,
        Method::Configure { key, .. } => {
            if key != "languages" {
                return Err(Error::InvalidArgs("Configure only accepts key=languages"));
            }
            PolicyAction::Configure
        }
        Method::UpdateRemote { .. } => PolicyAction::UpdateRemote,
        Method::RemoveLocalRef { .. } | Method::PruneLocalRepo | Method::EnsureRepo | Method::RunTriggers => PolicyAction::ModifyRepo,
        Method::UpdateSummary | Method::GenerateOciSummary { .. } => PolicyAction::MetadataUpdate,
    })
}

fn targeted_ref(method: &Method) -> Option<&crate::refs::Ref> {
    match method {
        Method::Deploy { ref_, .. } | Method::Uninstall { ref_ } | Method::RemoveLocalRef { ref_, .. } => Some(ref_),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::refs::Ref;

    fn app_ref() -> Ref {
        Ref::compose(Kind::App, "org.example.Editor", None, None).unwrap()
    }

    #[test]
    fn deploy_without_existing_deployment_is_install() {
        let method = Method::Deploy {
            ref_: app_ref(),
            origin: "origin".into(),
            subpaths: vec![],
        };
        let action = policy_action(&method, RequestFlags::empty(), false).unwrap();
        assert_eq!(action, PolicyAction::Install(Kind::App));
    }

    #[test]
    fn deploy_with_existing_deployment_is_update() {
        let method = Method::Deploy {
            ref_: app_ref(),
            origin: "origin".into(),
            subpaths: vec![],
        };
        let action = policy_action(&method, RequestFlags::empty(), true).unwrap();
        assert_eq!(action, PolicyAction::Update(Kind::App));
    }

    #[test]
    fn install_hint_forces_install_even_when_deployed() {
        let method = Method::Deploy {
            ref_: app_ref(),
            origin: "origin".into(),
            subpaths: vec![],
        };
        let action = policy_action(&method, RequestFlags::INSTALL_HINT, true).unwrap();
        assert_eq!(action, PolicyAction::Install(Kind::App));
    }

    #[test]
    fn metadata_ref_escalates_regardless_of_method() {
        // `ostree-metadata` doesn't fit the name grammar (§4.2 requires
        // >=3 dot-separated elements); constructed directly rather than
        // through `Ref::compose`, mirroring how the real ref is wire-parsed.
        let ref_ = Ref {
            kind: Kind::Runtime,
            name: METADATA_REF_NAME.to_string(),
            arch: "x86_64".to_string(),
            branch: "master".to_string(),
            commit: None,
        };
        let method = Method::Uninstall { ref_ };
        let action = policy_action(&method, RequestFlags::empty(), false).unwrap();
        assert_eq!(action, PolicyAction::MetadataUpdate);
    }

    #[test]
    fn configure_rejects_non_languages_key() {
        let method = Method::Configure {
            key: "theme".into(),
            value: "dark".into(),
        };
        assert!(matches!(policy_action(&method, RequestFlags::empty(), false), Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn prune_and_ensure_and_triggers_map_to_modify_repo() {
        assert_eq!(policy_action(&Method::PruneLocalRepo, RequestFlags::empty(), false).unwrap(), PolicyAction::ModifyRepo);
        assert_eq!(policy_action(&Method::EnsureRepo, RequestFlags::empty(), false).unwrap(), PolicyAction::ModifyRepo);
        assert_eq!(policy_action(&Method::RunTriggers, RequestFlags::empty(), false).unwrap(), PolicyAction::ModifyRepo);
    }
}
