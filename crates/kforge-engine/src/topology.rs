//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Cluster topology invariants checked before any remote work."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use kforge_common::role::{Role, RoleSet};

use crate::error::{EngineError, Result};
use crate::settings::NtpSettings;

/// Address and declared roles of one cluster member.
#[derive(Debug, Clone, Copy)]
pub struct Member<'a> {
    /// Node address.
    pub address: &'a str,
    /// Declared roles.
    pub roles: RoleSet,
}

/// Validate role coverage and the NTP allow list.
///
/// A single node must carry every role. Larger clusters need each role
/// somewhere; the first missing one is reported in etcd, controlplane,
/// worker order.
pub fn check(members: &[Member<'_>], ntp: Option<&NtpSettings>) -> Result<()> {
    match members {
        [] => return Err(EngineError::EmptyCluster),
        [only] => {
            if !only.roles.is_complete() {
                return Err(EngineError::IncompleteRoles {
                    address: only.address.to_owned(),
                });
            }
        }
        _ => {
            if let Some(missing) = Role::ALL
                .into_iter()
                .find(|role| !members.iter().any(|member| member.roles.contains(*role)))
            {
                return Err(EngineError::MissingRole(missing));
            }
        }
    }

    if let Some(ntp) = ntp {
        let serves_cluster = members.iter().any(|member| member.address == ntp.server);
        if serves_cluster && ntp.allow.is_none() {
            return Err(EngineError::MissingNtpAllowList {
                server: ntp.server.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member<'a>(address: &'a str, roles: &[Role]) -> Member<'a> {
        Member {
            address,
            roles: roles.iter().copied().collect(),
        }
    }

    #[test]
    fn single_node_needs_every_role() {
        let full = [member("10.0.0.1", &Role::ALL)];
        assert!(check(&full, None).is_ok());

        for dropped in Role::ALL {
            let roles: Vec<Role> = Role::ALL.into_iter().filter(|r| *r != dropped).collect();
            let partial = [member("10.0.0.1", &roles)];
            assert!(matches!(
                check(&partial, None),
                Err(EngineError::IncompleteRoles { .. })
            ));
        }
    }

    #[test]
    fn multi_node_reports_first_missing_role() {
        let no_etcd_no_worker = [
            member("10.0.0.1", &[Role::ControlPlane]),
            member("10.0.0.2", &[Role::ControlPlane]),
        ];
        assert!(matches!(
            check(&no_etcd_no_worker, None),
            Err(EngineError::MissingRole(Role::Etcd))
        ));

        let no_worker = [
            member("10.0.0.1", &[Role::Etcd, Role::ControlPlane]),
            member("10.0.0.2", &[Role::Etcd]),
        ];
        assert!(matches!(
            check(&no_worker, None),
            Err(EngineError::MissingRole(Role::Worker))
        ));

        let spread = [
            member("10.0.0.1", &[Role::Etcd]),
            member("10.0.0.2", &[Role::ControlPlane]),
            member("10.0.0.3", &[Role::Worker]),
        ];
        assert!(check(&spread, None).is_ok());
    }

    #[test]
    fn empty_cluster_is_rejected() {
        assert!(matches!(check(&[], None), Err(EngineError::EmptyCluster)));
    }

    #[test]
    fn ntp_server_on_a_node_needs_allow_list() {
        let nodes = [member("10.0.0.1", &Role::ALL)];
        let mut ntp = NtpSettings {
            server: "10.0.0.1".to_owned(),
            allow: None,
            timezone: "UTC".to_owned(),
        };
        assert!(matches!(
            check(&nodes, Some(&ntp)),
            Err(EngineError::MissingNtpAllowList { .. })
        ));

        ntp.allow = Some("10.0.0.0/24".to_owned());
        assert!(check(&nodes, Some(&ntp)).is_ok());

        ntp.server = "10.9.9.9".to_owned();
        ntp.allow = None;
        assert!(check(&nodes, Some(&ntp)).is_ok());
    }
}
