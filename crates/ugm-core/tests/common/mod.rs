//! Shared fixtures: a small organisation with four users and two groups.

#![allow(dead_code)]

use std::sync::Arc;

use ugm_core::{PrincipalsConfig, Ugm};
use ugm_directory::{Filter, MemoryDirectory, Scope};

pub const BASE: &str = "dc=my-domain,dc=com";
pub const CUSTOMERS: &str = "ou=customers,dc=my-domain,dc=com";
pub const ROLES: &str = "ou=roles,dc=my-domain,dc=com";

pub const USER1_DN: &str = "cn=user1,dc=my-domain,dc=com";
pub const USER2_DN: &str = "cn=user2,ou=customers,dc=my-domain,dc=com";
pub const USER3_DN: &str = "cn=user3,ou=customers,dc=my-domain,dc=com";
pub const NASTY_DN: &str = "cn=n\u{e4}sty\\, User,ou=customers,dc=my-domain,dc=com";

pub fn directory() -> Arc<MemoryDirectory> {
    ugm_common::init_test_logging();

    let directory = MemoryDirectory::new();
    directory
        .insert(BASE, [("objectClass", vec!["top", "domain"]), ("dc", vec!["my-domain"])])
        .unwrap();
    directory
        .insert(CUSTOMERS, [("objectClass", vec!["organizationalUnit"]), ("ou", vec!["customers"])])
        .unwrap();
    for (dn, cn, sn, password, phone) in [
        (USER1_DN, "user1", "Meier", "foo1", None),
        (USER2_DN, "user2", "M\u{fc}ller", "foo2", Some("1234")),
        (USER3_DN, "user3", "Schmidt", "foo3", Some("1234")),
        (NASTY_DN, "n\u{e4}sty, User", "Umhauer", "foo4", None),
    ] {
        let mut attrs = vec![
            ("objectClass", vec!["top", "person"]),
            ("cn", vec![cn]),
            ("sn", vec![sn]),
            ("userPassword", vec![password]),
        ];
        if let Some(phone) = phone {
            attrs.push(("telephoneNumber", vec![phone]));
        }
        directory.insert(dn, attrs).unwrap();
    }
    directory
        .insert(
            "cn=group1,dc=my-domain,dc=com",
            [
                ("objectClass", vec!["groupOfNames"]),
                ("cn", vec!["group1"]),
                ("member", vec![USER3_DN, USER2_DN]),
            ],
        )
        .unwrap();
    directory
        .insert(
            "cn=group2,dc=my-domain,dc=com",
            [
                ("objectClass", vec!["groupOfNames"]),
                ("cn", vec!["group2"]),
                ("member", vec![NASTY_DN]),
            ],
        )
        .unwrap();
    directory
        .insert(ROLES, [("objectClass", vec!["organizationalUnit"]), ("ou", vec!["roles"])])
        .unwrap();
    Arc::new(directory)
}

pub fn users_config() -> PrincipalsConfig {
    PrincipalsConfig::new(
        BASE,
        [
            ("id", "sn"),
            ("login", "cn"),
            ("rdn", "cn"),
            ("telephoneNumber", "telephoneNumber"),
            ("sn", "sn"),
        ],
    )
    .unwrap()
    .with_scope(Scope::Subtree)
    .with_query_filter(Filter::eq("objectClass", "person"))
    .with_object_classes(["top", "person"])
}

pub fn groups_config() -> PrincipalsConfig {
    PrincipalsConfig::new(BASE, [("id", "cn"), ("rdn", "cn")])
        .unwrap()
        .with_scope(Scope::OneLevel)
        .with_query_filter(Filter::eq("objectClass", "groupOfNames"))
        .with_object_classes(["groupOfNames"])
}

pub fn roles_config() -> PrincipalsConfig {
    PrincipalsConfig::new(ROLES, [("id", "cn"), ("rdn", "cn")])
        .unwrap()
        .with_scope(Scope::OneLevel)
        .with_query_filter(Filter::eq("objectClass", "groupOfNames"))
        .with_object_classes(["groupOfNames"])
}

pub fn ugm(directory: &Arc<MemoryDirectory>, with_roles: bool) -> Arc<Ugm> {
    Ugm::new(
        directory.clone(),
        users_config(),
        groups_config(),
        with_roles.then(roles_config),
    )
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
