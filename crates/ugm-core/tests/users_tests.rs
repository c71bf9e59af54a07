//! User store integration tests

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::*;
use ugm_core::{
    DefaultValue, PrincipalStore, Principals, PrincipalsConfig, SearchQuery, SecondaryPassword, UgmError, User, Users,
};
use ugm_directory::{
    dn, Attributes, DirectoryError, DirectorySession, Filter, MemoryDirectory, Modification, Scope, SearchPage,
    SearchRequest,
};

fn users(directory: &Arc<MemoryDirectory>) -> Users {
    Principals::new(directory.clone(), users_config())
}

mod lookup_tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_sorted() {
        let directory = directory();
        let users = users(&directory);

        assert_eq!(
            users.ids().await.unwrap(),
            strings(&["Meier", "M\u{fc}ller", "Schmidt", "Umhauer"])
        );
        assert_eq!(users.keys().await.unwrap(), users.ids().await.unwrap());
    }

    #[tokio::test]
    async fn test_idbydn() {
        let directory = directory();
        let users = users(&directory);

        assert_eq!(users.idbydn(USER3_DN).await.unwrap(), "Schmidt");
        assert_eq!(
            users.idbydn("cN=user3, ou=customers,dc=MY-domain,dc= com").await.unwrap(),
            "Schmidt"
        );
        assert_eq!(users.idbydn(NASTY_DN).await.unwrap(), "Umhauer");

        let missing = "cN=inexistent, ou=customers,dc=MY-domain,dc= com";
        let err = users.idbydn(missing).await.unwrap_err();
        assert!(matches!(err, UgmError::DnNotFound { dn } if dn == missing));
    }

    #[tokio::test]
    async fn test_get_caches_identity() {
        let directory = directory();
        let users = users(&directory);

        let mueller = users.get("M\u{fc}ller").await.unwrap();
        let again = users.get("M\u{fc}ller").await.unwrap();
        assert!(Arc::ptr_eq(&mueller, &again));

        assert_eq!(mueller.id(), "M\u{fc}ller");
        assert_eq!(mueller.dn(), USER2_DN);
        assert_eq!(mueller.login().as_deref(), Some("user2"));
        assert!(!mueller.changed());

        let err = users.get("Inexistent").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_aliased_attributes() {
        let directory = directory();
        let users = users(&directory);
        let mueller = users.get("M\u{fc}ller").await.unwrap();

        assert_eq!(
            mueller.attrs().items(),
            vec![
                ("id".to_string(), strings(&["M\u{fc}ller"])),
                ("login".to_string(), strings(&["user2"])),
                ("telephoneNumber".to_string(), strings(&["1234"])),
            ]
        );
        assert_eq!(mueller.attrs().keys(), strings(&["id", "login", "telephoneNumber"]));
        assert_eq!(mueller.attrs().first("telephoneNumber").unwrap().as_deref(), Some("1234"));

        let raw = mueller.directory_attributes();
        let mut names: Vec<&String> = raw.keys().collect();
        names.sort();
        assert_eq!(names, vec!["cn", "objectClass", "sn", "telephoneNumber", "userPassword"]);

        let err = mueller.attrs().get("description").unwrap_err();
        assert!(matches!(err, UgmError::UnknownAlias { alias } if alias == "description"));
    }

    #[tokio::test]
    async fn test_naming_aliases_are_immutable() {
        let directory = directory();
        let users = users(&directory);
        let meier = users.get("Meier").await.unwrap();

        for alias in ["id", "sn", "login", "rdn"] {
            let err = meier.attrs().set(alias, "changed").unwrap_err();
            assert!(matches!(err, UgmError::ImmutableAttribute { .. }), "{alias}");
        }
        assert!(!meier.changed());
    }

    #[tokio::test]
    async fn test_values_ordered_by_id() {
        let directory = directory();
        let users = users(&directory);

        let dns: Vec<String> = users.values().await.unwrap().iter().map(|user| user.dn()).collect();
        assert_eq!(dns, strings(&[USER1_DN, USER2_DN, USER3_DN, NASTY_DN]));
    }

    fn unit_directory() -> Arc<MemoryDirectory> {
        let directory = MemoryDirectory::new();
        directory
            .insert(CUSTOMERS, [("objectClass", vec!["organizationalUnit"]), ("ou", vec!["customers"])])
            .unwrap();
        for (ou, cn, sn) in [
            ("sales", "user1", "Meier"),
            ("support", "user2", "M\u{fc}ller"),
            ("billing", "user3", "Schmidt"),
            ("legal, tax", "user4", "Umhauer"),
        ] {
            directory
                .insert(
                    &dn::child("ou", ou, CUSTOMERS),
                    [
                        ("objectClass", vec!["top", "person"]),
                        ("ou", vec![ou]),
                        ("cn", vec![cn]),
                        ("sn", vec![sn]),
                    ],
                )
                .unwrap();
        }
        Arc::new(directory)
    }

    fn unit_config() -> PrincipalsConfig {
        PrincipalsConfig::new(CUSTOMERS, [("id", "sn"), ("login", "cn"), ("rdn", "ou")])
            .unwrap()
            .with_scope(Scope::OneLevel)
            .with_query_filter(Filter::eq("objectClass", "person"))
            .with_object_classes(["top", "person"])
            .with_default(
                "rdn",
                DefaultValue::computed(|_store, id| vec![format!("{}-unit", id.to_lowercase())]),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_rdn_distinct_from_id_and_login() {
        let directory = unit_directory();
        let users: Users = Principals::new(directory.clone(), unit_config());

        assert_eq!(
            users.ids().await.unwrap(),
            strings(&["Meier", "M\u{fc}ller", "Schmidt", "Umhauer"])
        );
        assert_eq!(
            users.idbydn("OU=Billing, ou=customers,dc=MY-domain,dc=com").await.unwrap(),
            "Schmidt"
        );
        assert_eq!(
            users.idbydn("ou=LEGAL\\, tax,ou=customers,dc=my-domain,dc=com").await.unwrap(),
            "Umhauer"
        );
        assert!(users.idbydn("cn=user3,ou=customers,dc=my-domain,dc=com").await.is_err());

        let schmidt = users.get("Schmidt").await.unwrap();
        assert_eq!(schmidt.login().as_deref(), Some("user3"));
        assert_eq!(
            schmidt.attrs().items(),
            vec![
                ("id".to_string(), strings(&["Schmidt"])),
                ("login".to_string(), strings(&["user3"])),
                ("rdn".to_string(), strings(&["billing"])),
            ]
        );
    }

    #[tokio::test]
    async fn test_create_with_rdn_from_default() {
        let directory = unit_directory();
        let users: Users = Principals::new(directory.clone(), unit_config());
        let new_dn = "ou=neumann-unit,ou=customers,dc=my-domain,dc=com";

        let user = users
            .create("Neumann", [("login", "user5"), ("rdn", "ignored")])
            .await
            .unwrap();
        assert_eq!(user.dn(), new_dn);
        assert_eq!(user.directory_attributes()["ou"], strings(&["neumann-unit"]));
        assert_eq!(user.directory_attributes()["cn"], strings(&["user5"]));
        assert_eq!(users.idbydn(new_dn).await.unwrap(), "Neumann");

        users.persist().await.unwrap();
        assert_eq!(directory.entry(new_dn).unwrap()["sn"], strings(&["Neumann"]));

        users.invalidate_all();
        assert_eq!(
            users.ids().await.unwrap(),
            strings(&["Meier", "M\u{fc}ller", "Neumann", "Schmidt", "Umhauer"])
        );
        assert_eq!(users.idbydn(new_dn).await.unwrap(), "Neumann");
    }

    #[tokio::test]
    async fn test_index_is_cached() {
        let directory = directory();
        let users = users(&directory);

        users.ids().await.unwrap();
        let searches = directory.search_count();
        users.ids().await.unwrap();
        users.idbydn(USER1_DN).await.unwrap();
        assert!(users.contains("Schmidt").await.unwrap());
        assert_eq!(directory.search_count(), searches);
    }
}

mod uniqueness_tests {
    use super::*;

    #[tokio::test]
    async fn test_duplicate_id() {
        let directory = directory();
        directory
            .insert(
                "cn=user5,ou=customers,dc=my-domain,dc=com",
                [
                    ("objectClass", vec!["top", "person"]),
                    ("cn", vec!["user5"]),
                    ("sn", vec!["Meier"]),
                ],
            )
            .unwrap();

        let err = users(&directory).ids().await.unwrap_err();
        assert!(matches!(err, UgmError::Integrity { attribute, value } if attribute == "id" && value == "Meier"));
    }

    #[tokio::test]
    async fn test_duplicate_login() {
        let directory = directory();
        directory
            .insert(
                "cn=user1,ou=customers,dc=my-domain,dc=com",
                [
                    ("objectClass", vec!["top", "person"]),
                    ("cn", vec!["user1"]),
                    ("sn", vec!["Other"]),
                ],
            )
            .unwrap();

        let err = users(&directory).ids().await.unwrap_err();
        assert!(matches!(err, UgmError::Integrity { attribute, value } if attribute == "login" && value == "user1"));
    }
}

mod authentication_tests {
    use super::*;

    #[tokio::test]
    async fn test_authenticate_and_passwd() {
        let directory = directory();
        let users = users(&directory);
        let mueller = users.get("M\u{fc}ller").await.unwrap();

        assert!(mueller.authenticate("foo2").await.unwrap());
        assert!(!mueller.authenticate("bar").await.unwrap());
        assert!(!mueller.authenticate("").await.unwrap());

        mueller.passwd("foo2", "new").await.unwrap();
        assert!(!mueller.authenticate("foo2").await.unwrap());
        assert!(mueller.authenticate("new").await.unwrap());
        assert!(!mueller.changed());

        users.passwd(mueller.id(), "new", "newer").await.unwrap();

        assert_eq!(users.authenticate("wrong", "creds").await.unwrap(), None);
        assert_eq!(
            users.authenticate("user2", "newer").await.unwrap().as_deref(),
            Some("M\u{fc}ller")
        );
        assert_eq!(users.authenticate("user2", "bar").await.unwrap(), None);
        assert!(!users.authenticate_id("wrong", "cresd").await.unwrap());
        assert!(!users.authenticate_id("M\u{fc}ller", "bar").await.unwrap());
        assert!(users.authenticate_id("M\u{fc}ller", "newer").await.unwrap());
    }

    #[tokio::test]
    async fn test_passwd_requires_old_password() {
        let directory = directory();
        let users = users(&directory);

        let err = users.passwd("Schmidt", "wrong", "new").await.unwrap_err();
        assert!(matches!(err, UgmError::InvalidCredentials));
        assert!(users.authenticate_id("Schmidt", "foo3").await.unwrap());
    }

    #[tokio::test]
    async fn test_secondary_passwords() {
        let directory = directory();
        let config = users_config()
            .with_secondary_password(SecondaryPassword::new("sambaNTPassword", |password: &str| {
                format!("nt:{password}")
            }));
        let users: Users = Principals::new(directory.clone(), config);
        let schmidt = users.get("Schmidt").await.unwrap();
        schmidt.attrs().set("telephoneNumber", "999").unwrap();

        schmidt.passwd("foo3", "secret").await.unwrap();

        let stored = directory.entry(USER3_DN).unwrap();
        assert_eq!(stored["userPassword"], strings(&["secret"]));
        assert_eq!(stored["sambaNTPassword"], strings(&["nt:secret"]));

        let cached = schmidt.directory_attributes();
        assert_eq!(cached["sambaNTPassword"], strings(&["nt:secret"]));
        // the pending phone edit survives the refresh
        assert_eq!(schmidt.attrs().first("telephoneNumber").unwrap().as_deref(), Some("999"));
        assert!(schmidt.changed());
    }

    #[tokio::test]
    async fn test_new_user_never_authenticates() {
        let directory = directory();
        let users = users(&directory);
        let user = users.create("Neu", [("login", "neu")]).await.unwrap();

        assert!(!user.authenticate("anything").await.unwrap());
    }
}

mod create_tests {
    use super::*;

    fn customers_config() -> PrincipalsConfig {
        PrincipalsConfig::new(
            CUSTOMERS,
            [
                ("id", "sn"),
                ("login", "cn"),
                ("rdn", "cn"),
                ("telephoneNumber", "telephoneNumber"),
                ("sn", "sn"),
            ],
        )
        .unwrap()
        .with_scope(Scope::OneLevel)
        .with_query_filter(Filter::eq("objectClass", "person"))
        .with_object_classes(["top", "person"])
        .with_default("sn", DefaultValue::literal("Surname"))
        .unwrap()
        .with_default(
            "telephoneNumber",
            DefaultValue::computed(|_store, _id| vec!["123".to_string()]),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_user() {
        let directory = directory();
        let users: Users = Principals::new(directory.clone(), customers_config());

        assert_eq!(
            users.ids().await.unwrap(),
            strings(&["M\u{fc}ller", "Schmidt", "Umhauer"])
        );

        let user = users
            .create(
                "newid",
                [("login", "newcn"), ("id", "ID Ignored"), ("sn", "Surname Ignored")],
            )
            .await
            .unwrap();

        assert_eq!(user.dn(), "cn=newcn,ou=customers,dc=my-domain,dc=com");
        assert!(user.is_new());
        assert!(user.changed());
        assert_eq!(
            user.attrs().items(),
            vec![
                ("id".to_string(), strings(&["newid"])),
                ("login".to_string(), strings(&["newcn"])),
                ("telephoneNumber".to_string(), strings(&["123"])),
            ]
        );

        let raw = user.directory_attributes();
        assert_eq!(raw["cn"], strings(&["newcn"]));
        assert_eq!(raw["sn"], strings(&["newid"]));
        assert_eq!(raw["telephoneNumber"], strings(&["123"]));
        assert_eq!(raw["objectClass"], strings(&["top", "person"]));

        assert_eq!(
            users.ids().await.unwrap(),
            strings(&["M\u{fc}ller", "Schmidt", "Umhauer", "newid"])
        );
        assert!(!directory.contains("cn=newcn,ou=customers,dc=my-domain,dc=com"));

        let err = users.create_with_defaults("newid").await.unwrap_err();
        assert_eq!(err.to_string(), "Principal with id 'newid' already exists.");

        users.persist().await.unwrap();
        assert!(directory.contains("cn=newcn,ou=customers,dc=my-domain,dc=com"));
        assert!(!user.changed());

        users.invalidate_all();
        let reloaded = users.get("newid").await.unwrap();
        assert!(!Arc::ptr_eq(&user, &reloaded));
        assert!(!reloaded.is_new());
        assert_eq!(reloaded.attrs().first("telephoneNumber").unwrap().as_deref(), Some("123"));
        assert_eq!(
            users.ids().await.unwrap(),
            strings(&["M\u{fc}ller", "Schmidt", "Umhauer", "newid"])
        );

        users.delete("newid").await.unwrap();
        users.persist().await.unwrap();
        assert!(!directory.contains("cn=newcn,ou=customers,dc=my-domain,dc=com"));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let directory = directory();
        let users: Users = Principals::new(directory.clone(), customers_config());

        let err = users.create("x", [("description", "nope")]).await.unwrap_err();
        assert!(matches!(err, UgmError::UnknownAlias { alias } if alias == "description"));

        // rdn is cn, and nothing supplies it
        let err = users.create_with_defaults("nocn").await.unwrap_err();
        assert!(matches!(err, UgmError::Validation { .. }));

        let err = users.create("Schmidt", [("login", "dup")]).await.unwrap_err();
        assert!(matches!(err, UgmError::AlreadyExists { id } if id == "Schmidt"));
    }

    #[tokio::test]
    async fn test_insert_type_mismatch() {
        let directory = directory();
        let ugm = ugm(&directory, false);
        let group = ugm.groups().get("group1").await.unwrap();

        let err = ugm.users().insert("foo", group.into()).unwrap_err();
        assert_eq!(err.to_string(), "Given value not instance of 'User'");
    }

    #[tokio::test]
    async fn test_invalidate_discards_staged_creation() {
        let directory = directory();
        let users = users(&directory);
        users.create("Temp", [("login", "temp")]).await.unwrap();
        assert!(users.contains("Temp").await.unwrap());

        users.invalidate("Temp");
        assert!(!users.contains("Temp").await.unwrap());
        assert!(!users.changed());
    }
}

mod search_tests {
    use super::*;

    fn logins(results: Vec<(String, ugm_core::principal::AliasedValues)>, alias: &str) -> Vec<(String, Vec<String>)> {
        results
            .into_iter()
            .map(|(id, values)| (id, values.get(alias).cloned().unwrap_or_default()))
            .collect()
    }

    #[tokio::test]
    async fn test_search() {
        let directory = directory();
        let users = users(&directory);

        let query = SearchQuery::new().criterion("sn", "Schmidt").exact_match(true);
        assert_eq!(users.search(&query).await.unwrap(), strings(&["Schmidt"]));

        let mut all = users.search(&SearchQuery::new()).await.unwrap();
        all.sort();
        assert_eq!(all, strings(&["Meier", "M\u{fc}ller", "Schmidt", "Umhauer"]));

        let results = users.search_attrs(&SearchQuery::new(), &["login"]).await.unwrap();
        assert_eq!(
            logins(results, "login"),
            vec![
                ("Meier".to_string(), strings(&["user1"])),
                ("M\u{fc}ller".to_string(), strings(&["user2"])),
                ("Schmidt".to_string(), strings(&["user3"])),
                ("Umhauer".to_string(), strings(&["n\u{e4}sty, User"])),
            ]
        );

        let query = SearchQuery::new().criterion("sn", "Schmidt");
        let results = users.search_attrs(&query, &["telephoneNumber"]).await.unwrap();
        assert_eq!(
            logins(results, "telephoneNumber"),
            vec![("Schmidt".to_string(), strings(&["1234"]))]
        );

        let err = users.search_attrs(&query, &["description"]).await.unwrap_err();
        assert!(matches!(err, UgmError::UnknownAlias { .. }));
    }

    #[tokio::test]
    async fn test_substring_and_or_search() {
        let directory = directory();
        let users = users(&directory);

        // substring matching ignores case, "n\u{e4}sty, User" matches as well
        let query = SearchQuery::new().criterion("login", "user");
        assert_eq!(users.search(&query).await.unwrap().len(), 4);

        let query = SearchQuery::new().criterion("login", "ser2");
        assert_eq!(users.search(&query).await.unwrap(), strings(&["M\u{fc}ller"]));

        let query = SearchQuery::new()
            .criterion("id", "Meier")
            .criterion("telephoneNumber", "1234")
            .or_search(true);
        assert_eq!(
            users.search(&query).await.unwrap(),
            strings(&["Meier", "M\u{fc}ller", "Schmidt"])
        );

        let query = SearchQuery::new().criterion("telephoneNumber", "*");
        assert_eq!(users.search(&query).await.unwrap(), strings(&["M\u{fc}ller", "Schmidt"]));
    }

    #[tokio::test]
    async fn test_exact_match_rules() {
        let directory = directory();
        let users = users(&directory);

        let err = users.search(&SearchQuery::new().exact_match(true)).await.unwrap_err();
        assert!(matches!(err, UgmError::Validation { .. }));

        let query = SearchQuery::new()
            .criterion("id", vec!["Meier", "Schmidt"])
            .exact_match(true)
            .or_values(true);
        assert!(matches!(users.search(&query).await, Err(UgmError::AmbiguousMatch)));

        let query = SearchQuery::new().criterion("id", "Schmi").exact_match(true);
        assert!(users.search(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_raw_search_paging() {
        let directory = directory();
        let users = users(&directory);

        let (ids, cookie) = users.raw_search(3, "").await.unwrap();
        assert_eq!(ids, strings(&["Meier", "M\u{fc}ller", "Schmidt"]));
        assert!(!cookie.is_empty());

        let (ids, cookie) = users.raw_search(3, &cookie).await.unwrap();
        assert_eq!(ids, strings(&["Umhauer"]));
        assert_eq!(cookie, "");

        let err = users.raw_search(3, "18446744073709551615").await.unwrap_err();
        assert!(matches!(err, UgmError::Directory(DirectoryError::InvalidCookie { .. })));
    }

    #[tokio::test]
    async fn test_query_filter_applies() {
        let directory = directory();

        let filter = (Filter::eq("objectClass", "person") & !Filter::eq("objectClass", "inetOrgPerson"))
            | Filter::eq("objectClass", "some");
        let users: Users = Principals::new(directory.clone(), users_config().with_query_filter(filter));
        assert_eq!(
            users.search(&SearchQuery::new()).await.unwrap(),
            strings(&["Meier", "M\u{fc}ller", "Schmidt", "Umhauer"])
        );

        let filter = Filter::eq("objectClass", "person") & Filter::eq("objectClass", "some");
        let users: Users = Principals::new(directory.clone(), users_config().with_query_filter(filter));
        assert!(users.search(&SearchQuery::new()).await.unwrap().is_empty());
        assert!(users.ids().await.unwrap().is_empty());
    }
}

mod state_tests {
    use super::*;

    #[tokio::test]
    async fn test_changed_flag() {
        let directory = directory();
        let users = users(&directory);

        assert!(!users.changed());
        let meier = users.get("Meier").await.unwrap();
        meier.attrs().set("telephoneNumber", "12345").unwrap();
        assert!(meier.attrs().changed());
        assert!(meier.changed());
        assert!(users.changed());

        meier.reload().await.unwrap();
        assert!(!meier.attrs().changed());
        assert!(!meier.changed());
        assert!(!users.changed());
        assert_eq!(meier.attrs().get("telephoneNumber").unwrap(), None);
    }

    #[tokio::test]
    async fn test_attribute_edit_round_trip() {
        let directory = directory();
        let users = users(&directory);

        let meier = users.get("Meier").await.unwrap();
        meier.attrs().set("telephoneNumber", "12345").unwrap();
        meier.persist().await.unwrap();
        assert!(!meier.changed());
        assert_eq!(directory.entry(USER1_DN).unwrap()["telephoneNumber"], strings(&["12345"]));

        meier.attrs().remove("telephoneNumber").unwrap();
        users.persist().await.unwrap();
        assert!(!directory.entry(USER1_DN).unwrap().contains_key("telephoneNumber"));
    }

    #[tokio::test]
    async fn test_invalidate() {
        let directory = directory();
        let users = users(&directory);

        users.values().await.unwrap();
        assert_eq!(users.cached_ids().len(), 4);

        users.invalidate("Inexistent");
        assert_eq!(users.cached_ids().len(), 4);

        let schmidt = users.get("Schmidt").await.unwrap();
        users.invalidate("Schmidt");
        let mut cached = users.cached_ids();
        cached.sort();
        assert_eq!(cached, strings(&["Meier", "M\u{fc}ller", "Umhauer"]));
        assert!(!Arc::ptr_eq(&schmidt, &users.get("Schmidt").await.unwrap()));

        users.invalidate_all();
        assert!(users.cached_ids().is_empty());
        assert_eq!(users.ids().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_delete_standalone() {
        let directory = directory();
        let users = users(&directory);

        users.delete("Meier").await.unwrap();
        assert!(users.changed());
        assert_eq!(
            users.ids().await.unwrap(),
            strings(&["M\u{fc}ller", "Schmidt", "Umhauer"])
        );
        assert!(users.get("Meier").await.unwrap_err().is_not_found());
        assert!(directory.contains(USER1_DN));

        users.persist().await.unwrap();
        assert!(!directory.contains(USER1_DN));
        assert!(!users.changed());

        let err = users.delete("Meier").await.unwrap_err();
        assert!(matches!(err, UgmError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_with_case_variant_id() {
        let directory = directory();
        let users = users(&directory);

        users.delete("meier").await.unwrap();
        assert!(users.changed());
        assert!(!users.contains("Meier").await.unwrap());
        assert!(!users.contains("MEIER").await.unwrap());
        assert!(users.get("meier").await.unwrap_err().is_not_found());

        users.persist().await.unwrap();
        assert!(!directory.contains(USER1_DN));
    }

    #[tokio::test]
    async fn test_invalidate_cancels_staged_deletion() {
        let directory = directory();
        let users = users(&directory);

        users.delete("Meier").await.unwrap();
        assert!(users.changed());

        users.invalidate("Meier");
        assert!(!users.changed());
        assert!(users.contains("Meier").await.unwrap());
        assert_eq!(users.get("Meier").await.unwrap().dn(), USER1_DN);

        users.persist().await.unwrap();
        assert!(directory.contains(USER1_DN));
    }
}

/// Fails every modify of one DN; everything else goes to the memory directory.
struct FailingSession {
    inner: Arc<MemoryDirectory>,
    fail_dn: String,
}

#[async_trait]
impl DirectorySession for FailingSession {
    async fn search(&self, request: &SearchRequest) -> ugm_directory::Result<SearchPage> {
        self.inner.search(request).await
    }

    async fn add(&self, dn: &str, attrs: &Attributes) -> ugm_directory::Result<()> {
        self.inner.add(dn, attrs).await
    }

    async fn modify(&self, dn: &str, changes: &[Modification]) -> ugm_directory::Result<()> {
        if dn::eq(dn, &self.fail_dn) {
            return Err(DirectoryError::Operation {
                dn: dn.to_string(),
                rc: 53,
                message: "unwilling to perform".to_string(),
            });
        }
        self.inner.modify(dn, changes).await
    }

    async fn delete(&self, dn: &str) -> ugm_directory::Result<()> {
        self.inner.delete(dn).await
    }

    async fn bind(&self, dn: &str, credential: &str) -> ugm_directory::Result<bool> {
        self.inner.bind(dn, credential).await
    }

    async fn passwd(&self, dn: &str, old: &str, new: &str, derived: &[Modification]) -> ugm_directory::Result<()> {
        self.inner.passwd(dn, old, new, derived).await
    }
}

#[tokio::test]
async fn test_partial_persist_failure() {
    let directory = directory();
    let session = Arc::new(FailingSession {
        inner: directory.clone(),
        fail_dn: USER2_DN.to_string(),
    });
    let users: Principals<User> = Principals::new(session, users_config());

    for id in ["Meier", "M\u{fc}ller", "Schmidt"] {
        users.get(id).await.unwrap().attrs().set("telephoneNumber", "555").unwrap();
    }

    let err = users.persist().await.unwrap_err();
    assert!(matches!(err, UgmError::Directory(DirectoryError::Operation { rc: 53, .. })));

    // the first write stays applied, nothing after the failure is sent
    assert_eq!(directory.entry(USER1_DN).unwrap()["telephoneNumber"], strings(&["555"]));
    assert_eq!(directory.entry(USER2_DN).unwrap()["telephoneNumber"], strings(&["1234"]));
    assert_eq!(directory.entry(USER3_DN).unwrap()["telephoneNumber"], strings(&["1234"]));

    assert!(!users.get("Meier").await.unwrap().changed());
    assert!(users.get("M\u{fc}ller").await.unwrap().changed());
    assert!(users.get("Schmidt").await.unwrap().changed());
}
