use tracing::debug;
use ugm_directory::Filter;

use crate::principal::config::LOGIN_ALIAS;
use crate::principal::Principals;
use crate::shared::{Result, UgmError};
use crate::user::User;

pub type Users = Principals<User>;

impl Principals<User> {
    /// Authenticate by login name. Returns the user id on success, `None`
    /// for unknown logins and wrong passwords.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<Option<String>> {
        let config = self.config();
        let login_attr = config.login_attr().unwrap_or(config.id_attr());
        let filter = config.query_filter.clone() & Filter::eq(login_attr, login);
        let request = self.base_request(filter).with_attributes([config.id_attr()]);

        let entries = self.session().search_all(&request).await?;
        let id = match entries.as_slice() {
            [] => {
                debug!(%login, "Unknown login");
                return Ok(None);
            }
            [entry] => match self.entry_id(&entry.attrs) {
                Some(id) => id,
                None => return Ok(None),
            },
            _ => return Err(UgmError::integrity(LOGIN_ALIAS, login)),
        };

        let user = match self.get(&id).await {
            Ok(user) => user,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(user.authenticate(password).await?.then_some(id))
    }

    /// Authenticate by user id.
    pub async fn authenticate_id(&self, id: &str, password: &str) -> Result<bool> {
        match self.get(id).await {
            Ok(user) => user.authenticate(password).await,
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn passwd(&self, id: &str, old: &str, new: &str) -> Result<()> {
        self.get(id).await?.passwd(old, new).await
    }
}
