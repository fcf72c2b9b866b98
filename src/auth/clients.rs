use std::{fmt, path::Path};

use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::Deserialize;
use serde_json::Value;

use crate::{ids::SubjectId, session::SessionUser, AppResult, GetField};

type HappyClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    /// Prefix of every [`SubjectId`] this provider vouches for.
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    pub(crate) fn scopes(&self) -> &'static [&'static str] {
        use ClientProvider::*;
        match self {
            Google => &["openid", "email", "profile"],
            Github => &["read:user", "user:email"],
        }
    }

    pub(crate) fn user_info_url(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "https://www.googleapis.com/oauth2/v2/userinfo",
            Github => "https://api.github.com/user",
        }
    }

    /// Reads the provider's user-info document into the identity the session carries.
    pub fn session_user(&self, info: &Value) -> AppResult<SessionUser> {
        let text = |field: &str| {
            info.get(field)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned()
        };

        let id = SubjectId::new(self.id(), info.get_id_field("id")?);
        let (name, image) = match self {
            ClientProvider::Google => (text("name"), text("picture")),
            ClientProvider::Github => {
                let name = Some(text("name")).filter(|name| !name.is_empty()).unwrap_or_else(|| text("login"));
                (name, text("avatar_url"))
            }
        };
        let name = if name.is_empty() { super::fallback_name() } else { name };

        Ok(SessionUser {
            id,
            name,
            email: text("email"),
            image,
        })
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Default)]
pub struct Clients {
    google_client: Option<HappyClient>,
    github_client: Option<HappyClient>,
}

impl Clients {
    /// Missing secrets leave every provider disabled rather than failing startup.
    pub fn load(path: &Path, public_url: &str) -> AppResult<Clients> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "no OAuth client secrets, login disabled");
            return Ok(Clients::default());
        }
        let json: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Self::from_json(json, public_url)
    }

    pub fn from_json(json: Value, public_url: &str) -> AppResult<Clients> {
        let client = |provider: ClientProvider, auth_url: &str, token_url: &str| -> AppResult<Option<HappyClient>> {
            let Some(json) = json.get(provider.id()) else {
                return Ok(None);
            };
            let client_id = ClientId::new(json.get_str_field("client_id")?);
            let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

            let auth_url = AuthUrl::new(auth_url.to_owned())?;
            let token_url = TokenUrl::new(token_url.to_owned())?;
            let redirect_url = RedirectUrl::new(format!("{public_url}/lockin/{}", provider.id()))?;

            Ok(Some(
                BasicClient::new(client_id)
                .set_client_secret(client_secret)
                .set_auth_uri(auth_url)
                .set_token_uri(token_url)
                .set_redirect_uri(redirect_url)
            ))
        };

        Ok(
            Clients {
                google_client: client(
                    ClientProvider::Google,
                    "https://accounts.google.com/o/oauth2/auth",
                    "https://oauth2.googleapis.com/token",
                )?,
                github_client: client(
                    ClientProvider::Github,
                    "https://github.com/login/oauth/authorize",
                    "https://github.com/login/oauth/access_token",
                )?,
            }
        )
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<HappyClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or(format!("OAuth provider {provider} keys not supplied").into())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn google_user_info_maps_to_a_google_subject() {
        let user = ClientProvider::Google
            .session_user(&json!({
                "id": "1234567890",
                "name": "Ada Lovelace",
                "email": "ada@example.com",
                "picture": "https://img.example/ada.png",
            }))
            .unwrap();
        assert_eq!(user.id.as_str(), "google:1234567890");
        assert_eq!(user.name, "Ada Lovelace");
        assert_eq!(user.image, "https://img.example/ada.png");
    }

    #[test]
    fn github_falls_back_to_login_and_tolerates_null_email() {
        let user = ClientProvider::Github
            .session_user(&json!({
                "id": 583231,
                "login": "octocat",
                "name": null,
                "email": null,
                "avatar_url": "https://avatars.example/583231",
            }))
            .unwrap();
        assert_eq!(user.id.as_str(), "github:583231");
        assert_eq!(user.name, "octocat");
        assert_eq!(user.email, "");
    }

    #[test]
    fn providers_without_keys_are_disabled() {
        let clients = Clients::from_json(
            json!({ "github": { "client_id": "id", "client_secret": "secret" } }),
            "http://localhost:8080",
        )
        .unwrap();
        assert!(clients.get_client(ClientProvider::Github).is_ok());
        assert!(clients.get_client(ClientProvider::Google).is_err());
    }
}
