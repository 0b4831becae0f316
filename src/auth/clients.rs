use std::fmt;

use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppResult, GetField};

type HappyClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

const IDENTITY_TOOLKIT: &str = "https://identitytoolkit.googleapis.com/v1/accounts";

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    /// Provider id the identity toolkit expects.
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    fn slug(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// OAuth clients plus the identity toolkit endpoints they hand off to.
#[derive(Clone)]
pub struct Clients {
    pub(crate) firebase_idpurl: String,
    pub(crate) firebase_passwordurl: String,
    pub(crate) firebase_signupurl: String,
    pub(crate) public_url: String,
    google_client: Option<HappyClient>,
    github_client: Option<HappyClient>,
}

impl Clients {
    /// `json` is the client secret file: `firebase.apikey` plus optional
    /// `google` and `github` sections with `client_id` and `client_secret`.
    pub fn from_json(json: Value, public_url: &str) -> AppResult<Clients> {
        let apikey = json.get_obj_field("firebase")?.get_str_field("apikey")?;

        Ok(
            Clients {
                firebase_idpurl: format!("{IDENTITY_TOOLKIT}:signInWithIdp?key={apikey}"),
                firebase_passwordurl: format!("{IDENTITY_TOOLKIT}:signInWithPassword?key={apikey}"),
                firebase_signupurl: format!("{IDENTITY_TOOLKIT}:signUp?key={apikey}"),
                public_url: public_url.to_owned(),
                google_client: oauth_client(&json, ClientProvider::Google, public_url)?,
                github_client: oauth_client(&json, ClientProvider::Github, public_url)?,
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

fn oauth_client(json: &Value, provider: ClientProvider, public_url: &str) -> AppResult<Option<HappyClient>> {
    let Some(json) = json.get(provider.slug()) else {
        return Ok(None);
    };
    let client_id = ClientId::new(json.get_str_field("client_id")?);
    let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

    let (auth_url, token_url) = provider.endpoints();
    let auth_url = AuthUrl::new(auth_url.to_owned()).map_err(|e| e.to_string())?;
    let token_url = TokenUrl::new(token_url.to_owned()).map_err(|e| e.to_string())?;
    let redirect_url = RedirectUrl::new(format!("{public_url}/lockin/{}", provider.slug())).map_err(|e| e.to_string())?;

    Ok(Some(
        BasicClient::new(client_id)
        .set_client_secret(client_secret)
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url)
    ))
}
