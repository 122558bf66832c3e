use std::sync::Arc;
use std::time::Duration;

use another_steam_totp::Tag;
use chrono::Utc;
use escrow_types::{BotSecrets, BotSession};
use reqwest::cookie::Jar;
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use crate::confirmations::{filter_by_trade_offer_ids, Confirmation, ConfirmationMethod};
use crate::errors::AuthenticatorError;
use crate::totp;

pub const STEAM_COMMUNITY_HOST: &str = "https://steamcommunity.com";
const STEAM_LOGIN_ENDPOINT: &str = "https://steamcommunity.com/login/dologin/";
const STEAM_CONFIRMATIONS_ENDPOINT: &str = "https://steamcommunity.com/mobileconf/getlist";
const STEAM_CONFIRMATIONS_ACT_ENDPOINT: &str = "https://steamcommunity.com/mobileconf/ajaxop";

/// Steam session/authentication layer for a single bot account.
///
/// Generalized from the teacher's `SteamAuthenticator`, which hard-coded a
/// single account read from environment variables; here the bot's secrets
/// are supplied by the fleet manager (C6) per instance, so many of these can
/// run concurrently, one per logged-in bot.
#[derive(Debug)]
pub struct SteamAuthenticator {
    secrets: BotSecrets,
    steam_id: u64,
    api_key: Option<String>,
    client: Client,
    cookie_jar: Arc<Jar>,
    community_host: String,
    login_endpoint: String,
}

impl SteamAuthenticator {
    pub fn new(steam_id: u64, secrets: BotSecrets, api_key: Option<String>) -> Self {
        let cookie_jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&cookie_jar))
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client builder should not fail with static config");

        Self {
            secrets,
            steam_id,
            api_key,
            client,
            cookie_jar,
            community_host: STEAM_COMMUNITY_HOST.to_string(),
            login_endpoint: STEAM_LOGIN_ENDPOINT.to_string(),
        }
    }

    /// Points login/cookie checks at a different host, so tests can stand up
    /// a local mock server instead of talking to real Steam.
    #[cfg(test)]
    pub(crate) fn with_endpoints(mut self, community_host: impl Into<String>, login_endpoint: impl Into<String>) -> Self {
        self.community_host = community_host.into();
        self.login_endpoint = login_endpoint.into();
        self
    }

    pub fn steam_id(&self) -> u64 {
        self.steam_id
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn http_client(&self) -> &Client {
        &self.client
    }

    /// Performs a full login using a freshly generated TOTP code (spec.md
    /// §4.4: "the bot performs OTP login (TOTP generated from the shared
    /// secret; clock-skew tolerance ±30 s)"), returning a cacheable session.
    ///
    /// Steam rejects a login whose `twofactorcode` was generated against a
    /// time step that has already rolled over on its end, even though the
    /// bot's own clock is correct relative to everywhere else. The offset
    /// schedule below re-tries with the code the *previous* and *next* time
    /// steps would have generated before giving up, which is what "clock-skew
    /// tolerance ±30 s" means in practice: one retry each side of now.
    pub async fn login(&self) -> Result<BotSession, AuthenticatorError> {
        let mut last_err = None;
        for offset in [0, -totp::CLOCK_SKEW_TOLERANCE_SECS, totp::CLOCK_SKEW_TOLERANCE_SECS] {
            match self.try_login(offset).await {
                Ok(session) => return Ok(session),
                Err(AuthenticatorError::InvalidCredentials) => {
                    debug!(steam_id = self.steam_id, offset, "login rejected, will retry with clock-skew offset");
                    last_err = Some(AuthenticatorError::InvalidCredentials);
                    continue;
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_err.unwrap_or(AuthenticatorError::InvalidCredentials))
    }

    async fn try_login(&self, time_offset: i64) -> Result<BotSession, AuthenticatorError> {
        let code = totp::login_code(&self.secrets.totp_shared_secret, time_offset)?;

        let form = [
            ("account_name", self.secrets.account_name.as_str()),
            ("password", self.secrets.password.as_str()),
            ("twofactorcode", code.as_str()),
            ("remember_login", "true"),
        ];

        let response = self
            .client
            .post(&self.login_endpoint)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), time_offset, "steam login endpoint returned a non-success status");
            return Err(AuthenticatorError::InvalidCredentials);
        }

        let session_id = self
            .dump_cookie(&self.community_host, "sessionid")
            .ok_or(AuthenticatorError::SessionExpired)?;

        info!(steam_id = self.steam_id, time_offset, "bot logged in successfully");

        Ok(BotSession {
            steam_id: self.steam_id,
            cookies: self.dump_all_cookies(),
            session_id,
            saved_at: Utc::now(),
        })
    }

    /// Restores cookies from a cached session instead of performing a fresh
    /// login. Session restore is attempted before login (spec.md §4.4).
    pub fn restore(&self, session: &BotSession) -> Result<(), AuthenticatorError> {
        let url: Url = STEAM_COMMUNITY_HOST.parse().expect("static host is a valid url");
        for cookie in &session.cookies {
            self.cookie_jar.add_cookie_str(cookie, &url);
        }

        if self.dump_cookie(STEAM_COMMUNITY_HOST, "sessionid").is_none() {
            return Err(AuthenticatorError::SessionExpired);
        }
        Ok(())
    }

    pub fn dump_cookie(&self, host: &str, name: &str) -> Option<String> {
        let url: Url = host.parse().ok()?;
        let header = self.cookie_jar.cookies(&url)?;
        let header = header.to_str().ok()?;
        header.split("; ").find_map(|kv| {
            let (k, v) = kv.split_once('=')?;
            (k == name).then(|| v.to_string())
        })
    }

    fn dump_all_cookies(&self) -> Vec<String> {
        let url: Url = self.community_host.parse().expect("community host should be a valid url");
        self.cookie_jar
            .cookies(&url)
            .and_then(|header| header.to_str().ok().map(|s| s.to_owned()))
            .map(|s| s.split("; ").map(str::to_owned).collect())
            .unwrap_or_default()
    }

    /// Fetches every pending mobile confirmation for this account.
    pub async fn fetch_confirmations(&self) -> Result<Vec<Confirmation>, AuthenticatorError> {
        let time = Utc::now().timestamp();
        let key = totp::confirmation_key(&self.secrets.identity_secret, time, Tag::Conf)?;

        let response = self
            .client
            .get(STEAM_CONFIRMATIONS_ENDPOINT)
            .query(&[
                ("p", self.device_id()),
                ("a", self.steam_id.to_string()),
                ("k", key),
                ("t", time.to_string()),
                ("m", "react".to_string()),
                ("tag", "conf".to_string()),
            ])
            .send()
            .await?;

        #[derive(serde::Deserialize)]
        struct ConfirmationsResponse {
            conf: Vec<Confirmation>,
        }

        let parsed: ConfirmationsResponse = response
            .json()
            .await
            .map_err(|e| AuthenticatorError::Parse(e.to_string()))?;

        Ok(parsed.conf)
    }

    pub async fn fetch_confirmations_for_offer(&self, tradeoffer_id: i64) -> Result<Vec<Confirmation>, AuthenticatorError> {
        let confirmations = self.fetch_confirmations().await?;
        let matching = filter_by_trade_offer_ids(confirmations, &[tradeoffer_id]);
        if matching.is_empty() {
            return Err(AuthenticatorError::ConfirmationNotFound);
        }
        Ok(matching)
    }

    /// Accepts or denies a batch of confirmations.
    pub async fn process_confirmations(
        &self,
        method: ConfirmationMethod,
        confirmations: Vec<Confirmation>,
    ) -> Result<(), AuthenticatorError> {
        let time = Utc::now().timestamp();
        let op = match method {
            ConfirmationMethod::Accept => "allow",
            ConfirmationMethod::Deny => "cancel",
        };
        let key = totp::confirmation_key(&self.secrets.identity_secret, time, Tag::Conf)?;

        for confirmation in confirmations {
            debug!(confirmation_id = %confirmation.confirmation_id, op, "processing mobile confirmation");
            let response = self
                .client
                .get(STEAM_CONFIRMATIONS_ACT_ENDPOINT)
                .query(&[
                    ("op", op.to_string()),
                    ("p", self.device_id()),
                    ("a", self.steam_id.to_string()),
                    ("k", key.clone()),
                    ("t", time.to_string()),
                    ("m", "react".to_string()),
                    ("tag", op.to_string()),
                    ("cid", confirmation.confirmation_id),
                    ("ck", confirmation.confirmation_key),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(AuthenticatorError::SteamGuardRequired);
            }
        }

        Ok(())
    }

    fn device_id(&self) -> String {
        format!("android:{}", self.steam_id)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn secrets() -> BotSecrets {
        BotSecrets {
            account_name: "bot_account".into(),
            password: "hunter2".into(),
            totp_shared_secret: "AAAAAAAAAAAAAAAAAAAAAAAAAAA=".into(),
            identity_secret: "AAAAAAAAAAAAAAAAAAAAAAAAAAA=".into(),
        }
    }

    /// Steam rejects the code generated for `time_offset = 0` (the server's
    /// clock has already rolled over to the next step) but accepts the code
    /// generated for `time_offset = -30`. `login()` must retry through the
    /// clock-skew schedule and succeed on the second attempt instead of
    /// giving up after the first rejection.
    #[tokio::test]
    async fn login_retries_with_clock_skew_offset_on_rejection() {
        let server = MockServer::start().await;
        let accepted_code = totp::login_code(&secrets().totp_shared_secret, -totp::CLOCK_SKEW_TOLERANCE_SECS).unwrap();

        Mock::given(method("POST"))
            .and(path("/login/dologin/"))
            .and(body_string_contains(format!("twofactorcode={accepted_code}")))
            .respond_with(ResponseTemplate::new(200).insert_header("Set-Cookie", "sessionid=testsession123; Path=/"))
            .mount(&server)
            .await;

        let login_endpoint = format!("{}/login/dologin/", server.uri());
        let auth = SteamAuthenticator::new(76561198000000000, secrets(), None).with_endpoints(server.uri(), login_endpoint);

        let session = auth.login().await.expect("login should succeed after retrying with the skew offset");
        assert_eq!(session.session_id, "testsession123");
    }

    /// No offset in the schedule (0, -30, +30) matches what the server
    /// expects; `login()` must exhaust the schedule and surface the
    /// rejection rather than retrying forever or masking it as some other
    /// error kind.
    #[tokio::test]
    async fn login_gives_up_after_exhausting_clock_skew_schedule() {
        let server = MockServer::start().await;

        let login_endpoint = format!("{}/login/dologin/", server.uri());
        let auth = SteamAuthenticator::new(76561198000000000, secrets(), None).with_endpoints(server.uri(), login_endpoint);

        let err = auth.login().await.expect_err("no offset should satisfy an unmocked server");
        assert!(matches!(err, AuthenticatorError::InvalidCredentials));
    }
}
