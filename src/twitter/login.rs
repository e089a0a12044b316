//! Credential login through the platform's onboarding task flow.
//!
//! The server drives the flow: every response names the next subtask it wants
//! answered, until it reports success.

use crate::twitter::session::{Authenticator, Credentials, Session};
use crate::twitter::{check_status, TwitterError, TIMEOUT_SEC, USER_AGENT, WEB_BEARER_TOKEN};
use async_trait::async_trait;
use maplit::hashmap;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT as USER_AGENT_HEADER};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use totp_rs::{Algorithm, Secret, TOTP};

const GUEST_ACTIVATE_URL: &str = "https://api.x.com/1.1/guest/activate.json";
const TASK_URL: &str = "https://api.x.com/1.1/onboarding/task.json";
const COOKIE_URL: &str = "https://x.com";
const MAX_STEPS: usize = 12;

#[derive(Deserialize)]
struct GuestTokenResponse {
    guest_token: String,
}

#[derive(Deserialize)]
struct TaskResponse {
    flow_token: String,
    #[serde(default)]
    subtasks: Vec<Subtask>,
}

#[derive(Deserialize)]
struct Subtask {
    subtask_id: String,
}

#[derive(Debug, PartialEq)]
enum Step {
    Answer(Value),
    Done,
}

pub fn decode_totp_secret(secret: &str) -> Result<Vec<u8>, TwitterError> {
    Secret::Encoded(secret.trim().replace(' ', "").to_uppercase())
        .to_bytes()
        .map_err(|e| TwitterError::Login(format!("Invalid TOTP secret: {e:?}")))
}

fn totp_code_at(secret: &str, time: u64) -> Result<String, TwitterError> {
    let totp = TOTP::new_unchecked(Algorithm::SHA1, 6, 1, 30, decode_totp_secret(secret)?);
    Ok(totp.generate(time))
}

fn current_totp_code(secret: &str) -> Result<String, TwitterError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| TwitterError::Login(format!("System clock error: {e}")))?;
    totp_code_at(secret, now.as_secs())
}

pub struct LoginFlow {
    client: Client,
    jar: Arc<Jar>,
    credentials: Credentials,
}

impl LoginFlow {
    pub fn new(credentials: Credentials) -> anyhow::Result<Self> {
        let jar = Arc::new(Jar::default());
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {WEB_BEARER_TOKEN}"))?;
        headers.insert(AUTHORIZATION, value);
        headers.insert(USER_AGENT_HEADER, HeaderValue::from_static(USER_AGENT));
        headers.insert("x-twitter-active-user", HeaderValue::from_static("yes"));
        headers.insert("x-twitter-client-language", HeaderValue::from_static("en"));
        Ok(Self {
            client: Client::builder()
                .default_headers(headers)
                .cookie_provider(jar.clone())
                .timeout(Duration::from_secs(TIMEOUT_SEC))
                .build()?,
            jar,
            credentials,
        })
    }

    fn session(&self) -> Session {
        let url = Url::parse(COOKIE_URL).expect("valid cookie url");
        self.jar
            .cookies(&url)
            .and_then(|header| header.to_str().map(Session::from_cookie_header).ok())
            .unwrap_or_default()
    }

    async fn guest_token(&self) -> Result<String, TwitterError> {
        let response = self.client.post(GUEST_ACTIVATE_URL).send().await?;
        let response = deserialize_response::<GuestTokenResponse>(response).await?;
        Ok(response.guest_token)
    }

    async fn task(
        &self,
        guest_token: &str,
        query: &HashMap<&str, &str>,
        body: &Value,
    ) -> Result<TaskResponse, TwitterError> {
        let mut request = self
            .client
            .post(TASK_URL)
            .header("x-guest-token", guest_token)
            .query(query)
            .json(body);
        if let Some(csrf) = self.session().csrf_token() {
            request = request.header("x-csrf-token", csrf.to_string());
        }
        let response = request.send().await?;
        deserialize_response::<TaskResponse>(response).await
    }

    fn answer(&self, subtask_id: &str) -> Result<Step, TwitterError> {
        let input = match subtask_id {
            "LoginJsInstrumentationSubtask" => json!({
                "subtask_id": subtask_id,
                "js_instrumentation": { "response": "{}", "link": "next_link" },
            }),
            "LoginEnterUserIdentifierSSO" => json!({
                "subtask_id": subtask_id,
                "settings_list": {
                    "setting_responses": [{
                        "key": "user_identifier",
                        "response_data": { "text_data": { "result": self.credentials.username } },
                    }],
                    "link": "next_link",
                },
            }),
            "LoginEnterAlternateIdentifierSubtask" => json!({
                "subtask_id": subtask_id,
                "enter_text": { "text": self.credentials.email, "link": "next_link" },
            }),
            "LoginEnterPassword" => json!({
                "subtask_id": subtask_id,
                "enter_password": { "password": self.credentials.password, "link": "next_link" },
            }),
            "AccountDuplicationCheck" => json!({
                "subtask_id": subtask_id,
                "check_logged_in_account": { "link": "AccountDuplicationCheck_false" },
            }),
            "LoginTwoFactorAuthChallenge" => {
                let code = current_totp_code(&self.credentials.totp_secret)?;
                json!({
                    "subtask_id": subtask_id,
                    "enter_text": { "text": code, "link": "next_link" },
                })
            }
            "LoginSuccessSubtask" => return Ok(Step::Done),
            "DenyLoginSubtask" => {
                return Err(TwitterError::Login("Login was denied".to_string()))
            }
            other => {
                return Err(TwitterError::Login(format!(
                    "Unsupported login step: {other}"
                )))
            }
        };
        Ok(Step::Answer(input))
    }
}

#[async_trait]
impl Authenticator for LoginFlow {
    async fn login(&self) -> Result<Session, TwitterError> {
        log::info!("Logging in as {}", self.credentials.username);
        let guest_token = self.guest_token().await?;
        let start = json!({
            "input_flow_data": {
                "flow_context": {
                    "debug_overrides": {},
                    "start_location": { "location": "splash_screen" },
                },
            },
            "subtask_versions": {},
        });
        let mut response = self
            .task(&guest_token, &hashmap! { "flow_name" => "login" }, &start)
            .await?;
        for _ in 0..MAX_STEPS {
            let subtask = response
                .subtasks
                .first()
                .ok_or_else(|| TwitterError::Login("Flow ended without success".to_string()))?;
            log::debug!("Login step: {}", subtask.subtask_id);
            match self.answer(&subtask.subtask_id)? {
                Step::Done => return Ok(self.session()),
                Step::Answer(input) => {
                    let body = json!({
                        "flow_token": response.flow_token,
                        "subtask_inputs": [input],
                    });
                    response = self.task(&guest_token, &HashMap::new(), &body).await?;
                }
            }
        }
        Err(TwitterError::Login("Too many login steps".to_string()))
    }
}

pub(crate) async fn deserialize_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, TwitterError> {
    let status = response.status();
    let text = response.text().await?;
    check_status(status, &text)?;
    serde_json::from_str::<T>(&text)
        .map_err(|e| TwitterError::InvalidResponse(format!("{e}\nContents:\n{text}")))
}
