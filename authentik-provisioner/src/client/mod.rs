//! Authentik core API client

mod types;

pub use types::*;

use reqwest::{Method, StatusCode, blocking, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::audit::{AuditEntry, AuditLog, MASK};
use crate::config::ServerConfig;
use crate::error::{Error, Resource, Result};

/// Status and raw body of an identity API response
#[derive(Debug, Clone)]
struct Reply {
    status: StatusCode,
    body: String,
}

impl Reply {
    fn ensure_success(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(Error::Upstream {
                status: self.status,
                body: self.body,
            })
        }
    }

    fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Blocking client for one Authentik instance.
///
/// Every request is recorded on the audit log, successful or not.
#[derive(Clone)]
pub struct IdentityClient {
    config: ServerConfig,
    client: blocking::Client,
    audit: Arc<dyn AuditLog>,
}

impl IdentityClient {
    pub fn new(config: ServerConfig, audit: Arc<dyn AuditLog>) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let mut auth_value =
            header::HeaderValue::from_str(&format!("Bearer {}", config.api_token))
                .map_err(|_| Error::Config("API token contains invalid characters".to_string()))?;
        auth_value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth_value);

        let client = blocking::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            config,
            client,
            audit,
        })
    }

    /// `GET /core/users/?username=<name>`
    pub fn find_users(&self, username: &str) -> Result<Vec<User>> {
        let url = self.list_url("core/users/", "username", username)?;
        let reply = self.call("GetUser", Method::GET, url, None)?.ensure_success()?;
        let page: Paginated<User> = reply.json()?;
        Ok(page.results)
    }

    /// First user with exactly this username
    pub fn find_user(&self, username: &str) -> Result<User> {
        self.find_users(username)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(Resource::User, username.to_string()))
    }

    /// `POST /core/users/`
    pub fn create_user(&self, user: &NewUser) -> Result<User> {
        let url = self.config.api_url("core/users/");
        let reply = self
            .call("CreateUser", Method::POST, url, Some(to_value(user)?))?
            .ensure_success()?;
        let created: User = reply.json()?;
        info!("Created Authentik user {} (pk {})", user.username, created.pk);
        Ok(created)
    }

    /// `PATCH /core/users/<pk>/` toggling `is_active`
    pub fn set_active(&self, user_pk: i64, is_active: bool) -> Result<()> {
        let url = self.config.api_url(&format!("core/users/{}/", user_pk));
        let patch = to_value(&UserPatch { is_active })?;
        self.call("UpdateUser", Method::PATCH, url, Some(patch))?
            .ensure_success()?;
        info!("Set is_active={} on Authentik user pk {}", is_active, user_pk);
        Ok(())
    }

    /// `DELETE /core/users/<pk>/`
    pub fn delete_user(&self, user_pk: i64) -> Result<()> {
        let url = self.config.api_url(&format!("core/users/{}/", user_pk));
        self.call("DeleteUser", Method::DELETE, url, None)?
            .ensure_success()?;
        info!("Deleted Authentik user pk {}", user_pk);
        Ok(())
    }

    /// `GET /core/groups/?name=<name>`, first match
    pub fn find_group(&self, name: &str) -> Result<Group> {
        let url = self.list_url("core/groups/", "name", name)?;
        let reply = self
            .call("LookupGroup", Method::GET, url, None)?
            .ensure_success()?;
        let page: Paginated<Group> = reply.json()?;
        page.results
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(Resource::Group, name.to_string()))
    }

    /// `POST /core/groups/<pk>/add_user/`
    pub fn add_user_to_group(&self, group_pk: &str, user_pk: i64) -> Result<()> {
        let url = self
            .config
            .api_url(&format!("core/groups/{}/add_user/", group_pk));
        let member = to_value(&GroupMember { pk: user_pk })?;
        self.call("AddToGroup", Method::POST, url, Some(member))?
            .ensure_success()?;
        info!("Added user pk {} to group {}", user_pk, group_pk);
        Ok(())
    }

    fn list_url(&self, path: &str, key: &str, value: &str) -> Result<String> {
        Url::parse_with_params(&self.config.api_url(path), &[(key, value)])
            .map(String::from)
            .map_err(|e| Error::Config(format!("Invalid Authentik URL: {}", e)))
    }

    fn call(&self, action: &str, method: Method, url: String, body: Option<Value>) -> Result<Reply> {
        debug!("Making {} request to {}", method, url);

        let mut request = self.client.request(method.clone(), &url);
        if let Some(body) = &body {
            request = request.json(body);
        }

        let audit_request = json!({
            "method": method.as_str(),
            "url": url,
            "authorization": MASK,
            "data": body,
        });

        let outcome = request.send().and_then(|response| {
            let status = response.status();
            response.text().map(|text| Reply { status, body: text })
        });

        match outcome {
            Ok(reply) => {
                debug!("{} {} returned {}", method, url, reply.status);
                self.audit.record(AuditEntry::new(
                    action,
                    audit_request,
                    json!({
                        "httpCode": reply.status.as_u16(),
                        "response": reply.body,
                    }),
                ));
                Ok(reply)
            }
            Err(e) => {
                self.audit.record(AuditEntry::new(
                    action,
                    audit_request,
                    json!({ "error": e.to_string() }),
                ));
                Err(Error::Network(e))
            }
        }
    }
}

fn to_value<T: Serialize>(body: &T) -> Result<Value> {
    Ok(serde_json::to_value(body)?)
}
