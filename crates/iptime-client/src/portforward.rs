//! Port-forward rule management.
//!
//! The admin interface exposes no structured API for forwarding rules; the
//! rule table exists only as HTML rendered by `timepro.cgi`, one
//! `onClickedPFRule(...)` onclick handler per row. [`PortForwardManager`]
//! scrapes that table and drives changes through the same form posts the
//! page itself submits.
//!
//! Rule ids are row positions (1-based) in the listing, rebuilt on every
//! fetch. They are stable only between fetches; the rule name is the
//! durable handle, and deletion is keyed on it.

use std::fmt;

use regex::Regex;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::session::RouterClient;

/// CGI endpoint serving the rule table and accepting rule form posts.
const RULES_PATH: &str = "sess-bin/timepro.cgi";

/// A forwarding rule as listed on the admin page. Ports stay strings, the
/// way the page renders them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRule {
    pub id: usize,
    pub description: String,
    pub internal_ip: String,
    pub protocol: String,
    pub external_port: String,
    pub internal_port: String,
}

/// How to pick a rule out of the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleSelector {
    /// Position in the current listing, 1-based.
    Id(usize),
    /// Exact rule description.
    Name(String),
}

impl RuleSelector {
    fn matches(&self, rule: &ForwardRule) -> bool {
        match self {
            Self::Id(id) => rule.id == *id,
            Self::Name(name) => rule.description == *name,
        }
    }
}

impl fmt::Display for RuleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

impl From<usize> for RuleSelector {
    fn from(id: usize) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for RuleSelector {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for RuleSelector {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// Parameters for a new rule.
///
/// The internal port defaults to the external port and the protocol to
/// `tcp`, matching the admin page defaults.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub description: String,
    pub internal_ip: String,
    pub external_port: u16,
    pub internal_port: Option<u16>,
    pub protocol: String,
}

impl NewRule {
    pub fn new(
        description: impl Into<String>,
        internal_ip: impl Into<String>,
        external_port: u16,
    ) -> Self {
        Self {
            description: description.into(),
            internal_ip: internal_ip.into(),
            external_port,
            internal_port: None,
            protocol: "tcp".to_string(),
        }
    }

    pub fn with_internal_port(mut self, port: u16) -> Self {
        self.internal_port = Some(port);
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }
}

/// Partial rule update; `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub description: Option<String>,
    pub internal_ip: Option<String>,
    pub external_port: Option<u16>,
    pub internal_port: Option<u16>,
    pub protocol: Option<String>,
}

impl RuleUpdate {
    fn apply_to(&self, rule: &mut ForwardRule) {
        if let Some(description) = &self.description {
            rule.description = description.clone();
        }
        if let Some(internal_ip) = &self.internal_ip {
            rule.internal_ip = internal_ip.clone();
        }
        if let Some(port) = self.external_port {
            rule.external_port = port.to_string();
        }
        if let Some(port) = self.internal_port {
            rule.internal_port = port.to_string();
        }
        if let Some(protocol) = &self.protocol {
            rule.protocol = protocol.clone();
        }
    }
}

/// Rule operations on top of a [`RouterClient`] session.
pub struct PortForwardManager<'a> {
    client: &'a RouterClient,
}

impl<'a> PortForwardManager<'a> {
    pub fn new(client: &'a RouterClient) -> Self {
        Self { client }
    }

    /// Scrapes the current rule set off the admin page.
    ///
    /// Recovers once from a timed-out session by replaying the login on a
    /// fresh cookie jar and refetching. Every failure mode collapses into
    /// an empty listing.
    pub async fn list_rules(&self) -> Vec<ForwardRule> {
        match self.try_list_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                error!(error = %e, "rules fetch failed");
                Vec::new()
            }
        }
    }

    async fn try_list_rules(&self) -> Result<Vec<ForwardRule>> {
        let page = self
            .client
            .request(RULES_PATH, &rules_query(), Method::GET)
            .await;
        let Some(mut body) = page.filter(|body| !body.is_empty()) else {
            return Ok(Vec::new());
        };

        if body.contains("login_session") && body.contains("session_timeout") {
            info!("session timed out, replaying login");
            body = match self.refetch_after_relogin().await? {
                Some(page) => page,
                None => return Ok(Vec::new()),
            };
        }

        debug!(length = body.len(), "rules page fetched");
        let rules = parse_rules(&body);
        info!(count = rules.len(), "rules listed");
        Ok(rules)
    }

    /// Fresh jar, login replay, immediate refetch. The dead cookie cannot
    /// be revived, so the whole cookie session is swapped out.
    async fn refetch_after_relogin(&self) -> Result<Option<String>> {
        self.client.reset_session()?;
        self.client.replay_login().await?;

        let http = self.client.http();
        let response = http
            .get(self.client.url_for(RULES_PATH))
            .query(&rules_query())
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            error!(%status, "rules page refetch failed");
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }

    /// Finds one rule in the current listing.
    pub async fn get_rule(&self, selector: &RuleSelector) -> Option<ForwardRule> {
        self.list_rules()
            .await
            .into_iter()
            .find(|rule| selector.matches(rule))
    }

    /// Appends a rule after the existing ones.
    pub async fn add_rule(&self, rule: &NewRule) -> bool {
        let priority = self.list_rules().await.len() + 1;
        let ok = self.post_action(&add_payload(rule, priority)).await;
        if ok {
            info!(description = %rule.description, "rule added");
        }
        ok
    }

    /// Rewrites an existing rule with the given fields changed.
    pub async fn update_rule(&self, selector: &RuleSelector, update: &RuleUpdate) -> bool {
        let Some(mut target) = self.get_rule(selector).await else {
            warn!(%selector, "rule not found");
            return false;
        };
        update.apply_to(&mut target);
        let ok = self.post_action(&modify_payload(&target)).await;
        if ok {
            info!(id = target.id, "rule updated");
        }
        ok
    }

    /// Deletes a rule. The delete form is keyed on the rule name.
    pub async fn delete_rule(&self, selector: &RuleSelector) -> bool {
        let Some(target) = self.get_rule(selector).await else {
            warn!(%selector, "rule not found");
            return false;
        };
        let ok = self.post_action(&delete_payload(&target)).await;
        if ok {
            info!(id = target.id, "rule deleted");
        }
        ok
    }

    /// Posts a settings change. The router answers mutations with the
    /// refreshed page; any non-empty body counts as accepted.
    async fn post_action(&self, payload: &[(&'static str, String)]) -> bool {
        match self.client.request(RULES_PATH, payload, Method::POST).await {
            Some(body) => !body.is_empty(),
            None => false,
        }
    }
}

fn rules_query() -> [(&'static str, String); 3] {
    [
        ("tmenu", "iframe".to_string()),
        ("smenu", "user_portforward".to_string()),
        ("mode", "user".to_string()),
    ]
}

/// Form payload for `act=add`. Field order mirrors the admin page form.
fn add_payload(rule: &NewRule, priority: usize) -> Vec<(&'static str, String)> {
    let internal_port = rule.internal_port.unwrap_or(rule.external_port).to_string();
    let external_port = rule.external_port.to_string();
    vec![
        ("tmenu", "iframe".to_string()),
        ("smenu", "user_portforward".to_string()),
        ("act", "add".to_string()),
        ("view_mode", "user".to_string()),
        ("mode", "user".to_string()),
        ("name", rule.description.clone()),
        ("int_sport", internal_port.clone()),
        ("int_eport", internal_port),
        ("ext_sport", external_port.clone()),
        ("ext_eport", external_port),
        ("trigger_protocol", String::new()),
        ("trigger_sport", String::new()),
        ("trigger_eport", String::new()),
        ("forward_ports", String::new()),
        ("forward_protocol", String::new()),
        ("internal_ip", rule.internal_ip.clone()),
        ("protocol", rule.protocol.clone()),
        ("disabled", "0".to_string()),
        ("priority", priority.to_string()),
    ]
}

/// Form payload for `act=modify`. The row is addressed by its priority.
fn modify_payload(rule: &ForwardRule) -> Vec<(&'static str, String)> {
    vec![
        ("tmenu", "iframe".to_string()),
        ("smenu", "user_portforward".to_string()),
        ("act", "modify".to_string()),
        ("view_mode", "user".to_string()),
        ("mode", "user".to_string()),
        ("name", rule.description.clone()),
        ("int_sport", rule.internal_port.clone()),
        ("int_eport", rule.internal_port.clone()),
        ("ext_sport", rule.external_port.clone()),
        ("ext_eport", rule.external_port.clone()),
        ("trigger_protocol", String::new()),
        ("trigger_sport", String::new()),
        ("trigger_eport", String::new()),
        ("forward_ports", String::new()),
        ("forward_protocol", String::new()),
        ("internal_ip", rule.internal_ip.clone()),
        ("protocol", rule.protocol.clone()),
        ("disabled", "0".to_string()),
        ("priority", rule.id.to_string()),
        ("old_priority", rule.id.to_string()),
    ]
}

/// Form payload for `act=del`: every field cleared, the victim named in
/// `delcheck`.
fn delete_payload(rule: &ForwardRule) -> Vec<(&'static str, String)> {
    vec![
        ("tmenu", "iframe".to_string()),
        ("smenu", "user_portforward".to_string()),
        ("act", "del".to_string()),
        ("view_mode", "user".to_string()),
        ("mode", String::new()),
        ("name", String::new()),
        ("int_sport", String::new()),
        ("int_eport", String::new()),
        ("ext_sport", String::new()),
        ("ext_eport", String::new()),
        ("trigger_protocol", String::new()),
        ("trigger_sport", String::new()),
        ("trigger_eport", String::new()),
        ("forward_ports", String::new()),
        ("forward_protocol", String::new()),
        ("internal_ip", String::new()),
        ("protocol", String::new()),
        ("disabled", String::new()),
        ("priority", String::new()),
        ("old_priority", String::new()),
        ("delcheck", rule.description.clone()),
    ]
}

/// Scrapes rules out of the per-row onclick handlers. Argument layout:
///
/// ```text
/// onClickedPFRule(mode, name, selserver, internal_ip, protocol,
///                 ext_sport, ext_eport, int_sport, int_eport, ...)
/// ```
///
/// Rows with an empty internal ip or external port are placeholders and
/// are skipped; ids number the surviving rows from 1.
fn parse_rules(body: &str) -> Vec<ForwardRule> {
    let pattern = Regex::new(
        r"onClickedPFRule\('user','([^']*?)','[^']*?','([^']*?)','([^']*?)','([^']*?)','([^']*?)','([^']*?)','([^']*?)'",
    )
    .expect("valid rule row pattern");

    pattern
        .captures_iter(body)
        .map(|captures| {
            let (_, fields) = captures.extract::<7>();
            fields
        })
        .filter(|[_, internal_ip, _, ext_sport, ..]| {
            !internal_ip.is_empty() && !ext_sport.is_empty()
        })
        .enumerate()
        .map(
            |(index, [name, internal_ip, protocol, ext_sport, _, int_sport, _])| ForwardRule {
                id: index + 1,
                description: name.to_string(),
                internal_ip: internal_ip.to_string(),
                protocol: protocol.to_string(),
                external_port: ext_sport.to_string(),
                internal_port: int_sport.to_string(),
            },
        )
        .collect()
}
