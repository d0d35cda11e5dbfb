//! robots.txt handling.
//!
//! [`RobotsRules`] implements the usual matching: the group naming our agent
//! wins over `*`, the longest matching pattern decides, and `Allow` wins a
//! tie. `*` matches any run of characters and a trailing `$` anchors the end.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use url::Url;

use crate::RobotsPolicy;

pub const DEFAULT_USER_AGENT: &str = "LeadGenBot";

#[derive(Debug, Clone)]
struct Rule {
    allow: bool,
    len: usize,
    pattern: Regex,
}

#[derive(Debug, Clone, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
}

/// Parsed rules for one user agent.
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    rules: Vec<Rule>,
}

impl RobotsRules {
    /// Rules that permit everything.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse a robots.txt body, keeping only the rules that apply to
    /// `user_agent`.
    pub fn parse(text: &str, user_agent: &str) -> Self {
        let mut groups: Vec<Group> = Vec::new();
        let mut current = Group::default();
        let mut in_rules = false;

        for raw in text.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if in_rules {
                        groups.push(std::mem::take(&mut current));
                        in_rules = false;
                    }
                    current.agents.push(value.to_ascii_lowercase());
                }
                "allow" | "disallow" => {
                    in_rules = true;
                    // An empty Disallow permits everything; it adds no rule.
                    if value.is_empty() {
                        continue;
                    }
                    if let Some(pattern) = compile_pattern(value) {
                        current.rules.push(Rule {
                            allow: key == "allow",
                            len: value.len(),
                            pattern,
                        });
                    }
                }
                _ => {}
            }
        }
        if !current.agents.is_empty() {
            groups.push(current);
        }

        let agent = user_agent.to_ascii_lowercase();
        let specific: Vec<Rule> = groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| a != "*" && agent.contains(a.as_str())))
            .flat_map(|g| g.rules.iter().cloned())
            .collect();
        let rules = if specific.is_empty() {
            groups
                .iter()
                .filter(|g| g.agents.iter().any(|a| a == "*"))
                .flat_map(|g| g.rules.iter().cloned())
                .collect()
        } else {
            specific
        };
        Self { rules }
    }

    /// Whether `path` (path plus optional query) may be fetched.
    pub fn is_allowed(&self, path: &str) -> bool {
        let path = if path.is_empty() { "/" } else { path };
        let mut best: Option<&Rule> = None;
        for rule in self.rules.iter().filter(|r| r.pattern.is_match(path)) {
            best = match best {
                Some(b) if b.len > rule.len || (b.len == rule.len && b.allow) => Some(b),
                _ => Some(rule),
            };
        }
        best.map_or(true, |r| r.allow)
    }
}

fn compile_pattern(pattern: &str) -> Option<Regex> {
    let (body, anchored) = match pattern.strip_suffix('$') {
        Some(body) => (body, true),
        None => (pattern, false),
    };
    let mut re = String::from("^");
    re.push_str(
        &body
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*"),
    );
    if anchored {
        re.push('$');
    }
    Regex::new(&re).ok()
}

fn path_of(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// Used when `ROBOTS_RESPECT` is off.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl RobotsPolicy for AllowAll {
    async fn can_fetch(&self, _url: &str) -> bool {
        true
    }
}

/// Fetches `/robots.txt` once per origin and caches the parsed rules.
/// Unreachable or non-200 robots files allow everything.
pub struct HttpRobotsPolicy {
    client: reqwest::Client,
    user_agent: String,
    cache: Mutex<HashMap<String, Arc<RobotsRules>>>,
}

impl HttpRobotsPolicy {
    pub fn new() -> Self {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        let user_agent = user_agent.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(format!("Mozilla/5.0 (compatible; {user_agent}/1.0)"))
            .build()
            .unwrap_or_default();
        Self {
            client,
            user_agent,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, origin: &str) -> Option<Arc<RobotsRules>> {
        self.cache.lock().ok()?.get(origin).cloned()
    }

    async fn fetch_rules(&self, origin: &str) -> RobotsRules {
        let robots_url = format!("{origin}/robots.txt");
        match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => RobotsRules::parse(&body, &self.user_agent),
                Err(e) => {
                    tracing::warn!(url = %robots_url, error = %e, "Unreadable robots.txt, allowing");
                    RobotsRules::allow_all()
                }
            },
            Ok(resp) => {
                tracing::debug!(url = %robots_url, status = %resp.status(), "No robots.txt, allowing");
                RobotsRules::allow_all()
            }
            Err(e) => {
                tracing::warn!(url = %robots_url, error = %e, "robots.txt fetch failed, allowing");
                RobotsRules::allow_all()
            }
        }
    }
}

impl Default for HttpRobotsPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RobotsPolicy for HttpRobotsPolicy {
    async fn can_fetch(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(u) if u.has_host() => u,
            _ => {
                tracing::warn!(url, "Robots check on unparseable URL, allowing");
                return true;
            }
        };
        let origin = parsed.origin().ascii_serialization();

        let rules = match self.cached(&origin) {
            Some(rules) => rules,
            None => {
                let rules = Arc::new(self.fetch_rules(&origin).await);
                if let Ok(mut cache) = self.cache.lock() {
                    cache.entry(origin).or_insert_with(|| rules.clone());
                }
                rules
            }
        };
        rules.is_allowed(&path_of(&parsed))
    }
}
