use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Operating systems a hint can be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Darwin,
    Windows,
}

impl Os {
    /// Lenient parse used for contexts: unknown tokens become `None` rather
    /// than failing the whole request.
    pub fn from_token(token: &str) -> Option<Os> {
        match token {
            "linux" => Some(Os::Linux),
            "darwin" | "macos" => Some(Os::Darwin),
            "windows" => Some(Os::Windows),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
            Os::Windows => "windows",
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shells a command hint can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellType {
    Bash,
    Sh,
    Powershell,
    Cmd,
}

/// Template dialects a template hint can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateFormat {
    Mustache,
    Handlebars,
    Jinja,
    Interpolate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Secret,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HintSource {
    User,
    Agent,
    ToolOutput,
    FileImport,
}

/// A hint value: either a bare string or a tagged structured value.
///
/// The wire form preserves the `type` discriminator on structured values so
/// snapshots round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HintValue {
    Text(String),
    Typed(TypedValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TypedValue {
    Command {
        cmd: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shell: Option<ShellType>,
    },
    Path {
        abs: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        os: Option<Vec<Os>>,
    },
    Template {
        format: TemplateFormat,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        defaults: Option<HashMap<String, String>>,
    },
    Json {
        data: Value,
    },
}

impl HintValue {
    /// Textual projection used by the secret guard and regex query filter.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            HintValue::Text(s) => Cow::Borrowed(s),
            HintValue::Typed(TypedValue::Command { cmd, .. }) => Cow::Borrowed(cmd),
            HintValue::Typed(TypedValue::Path { abs, .. }) => Cow::Borrowed(abs),
            HintValue::Typed(TypedValue::Template { body, .. }) => Cow::Borrowed(body),
            HintValue::Typed(TypedValue::Json { data }) => Cow::Owned(data.to_string()),
        }
    }
}

impl From<&str> for HintValue {
    fn from(s: &str) -> Self {
        HintValue::Text(s.to_string())
    }
}

/// Accepts a bare string or a list on input; always a list internally and on
/// output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OneOrMany(pub Vec<String>);

impl<'de> Deserialize<'de> for OneOrMany {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(s) => OneOrMany(vec![s]),
            Raw::Many(v) => OneOrMany(v),
        })
    }
}

impl OneOrMany {
    pub fn contains(&self, needle: &str) -> bool {
        self.0.iter().any(|s| s == needle)
    }
}

/// Scope predicates, combined by AND at match time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd_glob: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Vec<Os>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_required: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_match: Option<IndexMap<String, OneOrMany>>,
}

/// Hint metadata. Every field is optional; absent fields are elided on the
/// wire and defaulted only inside the scorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HintMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// 1-10
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    /// 0.0-1.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// `"session"` or an ISO-8601 duration (`PT<h>H<m>M<s>S`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<Sensitivity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Scope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<HintSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_by: Option<String>,
}

fn default_version() -> u64 {
    1
}

/// A stored hint with its bookkeeping fields.
///
/// Timestamps are kept as the RFC-3339 strings they travel as; snapshot
/// imports may carry malformed values and the scorer degrades on them
/// instead of erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hint {
    pub value: HintValue,
    #[serde(default)]
    pub meta: HintMeta,
    #[serde(default = "default_version")]
    pub version: u64,
    #[serde(default = "now_iso")]
    pub created_at: String,
    #[serde(default = "now_iso")]
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<String>,
    #[serde(default)]
    pub use_count: u64,
}

impl Hint {
    pub fn new(value: HintValue, meta: HintMeta) -> Self {
        let now = now_iso();
        Hint {
            value,
            meta,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
            last_used_at: None,
            use_count: 0,
        }
    }
}

/// The runtime environment presented at query time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_os",
        skip_serializing_if = "Option::is_none"
    )]
    pub os: Option<Os>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, Option<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_open: Option<Vec<String>>,
}

/// Unknown OS tokens in a context degrade to "not provided" rather than
/// rejecting the request.
fn lenient_os<'de, D>(deserializer: D) -> Result<Option<Os>, D::Error>
where
    D: Deserializer<'de>,
{
    let token = Option::<String>::deserialize(deserializer)?;
    Ok(token.as_deref().and_then(Os::from_token))
}

/// Why (and how well) a hint matched the caller's context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchExplanation {
    pub matched: bool,
    pub score: f64,
    pub reasons: Vec<String>,
}

impl MatchExplanation {
    pub fn unmatched() -> Self {
        MatchExplanation {
            matched: false,
            score: 0.0,
            reasons: Vec::new(),
        }
    }
}

/// One row of a ranked query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedHint {
    pub component: String,
    pub key: String,
    pub hint: Hint,
    pub score: f64,
    pub match_explain: MatchExplanation,
}

/// A structural copy of the store tree, suitable for serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: String,
    pub session_id: String,
    pub created_at: String,
    pub components: IndexMap<String, ComponentSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentSnapshot {
    pub hints: IndexMap<String, Hint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub name: String,
    pub hint_count: usize,
}

/// Current time in the wire format used for all bookkeeping fields.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. Accepts RFC-3339 and bare
/// `YYYY-MM-DDTHH:MM:SS[.ffffff]` (treated as UTC) so snapshots produced by
/// other tooling still score sensibly.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    None
}
