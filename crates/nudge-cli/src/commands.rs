//! Command handlers and their output rendering.
//!
//! Every handler returns a serializable output; `--json` prints it
//! verbatim, otherwise the `human()` rendering is shown.

use anyhow::{Result, anyhow};
use colored::Colorize;
use serde::Serialize;
use serde_json::{Value, json};

use nudge::model::{Context, HintMeta, HintValue, Os, Scope, Sensitivity, TypedValue};
use nudge::safety;
use nudge::rpc::{
    BumpParams, DeleteHintParams, ExportParams, GetHintParams, ImportParams, QueryParams,
    SetHintParams,
};
use nudge::store::ImportMode;
use nudge_client::NudgeClient;
use nudge_service::ServerLock;

use crate::context;

pub trait Render: Serialize {
    fn human(&self) -> String;
}

pub fn emit<T: Render>(output: &T, json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(output)?);
    } else {
        println!("{}", output.human());
    }
    Ok(())
}

fn split_csv(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The value a human asked for: the command, path or body of a structured
/// hint rather than its wrapper object.
fn display_value(value: &HintValue) -> Value {
    match value {
        HintValue::Text(s) => json!(s),
        HintValue::Typed(TypedValue::Command { cmd, .. }) => json!(cmd),
        HintValue::Typed(TypedValue::Path { abs, .. }) => json!(abs),
        HintValue::Typed(TypedValue::Template { body, .. }) => json!(body),
        HintValue::Typed(TypedValue::Json { data }) => data.clone(),
    }
}

/// Strings print bare, everything else as JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Serialize)]
pub struct SetOutput {
    pub success: bool,
    pub component: String,
    pub key: String,
    pub version: u64,
}

impl Render for SetOutput {
    fn human(&self) -> String {
        format!(
            "{} Set {}/{} (v{})",
            "✓".green(),
            self.component,
            self.key,
            self.version
        )
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_set(
    client: &NudgeClient,
    component: String,
    key: String,
    value: String,
    tags: Option<String>,
    priority: Option<u8>,
    confidence: Option<f64>,
    ttl: Option<String>,
    scope_cwd_glob: Option<String>,
    scope_branch: Option<String>,
    scope_os: Option<String>,
    allow_secret: bool,
) -> Result<SetOutput> {
    let scope_os = scope_os
        .as_deref()
        .map(|list| {
            list.split(',')
                .map(str::trim)
                .map(|token| {
                    Os::from_token(token).ok_or_else(|| anyhow!("unknown os: {token}"))
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let scope = Scope {
        cwd_glob: scope_cwd_glob.map(|g| vec![g]),
        branch: scope_branch.as_deref().map(split_csv),
        os: scope_os,
        ..Default::default()
    };
    let meta = HintMeta {
        tags: tags.as_deref().map(split_csv),
        priority,
        confidence,
        ttl,
        scope: (scope != Scope::default()).then_some(scope),
        ..Default::default()
    };

    let result = client
        .set_hint(SetHintParams {
            component: component.clone(),
            key: key.clone(),
            value: HintValue::Text(value),
            meta: (meta != HintMeta::default()).then_some(meta),
            if_match_version: None,
            allow_secret,
        })
        .await?;

    Ok(SetOutput {
        success: true,
        component,
        key,
        version: result.hint.version,
    })
}

#[derive(Debug, Serialize)]
pub struct GetOutput {
    pub value: Value,
    pub r#match: MatchInfo,
}

#[derive(Debug, Serialize)]
pub struct MatchInfo {
    pub score: f64,
    pub reasons: Vec<String>,
}

impl Render for GetOutput {
    fn human(&self) -> String {
        let mut out = format!(
            "value: {}\nmatch:\n  score: {}\n  reasons:",
            value_text(&self.value),
            self.r#match.score
        );
        for reason in &self.r#match.reasons {
            out.push_str(&format!("\n    - {reason}"));
        }
        out
    }
}

pub async fn cmd_get(
    client: &NudgeClient,
    component: String,
    key: String,
    cwd: Option<String>,
    branch: Option<String>,
    os: Option<String>,
) -> Result<GetOutput> {
    let detected = context::auto_detect();
    let ctx = Context {
        cwd: cwd.or(detected.cwd),
        branch: branch.or(detected.branch),
        os: os.as_deref().and_then(Os::from_token).or(detected.os),
        repo: detected.repo,
        env: detected.env,
        files_open: None,
    };

    let result = client
        .get_hint(GetHintParams {
            component,
            key,
            context: Some(ctx),
        })
        .await?;

    Ok(GetOutput {
        value: display_value(&result.hint.value),
        r#match: MatchInfo {
            score: result.match_explain.score,
            reasons: result.match_explain.reasons,
        },
    })
}

#[derive(Debug, Serialize)]
pub struct QueryOutput {
    pub count: usize,
    pub hints: Vec<QueryRow>,
}

#[derive(Debug, Serialize)]
pub struct QueryRow {
    pub component: String,
    pub key: String,
    pub score: f64,
    pub value: Value,
    pub tags: Vec<String>,
}

impl Render for QueryOutput {
    fn human(&self) -> String {
        let mut out = format!("Found {} hint(s):", self.count);
        for hint in &self.hints {
            out.push_str(&format!(
                "\n  {}/{}\n  score: {}\n  value: {}",
                hint.component,
                hint.key,
                hint.score,
                value_text(&hint.value)
            ));
            if !hint.tags.is_empty() {
                out.push_str(&format!("\n  tags: {}", hint.tags.join(", ")));
            }
            out.push('\n');
        }
        out
    }
}

pub async fn cmd_query(
    client: &NudgeClient,
    component: Option<String>,
    tags: Option<String>,
    limit: usize,
) -> Result<QueryOutput> {
    let result = client
        .query(QueryParams {
            component,
            tags: tags.as_deref().map(split_csv),
            context: Some(context::auto_detect()),
            limit,
            ..Default::default()
        })
        .await?;

    let hints: Vec<QueryRow> = result
        .hints
        .into_iter()
        .map(|m| {
            // Secret-marked hints are redacted in listings; `get` returns
            // them in full.
            let value = if m.hint.meta.sensitivity == Some(Sensitivity::Secret) {
                json!(safety::sanitize_for_display(&m.hint.value, true))
            } else {
                display_value(&m.hint.value)
            };
            QueryRow {
                component: m.component,
                key: m.key,
                score: m.score,
                value,
                tags: m.hint.meta.tags.unwrap_or_default(),
            }
        })
        .collect();
    Ok(QueryOutput {
        count: hints.len(),
        hints,
    })
}

#[derive(Debug, Serialize)]
pub struct DeleteOutput {
    pub deleted: bool,
    pub component: String,
    pub key: String,
}

impl Render for DeleteOutput {
    fn human(&self) -> String {
        format!("{} Deleted {}/{}", "✓".green(), self.component, self.key)
    }
}

pub async fn cmd_delete(
    client: &NudgeClient,
    component: String,
    key: String,
) -> Result<DeleteOutput> {
    let result = client
        .delete_hint(DeleteHintParams {
            component: component.clone(),
            key: key.clone(),
        })
        .await?;
    Ok(DeleteOutput {
        deleted: result.deleted,
        component,
        key,
    })
}

#[derive(Debug, Serialize)]
pub struct BumpOutput {
    pub component: String,
    pub key: String,
    pub use_count: u64,
    pub last_used_at: Option<String>,
}

impl Render for BumpOutput {
    fn human(&self) -> String {
        format!(
            "{} Bumped {}/{}\n  use_count: {}\n  last_used_at: {}",
            "↑".green(),
            self.component,
            self.key,
            self.use_count,
            self.last_used_at.as_deref().unwrap_or("-")
        )
    }
}

pub async fn cmd_bump(
    client: &NudgeClient,
    component: String,
    key: String,
    delta: u64,
) -> Result<BumpOutput> {
    let result = client
        .bump(BumpParams {
            component: component.clone(),
            key: key.clone(),
            delta,
        })
        .await?;
    Ok(BumpOutput {
        component,
        key,
        use_count: result.hint.use_count,
        last_used_at: result.hint.last_used_at,
    })
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ListOutput {
    Components {
        components: Vec<nudge::model::ComponentInfo>,
    },
    Keys {
        component: String,
        keys: Vec<String>,
        count: usize,
    },
}

impl Render for ListOutput {
    fn human(&self) -> String {
        match self {
            ListOutput::Components { components } => {
                let mut out = "Components:".to_string();
                for comp in components {
                    out.push_str(&format!("\n  {}: {} hint(s)", comp.name, comp.hint_count));
                }
                out
            }
            ListOutput::Keys {
                component, keys, ..
            } => {
                let mut out = format!("Keys in '{component}':");
                if keys.is_empty() {
                    out.push_str("\n  (no keys found)");
                }
                for key in keys {
                    out.push_str(&format!("\n  {key}"));
                }
                out
            }
        }
    }
}

pub async fn cmd_list_components(
    client: &NudgeClient,
    component: Option<String>,
) -> Result<ListOutput> {
    if let Some(component) = component {
        let result = client
            .query(QueryParams {
                component: Some(component.clone()),
                context: Some(context::auto_detect()),
                limit: 1000,
                ..Default::default()
            })
            .await?;
        let keys: Vec<String> = result.hints.into_iter().map(|m| m.key).collect();
        return Ok(ListOutput::Keys {
            component,
            count: keys.len(),
            keys,
        });
    }

    let result = client.list_components().await?;
    Ok(ListOutput::Components {
        components: result.components,
    })
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ExportOutput {
    pub payload: Value,
}

impl Render for ExportOutput {
    fn human(&self) -> String {
        serde_json::to_string_pretty(&self.payload).unwrap_or_default()
    }
}

pub async fn cmd_export(client: &NudgeClient, format: String) -> Result<ExportOutput> {
    let result = client.export(ExportParams { format }).await?;
    Ok(ExportOutput {
        payload: serde_json::to_value(result.payload)?,
    })
}

#[derive(Debug, Serialize)]
pub struct ImportOutput {
    pub imported: usize,
    pub skipped: usize,
}

impl Render for ImportOutput {
    fn human(&self) -> String {
        format!(
            "{} Imported {} hint(s), skipped {}",
            "✓".green(),
            self.imported,
            self.skipped
        )
    }
}

pub async fn cmd_import(
    client: &NudgeClient,
    file: std::path::PathBuf,
    mode: String,
) -> Result<ImportOutput> {
    let payload: Value = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
    let mode = match mode.as_str() {
        "replace" => ImportMode::Replace,
        _ => ImportMode::Merge,
    };
    let result = client.import(ImportParams { payload, mode }).await?;
    Ok(ImportOutput {
        imported: result.imported,
        skipped: result.skipped,
    })
}

#[derive(Debug, Serialize)]
pub struct StatusOutput {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl Render for StatusOutput {
    fn human(&self) -> String {
        match self.pid {
            Some(pid) => format!("Nudge server is running (PID: {pid})"),
            None => "Nudge server is not running".to_string(),
        }
    }
}

pub fn cmd_status() -> StatusOutput {
    let pid = ServerLock::new().running_pid();
    StatusOutput {
        running: pid.is_some(),
        pid,
    }
}

#[derive(Debug, Serialize)]
pub struct StopOutput {
    pub stopped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Render for StopOutput {
    fn human(&self) -> String {
        match self.pid {
            Some(pid) => format!("{} Server stopped (PID: {pid})", "✓".green()),
            None => format!(
                "{} {}",
                "✗".red(),
                self.message.as_deref().unwrap_or("Failed to stop server")
            ),
        }
    }
}

pub fn cmd_stop() -> Result<StopOutput> {
    match ServerLock::new().stop_server()? {
        Some(pid) => Ok(StopOutput {
            stopped: true,
            pid: Some(pid),
            message: None,
        }),
        None => Ok(StopOutput {
            stopped: false,
            pid: None,
            message: Some("No server running".to_string()),
        }),
    }
}
