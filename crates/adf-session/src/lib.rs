//! Session workspace for a data-factory analysis agent.
//!
//! A reasoning loop that inspects Azure Data Factory metadata (pipelines,
//! datasets, linked services) cannot afford to pull bulk JSON into its
//! context. This crate gives it a scratch workspace instead: bulky data is
//! staged as JSON artifacts in a per-invocation session directory, analysis
//! code runs in an isolated subprocess against those artifacts, and only a
//! short stdout digest (plus a reference to the complete result artifact)
//! flows back.
//!
//! ```ignore
//! use adf_session::prelude::*;
//!
//! let config = SessionConfig::from_env();
//! let manager = SessionManager::from_config(&config)?;
//! let session = manager.create_session()?;
//!
//! // Stage bulk data; only the one-line summary goes to the model.
//! let staged = session.artifacts().stage("datasets", &datasets)?;
//! println!("{}", staged.summary());
//!
//! // Run analysis code against it.
//! let outcome = session
//!     .runner(&config)
//!     .run_summarized(
//!         "ds = load_json('datasets')\n\
//!          hits = {d['name']: [d['linked_service']] for d in ds if d['linked_service'] == 'ls1'}\n\
//!          save_result(hits)\n\
//!          print(len(hits), 'dataset matched')",
//!         config.default_timeout,
//!     )
//!     .await?;
//! println!("{}", outcome.render(config.max_result_bytes));
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`session`] | [`SessionManager`](session::SessionManager) and [`SessionHandle`](session::SessionHandle): per-invocation directories |
//! | [`artifact`] | [`ArtifactStore`](artifact::ArtifactStore): named JSON artifacts, atomic writes, staging |
//! | [`shape`] | [`Shape`](shape::Shape): key/type/optionality outline of an artifact |
//! | [`runner`] | [`ScriptRunner`](runner::ScriptRunner): bounded, timed subprocess execution |
//! | [`digest`] | [`ScriptOutcome`](digest::ScriptOutcome): stdout digest plus result artifact reference |
//! | [`skills`] | [`SkillLoader`](skills::SkillLoader): `SKILL.md` discovery and loading |
//! | [`tools`] | [`Tool`](tools::Tool) trait, [`ToolSet`](tools::ToolSet) and the session tools |
//! | [`config`] | [`SessionConfig`](config::SessionConfig) and `ADF_*` environment overrides |

pub mod artifact;
pub mod config;
pub mod digest;
pub mod error;
pub mod prelude;
pub mod runner;
pub mod session;
pub mod shape;
pub mod skills;
pub mod text;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use error::{Result, SessionError};

// Re-export schemars for downstream tool definitions.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// JSON Schema of `T` as a `serde_json::Value`, ready for a tool's
/// `parameters`.
///
/// ```
/// use adf_session::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ReadArgs {
///     name: String,
///     #[serde(default)]
///     max_items: Option<usize>,
/// }
///
/// let schema = json_schema_for::<ReadArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"name".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Tool definitions ───────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition in the OpenAI function-calling format.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}
