//! Echo plugin demo.
//!
//! ```text
//! cosmic-demo-echo hello world
//! cosmic-demo-echo --dry-run hello world
//! cosmic-demo-echo list
//! ```
//!
//! With a `cosmic.yml` such as:
//!
//! ```yaml
//! plugins:
//!   echo:
//!     prefix: "[echo]"
//!     auth_type: credentials
//!     credentials:
//!       username: deployer
//! ```

use std::any::Any;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use cosmic::prelude::*;
use linkme::distributed_slice;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
struct EchoConfig {
    #[serde(default)]
    prefix: Option<String>,
}

/// Repeats whatever it is told, once credentials are known.
struct Echo {
    name: String,
    prefix: String,
    user: Option<String>,
    notifier: Notifier,
    dry_run: bool,
}

impl Echo {
    fn create(ctx: &PluginContext<'_>) -> PluginResult<Arc<dyn Plugin>> {
        let config: EchoConfig = serde_json::from_value(Value::Object(ctx.config()))
            .map_err(|e| PluginError::invalid_parameter("plugins.echo", e.to_string()))?;
        let user = ctx.authenticate()?.and_then(|record| record.username);
        debug!(user = ?user, "Echo plugin ready");

        Ok(Arc::new(Self {
            name: ctx.name().to_string(),
            prefix: config.prefix.unwrap_or_else(|| "echo:".to_string()),
            user,
            notifier: ctx.notifier(),
            dry_run: ctx.dry_run(),
        }))
    }

    fn say(&self, params: &Params) -> PluginResult<Value> {
        let text: String = param(params, "text")?;
        let line = match &self.user {
            Some(user) => format!("{} {text} (as {user})", self.prefix),
            None => format!("{} {text}", self.prefix),
        };
        if self.dry_run {
            self.notifier.dry_run(format!("would say: {line}"));
        } else {
            self.notifier.info(line.clone());
        }
        Ok(json!({ "said": line }))
    }
}

impl Plugin for Echo {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, operation: &str, params: &Params) -> PluginResult<Value> {
        match operation {
            "say" => self.say(params),
            "fail" => {
                let reason: Option<String> = param_opt(params, "reason")?;
                Err(PluginError::failed(
                    reason.unwrap_or_else(|| "echo refused".to_string()),
                ))
            }
            _ => Err(PluginError::UnknownOperation {
                plugin: self.name.clone(),
                operation: operation.to_string(),
            }),
        }
    }

    fn shutdown(&self) -> PluginResult<()> {
        debug!(plugin = %self.name, "Echo plugin stopped");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[distributed_slice(PLUGINS)]
static ECHO: PluginDescriptor = PluginDescriptor::global("Echo", Echo::create);

fn hello(env: &Environment, args: &[String]) -> anyhow::Result<()> {
    let text = if args.is_empty() {
        "hello".to_string()
    } else {
        args.join(" ")
    };

    let mut params = Params::new();
    params.insert("text".into(), text.into());
    env.plugin("echo")
        .context("echo plugin unavailable")?
        .call("say", &params)
        .context("echo could not speak")?;

    // Nothing is registered under this name, so the call is a no-op.
    env.optional("pager")
        .optional()
        .call("page", &params);

    // Failures of optional calls are reported on the bus, not raised.
    let mut params = Params::new();
    params.insert("reason".into(), "demonstrating an optional failure".into());
    env.optional("echo").optional().call("fail", &params);
    Ok(())
}

#[distributed_slice(TASKS)]
static HELLO: TaskDescriptor = TaskDescriptor::new("hello", "Say something through the echo plugin", hello);

fn main() -> ExitCode {
    Harness::new().run()
}
