use std::path::PathBuf;

use anyhow::{bail, Context};
use hive_bridge::{install_shutdown_hook, shutdown_all, Page};
use hive_types::BridgeConfig;
use serde_json::{json, Map, Value};

/// What `hive run` should do with the page.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: String,
    pub render: Option<PathBuf>,
    pub eval: Option<String>,
    pub get: Vec<String>,
}

pub async fn run(config: &BridgeConfig, request: Request) -> anyhow::Result<()> {
    let _guard = install_shutdown_hook();

    let work = hive_bridge::listen(config, |session| async move {
        let page = session.create_page().await?;
        drive(&page, &request).await
    });

    let output = tokio::select! {
        result = work => result.context("session failed")??,
        _ = tokio::signal::ctrl_c() => {
            let stopped = shutdown_all();
            tracing::warn!(stopped, "interrupted, executors terminated");
            bail!("interrupted");
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn drive(page: &Page, request: &Request) -> anyhow::Result<Value> {
    page.on("consoleMessage", |args| {
        if let Some(message) = args.first().and_then(Value::as_str) {
            eprintln!("console: {message}");
        }
    });

    let mut output = Map::new();
    let status = page.open(&request.url).await?;
    output.insert("status".into(), json!(status));
    if status != "success" {
        tracing::warn!(url = %request.url, %status, "page did not load");
    }

    if let Some(script) = &request.eval {
        let value = page
            .evaluate(script.as_str(), vec![])
            .await
            .context("evaluate failed")?;
        output.insert("eval".into(), value);
    }

    if !request.get.is_empty() {
        let keys: Vec<&str> = request.get.iter().map(String::as_str).collect();
        let values = page.get_many(&keys).await?;
        output.insert("get".into(), Value::Object(values));
    }

    if let Some(path) = &request.render {
        let target = path
            .to_str()
            .with_context(|| format!("render path {} is not UTF-8", path.display()))?;
        page.render(target).await?;
        output.insert("render".into(), json!(target));
    }

    Ok(Value::Object(output))
}
