pub mod run;

use std::path::{Path, PathBuf};

use anyhow::Context;
use hive_types::{BridgeConfig, ExecutorConfig, CONFIG_FILENAME};

/// Build the effective configuration: the given file, else `hive.toml` in
/// the working directory if present, else defaults; then apply overrides.
pub fn load_config(
    path: Option<&Path>,
    executor: Option<PathBuf>,
    timeout: Option<u64>,
) -> anyhow::Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None if Path::new(CONFIG_FILENAME).is_file() => {
            BridgeConfig::load(Path::new(CONFIG_FILENAME))
                .with_context(|| format!("failed to load {CONFIG_FILENAME}"))?
        }
        None => BridgeConfig::default(),
    };

    match executor {
        Some(program) => config.executor.program = program,
        None => {
            if let Some(sibling) = sibling_executor(&config.executor) {
                tracing::debug!(program = %sibling.display(), "using executor next to hive");
                config.executor.program = sibling;
            }
        }
    }
    if let Some(secs) = timeout {
        config.request_timeout_secs = secs;
    }
    Ok(config)
}

/// When the configured program is the bare default name, prefer the
/// executor installed alongside this binary.
fn sibling_executor(executor: &ExecutorConfig) -> Option<PathBuf> {
    if executor.program != ExecutorConfig::default().program {
        return None;
    }
    let exe = std::env::current_exe().ok()?;
    let sibling = exe.parent()?.join(&executor.program);
    sibling.is_file().then_some(sibling)
}

pub fn print_config(config: &BridgeConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_on_top_of_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(
            &path,
            "request_timeout_secs = 5\n[listen]\nport = 9000\n",
        )
        .unwrap();

        let config = load_config(Some(&path), Some(PathBuf::from("/opt/exec")), Some(0)).unwrap();
        assert_eq!(config.listen.port, 9000);
        assert_eq!(config.executor.program, PathBuf::from("/opt/exec"));
        assert_eq!(config.request_timeout_secs, 0);
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml")), None, None).is_err());
    }
}
