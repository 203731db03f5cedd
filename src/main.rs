mod api;
mod app_state;
mod config;
mod engine;
mod fairing;
mod record_log;
mod server;
mod types;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::{CliArgs, Mode, Settings};
use engine::LlmEngine;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("minivault=info,rocket=warn")),
        )
        .with_target(true)
        .with_writer(std::io::stderr) // stdout 留给 --test-prompt 的输出
        .init();
}

#[rocket::main]
async fn main() -> ExitCode {
    init_logging();

    let settings = match Settings::from_args(CliArgs::parse()) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = match engine::build_engine(&settings) {
        Ok(engine) => engine,
        Err(e) => {
            error!("failed to build LLM client: {e}");
            return ExitCode::FAILURE;
        }
    };

    match settings.mode() {
        Mode::OneShot { prompt } => run_one_shot(engine.as_ref(), &prompt).await,
        Mode::Serve => match serve(settings, engine).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

/// 发一次 prompt，打印结果后退出，不启动服务
async fn run_one_shot(engine: &dyn LlmEngine, prompt: &str) -> ExitCode {
    match engine.generate(prompt).await {
        Ok(response) => {
            println!("{response}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(settings: Arc<Settings>, engine: Arc<dyn LlmEngine>) -> anyhow::Result<()> {
    let figment = server::server_figment(&settings);
    let state = AppState::new(settings, engine);

    info!(
        host = %state.settings.host,
        port = state.settings.port,
        llm_base_url = %state.settings.llm_base_url,
        llm_model = %state.settings.llm_model,
        log_file = %state.records.path().display(),
        stubbed = state.settings.stubbed,
        "starting minivault"
    );

    let rocket = server::build_rocket(state, figment)
        .ignite()
        .await
        .map_err(|e| anyhow!("{e}"))
        .context("invalid server configuration")?;

    rocket
        .launch()
        .await
        .map_err(|e| anyhow!("{e}"))
        .context("server terminated")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use engine::{LlmError, StubEngine};

    struct FailingEngine;

    #[async_trait]
    impl LlmEngine for FailingEngine {
        async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
            Err(LlmError::NoChoices)
        }
    }

    #[tokio::test]
    async fn one_shot_stub_succeeds() {
        assert_eq!(run_one_shot(&StubEngine, "hi").await, ExitCode::SUCCESS);
    }

    #[tokio::test]
    async fn one_shot_engine_error_fails() {
        assert_eq!(run_one_shot(&FailingEngine, "hi").await, ExitCode::FAILURE);
    }

    #[tokio::test]
    async fn one_shot_writes_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("logs/log.jsonl");
        let args = CliArgs::try_parse_from([
            "minivault",
            "--stubbed",
            "--test-prompt",
            "ping",
            "--log-file",
            log_file.to_str().unwrap(),
        ])
        .unwrap();
        let settings = Settings::from_args(args).unwrap();
        let engine = engine::build_engine(&settings).unwrap();

        let Mode::OneShot { prompt } = settings.mode() else {
            panic!("--test-prompt should select one-shot mode");
        };
        assert_eq!(run_one_shot(engine.as_ref(), &prompt).await, ExitCode::SUCCESS);

        assert!(!log_file.exists());
        assert!(!dir.path().join("logs").exists());
    }
}
