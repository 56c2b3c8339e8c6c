use std::sync::Arc;

use anyhow::Context;
use appcraft_lib::auth::StaticTokenVerifier;
use appcraft_lib::config::{default_config_path, load_config, Config};
use appcraft_lib::database::init_database;
use appcraft_lib::generation::TemplateGenerator;
use appcraft_lib::{run_server, AppState};
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match default_config_path() {
        Some(path) => load_config(&path)
            .with_context(|| format!("加载配置失败: {}", path.display()))?,
        None => Config::default(),
    };

    tracing_subscriber::fmt()
        .with_max_level(config.logging.tracing_level())
        .init();

    let db_path = config
        .database
        .resolved_path()
        .context("无法确定数据库路径，请在配置中设置 database.path")?;
    let db = init_database(&db_path)
        .with_context(|| format!("初始化数据库失败: {}", db_path.display()))?;

    let verifier = Arc::new(StaticTokenVerifier::from_config(&config.auth));
    let state = AppState::new(&config, db, verifier, Arc::new(TemplateGenerator::new()));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("[Main] 收到退出信号，正在停止服务");
        }
        let _ = shutdown_tx.send(());
    });

    run_server(&config, state, shutdown_rx)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}
