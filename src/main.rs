/*
 * PatchFarm - Patch Distribution Server Maintenance
 * Copyright (c) 2026 PatchFarm Project
 *
 * This work is licensed under CC BY-NC-SA 4.0
 * https://creativecommons.org/licenses/by-nc-sa/4.0/
 */

use clap::Parser;
use patchfarm_maintenance::{
    cli::{Cli, prompt_window_days},
    config::Config,
    database::SqlcmdExecutor,
    error::AppResult,
    report,
    services::{CommandServiceControl, HttpCatalogClient, Pipeline},
    storage::LocalFileSync,
};
use std::{process::ExitCode, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn load_config(cli: &Cli) -> AppResult<Config> {
    if !cli.config.exists() {
        tracing::warn!("未找到配置文件 {}，使用默认配置", cli.config.display());
        let default_config = Config::default();
        if let Err(e) = default_config.save_to_file(&cli.config) {
            tracing::warn!("保存默认配置失败: {}", e);
        }
        return Ok(default_config);
    }

    let config = Config::from_file(&cli.config)?;
    tracing::info!("已加载配置文件: {}", cli.config.display());
    Ok(config)
}

async fn run(cli: Cli) -> AppResult<bool> {
    let config = load_config(&cli)?;

    let plan = cli.to_plan(config.export.default_window_days, |default| {
        prompt_window_days(&mut std::io::stdin().lock(), &mut std::io::stdout(), default)
    })?;

    let catalog = Arc::new(HttpCatalogClient::new(&config.catalog)?);
    let sql = Arc::new(SqlcmdExecutor::new(config.sql.clone()));
    let service = Arc::new(CommandServiceControl::new(&config.catalog));
    let pipeline = Pipeline::new(
        &config,
        catalog,
        sql,
        Arc::new(LocalFileSync::new()),
        service,
    );

    // Ctrl-C 只在阶段之间生效
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("收到中断信号，当前阶段结束后停止");
            signal_token.cancel();
        }
    });

    let result = pipeline.run(&plan, &cancel).await;

    println!("{}", report::render_text(&result));
    if let Some(path) = &cli.report {
        match report::write_json(&result, path) {
            Ok(()) => tracing::info!("运行报告已写入: {}", path.display()),
            Err(e) => tracing::error!("写入运行报告失败: {}", e),
        }
    }

    Ok(result.success)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("patchfarm_maintenance={}", cli.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("维护程序启动失败: {}", e);
            ExitCode::from(2)
        }
    }
}
