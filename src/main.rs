mod bus;
mod config;
mod core;
mod farm;
mod game;
mod notify;
mod upgrades;

use anyhow::{Context, Result};
use bus::types::Bus;
use config::config::{AccountCfg, AppCfg};
use crate::core::types::Actor;
use farm::actor::FarmActor;
use game::client::GameApiClient;
use game::hamster::HamsterClient;
use game::simulator::SimGameClient;
use notify::telegram::TelegramActor;
use reqwest::Client;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

fn game_client(cfg: &AppCfg, http: &Client, account: &AccountCfg) -> Arc<dyn GameApiClient> {
    if cfg.game.simulate {
        return Arc::new(SimGameClient::new(
            cfg.game.simulated_balance,
            cfg.game.simulated_catalog.clone(),
        ));
    }
    let mut account = account.clone();
    if account.user_agent.is_empty() {
        account.user_agent = cfg.http.user_agent.clone();
    }
    Arc::new(HamsterClient::new(http.clone(), &cfg.game, &account))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let cfg = AppCfg::load("config.yml")?;

    let span = info_span!(
        "Supervisor",
        pid = %std::process::id(),
        version = env!("CARGO_PKG_VERSION"),
    );
    let _enter = span.enter();

    info!("Starting up");
    if cfg.game.simulate {
        warn!("game.simulate is set, no requests will reach the game");
    }

    let bus = Bus::new();
    let shutdown = CancellationToken::new();

    info!("Initializing Client");
    let client = Client::builder()
        .user_agent(cfg.http.user_agent.clone())
        .pool_idle_timeout(cfg.http.pool_idle_timeout)
        .pool_max_idle_per_host(cfg.http.pool_max_idle_per_host)
        .timeout(cfg.http.timeout)
        .build()
        .context("building http client")?;

    let telegram = TelegramActor::new(
        bus.clone(),
        client.clone(),
        cfg.telegram.clone(),
        &cfg.accounts,
        shutdown.clone(),
    );
    let notifier = tokio::spawn(telegram.run().instrument(info_span!("Telegram")));

    info!("Spawning actors for {} accounts", cfg.accounts.len());
    let mut farms = tokio::task::JoinSet::new();
    for account in &cfg.accounts {
        let actor = FarmActor::new(
            bus.clone(),
            game_client(&cfg, &client, account),
            account.clone(),
            cfg.farm.clone(),
            shutdown.clone(),
        );
        farms.spawn(
            actor
                .run()
                .instrument(info_span!("Farm", account = %account.name)),
        );
    }

    info!("Waiting for actors");

    tokio::select! {
        _ = async {
            while let Some(res) = farms.join_next().await {
                match res {
                    Ok(Ok(()))  => info!("Farm exited cleanly"),
                    Ok(Err(e))  => error!(?e, "Farm returned error"),
                    Err(panic)  => error!(?panic, "Farm panicked/cancelled"),
                }
            }
        } => {
            info!("All accounts finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down supervisor loop");
        }
    }
    shutdown.cancel();

    info!("Waiting for graceful shutdown of actors");
    while let Some(res) = farms.join_next().await {
        match res {
            Ok(Ok(())) => info!("Farm exited cleanly"),
            Ok(Err(e)) => error!(?e, "Farm returned error"),
            Err(panic) => error!(?panic, "Farm panicked/cancelled"),
        }
    }
    match notifier.await {
        Ok(Ok(())) => info!("Notifier exited cleanly"),
        Ok(Err(e)) => error!(?e, "Notifier returned error"),
        Err(panic) => error!(?panic, "Notifier panicked/cancelled"),
    }

    info!("Supervisor exit");
    Ok(())
}
